//! Text decoding for fixed-width and length-prefixed chunk strings.

/// Decode a chunk text field.
///
/// Stops at the first NUL and replaces invalid UTF-8 sequences, so fixed-size
/// fields padded with zeros and Latin-1 labels both produce usable strings.
pub fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Like [`decode_text`], but maps empty results to `None`.
pub fn decode_optional_text(bytes: &[u8]) -> Option<String> {
    let text = decode_text(bytes);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_stops_at_nul() {
        assert_eq!(decode_text(b"Verse\0\0\0"), "Verse");
        assert_eq!(decode_text(b"no padding"), "no padding");
        assert_eq!(decode_text(b"\0garbage"), "");
    }

    #[test]
    fn test_decode_optional_text() {
        assert_eq!(decode_optional_text(b"\0\0"), None);
        assert_eq!(decode_optional_text(b"Intro"), Some("Intro".to_string()));
    }
}
