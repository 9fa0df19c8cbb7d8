//! # Compressed Codec Adapters
//!
//! Readers for Ogg-encapsulated Vorbis and Opus. Both decode to 32-bit
//! float, buffer one decode call in a [`ring_buffer::RingBuffer`], and map
//! the stream's comment header onto [`core_metadata::MetaData`].
//!
//! ## Features
//!
//! - `vorbis` (default): pure-Rust decoding through Symphonia
//! - `opus`: links the native libopus

pub mod ogg;
pub mod ring_buffer;
pub mod sample_converter;

#[cfg(feature = "opus")]
pub mod opus;
#[cfg(feature = "vorbis")]
pub mod vorbis;

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::reader::BoxedReader;
use crate::stream::MediaStream;

use self::ogg::OggPacketReader;

/// Codec carried by an Ogg stream's first packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OggCodec {
    Vorbis,
    Opus,
}

/// Identifies the codec of the Ogg stream starting at the current position,
/// then restores that position.
pub fn identify_ogg<S: Read + Seek>(stream: &mut S, buffer_bytes: usize) -> Result<OggCodec> {
    let start = stream.stream_position()?;
    let first = {
        let mut packets = OggPacketReader::with_capacity(buffer_bytes, &mut *stream)?;
        packets.next_packet()?
    };
    stream.seek(SeekFrom::Start(start))?;

    let first = first.ok_or_else(|| ReaderError::InvalidType("empty Ogg stream".to_string()))?;
    if first.data.starts_with(b"\x01vorbis") {
        Ok(OggCodec::Vorbis)
    } else if first.data.starts_with(b"OpusHead") {
        Ok(OggCodec::Opus)
    } else {
        Err(ReaderError::UnsupportedType("Ogg stream of an unknown codec".to_string()))
    }
}

/// Opens the Ogg stream at position 0 of `stream` with the matching adapter.
///
/// Vorbis is tried before Opus.
pub(crate) fn open_ogg(mut stream: Box<dyn MediaStream>, name: String, config: &ReaderConfig) -> Result<BoxedReader> {
    stream.seek(SeekFrom::Start(0))?;
    let codec = identify_ogg(&mut stream, config.ogg_read_buffer_bytes)?;
    debug!(?codec, "Identified Ogg codec");

    match codec {
        #[cfg(feature = "vorbis")]
        OggCodec::Vorbis => Ok(Box::new(vorbis::VorbisReader::open(stream, name, config)?)),
        #[cfg(feature = "opus")]
        OggCodec::Opus => Ok(Box::new(opus::OpusReader::open(stream, name, config)?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = (stream, name);
            Err(ReaderError::UnsupportedType(format!(
                "Ogg {:?} support is not enabled",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ogg::tests::page;
    use super::ogg::FLAG_FIRST_PAGE;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_identify_ogg_restores_position() {
        let mut data = page(FLAG_FIRST_PAGE, 0, 1, 0, &[b"OpusHead\x01\x02"]);
        data.extend(page(0, 0, 1, 1, &[b"OpusTags"]));
        let mut cursor = Cursor::new(data);

        assert_eq!(identify_ogg(&mut cursor, 4096).unwrap(), OggCodec::Opus);
        assert_eq!(cursor.position(), 0);

        let mut vorbis = Cursor::new(page(FLAG_FIRST_PAGE, 0, 1, 0, &[b"\x01vorbis"]));
        assert_eq!(identify_ogg(&mut vorbis, 4096).unwrap(), OggCodec::Vorbis);

        let mut speex = Cursor::new(page(FLAG_FIRST_PAGE, 0, 1, 0, &[b"Speex   "]));
        assert!(matches!(
            identify_ogg(&mut speex, 4096),
            Err(ReaderError::UnsupportedType(_))
        ));
    }
}
