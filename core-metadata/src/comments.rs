//! # Vorbis Comments
//!
//! Parsing of the comment block shared by Vorbis (`\x03vorbis`) and Opus
//! (`OpusTags`) headers, and its mapping onto [`MetaData`].
//!
//! Keys are matched case-insensitively. Chapters follow the
//! `CHAPTERnnn=HH:MM:SS.mmm` / `CHAPTERnnnNAME=...` convention and become
//! cue points keyed by the decimal chapter number.

use tracing::{debug, warn};

use crate::cue_point::CuePoint;
use crate::error::{MetadataError, Result};
use crate::metadata::MetaData;

/// A decoded comment block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComments {
    pub vendor: String,
    /// `(KEY, value)` pairs in stream order, keys as stored.
    pub entries: Vec<(String, String)>,
}

impl VorbisComments {
    /// Parses a comment block with the codec magic already stripped.
    pub fn parse(mut data: &[u8]) -> Result<Self> {
        let vendor_len = take_u32(&mut data, "vendor length")? as usize;
        let vendor = take_text(&mut data, vendor_len, "vendor string")?;
        let count = take_u32(&mut data, "comment count")?;

        let mut entries = Vec::new();
        for index in 0..count {
            let len = take_u32(&mut data, "comment length")? as usize;
            let entry = take_text(&mut data, len, "comment")?;

            match entry.split_once('=') {
                Some((key, value)) => entries.push((key.to_string(), value.to_string())),
                None => debug!(index, "Skipping comment without '='"),
            }
        }

        Ok(Self { vendor, entries })
    }
}

fn take_u32(data: &mut &[u8], what: &str) -> Result<u32> {
    if data.len() < 4 {
        return Err(MetadataError::TruncatedComments(what.to_string()));
    }
    let (head, rest) = data.split_at(4);
    *data = rest;
    Ok(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
}

fn take_text(data: &mut &[u8], len: usize, what: &str) -> Result<String> {
    if data.len() < len {
        return Err(MetadataError::TruncatedComments(what.to_string()));
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(String::from_utf8_lossy(head).into_owned())
}

/// Which metadata categories a comment block may fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentMapping {
    /// Title, album, artist and the other descriptive tags.
    pub info: bool,
    /// `CHAPTERnnn` positions.
    pub cue_points: bool,
    /// `CHAPTERnnnNAME` labels.
    pub text: bool,
}

impl CommentMapping {
    pub fn all() -> Self {
        Self {
            info: true,
            cue_points: true,
            text: true,
        }
    }
}

/// Copies recognised comments into `meta`.
pub fn apply_comments(meta: &mut MetaData, comments: &VorbisComments, mapping: CommentMapping) {
    if mapping.info && !comments.vendor.is_empty() {
        meta.text.vendor = Some(comments.vendor.clone());
    }

    for (key, value) in &comments.entries {
        let upper = key.to_ascii_uppercase();

        if let Some(rest) = upper.strip_prefix("CHAPTER") {
            apply_chapter(meta, rest, value, mapping);
            continue;
        }

        if !mapping.info {
            continue;
        }

        let text = &mut meta.text;
        match upper.as_str() {
            "TITLE" => text.title = Some(value.clone()),
            "ALBUM" => text.album = Some(value.clone()),
            "ARTIST" => text.artists.push(value.clone()),
            "PERFORMER" => text.performers.push(value.clone()),
            "DESCRIPTION" | "COMMENT" => text.descriptions.push(value.clone()),
            "GENRE" => text.genre = Some(value.clone()),
            "DATE" => {
                text.year = parse_year(value);
                text.date = Some(value.clone());
            }
            "ISRC" => text.isrc = Some(value.clone()),
            "ORGANIZATION" => text.organization = Some(value.clone()),
            "LYRICS" => text.lyrics = Some(value.clone()),
            "TRACKNUMBER" => {
                let (number, total) = parse_track(value);
                text.track_number = number;
                if total.is_some() {
                    text.track_count = total;
                }
            }
            "TRACKTOTAL" | "TOTALTRACKS" => text.track_count = value.trim().parse().ok(),
            _ => {}
        }
    }
}

fn apply_chapter(meta: &mut MetaData, rest: &str, value: &str, mapping: CommentMapping) {
    let digits = match rest.get(..3) {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => digits,
        _ => return,
    };
    let Ok(chapter) = digits.parse::<u32>() else {
        return;
    };

    match &rest[3..] {
        "" if mapping.cue_points => match parse_chapter_time(value) {
            Ok(seconds) => match meta.find_cue_point_mut(chapter) {
                Some(cue) => cue.set_position(seconds),
                None => meta.add_cue_point(CuePoint::new(chapter, seconds)),
            },
            Err(err) => warn!(chapter, error = %err, "Ignoring chapter with bad timestamp"),
        },
        "NAME" if mapping.text => match meta.find_cue_point_mut(chapter) {
            Some(cue) => cue.set_label(Some(value.to_string())),
            None => meta.add_cue_point(CuePoint::new(chapter, 0.0).with_label(value)),
        },
        _ => {}
    }
}

/// Parses `HH:MM:SS(.fraction)` into seconds.
pub fn parse_chapter_time(value: &str) -> Result<f64> {
    let invalid = || MetadataError::InvalidTimestamp(value.to_string());

    let mut parts = value.trim().splitn(3, ':');
    let hours: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let minutes: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let seconds: f64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;

    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    Ok(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds)
}

fn parse_year(value: &str) -> Option<i32> {
    value.get(..4).and_then(|year| year.parse().ok())
}

fn parse_track(value: &str) -> (Option<u32>, Option<u32>) {
    match value.split_once('/') {
        Some((number, total)) => (number.trim().parse().ok(), total.trim().parse().ok()),
        None => (value.trim().parse().ok(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn packet(vendor: &str, entries: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        data.extend_from_slice(vendor.as_bytes());
        data.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for entry in entries {
            data.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            data.extend_from_slice(entry.as_bytes());
        }
        data
    }

    #[test]
    fn test_parse_comment_block() {
        let data = packet("libVorbis I 20200704", &["TITLE=Drift", "no-equals", "artist=Ana"]);
        let comments = VorbisComments::parse(&data).unwrap();

        assert_eq!(comments.vendor, "libVorbis I 20200704");
        assert_eq!(
            comments.entries,
            vec![
                ("TITLE".to_string(), "Drift".to_string()),
                ("artist".to_string(), "Ana".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_truncated_block() {
        let mut data = packet("v", &["TITLE=Drift"]);
        data.truncate(data.len() - 2);
        assert!(matches!(
            VorbisComments::parse(&data),
            Err(MetadataError::TruncatedComments(_))
        ));
    }

    #[test]
    fn test_apply_info_tags_case_insensitively() {
        let comments = VorbisComments::parse(&packet(
            "enc",
            &[
                "Title=Night Bus",
                "ALBUM=Routes",
                "artist=One",
                "ARTIST=Two",
                "date=2004-05-01",
                "TRACKNUMBER=3/12",
                "isrc=GBAYE0400001",
            ],
        ))
        .unwrap();

        let mut meta = MetaData::new();
        apply_comments(&mut meta, &comments, CommentMapping::all());

        assert_eq!(meta.text.title.as_deref(), Some("Night Bus"));
        assert_eq!(meta.text.album.as_deref(), Some("Routes"));
        assert_eq!(meta.text.artists, vec!["One".to_string(), "Two".to_string()]);
        assert_eq!(meta.text.year, Some(2004));
        assert_eq!(meta.text.track_number, Some(3));
        assert_eq!(meta.text.track_count, Some(12));
        assert_eq!(meta.text.isrc.as_deref(), Some("GBAYE0400001"));
        assert_eq!(meta.text.vendor.as_deref(), Some("enc"));
    }

    #[test]
    fn test_chapters_become_cue_points() {
        let comments = VorbisComments::parse(&packet(
            "enc",
            &[
                "CHAPTER001=00:00:00.000",
                "CHAPTER001NAME=Intro",
                "CHAPTER012=01:02:03.500",
                "chapter012name=Outro",
                "CHAPTERX=00:00:01",
            ],
        ))
        .unwrap();

        let mut meta = MetaData::new();
        apply_comments(&mut meta, &comments, CommentMapping::all());

        assert_eq!(meta.cue_points().len(), 2);
        let intro = meta.find_cue_point(1).unwrap();
        assert_eq!(intro.label(), Some("Intro"));
        assert_eq!(intro.position(), 0.0);

        let outro = meta.find_cue_point(12).unwrap();
        assert_eq!(outro.label(), Some("Outro"));
        assert_eq!(outro.position(), 3723.5);
    }

    #[test]
    fn test_chapter_positions_without_info() {
        let comments =
            VorbisComments::parse(&packet("enc", &["TITLE=Hidden", "CHAPTER002=00:01:00"]))
                .unwrap();

        let mapping = CommentMapping {
            info: false,
            cue_points: true,
            text: false,
        };
        let mut meta = MetaData::new();
        apply_comments(&mut meta, &comments, mapping);

        assert!(meta.text.title.is_none());
        assert!(meta.text.vendor.is_none());
        assert_eq!(meta.find_cue_point(2).unwrap().position(), 60.0);
    }

    #[test]
    fn test_parse_chapter_time() {
        assert_eq!(parse_chapter_time("00:00:05.250").unwrap(), 5.25);
        assert_eq!(parse_chapter_time("2:00:00").unwrap(), 7200.0);
        assert!(parse_chapter_time("00:75:00").is_err());
        assert!(parse_chapter_time("soon").is_err());
    }
}
