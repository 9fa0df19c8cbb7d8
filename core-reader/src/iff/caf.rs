//! Core Audio Format parsing.
//!
//! Big-endian chunks with 64-bit signed lengths and no padding. A `data`
//! length of `-1` means the chunk runs to the end of the file.

use std::io::{Read, Seek};

use core_metadata::text::decode_optional_text;
use core_metadata::{CuePoint, MetaData};
use tracing::debug;

use super::{read_opaque_block, ParsedFile};
use crate::channels::{
    discrete_layout, layout_tag_identifiers, mask_to_identifiers, simple_layout, tag_channel_count,
    tags, USE_COORDINATES,
};
use crate::chunk::{seek_chunk, walk_chunks, ChunkHeader, ChunkId, ContainerLayout, Walk};
use crate::config::MetadataFlags;
use crate::error::{ReaderError, Result};
use crate::format::{ChannelLayout, Encoding, FormatInfo};
use crate::reader::FileFormat;
use crate::stream::ByteReader;

const FLAG_FLOAT: u32 = 1;
const FLAG_LITTLE_ENDIAN: u32 = 2;

const MARKER_GENERIC: [u8; 4] = [0; 4];

/// Size of the edit-count prefix of the `data` payload.
const DATA_EDIT_COUNT_LEN: u64 = 4;

/// Parses a CAF header whose `caff` magic was already consumed.
pub(crate) fn parse<S: Read + Seek>(reader: &mut ByteReader<S>) -> Result<ParsedFile> {
    reader.set_big_endian(true);

    let version = reader.read_u16()?;
    let _flags = reader.read_u16()?;
    if version != 1 {
        return Err(ReaderError::UnsupportedType(format!("CAF version {}", version)));
    }

    let chunks_start = reader.position();
    let mut format: Option<FormatInfo> = None;
    let mut has_layout = false;
    let mut data = None;

    walk_chunks(reader, &ContainerLayout::CAF, None, |reader, header| {
        match header.id {
            ChunkId::FourCc(code) if &code == b"desc" => {
                format = Some(parse_desc(reader)?);
            }
            ChunkId::FourCc(code) if &code == b"chan" => {
                let Some(format) = format.as_mut() else {
                    return Err(ReaderError::InvalidType("'chan' precedes 'desc'".to_string()));
                };
                parse_chan(reader, format)?;
                has_layout = true;
            }
            ChunkId::FourCc(code) if &code == b"data" => {
                data = Some(*header);
                return Ok(Walk::Stop);
            }
            _ => {}
        }
        Ok(Walk::Continue)
    })?;

    let mut format = format.ok_or_else(|| ReaderError::ChunkNotFound("'desc'".to_string()))?;
    let data: ChunkHeader = data.ok_or_else(|| ReaderError::ChunkNotFound("'data'".to_string()))?;

    if !has_layout {
        if format.num_channels > 2 {
            return Err(ReaderError::InvalidType(format!(
                "{} channels without a 'chan' chunk",
                format.num_channels
            )));
        }
        format.set_identifiers(simple_layout(format.num_channels));
    }

    let data_len = match data.len {
        Some(_) => data
            .available_len(reader)
            .map(|len| len.saturating_sub(DATA_EDIT_COUNT_LEN)),
        None => None,
    };

    Ok(ParsedFile {
        file_format: FileFormat::Caf,
        format,
        layout: ContainerLayout::CAF,
        chunks_start,
        main_end: None,
        data_pos: data.data_pos + DATA_EDIT_COUNT_LEN,
        data_len,
        declared_frames: None,
    })
}

fn parse_desc<S: Read + Seek>(reader: &mut ByteReader<S>) -> Result<FormatInfo> {
    let sample_rate = reader.read_f64()?;
    let format_id = reader.read_fourcc()?;
    let flags = reader.read_u32()?;
    let bytes_per_packet = reader.read_u32()?;
    let frames_per_packet = reader.read_u32()?;
    let num_channels = reader.read_u32()?;
    let bits_per_channel = reader.read_u32()?;

    if &format_id != b"lpcm" {
        return Err(ReaderError::UnsupportedType(format!(
            "CAF format {:?}",
            String::from_utf8_lossy(&format_id)
        )));
    }
    if frames_per_packet != 1 {
        return Err(ReaderError::UnsupportedType(format!(
            "{} frames per packet",
            frames_per_packet
        )));
    }

    let is_float = flags & FLAG_FLOAT != 0;
    if is_float && bits_per_channel != 32 && bits_per_channel != 64 {
        return Err(ReaderError::InvalidType(format!(
            "{}-bit float samples",
            bits_per_channel
        )));
    }
    if num_channels == 0 || sample_rate.is_nan() || sample_rate <= 0.0 {
        return Err(ReaderError::InvalidType(format!(
            "desc declares {} channels at {} Hz",
            num_channels, sample_rate
        )));
    }

    let mut format = FormatInfo {
        encoding: Encoding::new(!is_float, is_float, flags & FLAG_LITTLE_ENDIAN == 0),
        bits_per_sample: bits_per_channel,
        bytes_per_frame: bytes_per_packet,
        num_channels,
        sample_rate,
        ..Default::default()
    };
    format.set_linear_rates();
    Ok(format)
}

fn parse_chan<S: Read + Seek>(reader: &mut ByteReader<S>, format: &mut FormatInfo) -> Result<()> {
    let tag = reader.read_u32()?;
    let bitmap = reader.read_u32()?;
    let num_descriptions = reader.read_u32()?;
    let num_channels = format.num_channels;

    match tag {
        tags::USE_CHANNEL_BITMAP => {
            format.set_identifiers(mask_to_identifiers(bitmap, num_channels));
        }
        tags::USE_CHANNEL_DESCRIPTIONS => {
            if num_descriptions != num_channels {
                return Err(ReaderError::InvalidType(format!(
                    "{} channel descriptions for {} channels",
                    num_descriptions, num_channels
                )));
            }

            let mut labels = Vec::with_capacity(num_channels as usize);
            let mut coordinates = Vec::with_capacity(num_channels as usize);
            for _ in 0..num_descriptions {
                let label = reader.read_u32()?;
                let _flags = reader.read_u32()?;
                let position = [reader.read_f32()?, reader.read_f32()?, reader.read_f32()?];
                labels.push(label);
                coordinates.push(position);
            }

            if labels.contains(&USE_COORDINATES) {
                format.layout = ChannelLayout::Coordinates(coordinates);
            } else {
                format.set_identifiers(labels);
            }
        }
        tag => {
            if tag_channel_count(tag) != num_channels {
                return Err(ReaderError::InvalidType(format!(
                    "layout tag {:#010x} for {} channels",
                    tag, num_channels
                )));
            }

            let identifiers = layout_tag_identifiers(tag).unwrap_or_else(|| {
                debug!(tag, "Unknown channel layout tag");
                discrete_layout(num_channels)
            });
            format.set_identifiers(identifiers);
        }
    }
    Ok(())
}

/// One `strg` entry: string id and byte offset into the string data.
struct StringTable {
    entries: Vec<(u32, u64)>,
    data: Vec<u8>,
}

impl StringTable {
    fn lookup(&self, id: u32) -> Option<String> {
        let &(_, offset) = self.entries.iter().find(|(entry_id, _)| *entry_id == id)?;
        let tail = self.data.get(usize::try_from(offset).ok()?..)?;
        decode_optional_text(tail)
    }
}

fn read_strg<S: Read + Seek>(reader: &mut ByteReader<S>, header: &ChunkHeader) -> Result<StringTable> {
    let count = reader.read_u32()?;
    let table_len = 4 + u64::from(count) * 12;
    let len = header.available_len(reader).unwrap_or(0);
    if table_len > len {
        return Err(ReaderError::UnexpectedEof(format!(
            "{} strings do not fit {} bytes",
            count, len
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = reader.read_u32()?;
        let offset = reader.read_i64()?.max(0) as u64;
        entries.push((id, offset));
    }

    let data = reader.read_bytes((len - table_len) as usize)?;
    Ok(StringTable { entries, data })
}

pub(crate) fn read_metadata<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    parsed: &ParsedFile,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let strings = if flags.text {
        match seek_chunk(reader, &parsed.layout, None, ChunkId::fourcc(b"strg")) {
            Ok(header) => Some(read_strg(reader, &header)?),
            Err(ReaderError::ChunkNotFound(_)) => None,
            Err(err) => return Err(err),
        }
    } else {
        None
    };

    reader.seek_to(parsed.chunks_start)?;
    let sample_rate = parsed.format.sample_rate;

    walk_chunks(reader, &parsed.layout, None, |reader, header| {
        let ChunkId::FourCc(code) = header.id else {
            return Ok(Walk::Continue);
        };

        match &code {
            b"desc" | b"chan" | b"strg" => {}
            b"data" => {
                meta.edit_count = Some(reader.read_u32()?);
            }
            b"mark" => {
                if flags.cue_points {
                    read_mark(reader, sample_rate, strings.as_ref(), meta)?;
                }
            }
            b"ovvw" => {
                if flags.overview {
                    debug!("Skipping overview chunk");
                }
            }
            _ => {
                if flags.custom {
                    meta.add_block(read_opaque_block(reader, header)?);
                }
            }
        }
        Ok(Walk::Continue)
    })
}

/// Generic markers become cue points with ids reduced by one.
fn read_mark<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    sample_rate: f64,
    strings: Option<&StringTable>,
    meta: &mut MetaData,
) -> Result<()> {
    let _smpte_type = reader.read_u32()?;
    let count = reader.read_u32()?;

    for _ in 0..count {
        let marker_type = reader.read_fourcc()?;
        let position = reader.read_f64()?;
        let marker_id = reader.read_u32()?;
        let _smpte_time = reader.read_array::<4>()?;
        let _sub_sample = reader.read_u32()?;
        let _channel = reader.read_u32()?;

        if marker_type != MARKER_GENERIC {
            continue;
        }

        let mut cue = CuePoint::new(marker_id.saturating_sub(1), position / sample_rate);
        cue.set_label(strings.and_then(|table| table.lookup(marker_id)));
        meta.add_cue_point(cue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn be_reader(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        let mut reader = ByteReader::new(Cursor::new(bytes)).unwrap();
        reader.set_big_endian(true);
        reader
    }

    fn desc_payload(format_id: &[u8; 4], flags: u32, frames_per_packet: u32, bits: u32) -> Vec<u8> {
        let mut out = 48000f64.to_be_bytes().to_vec();
        out.extend_from_slice(format_id);
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&(bits / 8 * 2).to_be_bytes());
        out.extend_from_slice(&frames_per_packet.to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&bits.to_be_bytes());
        out
    }

    #[test]
    fn test_desc_flags() {
        let format = parse_desc(&mut be_reader(desc_payload(b"lpcm", 3, 1, 32))).unwrap();
        assert_eq!(format.encoding, Encoding::FLOAT_LE);
        assert_eq!(format.bytes_per_frame, 8);

        let format = parse_desc(&mut be_reader(desc_payload(b"lpcm", 0, 1, 24))).unwrap();
        assert_eq!(format.encoding, Encoding::PCM_BE);
    }

    #[test]
    fn test_desc_rejections() {
        assert!(matches!(
            parse_desc(&mut be_reader(desc_payload(b"aac ", 0, 1, 16))),
            Err(ReaderError::UnsupportedType(_))
        ));
        assert!(matches!(
            parse_desc(&mut be_reader(desc_payload(b"lpcm", 0, 1024, 16))),
            Err(ReaderError::UnsupportedType(_))
        ));
        assert!(matches!(
            parse_desc(&mut be_reader(desc_payload(b"lpcm", 1, 1, 16))),
            Err(ReaderError::InvalidType(_))
        ));
    }

    #[test]
    fn test_chan_tag_must_match_channels() {
        let mut format = FormatInfo::linear(Encoding::PCM_BE, 16, 3, 48000.0);
        let mut payload = tags::STEREO.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0; 8]);
        let err = parse_chan(&mut be_reader(payload), &mut format).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidType(_)));

        let mut payload = tags::MPEG_3_0_A.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0; 8]);
        parse_chan(&mut be_reader(payload), &mut format).unwrap();
        assert_eq!(format.layout.len(), 3);
    }

    #[test]
    fn test_chan_descriptions_with_coordinates() {
        let mut format = FormatInfo::linear(Encoding::FLOAT_BE, 32, 2, 48000.0);
        let mut payload = tags::USE_CHANNEL_DESCRIPTIONS.to_be_bytes().to_vec();
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&2u32.to_be_bytes());
        for azimuth in [-30f32, 30.0] {
            payload.extend_from_slice(&USE_COORDINATES.to_be_bytes());
            payload.extend_from_slice(&0u32.to_be_bytes());
            payload.extend_from_slice(&azimuth.to_be_bytes());
            payload.extend_from_slice(&0f32.to_be_bytes());
            payload.extend_from_slice(&1f32.to_be_bytes());
        }

        parse_chan(&mut be_reader(payload), &mut format).unwrap();
        assert_eq!(
            format.layout,
            ChannelLayout::Coordinates(vec![[-30.0, 0.0, 1.0], [30.0, 0.0, 1.0]])
        );
    }

    #[test]
    fn test_string_table_lookup() {
        let table = StringTable {
            entries: vec![(1, 0), (2, 6)],
            data: b"Intro\0Outro\0".to_vec(),
        };
        assert_eq!(table.lookup(2).as_deref(), Some("Outro"));
        assert_eq!(table.lookup(3), None);
    }
}
