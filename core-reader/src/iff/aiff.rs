//! AIFF and AIFC parsing.
//!
//! Big-endian `FORM` containers. The frame count comes from `COMM`, not
//! from the `SSND` length, and the sample rate is an 80-bit extended float.

use std::io::{Read, Seek};

use core_metadata::{CuePoint, MetaData};
use tracing::debug;

use super::{read_opaque_block, ParsedFile};
use crate::channels::aiff_default_layout;
use crate::chunk::{walk_chunks, ChunkHeader, ChunkId, ContainerLayout, Walk};
use crate::config::MetadataFlags;
use crate::error::{ReaderError, Result};
use crate::format::{Encoding, FormatInfo};
use crate::reader::FileFormat;
use crate::stream::ByteReader;

/// AIFC version 1 timestamp.
const AIFC_VERSION_1: u32 = 0xa280_5140;

/// Parses a `FORM` header whose magic was already consumed.
pub(crate) fn parse<S: Read + Seek>(reader: &mut ByteReader<S>) -> Result<ParsedFile> {
    reader.set_big_endian(true);

    let form_len = reader.read_u32()?;
    let form = reader.read_fourcc()?;
    let file_format = match &form {
        b"AIFF" => FileFormat::Aiff,
        b"AIFC" => FileFormat::Aifc,
        other => {
            return Err(ReaderError::InvalidType(format!(
                "FORM type {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };
    let is_aifc = file_format == FileFormat::Aifc;

    let chunks_start = reader.position();
    let main_end = (form_len > 4).then(|| 8 + u64::from(form_len));

    let mut common = None;
    let mut sound: Option<(ChunkHeader, u64)> = None;

    walk_chunks(reader, &ContainerLayout::AIFF, main_end, |reader, header| {
        match header.id {
            ChunkId::FourCc(code) if &code == b"COMM" => {
                common = Some(parse_comm(reader, is_aifc)?);
            }
            ChunkId::FourCc(code) if &code == b"FVER" => {
                let version = reader.read_u32()?;
                if version != 0 && version != AIFC_VERSION_1 {
                    return Err(ReaderError::InvalidType(format!(
                        "AIFC version {:#010x}",
                        version
                    )));
                }
            }
            ChunkId::FourCc(code) if &code == b"SSND" => {
                let offset = reader.read_u32()?;
                let _block_size = reader.read_u32()?;
                sound = Some((*header, u64::from(offset)));
            }
            _ => {}
        }

        if common.is_some() && sound.is_some() {
            return Ok(Walk::Stop);
        }
        Ok(Walk::Continue)
    })?;

    let (format, num_frames) =
        common.ok_or_else(|| ReaderError::ChunkNotFound("'COMM'".to_string()))?;
    let (header, offset) = sound.ok_or_else(|| ReaderError::ChunkNotFound("'SSND'".to_string()))?;

    let data_pos = header.data_pos + 8 + offset;
    let data_len = header
        .available_len(reader)
        .map(|len| len.saturating_sub(8 + offset));

    Ok(ParsedFile {
        file_format,
        format,
        layout: ContainerLayout::AIFF,
        chunks_start,
        main_end,
        data_pos,
        data_len,
        declared_frames: Some(i64::from(num_frames)),
    })
}

/// Decodes `COMM`, returning the format and the declared frame count.
fn parse_comm<S: Read + Seek>(reader: &mut ByteReader<S>, is_aifc: bool) -> Result<(FormatInfo, u32)> {
    let num_channels = reader.read_i16()?;
    let num_frames = reader.read_u32()?;
    let bits_per_sample = reader.read_i16()?;
    let sample_rate = reader.read_f80()?;

    if num_channels <= 0 || bits_per_sample <= 0 || sample_rate.is_nan() || sample_rate <= 0.0 {
        return Err(ReaderError::InvalidType(format!(
            "COMM declares {} channels of {} bits at {} Hz",
            num_channels, bits_per_sample, sample_rate
        )));
    }

    let bits_per_sample = bits_per_sample as u32;
    let encoding = if is_aifc {
        let compression = reader.read_fourcc()?;
        let name = reader.read_pascal_string()?;
        aifc_encoding(&compression, bits_per_sample, &name)?
    } else {
        Encoding::PCM_BE
    };

    let num_channels = num_channels as u32;
    let mut format = FormatInfo::linear(encoding, bits_per_sample, num_channels, sample_rate);
    format.set_identifiers(aiff_default_layout(num_channels));
    Ok((format, num_frames))
}

fn aifc_encoding(compression: &[u8; 4], bits_per_sample: u32, name: &str) -> Result<Encoding> {
    match compression {
        b"NONE" | b"twos" => Ok(Encoding::PCM_BE),
        b"sowt" => Ok(Encoding::PCM_LE),
        b"fl32" | b"FL32" if bits_per_sample == 32 => Ok(Encoding::FLOAT_BE),
        b"fl64" | b"FL64" if bits_per_sample == 64 => Ok(Encoding::FLOAT_BE),
        b"fl32" | b"FL32" | b"fl64" | b"FL64" => Err(ReaderError::InvalidType(format!(
            "{}-bit samples under {:?}",
            bits_per_sample,
            String::from_utf8_lossy(compression)
        ))),
        other => Err(ReaderError::UnsupportedType(format!(
            "AIFC compression {:?} ({})",
            String::from_utf8_lossy(other),
            name
        ))),
    }
}

pub(crate) fn read_metadata<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    parsed: &ParsedFile,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let sample_rate = parsed.format.sample_rate;

    walk_chunks(reader, &parsed.layout, parsed.main_end, |reader, header| {
        let ChunkId::FourCc(code) = header.id else {
            return Ok(Walk::Continue);
        };

        match &code {
            b"COMM" | b"FVER" | b"SSND" => {}
            b"MARK" => {
                if flags.cue_points {
                    read_mark(reader, sample_rate, meta)?;
                }
            }
            b"INST" => {
                if flags.sampler {
                    debug!("Skipping AIFF instrument chunk");
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

/// Marker ids are 1-based on disk and stored 0-based.
fn read_mark<S: Read + Seek>(reader: &mut ByteReader<S>, sample_rate: f64, meta: &mut MetaData) -> Result<()> {
    let count = reader.read_u16()?;

    for _ in 0..count {
        let id = reader.read_i16()?;
        let position = reader.read_u32()?;
        let label = reader.read_pascal_string()?;

        let id = u32::from(id.max(0) as u16).saturating_sub(1);
        let mut cue = CuePoint::new(id, f64::from(position) / sample_rate);
        if !label.is_empty() {
            cue.set_label(Some(label));
        }
        meta.add_cue_point(cue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_aifc_encodings() {
        assert_eq!(aifc_encoding(b"sowt", 16, "").unwrap(), Encoding::PCM_LE);
        assert_eq!(aifc_encoding(b"twos", 24, "").unwrap(), Encoding::PCM_BE);
        assert_eq!(aifc_encoding(b"fl64", 64, "").unwrap(), Encoding::FLOAT_BE);
        assert!(matches!(
            aifc_encoding(b"fl32", 16, ""),
            Err(ReaderError::InvalidType(_))
        ));
        assert!(matches!(
            aifc_encoding(b"ima4", 16, "IMA 4:1"),
            Err(ReaderError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_mark_ids_are_zero_based() {
        let mut payload = 2u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&5i16.to_be_bytes());
        payload.extend_from_slice(&22050u32.to_be_bytes());
        payload.extend_from_slice(&[3, b'o', b'n', b'e']);
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&[0, 0]);

        let mut reader = ByteReader::new(Cursor::new(payload)).unwrap();
        reader.set_big_endian(true);
        let mut meta = MetaData::new();
        read_mark(&mut reader, 44100.0, &mut meta).unwrap();

        let cues = meta.cue_points();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].id(), 4);
        assert_eq!(cues[0].position(), 0.5);
        assert_eq!(cues[0].label(), Some("one"));
        assert_eq!(cues[1].id(), 0);
        assert_eq!(cues[1].label(), None);
    }
}
