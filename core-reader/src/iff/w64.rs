//! Sony Wave64 parsing.
//!
//! Wave64 is RIFF/WAVE with 16-byte GUID chunk ids and 64-bit lengths. The
//! `fmt ` and `data` payloads are identical to WAVE, so format parsing and
//! metadata handlers come from [`super::wav`].
//!
//! Standard chunk GUIDs embed the RIFF four-char code in their first field
//! followed by a fixed suffix, which is how metadata chunks are mapped back
//! onto the WAVE handlers.

use std::io::{Read, Seek};

use core_metadata::MetaData;
use uuid::Uuid;

use super::{read_opaque_block, wav, ParsedFile};
use crate::chunk::{walk_chunks, ChunkId, ContainerLayout, Walk};
use crate::config::MetadataFlags;
use crate::error::{ReaderError, Result};
use crate::reader::FileFormat;
use crate::stream::ByteReader;

pub const RIFF_GUID: Uuid = Uuid::from_u128(0x66666972_912e_11cf_a5d6_28db04c10000);
pub const WAVE_GUID: Uuid = Uuid::from_u128(0x65766177_acf3_11d3_8cd1_00c04f8edb8a);
pub const FMT_GUID: Uuid = Uuid::from_u128(0x20746d66_acf3_11d3_8cd1_00c04f8edb8a);
pub const DATA_GUID: Uuid = Uuid::from_u128(0x61746164_acf3_11d3_8cd1_00c04f8edb8a);
pub const JUNK_GUID: Uuid = Uuid::from_u128(0x6b6e756a_acf3_11d3_8cd1_00c04f8edb8a);

/// Returns the four-char code of a standard Wave64 chunk GUID.
pub fn guid_fourcc(guid: &Uuid) -> Option<[u8; 4]> {
    let bytes = guid.to_bytes_le();
    let suffix = WAVE_GUID.to_bytes_le();
    if bytes[4..] != suffix[4..] {
        return None;
    }
    Some([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Parses a Wave64 header whose first four bytes (`riff`) were consumed.
pub(crate) fn parse<S: Read + Seek>(reader: &mut ByteReader<S>) -> Result<ParsedFile> {
    reader.set_big_endian(false);

    let rest = reader.read_array::<12>()?;
    if rest[..] != RIFF_GUID.to_bytes_le()[4..] {
        return Err(ReaderError::InvalidType("not a Wave64 riff GUID".to_string()));
    }

    let riff_len = reader.read_u64()?;
    let form = reader.read_guid()?;
    if form != WAVE_GUID {
        return Err(ReaderError::InvalidType(format!("Wave64 form {}", form)));
    }

    let chunks_start = reader.position();
    let main_end = (riff_len > chunks_start).then_some(riff_len);

    let (format, data) = wav::locate_format_and_data(
        reader,
        &ContainerLayout::W64,
        main_end,
        ChunkId::Guid(FMT_GUID),
        ChunkId::Guid(DATA_GUID),
    )?;

    Ok(ParsedFile {
        file_format: FileFormat::W64,
        format,
        layout: ContainerLayout::W64,
        chunks_start,
        main_end,
        data_pos: data.data_pos,
        data_len: data.available_len(reader),
        declared_frames: None,
    })
}

pub(crate) fn read_metadata<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    parsed: &ParsedFile,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let sample_rate = parsed.format.sample_rate;

    walk_chunks(reader, &parsed.layout, parsed.main_end, |reader, header| {
        let code = match header.id {
            ChunkId::Guid(guid) => guid_fourcc(&guid),
            ChunkId::FourCc(code) => Some(code),
        };

        match code {
            Some(code) => wav::read_chunk(reader, header, &code, sample_rate, flags, meta)?,
            None if flags.custom => meta.add_block(read_opaque_block(reader, header)?),
            None => {}
        }
        Ok(Walk::Continue)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_fourcc() {
        assert_eq!(guid_fourcc(&FMT_GUID), Some(*b"fmt "));
        assert_eq!(guid_fourcc(&JUNK_GUID), Some(*b"junk"));
        assert_eq!(guid_fourcc(&RIFF_GUID), None);
    }

    #[test]
    fn test_guid_disk_order() {
        assert_eq!(&RIFF_GUID.to_bytes_le()[..4], b"riff");
        assert_eq!(&DATA_GUID.to_bytes_le()[..4], b"data");
    }
}
