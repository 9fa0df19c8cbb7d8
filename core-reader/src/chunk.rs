//! # Chunk Walker
//!
//! Iteration over tagged, length-prefixed chunks.
//!
//! Every container this crate reads is a sequence of `(id, length, payload)`
//! records after a short outer header. Only three things vary between them,
//! and [`ContainerLayout`] captures all three:
//!
//! - the id is a four-char code, or a 16-byte GUID for Wave64
//! - the length field is 4 or 8 bytes wide, and a Wave64 length counts its
//!   own header
//! - payloads are padded to an alignment of 2 (RIFF, AIFF), 8 (Wave64) or
//!   left unpadded (CAF)
//!
//! After every handler the walker seeks to the computed chunk end, so a
//! handler may consume less (or more) than the declared length without
//! desynchronizing the walk.

use std::fmt;
use std::io::{Read, Seek};

use core_metadata::BlockId;
use tracing::trace;
use uuid::Uuid;

use crate::error::{ReaderError, Result};
use crate::stream::ByteReader;

/// A chunk identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkId {
    FourCc([u8; 4]),
    Guid(Uuid),
}

impl ChunkId {
    pub const fn fourcc(code: &[u8; 4]) -> Self {
        ChunkId::FourCc(*code)
    }

    pub fn to_block_id(self) -> BlockId {
        match self {
            ChunkId::FourCc(code) => BlockId::FourCc(code),
            ChunkId::Guid(guid) => BlockId::Guid(guid),
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkId::FourCc(code) => write!(f, "'{}'", String::from_utf8_lossy(code)),
            ChunkId::Guid(guid) => write!(f, "{{{}}}", guid),
        }
    }
}

/// Header geometry of one container family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    pub guid_ids: bool,
    /// Width of the length field: 4 or 8 bytes.
    pub length_size: u8,
    /// Wave64 lengths include the 24-byte chunk header.
    pub length_includes_header: bool,
    pub alignment: u64,
    /// Padding chunks that are never reported to handlers.
    pub junk: Option<ChunkId>,
}

impl ContainerLayout {
    pub const RIFF: Self = Self {
        guid_ids: false,
        length_size: 4,
        length_includes_header: false,
        alignment: 2,
        junk: Some(ChunkId::fourcc(b"JUNK")),
    };

    pub const AIFF: Self = Self {
        guid_ids: false,
        length_size: 4,
        length_includes_header: false,
        alignment: 2,
        junk: None,
    };

    pub const CAF: Self = Self {
        guid_ids: false,
        length_size: 8,
        length_includes_header: false,
        alignment: 1,
        junk: Some(ChunkId::fourcc(b"free")),
    };

    pub const W64: Self = Self {
        guid_ids: true,
        length_size: 8,
        length_includes_header: true,
        alignment: 8,
        junk: Some(ChunkId::Guid(crate::iff::w64::JUNK_GUID)),
    };

    pub fn header_len(&self) -> u64 {
        (if self.guid_ids { 16 } else { 4 }) + u64::from(self.length_size)
    }

    fn align(&self, len: u64) -> u64 {
        match self.alignment {
            0 | 1 => len,
            a => len.div_ceil(a) * a,
        }
    }
}

/// A decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    /// Payload length; `None` when the container declares it unbounded.
    pub len: Option<u64>,
    /// Offset of the first payload byte.
    pub data_pos: u64,
    /// Offset of the next chunk header; `None` for an unbounded chunk.
    pub end: Option<u64>,
}

impl ChunkHeader {
    /// Payload length, limited to what the stream physically holds.
    pub fn available_len<S: Read + Seek>(&self, reader: &ByteReader<S>) -> Option<u64> {
        let physical = reader.length().map(|len| len.saturating_sub(self.data_pos));
        match (self.len, physical) {
            (Some(len), Some(physical)) => Some(len.min(physical)),
            (Some(len), None) => Some(len),
            (None, physical) => physical,
        }
    }
}

/// Reads one chunk header at the current position.
pub fn read_chunk_header<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    layout: &ContainerLayout,
) -> Result<ChunkHeader> {
    let id = if layout.guid_ids {
        ChunkId::Guid(reader.read_guid()?)
    } else {
        ChunkId::FourCc(reader.read_fourcc()?)
    };

    let raw_len = if layout.length_size == 8 {
        reader.read_i64()?
    } else {
        i64::from(reader.read_u32()?)
    };

    let len = if raw_len < 0 {
        None
    } else if layout.length_includes_header {
        Some((raw_len as u64).saturating_sub(layout.header_len()))
    } else {
        Some(raw_len as u64)
    };

    let data_pos = reader.position();
    let end = len.map(|len| data_pos.saturating_add(layout.align(len)));

    Ok(ChunkHeader {
        id,
        len,
        data_pos,
        end,
    })
}

/// What the walker does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// End the walk, leaving the reader wherever the handler left it.
    Stop,
}

/// Walks chunks from the current position to `main_end` (or physical EOF),
/// calling `visit` for every non-junk chunk.
///
/// Handler errors end the walk and are returned. A truncated header
/// terminates the walk normally.
pub fn walk_chunks<S, F>(
    reader: &mut ByteReader<S>,
    layout: &ContainerLayout,
    main_end: Option<u64>,
    mut visit: F,
) -> Result<()>
where
    S: Read + Seek,
    F: FnMut(&mut ByteReader<S>, &ChunkHeader) -> Result<Walk>,
{
    loop {
        if main_end.is_some_and(|end| reader.position() >= end) || reader.is_eof() {
            return Ok(());
        }

        let header = match read_chunk_header(reader, layout) {
            Ok(header) => header,
            Err(err) if err.is_eof() => return Ok(()),
            Err(err) => return Err(err),
        };

        trace!(id = %header.id, len = ?header.len, pos = header.data_pos, "Chunk");

        if Some(header.id) != layout.junk && visit(reader, &header)? == Walk::Stop {
            return Ok(());
        }

        match header.end {
            Some(end) => {
                if reader.length().is_some_and(|len| end >= len) {
                    return Ok(());
                }
                reader.seek_to(end)?;
            }
            None => return Ok(()),
        }
    }
}

/// Positions the reader at the payload of the first chunk with `id`.
pub fn seek_chunk<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    layout: &ContainerLayout,
    main_end: Option<u64>,
    id: ChunkId,
) -> Result<ChunkHeader> {
    let mut found = None;

    walk_chunks(reader, layout, main_end, |_, header| {
        if header.id == id {
            found = Some(*header);
            return Ok(Walk::Stop);
        }
        Ok(Walk::Continue)
    })?;

    match found {
        Some(header) => {
            reader.seek_to(header.data_pos)?;
            Ok(header)
        }
        None => Err(ReaderError::ChunkNotFound(id.to_string())),
    }
}
