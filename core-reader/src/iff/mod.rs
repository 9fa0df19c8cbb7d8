//! # Single-File Backend
//!
//! Readers for the chunked uncompressed containers: RIFF/WAVE, AIFF, AIFC,
//! CAF and Wave64.
//!
//! Opening runs in three steps, each format module supplying the
//! container-specific parts:
//!
//! 1. parse the outer header and locate the format and data chunks
//!    (`parse` in each module), producing a [`ParsedFile`]
//! 2. derive the frame count from the data chunk length and stride
//! 3. optionally walk every chunk again for metadata (`read_metadata`),
//!    gated by [`MetadataFlags`]
//!
//! Frame access is then a plain seek/read over the data chunk.

pub mod aiff;
pub mod caf;
pub mod w64;
pub mod wav;

use std::io::{Read, Seek};
use std::sync::Arc;

use core_metadata::{MetaData, OpaqueBlock};
use core_runtime::logging::strip_path;
use tracing::{debug, instrument, warn};

use crate::chunk::{ChunkHeader, ContainerLayout};
use crate::config::{MetadataFlags, ReaderConfig};
use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{
    check_buffer, swap_byte_order, AudioFileReader, FileFormat, FramesRead,
};
use crate::stream::{ByteReader, MediaStream};

/// What a format module recovered from the outer header and the format
/// and data chunks.
#[derive(Debug, Clone)]
pub(crate) struct ParsedFile {
    pub file_format: FileFormat,
    pub format: FormatInfo,
    pub layout: ContainerLayout,
    /// First chunk header after the outer header.
    pub chunks_start: u64,
    /// End of the outer container, when declared.
    pub main_end: Option<u64>,
    pub data_pos: u64,
    /// Frame bytes in the data chunk; `None` when unbounded.
    pub data_len: Option<u64>,
    /// Frame count stated by the format chunk (AIFF `COMM`).
    pub declared_frames: Option<i64>,
}

impl ParsedFile {
    fn num_frames(&self) -> i64 {
        if let Some(frames) = self.declared_frames {
            return frames;
        }

        let bytes_per_frame = u64::from(self.format.bytes_per_frame);
        match self.data_len {
            Some(len) if bytes_per_frame > 0 => {
                if len % bytes_per_frame != 0 {
                    let err = ReaderError::DataChunkInvalid(format!(
                        "{} bytes is not a whole number of {}-byte frames",
                        len, bytes_per_frame
                    ));
                    warn!(error = %err, "Frame count truncated");
                }
                (len / bytes_per_frame) as i64
            }
            _ => -1,
        }
    }
}

/// Reads the payload of `header` as an opaque block.
///
/// The declared length is clamped to the bytes physically present.
pub(crate) fn read_opaque_block<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    header: &ChunkHeader,
) -> Result<OpaqueBlock> {
    let len = header.available_len(reader).unwrap_or(0);
    let len = usize::try_from(len)
        .map_err(|_| ReaderError::Memory(format!("{} byte chunk", len)))?;
    let bytes = reader.read_bytes(len)?;
    Ok(OpaqueBlock::new(header.id.to_block_id(), bytes))
}

/// A reader over one uncompressed container file.
pub struct IffReader {
    reader: Option<ByteReader<Box<dyn MediaStream>>>,
    format: FormatInfo,
    file_format: FileFormat,
    name: String,
    num_frames: i64,
    data_pos: u64,
    metadata: Option<Arc<MetaData>>,
}

impl IffReader {
    /// Opens `stream`, sniffing the container from its first four bytes.
    pub fn open(
        stream: Box<dyn MediaStream>,
        name: impl Into<String>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let mut reader = ByteReader::new(stream)?;
        let magic = reader.read_fourcc()?;
        Self::open_with_magic(reader, magic, name.into(), config)
    }

    /// Continues an open whose four magic bytes were already consumed.
    #[instrument(skip(reader, config), fields(name = %strip_path(&name)))]
    pub(crate) fn open_with_magic(
        mut reader: ByteReader<Box<dyn MediaStream>>,
        magic: [u8; 4],
        name: String,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let parsed = match &magic {
            b"RIFF" => wav::parse(&mut reader)?,
            b"FORM" => aiff::parse(&mut reader)?,
            b"caff" => caf::parse(&mut reader)?,
            b"riff" => w64::parse(&mut reader)?,
            other => {
                return Err(ReaderError::InvalidType(format!(
                    "unrecognized signature {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        let num_frames = parsed.num_frames();
        let metadata = read_metadata(&mut reader, &parsed, &config.metadata)?;

        reader.seek_to(parsed.data_pos)?;

        debug!(
            format = ?parsed.file_format,
            encoding = %parsed.format.encoding,
            channels = parsed.format.num_channels,
            sample_rate = parsed.format.sample_rate,
            num_frames,
            "Opened audio file"
        );

        Ok(Self {
            reader: Some(reader),
            format: parsed.format,
            file_format: parsed.file_format,
            name,
            num_frames,
            data_pos: parsed.data_pos,
            metadata,
        })
    }

    fn stream(&mut self) -> Result<&mut ByteReader<Box<dyn MediaStream>>> {
        self.reader
            .as_mut()
            .ok_or_else(|| ReaderError::NotReady(format!("{} is closed", self.name)))
    }
}

/// Runs the metadata pass, keeping whatever was recovered before a failure.
fn read_metadata<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    parsed: &ParsedFile,
    flags: &MetadataFlags,
) -> Result<Option<Arc<MetaData>>> {
    if !flags.any() {
        return Ok(None);
    }

    if !reader.is_positionable() {
        debug!("Skipping metadata on a non-positionable stream");
        return Ok(None);
    }

    let mut meta = MetaData::new();
    meta.source_format = Some(format!("{:?}", parsed.file_format).to_lowercase());

    reader.seek_to(parsed.chunks_start)?;

    let result = match parsed.file_format {
        FileFormat::Wav => wav::read_metadata(reader, parsed, flags, &mut meta),
        FileFormat::W64 => w64::read_metadata(reader, parsed, flags, &mut meta),
        FileFormat::Aiff | FileFormat::Aifc => aiff::read_metadata(reader, parsed, flags, &mut meta),
        FileFormat::Caf => caf::read_metadata(reader, parsed, flags, &mut meta),
        other => Err(ReaderError::Internal(format!("{:?} is not a chunked file", other))),
    };

    match result {
        Ok(()) => {}
        Err(err) if err.is_eof() => debug!("Metadata pass ended at end of file"),
        Err(err) if err.is_memory_error() => return Err(err),
        Err(err) => warn!(error = %err, "Metadata pass aborted"),
    }

    Ok(Some(Arc::new(meta)))
}

impl AudioFileReader for IffReader {
    fn format_info(&self) -> &FormatInfo {
        &self.format
    }

    fn num_frames(&self) -> i64 {
        self.num_frames
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.metadata.clone()
    }

    fn file_format(&self) -> FileFormat {
        self.file_format
    }

    fn is_positionable(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(ByteReader::is_positionable)
    }

    fn read_frames(
        &mut self,
        num_frames: usize,
        data: &mut [u8],
        convert_byte_order: bool,
    ) -> Result<FramesRead> {
        if self.reader.is_none() {
            return Ok(FramesRead::eof(0));
        }

        let bytes_per_frame = self.format.bytes_per_frame;
        check_buffer(num_frames, bytes_per_frame, data)?;

        let mut to_read = num_frames;
        if self.is_positionable() && self.num_frames >= 0 {
            let remaining = (self.num_frames - self.frame_position()?).max(0);
            to_read = to_read.min(remaining as usize);
        }

        if to_read == 0 || bytes_per_frame == 0 {
            return Ok(FramesRead::eof(0));
        }

        let stride = bytes_per_frame as usize;
        let bytes = &mut data[..to_read * stride];
        let stream = self.stream()?;
        let read = stream.read_some(bytes)?;
        let frames = read / stride;

        // Leave the stream on a frame boundary after a short read.
        let partial = (read % stride) as u64;
        if partial > 0 && stream.is_positionable() {
            let position = stream.position();
            stream.seek_to(position - partial)?;
        }

        if convert_byte_order {
            let width = self.format.bytes_per_sample() as usize;
            swap_byte_order(&mut bytes[..frames * stride], width)?;
        }

        Ok(if frames < num_frames {
            FramesRead::eof(frames)
        } else {
            FramesRead::ok(frames)
        })
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        if frame < 0 {
            return Err(ReaderError::InvalidFilePosition(frame));
        }

        let target = self
            .data_pos
            .checked_add((frame as u64).saturating_mul(u64::from(self.format.bytes_per_frame)))
            .ok_or(ReaderError::InvalidFilePosition(frame))?;

        let name = self.name.clone();
        let stream = self.stream()?;
        if !stream.is_positionable() {
            return Err(ReaderError::SeekFailed(format!("{} is not positionable", name)));
        }
        stream.seek_to(target)
    }

    fn frame_position(&mut self) -> Result<i64> {
        let data_pos = self.data_pos;
        let bytes_per_frame = u64::from(self.format.bytes_per_frame.max(1));
        let position = self.stream()?.position();
        Ok((position.saturating_sub(data_pos) / bytes_per_frame) as i64)
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(name = %strip_path(&self.name), "Closed audio file");
        }
    }
}
