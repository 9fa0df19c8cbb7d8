//! # Frame Source Contract
//!
//! The uniform interface every reader implements, single-file or composite.
//!
//! ## Reading
//!
//! [`AudioFileReader::read_frames`] copies up to `num_frames` interleaved
//! frames into the caller's byte buffer and returns how many it produced
//! together with a [`ReadStatus`]. End of data is a status, not an error:
//! once a reader is exhausted every call returns `(0, Eof)`.
//!
//! Composite readers may also return
//! [`ReadStatus::FormatChanged`], after which the caller must re-query
//! [`AudioFileReader::format_info`] before interpreting further frames, or
//! [`ReadStatus::FileChanged`] when the source switched but the frame format
//! did not. Frames copied before either signal are valid.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use core_reader::{open_path, ReaderConfig, ReadStatus};
//!
//! # fn main() -> core_reader::Result<()> {
//! let mut reader = open_path("take-3.wav", &ReaderConfig::default())?;
//! let stride = reader.format_info().bytes_per_frame as usize;
//! let mut buffer = vec![0u8; stride * 1024];
//!
//! loop {
//!     let read = reader.read_frames(1024, &mut buffer, false)?;
//!     // consume read.frames * stride bytes
//!     if read.status == ReadStatus::Eof {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use core_metadata::MetaData;
use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;

/// Container or reader kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Wav,
    Aiff,
    Aifc,
    Caf,
    W64,
    OggVorbis,
    OggOpus,
    Multi,
    Array,
    Custom,
    Region,
}

impl FileFormat {
    /// Returns `true` for readers that wrap other readers.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            FileFormat::Multi | FileFormat::Array | FileFormat::Custom | FileFormat::Region
        )
    }
}

/// Outcome of a [`AudioFileReader::read_frames`] call besides the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    Ok,
    /// No more frames; the count may still be non-zero.
    Eof,
    /// The frame format changed; re-query it before continuing.
    FormatChanged,
    /// The source changed, the frame format did not.
    FileChanged,
}

/// Frames produced by one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramesRead {
    pub frames: usize,
    pub status: ReadStatus,
}

impl FramesRead {
    pub const fn new(frames: usize, status: ReadStatus) -> Self {
        Self { frames, status }
    }

    pub const fn ok(frames: usize) -> Self {
        Self::new(frames, ReadStatus::Ok)
    }

    pub const fn eof(frames: usize) -> Self {
        Self::new(frames, ReadStatus::Eof)
    }

    pub fn is_eof(&self) -> bool {
        self.status == ReadStatus::Eof
    }
}

/// A stream of interleaved audio frames.
pub trait AudioFileReader: Send {
    fn format_info(&self) -> &FormatInfo;

    /// Total frames, or `-1` when unknown or unbounded.
    fn num_frames(&self) -> i64;

    fn name(&self) -> &str;

    fn metadata(&self) -> Option<Arc<MetaData>>;

    fn file_format(&self) -> FileFormat;

    fn is_positionable(&self) -> bool;

    /// Copies up to `num_frames` frames into `data`.
    ///
    /// `data` must hold `num_frames * bytes_per_frame` bytes. With
    /// `convert_byte_order` set, samples wider than one byte are swapped
    /// in place after the read.
    fn read_frames(
        &mut self,
        num_frames: usize,
        data: &mut [u8],
        convert_byte_order: bool,
    ) -> Result<FramesRead>;

    fn set_frame_position(&mut self, frame: i64) -> Result<()>;

    fn frame_position(&mut self) -> Result<i64>;

    /// Releases the backing resource. Later reads return `(0, Eof)`.
    fn close(&mut self) {}

    /// Identity a custom composite stamped on a reader it handed to its
    /// next-strategy. Plain readers have none.
    #[doc(hidden)]
    fn source_tag(&self) -> Option<u64> {
        None
    }
}

pub type BoxedReader = Box<dyn AudioFileReader>;

/// Checks that `data` can take `num_frames` frames of `bytes_per_frame`.
pub(crate) fn check_buffer(num_frames: usize, bytes_per_frame: u32, data: &[u8]) -> Result<usize> {
    let needed = num_frames
        .checked_mul(bytes_per_frame as usize)
        .ok_or_else(|| ReaderError::Internal(format!("{} frames overflow", num_frames)))?;

    if data.len() < needed {
        return Err(ReaderError::Internal(format!(
            "buffer of {} bytes cannot hold {} frames of {} bytes",
            data.len(),
            num_frames,
            bytes_per_frame
        )));
    }
    Ok(needed)
}

/// Reverses the byte order of every `width`-byte sample in `data`.
pub fn swap_byte_order(data: &mut [u8], width: usize) -> Result<()> {
    match width {
        0 | 1 => Ok(()),
        2 | 3 | 4 | 8 => {
            for sample in data.chunks_exact_mut(width) {
                sample.reverse();
            }
            Ok(())
        }
        other => Err(ReaderError::InvalidType(format!(
            "cannot swap {}-byte samples",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_byte_order() {
        let mut data = vec![1, 2, 3, 4, 5, 6];
        swap_byte_order(&mut data, 3).unwrap();
        assert_eq!(data, vec![3, 2, 1, 6, 5, 4]);

        let mut data = vec![1, 2, 3, 4];
        swap_byte_order(&mut data, 2).unwrap();
        assert_eq!(data, vec![2, 1, 4, 3]);

        assert!(swap_byte_order(&mut data, 5).is_err());
        swap_byte_order(&mut data, 1).unwrap();
        assert_eq!(data, vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_check_buffer() {
        assert_eq!(check_buffer(4, 6, &[0; 24]).unwrap(), 24);
        assert!(check_buffer(5, 6, &[0; 24]).is_err());
        assert!(check_buffer(usize::MAX, 6, &[]).is_err());
    }

    #[test]
    fn test_file_format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FileFormat::OggVorbis).unwrap(), "\"oggvorbis\"");
        assert!(FileFormat::Region.is_composite());
        assert!(!FileFormat::Caf.is_composite());
    }
}
