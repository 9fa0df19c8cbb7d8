//! # Reader Error Types
//!
//! Error taxonomy for opening and streaming audio files.
//!
//! End of data, frame-format changes and source changes are not errors; they
//! travel as [`ReadStatus`](crate::reader::ReadStatus) values next to the
//! frame count.

use thiserror::Error;

/// Errors that can occur while opening or reading an audio file.
#[derive(Error, Debug)]
pub enum ReaderError {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// An allocation sized by file contents could not be satisfied.
    #[error("Memory allocation failed: {0}")]
    Memory(String),

    // ========================================================================
    // Format Errors
    // ========================================================================
    /// Signature or sub-format not recognized.
    #[error("Invalid audio file type: {0}")]
    InvalidType(String),

    /// Recognized, but the variant is not implemented.
    #[error("Unsupported audio file type: {0}")]
    UnsupportedType(String),

    /// The data chunk length is not a whole number of frames.
    #[error("Invalid data chunk: {0}")]
    DataChunkInvalid(String),

    /// A required chunk is missing.
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    /// The stream ended inside a structure.
    #[error("Unexpected end of file: {0}")]
    UnexpectedEof(String),

    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// Frame access before the data position is known, or no current source.
    #[error("Reader not ready: {0}")]
    NotReady(String),

    /// The backend is not seekable or the target is unreachable.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// A byte position outside the stream was requested.
    #[error("Invalid file position: {0}")]
    InvalidFilePosition(i64),

    /// The compressed-audio decoder reported a failure.
    #[error("Decoder error: {0}")]
    Decoder(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Reader configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be decoded.
    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReaderError {
    /// Returns `true` if the stream is simply not of the expected format, so
    /// another parser or codec adapter may be tried.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ReaderError::InvalidType(_)
                | ReaderError::UnsupportedType(_)
                | ReaderError::ChunkNotFound(_)
        )
    }

    /// Returns `true` for allocation failures, which composites always propagate.
    pub fn is_memory_error(&self) -> bool {
        matches!(self, ReaderError::Memory(_))
    }

    /// Returns `true` if the error marks the end of the underlying bytes.
    pub fn is_eof(&self) -> bool {
        match self {
            ReaderError::UnexpectedEof(_) => true,
            ReaderError::Io(err) => err.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ReaderError::InvalidType("RIFX".into()).is_format_error());
        assert!(ReaderError::UnsupportedType("ima4".into()).is_format_error());
        assert!(!ReaderError::SeekFailed("pipe".into()).is_format_error());

        assert!(ReaderError::Memory("chunk".into()).is_memory_error());
        assert!(!ReaderError::NotReady("queue".into()).is_memory_error());
    }

    #[test]
    fn test_eof_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        assert!(ReaderError::Io(io).is_eof());
        assert!(ReaderError::UnexpectedEof("cue".into()).is_eof());
        assert!(!ReaderError::DataChunkInvalid("odd".into()).is_eof());
    }
}
