use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Truncated comment packet: {0}")]
    TruncatedComments(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
