//! # Audio File Reader
//!
//! Opens audio container files and streams their frames as interleaved
//! bytes in a normalized format description.
//!
//! ## Overview
//!
//! This crate handles:
//! - Container dispatch by signature: WAV, AIFF/AIFC, CAF, Wave64 and
//!   Ogg (Vorbis, Opus)
//! - Chunk walking and per-container format and metadata parsing
//! - Compressed codec adapters decoding to 32-bit float
//! - Composite readers: arrays, queues, custom next-strategies and regions
//!
//! Every reader implements [`AudioFileReader`]. End of data and source
//! switches are [`ReadStatus`] values, not errors.
//!
//! ## Features
//!
//! - `vorbis` (default): Ogg Vorbis through Symphonia
//! - `opus`: Ogg Opus through the native libopus
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use core_reader::{open_path, ReaderConfig};
//!
//! # fn main() -> core_reader::Result<()> {
//! let reader = open_path("loop.aif", &ReaderConfig::full_metadata())?;
//! let format = reader.format_info();
//! println!(
//!     "{}: {} ch @ {} Hz, {} frames",
//!     reader.name(),
//!     format.num_channels,
//!     format.sample_rate,
//!     reader.num_frames()
//! );
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod chunk;
pub mod codec;
pub mod composite;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod iff;
pub mod reader;
pub mod stream;

pub use composite::{
    share, ArrayReader, CustomReader, CustomSource, MultiReader, QueueItem, QueueSender, RegionReader,
    SelectionPolicy, SharedReader,
};
pub use config::{MetadataFlags, ReaderConfig};
pub use dispatch::{open_path, open_stream};
pub use error::{ReaderError, Result};
pub use format::{ChannelLayout, Encoding, FormatInfo};
pub use iff::IffReader;
pub use reader::{AudioFileReader, BoxedReader, FileFormat, FramesRead, ReadStatus};
pub use stream::{MediaStream, NamedStream};
