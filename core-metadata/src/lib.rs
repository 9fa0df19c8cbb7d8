//! # Audio File Metadata Model
//!
//! Normalized metadata recovered from audio container files.
//!
//! ## Overview
//!
//! This crate holds the container-independent representation that every
//! format parser fills in:
//! - [`CuePoint`]: a named position marker in seconds
//! - [`Region`]: anchor/start/end cue points describing a range or loop
//! - [`MetaData`]: the owning aggregate of cue points, regions, loops,
//!   text tags, broadcast, sampler and instrument fields
//! - [`OpaqueBlock`]: raw chunks kept for lossless re-serialization
//! - [`comments`]: Vorbis-comment parsing and tag mapping shared by the Ogg
//!   codecs
//!
//! A cue point is either loose in [`MetaData`] or owned by exactly one
//! [`Region`]. Promoting a cue point goes through
//! [`MetaData::remove_cue_point`], which moves it out of the loose list.

pub mod comments;
pub mod cue_point;
pub mod error;
pub mod metadata;
pub mod opaque;
pub mod region;
pub mod text;

pub use cue_point::{CuePoint, CuePointExtra, CuePointType};
pub use error::{MetadataError, Result};
pub use metadata::{BroadcastInfo, InstrumentInfo, MetaData, SamplerInfo, TextTags};
pub use opaque::{BlockId, OpaqueBlock};
pub use region::{Region, RegionType};
