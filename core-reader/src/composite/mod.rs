//! # Composite Readers
//!
//! Readers that stitch frames together from other readers.
//!
//! ## Overview
//!
//! [`ArrayReader`], [`MultiReader`] and [`CustomReader`] share one state
//! machine: hold a current inner reader, read from it, and when it runs
//! short ask a next-strategy for another one. The switch is reported in the
//! [`ReadStatus`]:
//!
//! - [`ReadStatus::FormatChanged`]: the new source has a different frame
//!   format. Reading stops so the caller can re-query the format.
//! - [`ReadStatus::FileChanged`]: the source changed, the format did not.
//! - [`ReadStatus::Eof`]: the next-strategy has nothing left.
//!
//! [`RegionReader`] is different: it exposes a window of one positionable
//! original reader.

pub mod array;
pub mod custom;
pub mod multi;
pub mod region;
pub mod selection;

pub use array::ArrayReader;
pub use custom::{CustomReader, CustomSource};
pub use multi::{MultiReader, QueueItem, QueueSender};
pub use region::RegionReader;
pub use selection::{SelectionPolicy, Selector};

use std::sync::Arc;

use core_metadata::MetaData;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{check_buffer, AudioFileReader, BoxedReader, FramesRead, ReadStatus};

/// A reader shared between a caller and the composites that borrow it.
pub type SharedReader = Arc<Mutex<BoxedReader>>;

/// Wraps a reader for use in borrowed arrays and regions.
pub fn share(reader: BoxedReader) -> SharedReader {
    Arc::new(Mutex::new(reader))
}

/// The next-strategy behind a composite.
pub(crate) trait SourceSequence: Send {
    /// Replaces the current source with the next one. Leaves no current
    /// source when the strategy is exhausted.
    fn advance(&mut self) -> Result<()>;

    fn with_current<R>(&mut self, f: impl FnOnce(&mut dyn AudioFileReader) -> R) -> Option<R>;

    /// Identity of the current source, stable until the next switch.
    fn current_token(&self) -> Option<usize>;

    fn release_current(&mut self);

    /// Restarts the strategy at its first source.
    fn rewind(&mut self) -> Result<()> {
        Err(ReaderError::SeekFailed(
            "source sequence cannot restart".to_string(),
        ))
    }

    fn close(&mut self) {
        self.release_current();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Same,
    FileChanged,
    FormatChanged,
    Exhausted,
}

/// State shared by the list-based composites.
pub(crate) struct CompositeCore<S> {
    pub(crate) sources: S,
    format: FormatInfo,
    name: String,
    metadata: Option<Arc<MetaData>>,
    token: Option<usize>,
    pending_format_change: bool,
    closed: bool,
}

impl<S: SourceSequence> CompositeCore<S> {
    /// Selects the first source and adopts its format without signalling.
    pub(crate) fn new(sources: S) -> Result<Self> {
        let mut core = Self {
            sources,
            format: FormatInfo::default(),
            name: String::new(),
            metadata: None,
            token: None,
            pending_format_change: false,
            closed: false,
        };

        core.advance_source()?;
        core.adopt();
        core.format.apply_default_if_invalid();
        Ok(core)
    }

    pub(crate) fn format_info(&self) -> &FormatInfo {
        &self.format
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn metadata(&self) -> Option<Arc<MetaData>> {
        self.metadata.clone()
    }

    /// Restarts the sequence; a format change is reported by the next read.
    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.reposition(|sources| sources.rewind())
    }

    /// Lets `f` move or replace the current source, then re-adopts it.
    pub(crate) fn reposition(&mut self, f: impl FnOnce(&mut S) -> Result<()>) -> Result<()> {
        if self.closed {
            return Err(ReaderError::NotReady("reader is closed".to_string()));
        }
        f(&mut self.sources)?;
        if self.adopt() == Transition::FormatChanged {
            self.pending_format_change = true;
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.sources.close();
            self.token = None;
            self.metadata = None;
            self.name.clear();
        }
    }

    pub(crate) fn read(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        if self.closed {
            return Ok(FramesRead::eof(0));
        }
        if std::mem::take(&mut self.pending_format_change) {
            return Ok(FramesRead::new(0, ReadStatus::FormatChanged));
        }

        if self.sources.current_token().is_none() {
            if !self.advance_source()? {
                self.adopt();
                return Ok(FramesRead::eof(0));
            }
            match self.adopt() {
                Transition::FormatChanged => return Ok(FramesRead::new(0, ReadStatus::FormatChanged)),
                Transition::Exhausted => return Ok(FramesRead::eof(0)),
                Transition::Same | Transition::FileChanged => {}
            }
        }

        check_buffer(num_frames, self.format.bytes_per_frame, data)?;

        let stride = self.format.bytes_per_frame as usize;
        let mut produced = 0;
        let mut empty_reads = 0;

        while produced < num_frames {
            let wanted = num_frames - produced;
            let out = &mut data[produced * stride..];
            let read = match self
                .sources
                .with_current(|reader| reader.read_frames(wanted, out, convert_byte_order))
            {
                Some(read) => read?,
                None => return Ok(FramesRead::eof(produced)),
            };
            produced += read.frames;

            // A nested composite switched its own source.
            if matches!(read.status, ReadStatus::FormatChanged | ReadStatus::FileChanged) {
                let status = match self.adopt() {
                    Transition::FormatChanged => ReadStatus::FormatChanged,
                    _ => ReadStatus::FileChanged,
                };
                return Ok(FramesRead::new(produced, status));
            }
            if produced == num_frames {
                break;
            }

            if read.frames == 0 {
                empty_reads += 1;
                if empty_reads >= 2 {
                    return Ok(FramesRead::eof(produced));
                }
            } else {
                empty_reads = 0;
            }

            debug!(source = %self.name, produced, "Composite source exhausted");
            if !self.advance_source()? {
                self.adopt();
                return Ok(FramesRead::eof(produced));
            }
            match self.adopt() {
                Transition::Same => {}
                Transition::FileChanged => return Ok(FramesRead::new(produced, ReadStatus::FileChanged)),
                Transition::FormatChanged => return Ok(FramesRead::new(produced, ReadStatus::FormatChanged)),
                Transition::Exhausted => return Ok(FramesRead::eof(produced)),
            }
        }

        Ok(FramesRead::ok(produced))
    }

    /// Returns whether a current source exists afterwards. Memory errors
    /// propagate; other next-strategy failures end the sequence.
    fn advance_source(&mut self) -> Result<bool> {
        match self.sources.advance() {
            Ok(()) => Ok(self.sources.current_token().is_some()),
            Err(err) if err.is_memory_error() => Err(err),
            Err(err) => {
                warn!(error = %err, "Next source failed, ending composite");
                self.sources.release_current();
                Ok(false)
            }
        }
    }

    fn adopt(&mut self) -> Transition {
        let token = self.sources.current_token();
        let snapshot = self
            .sources
            .with_current(|reader| (reader.format_info().clone(), reader.name().to_string(), reader.metadata()));

        let (Some(token), Some((format, name, metadata))) = (token, snapshot) else {
            self.token = None;
            self.name.clear();
            self.metadata = None;
            return Transition::Exhausted;
        };

        let format_changed = self.format.update_from(&format);
        let previous = self.token.replace(token);
        self.name = name;
        self.metadata = metadata;

        if format_changed {
            debug!(source = %self.name, "Composite frame format changed");
            Transition::FormatChanged
        } else if previous != Some(token) {
            debug!(source = %self.name, "Composite source changed");
            Transition::FileChanged
        } else {
            Transition::Same
        }
    }
}
