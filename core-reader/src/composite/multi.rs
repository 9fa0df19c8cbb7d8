//! Multi composite: an array of opened files, a producer queue, or a
//! next-function, behind one reader.
//!
//! The queue is the only source fed from another thread. A
//! [`QueueSender`] pushes readers or unopened streams; the reading side pops
//! at most one item each time the current source runs out and never
//! blocks. An empty queue reads as end of data until something new arrives.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use core_metadata::MetaData;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, instrument};

use super::array::ArraySequence;
use super::custom::{CustomSequence, CustomSource};
use super::selection::{SelectionPolicy, Selector};
use super::{share, CompositeCore, SourceSequence};
use crate::config::ReaderConfig;
use crate::dispatch::{open_path, open_stream};
use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{AudioFileReader, BoxedReader, FileFormat, FramesRead};
use crate::stream::NamedStream;

/// Something a producer hands to a queue-backed [`MultiReader`].
pub enum QueueItem {
    Reader(BoxedReader),
    /// Opened on the reading side when popped.
    Stream(NamedStream),
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueItem::Reader(reader) => f.debug_tuple("Reader").field(&reader.name()).finish(),
            QueueItem::Stream(stream) => f.debug_tuple("Stream").field(&stream.name).finish(),
        }
    }
}

/// Producer handle of a queue-backed [`MultiReader`].
#[derive(Debug)]
pub struct QueueSender {
    tx: Sender<QueueItem>,
}

impl QueueSender {
    /// Queues `item` without blocking. A full queue hands the item back.
    pub fn push(&self, item: QueueItem) -> std::result::Result<(), TrySendError<QueueItem>> {
        self.tx.try_send(item)
    }

    pub fn push_reader(&self, reader: BoxedReader) -> std::result::Result<(), TrySendError<QueueItem>> {
        self.push(QueueItem::Reader(reader))
    }

    pub fn push_stream(&self, stream: NamedStream) -> std::result::Result<(), TrySendError<QueueItem>> {
        self.push(QueueItem::Stream(stream))
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }
}

type ReleaseHook = Box<dyn FnMut(BoxedReader) + Send>;

pub(crate) struct QueueSequence {
    rx: Receiver<QueueItem>,
    current: Option<BoxedReader>,
    generation: usize,
    release: Option<ReleaseHook>,
    config: ReaderConfig,
}

impl QueueSequence {
    fn retire(&mut self, reader: BoxedReader) {
        match self.release.as_mut() {
            Some(release) => release(reader),
            None => drop(reader),
        }
    }
}

impl SourceSequence for QueueSequence {
    fn advance(&mut self) -> Result<()> {
        let item = match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        };

        if let Some(previous) = self.current.take() {
            self.retire(previous);
        }

        let reader = match item {
            None => return Ok(()),
            Some(QueueItem::Reader(reader)) => reader,
            Some(QueueItem::Stream(stream)) => open_stream(stream, &self.config)?,
        };

        debug!(name = reader.name(), "Popped queued source");
        self.generation = self.generation.wrapping_add(1);
        self.current = Some(reader);
        Ok(())
    }

    fn with_current<R>(&mut self, f: impl FnOnce(&mut dyn AudioFileReader) -> R) -> Option<R> {
        self.current.as_mut().map(|reader| f(reader.as_mut()))
    }

    fn current_token(&self) -> Option<usize> {
        self.current.as_ref().map(|_| self.generation)
    }

    fn release_current(&mut self) {
        if let Some(previous) = self.current.take() {
            self.retire(previous);
        }
    }
}

/// Object-safe view of a [`CompositeCore`], whatever its sequence.
trait MultiSource: Send {
    fn format_info(&self) -> &FormatInfo;
    fn name(&self) -> &str;
    fn metadata(&self) -> Option<Arc<MetaData>>;
    fn read(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead>;
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);
}

impl<S: SourceSequence> MultiSource for CompositeCore<S> {
    fn format_info(&self) -> &FormatInfo {
        CompositeCore::format_info(self)
    }

    fn name(&self) -> &str {
        CompositeCore::name(self)
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        CompositeCore::metadata(self)
    }

    fn read(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        CompositeCore::read(self, num_frames, data, convert_byte_order)
    }

    fn rewind(&mut self) -> Result<()> {
        CompositeCore::rewind(self)
    }

    fn close(&mut self) {
        CompositeCore::close(self)
    }
}

/// Plays several sources as one stream.
///
/// Array-backed multis restart at frame 0 under the sequence policies;
/// queue and next-function multis cannot seek.
pub struct MultiReader {
    inner: Box<dyn MultiSource>,
}

impl MultiReader {
    /// Opens every stream up front; the first failure aborts.
    #[instrument(skip_all, fields(count = streams.len(), ?policy))]
    pub fn open_streams(streams: Vec<NamedStream>, policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let readers = streams
            .into_iter()
            .map(|stream| open_stream(stream, config))
            .collect::<Result<Vec<_>>>()?;
        Self::from_readers(readers, policy, config)
    }

    /// Opens every path up front; the first failure aborts.
    #[instrument(skip_all, fields(?policy))]
    pub fn open_paths<P: AsRef<Path>>(paths: &[P], policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let readers = paths
            .iter()
            .map(|path| open_path(path, config))
            .collect::<Result<Vec<_>>>()?;
        Self::from_readers(readers, policy, config)
    }

    /// Owns `readers` and closes them with the multi.
    pub fn from_readers(readers: Vec<BoxedReader>, policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let selector = Selector::from_config(policy, config);
        let sources = readers.into_iter().map(share).collect();
        let core = CompositeCore::new(ArraySequence::new(sources, true, selector))?;
        Ok(Self { inner: Box::new(core) })
    }

    /// Queue-backed multi holding at most `capacity` pending items.
    pub fn with_queue(capacity: usize, config: &ReaderConfig) -> Result<(Self, QueueSender)> {
        Self::build_queue(capacity, None, config)
    }

    /// Like [`MultiReader::with_queue`]; retired readers go to `release`
    /// instead of being dropped on the reading thread.
    pub fn with_queue_and_release(
        capacity: usize,
        release: impl FnMut(BoxedReader) + Send + 'static,
        config: &ReaderConfig,
    ) -> Result<(Self, QueueSender)> {
        Self::build_queue(capacity, Some(Box::new(release)), config)
    }

    fn build_queue(capacity: usize, release: Option<ReleaseHook>, config: &ReaderConfig) -> Result<(Self, QueueSender)> {
        config.validate()?;
        if capacity == 0 {
            return Err(ReaderError::Config("queue capacity must be non-zero".to_string()));
        }

        let (tx, rx) = bounded(capacity);
        let sequence = QueueSequence {
            rx,
            current: None,
            generation: 0,
            release,
            config: config.clone(),
        };
        let core = CompositeCore::new(sequence)?;
        Ok((Self { inner: Box::new(core) }, QueueSender { tx }))
    }

    /// Multi driven by a next-function.
    pub fn with_next(next: impl CustomSource + 'static) -> Result<Self> {
        let core = CompositeCore::new(CustomSequence::new(Box::new(next)))?;
        Ok(Self { inner: Box::new(core) })
    }
}

impl AudioFileReader for MultiReader {
    fn format_info(&self) -> &FormatInfo {
        self.inner.format_info()
    }

    fn num_frames(&self) -> i64 {
        -1
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.inner.metadata()
    }

    fn file_format(&self) -> FileFormat {
        FileFormat::Multi
    }

    fn is_positionable(&self) -> bool {
        false
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        self.inner.read(num_frames, data, convert_byte_order)
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        if frame != 0 {
            return Err(ReaderError::SeekFailed(format!(
                "multi readers only restart at 0, not {}",
                frame
            )));
        }
        self.inner.rewind()
    }

    fn frame_position(&mut self) -> Result<i64> {
        Err(ReaderError::SeekFailed(
            "multi readers have no frame position".to_string(),
        ))
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
