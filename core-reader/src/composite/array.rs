//! Array composite: plays a list of readers under a [`SelectionPolicy`].

use std::sync::Arc;

use core_metadata::MetaData;
use tracing::{debug, instrument};

use super::selection::{SelectionPolicy, Selector};
use super::{share, CompositeCore, SharedReader, SourceSequence};
use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{AudioFileReader, BoxedReader, FileFormat, FramesRead};

/// Readers picked by a [`Selector`].
pub(crate) struct ArraySequence {
    sources: Vec<SharedReader>,
    owns: bool,
    selector: Selector,
    current: Option<usize>,
}

impl ArraySequence {
    pub(crate) fn new(sources: Vec<SharedReader>, owns: bool, selector: Selector) -> Self {
        Self {
            sources,
            owns,
            selector,
            current: None,
        }
    }
}

impl SourceSequence for ArraySequence {
    fn advance(&mut self) -> Result<()> {
        self.current = self.selector.next_index(self.sources.len());

        if let Some(index) = self.current {
            let mut reader = self.sources[index].lock();
            debug!(index, name = reader.name(), "Selected array source");
            if reader.is_positionable() {
                reader.set_frame_position(0)?;
            }
        }
        Ok(())
    }

    fn with_current<R>(&mut self, f: impl FnOnce(&mut dyn AudioFileReader) -> R) -> Option<R> {
        let index = self.current?;
        let mut reader = self.sources[index].lock();
        Some(f(reader.as_mut()))
    }

    fn current_token(&self) -> Option<usize> {
        self.current
    }

    fn release_current(&mut self) {
        self.current = None;
    }

    fn rewind(&mut self) -> Result<()> {
        if !self.selector.policy().is_sequence() {
            return Err(ReaderError::SeekFailed(
                "only sequence policies can restart".to_string(),
            ));
        }
        self.selector.set_index(-1);
        self.advance()
    }

    fn close(&mut self) {
        self.current = None;
        if self.owns {
            for source in &self.sources {
                source.lock().close();
            }
        }
    }
}

/// Reads an array of readers one after another, or in a random order.
///
/// Only frame position 0 is settable, and only under the sequence policies.
pub struct ArrayReader {
    core: CompositeCore<ArraySequence>,
}

impl ArrayReader {
    /// Takes ownership of `readers`; closing the array closes them.
    #[instrument(skip_all, fields(count = readers.len(), ?policy))]
    pub fn new(readers: Vec<BoxedReader>, policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        let sources = readers.into_iter().map(share).collect();
        Self::build(sources, true, policy, config)
    }

    /// Borrows `readers`; they stay open when the array closes.
    #[instrument(skip_all, fields(count = readers.len(), ?policy))]
    pub fn with_shared(readers: Vec<SharedReader>, policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        Self::build(readers, false, policy, config)
    }

    fn build(sources: Vec<SharedReader>, owns: bool, policy: SelectionPolicy, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let selector = Selector::from_config(policy, config);
        let core = CompositeCore::new(ArraySequence::new(sources, owns, selector))?;
        Ok(Self { core })
    }

    /// Index of the current source, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.core.sources.current
    }

    pub fn len(&self) -> usize {
        self.core.sources.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.sources.sources.is_empty()
    }
}

impl AudioFileReader for ArrayReader {
    fn format_info(&self) -> &FormatInfo {
        self.core.format_info()
    }

    fn num_frames(&self) -> i64 {
        -1
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.core.metadata()
    }

    fn file_format(&self) -> FileFormat {
        FileFormat::Array
    }

    fn is_positionable(&self) -> bool {
        false
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        self.core.read(num_frames, data, convert_byte_order)
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        if frame != 0 {
            return Err(ReaderError::SeekFailed(format!(
                "array readers only restart at 0, not {}",
                frame
            )));
        }
        self.core.rewind()
    }

    fn frame_position(&mut self) -> Result<i64> {
        Err(ReaderError::SeekFailed(
            "array readers have no frame position".to_string(),
        ))
    }

    fn close(&mut self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::testing::MemoryReader;
    use crate::format::Encoding;
    use crate::reader::ReadStatus;
    use std::sync::atomic::Ordering;

    fn config() -> ReaderConfig {
        ReaderConfig::default().with_random_seed(3)
    }

    fn singles(count: usize) -> Vec<BoxedReader> {
        (0..count)
            .map(|i| MemoryReader::boxed(&format!("src-{}", i), 1, i as u8))
            .collect()
    }

    #[test]
    fn test_sequence_once_reads_each_source_then_eof() {
        let mut reader = ArrayReader::new(singles(3), SelectionPolicy::SequenceOnce, &config()).unwrap();
        assert_eq!(reader.name(), "src-0");

        let mut buffer = [0u8; 8];
        let mut total = Vec::new();
        loop {
            let read = reader.read_frames(8, &mut buffer, false).unwrap();
            total.extend_from_slice(&buffer[..read.frames]);
            if read.is_eof() {
                break;
            }
            assert_eq!(read.status, ReadStatus::FileChanged);
        }

        assert_eq!(total, vec![0, 1, 2]);
        for _ in 0..3 {
            assert_eq!(reader.read_frames(8, &mut buffer, false).unwrap(), FramesRead::eof(0));
        }
        assert_eq!(reader.name(), "");
    }

    #[test]
    fn test_sequence_loop_wraps_without_eof() {
        let mut reader = ArrayReader::new(singles(2), SelectionPolicy::SequenceLoop, &config()).unwrap();
        let mut buffer = [0u8; 4];
        let mut seen = Vec::new();

        for _ in 0..8 {
            let read = reader.read_frames(4, &mut buffer, false).unwrap();
            assert!(!read.is_eof());
            seen.extend_from_slice(&buffer[..read.frames]);
        }
        assert_eq!(&seen[..4], &[0, 1, 0, 1]);
    }

    #[test]
    fn test_single_looping_source_fills_the_buffer() {
        let readers = vec![MemoryReader::boxed("tick", 3, 7)];
        let mut reader = ArrayReader::new(readers, SelectionPolicy::SequenceLoop, &config()).unwrap();

        let mut buffer = [0u8; 10];
        let read = reader.read_frames(10, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::ok(10));
        assert_eq!(buffer, [7; 10]);
    }

    #[test]
    fn test_empty_looping_sources_end() {
        let readers = vec![MemoryReader::boxed("silent", 0, 0)];
        let mut reader = ArrayReader::new(readers, SelectionPolicy::SequenceLoop, &config()).unwrap();
        let mut buffer = [0u8; 4];
        assert_eq!(reader.read_frames(4, &mut buffer, false).unwrap(), FramesRead::eof(0));
    }

    #[test]
    fn test_format_change_stops_the_read() {
        let stereo = FormatInfo::linear(Encoding::PCM_LE, 16, 2, 44100.0);
        let readers: Vec<BoxedReader> = vec![
            MemoryReader::boxed("mono", 2, 1),
            Box::new(MemoryReader::with_format("stereo", 2, 9, stereo.clone())),
        ];
        let mut reader = ArrayReader::new(readers, SelectionPolicy::SequenceOnce, &config()).unwrap();

        let mut buffer = [0u8; 16];
        let read = reader.read_frames(4, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::new(2, ReadStatus::FormatChanged));
        assert_eq!(&buffer[..2], &[1, 1]);
        assert_eq!(reader.format_info(), &stereo);
        assert_eq!(reader.name(), "stereo");

        let read = reader.read_frames(4, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::eof(2));
        assert_eq!(&buffer[..8], &[9; 8]);
    }

    #[test]
    fn test_restart_only_at_zero() {
        let mut reader = ArrayReader::new(singles(2), SelectionPolicy::SequenceOnce, &config()).unwrap();
        let mut buffer = [0u8; 4];
        while !reader.read_frames(4, &mut buffer, false).unwrap().is_eof() {}

        reader.set_frame_position(0).unwrap();
        assert_eq!(reader.current_index(), Some(0));
        let read = reader.read_frames(1, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::ok(1));
        assert_eq!(buffer[0], 0);

        assert!(matches!(reader.set_frame_position(5), Err(ReaderError::SeekFailed(_))));
        assert!(matches!(reader.frame_position(), Err(ReaderError::SeekFailed(_))));

        let mut random = ArrayReader::new(singles(2), SelectionPolicy::Random, &config()).unwrap();
        assert!(matches!(random.set_frame_position(0), Err(ReaderError::SeekFailed(_))));
    }

    #[test]
    fn test_close_respects_ownership() {
        let owned = MemoryReader::new("owned", 4, 0);
        let owned_flag = owned.closed.clone();
        let mut reader = ArrayReader::new(vec![Box::new(owned)], SelectionPolicy::SequenceOnce, &config()).unwrap();
        reader.close();
        assert!(owned_flag.load(Ordering::Acquire));

        let borrowed = MemoryReader::new("borrowed", 4, 0);
        let borrowed_flag = borrowed.closed.clone();
        let shared = share(Box::new(borrowed));
        let mut reader =
            ArrayReader::with_shared(vec![shared.clone()], SelectionPolicy::SequenceOnce, &config()).unwrap();
        reader.close();
        assert!(!borrowed_flag.load(Ordering::Acquire));

        let mut buffer = [0u8; 4];
        assert_eq!(reader.read_frames(4, &mut buffer, false).unwrap(), FramesRead::eof(0));
        assert_eq!(shared.lock().name(), "borrowed");
    }

    #[test]
    fn test_empty_array_has_default_format() {
        let reader = ArrayReader::new(Vec::new(), SelectionPolicy::SequenceOnce, &config()).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.format_info().num_channels, 1);
        assert_eq!(reader.format_info().bytes_per_frame, 1);
    }
}
