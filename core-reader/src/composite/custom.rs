//! Custom composite: the caller decides which reader plays next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_metadata::MetaData;
use tracing::instrument;

use super::{CompositeCore, SourceSequence};
use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{AudioFileReader, BoxedReader, FileFormat, FramesRead};

/// Caller-supplied next-strategy.
///
/// Any `FnMut(Option<BoxedReader>) -> Result<Option<BoxedReader>>` closure
/// is a `CustomSource` that cannot seek.
pub trait CustomSource: Send {
    /// Takes the reader that just ran out (if any) and returns the one to
    /// play next. `None` ends the stream.
    ///
    /// Returning `current` again keeps playing it from wherever it is.
    fn next(&mut self, current: Option<BoxedReader>) -> Result<Option<BoxedReader>>;

    fn is_positionable(&self) -> bool {
        false
    }

    /// Moves to `frame` of the stream, positioning or replacing `current`.
    fn set_frame_position(&mut self, current: &mut Option<BoxedReader>, frame: i64) -> Result<()> {
        let _ = (current, frame);
        Err(ReaderError::SeekFailed(
            "custom source is not positionable".to_string(),
        ))
    }

    fn frame_position(&mut self, current: &mut Option<BoxedReader>) -> Result<i64> {
        let _ = current;
        Err(ReaderError::SeekFailed(
            "custom source has no frame position".to_string(),
        ))
    }
}

impl<F> CustomSource for F
where
    F: FnMut(Option<BoxedReader>) -> Result<Option<BoxedReader>> + Send,
{
    fn next(&mut self, current: Option<BoxedReader>) -> Result<Option<BoxedReader>> {
        self(current)
    }
}

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// A reader stamped with the identity it had when it was handed out.
///
/// Heap addresses are reused once a next-strategy drops the old reader, so
/// they cannot tell a returned reader from a fresh one.
struct TaggedReader {
    tag: u64,
    inner: BoxedReader,
}

impl AudioFileReader for TaggedReader {
    fn format_info(&self) -> &FormatInfo {
        self.inner.format_info()
    }

    fn num_frames(&self) -> i64 {
        self.inner.num_frames()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.inner.metadata()
    }

    fn file_format(&self) -> FileFormat {
        self.inner.file_format()
    }

    fn is_positionable(&self) -> bool {
        self.inner.is_positionable()
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        self.inner.read_frames(num_frames, data, convert_byte_order)
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        self.inner.set_frame_position(frame)
    }

    fn frame_position(&mut self) -> Result<i64> {
        self.inner.frame_position()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn source_tag(&self) -> Option<u64> {
        Some(self.tag)
    }
}

pub(crate) struct CustomSequence {
    source: Box<dyn CustomSource>,
    current: Option<BoxedReader>,
    /// Tag of `current`; 0 when there is none.
    tag: u64,
}

impl CustomSequence {
    pub(crate) fn new(source: Box<dyn CustomSource>) -> Self {
        Self {
            source,
            current: None,
            tag: 0,
        }
    }

    /// Stamps `current` unless it already carries a tag from an earlier
    /// hand-out.
    fn retag(&mut self) {
        let Some(reader) = self.current.take() else {
            self.tag = 0;
            return;
        };

        if let Some(tag) = reader.source_tag() {
            self.tag = tag;
            self.current = Some(reader);
            return;
        }

        let tag = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
        self.tag = tag;
        self.current = Some(Box::new(TaggedReader { tag, inner: reader }));
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        let result = self.source.set_frame_position(&mut self.current, frame);
        self.retag();
        result
    }
}

impl SourceSequence for CustomSequence {
    fn advance(&mut self) -> Result<()> {
        let previous = self.current.take();
        self.current = self.source.next(previous)?;
        self.retag();
        Ok(())
    }

    fn with_current<R>(&mut self, f: impl FnOnce(&mut dyn AudioFileReader) -> R) -> Option<R> {
        self.current.as_mut().map(|reader| f(reader.as_mut()))
    }

    fn current_token(&self) -> Option<usize> {
        self.current.as_ref().map(|_| self.tag as usize)
    }

    fn release_current(&mut self) {
        self.current = None;
        self.tag = 0;
    }
}

/// Plays whatever a [`CustomSource`] hands out.
pub struct CustomReader {
    core: CompositeCore<CustomSequence>,
    positionable: bool,
}

impl CustomReader {
    /// Asks `source` for the first reader straight away.
    #[instrument(skip_all)]
    pub fn new(source: impl CustomSource + 'static) -> Result<Self> {
        let positionable = source.is_positionable();
        let core = CompositeCore::new(CustomSequence::new(Box::new(source)))?;
        Ok(Self { core, positionable })
    }
}

impl AudioFileReader for CustomReader {
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
        FileFormat::Custom
    }

    fn is_positionable(&self) -> bool {
        self.positionable
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        self.core.read(num_frames, data, convert_byte_order)
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        self.core.reposition(|sequence| sequence.set_frame_position(frame))
    }

    fn frame_position(&mut self) -> Result<i64> {
        let sequence = &mut self.core.sources;
        sequence.source.frame_position(&mut sequence.current)
    }

    fn close(&mut self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::testing::MemoryReader;
    use crate::reader::ReadStatus;
    use mockall::{mock, Sequence};

    mock! {
        pub Source {}

        impl CustomSource for Source {
            fn next(&mut self, current: Option<BoxedReader>) -> Result<Option<BoxedReader>>;
            fn is_positionable(&self) -> bool;
            fn set_frame_position(&mut self, current: &mut Option<BoxedReader>, frame: i64) -> Result<()>;
            fn frame_position(&mut self, current: &mut Option<BoxedReader>) -> Result<i64>;
        }
    }

    #[test]
    fn test_closure_source_plays_then_ends() {
        let mut remaining = vec![MemoryReader::boxed("b", 2, 2), MemoryReader::boxed("a", 2, 1)];
        let mut reader = CustomReader::new(move |_current: Option<BoxedReader>| -> Result<Option<BoxedReader>> {
            Ok(remaining.pop())
        })
        .unwrap();
        assert_eq!(reader.name(), "a");
        assert!(!reader.is_positionable());

        let mut buffer = [0u8; 8];
        let read = reader.read_frames(8, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::new(2, ReadStatus::FileChanged));
        assert_eq!(reader.name(), "b");

        let read = reader.read_frames(8, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::eof(2));
        assert_eq!(&buffer[..2], &[2, 2]);
        assert!(matches!(reader.set_frame_position(0), Err(ReaderError::SeekFailed(_))));
    }

    #[test]
    fn test_source_returning_current_keeps_playing_it() {
        let mut calls = 0;
        let source = move |current: Option<BoxedReader>| -> Result<Option<BoxedReader>> {
            calls += 1;
            Ok(match current {
                None if calls == 1 => Some(MemoryReader::boxed("only", 3, 5)),
                other => other.filter(|_| calls < 3),
            })
        };
        let mut reader = CustomReader::new(source).unwrap();

        let mut buffer = [0u8; 6];
        let read = reader.read_frames(6, &mut buffer, false).unwrap();
        // Same reader handed back at its end: nothing more to read from it.
        assert_eq!(read, FramesRead::eof(3));
    }

    #[test]
    fn test_replacement_reader_is_a_file_change() {
        let mut fills = vec![2u8, 1];
        let mut reader = CustomReader::new(move |current: Option<BoxedReader>| -> Result<Option<BoxedReader>> {
            // Free the finished reader before allocating its successor.
            drop(current);
            Ok(fills
                .pop()
                .map(|fill| MemoryReader::boxed(if fill == 1 { "one" } else { "two" }, 2, fill)))
        })
        .unwrap();
        assert_eq!(reader.name(), "one");

        let mut buffer = [0u8; 8];
        let read = reader.read_frames(8, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::new(2, ReadStatus::FileChanged));
        assert_eq!(reader.name(), "two");

        let read = reader.read_frames(8, &mut buffer, false).unwrap();
        assert_eq!(read, FramesRead::eof(2));
        assert_eq!(&buffer[..2], &[2, 2]);
    }

    #[test]
    fn test_alternating_kept_readers_report_each_switch() {
        let mut spare: Option<BoxedReader> = Some(MemoryReader::boxed("b", 1, 2));
        let mut first = Some(MemoryReader::boxed("a", 1, 1));
        let mut handed = 0;
        let mut reader = CustomReader::new(move |current: Option<BoxedReader>| -> Result<Option<BoxedReader>> {
            handed += 1;
            if handed > 4 {
                return Ok(None);
            }
            let next = match current {
                None => first.take(),
                Some(mut finished) => {
                    finished.set_frame_position(0)?;
                    std::mem::replace(&mut spare, Some(finished))
                }
            };
            Ok(next)
        })
        .unwrap();

        let mut buffer = [0u8; 2];
        let mut names = vec![reader.name().to_string()];
        for _ in 0..3 {
            let read = reader.read_frames(2, &mut buffer, false).unwrap();
            assert_eq!(read, FramesRead::new(1, ReadStatus::FileChanged));
            names.push(reader.name().to_string());
        }
        assert_eq!(names, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_next_error_ends_stream() {
        let mut source = MockSource::new();
        source.expect_is_positionable().return_const(false);
        let mut sequence = Sequence::new();
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(Some(MemoryReader::boxed("first", 1, 4))));
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|current| current.as_ref().map(|r| r.name()) == Some("first"))
            .returning(|_| Err(ReaderError::Decoder("broken".to_string())));

        let mut reader = CustomReader::new(source).unwrap();
        let mut buffer = [0u8; 4];
        assert_eq!(reader.read_frames(4, &mut buffer, false).unwrap(), FramesRead::eof(1));
        assert_eq!(buffer[0], 4);
    }

    #[test]
    fn test_next_memory_error_propagates() {
        let mut source = MockSource::new();
        source.expect_is_positionable().return_const(false);
        let mut sequence = Sequence::new();
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(Some(MemoryReader::boxed("first", 1, 4))));
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(ReaderError::Memory("out of memory".to_string())));

        let mut reader = CustomReader::new(source).unwrap();
        let mut buffer = [0u8; 4];
        assert!(matches!(
            reader.read_frames(4, &mut buffer, false),
            Err(ReaderError::Memory(_))
        ));
    }

    #[test]
    fn test_positioning_is_delegated() {
        let mut source = MockSource::new();
        source.expect_is_positionable().return_const(true);
        source
            .expect_next()
            .times(1)
            .returning(|_| Ok(Some(MemoryReader::boxed("seekable", 10, 1))));
        source
            .expect_set_frame_position()
            .withf(|_, frame| *frame == 4)
            .times(1)
            .returning(|current, frame| match current {
                Some(reader) => reader.set_frame_position(frame),
                None => Err(ReaderError::NotReady("no reader".to_string())),
            });
        source
            .expect_frame_position()
            .times(1)
            .returning(|current| match current {
                Some(reader) => reader.frame_position(),
                None => Ok(0),
            });

        let mut reader = CustomReader::new(source).unwrap();
        assert!(reader.is_positionable());
        reader.set_frame_position(4).unwrap();
        assert_eq!(reader.frame_position().unwrap(), 4);
    }
}
