//! Region reader: a frame window onto a positionable original reader.

use std::sync::Arc;

use core_metadata::{MetaData, Region};
use tracing::{debug, instrument};

use super::SharedReader;
use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;
use crate::reader::{check_buffer, AudioFileReader, FileFormat, FramesRead};

/// Exposes `[start, end)` of an original reader as a stream of its own.
///
/// Positions are local: frame 0 is the region start. The original is
/// repositioned before every read, so several regions may share it.
pub struct RegionReader {
    original: Option<SharedReader>,
    format: FormatInfo,
    name: String,
    metadata: Option<Arc<MetaData>>,
    start: i64,
    end: i64,
    anchor: i64,
    position: i64,
}

impl RegionReader {
    /// Region bounds are converted from seconds at the original's sample rate.
    #[instrument(skip_all, fields(region = region.id()))]
    pub fn new(original: SharedReader, region: &Region, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;

        let (format, original_name, metadata, total) = {
            let reader = original.lock();
            if !reader.is_positionable() {
                return Err(ReaderError::SeekFailed(format!(
                    "{} is not positionable",
                    reader.name()
                )));
            }
            (
                reader.format_info().clone(),
                reader.name().to_string(),
                reader.metadata(),
                reader.num_frames(),
            )
        };

        if format.sample_rate <= 0.0 {
            return Err(ReaderError::NotReady(format!(
                "{} has no sample rate",
                original_name
            )));
        }

        let to_frames = |seconds: f64| (seconds * format.sample_rate + 0.5) as i64;
        let mut start = to_frames(region.start_position()).max(0);
        let mut end = to_frames(region.end_position()).max(start);
        if total >= 0 {
            start = start.min(total);
            end = end.min(total);
        }
        let anchor = to_frames(region.anchor_position());

        let name = match region.label() {
            Some(label) => format!("{}{}{}", original_name, config.region_name_separator, label),
            None => original_name,
        };
        debug!(%name, start, end, "Opened region");

        Ok(Self {
            original: Some(original),
            format,
            name,
            metadata,
            start,
            end,
            anchor,
            position: 0,
        })
    }

    /// Start frame within the original.
    pub fn start_frame(&self) -> i64 {
        self.start
    }

    /// End frame within the original, exclusive.
    pub fn end_frame(&self) -> i64 {
        self.end
    }

    /// Anchor frame within the original.
    pub fn anchor_frame(&self) -> i64 {
        self.anchor
    }

    fn length(&self) -> i64 {
        self.end - self.start
    }
}

impl AudioFileReader for RegionReader {
    fn format_info(&self) -> &FormatInfo {
        &self.format
    }

    fn num_frames(&self) -> i64 {
        self.length()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.metadata.clone()
    }

    fn file_format(&self) -> FileFormat {
        FileFormat::Region
    }

    fn is_positionable(&self) -> bool {
        true
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        let Some(original) = self.original.as_ref() else {
            return Ok(FramesRead::eof(0));
        };

        let remaining = usize::try_from(self.length() - self.position).unwrap_or(0);
        let wanted = num_frames.min(remaining);
        if wanted == 0 {
            return Ok(FramesRead::eof(0));
        }
        check_buffer(wanted, self.format.bytes_per_frame, data)?;

        let read = {
            let mut reader = original.lock();
            reader.set_frame_position(self.start + self.position)?;
            reader.read_frames(wanted, data, convert_byte_order)?
        };
        self.position += read.frames as i64;

        if read.frames < num_frames {
            Ok(FramesRead::eof(read.frames))
        } else {
            Ok(FramesRead::ok(read.frames))
        }
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        self.position = frame.clamp(0, self.length());
        Ok(())
    }

    fn frame_position(&mut self) -> Result<i64> {
        Ok(self.position)
    }

    /// Drops this region's handle; the original stays open for its owner.
    fn close(&mut self) {
        self.original = None;
    }
}
