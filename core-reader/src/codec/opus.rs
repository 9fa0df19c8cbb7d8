//! # Ogg Opus Reader
//!
//! Demuxes Ogg pages with [`OggPacketReader`] and decodes through libopus.
//!
//! Granule positions count 48 kHz samples from the start of the stream,
//! including the `pre_skip` samples the encoder asks to discard. The reader
//! hides the pre-skip: frame 0 is the first sample after it, and the total
//! is the last page's granule minus the pre-skip.
//!
//! Seeking rescans page granules from the first audio page and decodes
//! forward from the nearest page ending at least 80 ms before the target,
//! dropping the pre-roll.

use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use core_metadata::comments::VorbisComments;
use core_metadata::MetaData;
use core_runtime::logging::strip_path;
use opus::{Channels, Decoder};
use tracing::{debug, error, instrument, warn};

use super::ogg::{find_prev_page_offset, read_page_header, OggPacket, OggPacketReader};
use super::ring_buffer::RingBuffer;
use super::vorbis::{build_metadata, drain_frames};
use crate::channels::simple_layout;
use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::format::{Encoding, FormatInfo};
use crate::reader::{check_buffer, swap_byte_order, AudioFileReader, FileFormat, FramesRead};
use crate::stream::MediaStream;

const HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const TAGS_MAGIC: &[u8; 8] = b"OpusTags";
const HEAD_LEN: usize = 19;

/// Rate every granule position is expressed in.
const GRANULE_RATE: u64 = 48_000;

/// Decode-ahead before a seek target (80 ms at 48 kHz).
const SEEK_PRE_ROLL: u64 = 3_840;

const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Fields of the `OpusHead` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusHead {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < HEAD_LEN || &packet[..8] != HEAD_MAGIC {
            return Err(ReaderError::InvalidType("not an OpusHead packet".to_string()));
        }

        let head = Self {
            version: packet[8],
            channels: packet[9],
            pre_skip: u16::from_le_bytes([packet[10], packet[11]]),
            input_sample_rate: u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]),
            output_gain: i16::from_le_bytes([packet[16], packet[17]]),
            mapping_family: packet[18],
        };

        // The high nibble is the major version; only 0 is defined.
        if head.version >> 4 != 0 {
            return Err(ReaderError::UnsupportedType(format!("Opus version {}", head.version)));
        }
        if head.mapping_family != 0 {
            return Err(ReaderError::UnsupportedType(format!(
                "Opus channel mapping family {}",
                head.mapping_family
            )));
        }
        if !(1..=2).contains(&head.channels) {
            return Err(ReaderError::InvalidType(format!(
                "Opus mapping family 0 with {} channels",
                head.channels
            )));
        }
        Ok(head)
    }
}

/// A reader over one Ogg Opus stream.
pub struct OpusReader {
    packets: Option<OggPacketReader<Box<dyn MediaStream>>>,
    decoder: Decoder,
    format: FormatInfo,
    name: String,
    num_frames: i64,
    metadata: Option<Arc<MetaData>>,
    serial: u32,
    pre_skip: u64,
    /// First page after the header packets.
    audio_start: u64,
    ring: RingBuffer,
    pcm: Vec<f32>,
    scratch: Vec<f32>,
    position: i64,
    /// Decoded frames to drop: pre-skip, or seek pre-roll.
    skip_frames: u64,
    /// A chained stream's `OpusTags` packet is still to come.
    expect_tags: bool,
    exhausted: bool,
}

impl OpusReader {
    /// Opens `stream`, which must be positioned at the first Ogg page.
    #[instrument(skip(stream, config), fields(name = %strip_path(&name)))]
    pub fn open(stream: Box<dyn MediaStream>, name: String, config: &ReaderConfig) -> Result<Self> {
        let sample_rate = config.opus_sample_rate;
        if !matches!(sample_rate, 8_000 | 12_000 | 16_000 | 24_000 | 48_000) {
            return Err(ReaderError::Config(format!(
                "libopus cannot decode at {} Hz",
                sample_rate
            )));
        }

        let mut packets = OggPacketReader::with_capacity(config.ogg_read_buffer_bytes, stream)?;

        let first = packets
            .next_packet()?
            .ok_or_else(|| ReaderError::InvalidType("empty Ogg stream".to_string()))?;
        let head = OpusHead::parse(&first.data)?;

        let tags = packets
            .next_packet()?
            .ok_or_else(|| ReaderError::UnexpectedEof("OpusTags packet".to_string()))?;
        if !tags.data.starts_with(TAGS_MAGIC) {
            return Err(ReaderError::InvalidType("OpusTags packet missing".to_string()));
        }
        if !packets.at_page_boundary() {
            return Err(ReaderError::InvalidType("audio data shares the OpusTags page".to_string()));
        }
        let audio_start = packets.position();

        let metadata = if config.metadata.any() {
            match VorbisComments::parse(&tags.data[TAGS_MAGIC.len()..]) {
                Ok(comments) => Some(build_metadata(&comments, &config.metadata)),
                Err(err) => {
                    warn!(error = %err, "Ignoring malformed Opus tags");
                    None
                }
            }
        } else {
            None
        };

        let channels = u32::from(head.channels);
        let decoder = Decoder::new(
            sample_rate,
            if channels == 1 { Channels::Mono } else { Channels::Stereo },
        )
        .map_err(|e| {
            error!("Failed to create Opus decoder: {}", e);
            ReaderError::Decoder(format!("Opus decoder: {}", e))
        })?;

        let (last_granule, stream_len) = last_granule(&mut packets, audio_start, first.serial)?;
        packets.seek_to_page(audio_start)?;

        let scale = |granule: u64| granule * u64::from(sample_rate) / GRANULE_RATE;
        let pre_skip = u64::from(head.pre_skip);
        let num_frames = match last_granule {
            Some(granule) => scale(granule.saturating_sub(pre_skip)) as i64,
            None => -1,
        };

        let mut format = FormatInfo {
            encoding: Encoding::FLOAT_LE,
            bits_per_sample: 32,
            bytes_per_frame: 4 * channels,
            num_channels: channels,
            sample_rate: f64::from(sample_rate),
            ..Default::default()
        };
        format.set_identifiers(simple_layout(channels));
        if let Some(seconds) = format.duration(num_frames).filter(|s| *s > 0.0) {
            let audio_bytes = stream_len.saturating_sub(audio_start) as f64;
            format.nominal_bit_rate = (audio_bytes * 8.0 / seconds).min(f64::from(u32::MAX)) as u32;
        }

        let capacity = config.opus_max_frames_per_packet * channels as usize;

        debug!(
            channels,
            pre_skip,
            input_sample_rate = head.input_sample_rate,
            num_frames,
            "Opened Ogg Opus stream"
        );

        Ok(Self {
            packets: Some(packets),
            decoder,
            format,
            name,
            num_frames,
            metadata,
            serial: first.serial,
            pre_skip,
            audio_start,
            ring: RingBuffer::new(capacity),
            pcm: vec![0.0; capacity],
            scratch: Vec::new(),
            position: 0,
            skip_frames: scale(pre_skip),
            expect_tags: false,
            exhausted: false,
        })
    }

    fn packets(&mut self) -> Result<&mut OggPacketReader<Box<dyn MediaStream>>> {
        self.packets
            .as_mut()
            .ok_or_else(|| ReaderError::NotReady(format!("{} is closed", self.name)))
    }

    fn granule_to_frames(&self, granule: u64) -> u64 {
        granule * self.format.sample_rate as u64 / GRANULE_RATE
    }

    /// Handles a packet from another logical stream. Returns `true` when it
    /// starts a compatible chained stream.
    fn switch_stream(&mut self, packet: &OggPacket) -> Result<bool> {
        if !packet.first_of_stream || !packet.data.starts_with(HEAD_MAGIC) {
            debug!(serial = packet.serial, "Skipping packet of another logical stream");
            return Ok(false);
        }

        let head = OpusHead::parse(&packet.data)?;
        if u32::from(head.channels) != self.format.num_channels {
            warn!(
                channels = head.channels,
                "Opus logical bitstream changed channel count"
            );
            return Err(ReaderError::InvalidType(format!(
                "Ogg Opus stream changed to {} channels",
                head.channels
            )));
        }

        debug!(serial = packet.serial, pre_skip = head.pre_skip, "Chained Opus stream");
        self.serial = packet.serial;
        self.skip_frames += self.granule_to_frames(u64::from(head.pre_skip));
        self.expect_tags = true;
        self.decoder.reset_state().map_err(|e| ReaderError::Decoder(e.to_string()))?;
        Ok(true)
    }

    fn decode_next_packet(&mut self) -> Result<bool> {
        let channels = self.format.num_channels as usize;
        let mut consecutive_errors = 0;

        loop {
            let Some(packet) = self.packets()?.next_packet()? else {
                debug!(position = self.position, "Reached end of Opus stream");
                return Ok(false);
            };

            if packet.serial != self.serial {
                self.switch_stream(&packet)?;
                continue;
            }
            if self.expect_tags {
                self.expect_tags = false;
                if packet.data.starts_with(TAGS_MAGIC) {
                    continue;
                }
            }

            let frames = match self.decoder.decode_float(&packet.data, &mut self.pcm, false) {
                Ok(frames) => frames,
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, err
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("Too many consecutive Opus decode errors");
                        return Err(ReaderError::Decoder(format!(
                            "Decoder failure after {} failed packets: {}",
                            MAX_CONSECUTIVE_ERRORS, err
                        )));
                    }
                    continue;
                }
            };

            let skipped = self.skip_frames.min(frames as u64);
            self.skip_frames -= skipped;
            let samples = &self.pcm[skipped as usize * channels..frames * channels];
            if samples.is_empty() {
                continue;
            }

            if self.ring.write(samples) < samples.len() {
                return Err(ReaderError::Decoder(format!(
                    "packet of {} frames exceeds the {}-frame decode buffer",
                    frames,
                    self.ring.capacity() / channels
                )));
            }
            return Ok(true);
        }
    }

    /// Offset and granule of the page to start decoding from so that
    /// `target` (a granule) lies at least the pre-roll ahead.
    fn find_seek_page(&mut self, target: u64) -> Result<(u64, u64)> {
        let wanted = target.saturating_sub(SEEK_PRE_ROLL);
        let serial = self.serial;
        let audio_start = self.audio_start;

        let packets = self.packets()?;
        packets.seek_to_page(audio_start)?;

        let mut start = (audio_start, 0);
        let mut boundary = None;
        loop {
            let offset = packets.position();
            let Some(header) = packets.next_page_header()? else {
                break;
            };

            if header.serial == serial {
                // A page may start decoding only if no packet spills into it.
                if let Some(granule) = boundary.take() {
                    if !header.is_continued() {
                        start = (offset, granule);
                    }
                }

                let granule = header.granule_position;
                if granule >= 0 && granule as u64 > wanted {
                    break;
                }
                if granule >= 0 {
                    boundary = Some(granule as u64);
                }
            }
            packets.skip_page_body(&header)?;
        }

        packets.seek_to_page(start.0)?;
        Ok(start)
    }
}

/// Scans back from the end of the stream for the last page of `serial`.
///
/// Returns its granule and the stream length; the granule is `None` when
/// the stream cannot be measured.
fn last_granule(
    packets: &mut OggPacketReader<Box<dyn MediaStream>>,
    audio_start: u64,
    serial: u32,
) -> Result<(Option<u64>, u64)> {
    let stream = packets.get_mut();
    let Ok(len) = stream.seek(SeekFrom::End(0)) else {
        return Ok((None, 0));
    };

    let mut from = len;
    while let Some(offset) = find_prev_page_offset(stream, from, audio_start)? {
        stream.seek(SeekFrom::Start(offset))?;
        match read_page_header(stream) {
            Ok(Some(header)) if header.serial == serial && header.granule_position >= 0 => {
                return Ok((Some(header.granule_position as u64), len));
            }
            Ok(_) => {}
            Err(err) if err.is_format_error() || err.is_eof() => {
                debug!(offset, error = %err, "Skipping false Ogg capture pattern");
            }
            Err(err) => return Err(err),
        }
        from = offset;
    }

    warn!("No granule position found in Opus stream");
    Ok((None, len))
}

impl AudioFileReader for OpusReader {
    fn format_info(&self) -> &FormatInfo {
        &self.format
    }

    fn num_frames(&self) -> i64 {
        self.num_frames
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<Arc<MetaData>> {
        self.metadata.clone()
    }

    fn file_format(&self) -> FileFormat {
        FileFormat::OggOpus
    }

    fn is_positionable(&self) -> bool {
        self.packets.is_some() && self.num_frames >= 0
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
        if self.packets.is_none() {
            return Ok(FramesRead::eof(0));
        }

        let stride = self.format.bytes_per_frame as usize;
        check_buffer(num_frames, self.format.bytes_per_frame, data)?;

        let channels = self.format.num_channels as usize;
        let mut produced = 0;

        while produced < num_frames && !self.exhausted {
            if self.ring.available() < channels && !self.decode_next_packet()? {
                self.exhausted = true;
                break;
            }

            produced += drain_frames(
                &mut self.ring,
                &mut self.scratch,
                channels,
                num_frames - produced,
                &mut data[produced * stride..],
            );
        }

        self.position += produced as i64;
        if convert_byte_order {
            swap_byte_order(&mut data[..produced * stride], 4)?;
        }

        Ok(if produced < num_frames {
            FramesRead::eof(produced)
        } else {
            FramesRead::ok(produced)
        })
    }

    fn set_frame_position(&mut self, frame: i64) -> Result<()> {
        if frame < 0 {
            return Err(ReaderError::InvalidFilePosition(frame));
        }
        if !self.is_positionable() {
            return Err(ReaderError::SeekFailed(format!("{} is not positionable", self.name)));
        }

        self.ring.clear();
        self.expect_tags = false;
        if frame >= self.num_frames {
            self.position = frame;
            self.exhausted = true;
            return Ok(());
        }

        let rate = self.format.sample_rate as u64;
        let target = frame as u64 * GRANULE_RATE / rate + self.pre_skip;
        let (offset, start_granule) = self.find_seek_page(target)?;
        self.decoder.reset_state().map_err(|e| ReaderError::Decoder(e.to_string()))?;

        self.skip_frames = self.granule_to_frames(target - start_granule);
        self.position = frame;
        self.exhausted = false;
        debug!(frame, offset, skip = self.skip_frames, "Seeked Opus stream");
        Ok(())
    }

    fn frame_position(&mut self) -> Result<i64> {
        Ok(self.position)
    }

    fn close(&mut self) {
        if self.packets.take().is_some() {
            self.exhausted = true;
            self.ring.clear();
            debug!(name = %strip_path(&self.name), "Closed Ogg Opus stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(channels: u8, family: u8) -> Vec<u8> {
        let mut packet = HEAD_MAGIC.to_vec();
        packet.push(1);
        packet.push(channels);
        packet.extend_from_slice(&312u16.to_le_bytes());
        packet.extend_from_slice(&44100u32.to_le_bytes());
        packet.extend_from_slice(&0i16.to_le_bytes());
        packet.push(family);
        packet
    }

    #[test]
    fn test_opus_head() {
        let parsed = OpusHead::parse(&head(2, 0)).unwrap();
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.input_sample_rate, 44100);
    }

    #[test]
    fn test_opus_head_rejections() {
        assert!(matches!(
            OpusHead::parse(&head(6, 1)),
            Err(ReaderError::UnsupportedType(_))
        ));
        assert!(matches!(
            OpusHead::parse(&head(3, 0)),
            Err(ReaderError::InvalidType(_))
        ));
        assert!(matches!(
            OpusHead::parse(b"\x01vorbis"),
            Err(ReaderError::InvalidType(_))
        ));

        let mut future = head(2, 0);
        future[8] = 0x10;
        assert!(matches!(
            OpusHead::parse(&future),
            Err(ReaderError::UnsupportedType(_))
        ));
    }
}
