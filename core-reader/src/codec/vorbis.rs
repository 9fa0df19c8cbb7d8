//! # Ogg Vorbis Reader
//!
//! Decodes Ogg Vorbis through Symphonia's Ogg demuxer and Vorbis decoder.
//!
//! The identification and comment headers are read directly with
//! [`OggPacketReader`] first: the identification header carries the bit-rate
//! bounds Symphonia does not expose, and the comment header feeds the
//! metadata. The stream is then rewound and handed to Symphonia.
//!
//! Frames are emitted as 32-bit little-endian float.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use core_metadata::comments::{apply_comments, CommentMapping, VorbisComments};
use core_metadata::MetaData;
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_VORBIS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia_codec_vorbis::VorbisDecoder;
use symphonia_format_ogg::OggReader;
use tracing::{debug, error, instrument, warn};

use super::ogg::OggPacketReader;
use super::ring_buffer::RingBuffer;
use super::sample_converter::SampleConverter;
use crate::channels::wav_default_layout;
use crate::config::{MetadataFlags, ReaderConfig};
use crate::error::{ReaderError, Result};
use crate::format::{Encoding, FormatInfo};
use crate::reader::{check_buffer, swap_byte_order, AudioFileReader, FileFormat, FramesRead};
use crate::stream::MediaStream;

const IDENT_MAGIC: &[u8; 7] = b"\x01vorbis";
const COMMENT_MAGIC: &[u8; 7] = b"\x03vorbis";
const IDENT_LEN: usize = 30;

/// Consecutive undecodable packets tolerated before giving up.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Fields of the Vorbis identification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VorbisIdent {
    pub channels: u8,
    pub sample_rate: u32,
    pub max_bit_rate: i32,
    pub nominal_bit_rate: i32,
    pub min_bit_rate: i32,
}

impl VorbisIdent {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < IDENT_LEN || &packet[..7] != IDENT_MAGIC {
            return Err(ReaderError::InvalidType("not a Vorbis identification header".to_string()));
        }

        let u32_at = |at: usize| u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]]);
        let version = u32_at(7);
        if version != 0 {
            return Err(ReaderError::UnsupportedType(format!("Vorbis version {}", version)));
        }

        let ident = Self {
            channels: packet[11],
            sample_rate: u32_at(12),
            max_bit_rate: u32_at(16) as i32,
            nominal_bit_rate: u32_at(20) as i32,
            min_bit_rate: u32_at(24) as i32,
        };

        if ident.channels == 0 || ident.sample_rate == 0 {
            return Err(ReaderError::InvalidType(format!(
                "Vorbis header declares {} channels at {} Hz",
                ident.channels, ident.sample_rate
            )));
        }
        Ok(ident)
    }

    fn format_info(&self) -> FormatInfo {
        let channels = u32::from(self.channels);
        let positive = |rate: i32| u32::try_from(rate).unwrap_or(0);

        let mut format = FormatInfo {
            encoding: Encoding::FLOAT_LE,
            bits_per_sample: 32,
            bytes_per_frame: 4 * channels,
            num_channels: channels,
            sample_rate: f64::from(self.sample_rate),
            min_bit_rate: positive(self.min_bit_rate),
            nominal_bit_rate: positive(self.nominal_bit_rate),
            max_bit_rate: positive(self.max_bit_rate),
            ..Default::default()
        };
        format.set_identifiers(wav_default_layout(channels));
        format
    }
}

/// Hands a [`MediaStream`] to Symphonia, which also wants `Sync`.
struct StreamSource {
    inner: Mutex<Box<dyn MediaStream>>,
    byte_len: Option<u64>,
}

impl StreamSource {
    fn new(mut stream: Box<dyn MediaStream>) -> Self {
        let byte_len = stream.stream_position().and_then(|start| {
            let end = stream.seek(SeekFrom::End(0))?;
            stream.seek(SeekFrom::Start(start))?;
            Ok(end)
        });

        Self {
            inner: Mutex::new(stream),
            byte_len: byte_len.ok(),
        }
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.get_mut().read(buf)
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.get_mut().seek(pos)
    }
}

impl MediaSource for StreamSource {
    fn is_seekable(&self) -> bool {
        self.byte_len.is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

struct Decoding {
    demuxer: OggReader,
    decoder: VorbisDecoder,
    track_id: u32,
}

/// A reader over one Ogg Vorbis stream.
pub struct VorbisReader {
    decoding: Option<Decoding>,
    format: FormatInfo,
    name: String,
    num_frames: i64,
    positionable: bool,
    metadata: Option<Arc<MetaData>>,
    ring: RingBuffer,
    decoded: Vec<f32>,
    scratch: Vec<f32>,
    position: i64,
    /// Decoded frames to drop after an accurate seek.
    skip_frames: u64,
    exhausted: bool,
}

impl VorbisReader {
    /// Opens `stream`, which must be positioned at the first Ogg page.
    #[instrument(skip(stream, config), fields(name = %strip_path(&name)))]
    pub fn open(mut stream: Box<dyn MediaStream>, name: String, config: &ReaderConfig) -> Result<Self> {
        let start = stream.stream_position()?;

        let (ident, comments) = {
            let mut packets = OggPacketReader::with_capacity(config.ogg_read_buffer_bytes, &mut stream)?;
            let ident = packets
                .next_packet()?
                .ok_or_else(|| ReaderError::InvalidType("empty Ogg stream".to_string()))?;
            let ident = VorbisIdent::parse(&ident.data)?;

            let comments = if config.metadata.any() {
                read_comment_header(&mut packets)?
            } else {
                None
            };
            (ident, comments)
        };

        stream.seek(SeekFrom::Start(start))?;
        let source = StreamSource::new(stream);
        let positionable = source.is_seekable();
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let demuxer = OggReader::try_new(mss, &FormatOptions::default()).map_err(|e| {
            error!("Failed to open Ogg demuxer: {}", e);
            ReaderError::InvalidType(format!("Ogg demuxer: {}", e))
        })?;

        let track = demuxer
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec == CODEC_TYPE_VORBIS)
            .ok_or_else(|| ReaderError::InvalidType("no Vorbis track".to_string()))?;
        let track_id = track.id;
        let num_frames = track
            .codec_params
            .n_frames
            .and_then(|frames| i64::try_from(frames).ok())
            .unwrap_or(-1);

        let decoder = VorbisDecoder::try_new(&track.codec_params, &DecoderOptions::default()).map_err(|e| {
            error!("Failed to create Vorbis decoder: {}", e);
            ReaderError::Decoder(format!("Vorbis decoder: {}", e))
        })?;

        let format = ident.format_info();
        let metadata = comments.map(|comments| build_metadata(&comments, &config.metadata));
        let capacity = config.vorbis_max_frames_per_packet * format.num_channels as usize;

        debug!(
            channels = format.num_channels,
            sample_rate = format.sample_rate,
            nominal_bit_rate = format.nominal_bit_rate,
            num_frames,
            "Opened Ogg Vorbis stream"
        );

        Ok(Self {
            decoding: Some(Decoding {
                demuxer,
                decoder,
                track_id,
            }),
            format,
            name,
            num_frames,
            positionable,
            metadata,
            ring: RingBuffer::new(capacity),
            decoded: Vec::with_capacity(capacity),
            scratch: Vec::new(),
            position: 0,
            skip_frames: 0,
            exhausted: false,
        })
    }

    /// Decodes packets until one yields frames. Returns `false` at the end
    /// of the stream.
    fn decode_next_packet(&mut self) -> Result<bool> {
        let Some(decoding) = self.decoding.as_mut() else {
            return Ok(false);
        };
        let channels = self.format.num_channels as usize;
        let mut consecutive_errors = 0;

        loop {
            let packet = match decoding.demuxer.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!(position = self.position, "Reached end of Vorbis stream");
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Vorbis logical bitstream changed mid-stream");
                    return Err(ReaderError::InvalidType(
                        "Ogg logical bitstream changed".to_string(),
                    ));
                }
                Err(e) => {
                    error!("Fatal Ogg demuxer error: {}", e);
                    return Err(ReaderError::Decoder(format!("Failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != decoding.track_id {
                continue;
            }

            let decoded = match decoding.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, err
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("Too many consecutive decode errors");
                        return Err(ReaderError::Decoder(format!(
                            "Decoder failure after {} failed packets: {}",
                            MAX_CONSECUTIVE_ERRORS, err
                        )));
                    }
                    continue;
                }
                Err(e) => {
                    error!("Fatal decode error: {}", e);
                    return Err(ReaderError::Decoder(format!("Failed to decode packet: {}", e)));
                }
            };

            let spec = *decoded.spec();
            if spec.channels.count() != channels || f64::from(spec.rate) != self.format.sample_rate {
                warn!(
                    channels = spec.channels.count(),
                    sample_rate = spec.rate,
                    "Vorbis frame format changed mid-stream"
                );
                return Err(ReaderError::InvalidType(format!(
                    "Ogg Vorbis stream changed to {} channels at {} Hz",
                    spec.channels.count(),
                    spec.rate
                )));
            }

            self.decoded.clear();
            let frames = SampleConverter::append_interleaved_f32(&decoded, &mut self.decoded) as u64;
            if frames == 0 {
                continue;
            }

            let skipped = self.skip_frames.min(frames);
            self.skip_frames -= skipped;
            let samples = &self.decoded[skipped as usize * channels..];
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
}

fn read_comment_header<S: Read + Seek>(packets: &mut OggPacketReader<S>) -> Result<Option<VorbisComments>> {
    let Some(packet) = packets.next_packet()? else {
        return Ok(None);
    };
    if packet.data.len() < COMMENT_MAGIC.len() || &packet.data[..7] != COMMENT_MAGIC {
        warn!("Vorbis comment header missing");
        return Ok(None);
    }

    match VorbisComments::parse(&packet.data[7..]) {
        Ok(comments) => Ok(Some(comments)),
        Err(err) => {
            warn!(error = %err, "Ignoring malformed Vorbis comments");
            Ok(None)
        }
    }
}

pub(crate) fn build_metadata(comments: &VorbisComments, flags: &MetadataFlags) -> Arc<MetaData> {
    let mut meta = MetaData::new();
    apply_comments(
        &mut meta,
        comments,
        CommentMapping {
            info: flags.info,
            cue_points: flags.cue_points,
            text: flags.text,
        },
    );
    meta.sort_cue_points();
    Arc::new(meta)
}

/// Drains the ring into `data` as little-endian floats, returning frames.
pub(crate) fn drain_frames(
    ring: &mut RingBuffer,
    scratch: &mut Vec<f32>,
    channels: usize,
    max_frames: usize,
    data: &mut [u8],
) -> usize {
    let frames = (ring.available() / channels).min(max_frames);
    scratch.resize(frames * channels, 0.0);
    let samples = ring.read(scratch);
    SampleConverter::write_f32_le(&scratch[..samples], &mut data[..samples * 4]);
    frames
}

impl AudioFileReader for VorbisReader {
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
        FileFormat::OggVorbis
    }

    fn is_positionable(&self) -> bool {
        self.positionable && self.decoding.is_some()
    }

    fn read_frames(&mut self, num_frames: usize, data: &mut [u8], convert_byte_order: bool) -> Result<FramesRead> {
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
        if !self.positionable {
            return Err(ReaderError::SeekFailed(format!("{} is not positionable", self.name)));
        }

        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| ReaderError::NotReady(format!("{} is closed", self.name)))?;

        self.ring.clear();
        if self.num_frames >= 0 && frame >= self.num_frames {
            self.position = frame;
            self.exhausted = true;
            return Ok(());
        }

        let seeked = decoding
            .demuxer
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame as u64,
                    track_id: decoding.track_id,
                },
            )
            .map_err(|e| {
                error!("Seek failed: {}", e);
                ReaderError::SeekFailed(format!("frame {}: {}", frame, e))
            })?;
        decoding.decoder.reset();

        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.position = frame;
        self.exhausted = false;
        debug!(frame, skip = self.skip_frames, "Seeked Vorbis stream");
        Ok(())
    }

    fn frame_position(&mut self) -> Result<i64> {
        Ok(self.position)
    }

    fn close(&mut self) {
        if self.decoding.take().is_some() {
            self.exhausted = true;
            self.ring.clear();
            debug!(name = %strip_path(&self.name), "Closed Ogg Vorbis stream");
        }
    }
}
