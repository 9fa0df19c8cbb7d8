//! # Sample Format Converter
//!
//! Converts audio samples between decoder buffers, raw container frames and
//! the interleaved f32 layout the codec readers emit.

#[cfg(feature = "vorbis")]
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
#[cfg(feature = "vorbis")]
use symphonia::core::conv::IntoSample;
#[cfg(feature = "vorbis")]
use symphonia::core::sample::Sample;
use tracing::warn;

use crate::error::{ReaderError, Result};
use crate::format::FormatInfo;

/// Sample converter that normalizes audio to f32 interleaved format.
///
/// Output samples are in `[-1.0, 1.0]`, interleaved `LRLR...` for stereo.
pub struct SampleConverter;

impl SampleConverter {
    /// Appends the frames of a Symphonia buffer to `out` as interleaved f32.
    ///
    /// Returns the number of frames appended.
    #[cfg(feature = "vorbis")]
    pub fn append_interleaved_f32(buffer: &AudioBufferRef<'_>, out: &mut Vec<f32>) -> usize {
        match buffer {
            AudioBufferRef::F32(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::F64(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S32(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S24(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S16(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S8(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U32(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U24(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U16(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U8(buf) => Self::convert_and_interleave(buf, out),
        }
    }

    /// Converts planar `buf` into interleaved f32 samples.
    #[cfg(feature = "vorbis")]
    fn convert_and_interleave<T>(buf: &AudioBuffer<T>, out: &mut Vec<f32>) -> usize
    where
        T: Sample + IntoSample<f32>,
    {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();
        out.reserve(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for chan_idx in 0..num_channels {
                out.push(buf.chan(chan_idx)[frame_idx].into_sample());
            }
        }

        num_frames
    }

    /// Writes `samples` as little-endian f32 bytes.
    ///
    /// `out` must hold `4 * samples.len()` bytes.
    pub fn write_f32_le(samples: &[f32], out: &mut [u8]) {
        for (sample, bytes) in samples.iter().zip(out.chunks_exact_mut(4)) {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }
    }

    /// Decodes whole frames of `data`, laid out as `format` describes, into
    /// interleaved f32 samples appended to `out`.
    ///
    /// Little-endian 8-bit PCM is unsigned (WAVE), big-endian 8-bit PCM is
    /// signed (AIFF). Padding between the packed samples and the frame stride
    /// is skipped. Returns the number of frames decoded.
    pub fn decode_frames(format: &FormatInfo, data: &[u8], out: &mut Vec<f32>) -> Result<usize> {
        let width = format.bytes_per_sample() as usize;
        let stride = format.bytes_per_frame as usize;
        let channels = format.num_channels as usize;

        let supported = if format.is_float() {
            matches!(width, 4 | 8)
        } else {
            matches!(width, 1..=4)
        };
        if !supported || !format.encoding.is_valid() || stride < width * channels || channels == 0 {
            return Err(ReaderError::UnsupportedType(format!(
                "cannot convert {} samples of {} bytes",
                format.encoding, width
            )));
        }

        let frames = data.len() / stride;
        out.try_reserve_exact(frames * channels)
            .map_err(|_| ReaderError::Memory(format!("{} samples", frames * channels)))?;

        let big_endian = format.is_big_endian();
        let float = format.is_float();
        for frame in data.chunks_exact(stride) {
            for sample in frame[..width * channels].chunks_exact(width) {
                out.push(decode_sample(sample, float, big_endian));
            }
        }

        Ok(frames)
    }

    /// Counts samples outside `[-1.0, 1.0]`, warning when any are found.
    pub fn validate_samples(samples: &[f32]) -> usize {
        let clipped = samples.iter().filter(|&&s| !(-1.0..=1.0).contains(&s)).count();

        if clipped > 0 {
            warn!(
                "Detected {} clipped samples ({:.2}% of total)",
                clipped,
                (clipped as f64 / samples.len() as f64) * 100.0
            );
        }

        clipped
    }
}

fn decode_sample(bytes: &[u8], float: bool, big_endian: bool) -> f32 {
    // Normalize to big-endian order so integer widths share one path.
    let mut word = [0u8; 8];
    let width = bytes.len();
    word[..width].copy_from_slice(bytes);
    if !big_endian {
        word[..width].reverse();
    }

    match (float, width) {
        (true, 4) => f32::from_be_bytes([word[0], word[1], word[2], word[3]]),
        (true, _) => f64::from_be_bytes(word) as f32,
        (false, 1) if !big_endian => (f32::from(word[0]) - 128.0) / 128.0,
        (false, _) => {
            let mut value: i64 = i64::from(word[0] as i8);
            for &byte in &word[1..width] {
                value = (value << 8) | i64::from(byte);
            }
            let scale = (1i64 << (width * 8 - 1)) as f64;
            (value as f64 / scale) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Encoding;

    #[test]
    fn test_validate_samples() {
        assert_eq!(SampleConverter::validate_samples(&[0.0, 0.5, -0.5, 1.0, -1.0]), 0);
        assert_eq!(SampleConverter::validate_samples(&[0.0, 1.5, -1.5, 0.5]), 2);
    }

    #[test]
    fn test_write_f32_le() {
        let mut out = [0u8; 8];
        SampleConverter::write_f32_le(&[1.0, -0.5], &mut out);
        assert_eq!(&out[..4], &1.0f32.to_le_bytes());
        assert_eq!(&out[4..], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_decode_pcm16_le() {
        let format = FormatInfo::linear(Encoding::PCM_LE, 16, 2, 44100.0);
        let data = [0x00, 0x40, 0x00, 0xc0, 0xff, 0x7f, 0x00, 0x80];
        let mut out = Vec::new();

        assert_eq!(SampleConverter::decode_frames(&format, &data, &mut out).unwrap(), 2);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], -0.5);
        assert!((out[2] - 1.0).abs() < 1e-4);
        assert_eq!(out[3], -1.0);
    }

    #[test]
    fn test_decode_pcm24_be_and_8bit() {
        let format = FormatInfo::linear(Encoding::PCM_BE, 24, 1, 48000.0);
        let mut out = Vec::new();
        SampleConverter::decode_frames(&format, &[0xc0, 0x00, 0x00], &mut out).unwrap();
        assert_eq!(out, vec![-0.5]);

        let wav8 = FormatInfo::linear(Encoding::PCM_LE, 8, 1, 8000.0);
        let mut out = Vec::new();
        SampleConverter::decode_frames(&wav8, &[0x80, 0x00], &mut out).unwrap();
        assert_eq!(out, vec![0.0, -1.0]);

        let aiff8 = FormatInfo::linear(Encoding::PCM_BE, 8, 1, 8000.0);
        let mut out = Vec::new();
        SampleConverter::decode_frames(&aiff8, &[0x40], &mut out).unwrap();
        assert_eq!(out, vec![0.5]);
    }

    #[test]
    fn test_decode_float_be() {
        let format = FormatInfo::linear(Encoding::FLOAT_BE, 64, 1, 44100.0);
        let mut out = Vec::new();
        SampleConverter::decode_frames(&format, &0.25f64.to_be_bytes(), &mut out).unwrap();
        assert_eq!(out, vec![0.25]);
    }

    #[test]
    fn test_decode_rejects_odd_float_width() {
        let format = FormatInfo::linear(Encoding::FLOAT_LE, 16, 1, 44100.0);
        let mut out = Vec::new();
        assert!(matches!(
            SampleConverter::decode_frames(&format, &[0, 0], &mut out),
            Err(ReaderError::UnsupportedType(_))
        ));
    }
}
