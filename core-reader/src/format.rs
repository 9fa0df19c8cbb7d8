//! # Frame Format
//!
//! [`FormatInfo`] describes how interleaved frames are encoded: sample
//! encoding, width, stride, channel layout and rate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample encoding flags.
///
/// PCM and float are mutually exclusive; big-endian composes with either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Encoding(u8);

impl Encoding {
    pub const BIG_ENDIAN: u8 = 1;
    pub const PCM: u8 = 2;
    pub const FLOAT: u8 = 4;

    pub const PCM_LE: Self = Self(Self::PCM);
    pub const PCM_BE: Self = Self(Self::PCM | Self::BIG_ENDIAN);
    pub const FLOAT_LE: Self = Self(Self::FLOAT);
    pub const FLOAT_BE: Self = Self(Self::FLOAT | Self::BIG_ENDIAN);

    pub const fn new(pcm: bool, float: bool, big_endian: bool) -> Self {
        let mut bits = 0;
        if pcm {
            bits |= Self::PCM;
        }
        if float {
            bits |= Self::FLOAT;
        }
        if big_endian {
            bits |= Self::BIG_ENDIAN;
        }
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_pcm(self) -> bool {
        self.0 & Self::PCM != 0
    }

    pub const fn is_float(self) -> bool {
        self.0 & Self::FLOAT != 0
    }

    pub const fn is_big_endian(self) -> bool {
        self.0 & Self::BIG_ENDIAN != 0
    }

    pub const fn is_valid(self) -> bool {
        self.is_pcm() != self.is_float()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.is_pcm(), self.is_float()) {
            (true, false) => "pcm",
            (false, true) => "float",
            _ => "invalid",
        };
        let order = if self.is_big_endian() { "be" } else { "le" };
        write!(f, "{}-{}", kind, order)
    }
}

/// Speaker layout. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// One identifier per channel (see [`crate::channels`]).
    Identifiers(Vec<u32>),
    /// Speaker positions as `[x, y, z]`.
    Coordinates(Vec<[f32; 3]>),
}

impl ChannelLayout {
    pub fn len(&self) -> usize {
        match self {
            ChannelLayout::Identifiers(ids) => ids.len(),
            ChannelLayout::Coordinates(coords) => coords.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        ChannelLayout::Identifiers(Vec::new())
    }
}

/// Normalized description of a frame stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    pub encoding: Encoding,
    pub bits_per_sample: u32,
    /// Interleaved stride in bytes.
    pub bytes_per_frame: u32,
    pub num_channels: u32,
    pub layout: ChannelLayout,
    pub sample_rate: f64,
    pub min_bit_rate: u32,
    pub nominal_bit_rate: u32,
    pub max_bit_rate: u32,
    /// Seconds per frame for linear formats; 0 for codecs.
    pub frame_duration: f64,
    /// Codec-defined quality in `[0, 1]`.
    pub quality: f64,
}

impl FormatInfo {
    /// Interleaved PCM or float with the stride derived from the width.
    pub fn linear(encoding: Encoding, bits_per_sample: u32, num_channels: u32, sample_rate: f64) -> Self {
        let mut format = Self {
            encoding,
            bits_per_sample,
            num_channels,
            sample_rate,
            ..Default::default()
        };
        format.bytes_per_frame = format.packed_bytes_per_frame();
        format.set_linear_rates();
        format
    }

    pub fn is_big_endian(&self) -> bool {
        self.encoding.is_big_endian()
    }

    pub fn is_float(&self) -> bool {
        self.encoding.is_float()
    }

    /// Container width of one sample, rounded up to whole bytes.
    pub fn bytes_per_sample(&self) -> u32 {
        self.bits_per_sample.div_ceil(8)
    }

    /// `ceil(bits / 8) * channels`.
    pub fn packed_bytes_per_frame(&self) -> u32 {
        self.bytes_per_sample() * self.num_channels
    }

    /// Fills bit rates, frame duration and quality from the stride and rate
    /// of an uncompressed stream.
    pub(crate) fn set_linear_rates(&mut self) {
        let rate = f64::from(self.bytes_per_frame) * self.sample_rate * 8.0;
        let rate = if rate.is_finite() && rate > 0.0 {
            rate.min(f64::from(u32::MAX)) as u32
        } else {
            0
        };

        self.nominal_bit_rate = rate;
        self.min_bit_rate = rate;
        self.max_bit_rate = rate;
        self.frame_duration = if self.sample_rate > 0.0 {
            1.0 / self.sample_rate
        } else {
            0.0
        };
        self.quality = f64::from(self.bits_per_sample) / 64.0;
    }

    /// Seconds spanned by `num_frames`; `None` for unknown lengths.
    pub fn duration(&self, num_frames: i64) -> Option<f64> {
        if num_frames < 0 || self.sample_rate <= 0.0 {
            return None;
        }
        Some(num_frames as f64 / self.sample_rate)
    }

    /// Replaces nonsensical fields with a usable default: no channels
    /// becomes mono, no width becomes 8-bit PCM.
    pub fn apply_default_if_invalid(&mut self) {
        if self.num_channels == 0 {
            self.num_channels = 1;
        }
        if self.bits_per_sample == 0 {
            self.bits_per_sample = 8;
            self.encoding = Encoding::PCM_LE;
        }
        if self.bytes_per_frame == 0 {
            self.bytes_per_frame = self.packed_bytes_per_frame();
        }
    }

    /// Copies `other` into `self` and reports whether the frame format
    /// changed: encoding, channel count or layout, stride, or rate.
    pub fn update_from(&mut self, other: &FormatInfo) -> bool {
        let changed = self.encoding != other.encoding
            || self.num_channels != other.num_channels
            || self.layout != other.layout
            || self.bytes_per_frame != other.bytes_per_frame
            || self.sample_rate != other.sample_rate;

        self.clone_from(other);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_flags() {
        assert!(Encoding::PCM_BE.is_pcm());
        assert!(Encoding::PCM_BE.is_big_endian());
        assert!(Encoding::FLOAT_LE.is_float());
        assert!(!Encoding::FLOAT_LE.is_big_endian());
        assert_eq!(Encoding::new(false, true, true), Encoding::FLOAT_BE);
        assert!(!Encoding::default().is_valid());
        assert_eq!(Encoding::PCM_LE.to_string(), "pcm-le");
    }

    #[test]
    fn test_linear_rounds_width_up() {
        let format = FormatInfo::linear(Encoding::PCM_LE, 20, 2, 48000.0);
        assert_eq!(format.bytes_per_sample(), 3);
        assert_eq!(format.bytes_per_frame, 6);
        assert_eq!(format.nominal_bit_rate, 6 * 48000 * 8);
        assert_eq!(format.max_bit_rate, format.nominal_bit_rate);
        assert_eq!(format.quality, 20.0 / 64.0);
    }

    #[test]
    fn test_apply_default_if_invalid() {
        let mut format = FormatInfo::default();
        format.apply_default_if_invalid();
        assert_eq!(format.num_channels, 1);
        assert_eq!(format.bits_per_sample, 8);
        assert_eq!(format.bytes_per_frame, 1);
        assert_eq!(format.encoding, Encoding::PCM_LE);
    }

    #[test]
    fn test_update_from_reports_discontinuities() {
        let mut current = FormatInfo::linear(Encoding::PCM_LE, 16, 2, 44100.0);
        let same_frames = FormatInfo {
            quality: 0.5,
            ..current.clone()
        };
        assert!(!current.update_from(&same_frames));
        assert_eq!(current.quality, 0.5);

        let faster = FormatInfo::linear(Encoding::PCM_LE, 16, 2, 48000.0);
        assert!(current.update_from(&faster));
        assert_eq!(current.sample_rate, 48000.0);
    }

    #[test]
    fn test_duration() {
        let format = FormatInfo::linear(Encoding::FLOAT_LE, 32, 1, 8000.0);
        assert_eq!(format.duration(4000), Some(0.5));
        assert_eq!(format.duration(-1), None);
    }
}
