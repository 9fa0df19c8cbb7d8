//! # Reader Configuration
//!
//! Options applied when opening readers: which metadata categories to
//! materialize, codec buffer sizes and composite naming.

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// Metadata categories a parser may materialize.
///
/// Parsing metadata allocates and performs unbounded I/O, so callers that
/// only stream frames can switch it off entirely with [`MetadataFlags::none`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFlags {
    /// Descriptive tags, broadcast-wave fields, Vorbis comments.
    #[serde(default = "default_true")]
    pub info: bool,

    /// Labels, notes and labelled-text chunks.
    #[serde(default = "default_true")]
    pub text: bool,

    /// Cue/marker lists.
    #[serde(default = "default_true")]
    pub cue_points: bool,

    /// Sampler and instrument chunks, including loops.
    #[serde(default = "default_true")]
    pub sampler: bool,

    /// Peak overview chunks (recognized and skipped).
    #[serde(default)]
    pub overview: bool,

    /// Unrecognized chunks, kept as opaque blocks.
    #[serde(default)]
    pub custom: bool,

    /// Manufacturer-specific trailer of the sampler chunk.
    #[serde(default)]
    pub extra_sampler_data: bool,
}

impl MetadataFlags {
    pub fn none() -> Self {
        Self {
            info: false,
            text: false,
            cue_points: false,
            sampler: false,
            overview: false,
            custom: false,
            extra_sampler_data: false,
        }
    }

    pub fn all() -> Self {
        Self {
            info: true,
            text: true,
            cue_points: true,
            sampler: true,
            overview: true,
            custom: true,
            extra_sampler_data: true,
        }
    }

    /// Returns `true` if any category is requested.
    pub fn any(&self) -> bool {
        self.info
            || self.text
            || self.cue_points
            || self.sampler
            || self.overview
            || self.custom
            || self.extra_sampler_data
    }
}

impl Default for MetadataFlags {
    fn default() -> Self {
        Self {
            info: true,
            text: true,
            cue_points: true,
            sampler: true,
            overview: false,
            custom: false,
            extra_sampler_data: false,
        }
    }
}

/// Reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Metadata categories to parse when opening a file.
    #[serde(default)]
    pub metadata: MetadataFlags,

    /// Read-buffer size used while scanning Ogg pages.
    ///
    /// Default: 4096 bytes.
    #[serde(default = "default_ogg_read_buffer_bytes")]
    pub ogg_read_buffer_bytes: usize,

    /// Output rate of the Opus decoder. Opus always decodes at 48 kHz.
    #[serde(default = "default_opus_sample_rate")]
    pub opus_sample_rate: u32,

    /// Largest Opus packet in frames (120 ms at 48 kHz).
    #[serde(default = "default_opus_max_frames_per_packet")]
    pub opus_max_frames_per_packet: usize,

    /// Largest Vorbis block in frames.
    #[serde(default = "default_vorbis_max_frames_per_packet")]
    pub vorbis_max_frames_per_packet: usize,

    /// Text placed between the original name and the region label.
    #[serde(default = "default_region_name_separator")]
    pub region_name_separator: String,

    /// Seed for the random selection policies. `None` seeds from OS entropy.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            metadata: MetadataFlags::default(),
            ogg_read_buffer_bytes: default_ogg_read_buffer_bytes(),
            opus_sample_rate: default_opus_sample_rate(),
            opus_max_frames_per_packet: default_opus_max_frames_per_packet(),
            vorbis_max_frames_per_packet: default_vorbis_max_frames_per_packet(),
            region_name_separator: default_region_name_separator(),
            random_seed: None,
        }
    }
}

impl ReaderConfig {
    /// Frames only: no metadata pass.
    pub fn minimal() -> Self {
        Self {
            metadata: MetadataFlags::none(),
            ..Default::default()
        }
    }

    /// Every metadata category, including opaque chunks.
    pub fn full_metadata() -> Self {
        Self {
            metadata: MetadataFlags::all(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataFlags) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Loads a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReaderError::Config(format!("Invalid reader config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.ogg_read_buffer_bytes == 0 {
            return Err(ReaderError::Config(
                "ogg_read_buffer_bytes must be > 0".to_string(),
            ));
        }

        if self.opus_sample_rate == 0 {
            return Err(ReaderError::Config("opus_sample_rate must be > 0".to_string()));
        }

        if self.opus_max_frames_per_packet == 0 || self.vorbis_max_frames_per_packet == 0 {
            return Err(ReaderError::Config(
                "max frames per packet must be > 0".to_string(),
            ));
        }

        if self.region_name_separator.is_empty() {
            return Err(ReaderError::Config(
                "region_name_separator cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_ogg_read_buffer_bytes() -> usize {
    4096
}

fn default_opus_sample_rate() -> u32 {
    48000
}

fn default_opus_max_frames_per_packet() -> usize {
    5760 // 120 ms at 48 kHz
}

fn default_vorbis_max_frames_per_packet() -> usize {
    8192
}

fn default_region_name_separator() -> String {
    "#".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.metadata.cue_points);
        assert!(!config.metadata.custom);
        assert_eq!(config.region_name_separator, "#");
    }

    #[test]
    fn test_minimal_config_skips_metadata() {
        assert!(!ReaderConfig::minimal().metadata.any());
        assert!(ReaderConfig::full_metadata().metadata.custom);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ReaderConfig::default();
        config.ogg_read_buffer_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = ReaderConfig::default();
        config.region_name_separator.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            ReaderConfig::from_json_str(r#"{"metadata": {"custom": true}, "random_seed": 7}"#)
                .unwrap();

        assert!(config.metadata.custom);
        assert!(config.metadata.info);
        assert!(!config.metadata.overview);
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(config.opus_max_frames_per_packet, 5760);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            ReaderConfig::from_json_str(r#"{"region_name_separator": ""}"#),
            Err(ReaderError::Config(_))
        ));
        assert!(ReaderConfig::from_json_str("not json").is_err());
    }
}
