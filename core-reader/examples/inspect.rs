//! # Audio File Inspector
//!
//! Opens an audio file, logs its format and metadata, then reads it to the
//! end and reports frame statistics.
//!
//! Run with: `cargo run --example inspect --package core-reader -- take.wav`
//!
//! Set `AUDIOFILE_LOG` to a level (`debug`, `trace`, ...) for parser output.

use std::env;

use anyhow::{bail, Context};
use core_reader::codec::sample_converter::SampleConverter;
use core_reader::{open_path, ReadStatus, ReaderConfig};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use tracing::{info, warn};

const BLOCK_FRAMES: usize = 4096;

fn main() -> anyhow::Result<()> {
    let level = env::var("AUDIOFILE_LOG")
        .ok()
        .and_then(|level| level.parse::<LogLevel>().ok())
        .unwrap_or(LogLevel::Info);
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Pretty)
            .with_level(level),
    )
    .context("failed to initialize logging")?;

    let Some(path) = env::args().nth(1) else {
        bail!("usage: inspect <audio file>");
    };

    let mut reader = open_path(&path, &ReaderConfig::full_metadata())
        .with_context(|| format!("failed to open {}", path))?;

    let format = reader.format_info().clone();
    info!(
        name = reader.name(),
        container = ?reader.file_format(),
        encoding = %format.encoding,
        bits = format.bits_per_sample,
        channels = format.num_channels,
        sample_rate = format.sample_rate,
        bit_rate = format.nominal_bit_rate,
        frames = reader.num_frames(),
        duration = ?format.duration(reader.num_frames()),
        "Format"
    );

    if let Some(meta) = reader.metadata() {
        info!(
            title = ?meta.text.title,
            artists = ?meta.text.artists,
            vendor = ?meta.text.vendor,
            cue_points = meta.cue_points().len(),
            regions = meta.regions().len(),
            loops = meta.loop_points().len(),
            blocks = meta.blocks().len(),
            "Metadata"
        );
        for cue in meta.cue_points() {
            info!(id = cue.id(), position = cue.position(), label = ?cue.label(), "Cue point");
        }
        for region in meta.regions().iter().chain(meta.loop_points()) {
            info!(
                id = region.id(),
                start = region.start_position(),
                end = region.end_position(),
                label = ?region.label(),
                "Region"
            );
        }
    }

    let mut buffer = vec![0u8; BLOCK_FRAMES * format.bytes_per_frame as usize];
    let mut samples = Vec::new();
    let mut total_frames = 0usize;
    let mut clipped = 0usize;
    let mut peak = 0.0f32;

    loop {
        let read = reader.read_frames(BLOCK_FRAMES, &mut buffer, false)?;
        let bytes = read.frames * format.bytes_per_frame as usize;

        samples.clear();
        SampleConverter::decode_frames(&format, &buffer[..bytes], &mut samples)?;
        clipped += SampleConverter::validate_samples(&samples);
        peak = samples.iter().fold(peak, |peak, sample| peak.max(sample.abs()));
        total_frames += read.frames;

        match read.status {
            ReadStatus::Ok => {}
            ReadStatus::Eof => break,
            status => {
                warn!(?status, "Single file reported a source change");
                break;
            }
        }
    }

    info!(frames = total_frames, peak, clipped, "Read complete");
    reader.close();
    Ok(())
}
