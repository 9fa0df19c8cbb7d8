//! In-memory container images for integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use core_reader::iff::w64::{DATA_GUID, FMT_GUID, RIFF_GUID, WAVE_GUID};
use core_reader::NamedStream;
use uuid::Uuid;

/// Interleaved 16-bit frames where channel `c` of frame `i` holds `i * 10 + c`.
pub fn ramp_frames_i16(num_frames: usize, channels: usize, big_endian: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(num_frames * channels * 2);
    for i in 0..num_frames {
        for c in 0..channels {
            let value = (i * 10 + c) as i16;
            if big_endian {
                out.extend_from_slice(&value.to_be_bytes());
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    out
}

pub fn stream(name: &str, bytes: Vec<u8>) -> NamedStream {
    NamedStream::new(name, Cursor::new(bytes))
}

// ============================================================================
// RIFF/WAVE
// ============================================================================

/// A little-endian chunk, padded to an even length.
pub fn riff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn fmt_payload(code: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut out = Vec::new();
    out.extend_from_slice(&code.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out
}

/// `RIFF`/`WAVE` around `chunks`.
pub fn riff_wave(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(4 + body.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(&body);
    out
}

/// 16-bit PCM WAV with `extra` chunks after `data`.
pub fn wav_pcm16(channels: u16, rate: u32, frames: &[u8], extra: &[Vec<u8>]) -> Vec<u8> {
    let mut chunks = vec![
        riff_chunk(b"fmt ", &fmt_payload(1, channels, rate, 16)),
        riff_chunk(b"data", frames),
    ];
    chunks.extend_from_slice(extra);
    riff_wave(&chunks)
}

pub fn cue_payload(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut out = (entries.len() as u32).to_le_bytes().to_vec();
    for (order, &(id, offset)) in entries.iter().enumerate() {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(order as u32).to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out
}

/// `LIST`/`adtl` payload with one `labl` per entry.
pub fn adtl_labels(labels: &[(u32, &str)]) -> Vec<u8> {
    let mut out = b"adtl".to_vec();
    for &(id, text) in labels {
        let mut payload = id.to_le_bytes().to_vec();
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        out.extend(riff_chunk(b"labl", &payload));
    }
    out
}

/// `smpl` payload with `(cue id, start, end)` forward loops.
pub fn smpl_payload(unity_note: u32, loops: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in [0u32, 0, 0, unity_note, 0, 0, 0, loops.len() as u32, 0] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for &(id, start, end) in loops {
        for field in [id, 0, start, end, 0, 0] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
    out
}

// ============================================================================
// AIFF/AIFC
// ============================================================================

/// A big-endian chunk, padded to an even length.
pub fn iff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// 80-bit extended encoding of a positive value.
pub fn f80(value: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value <= 0.0 {
        return out;
    }
    let exponent = value.log2().floor() as i32;
    let mantissa = (value / 2f64.powi(exponent) * 9_223_372_036_854_775_808.0) as u64;
    out[..2].copy_from_slice(&((exponent + 16383) as u16).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

pub fn pascal(text: &str) -> Vec<u8> {
    let mut out = vec![text.len() as u8];
    out.extend_from_slice(text.as_bytes());
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// `COMM` payload; `compression` makes it the AIFC variant.
pub fn comm_payload(channels: i16, num_frames: u32, bits: i16, rate: f64, compression: Option<&[u8; 4]>) -> Vec<u8> {
    let mut out = channels.to_be_bytes().to_vec();
    out.extend_from_slice(&num_frames.to_be_bytes());
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(&f80(rate));
    if let Some(code) = compression {
        out.extend_from_slice(code);
        out.extend(pascal("test"));
    }
    out
}

pub fn ssnd(frames: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(frames);
    iff_chunk(b"SSND", &payload)
}

pub fn mark_payload(markers: &[(i16, u32, &str)]) -> Vec<u8> {
    let mut out = (markers.len() as u16).to_be_bytes().to_vec();
    for &(id, position, label) in markers {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&position.to_be_bytes());
        out.extend(pascal(label));
    }
    out
}

/// `FORM` of type `form` around `chunks`.
pub fn form(form: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut out = b"FORM".to_vec();
    out.extend_from_slice(&(4 + body.len() as u32).to_be_bytes());
    out.extend_from_slice(form);
    out.extend_from_slice(&body);
    out
}

/// 16-bit AIFF with `extra` chunks after `SSND`.
pub fn aiff_pcm16(channels: i16, rate: f64, frames: &[u8], extra: &[Vec<u8>]) -> Vec<u8> {
    let num_frames = (frames.len() / (2 * channels as usize)) as u32;
    let mut chunks = vec![
        iff_chunk(b"COMM", &comm_payload(channels, num_frames, 16, rate, None)),
        ssnd(frames),
    ];
    chunks.extend_from_slice(extra);
    form(b"AIFF", &chunks)
}

pub fn aifc(compression: &[u8; 4], channels: i16, bits: i16, rate: f64, frames: &[u8]) -> Vec<u8> {
    let frame_bytes = channels as usize * (bits as usize).div_ceil(8);
    let num_frames = (frames.len() / frame_bytes) as u32;
    form(
        b"AIFC",
        &[
            iff_chunk(b"FVER", &0xa280_5140u32.to_be_bytes()),
            iff_chunk(b"COMM", &comm_payload(channels, num_frames, bits, rate, Some(compression))),
            ssnd(frames),
        ],
    )
}

// ============================================================================
// CAF
// ============================================================================

/// A CAF chunk: 64-bit length, no padding.
pub fn caf_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as i64).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn desc_payload(format_id: &[u8; 4], flags: u32, channels: u32, bits: u32, rate: f64) -> Vec<u8> {
    let mut out = rate.to_be_bytes().to_vec();
    out.extend_from_slice(format_id);
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&(channels * bits / 8).to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&channels.to_be_bytes());
    out.extend_from_slice(&bits.to_be_bytes());
    out
}

pub fn caf_mark_payload(markers: &[(u32, f64)]) -> Vec<u8> {
    let mut out = 0u32.to_be_bytes().to_vec();
    out.extend_from_slice(&(markers.len() as u32).to_be_bytes());
    for &(id, position) in markers {
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&position.to_be_bytes());
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
    }
    out
}

pub fn strg_payload(strings: &[(u32, &str)]) -> Vec<u8> {
    let mut table = (strings.len() as u32).to_be_bytes().to_vec();
    let mut data = Vec::new();
    for &(id, text) in strings {
        table.extend_from_slice(&id.to_be_bytes());
        table.extend_from_slice(&(data.len() as i64).to_be_bytes());
        data.extend_from_slice(text.as_bytes());
        data.push(0);
    }
    table.extend(data);
    table
}

/// Big-endian integer CAF with `extra` chunks before `data`.
pub fn caf_pcm16(channels: u32, rate: f64, frames: &[u8], extra: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"caff".to_vec();
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend(caf_chunk(b"desc", &desc_payload(b"lpcm", 0, channels, 16, rate)));
    for chunk in extra {
        out.extend_from_slice(chunk);
    }

    let mut data = 0u32.to_be_bytes().to_vec();
    data.extend_from_slice(frames);
    out.extend(caf_chunk(b"data", &data));
    out
}

// ============================================================================
// Wave64
// ============================================================================

/// A Wave64 chunk: GUID, length including the 24-byte header, 8-byte
/// alignment.
pub fn w64_chunk(id: &Uuid, payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_bytes_le().to_vec();
    out.extend_from_slice(&(24 + payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

pub fn w64_pcm16(channels: u16, rate: u32, frames: &[u8]) -> Vec<u8> {
    let body = [
        w64_chunk(&FMT_GUID, &fmt_payload(1, channels, rate, 16)),
        w64_chunk(&DATA_GUID, frames),
    ]
    .concat();

    let mut out = RIFF_GUID.to_bytes_le().to_vec();
    out.extend_from_slice(&(40 + body.len() as u64).to_le_bytes());
    out.extend_from_slice(&WAVE_GUID.to_bytes_le());
    out.extend(body);
    out
}
