//! RIFF/WAVE parsing.
//!
//! The `fmt ` parser and the metadata handlers here are shared with Wave64,
//! whose payloads are byte-identical.

use std::io::{Read, Seek};

use core_metadata::text::decode_optional_text;
use core_metadata::{CuePoint, MetaData, Region, RegionType};
use tracing::debug;
use uuid::Uuid;

use super::{read_opaque_block, ParsedFile};
use crate::channels::{mask_to_identifiers, wav_default_layout};
use crate::chunk::{walk_chunks, ChunkHeader, ChunkId, ContainerLayout, Walk};
use crate::config::MetadataFlags;
use crate::error::{ReaderError, Result};
use crate::format::{Encoding, FormatInfo};
use crate::reader::FileFormat;
use crate::stream::ByteReader;

const COMPRESSION_PCM: u16 = 1;
const COMPRESSION_FLOAT: u16 = 3;
const COMPRESSION_EXTENSIBLE: u16 = 0xfffe;

/// Smallest `fmt ` payload that carries the extensible fields.
const FMT_EXTENSIBLE_LEN: u64 = 40;

const SUBFORMAT_PCM: Uuid = Uuid::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
const SUBFORMAT_FLOAT: Uuid = Uuid::from_u128(0x00000003_0000_0010_8000_00aa00389b71);
const SUBFORMAT_AMBISONIC_PCM: Uuid = Uuid::from_u128(0x00000001_0721_11d3_8644_c8c1ca000000);

/// Fixed-size part of a `bext` payload; anything after it is coding history.
const BEXT_FIXED_LEN: u64 = 256 + 32 + 32 + 10 + 8 + 4 + 4 + 2 + 64 + 190;

/// Parses a RIFF/WAVE header whose `RIFF` magic was already consumed.
pub(crate) fn parse<S: Read + Seek>(reader: &mut ByteReader<S>) -> Result<ParsedFile> {
    reader.set_big_endian(false);

    let riff_len = reader.read_u32()?;
    let form = reader.read_fourcc()?;
    if &form != b"WAVE" {
        return Err(ReaderError::InvalidType(format!(
            "RIFF form {:?} is not WAVE",
            String::from_utf8_lossy(&form)
        )));
    }

    let chunks_start = reader.position();
    // Streaming writers leave the length at 0 or all ones.
    let main_end = match riff_len {
        0 | u32::MAX => None,
        len => Some(8 + u64::from(len)),
    };

    let (format, data) = locate_format_and_data(
        reader,
        &ContainerLayout::RIFF,
        main_end,
        ChunkId::fourcc(b"fmt "),
        ChunkId::fourcc(b"data"),
    )?;

    Ok(ParsedFile {
        file_format: FileFormat::Wav,
        format,
        layout: ContainerLayout::RIFF,
        chunks_start,
        main_end,
        data_pos: data.data_pos,
        data_len: data.available_len(reader),
        declared_frames: None,
    })
}

/// Walks once, parsing the format chunk and stopping at the data chunk.
pub(crate) fn locate_format_and_data<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    layout: &ContainerLayout,
    main_end: Option<u64>,
    fmt_id: ChunkId,
    data_id: ChunkId,
) -> Result<(FormatInfo, ChunkHeader)> {
    let mut format = None;
    let mut data = None;

    walk_chunks(reader, layout, main_end, |reader, header| {
        if header.id == fmt_id {
            format = Some(parse_fmt(reader, header.len.unwrap_or(0))?);
            if data.is_some() {
                return Ok(Walk::Stop);
            }
        } else if header.id == data_id {
            data = Some(*header);
            if format.is_some() {
                return Ok(Walk::Stop);
            }
        }
        Ok(Walk::Continue)
    })?;

    let format = format.ok_or_else(|| ReaderError::ChunkNotFound(fmt_id.to_string()))?;
    let data = data.ok_or_else(|| ReaderError::ChunkNotFound(data_id.to_string()))?;
    Ok((format, data))
}

/// Decodes a `fmt ` payload of `len` bytes.
pub(crate) fn parse_fmt<S: Read + Seek>(reader: &mut ByteReader<S>, len: u64) -> Result<FormatInfo> {
    let compression = reader.read_u16()?;
    let num_channels = u32::from(reader.read_u16()?);
    let sample_rate = reader.read_u32()?;
    let byte_rate = reader.read_u32()?;
    let _block_align = reader.read_u16()?;
    let bits_per_sample = u32::from(reader.read_u16()?);

    if num_channels == 0 || sample_rate == 0 {
        return Err(ReaderError::InvalidType(format!(
            "fmt declares {} channels at {} Hz",
            num_channels, sample_rate
        )));
    }

    let (encoding, identifiers) = match compression {
        COMPRESSION_PCM => (Encoding::PCM_LE, wav_default_layout(num_channels)),
        COMPRESSION_FLOAT => (Encoding::FLOAT_LE, wav_default_layout(num_channels)),
        COMPRESSION_EXTENSIBLE => {
            if len < FMT_EXTENSIBLE_LEN {
                return Err(ReaderError::InvalidType(format!(
                    "extensible fmt chunk of {} bytes",
                    len
                )));
            }

            // cbSize and valid bits
            reader.skip(4)?;
            let mask = reader.read_u32()?;
            let sub_format = reader.read_guid()?;

            let encoding = match sub_format {
                SUBFORMAT_PCM | SUBFORMAT_AMBISONIC_PCM => Encoding::PCM_LE,
                SUBFORMAT_FLOAT => Encoding::FLOAT_LE,
                other => {
                    return Err(ReaderError::InvalidType(format!("sub-format {}", other)));
                }
            };
            (encoding, mask_to_identifiers(mask, num_channels))
        }
        other => {
            return Err(ReaderError::InvalidType(format!(
                "compression code {:#06x}",
                other
            )))
        }
    };

    let mut format = FormatInfo {
        encoding,
        num_channels,
        sample_rate: f64::from(sample_rate),
        ..Default::default()
    };

    if bits_per_sample > 64 {
        format.bytes_per_frame = byte_rate / sample_rate;
        format.bits_per_sample = 8 * format.bytes_per_frame / num_channels;
    } else {
        format.bits_per_sample = bits_per_sample;
        format.bytes_per_frame = format.packed_bytes_per_frame();
    }

    format.set_identifiers(identifiers);
    format.set_linear_rates();
    Ok(format)
}

/// Walks every chunk after the header, filling `meta`.
pub(crate) fn read_metadata<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    parsed: &ParsedFile,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let sample_rate = parsed.format.sample_rate;

    walk_chunks(reader, &parsed.layout, parsed.main_end, |reader, header| {
        match header.id {
            ChunkId::FourCc(code) => {
                read_chunk(reader, header, &code, sample_rate, flags, meta)?;
            }
            ChunkId::Guid(_) => {
                if flags.custom {
                    meta.add_block(read_opaque_block(reader, header)?);
                }
            }
        }
        Ok(Walk::Continue)
    })
}

/// Dispatches one metadata chunk by its four-char code.
pub(crate) fn read_chunk<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    header: &ChunkHeader,
    code: &[u8; 4],
    sample_rate: f64,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let len = header.available_len(reader).unwrap_or(0);

    match code {
        b"fmt " | b"data" => {}
        b"bext" => {
            if flags.info {
                read_bext(reader, len, meta)?;
            }
        }
        b"levl" => {
            if flags.overview {
                debug!("Skipping peak envelope chunk");
            }
        }
        b"smpl" => {
            if flags.sampler {
                read_smpl(reader, len, sample_rate, flags, meta)?;
            }
        }
        b"inst" | b"INST" => {
            if flags.sampler {
                read_inst(reader, meta)?;
            }
        }
        b"cue " => {
            if flags.cue_points {
                read_cue(reader, sample_rate, meta)?;
            }
        }
        b"LIST" | b"list" => {
            if flags.text {
                read_list(reader, header, sample_rate, meta)?;
            }
        }
        _ => {
            if flags.custom {
                meta.add_block(read_opaque_block(reader, header)?);
            }
        }
    }
    Ok(())
}

fn read_bext<S: Read + Seek>(reader: &mut ByteReader<S>, len: u64, meta: &mut MetaData) -> Result<()> {
    let broadcast = &mut meta.broadcast;

    broadcast.description = decode_optional_text(&reader.read_array::<256>()?);
    broadcast.originator = decode_optional_text(&reader.read_array::<32>()?);
    broadcast.originator_ref = decode_optional_text(&reader.read_array::<32>()?);
    broadcast.origination_date = decode_optional_text(&reader.read_array::<10>()?);
    broadcast.origination_time = decode_optional_text(&reader.read_array::<8>()?);

    let low = u64::from(reader.read_u32()?);
    let high = u64::from(reader.read_u32()?);
    broadcast.time_reference = (high << 32) | low;
    broadcast.version = reader.read_u16()?;

    let umid = reader.read_array::<64>()?;
    broadcast.umid = umid
        .iter()
        .any(|&b| b != 0)
        .then(|| bytes::Bytes::copy_from_slice(&umid));

    reader.skip(190)?;

    if len > BEXT_FIXED_LEN {
        let history_len = usize::try_from(len - BEXT_FIXED_LEN)
            .map_err(|_| ReaderError::Memory(format!("{} byte coding history", len)))?;
        let history = reader.read_bytes(history_len)?;
        broadcast.coding_history = decode_optional_text(&history);
    }
    Ok(())
}

fn read_smpl<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    len: u64,
    sample_rate: f64,
    flags: &MetadataFlags,
    meta: &mut MetaData,
) -> Result<()> {
    let manufacturer = reader.read_u32()?;
    let product = reader.read_u32()?;
    let sample_period = reader.read_u32()?;
    let unity_note = reader.read_u32()?;
    let pitch_fraction = reader.read_u32()?;
    let smpte_format = reader.read_u32()?;
    let smpte_offset = reader.read_u32()?;
    let num_loops = reader.read_u32()?;
    let sampler_data_len = reader.read_u32()?;

    meta.sampler.manufacturer = manufacturer;
    meta.sampler.product = product;
    meta.sampler.sample_period = if sample_period == 0 {
        (1_000_000_000.0 / sample_rate) as u32
    } else {
        sample_period
    };
    meta.sampler.smpte_format = smpte_format;
    meta.sampler.smpte_offset = smpte_offset;

    meta.instrument.base_note = unity_note.min(127) as i32;
    // Fraction of a semitone in 0.32 fixed point; 0x8000_0000 is 50 cents.
    meta.instrument.detune = (f64::from(pitch_fraction) * 100.0 / 4_294_967_296.0).round() as i32;

    for _ in 0..num_loops {
        let cue_id = reader.read_u32()?;
        let loop_type = reader.read_u32()?;
        let start = f64::from(reader.read_u32()?) / sample_rate;
        let end = f64::from(reader.read_u32()?) / sample_rate;
        let fraction = f64::from(reader.read_u32()?) / 4_294_967_296.0 / sample_rate;
        let play_count = reader.read_u32()?;

        let anchor = meta
            .remove_cue_point(cue_id)
            .unwrap_or_else(|| CuePoint::new(cue_id, start));

        let region = Region::from_anchor(anchor, start, end, RegionType::Loop)
            .with_options(loop_type)
            .with_fraction(fraction)
            .with_play_count(play_count);
        meta.add_loop_point(region);
    }

    if sampler_data_len > 0 && flags.extra_sampler_data {
        let consumed = 36 + u64::from(num_loops) * 24;
        let available = len.saturating_sub(consumed).min(u64::from(sampler_data_len));
        let extra = reader.read_bytes(available as usize)?;
        meta.sampler.extra_data = Some(extra.into());
    }
    Ok(())
}

fn read_inst<S: Read + Seek>(reader: &mut ByteReader<S>, meta: &mut MetaData) -> Result<()> {
    let fields = reader.read_array::<7>()?;
    let [base_note, detune, gain, low_note, high_note, low_velocity, high_velocity] =
        fields.map(|b| i32::from(b as i8));

    let instrument = &mut meta.instrument;
    instrument.base_note = base_note;
    instrument.detune = detune;
    instrument.gain = gain;
    instrument.low_note = low_note;
    instrument.high_note = high_note;
    instrument.low_velocity = low_velocity;
    instrument.high_velocity = high_velocity;
    Ok(())
}

fn read_cue<S: Read + Seek>(reader: &mut ByteReader<S>, sample_rate: f64, meta: &mut MetaData) -> Result<()> {
    let count = reader.read_u32()?;

    for _ in 0..count {
        let id = reader.read_u32()?;
        let _order = reader.read_u32()?;
        let chunk_id = reader.read_fourcc()?;
        let chunk_start = reader.read_u32()?;
        let block_start = reader.read_u32()?;
        let offset = reader.read_u32()?;

        if &chunk_id != b"data" || chunk_start != 0 || block_start != 0 {
            return Err(ReaderError::UnsupportedType(format!(
                "cue {} refers to a playlist entry in {:?}",
                id,
                String::from_utf8_lossy(&chunk_id)
            )));
        }

        meta.add_cue_point(CuePoint::new(id, f64::from(offset) / sample_rate));
    }
    Ok(())
}

fn read_list<S: Read + Seek>(
    reader: &mut ByteReader<S>,
    header: &ChunkHeader,
    sample_rate: f64,
    meta: &mut MetaData,
) -> Result<()> {
    let list_type = reader.read_fourcc()?;
    if &list_type != b"adtl" {
        debug!(list_type = %String::from_utf8_lossy(&list_type), "Ignoring LIST chunk");
        return Ok(());
    }

    let list_end = header
        .available_len(reader)
        .map(|len| header.data_pos + len);

    walk_chunks(reader, &ContainerLayout::RIFF, list_end, |reader, sub| {
        let len = sub.available_len(reader).unwrap_or(0);
        match sub.id {
            ChunkId::FourCc(code) if &code == b"labl" || &code == b"note" => {
                let cue_id = reader.read_u32()?;
                let text = reader.read_bytes(len.saturating_sub(4) as usize)?;
                if let Some(cue) = meta.find_marker_mut(cue_id) {
                    if &code == b"labl" {
                        cue.set_label(decode_optional_text(&text));
                    } else {
                        cue.set_comment(decode_optional_text(&text));
                    }
                }
            }
            ChunkId::FourCc(code) if &code == b"ltxt" => {
                let cue_id = reader.read_u32()?;
                if let Some(mut anchor) = meta.remove_cue_point(cue_id) {
                    let sample_length = reader.read_u32()?;
                    let purpose = reader.read_u32()?;

                    let extra = anchor.extra_mut();
                    extra.purpose = purpose;
                    extra.country = reader.read_u16()?;
                    extra.language = reader.read_u16()?;
                    extra.dialect = reader.read_u16()?;
                    extra.code_page = reader.read_u16()?;

                    let text = reader.read_bytes(len.saturating_sub(20) as usize)?;
                    if let Some(label) = decode_optional_text(&text) {
                        anchor.set_label(Some(label));
                    }

                    let start = anchor.position();
                    let end = start + f64::from(sample_length) / sample_rate;
                    meta.add_region(Region::from_anchor(anchor, start, end, RegionType::Generic));
                }
            }
            other => debug!(id = %other, "Skipping adtl sub-chunk"),
        }
        Ok(Walk::Continue)
    })
}
