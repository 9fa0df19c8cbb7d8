//! The metadata aggregate owned by a reader.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::cue_point::CuePoint;
use crate::opaque::OpaqueBlock;
use crate::region::Region;

/// Free-text tags (INFO-style and Vorbis comments).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextTags {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artists: Vec<String>,
    pub performers: Vec<String>,
    pub descriptions: Vec<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub year: Option<i32>,
    pub isrc: Option<String>,
    pub organization: Option<String>,
    pub vendor: Option<String>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub lyrics: Option<String>,
}

/// Broadcast-wave (`bext`) fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastInfo {
    pub description: Option<String>,
    pub originator: Option<String>,
    pub originator_ref: Option<String>,
    /// `yyyy-mm-dd` as stored; any of `- _ : . space` may separate fields.
    pub origination_date: Option<String>,
    /// `hh:mm:ss` as stored.
    pub origination_time: Option<String>,
    /// Sample count since midnight of the first frame.
    pub time_reference: u64,
    pub version: u16,
    pub umid: Option<Bytes>,
    pub coding_history: Option<String>,
}

impl BroadcastInfo {
    /// Parses the stored date and time into a timestamp.
    ///
    /// A missing time defaults to midnight.
    pub fn origination_datetime(&self) -> Option<NaiveDateTime> {
        let date = normalize_separators(self.origination_date.as_deref()?, '-');
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;

        let time = match self.origination_time.as_deref() {
            Some(time) => {
                NaiveTime::parse_from_str(&normalize_separators(time, ':'), "%H:%M:%S").ok()?
            }
            None => NaiveTime::MIN,
        };

        Some(date.and_time(time))
    }
}

fn normalize_separators(text: &str, separator: char) -> String {
    text.trim()
        .chars()
        .map(|c| if matches!(c, '-' | '_' | ':' | ' ' | '.') { separator } else { c })
        .collect()
}

/// Sampler (`smpl`) parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerInfo {
    pub manufacturer: u32,
    pub product: u32,
    /// Sample period in nanoseconds.
    pub sample_period: u32,
    pub smpte_format: u32,
    pub smpte_offset: u32,
    /// Manufacturer-specific trailer, kept only when requested.
    pub extra_data: Option<Bytes>,
}

/// Instrument parameters (`inst`, and the note fields of `smpl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// MIDI unity note.
    pub base_note: i32,
    /// Detune in cents.
    pub detune: i32,
    /// Gain in dB.
    pub gain: i32,
    pub low_note: i32,
    pub high_note: i32,
    pub low_velocity: i32,
    pub high_velocity: i32,
}

impl Default for InstrumentInfo {
    fn default() -> Self {
        Self {
            base_note: 60,
            detune: 0,
            gain: 0,
            low_note: 0,
            high_note: 127,
            low_velocity: 1,
            high_velocity: 127,
        }
    }
}

/// Everything a metadata pass recovered from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub text: TextTags,
    pub broadcast: BroadcastInfo,
    pub sampler: SamplerInfo,
    pub instrument: InstrumentInfo,
    pub edit_count: Option<u32>,
    pub source_format: Option<String>,
    cue_points: Vec<CuePoint>,
    regions: Vec<Region>,
    loop_points: Vec<Region>,
    blocks: Vec<OpaqueBlock>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cue_points(&self) -> &[CuePoint] {
        &self.cue_points
    }

    pub fn add_cue_point(&mut self, cue_point: CuePoint) {
        self.cue_points.push(cue_point);
    }

    pub fn find_cue_point(&self, id: u32) -> Option<&CuePoint> {
        self.cue_points.iter().find(|cue| cue.id() == id)
    }

    pub fn find_cue_point_mut(&mut self, id: u32) -> Option<&mut CuePoint> {
        self.cue_points.iter_mut().find(|cue| cue.id() == id)
    }

    /// Takes a loose cue point out of the list so a region can own it.
    pub fn remove_cue_point(&mut self, id: u32) -> Option<CuePoint> {
        let index = self.cue_points.iter().position(|cue| cue.id() == id)?;
        Some(self.cue_points.remove(index))
    }

    /// Finds the cue point with `id`, loose or already anchoring a region.
    ///
    /// Text chunks may name a cue after it has been promoted into a region.
    pub fn find_marker_mut(&mut self, id: u32) -> Option<&mut CuePoint> {
        if let Some(index) = self.cue_points.iter().position(|cue| cue.id() == id) {
            return Some(&mut self.cue_points[index]);
        }

        self.regions
            .iter_mut()
            .chain(self.loop_points.iter_mut())
            .find(|region| region.id() == id)
            .map(Region::anchor_mut)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn add_region(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn loop_points(&self) -> &[Region] {
        &self.loop_points
    }

    pub fn add_loop_point(&mut self, region: Region) {
        self.loop_points.push(region);
    }

    pub fn blocks(&self) -> &[OpaqueBlock] {
        &self.blocks
    }

    pub fn add_block(&mut self, block: OpaqueBlock) {
        self.blocks.push(block);
    }

    /// Orders loose cue points by position, ties broken by id.
    pub fn sort_cue_points(&mut self) {
        self.cue_points.sort_by(|a, b| {
            a.position()
                .total_cmp(&b.position())
                .then(a.id().cmp(&b.id()))
        });
    }

    pub fn has_markers(&self) -> bool {
        !(self.cue_points.is_empty() && self.regions.is_empty() && self.loop_points.is_empty())
    }
}
