//! Regions: named ranges built from three owned cue points.

use serde::{Deserialize, Serialize};

use crate::cue_point::{CuePoint, CuePointType};

/// What a region is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionType {
    #[default]
    Generic,
    Selection,
    Loop,
    Lyrics,
}

/// A range with an anchor.
///
/// The anchor normally sits on the start. WAV sampler loops are the
/// exception: the anchor keeps the cue point the loop refers to while start
/// and end carry the loop bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    anchor: CuePoint,
    start: CuePoint,
    end: CuePoint,
    region_type: RegionType,
    options: u32,
    fraction: f64,
    play_count: u32,
}

impl Region {
    /// Creates a region between `start` and `end` seconds, anchored at the start.
    pub fn new(id: u32, start: f64, end: f64, region_type: RegionType) -> Self {
        Self::from_anchor(CuePoint::new(id, start), start, end, region_type)
    }

    /// Builds a region around an existing cue point, taking ownership of it.
    ///
    /// The anchor keeps its own position, label and extra fields.
    pub fn from_anchor(mut anchor: CuePoint, start: f64, end: f64, region_type: RegionType) -> Self {
        anchor.set_type(CuePointType::RegionAnchor);
        let id = anchor.id();

        Self {
            anchor,
            start: CuePoint::new(id, start).with_type(CuePointType::RegionStart),
            end: CuePoint::new(id, end).with_type(CuePointType::RegionEnd),
            region_type,
            options: 0,
            fraction: 0.0,
            play_count: 0,
        }
    }

    pub fn with_options(mut self, options: u32) -> Self {
        self.options = options;
        self
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction;
        self
    }

    pub fn with_play_count(mut self, play_count: u32) -> Self {
        self.play_count = play_count;
        self
    }

    pub fn id(&self) -> u32 {
        self.anchor.id()
    }

    pub fn anchor(&self) -> &CuePoint {
        &self.anchor
    }

    pub fn anchor_mut(&mut self) -> &mut CuePoint {
        &mut self.anchor
    }

    pub fn start(&self) -> &CuePoint {
        &self.start
    }

    pub fn end(&self) -> &CuePoint {
        &self.end
    }

    pub fn start_position(&self) -> f64 {
        self.start.position()
    }

    pub fn end_position(&self) -> f64 {
        self.end.position()
    }

    pub fn anchor_position(&self) -> f64 {
        self.anchor.position()
    }

    /// Moves the range, leaving the anchor where it is.
    pub fn set_range(&mut self, start: f64, end: f64) {
        self.start.set_position(start);
        self.end.set_position(end);
    }

    pub fn length(&self) -> f64 {
        self.end.position() - self.start.position()
    }

    /// A region whose start and end coincide.
    pub fn is_point(&self) -> bool {
        self.length() == 0.0
    }

    pub fn label(&self) -> Option<&str> {
        self.anchor.label()
    }

    pub fn region_type(&self) -> RegionType {
        self.region_type
    }

    pub fn options(&self) -> u32 {
        self.options
    }

    /// Fractional loop-point offset in seconds.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn play_count(&self) -> u32 {
        self.play_count
    }
}
