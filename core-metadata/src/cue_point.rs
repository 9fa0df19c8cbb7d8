//! Cue points: named, sample-accurate position markers.

use serde::{Deserialize, Serialize};

/// Role a cue point plays in the metadata model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CuePointType {
    /// A loose marker.
    #[default]
    CuePoint,
    /// The anchor of a region (usually equal to its start).
    RegionAnchor,
    /// The first frame of a region.
    RegionStart,
    /// The end of a region.
    RegionEnd,
}

/// Labelled-text fields carried by WAV `ltxt` chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuePointExtra {
    pub purpose: u32,
    pub country: u16,
    pub language: u16,
    pub dialect: u16,
    pub code_page: u16,
}

/// A position marker in seconds.
///
/// Ids are container-defined and only unique within the metadata of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePoint {
    id: u32,
    position: f64,
    label: Option<String>,
    comment: Option<String>,
    cue_type: CuePointType,
    extra: Option<Box<CuePointExtra>>,
}

impl CuePoint {
    pub fn new(id: u32, position: f64) -> Self {
        Self {
            id,
            position,
            label: None,
            comment: None,
            cue_type: CuePointType::CuePoint,
            extra: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_type(mut self, cue_type: CuePointType) -> Self {
        self.cue_type = cue_type;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    /// Position in seconds from the first frame.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub fn cue_type(&self) -> CuePointType {
        self.cue_type
    }

    pub fn set_type(&mut self, cue_type: CuePointType) {
        self.cue_type = cue_type;
    }

    pub fn extra(&self) -> Option<&CuePointExtra> {
        self.extra.as_deref()
    }

    /// Extra fields, allocated on first access.
    pub fn extra_mut(&mut self) -> &mut CuePointExtra {
        self.extra.get_or_insert_with(Box::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cue_point_is_loose() {
        let cue = CuePoint::new(3, 1.5);
        assert_eq!(cue.id(), 3);
        assert_eq!(cue.position(), 1.5);
        assert_eq!(cue.cue_type(), CuePointType::CuePoint);
        assert!(cue.label().is_none());
        assert!(cue.extra().is_none());
    }

    #[test]
    fn test_extra_is_lazily_allocated() {
        let mut cue = CuePoint::new(0, 0.0);
        cue.extra_mut().language = 9;
        cue.extra_mut().code_page = 1252;

        let extra = cue.extra().unwrap();
        assert_eq!(extra.language, 9);
        assert_eq!(extra.code_page, 1252);
        assert_eq!(extra.purpose, 0);
    }
}
