//! Integration tests for the metadata model

use core_metadata::comments::{apply_comments, CommentMapping, VorbisComments};
use core_metadata::{BlockId, CuePoint, MetaData, OpaqueBlock, Region, RegionType};
use pretty_assertions::assert_eq;

fn sample_metadata() -> MetaData {
    let mut meta = MetaData::new();
    meta.text.title = Some("Field Recording".to_string());
    meta.broadcast.originator = Some("Recorder".to_string());
    meta.broadcast.time_reference = 48_000 * 3600;

    meta.add_cue_point(CuePoint::new(1, 0.5).with_label("door"));
    meta.add_cue_point(CuePoint::new(2, 1.25));

    let anchor = meta.remove_cue_point(2).unwrap();
    meta.add_loop_point(
        Region::from_anchor(anchor, 1.25, 2.0, RegionType::Loop)
            .with_play_count(0)
            .with_options(1),
    );
    meta.add_block(OpaqueBlock::new(BlockId::FourCc(*b"iXML"), b"<BWFXML/>".to_vec()));
    meta
}

#[test_log::test]
fn test_cue_point_is_never_loose_and_consumed() {
    let meta = sample_metadata();

    let loose: Vec<u32> = meta.cue_points().iter().map(CuePoint::id).collect();
    let consumed: Vec<u32> = meta.loop_points().iter().map(Region::id).collect();

    assert_eq!(loose, vec![1]);
    assert_eq!(consumed, vec![2]);
    assert!(loose.iter().all(|id| !consumed.contains(id)));
}

#[test_log::test]
fn test_metadata_snapshot_round_trips_through_json() {
    let meta = sample_metadata();

    let json = serde_json::to_string(&meta).unwrap();
    let restored: MetaData = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, meta);
    assert_eq!(restored.blocks()[0].data().as_ref(), b"<BWFXML/>");
}

#[test_log::test]
fn test_comments_fill_existing_metadata() {
    let mut data = Vec::new();
    let vendor = b"Lavf";
    data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    data.extend_from_slice(vendor);
    let entries = ["GENRE=Ambient", "CHAPTER001=00:00:00.500", "CHAPTER001NAME=door again"];
    data.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        data.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        data.extend_from_slice(entry.as_bytes());
    }

    let mut meta = sample_metadata();
    let comments = VorbisComments::parse(&data).unwrap();
    apply_comments(&mut meta, &comments, CommentMapping::all());

    assert_eq!(meta.text.genre.as_deref(), Some("Ambient"));
    // Chapter 1 lands on the existing cue with the same id
    assert_eq!(meta.cue_points().len(), 1);
    assert_eq!(meta.find_cue_point(1).unwrap().label(), Some("door again"));
}
