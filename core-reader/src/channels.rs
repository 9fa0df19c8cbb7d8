//! # Channel Layouts
//!
//! CoreAudio-style channel identifiers and the per-container rules that map
//! channel masks and layout tags onto them.
//!
//! Identifiers `1..=18` line up with WAVE-extensible speaker bits: bit `b`
//! of a channel mask is identifier `b + 1`. Channels without a known
//! position are numbered with [`discrete`].

use crate::format::{ChannelLayout, FormatInfo};

pub const NONE: u32 = 0;
pub const FRONT_LEFT: u32 = 1;
pub const FRONT_RIGHT: u32 = 2;
pub const FRONT_CENTER: u32 = 3;
pub const LOW_FREQUENCY: u32 = 4;
pub const BACK_LEFT: u32 = 5;
pub const BACK_RIGHT: u32 = 6;
pub const FRONT_LEFT_OF_CENTER: u32 = 7;
pub const FRONT_RIGHT_OF_CENTER: u32 = 8;
pub const BACK_CENTER: u32 = 9;
pub const SIDE_LEFT: u32 = 10;
pub const SIDE_RIGHT: u32 = 11;
pub const TOP_CENTER: u32 = 12;
pub const TOP_FRONT_LEFT: u32 = 13;
pub const TOP_FRONT_CENTER: u32 = 14;
pub const TOP_FRONT_RIGHT: u32 = 15;
pub const TOP_BACK_LEFT: u32 = 16;
pub const TOP_BACK_CENTER: u32 = 17;
pub const TOP_BACK_RIGHT: u32 = 18;
pub const LEFT_TOTAL: u32 = 38;
pub const RIGHT_TOTAL: u32 = 39;
pub const MONO: u32 = 42;
pub const MS_MID: u32 = 204;
pub const MS_SIDE: u32 = 205;
pub const XY_X: u32 = 206;
pub const XY_Y: u32 = 207;
pub const HEADPHONES_LEFT: u32 = 301;
pub const HEADPHONES_RIGHT: u32 = 302;
pub const AMBISONIC_W: u32 = 200;
pub const AMBISONIC_X: u32 = 201;
pub const AMBISONIC_Y: u32 = 202;
pub const AMBISONIC_Z: u32 = 203;

/// Channel label meaning "position given as coordinates".
pub const USE_COORDINATES: u32 = 100;

/// Base of the numbered-channel identifiers.
pub const DISCRETE_N: u32 = 1 << 16;

/// Speaker bits defined for WAVE-extensible and CAF channel bitmaps.
const VALID_MASK_BITS: u32 = 0x3_ffff;

/// The identifier of the `index`th unpositioned channel.
pub const fn discrete(index: u32) -> u32 {
    DISCRETE_N | index
}

/// `0, 1, 2, ...` numbered channels.
pub fn discrete_layout(num_channels: u32) -> Vec<u32> {
    (0..num_channels).map(discrete).collect()
}

/// Mono or stereo, otherwise discrete.
pub fn simple_layout(num_channels: u32) -> Vec<u32> {
    match num_channels {
        1 => vec![MONO],
        2 => vec![FRONT_LEFT, FRONT_RIGHT],
        n => discrete_layout(n),
    }
}

/// Default speaker order of WAV files (and Ogg streams) without a mask.
pub fn wav_default_layout(num_channels: u32) -> Vec<u32> {
    let tag = match num_channels {
        1 => tags::MONO,
        2 => tags::STEREO,
        3 => tags::AC3_3_0,
        4 => tags::QUADRAPHONIC,
        5 => tags::MPEG_5_0_C,
        6 => tags::MPEG_5_1_C,
        7 => tags::OGG_6_1,
        8 => tags::OGG_7_1,
        n => return discrete_layout(n),
    };
    layout_tag_identifiers(tag).unwrap_or_else(|| discrete_layout(num_channels))
}

/// Default speaker order of AIFF files.
pub fn aiff_default_layout(num_channels: u32) -> Vec<u32> {
    let tag = match num_channels {
        1 => tags::MONO,
        2 => tags::STEREO,
        3 => tags::MPEG_3_0_A,
        4 => tags::QUADRAPHONIC,
        5 => tags::MPEG_5_0_A,
        6 => tags::AIFF_6_0,
        n => return discrete_layout(n),
    };
    layout_tag_identifiers(tag).unwrap_or_else(|| discrete_layout(num_channels))
}

/// Maps a speaker bitmask to identifiers in bit order.
///
/// A zero mask means "unspecified" and yields [`simple_layout`]. Channels
/// beyond the set bits are left as [`NONE`].
pub fn mask_to_identifiers(mask: u32, num_channels: u32) -> Vec<u32> {
    if mask == 0 {
        return simple_layout(num_channels);
    }

    let mut identifiers: Vec<u32> = (0..31)
        .filter(|bit| (1 << bit) & VALID_MASK_BITS & mask != 0)
        .map(|bit| bit + 1)
        .take(num_channels as usize)
        .collect();
    identifiers.resize(num_channels as usize, NONE);
    identifiers
}

/// CoreAudio layout tags. The low 16 bits carry the channel count.
pub mod tags {
    pub const USE_CHANNEL_DESCRIPTIONS: u32 = 0;
    pub const USE_CHANNEL_BITMAP: u32 = 1 << 16;
    pub const MONO: u32 = (100 << 16) | 1;
    pub const STEREO: u32 = (101 << 16) | 2;
    pub const STEREO_HEADPHONES: u32 = (102 << 16) | 2;
    pub const MATRIX_STEREO: u32 = (103 << 16) | 2;
    pub const MID_SIDE: u32 = (104 << 16) | 2;
    pub const XY: u32 = (105 << 16) | 2;
    pub const BINAURAL: u32 = (106 << 16) | 2;
    pub const AMBISONIC_B_FORMAT: u32 = (107 << 16) | 4;
    pub const QUADRAPHONIC: u32 = (108 << 16) | 4;
    pub const PENTAGONAL: u32 = (109 << 16) | 5;
    pub const HEXAGONAL: u32 = (110 << 16) | 6;
    pub const OCTAGONAL: u32 = (111 << 16) | 8;
    pub const CUBE: u32 = (112 << 16) | 8;
    pub const MPEG_3_0_A: u32 = (113 << 16) | 3;
    pub const MPEG_3_0_B: u32 = (114 << 16) | 3;
    pub const MPEG_4_0_A: u32 = (115 << 16) | 4;
    pub const MPEG_4_0_B: u32 = (116 << 16) | 4;
    pub const MPEG_5_0_A: u32 = (117 << 16) | 5;
    pub const MPEG_5_0_B: u32 = (118 << 16) | 5;
    pub const MPEG_5_0_C: u32 = (119 << 16) | 5;
    pub const MPEG_5_0_D: u32 = (120 << 16) | 5;
    pub const MPEG_5_1_A: u32 = (121 << 16) | 6;
    pub const MPEG_5_1_B: u32 = (122 << 16) | 6;
    pub const MPEG_5_1_C: u32 = (123 << 16) | 6;
    pub const MPEG_5_1_D: u32 = (124 << 16) | 6;
    pub const MPEG_6_1_A: u32 = (125 << 16) | 7;
    pub const MPEG_7_1_A: u32 = (126 << 16) | 8;
    pub const AC3_3_0: u32 = (149 << 16) | 3;
    pub const DISCRETE_IN_ORDER: u32 = 147 << 16;
    pub const UNKNOWN: u32 = 0xffff_0000;

    // Orders with no CoreAudio tag, numbered from the private range.
    pub const AIFF_6_0: u32 = (0xff00 << 16) | 6;
    pub const OGG_6_1: u32 = (0xff01 << 16) | 7;
    pub const OGG_7_1: u32 = (0xff02 << 16) | 8;
}

/// Channel count encoded in a layout tag.
pub const fn tag_channel_count(tag: u32) -> u32 {
    tag & 0xffff
}

/// Identifiers of a fixed layout tag, or `None` for bitmap/description tags
/// and tags this crate does not know.
pub fn layout_tag_identifiers(tag: u32) -> Option<Vec<u32>> {
    let count = tag_channel_count(tag);
    let family = tag & 0xffff_0000;

    if family == tags::UNKNOWN {
        return Some(vec![NONE; count as usize]);
    }
    if family == tags::DISCRETE_IN_ORDER {
        return Some(discrete_layout(count));
    }

    let identifiers: &[u32] = match tag {
        tags::MONO => &[MONO],
        tags::STEREO => &[FRONT_LEFT, FRONT_RIGHT],
        tags::STEREO_HEADPHONES | tags::BINAURAL => &[HEADPHONES_LEFT, HEADPHONES_RIGHT],
        tags::MATRIX_STEREO => &[LEFT_TOTAL, RIGHT_TOTAL],
        tags::MID_SIDE => &[MS_MID, MS_SIDE],
        tags::XY => &[XY_X, XY_Y],
        tags::AMBISONIC_B_FORMAT => &[AMBISONIC_W, AMBISONIC_X, AMBISONIC_Y, AMBISONIC_Z],
        tags::QUADRAPHONIC => &[FRONT_LEFT, FRONT_RIGHT, BACK_LEFT, BACK_RIGHT],
        tags::PENTAGONAL => &[FRONT_LEFT, FRONT_RIGHT, BACK_LEFT, BACK_RIGHT, FRONT_CENTER],
        tags::HEXAGONAL => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            FRONT_CENTER,
            BACK_CENTER,
        ],
        tags::OCTAGONAL => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            FRONT_CENTER,
            BACK_CENTER,
            SIDE_LEFT,
            SIDE_RIGHT,
        ],
        tags::CUBE => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            TOP_FRONT_LEFT,
            TOP_FRONT_RIGHT,
            TOP_BACK_LEFT,
            TOP_BACK_RIGHT,
        ],
        tags::MPEG_3_0_A => &[FRONT_LEFT, FRONT_RIGHT, FRONT_CENTER],
        tags::MPEG_3_0_B => &[FRONT_CENTER, FRONT_LEFT, FRONT_RIGHT],
        tags::AC3_3_0 => &[FRONT_LEFT, FRONT_CENTER, FRONT_RIGHT],
        tags::MPEG_4_0_A => &[FRONT_LEFT, FRONT_RIGHT, FRONT_CENTER, BACK_CENTER],
        tags::MPEG_4_0_B => &[FRONT_CENTER, FRONT_LEFT, FRONT_RIGHT, BACK_CENTER],
        tags::MPEG_5_0_A => &[FRONT_LEFT, FRONT_RIGHT, FRONT_CENTER, BACK_LEFT, BACK_RIGHT],
        tags::MPEG_5_0_B => &[FRONT_LEFT, FRONT_RIGHT, BACK_LEFT, BACK_RIGHT, FRONT_CENTER],
        tags::MPEG_5_0_C => &[FRONT_LEFT, FRONT_CENTER, FRONT_RIGHT, BACK_LEFT, BACK_RIGHT],
        tags::MPEG_5_0_D => &[FRONT_CENTER, FRONT_LEFT, FRONT_RIGHT, BACK_LEFT, BACK_RIGHT],
        tags::MPEG_5_1_A => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            FRONT_CENTER,
            LOW_FREQUENCY,
            BACK_LEFT,
            BACK_RIGHT,
        ],
        tags::MPEG_5_1_B => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            FRONT_CENTER,
            LOW_FREQUENCY,
        ],
        tags::MPEG_5_1_C => &[
            FRONT_LEFT,
            FRONT_CENTER,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            LOW_FREQUENCY,
        ],
        tags::MPEG_5_1_D => &[
            FRONT_CENTER,
            FRONT_LEFT,
            FRONT_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            LOW_FREQUENCY,
        ],
        tags::MPEG_6_1_A => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            FRONT_CENTER,
            LOW_FREQUENCY,
            BACK_LEFT,
            BACK_RIGHT,
            BACK_CENTER,
        ],
        tags::MPEG_7_1_A => &[
            FRONT_LEFT,
            FRONT_RIGHT,
            FRONT_CENTER,
            LOW_FREQUENCY,
            BACK_LEFT,
            BACK_RIGHT,
            FRONT_LEFT_OF_CENTER,
            FRONT_RIGHT_OF_CENTER,
        ],
        tags::AIFF_6_0 => &[
            FRONT_LEFT_OF_CENTER,
            FRONT_LEFT,
            FRONT_CENTER,
            FRONT_RIGHT_OF_CENTER,
            FRONT_RIGHT,
            BACK_CENTER,
        ],
        tags::OGG_6_1 => &[
            FRONT_LEFT,
            FRONT_CENTER,
            FRONT_RIGHT,
            SIDE_LEFT,
            SIDE_RIGHT,
            BACK_CENTER,
            LOW_FREQUENCY,
        ],
        tags::OGG_7_1 => &[
            FRONT_LEFT,
            FRONT_CENTER,
            FRONT_RIGHT,
            SIDE_LEFT,
            SIDE_RIGHT,
            BACK_LEFT,
            BACK_RIGHT,
            LOW_FREQUENCY,
        ],
        _ => return None,
    };

    Some(identifiers.to_vec())
}

impl FormatInfo {
    /// Sets identifiers, padding or truncating to the channel count.
    pub fn set_identifiers(&mut self, mut identifiers: Vec<u32>) {
        identifiers.resize(self.num_channels as usize, NONE);
        self.layout = ChannelLayout::Identifiers(identifiers);
    }
}
