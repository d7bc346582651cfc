//! Tracker module sniffers
//!
//! ProTracker modules have no magic at offset 0; the channel tag sits at
//! offset 1080 after 31 sample headers. The tag list is the set seen in
//! circulating files rather than anything formally specified.

use wadforge_core::buffer::read;
use wadforge_core::Confidence;

pub(crate) const MOD_MIN: usize = 1084;
pub(crate) const XM_MIN: usize = 60;
pub(crate) const S3M_MIN: usize = 48;
pub(crate) const IT_MIN: usize = 192;

const MOD_TAG_OFFSET: usize = 1080;
const MOD_SONG_LENGTH_OFFSET: usize = 950;

const MOD_TAGS: [&[u8; 4]; 10] = [
    b"M.K.", b"M!K!", b"M&K!", b"FLT4", b"FLT8", b"4CHN", b"6CHN", b"8CHN", b"CD81", b"OKTA",
];

/// ProTracker and compatible 31-sample modules
pub fn detect_mod(data: &[u8]) -> Confidence {
    if data.len() < MOD_MIN {
        return Confidence::NoMatch;
    }
    let Some(tag) = read::bytes(data, MOD_TAG_OFFSET, 4) else {
        return Confidence::NoMatch;
    };

    // "xxCH" / "xxCN" with a two-digit channel count
    let numbered = tag[0].is_ascii_digit()
        && tag[1].is_ascii_digit()
        && (&tag[2..] == b"CH" || &tag[2..] == b"CN");

    if !numbered && !MOD_TAGS.iter().any(|t| t.as_slice() == tag) {
        return Confidence::NoMatch;
    }

    match read::u8(data, MOD_SONG_LENGTH_OFFSET) {
        Some(1..=128) => Confidence::Probably,
        _ => Confidence::Maybe,
    }
}

/// FastTracker 2 extended module
pub fn detect_xm(data: &[u8]) -> Confidence {
    if data.len() >= XM_MIN && read::magic_at(data, 0, b"Extended Module: ") && read::u8(data, 37) == Some(0x1A) {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// ScreamTracker 3 module
pub fn detect_s3m(data: &[u8]) -> Confidence {
    if data.len() >= S3M_MIN
        && read::u8(data, 28) == Some(0x1A)
        && read::u8(data, 29) == Some(16)
        && read::magic_at(data, 44, b"SCRM")
    {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// Impulse Tracker module
pub fn detect_it(data: &[u8]) -> Confidence {
    if data.len() >= IT_MIN && read::magic_at(data, 0, b"IMPM") {
        Confidence::Probably
    } else {
        Confidence::NoMatch
    }
}
