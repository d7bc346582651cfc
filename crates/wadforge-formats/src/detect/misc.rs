//! Models, console fonts and plain text

use wadforge_core::buffer::read;
use wadforge_core::Confidence;

pub(crate) const MD2_MIN: usize = 68;
pub(crate) const MD3_MIN: usize = 108;
pub(crate) const FON1_MIN: usize = 8;
pub(crate) const FON2_MIN: usize = 10;
pub(crate) const TEXT_MIN: usize = 1;

/// Bytes inspected by the text heuristic
const TEXT_SAMPLE: usize = 4096;

/// Quake 2 model
pub fn detect_md2(data: &[u8]) -> Confidence {
    if data.len() >= MD2_MIN && read::magic_at(data, 0, b"IDP2") && read::i32_le(data, 4) == Some(8) {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// Quake 3 model
pub fn detect_md3(data: &[u8]) -> Confidence {
    if data.len() >= MD3_MIN && read::magic_at(data, 0, b"IDP3") && read::i32_le(data, 4) == Some(15) {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// ZDoom FON1 console font: magic, u16 char width, u16 char height
pub fn detect_fon1(data: &[u8]) -> Confidence {
    if data.len() < FON1_MIN || !read::magic_at(data, 0, b"FON1") {
        return Confidence::NoMatch;
    }
    match (read::u16_le(data, 4), read::u16_le(data, 6)) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Confidence::Certain,
        _ => Confidence::Unlikely,
    }
}

/// ZDoom FON2 font: magic, u16 height, first and last character
pub fn detect_fon2(data: &[u8]) -> Confidence {
    if data.len() < FON2_MIN || !read::magic_at(data, 0, b"FON2") {
        return Confidence::NoMatch;
    }
    match (read::u16_le(data, 4), read::u8(data, 6), read::u8(data, 7)) {
        (Some(h), Some(first), Some(last)) if h > 0 && first <= last => Confidence::Certain,
        _ => Confidence::Unlikely,
    }
}

/// Plain text: no NULs, few control characters, valid UTF-8 in the sample
pub fn detect_text(data: &[u8]) -> Confidence {
    if data.len() < TEXT_MIN {
        return Confidence::NoMatch;
    }
    let sample = &data[..data.len().min(TEXT_SAMPLE)];

    let mut control = 0usize;
    for &b in sample {
        match b {
            0 => return Confidence::NoMatch,
            b'\t' | b'\n' | b'\r' | 0x0C | 0x1A => {}
            b if b < 0x20 || b == 0x7F => control += 1,
            _ => {}
        }
    }
    if control * 100 > sample.len() {
        return Confidence::NoMatch;
    }

    match std::str::from_utf8(sample) {
        Ok(_) => Confidence::Maybe,
        // a multi-byte character cut off by the sample window
        Err(e) if e.error_len().is_none() => Confidence::Maybe,
        Err(_) => Confidence::NoMatch,
    }
}
