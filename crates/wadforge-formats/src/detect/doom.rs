//! Doom-engine lump sniffers
//!
//! Most of these lumps have no magic number. They are recognised by exact
//! sizes (PLAYPAL, COLORMAP, ENDOOM) or by a count field that has to
//! multiply out to the lump size (PNAMES, TEXTURE1/2).

use wadforge_core::buffer::read;
use wadforge_core::Confidence;

pub(crate) const ACS_MIN: usize = 8;
pub(crate) const PNAMES_MIN: usize = 12;
pub(crate) const TEXTUREX_MIN: usize = 30;
pub(crate) const PLAYPAL_MIN: usize = 768;
pub(crate) const COLORMAP_SIZE: usize = 8704;
pub(crate) const ENDOOM_SIZE: usize = 4000;

/// 14 palettes of 768 bytes
const PLAYPAL_FULL: usize = 14 * 768;

const PATCH_NAME_LEN: usize = 8;

/// Compiled ACS bytecode
pub fn detect_acs(data: &[u8]) -> Confidence {
    if data.len() < ACS_MIN {
        return Confidence::NoMatch;
    }
    if read::magic_at(data, 0, b"ACSE") || read::magic_at(data, 0, b"ACSe") {
        return Confidence::Probably;
    }
    if !read::magic_at(data, 0, b"ACS\0") {
        return Confidence::NoMatch;
    }
    match read::u32_le(data, 4) {
        Some(dir) if (dir as usize) >= ACS_MIN && (dir as usize) < data.len() => Confidence::Certain,
        _ => Confidence::Unlikely,
    }
}

/// PLAYPAL: one or fourteen 256-colour palettes
pub fn detect_playpal(data: &[u8]) -> Confidence {
    match data.len() {
        PLAYPAL_FULL => Confidence::Probably,
        PLAYPAL_MIN => Confidence::Maybe,
        _ => Confidence::NoMatch,
    }
}

/// COLORMAP: 34 light-level maps of 256 bytes
pub fn detect_colormap(data: &[u8]) -> Confidence {
    if data.len() == COLORMAP_SIZE {
        Confidence::Maybe
    } else {
        Confidence::NoMatch
    }
}

/// ENDOOM: an 80x25 text-mode screen
pub fn detect_endoom(data: &[u8]) -> Confidence {
    if data.len() == ENDOOM_SIZE {
        Confidence::Maybe
    } else {
        Confidence::NoMatch
    }
}

/// Whether an 8-byte lump name looks like one a tool wrote
fn plausible_name(raw: &[u8]) -> bool {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    end > 0 && raw[..end].iter().all(|b| b.is_ascii_graphic())
}

/// PNAMES: u32 count followed by that many 8-byte patch names
pub fn detect_pnames(data: &[u8]) -> Confidence {
    if data.len() < PNAMES_MIN {
        return Confidence::NoMatch;
    }
    let Some(count) = read::u32_le(data, 0) else {
        return Confidence::NoMatch;
    };
    let expected = (count as usize)
        .checked_mul(PATCH_NAME_LEN)
        .and_then(|n| n.checked_add(4));
    if count == 0 || expected != Some(data.len()) {
        return Confidence::NoMatch;
    }

    let names_ok = data[4..]
        .chunks_exact(PATCH_NAME_LEN)
        .all(plausible_name);
    if names_ok {
        Confidence::Probably
    } else {
        Confidence::NoMatch
    }
}

/// Record layout of a TEXTUREx definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureLayout {
    /// 22-byte header, 10-byte patch records
    Doom,
    /// 18-byte header, 6-byte patch records
    Strife,
}

impl TextureLayout {
    fn header_len(self) -> usize {
        match self {
            TextureLayout::Doom => 22,
            TextureLayout::Strife => 18,
        }
    }

    fn patch_len(self) -> usize {
        match self {
            TextureLayout::Doom => 10,
            TextureLayout::Strife => 6,
        }
    }

    fn patch_count_offset(self) -> usize {
        self.header_len() - 2
    }

    fn record_fits(self, data: &[u8], offset: usize) -> bool {
        let Some(name) = read::bytes(data, offset, PATCH_NAME_LEN) else {
            return false;
        };
        let (Some(width), Some(height)) = (read::i16_le(data, offset + 12), read::i16_le(data, offset + 14))
        else {
            return false;
        };
        let Some(patches) = read::i16_le(data, offset + self.patch_count_offset()) else {
            return false;
        };
        if !plausible_name(name) || width <= 0 || height <= 0 || patches < 0 {
            return false;
        }
        offset + self.header_len() + patches as usize * self.patch_len() <= data.len()
    }
}

/// TEXTURE1/TEXTURE2: offset table plus texture records
pub fn detect_texturex(data: &[u8]) -> Confidence {
    if data.len() < TEXTUREX_MIN {
        return Confidence::NoMatch;
    }
    let Some(count) = read::u32_le(data, 0) else {
        return Confidence::NoMatch;
    };
    let Some(table_end) = (count as usize).checked_mul(4).and_then(|n| n.checked_add(4)) else {
        return Confidence::NoMatch;
    };
    if count == 0 || table_end > data.len() {
        return Confidence::NoMatch;
    }

    let offsets: Vec<usize> = (0..count as usize)
        .filter_map(|i| read::u32_le(data, 4 + i * 4))
        .map(|o| o as usize)
        .collect();
    if offsets.iter().any(|&o| o < table_end || o >= data.len()) {
        return Confidence::NoMatch;
    }

    for layout in [TextureLayout::Doom, TextureLayout::Strife] {
        if offsets.iter().all(|&o| layout.record_fits(data, o)) {
            return Confidence::Probably;
        }
    }
    Confidence::NoMatch
}
