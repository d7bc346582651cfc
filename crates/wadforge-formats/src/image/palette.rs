//! 256-colour palettes

use wadforge_core::{Error, Result};

/// One palette colour, `[r, g, b, a]`
pub type Color = [u8; 4];

/// Size of a raw RGB palette on disk
pub const PALETTE_BYTES: usize = 256 * 3;

/// Doom keeps 14 palettes in PLAYPAL
const PLAYPAL_COUNT: usize = 14;

/// A 256-entry colour table
#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Box<[Color; 256]>,
}

impl Palette {
    /// Parse 768 bytes of packed RGB triplets
    ///
    /// Longer input is accepted and only the first palette is read.
    pub fn from_raw(data: &[u8]) -> Result<Self> {
        if data.len() < PALETTE_BYTES {
            return Err(Error::truncated(0, PALETTE_BYTES, data.len()).with_context("palette"));
        }
        let mut colors = Box::new([[0, 0, 0, 255]; 256]);
        for (color, rgb) in colors.iter_mut().zip(data.chunks_exact(3)) {
            color[..3].copy_from_slice(rgb);
        }
        Ok(Self { colors })
    }

    /// First palette of a PLAYPAL lump
    pub fn from_playpal(data: &[u8]) -> Result<Self> {
        if data.len() % PALETTE_BYTES != 0 || data.len() > PALETTE_BYTES * PLAYPAL_COUNT {
            tracing::debug!(len = data.len(), "PLAYPAL size is not a whole number of palettes");
        }
        Self::from_raw(data)
    }

    /// Linear black-to-white ramp
    pub fn greyscale() -> Self {
        let mut colors = Box::new([[0, 0, 0, 255]; 256]);
        for (i, color) in colors.iter_mut().enumerate() {
            let v = i as u8;
            *color = [v, v, v, 255];
        }
        Self { colors }
    }

    /// Build from up to 256 colours; missing entries are opaque black
    pub fn from_colors(source: &[Color]) -> Self {
        let mut colors = Box::new([[0, 0, 0, 255]; 256]);
        for (slot, color) in colors.iter_mut().zip(source) {
            *slot = *color;
        }
        Self { colors }
    }

    pub fn color(&self, index: u8) -> Color {
        self.colors[usize::from(index)]
    }

    pub fn set_color(&mut self, index: u8, color: Color) {
        self.colors[usize::from(index)] = color;
    }

    pub fn colors(&self) -> &[Color; 256] {
        &self.colors
    }

    /// Index of the closest colour by squared RGB distance; ties keep the lowest index
    pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
        self.nearest_excluding(rgb, None)
    }

    /// As [`Palette::nearest`], never answering `exclude`
    pub fn nearest_excluding(&self, rgb: [u8; 3], exclude: Option<u8>) -> u8 {
        let mut best = (u32::MAX, 0u8);
        for (i, color) in self.colors.iter().enumerate() {
            let index = i as u8;
            if Some(index) == exclude {
                continue;
            }
            let distance: u32 = rgb
                .iter()
                .zip(color.iter())
                .map(|(&a, &b)| {
                    let d = i32::from(a) - i32::from(b);
                    (d * d) as u32
                })
                .sum();
            if distance < best.0 {
                best = (distance, index);
                if distance == 0 {
                    break;
                }
            }
        }
        best.1
    }

    /// Packed RGB triplets, 768 bytes
    pub fn to_raw(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| [c[0], c[1], c[2]]).collect()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::greyscale()
    }
}

impl std::fmt::Debug for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Palette")
            .field("first", &self.colors[0])
            .field("last", &self.colors[255])
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Vec<u8> {
        (0..PALETTE_BYTES).map(|i| (i / 3) as u8).collect()
    }

    #[test]
    fn test_from_raw_and_back() {
        let raw = ramp();
        let palette = Palette::from_raw(&raw).unwrap();
        assert_eq!(palette.color(7), [7, 7, 7, 255]);
        assert_eq!(palette.to_raw(), raw);
        assert_eq!(palette, Palette::greyscale());
    }

    #[test]
    fn test_short_palette_rejected() {
        let err = Palette::from_raw(&[0; 767]).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_playpal_uses_first() {
        let mut playpal = vec![0u8; PALETTE_BYTES * PLAYPAL_COUNT];
        playpal[..3].copy_from_slice(&[200, 10, 20]);
        playpal[PALETTE_BYTES..PALETTE_BYTES + 3].copy_from_slice(&[1, 2, 3]);
        let palette = Palette::from_playpal(&playpal).unwrap();
        assert_eq!(palette.color(0), [200, 10, 20, 255]);
    }

    #[test]
    fn test_nearest() {
        let mut palette = Palette::greyscale();
        palette.set_color(3, [250, 0, 0, 255]);
        assert_eq!(palette.nearest([255, 0, 0]), 3);
        assert_eq!(palette.nearest([100, 100, 100]), 100);
        assert_eq!(palette.nearest([101, 99, 100]), 100);
        assert_eq!(palette.nearest_excluding([0, 0, 0], Some(0)), 1);
    }

    #[test]
    fn test_nearest_tie_keeps_lowest() {
        let palette = Palette::from_colors(&[[10, 10, 10, 255], [10, 10, 10, 255]]);
        assert_eq!(palette.nearest([10, 10, 10]), 0);
    }
}
