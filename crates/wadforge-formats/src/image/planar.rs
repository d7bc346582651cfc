//! Hexen 16-colour planar startup screen
//!
//! ```text
//! 0    16 × RGB, 6 bits per channel
//! 48   4 bit planes of 640×480 / 8 bytes each, most significant bit leftmost
//! ```
//!
//! Read-only: nothing writes these anymore.

use std::sync::Arc;

use wadforge_core::{Confidence, Error, Result};

use super::{Color, Image, ImageInfo, Palette, PixelFormat};
use crate::traits::{Detect, ImageCodec};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const PALETTE_LEN: usize = 16 * 3;
const PLANES: usize = 4;
const PLANE_LEN: usize = (WIDTH * HEIGHT / 8) as usize;
const TOTAL_LEN: usize = PALETTE_LEN + PLANES * PLANE_LEN;

/// Expand a 6-bit VGA channel to 8 bits
fn vga_channel(value: u8) -> u8 {
    (value << 2) | (value >> 4)
}

/// Hexen planar startup screen (`planar`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarCodec;

impl Detect for PlanarCodec {
    fn id(&self) -> &str {
        "planar"
    }

    fn reliability(&self) -> u8 {
        90
    }

    fn min_size(&self) -> usize {
        TOTAL_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() != TOTAL_LEN {
            return Confidence::NoMatch;
        }
        if data[..PALETTE_LEN].iter().all(|&c| c < 64) {
            Confidence::Probably
        } else {
            Confidence::Unlikely
        }
    }
}

impl ImageCodec for PlanarCodec {
    fn name(&self) -> &str {
        "Hexen planar screen"
    }

    fn extension(&self) -> &str {
        "lmp"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        if data.len() < TOTAL_LEN {
            return Err(Error::truncated(0, TOTAL_LEN, data.len()));
        }
        Ok(ImageInfo {
            width: WIDTH,
            height: HEIGHT,
            format: PixelFormat::Paletted,
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        self.info(data)?;

        let colors: Vec<Color> = data[..PALETTE_LEN]
            .chunks_exact(3)
            .map(|rgb| [vga_channel(rgb[0]), vga_channel(rgb[1]), vga_channel(rgb[2]), 255])
            .collect();

        let mut pixels = vec![0u8; (WIDTH * HEIGHT) as usize];
        for (plane, bits) in data[PALETTE_LEN..TOTAL_LEN].chunks_exact(PLANE_LEN).enumerate() {
            for (i, &byte) in bits.iter().enumerate() {
                for bit in 0..8 {
                    if byte & (0x80 >> bit) != 0 {
                        pixels[i * 8 + bit] |= 1 << plane;
                    }
                }
            }
        }

        Image::paletted(WIDTH, HEIGHT, pixels, None, Some(Arc::new(Palette::from_colors(&colors))))
    }
}
