//! Raw paletted flats
//!
//! A flat has no header at all: the dimensions are inferred from the byte
//! count. The codec therefore carries the lowest reliability of all image
//! codecs.

use wadforge_core::{Confidence, Error, Result};

use super::{Image, ImageInfo, Palette, PixelFormat};
use crate::traits::{ensure_writable, Detect, ImageCodec};

/// Known flat dimensions, keyed by size in bytes
pub const FLAT_SIZES: &[(usize, u32, u32)] = &[
    (4096, 64, 64),
    (4160, 64, 65),
    (8192, 64, 128),
    (16384, 128, 128),
    (64000, 320, 200),
    (65536, 256, 256),
];

fn dimensions(len: usize) -> Option<(u32, u32)> {
    FLAT_SIZES
        .iter()
        .find(|(size, _, _)| *size == len)
        .map(|&(_, width, height)| (width, height))
}

/// Raw paletted flat (`doom_flat`)
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatCodec;

impl Detect for FlatCodec {
    fn id(&self) -> &str {
        "doom_flat"
    }

    fn reliability(&self) -> u8 {
        5
    }

    fn min_size(&self) -> usize {
        FLAT_SIZES[0].0
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if dimensions(data.len()).is_some() {
            Confidence::Maybe
        } else {
            Confidence::NoMatch
        }
    }
}

impl ImageCodec for FlatCodec {
    fn name(&self) -> &str {
        "Doom flat"
    }

    fn extension(&self) -> &str {
        "lmp"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        let (width, height) = dimensions(data.len())
            .ok_or_else(|| Error::malformed(format!("{} bytes is not a known flat size", data.len())))?;
        Ok(ImageInfo {
            width,
            height,
            format: PixelFormat::Paletted,
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let info = self.info(data)?;
        Image::paletted(info.width, info.height, data.to_vec(), None, None)
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        FLAT_SIZES.iter().any(|&(_, w, h)| w == width && h == height)
    }

    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        if image.mask().is_some_and(|mask| mask.contains(&0)) {
            tracing::debug!("flat has no transparency; masked pixels written as-is");
        }
        Ok(image.pixels().to_vec())
    }
}
