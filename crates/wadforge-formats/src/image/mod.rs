//! Canonical image model and the built-in image codecs
//!
//! Every codec decodes into [`Image`] and encodes from it. Three pixel
//! layouts exist:
//! - `Paletted`: one palette index per pixel, with an optional mask
//!   (0 = transparent, anything else = opaque)
//! - `Rgba`: four bytes per pixel, alpha last
//! - `AlphaMap`: one coverage byte per pixel
//!
//! Conversions between them live in [`convert`] and are always explicit.

pub mod convert;
mod dds;
mod doom_gfx;
mod flat;
mod imgz;
mod palette;
mod pcx;
mod planar;
mod png;
mod posts;
mod quake;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wadforge_core::{ByteBuffer, Error, Result};

pub use dds::DdsCodec;
pub use doom_gfx::{DoomAlphaCodec, DoomGfxCodec};
pub use flat::{FlatCodec, FLAT_SIZES};
pub use imgz::ImgzCodec;
pub use palette::{Color, Palette, PALETTE_BYTES};
pub use pcx::PcxCodec;
pub use planar::PlanarCodec;
pub use png::PngCodec;
pub use quake::{QuakeGfxCodec, QuakeMipCodec};

use crate::traits::ImageCodec;

/// Pixel layout of an [`Image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Paletted,
    Rgba,
    AlphaMap,
}

impl PixelFormat {
    /// Bytes per pixel in `Image::pixels`
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Paletted | PixelFormat::AlphaMap => 1,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PixelFormat::Paletted => "paletted",
            PixelFormat::Rgba => "rgba",
            PixelFormat::AlphaMap => "alpha map",
        })
    }
}

/// Where an image's transparency comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencySource {
    /// Fully opaque
    #[default]
    Opaque,
    /// Per-pixel mask alongside paletted pixels
    Mask,
    /// Alpha byte of each RGBA pixel
    AlphaChannel,
    /// Coverage values of an alpha map
    Coverage,
}

/// Header-level facts about an encoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// A decoded image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: ByteBuffer,
    mask: Option<ByteBuffer>,
    palette: Option<Arc<Palette>>,
    pub offset_x: i32,
    pub offset_y: i32,
    transparency: TransparencySource,
}

fn pixel_count(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .filter(|&n| n <= ByteBuffer::MAX_SIZE / 4)
        .ok_or_else(|| Error::invalid_operation(format!("image size {width}x{height} is too large")))
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::invalid_operation(format!(
            "{what} holds {actual} bytes, expected {expected}"
        )));
    }
    Ok(())
}

impl Image {
    /// Paletted image; `mask` marks opaque pixels with non-zero bytes
    pub fn paletted(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        mask: Option<Vec<u8>>,
        palette: Option<Arc<Palette>>,
    ) -> Result<Self> {
        let count = pixel_count(width, height)?;
        check_len("pixel data", pixels.len(), count)?;
        if let Some(mask) = &mask {
            check_len("mask", mask.len(), count)?;
        }
        let transparency = if mask.is_some() {
            TransparencySource::Mask
        } else {
            TransparencySource::Opaque
        };
        Ok(Self {
            width,
            height,
            format: PixelFormat::Paletted,
            pixels: ByteBuffer::from_vec(pixels),
            mask: mask.map(ByteBuffer::from_vec),
            palette,
            offset_x: 0,
            offset_y: 0,
            transparency,
        })
    }

    /// RGBA image, four bytes per pixel
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let count = pixel_count(width, height)?;
        check_len("pixel data", pixels.len(), count * 4)?;
        Ok(Self {
            width,
            height,
            format: PixelFormat::Rgba,
            pixels: ByteBuffer::from_vec(pixels),
            mask: None,
            palette: None,
            offset_x: 0,
            offset_y: 0,
            transparency: TransparencySource::AlphaChannel,
        })
    }

    /// Alpha map, one coverage byte per pixel
    pub fn alpha_map(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let count = pixel_count(width, height)?;
        check_len("pixel data", pixels.len(), count)?;
        Ok(Self {
            width,
            height,
            format: PixelFormat::AlphaMap,
            pixels: ByteBuffer::from_vec(pixels),
            mask: None,
            palette: None,
            offset_x: 0,
            offset_y: 0,
            transparency: TransparencySource::Coverage,
        })
    }

    pub fn with_offsets(mut self, x: i32, y: i32) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn transparency(&self) -> TransparencySource {
        self.transparency
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_slice()
    }

    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_ref().map(ByteBuffer::as_slice)
    }

    pub fn palette(&self) -> Option<&Arc<Palette>> {
        self.palette.as_ref()
    }

    /// Attach or replace the palette; ignored by non-paletted images
    pub fn set_palette(&mut self, palette: Option<Arc<Palette>>) {
        if self.format == PixelFormat::Paletted {
            self.palette = palette;
        }
    }

    /// Whether pixel `index` is drawn
    pub fn is_opaque(&self, index: usize) -> bool {
        match self.format {
            PixelFormat::Paletted => self.mask().map_or(true, |mask| mask.get(index).is_some_and(|&m| m != 0)),
            PixelFormat::Rgba => self.pixels().get(index * 4 + 3).is_some_and(|&a| a != 0),
            PixelFormat::AlphaMap => self.pixels().get(index).is_some_and(|&a| a != 0),
        }
    }

    /// Header facts of this image
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            width: self.width,
            height: self.height,
            format: self.format,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
        }
    }
}

/// The built-in image codecs in registration order
///
/// Exact formats come first; heuristic layouts follow, strongest first, so
/// that raw flats are only chosen when nothing else fits.
pub fn builtin_codecs() -> Vec<Arc<dyn ImageCodec>> {
    vec![
        Arc::new(PngCodec),
        Arc::new(ImgzCodec),
        Arc::new(DdsCodec),
        Arc::new(PcxCodec),
        Arc::new(DoomGfxCodec),
        Arc::new(QuakeMipCodec),
        Arc::new(DoomAlphaCodec),
        Arc::new(QuakeGfxCodec),
        Arc::new(PlanarCodec),
        Arc::new(FlatCodec),
    ]
}
