//! Explicit conversions between pixel layouts
//!
//! Codecs never convert on their own; callers ask for a conversion with
//! [`convert`] (usually through `ImageCodec::convert_writable`) and choose how
//! transparency is derived with [`TransparencyMode`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wadforge_core::Result;

use super::{Image, Palette, PixelFormat};

/// How transparency is decided when a conversion must invent it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMode {
    /// Pixels of exactly this colour become transparent
    ColorKey([u8; 3]),
    /// Pixels with alpha below the threshold become transparent
    AlphaThreshold(u8),
    /// Coverage follows pixel brightness; black is transparent
    Brightness,
}

impl Default for TransparencyMode {
    fn default() -> Self {
        TransparencyMode::AlphaThreshold(128)
    }
}

/// Conversion settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Palette for paletted output; a greyscale ramp is generated when absent
    #[serde(skip)]
    pub palette: Option<Arc<Palette>>,
    pub transparency: TransparencyMode,
    /// Colour partially transparent pixels are blended over
    pub background: [u8; 3],
}

impl ConvertOptions {
    pub fn with_palette(mut self, palette: Arc<Palette>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn with_transparency(mut self, mode: TransparencyMode) -> Self {
        self.transparency = mode;
        self
    }
}

/// Rec. 601 luma
fn brightness(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((r * 299 + g * 587 + b * 114) / 1000) as u8
}

fn blend(rgb: [u8; 3], alpha: u8, background: [u8; 3]) -> [u8; 3] {
    let a = u32::from(alpha);
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = ((u32::from(rgb[i]) * a + u32::from(background[i]) * (255 - a)) / 255) as u8;
    }
    out
}

/// RGBA bytes of any image, using `fallback` when a paletted image has none
fn expand_rgba(image: &Image, fallback: Option<&Arc<Palette>>) -> Vec<u8> {
    match image.format() {
        PixelFormat::Rgba => image.pixels().to_vec(),
        PixelFormat::AlphaMap => image.pixels().iter().flat_map(|&a| [a, a, a, 255]).collect(),
        PixelFormat::Paletted => {
            let generated;
            let palette = match image.palette().or(fallback) {
                Some(palette) => palette.as_ref(),
                None => {
                    generated = Palette::greyscale();
                    &generated
                }
            };
            image
                .pixels()
                .iter()
                .enumerate()
                .flat_map(|(i, &index)| {
                    let [r, g, b, _] = palette.color(index);
                    let alpha = if image.is_opaque(i) { 255 } else { 0 };
                    [r, g, b, alpha]
                })
                .collect()
        }
    }
}

fn is_transparent(pixel: &[u8], mode: TransparencyMode) -> bool {
    let rgb = [pixel[0], pixel[1], pixel[2]];
    match mode {
        TransparencyMode::ColorKey(key) => rgb == key || pixel[3] == 0,
        TransparencyMode::AlphaThreshold(threshold) => pixel[3] < threshold,
        TransparencyMode::Brightness => brightness(rgb) == 0 || pixel[3] == 0,
    }
}

fn to_paletted(image: &Image, options: &ConvertOptions) -> Result<Image> {
    let palette = options.palette.clone().unwrap_or_else(|| Arc::new(Palette::greyscale()));
    let rgba = expand_rgba(image, Some(&palette));

    let count = image.pixel_count();
    let mut pixels = Vec::with_capacity(count);
    let mut mask = Vec::with_capacity(count);
    for pixel in rgba.chunks_exact(4) {
        if is_transparent(pixel, options.transparency) {
            pixels.push(0);
            mask.push(0);
        } else {
            let rgb = blend([pixel[0], pixel[1], pixel[2]], pixel[3], options.background);
            pixels.push(palette.nearest(rgb));
            mask.push(255);
        }
    }
    let mask = mask.iter().any(|&m| m == 0).then_some(mask);

    let out = Image::paletted(image.width(), image.height(), pixels, mask, Some(palette))?;
    Ok(out.with_offsets(image.offset_x, image.offset_y))
}

fn to_alpha_map(image: &Image, options: &ConvertOptions) -> Result<Image> {
    let rgba = expand_rgba(image, options.palette.as_ref());
    let coverage = rgba
        .chunks_exact(4)
        .map(|p| match options.transparency {
            TransparencyMode::Brightness => brightness([p[0], p[1], p[2]]),
            _ => p[3],
        })
        .collect();
    let out = Image::alpha_map(image.width(), image.height(), coverage)?;
    Ok(out.with_offsets(image.offset_x, image.offset_y))
}

fn to_rgba(image: &Image, options: &ConvertOptions) -> Result<Image> {
    let out = Image::rgba(image.width(), image.height(), expand_rgba(image, options.palette.as_ref()))?;
    Ok(out.with_offsets(image.offset_x, image.offset_y))
}

/// Convert `image` to `target`, keeping dimensions and offsets
pub fn convert(image: &Image, target: PixelFormat, options: &ConvertOptions) -> Result<Image> {
    tracing::trace!(from = %image.format(), to = %target, "converting image");
    if image.format() == target {
        return Ok(image.clone());
    }
    match target {
        PixelFormat::Rgba => to_rgba(image, options),
        PixelFormat::Paletted => to_paletted(image, options),
        PixelFormat::AlphaMap => to_alpha_map(image, options),
    }
}
