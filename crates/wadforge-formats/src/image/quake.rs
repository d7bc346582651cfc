//! Quake lump graphics
//!
//! ```text
//! qpic                  miptex
//! 0  u32 width          0   name[16]
//! 4  u32 height         16  u32 width, u32 height
//! 8  width*height       24  u32 offsets[4]
//!                       40  mip levels 0..3, each half the previous
//!                       ..  Half-Life: u16 colours, colours*3 RGB, pad
//! ```

use std::sync::Arc;

use wadforge_core::buffer::{range_checked, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{Image, ImageInfo, Palette, PixelFormat, PALETTE_BYTES};
use crate::traits::{ensure_writable, Detect, ImageCodec};

const MAX_DIMENSION: u32 = 4096;
const QPIC_HEADER: usize = 8;
const MIP_HEADER: usize = 40;
const MIP_LEVELS: usize = 4;
/// Index Quake draws as transparent in `{` textures
const TRANSPARENT_INDEX: u8 = 255;

fn plausible(width: u32, height: u32) -> bool {
    (1..=MAX_DIMENSION).contains(&width) && (1..=MAX_DIMENSION).contains(&height)
}

/// Masked pixels become the transparent index
fn indices_for_write(image: &Image) -> Vec<u8> {
    image
        .pixels()
        .iter()
        .enumerate()
        .map(|(i, &index)| if image.is_opaque(i) { index } else { TRANSPARENT_INDEX })
        .collect()
}

fn qpic_size(data: &[u8]) -> Option<(u32, u32)> {
    let width = read::u32_le(data, 0)?;
    let height = read::u32_le(data, 4)?;
    plausible(width, height).then_some((width, height))
}

/// Quake `qpic` (`quake_gfx`)
#[derive(Debug, Default, Clone, Copy)]
pub struct QuakeGfxCodec;

impl Detect for QuakeGfxCodec {
    fn id(&self) -> &str {
        "quake_gfx"
    }

    fn reliability(&self) -> u8 {
        100
    }

    fn min_size(&self) -> usize {
        QPIC_HEADER + 1
    }

    fn test(&self, data: &[u8]) -> Confidence {
        match qpic_size(data) {
            Some((w, h)) if QPIC_HEADER + w as usize * h as usize == data.len() => Confidence::Probably,
            _ => Confidence::NoMatch,
        }
    }
}

impl ImageCodec for QuakeGfxCodec {
    fn name(&self) -> &str {
        "Quake picture"
    }

    fn extension(&self) -> &str {
        "lmp"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        if data.len() < QPIC_HEADER {
            return Err(Error::truncated(0, QPIC_HEADER, data.len()));
        }
        let (width, height) =
            qpic_size(data).ok_or_else(|| Error::malformed("qpic dimensions out of range"))?;
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
        let pixels = range_checked(data, QPIC_HEADER, info.width as usize * info.height as usize)?;
        Image::paletted(info.width, info.height, pixels.to_vec(), None, None)
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        plausible(width, height)
    }

    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        let mut out = ByteBuffer::with_capacity(QPIC_HEADER + image.pixel_count());
        out.write_u32_le(image.width())?;
        out.write_u32_le(image.height())?;
        out.write_bytes(&indices_for_write(image))?;
        Ok(out.into_vec())
    }
}

#[derive(Debug)]
struct MipHeader {
    width: u32,
    height: u32,
    offsets: [usize; MIP_LEVELS],
}

impl MipHeader {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIP_HEADER {
            return Err(Error::truncated(0, MIP_HEADER, data.len()));
        }
        let width = read::u32_le(data, 16).unwrap_or(0);
        let height = read::u32_le(data, 20).unwrap_or(0);
        if !plausible(width, height) || width % 8 != 0 || height % 8 != 0 {
            return Err(Error::malformed(format!("miptex size {width}x{height} is not a multiple of 8")));
        }
        let mut offsets = [0usize; MIP_LEVELS];
        for (level, offset) in offsets.iter_mut().enumerate() {
            *offset = read::u32_le(data, 24 + level * 4).unwrap_or(0) as usize;
            let len = Self::level_len(width, height, level);
            if *offset < MIP_HEADER || offset.saturating_add(len) > data.len() {
                return Err(Error::out_of_bounds(*offset, data.len()).with_context(format!("mip level {level}")));
            }
        }
        Ok(Self { width, height, offsets })
    }

    fn level_len(width: u32, height: u32, level: usize) -> usize {
        (width as usize >> level) * (height as usize >> level)
    }

    /// Half-Life palette trailing the last mip level
    fn trailing_palette(&self, data: &[u8]) -> Option<Palette> {
        let end = self.offsets[MIP_LEVELS - 1] + Self::level_len(self.width, self.height, MIP_LEVELS - 1);
        let count = usize::from(read::u16_le(data, end)?);
        if count != 256 {
            return None;
        }
        let raw = read::bytes(data, end + 2, PALETTE_BYTES)?;
        Palette::from_raw(raw).ok()
    }
}

/// Quake / Half-Life mip texture (`quake_mip`)
#[derive(Debug, Default, Clone, Copy)]
pub struct QuakeMipCodec;

impl Detect for QuakeMipCodec {
    fn id(&self) -> &str {
        "quake_mip"
    }

    fn reliability(&self) -> u8 {
        140
    }

    fn min_size(&self) -> usize {
        // header plus four levels of an 8x8 texture
        MIP_HEADER + 64 + 16 + 4 + 1
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < self.min_size() {
            return Confidence::NoMatch;
        }
        match MipHeader::parse(data) {
            Ok(header) if header.offsets[0] == MIP_HEADER => Confidence::Probably,
            Ok(_) => Confidence::Maybe,
            Err(_) => Confidence::NoMatch,
        }
    }
}

impl ImageCodec for QuakeMipCodec {
    fn name(&self) -> &str {
        "Quake mip texture"
    }

    fn extension(&self) -> &str {
        "mip"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        let header = MipHeader::parse(data)?;
        Ok(ImageInfo {
            width: header.width,
            height: header.height,
            format: PixelFormat::Paletted,
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let header = MipHeader::parse(data)?;
        let len = MipHeader::level_len(header.width, header.height, 0);
        let pixels = range_checked(data, header.offsets[0], len)?;
        let palette = header.trailing_palette(data).map(Arc::new);
        Image::paletted(header.width, header.height, pixels.to_vec(), None, palette)
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        plausible(width, height) && width % 8 == 0 && height % 8 == 0
    }

    /// Writes the name field empty; a palette, when given, is appended in
    /// the Half-Life layout
    fn encode(&self, image: &Image, palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        let (width, height) = (image.width(), image.height());
        let base = indices_for_write(image);

        let mut out = ByteBuffer::new();
        out.write_zeros(16)?;
        out.write_u32_le(width)?;
        out.write_u32_le(height)?;
        out.write_zeros(MIP_LEVELS * 4)?;

        for level in 0..MIP_LEVELS {
            out.patch_u32_le(24 + level * 4, out.position() as u32)?;
            let step = 1usize << level;
            let (w, h) = (width as usize >> level, height as usize >> level);
            // point sampling
            let mip: Vec<u8> = (0..h)
                .flat_map(|y| (0..w).map(move |x| (x, y)))
                .map(|(x, y)| base[y * step * width as usize + x * step])
                .collect();
            out.write_bytes(&mip)?;
        }

        if let Some(palette) = palette {
            out.write_u16_le(256)?;
            out.write_bytes(&palette.to_raw())?;
            out.write_u16_le(0)?;
        }
        Ok(out.into_vec())
    }
}
