//! Doom column-post graphics
//!
//! ```text
//! doom_gfx                          doom_alpha
//! 0  u16 width                      0  u8  width
//! 2  u16 height                     1  u8  height
//! 4  i16 left offset                2  i8  left offset
//! 6  i16 top offset                 3  i8  top offset
//! 8  u32 column offsets [width]     4  u16 column offsets [width]
//!    padded posts, tall patches        unpadded posts, height <= 254
//! ```

use wadforge_core::buffer::read;
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::posts::{decode_column, encode_column, Canvas, PostLayout};
use super::{Image, ImageInfo, Palette, PixelFormat};
use crate::traits::{ensure_writable, patchable, Detect, ImageCodec};

/// Largest dimension accepted by detection and encoding
const MAX_DIMENSION: u32 = 4096;

/// One of the two column-post layouts
#[derive(Debug, Clone, Copy)]
struct Layout {
    header_len: usize,
    offset_width: usize,
    posts: PostLayout,
}

const GFX: Layout = Layout {
    header_len: 8,
    offset_width: 4,
    posts: PostLayout { padded: true, tall: true },
};

const ALPHA: Layout = Layout {
    header_len: 4,
    offset_width: 2,
    posts: PostLayout { padded: false, tall: false },
};

#[derive(Debug, Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    offset_x: i32,
    offset_y: i32,
}

impl Layout {
    fn header(&self, data: &[u8]) -> Result<Header> {
        if data.len() < self.header_len {
            return Err(Error::truncated(0, self.header_len, data.len()));
        }
        let header = if self.header_len == GFX.header_len {
            Header {
                width: u32::from(read::u16_le(data, 0).unwrap_or(0)),
                height: u32::from(read::u16_le(data, 2).unwrap_or(0)),
                offset_x: i32::from(read::i16_le(data, 4).unwrap_or(0)),
                offset_y: i32::from(read::i16_le(data, 6).unwrap_or(0)),
            }
        } else {
            Header {
                width: u32::from(data[0]),
                height: u32::from(data[1]),
                offset_x: i32::from(data[2] as i8),
                offset_y: i32::from(data[3] as i8),
            }
        };
        if header.width == 0 || header.height == 0 {
            return Err(Error::malformed(format!("empty {}x{} patch", header.width, header.height)));
        }
        if header.width > MAX_DIMENSION || header.height > MAX_DIMENSION {
            return Err(Error::malformed(format!(
                "patch size {}x{} is implausible",
                header.width, header.height
            )));
        }
        let table_end = self.header_len + header.width as usize * self.offset_width;
        if table_end > data.len() {
            return Err(Error::truncated(self.header_len, table_end - self.header_len, data.len() - self.header_len)
                .with_context("column offset table"));
        }
        Ok(header)
    }

    fn column_offset(&self, data: &[u8], x: usize) -> usize {
        let at = self.header_len + x * self.offset_width;
        if self.offset_width == 4 {
            read::u32_le(data, at).map_or(usize::MAX, |v| v as usize)
        } else {
            read::u16_le(data, at).map_or(usize::MAX, usize::from)
        }
    }

    /// Header plus a column table whose every entry lands inside the data
    fn test(&self, data: &[u8]) -> bool {
        let Ok(header) = self.header(data) else {
            return false;
        };
        let table_end = self.header_len + header.width as usize * self.offset_width;
        (0..header.width as usize).all(|x| {
            let offset = self.column_offset(data, x);
            offset >= table_end && offset < data.len()
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let header = self.header(data)?;
        let (width, height) = (header.width as usize, header.height as usize);
        let mut pixels = vec![0u8; width * height];
        let mut mask = vec![0u8; width * height];

        let mut canvas = Canvas {
            width,
            height,
            pixels: &mut pixels,
            mask: &mut mask,
        };
        for x in 0..width {
            let offset = self.column_offset(data, x);
            decode_column(data, offset, x, self.posts, &mut canvas)?;
        }

        let image = Image::paletted(header.width, header.height, pixels, Some(mask), None)?;
        Ok(image.with_offsets(header.offset_x, header.offset_y))
    }

    /// Two passes: encode every column, then lay them out behind the
    /// offset table and backpatch it
    fn encode(&self, image: &Image) -> Result<Vec<u8>> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let pixels = image.pixels();

        let mut columns = Vec::with_capacity(width);
        for x in 0..width {
            let column: Vec<Option<u8>> = (0..height)
                .map(|y| {
                    let i = y * width + x;
                    image.is_opaque(i).then(|| pixels[i])
                })
                .collect();
            columns.push(encode_column(&column, self.posts)?);
        }

        let total = self.header_len + width * self.offset_width + columns.iter().map(Vec::len).sum::<usize>();
        let mut out = ByteBuffer::with_capacity(total);
        if self.header_len == GFX.header_len {
            out.write_u16_le(image.width() as u16)?;
            out.write_u16_le(image.height() as u16)?;
            out.write_i16_le(offset_field(image.offset_x)?)?;
            out.write_i16_le(offset_field(image.offset_y)?)?;
        } else {
            out.write_u8(image.width() as u8)?;
            out.write_u8(image.height() as u8)?;
            out.write_i8(small_offset_field(image.offset_x)?)?;
            out.write_i8(small_offset_field(image.offset_y)?)?;
        }
        out.write_zeros(width * self.offset_width)?;

        for (x, column) in columns.iter().enumerate() {
            let at = self.header_len + x * self.offset_width;
            let position = out.position();
            if self.offset_width == 4 {
                let position = u32::try_from(position)
                    .map_err(|_| Error::invalid_operation("patch data exceeds 4 GiB"))?;
                out.patch_u32_le(at, position)?;
            } else {
                let position = u16::try_from(position)
                    .map_err(|_| Error::invalid_operation(format!("column {x} starts past 64 KiB")))?;
                out.patch_u16_le(at, position)?;
            }
            out.write_bytes(column)?;
        }
        Ok(out.into_vec())
    }
}

fn offset_field(value: i32) -> Result<i16> {
    i16::try_from(value).map_err(|_| Error::invalid_operation(format!("offset {value} does not fit in 16 bits")))
}

fn small_offset_field(value: i32) -> Result<i8> {
    i8::try_from(value).map_err(|_| Error::invalid_operation(format!("offset {value} does not fit in 8 bits")))
}

fn info_of(layout: &Layout, data: &[u8]) -> Result<ImageInfo> {
    let header = layout.header(data)?;
    Ok(ImageInfo {
        width: header.width,
        height: header.height,
        format: PixelFormat::Paletted,
        offset_x: header.offset_x,
        offset_y: header.offset_y,
    })
}

/// Doom patch format (`doom_gfx`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DoomGfxCodec;

impl Detect for DoomGfxCodec {
    fn id(&self) -> &str {
        "doom_gfx"
    }

    fn reliability(&self) -> u8 {
        150
    }

    fn min_size(&self) -> usize {
        // header, one column offset and an end-of-column byte
        GFX.header_len + GFX.offset_width + 1
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < self.min_size() || !GFX.test(data) {
            return Confidence::NoMatch;
        }
        Confidence::Probably
    }
}

impl ImageCodec for DoomGfxCodec {
    fn name(&self) -> &str {
        "Doom graphic"
    }

    fn extension(&self) -> &str {
        "lmp"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        info_of(&GFX, data)
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        GFX.decode(data)
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        (1..=MAX_DIMENSION).contains(&width) && (1..=MAX_DIMENSION).contains(&height)
    }

    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        GFX.encode(image)
    }

    fn set_offsets(&self, data: &[u8], x: i32, y: i32) -> Result<Vec<u8>> {
        GFX.header(data)?;
        let mut out = patchable(data);
        out.patch_i16_le(4, offset_field(x)?)?;
        out.patch_i16_le(6, offset_field(y)?)?;
        Ok(out.into_vec())
    }
}

/// Doom alpha / beta patch format (`doom_alpha`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DoomAlphaCodec;

impl Detect for DoomAlphaCodec {
    fn id(&self) -> &str {
        "doom_alpha"
    }

    fn reliability(&self) -> u8 {
        120
    }

    fn min_size(&self) -> usize {
        ALPHA.header_len + ALPHA.offset_width + 1
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < self.min_size() || !ALPHA.test(data) {
            return Confidence::NoMatch;
        }
        Confidence::Maybe
    }
}

impl ImageCodec for DoomAlphaCodec {
    fn name(&self) -> &str {
        "Doom alpha graphic"
    }

    fn extension(&self) -> &str {
        "lmp"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        info_of(&ALPHA, data)
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        ALPHA.decode(data)
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        (1..=255).contains(&width) && (1..=254).contains(&height)
    }

    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        ALPHA.encode(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Writable;

    /// 3x4 image: a transparent column, a full column and a split one
    fn sample() -> Image {
        #[rustfmt::skip]
        let pixels = vec![
            0, 10, 20,
            0, 11, 0,
            0, 12, 0,
            0, 13, 23,
        ];
        #[rustfmt::skip]
        let mask = vec![
            0, 255, 255,
            0, 255, 0,
            0, 255, 0,
            0, 255, 255,
        ];
        Image::paletted(3, 4, pixels, Some(mask), None).unwrap().with_offsets(-5, 30)
    }

    #[test]
    fn test_gfx_layout() {
        let bytes = DoomGfxCodec.encode(&sample(), None).unwrap();
        assert_eq!(read::u16_le(&bytes, 0), Some(3));
        assert_eq!(read::u16_le(&bytes, 2), Some(4));
        assert_eq!(read::i16_le(&bytes, 4), Some(-5));
        assert_eq!(read::i16_le(&bytes, 6), Some(30));
        let first = read::u32_le(&bytes, 8).unwrap() as usize;
        assert_eq!(first, 20);
        assert_eq!(bytes[first], 0xFF);
        assert_eq!(read::u32_le(&bytes, 12), Some(21));
        assert_eq!(&bytes[21..30], &[0, 4, 10, 10, 11, 12, 13, 13, 0xFF]);
    }

    #[test]
    fn test_gfx_round_trip() {
        let image = sample();
        let bytes = DoomGfxCodec.encode(&image, None).unwrap();
        assert_eq!(DoomGfxCodec.test(&bytes), Confidence::Probably);
        let decoded = DoomGfxCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, image);
        assert_eq!(DoomGfxCodec.info(&bytes).unwrap(), image.info());
    }

    #[test]
    fn test_tall_patch_round_trip() {
        let (width, height) = (2u32, 300u32);
        let opaque = |i: u32| (i / 2) % 7 != 0;
        let pixels: Vec<u8> = (0..width * height).map(|i| if opaque(i) { (i % 200) as u8 } else { 0 }).collect();
        let mask: Vec<u8> = (0..width * height).map(|i| if opaque(i) { 255 } else { 0 }).collect();
        let image = Image::paletted(width, height, pixels, Some(mask), None).unwrap();
        let bytes = DoomGfxCodec.encode(&image, None).unwrap();
        assert_eq!(DoomGfxCodec.decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_column_offset_at_end_rejected() {
        let mut bytes = DoomGfxCodec.encode(&sample(), None).unwrap();
        let len = bytes.len() as u32;
        bytes[8..12].copy_from_slice(&len.to_le_bytes());
        assert_eq!(DoomGfxCodec.test(&bytes), Confidence::NoMatch);
        let err = DoomGfxCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err.root(), Error::OutOfBoundsOffset { .. }));
    }

    #[test]
    fn test_set_offsets_patches_header() {
        let bytes = DoomGfxCodec.encode(&sample(), None).unwrap();
        let moved = DoomGfxCodec.set_offsets(&bytes, 12, -7).unwrap();
        assert_eq!(moved.len(), bytes.len());
        assert_eq!(&moved[8..], &bytes[8..]);
        let info = DoomGfxCodec.info(&moved).unwrap();
        assert_eq!((info.offset_x, info.offset_y), (12, -7));
        assert!(DoomGfxCodec.set_offsets(&bytes, 40_000, 0).is_err());
        assert!(DoomGfxCodec.set_offsets(b"tiny", 0, 0).is_err());
    }

    #[test]
    fn test_rgba_needs_conversion() {
        let rgba = Image::rgba(1, 1, vec![1, 2, 3, 255]).unwrap();
        assert_eq!(DoomGfxCodec.can_write(&rgba), Writable::Convert);
        let err = DoomGfxCodec.encode(&rgba, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant { .. }));
    }

    #[test]
    fn test_alpha_round_trip() {
        let image = sample();
        let bytes = DoomAlphaCodec.encode(&image, None).unwrap();
        assert_eq!(bytes[..4], [3, 4, (-5i8) as u8, 30]);
        assert_eq!(read::u16_le(&bytes, 4), Some(10));
        assert_eq!(DoomAlphaCodec.test(&bytes), Confidence::Maybe);
        assert_eq!(DoomAlphaCodec.decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_alpha_limits() {
        let tall = Image::paletted(1, 255, vec![0; 255], None, None).unwrap();
        assert_eq!(DoomAlphaCodec.can_write(&tall), Writable::No);
        let far = sample().with_offsets(200, 0);
        assert!(DoomAlphaCodec.encode(&far, None).is_err());
    }

    #[test]
    fn test_detection_rejects_garbage() {
        assert_eq!(DoomGfxCodec.test(&[0; 16]), Confidence::NoMatch);
        assert_eq!(DoomGfxCodec.test(b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR"), Confidence::NoMatch);
    }
}
