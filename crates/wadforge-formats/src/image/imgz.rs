//! ZDoom IMGZ alpha maps
//!
//! ```text
//! 0   "IMGZ"
//! 4   u16 width, u16 height
//! 8   i16 left offset, i16 top offset
//! 12  u8  compression (0 raw, 1 RLE)
//! 13  reserved[11]
//! 24  width*height coverage bytes
//! ```
//!
//! The RLE is PackBits: a signed code `n >= 0` copies `n + 1` literal bytes,
//! `-127..=-1` repeats the next byte `1 - n` times, `-128` is a no-op.

use wadforge_core::buffer::read;
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{Image, ImageInfo, Palette, PixelFormat};
use crate::traits::{ensure_writable, patchable, Detect, ImageCodec};

const MAGIC: &[u8; 4] = b"IMGZ";
const HEADER_LEN: usize = 24;
const MAX_RUN: usize = 128;

#[derive(Debug, Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    offset_x: i32,
    offset_y: i32,
    compressed: bool,
}

fn parse_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    if !read::magic_at(data, 0, MAGIC) {
        return Err(Error::malformed("not an IMGZ: missing magic"));
    }
    let header = Header {
        width: u32::from(read::u16_le(data, 4).unwrap_or(0)),
        height: u32::from(read::u16_le(data, 6).unwrap_or(0)),
        offset_x: i32::from(read::i16_le(data, 8).unwrap_or(0)),
        offset_y: i32::from(read::i16_le(data, 10).unwrap_or(0)),
        compressed: match data[12] {
            0 => false,
            1 => true,
            other => return Err(Error::unsupported(format!("IMGZ compression {other}"))),
        },
    };
    if header.width == 0 || header.height == 0 {
        return Err(Error::malformed("IMGZ with zero size"));
    }
    Ok(header)
}

/// Decode `len` bytes of PackBits data following the header
///
/// No code yields more than [`MAX_RUN`] bytes per input byte; a size the
/// remaining data cannot reach fails before allocating.
fn unpack(data: &[u8], len: usize) -> Result<Vec<u8>> {
    let available = data.len().saturating_sub(HEADER_LEN);
    if available.saturating_mul(MAX_RUN) < len {
        return Err(Error::truncated(HEADER_LEN, len / MAX_RUN, available).with_context("IMGZ pixel data"));
    }
    let mut out = Vec::with_capacity(len);
    let mut pos = HEADER_LEN;
    let truncated = |pos: usize| Error::truncated(pos, 1, 0).with_context("IMGZ run");

    while out.len() < len {
        let code = *data.get(pos).ok_or_else(|| truncated(pos))? as i8;
        pos += 1;
        let room = len - out.len();
        if code >= 0 {
            let count = (code as usize + 1).min(room);
            let literal = read::bytes(data, pos, count).ok_or_else(|| truncated(pos))?;
            out.extend_from_slice(literal);
            pos += code as usize + 1;
        } else if code != i8::MIN {
            let value = *data.get(pos).ok_or_else(|| truncated(pos))?;
            pos += 1;
            let count = (1 - i32::from(code)) as usize;
            out.extend(std::iter::repeat(value).take(count.min(room)));
        }
    }
    Ok(out)
}

fn pack(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    let mut literal_start = 0;
    let mut i = 0;

    let flush = |out: &mut Vec<u8>, literal: &[u8]| {
        for chunk in literal.chunks(MAX_RUN) {
            out.push((chunk.len() - 1) as u8);
            out.extend_from_slice(chunk);
        }
    };

    while i < data.len() {
        let run = data[i..].iter().take(MAX_RUN).take_while(|&&b| b == data[i]).count();
        if run >= 3 {
            flush(&mut out, &data[literal_start..i]);
            out.push((1 - run as i32) as i8 as u8);
            out.push(data[i]);
            i += run;
            literal_start = i;
        } else {
            i += run;
        }
    }
    flush(&mut out, &data[literal_start..]);
    out
}

/// ZDoom alpha map (`imgz`)
#[derive(Debug, Default, Clone, Copy)]
pub struct ImgzCodec;

impl Detect for ImgzCodec {
    fn id(&self) -> &str {
        "imgz"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        HEADER_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < HEADER_LEN || !read::magic_at(data, 0, MAGIC) {
            return Confidence::NoMatch;
        }
        match parse_header(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ImageCodec for ImgzCodec {
    fn name(&self) -> &str {
        "ZDoom IMGZ"
    }

    fn extension(&self) -> &str {
        "imgz"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        let header = parse_header(data)?;
        Ok(ImageInfo {
            width: header.width,
            height: header.height,
            format: PixelFormat::AlphaMap,
            offset_x: header.offset_x,
            offset_y: header.offset_y,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let header = parse_header(data)?;
        let len = header.width as usize * header.height as usize;
        let pixels = if header.compressed {
            unpack(data, len)?
        } else {
            read::bytes(data, HEADER_LEN, len)
                .ok_or_else(|| Error::truncated(HEADER_LEN, len, data.len() - HEADER_LEN))?
                .to_vec()
        };
        let image = Image::alpha_map(header.width, header.height, pixels)?;
        Ok(image.with_offsets(header.offset_x, header.offset_y))
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::AlphaMap)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        (1..=u32::from(u16::MAX)).contains(&width) && (1..=u32::from(u16::MAX)).contains(&height)
    }

    /// RLE is used when it comes out smaller
    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        let offset = |v: i32| {
            i16::try_from(v).map_err(|_| Error::invalid_operation(format!("offset {v} does not fit in 16 bits")))
        };

        let packed = pack(image.pixels());
        let compressed = packed.len() < image.pixels().len();
        tracing::trace!(raw = image.pixels().len(), packed = packed.len(), "IMGZ payload");

        let mut out = ByteBuffer::with_capacity(HEADER_LEN + image.pixels().len());
        out.write_bytes(MAGIC)?;
        out.write_u16_le(image.width() as u16)?;
        out.write_u16_le(image.height() as u16)?;
        out.write_i16_le(offset(image.offset_x)?)?;
        out.write_i16_le(offset(image.offset_y)?)?;
        out.write_u8(u8::from(compressed))?;
        out.write_zeros(11)?;
        out.write_bytes(if compressed { &packed } else { image.pixels() })?;
        Ok(out.into_vec())
    }

    fn set_offsets(&self, data: &[u8], x: i32, y: i32) -> Result<Vec<u8>> {
        parse_header(data)?;
        let field = |v: i32| {
            i16::try_from(v).map_err(|_| Error::invalid_operation(format!("offset {v} does not fit in 16 bits")))
        };
        let mut out = patchable(data);
        out.patch_i16_le(8, field(x)?)?;
        out.patch_i16_le(10, field(y)?)?;
        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pack_codes() {
        assert_eq!(pack(&[1, 2, 3]), vec![2, 1, 2, 3]);
        assert_eq!(pack(&[7, 7, 7, 7]), vec![(-3i8) as u8, 7]);
        assert_eq!(pack(&[1, 9, 9, 9, 2]), vec![0, 1, (-2i8) as u8, 9, 0, 2]);
        assert_eq!(pack(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_unpack_skips_noop() {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&[0x80, 1, 5, 6, (-1i8) as u8, 4]);
        assert_eq!(unpack(&data, 4).unwrap(), vec![5, 6, 4, 4]);
    }

    #[test]
    fn test_compressed_round_trip() {
        let image = Image::alpha_map(16, 4, [0u8; 40].into_iter().chain(1..=24).collect())
            .unwrap()
            .with_offsets(8, -2);
        let bytes = ImgzCodec.encode(&image, None).unwrap();
        assert_eq!(bytes[12], 1);
        assert_eq!(ImgzCodec.test(&bytes), Confidence::Certain);
        assert_eq!(ImgzCodec.decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_raw_when_rle_does_not_help() {
        let image = Image::alpha_map(4, 1, vec![1, 2, 3, 4]).unwrap();
        let bytes = ImgzCodec.encode(&image, None).unwrap();
        assert_eq!(bytes[12], 0);
        assert_eq!(&bytes[HEADER_LEN..], &[1, 2, 3, 4]);
        assert_eq!(ImgzCodec.decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_set_offsets() {
        let bytes = ImgzCodec.encode(&Image::alpha_map(2, 2, vec![9; 4]).unwrap(), None).unwrap();
        let moved = ImgzCodec.set_offsets(&bytes, -40, 41).unwrap();
        let info = ImgzCodec.info(&moved).unwrap();
        assert_eq!((info.offset_x, info.offset_y), (-40, 41));
        assert_eq!(&moved[12..], &bytes[12..]);
    }

    #[test]
    fn test_header_size_larger_than_data() {
        let mut bytes = ImgzCodec.encode(&Image::alpha_map(1, 1, vec![0]).unwrap(), None).unwrap();
        bytes[4..8].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        bytes[12] = 1;
        bytes.truncate(HEADER_LEN);
        bytes.extend_from_slice(&[(-127i8) as u8, 0, (-127i8) as u8, 0, 0x80, 0x80, 0x80, 0x80]);

        assert_eq!(ImgzCodec.info(&bytes).unwrap().width, 0xFFFF);
        assert!(ImgzCodec.decode(&bytes).unwrap_err().is_parse_error());

        bytes[12] = 0;
        assert!(ImgzCodec.decode(&bytes).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_bad_compression_byte() {
        let mut bytes = ImgzCodec.encode(&Image::alpha_map(1, 1, vec![0]).unwrap(), None).unwrap();
        bytes[12] = 9;
        assert_eq!(ImgzCodec.test(&bytes), Confidence::Unlikely);
        assert!(ImgzCodec.decode(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn rle_round_trips(data in prop::collection::vec(prop_oneof![Just(0u8), Just(255u8), any::<u8>()], 1..600)) {
            let mut framed = vec![0u8; HEADER_LEN];
            framed.extend_from_slice(&pack(&data));
            prop_assert_eq!(unpack(&framed, data.len()).unwrap(), data);
        }
    }
}
