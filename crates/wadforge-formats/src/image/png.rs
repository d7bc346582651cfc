//! PNG through the `image` crate, plus the ZDoom `grAb` offset chunk
//!
//! Pixels always decode to RGBA. Offsets live in a private chunk placed
//! right after `IHDR`: `grAb { i32 x, i32 y }`, big-endian.

use ::image::codecs::png::PngEncoder;
use ::image::{ExtendedColorType, ImageEncoder, ImageFormat};
use wadforge_core::buffer::read;
use wadforge_core::{Confidence, Error, Result};

use super::{Image, ImageInfo, Palette, PixelFormat};
use crate::traits::{ensure_writable, Detect, ImageCodec};

const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
/// Signature plus a standard 13-byte IHDR chunk
const IHDR_END: usize = 8 + 8 + 13 + 4;
const GRAB: &[u8; 4] = b"grAb";

#[derive(Debug, Clone, Copy)]
struct Chunk {
    kind: [u8; 4],
    start: usize,
    data_len: usize,
}

impl Chunk {
    fn end(&self) -> usize {
        self.start + 12 + self.data_len
    }

    fn data<'a>(&self, png: &'a [u8]) -> &'a [u8] {
        &png[self.start + 8..self.start + 8 + self.data_len]
    }
}

/// Chunks after the signature, up to the first that does not fit
fn chunks(data: &[u8]) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut pos = SIGNATURE.len();
    while let (Some(len), Some(kind)) = (read::u32_be(data, pos), read::bytes(data, pos + 4, 4)) {
        let chunk = Chunk {
            kind: [kind[0], kind[1], kind[2], kind[3]],
            start: pos,
            data_len: len as usize,
        };
        if chunk.end() > data.len() {
            break;
        }
        pos = chunk.end();
        out.push(chunk);
        if &chunk.kind == b"IEND" {
            break;
        }
    }
    out
}

fn has_header(data: &[u8]) -> bool {
    data.len() >= IHDR_END && read::magic_at(data, 0, SIGNATURE) && read::magic_at(data, 12, b"IHDR")
}

fn grab_offsets(data: &[u8]) -> Option<(i32, i32)> {
    let chunk = chunks(data).into_iter().find(|c| &c.kind == GRAB && c.data_len >= 8)?;
    let payload = chunk.data(data);
    Some((read::u32_be(payload, 0)? as i32, read::u32_be(payload, 4)? as i32))
}

fn grab_chunk(x: i32, y: i32) -> Vec<u8> {
    let mut body = Vec::with_capacity(12);
    body.extend_from_slice(GRAB);
    body.extend_from_slice(&x.to_be_bytes());
    body.extend_from_slice(&y.to_be_bytes());

    let mut chunk = Vec::with_capacity(20);
    chunk.extend_from_slice(&8u32.to_be_bytes());
    chunk.extend_from_slice(&body);
    chunk.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
    chunk
}

/// Copy of `data` with any `grAb` chunk replaced by one holding `x`, `y`
fn with_grab(data: &[u8], x: i32, y: i32) -> Result<Vec<u8>> {
    if !has_header(data) {
        return Err(Error::malformed("not a PNG: missing signature or IHDR"));
    }
    let all = chunks(data);
    let ihdr = all
        .first()
        .filter(|c| &c.kind == b"IHDR")
        .ok_or_else(|| Error::truncated(SIGNATURE.len(), 12, data.len() - SIGNATURE.len()).with_context("PNG IHDR chunk"))?;

    let mut out = Vec::with_capacity(data.len() + 20);
    out.extend_from_slice(&data[..ihdr.end()]);
    out.extend_from_slice(&grab_chunk(x, y));

    let mut tail = ihdr.end();
    for chunk in all.iter().skip(1) {
        if &chunk.kind != GRAB {
            out.extend_from_slice(&data[chunk.start..chunk.end()]);
        }
        tail = chunk.end();
    }
    out.extend_from_slice(&data[tail..]);
    Ok(out)
}

/// Portable Network Graphics (`png`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl Detect for PngCodec {
    fn id(&self) -> &str {
        "png"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        IHDR_END
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < IHDR_END || !read::magic_at(data, 0, SIGNATURE) {
            return Confidence::NoMatch;
        }
        if has_header(data) {
            Confidence::Certain
        } else {
            Confidence::Unlikely
        }
    }
}

impl ImageCodec for PngCodec {
    fn name(&self) -> &str {
        "PNG"
    }

    fn extension(&self) -> &str {
        "png"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        if !has_header(data) {
            return Err(Error::malformed("not a PNG: missing signature or IHDR"));
        }
        let (offset_x, offset_y) = grab_offsets(data).unwrap_or_default();
        Ok(ImageInfo {
            width: read::u32_be(data, 16).unwrap_or(0),
            height: read::u32_be(data, 20).unwrap_or(0),
            format: PixelFormat::Rgba,
            offset_x,
            offset_y,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let info = self.info(data)?;
        let decoded = ::image::load_from_memory_with_format(data, ImageFormat::Png)
            .map_err(|e| Error::malformed(format!("PNG decode failed: {e}")))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let image = Image::rgba(width, height, decoded.into_raw())?;
        Ok(image.with_offsets(info.offset_x, info.offset_y))
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Rgba)
    }

    fn encode(&self, image: &Image, _palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(image.pixels(), image.width(), image.height(), ExtendedColorType::Rgba8)
            .map_err(|e| Error::invalid_operation(format!("PNG encode failed: {e}")))?;

        if (image.offset_x, image.offset_y) == (0, 0) {
            return Ok(out);
        }
        with_grab(&out, image.offset_x, image.offset_y)
    }

    fn set_offsets(&self, data: &[u8], x: i32, y: i32) -> Result<Vec<u8>> {
        with_grab(data, x, y)
    }
}
