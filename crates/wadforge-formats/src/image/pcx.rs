//! ZSoft PCX, 8 bits per plane
//!
//! A 128-byte header, then run-length coded scanlines. A byte with the two
//! high bits set is a run count (low six bits) for the byte that follows.
//! One plane is paletted with the palette trailing the file after a `0x0C`
//! marker; three planes are RGB and decode to RGBA.

use std::sync::Arc;

use wadforge_core::buffer::read;
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{Image, ImageInfo, Palette, PixelFormat, PALETTE_BYTES};
use crate::traits::{ensure_writable, Detect, ImageCodec};

const HEADER_LEN: usize = 128;
const MANUFACTURER: u8 = 0x0A;
const PALETTE_MARKER: u8 = 0x0C;
const RUN_FLAG: u8 = 0xC0;
const MAX_RUN: usize = 0x3F;
const MAX_DIMENSION: u32 = 0xFFFE;

#[derive(Debug, Clone, Copy)]
struct Header {
    version: u8,
    encoding: u8,
    bits: u8,
    width: u32,
    height: u32,
    planes: u8,
    bytes_per_line: usize,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::truncated(0, HEADER_LEN, data.len()));
        }
        if data[0] != MANUFACTURER {
            return Err(Error::malformed(format!("not a PCX: manufacturer byte {:#04x}", data[0])));
        }
        let field = |at| u32::from(read::u16_le(data, at).unwrap_or(0));
        let (xmin, ymin, xmax, ymax) = (field(4), field(6), field(8), field(10));
        if xmax < xmin || ymax < ymin {
            return Err(Error::malformed(format!("PCX window {xmin},{ymin} to {xmax},{ymax} is inverted")));
        }
        let header = Self {
            version: data[1],
            encoding: data[2],
            bits: data[3],
            width: xmax - xmin + 1,
            height: ymax - ymin + 1,
            planes: data[65],
            bytes_per_line: field(66) as usize,
        };
        if header.width > MAX_DIMENSION || header.height > MAX_DIMENSION {
            return Err(Error::malformed(format!(
                "PCX size {}x{} exceeds {MAX_DIMENSION}",
                header.width, header.height
            )));
        }
        if header.bytes_per_line < header.width as usize * usize::from(header.bits).max(1) / 8 {
            return Err(Error::malformed(format!(
                "{} bytes per line cannot hold {} pixels",
                header.bytes_per_line, header.width
            )));
        }
        Ok(header)
    }

    fn plausible(&self) -> bool {
        matches!(self.version, 0 | 2 | 3 | 4 | 5)
            && self.encoding == 1
            && matches!(self.bits, 1 | 2 | 4 | 8)
            && (1..=4).contains(&self.planes)
    }

    fn format(&self) -> Result<PixelFormat> {
        match (self.bits, self.planes) {
            (8, 1) => Ok(PixelFormat::Paletted),
            (8, 3) => Ok(PixelFormat::Rgba),
            (bits, planes) => Err(Error::unsupported(format!("PCX with {planes} plane(s) of {bits} bits"))),
        }
    }
}

/// Decode `len` bytes of run-length data starting at the end of the header
///
/// Each input byte yields at most [`MAX_RUN`] output bytes, so a `len` the
/// remaining data cannot reach is rejected before anything is allocated.
fn unpack(data: &[u8], len: usize) -> Result<Vec<u8>> {
    let available = data.len().saturating_sub(HEADER_LEN);
    let reachable = available.saturating_mul(MAX_RUN);
    if reachable < len {
        return Err(Error::truncated(HEADER_LEN, len / MAX_RUN, available).with_context("PCX pixel data"));
    }
    let mut out = Vec::with_capacity(len);
    let mut pos = HEADER_LEN;
    while out.len() < len {
        let byte = *data
            .get(pos)
            .ok_or_else(|| Error::truncated(pos, len - out.len(), 0).with_context("PCX pixel data"))?;
        pos += 1;
        if byte & RUN_FLAG == RUN_FLAG {
            let count = usize::from(byte & !RUN_FLAG);
            let value = *data
                .get(pos)
                .ok_or_else(|| Error::truncated(pos, 1, 0).with_context("PCX run"))?;
            pos += 1;
            let count = count.min(len - out.len());
            out.extend(std::iter::repeat(value).take(count));
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Run-length code one scanline; runs never cross lines
fn pack_line(line: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < line.len() {
        let value = line[i];
        let run = line[i..].iter().take(MAX_RUN).take_while(|&&b| b == value).count();
        if run > 1 || value & RUN_FLAG == RUN_FLAG {
            out.push(RUN_FLAG | run as u8);
        }
        out.push(value);
        i += run;
    }
}

fn trailing_palette(data: &[u8]) -> Option<Palette> {
    let start = data.len().checked_sub(PALETTE_BYTES + 1)?;
    if start < HEADER_LEN || data[start] != PALETTE_MARKER {
        return None;
    }
    Palette::from_raw(&data[start + 1..]).ok()
}

/// ZSoft PCX (`pcx`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PcxCodec;

impl Detect for PcxCodec {
    fn id(&self) -> &str {
        "pcx"
    }

    fn reliability(&self) -> u8 {
        200
    }

    fn min_size(&self) -> usize {
        HEADER_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < HEADER_LEN || data[0] != MANUFACTURER {
            return Confidence::NoMatch;
        }
        match Header::parse(data) {
            Ok(header) if header.plausible() => Confidence::Probably,
            _ => Confidence::NoMatch,
        }
    }
}

impl ImageCodec for PcxCodec {
    fn name(&self) -> &str {
        "PCX"
    }

    fn extension(&self) -> &str {
        "pcx"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        let header = Header::parse(data)?;
        Ok(ImageInfo {
            width: header.width,
            height: header.height,
            format: header.format()?,
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let header = Header::parse(data)?;
        if header.encoding != 1 {
            return Err(Error::unsupported(format!("PCX encoding {}", header.encoding)));
        }
        let format = header.format()?;
        let (width, height) = (header.width as usize, header.height as usize);
        let line = header.bytes_per_line * usize::from(header.planes);
        let raw = unpack(data, line * height)?;

        match format {
            PixelFormat::Paletted => {
                let pixels = raw.chunks_exact(line).flat_map(|row| &row[..width]).copied().collect();
                let palette = trailing_palette(data).map(Arc::new);
                Image::paletted(header.width, header.height, pixels, None, palette)
            }
            _ => {
                let stride = header.bytes_per_line;
                let pixels = raw
                    .chunks_exact(line)
                    .flat_map(|row| (0..width).flat_map(move |x| [row[x], row[stride + x], row[2 * stride + x], 255]))
                    .collect();
                Image::rgba(header.width, header.height, pixels)
            }
        }
    }

    fn target_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::Paletted)
    }

    fn accepts_size(&self, width: u32, height: u32) -> bool {
        (1..=MAX_DIMENSION).contains(&width) && (1..=MAX_DIMENSION).contains(&height)
    }

    /// Uses `palette`, else the image's own, else a greyscale ramp
    fn encode(&self, image: &Image, palette: Option<&Palette>) -> Result<Vec<u8>> {
        ensure_writable(self, image)?;
        let (width, height) = (image.width() as usize, image.height() as usize);
        let bytes_per_line = (width + 1) & !1;

        let mut out = ByteBuffer::with_capacity(HEADER_LEN + width * height + PALETTE_BYTES + 1);
        out.write_u8(MANUFACTURER)?;
        out.write_u8(5)?; // version
        out.write_u8(1)?; // RLE
        out.write_u8(8)?; // bits per plane
        out.write_u16_le(0)?;
        out.write_u16_le(0)?;
        out.write_u16_le((width - 1) as u16)?;
        out.write_u16_le((height - 1) as u16)?;
        out.write_u16_le(72)?;
        out.write_u16_le(72)?;
        out.write_zeros(48 + 1)?; // EGA palette, reserved
        out.write_u8(1)?; // planes
        out.write_u16_le(bytes_per_line as u16)?;
        out.write_u16_le(1)?; // colour palette
        out.write_zeros(HEADER_LEN - out.position())?;

        let mut packed = Vec::new();
        let mut line = vec![0u8; bytes_per_line];
        for row in image.pixels().chunks_exact(width) {
            line[..width].copy_from_slice(row);
            pack_line(&line, &mut packed);
        }
        out.write_bytes(&packed)?;

        let raw = match (palette, image.palette()) {
            (Some(palette), _) => palette.to_raw(),
            (None, Some(own)) => own.to_raw(),
            (None, None) => Palette::greyscale().to_raw(),
        };
        out.write_u8(PALETTE_MARKER)?;
        out.write_bytes(&raw)?;
        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_line() {
        let mut out = Vec::new();
        pack_line(&[5, 5, 5, 1, 0xC1, 0xC1, 2], &mut out);
        assert_eq!(out, vec![0xC3, 5, 1, 0xC2, 0xC1, 2]);

        out.clear();
        pack_line(&[0xD0], &mut out);
        assert_eq!(out, vec![0xC1, 0xD0]);

        out.clear();
        pack_line(&[9; 100], &mut out);
        assert_eq!(out, vec![0xFF, 9, 0xE5, 9]);
    }

    #[test]
    fn test_paletted_round_trip() {
        let pixels: Vec<u8> = (0..35u32).map(|i| if i % 6 < 3 { 0xC7 } else { (i * 13) as u8 }).collect();
        let mut palette = Palette::greyscale();
        palette.set_color(0xC7, [10, 20, 30, 255]);
        let image = Image::paletted(7, 5, pixels, None, Some(Arc::new(palette))).unwrap();

        let bytes = PcxCodec.encode(&image, None).unwrap();
        assert_eq!(PcxCodec.test(&bytes), Confidence::Probably);
        assert_eq!(read::u16_le(&bytes, 66), Some(8));
        assert_eq!(bytes[bytes.len() - PALETTE_BYTES - 1], PALETTE_MARKER);

        let decoded = PcxCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_rgb_planes() {
        let mut bytes = PcxCodec
            .encode(&Image::paletted(2, 1, vec![0, 0], None, None).unwrap(), None)
            .unwrap();
        bytes.truncate(HEADER_LEN);
        bytes[65] = 3;
        // one line: R plane, G plane, B plane, two bytes each
        bytes.extend_from_slice(&[10, 11, 20, 21, 0xC2, 30]);

        let image = PcxCodec.decode(&bytes).unwrap();
        assert_eq!(image.format(), PixelFormat::Rgba);
        assert_eq!(image.pixels(), &[10, 20, 30, 255, 11, 21, 30, 255]);
    }

    #[test]
    fn test_truncated_runs() {
        let mut bytes = PcxCodec
            .encode(&Image::paletted(4, 4, vec![1; 16], None, None).unwrap(), None)
            .unwrap();
        bytes.truncate(HEADER_LEN + 2);
        assert!(PcxCodec.decode(&bytes).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_header_size_larger_than_data() {
        let mut bytes = PcxCodec
            .encode(&Image::paletted(2, 1, vec![0, 0], None, None).unwrap(), None)
            .unwrap();
        bytes.truncate(HEADER_LEN);
        bytes[8..12].copy_from_slice(&[0xFD, 0xFF, 0xFD, 0xFF]);
        bytes[65] = 3;
        bytes[66..68].copy_from_slice(&[0xFF, 0xFF]);
        bytes.extend_from_slice(&[0xFF, 0x01, 0xFF, 0x02]);

        let info = PcxCodec.info(&bytes).unwrap();
        assert_eq!((info.width, info.height), (0xFFFE, 0xFFFE));
        assert!(PcxCodec.decode(&bytes).unwrap_err().is_parse_error());

        bytes[8..10].copy_from_slice(&[0xFF, 0xFF]);
        assert!(matches!(PcxCodec.info(&bytes).unwrap_err(), Error::MalformedHeader { .. }));
    }

    #[test]
    fn test_unsupported_depth() {
        let mut bytes = PcxCodec
            .encode(&Image::paletted(8, 1, vec![1; 8], None, None).unwrap(), None)
            .unwrap();
        bytes[3] = 4;
        assert_eq!(PcxCodec.test(&bytes), Confidence::Probably);
        assert!(matches!(PcxCodec.decode(&bytes).unwrap_err(), Error::UnsupportedVariant { .. }));
    }

    #[test]
    fn test_detection() {
        assert_eq!(PcxCodec.test(&[0x0A; 64]), Confidence::NoMatch);
        let mut header = vec![0u8; HEADER_LEN];
        header[0] = MANUFACTURER;
        header[2] = 7;
        assert_eq!(PcxCodec.test(&header), Confidence::NoMatch);
    }
}
