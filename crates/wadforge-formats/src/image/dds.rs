//! DirectDraw Surface
//!
//! The header is parsed for every variant so `info` always works; pixel
//! decoding covers uncompressed 32-bit masked RGB(A). Block-compressed
//! surfaces are recognised and reported as unsupported.

use wadforge_core::buffer::{range_checked, read};
use wadforge_core::{Confidence, Error, Result};

use super::{Image, ImageInfo, PixelFormat};
use crate::traits::{Detect, ImageCodec};

const MAGIC: &[u8; 4] = b"DDS ";
const HEADER_SIZE: u32 = 124;
const DATA_OFFSET: usize = 4 + HEADER_SIZE as usize;
/// Pixel format block within the file (after the magic)
const PIXEL_FORMAT_AT: usize = 4 + 72;

/// Pixel format flags
pub mod pf_flags {
    pub const ALPHAPIXELS: u32 = 0x1;
    pub const FOURCC: u32 = 0x4;
    pub const RGB: u32 = 0x40;
}

/// Surface encodings worth telling apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceFormat {
    /// 32 bits per pixel with channel masks `[r, g, b, a]`
    Masked32([u32; 4]),
    /// Uncompressed at another depth
    Uncompressed(u32),
    Bc1,
    Bc2,
    Bc3,
    Bc4,
    Bc5,
    /// DX10 extended header
    Dx10,
    FourCc([u8; 4]),
}

impl SurfaceFormat {
    fn from_fourcc(fourcc: [u8; 4]) -> Self {
        match &fourcc {
            b"DXT1" => Self::Bc1,
            b"DXT2" | b"DXT3" => Self::Bc2,
            b"DXT4" | b"DXT5" => Self::Bc3,
            b"ATI1" | b"BC4U" => Self::Bc4,
            b"ATI2" | b"BC5U" => Self::Bc5,
            b"DX10" => Self::Dx10,
            _ => Self::FourCc(fourcc),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Masked32(_) => "32-bit RGB".to_string(),
            Self::Uncompressed(bits) => format!("{bits}-bit uncompressed"),
            Self::Bc1 => "BC1/DXT1".to_string(),
            Self::Bc2 => "BC2/DXT3".to_string(),
            Self::Bc3 => "BC3/DXT5".to_string(),
            Self::Bc4 => "BC4".to_string(),
            Self::Bc5 => "BC5".to_string(),
            Self::Dx10 => "DX10 extended".to_string(),
            Self::FourCc(code) => format!("FourCC {}", String::from_utf8_lossy(code)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DdsHeader {
    width: u32,
    height: u32,
    pitch: u32,
    format: SurfaceFormat,
}

impl DdsHeader {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DATA_OFFSET {
            return Err(Error::truncated(0, DATA_OFFSET, data.len()));
        }
        if !read::magic_at(data, 0, MAGIC) {
            return Err(Error::malformed("not a DDS: missing magic"));
        }
        let field = |at: usize| read::u32_le(data, at).unwrap_or(0);

        let size = field(4);
        if size != HEADER_SIZE {
            return Err(Error::malformed(format!(
                "invalid DDS header size: expected {HEADER_SIZE}, got {size}"
            )));
        }

        let pf = PIXEL_FORMAT_AT;
        let flags = field(pf + 4);
        let format = if flags & pf_flags::FOURCC != 0 {
            let code = read::bytes(data, pf + 8, 4).unwrap_or(&[0; 4]);
            SurfaceFormat::from_fourcc([code[0], code[1], code[2], code[3]])
        } else {
            let bits = field(pf + 12);
            let alpha_mask = if flags & pf_flags::ALPHAPIXELS != 0 { field(pf + 28) } else { 0 };
            if bits == 32 && flags & pf_flags::RGB != 0 {
                SurfaceFormat::Masked32([field(pf + 16), field(pf + 20), field(pf + 24), alpha_mask])
            } else {
                SurfaceFormat::Uncompressed(bits)
            }
        };

        Ok(Self {
            height: field(12),
            width: field(16),
            pitch: field(20),
            format,
        })
    }
}

/// Pull one channel out of a packed pixel, scaled to 8 bits
fn channel(pixel: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let value = (pixel & mask) >> mask.trailing_zeros();
    let max = mask >> mask.trailing_zeros();
    if max == 0xFF {
        value as u8
    } else {
        (u64::from(value) * 255 / u64::from(max)) as u8
    }
}

/// DirectDraw Surface (`dds`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DdsCodec;

impl Detect for DdsCodec {
    fn id(&self) -> &str {
        "dds"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        DATA_OFFSET
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < DATA_OFFSET || !read::magic_at(data, 0, MAGIC) {
            return Confidence::NoMatch;
        }
        match DdsHeader::parse(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ImageCodec for DdsCodec {
    fn name(&self) -> &str {
        "DirectDraw Surface"
    }

    fn extension(&self) -> &str {
        "dds"
    }

    fn info(&self, data: &[u8]) -> Result<ImageInfo> {
        let header = DdsHeader::parse(data)?;
        Ok(ImageInfo {
            width: header.width,
            height: header.height,
            format: PixelFormat::Rgba,
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let header = DdsHeader::parse(data)?;
        let SurfaceFormat::Masked32(masks) = header.format else {
            return Err(Error::unsupported(format!("DDS surface {}", header.format.describe())));
        };
        let (width, height) = (header.width as usize, header.height as usize);
        if width == 0 || height == 0 {
            return Err(Error::malformed("DDS with zero size"));
        }
        let row_len = width * 4;
        let pitch = if header.pitch as usize >= row_len { header.pitch as usize } else { row_len };
        let needed = pitch
            .checked_mul(height - 1)
            .and_then(|n| n.checked_add(row_len))
            .ok_or_else(|| Error::malformed("DDS surface size overflows"))?;
        let surface = range_checked(data, DATA_OFFSET, needed)?;

        let mut pixels = Vec::with_capacity(row_len * height);
        for y in 0..height {
            for texel in surface[y * pitch..y * pitch + row_len].chunks_exact(4) {
                let packed = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
                let alpha = if masks[3] == 0 { 255 } else { channel(packed, masks[3]) };
                pixels.extend_from_slice(&[
                    channel(packed, masks[0]),
                    channel(packed, masks[1]),
                    channel(packed, masks[2]),
                    alpha,
                ]);
            }
        }
        Image::rgba(header.width, header.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: u32, height: u32, flags: u32, fourcc: &[u8; 4], masks: [u32; 4]) -> Vec<u8> {
        let mut data = Vec::with_capacity(DATA_OFFSET);
        data.extend_from_slice(MAGIC);
        for value in [HEADER_SIZE, 0x1007, height, width, width * 4, 0, 1] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.resize(PIXEL_FORMAT_AT, 0);
        data.extend_from_slice(&32u32.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(fourcc);
        data.extend_from_slice(&32u32.to_le_bytes());
        for mask in masks {
            data.extend_from_slice(&mask.to_le_bytes());
        }
        data.resize(DATA_OFFSET, 0);
        data
    }

    const BGRA: [u32; 4] = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000];

    #[test]
    fn test_decode_bgra() {
        let mut data = header(2, 1, pf_flags::RGB | pf_flags::ALPHAPIXELS, &[0; 4], BGRA);
        data.extend_from_slice(&[1, 2, 3, 4, 10, 20, 30, 40]);
        assert_eq!(DdsCodec.test(&data), Confidence::Certain);
        let image = DdsCodec.decode(&data).unwrap();
        assert_eq!(image.pixels(), &[3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn test_no_alpha_mask_is_opaque() {
        let mut data = header(1, 1, pf_flags::RGB, &[0; 4], [0xFF, 0xFF00, 0xFF_0000, 0]);
        data.extend_from_slice(&[7, 8, 9, 0]);
        assert_eq!(DdsCodec.decode(&data).unwrap().pixels(), &[7, 8, 9, 255]);
    }

    #[test]
    fn test_channel_scaling() {
        assert_eq!(channel(0b11111, 0b11111), 255);
        assert_eq!(channel(0, 0b11111), 0);
        assert_eq!(channel(0xAB00, 0xFF00), 0xAB);
        assert_eq!(channel(0x1234, 0), 0);
    }

    #[test]
    fn test_block_compressed_unsupported() {
        let mut data = header(4, 4, pf_flags::FOURCC, b"DXT5", [0; 4]);
        data.extend_from_slice(&[0; 16]);
        let info = DdsCodec.info(&data).unwrap();
        assert_eq!((info.width, info.height), (4, 4));
        let err = DdsCodec.decode(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant { .. }));
        assert!(err.to_string().contains("BC3"));
    }

    #[test]
    fn test_truncated_surface() {
        let mut data = header(4, 4, pf_flags::RGB, &[0; 4], BGRA);
        data.extend_from_slice(&[0; 20]);
        assert!(DdsCodec.decode(&data).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_detection() {
        let mut data = header(1, 1, pf_flags::RGB, &[0; 4], BGRA);
        assert_eq!(DdsCodec.test(&data), Confidence::Certain);
        data[4] = 100;
        assert_eq!(DdsCodec.test(&data), Confidence::Unlikely);
        assert_eq!(DdsCodec.test(b"DDS "), Confidence::NoMatch);
    }
}
