//! Stream compression adapter
//!
//! Wraps the compression backends used by container formats behind two
//! calls, [`inflate`] and [`deflate`]:
//! - Deflate (raw, as stored in ZIP entries)
//! - Zlib
//! - Gzip (single member)
//! - BZip2
//! - LZMA/xz (feature `lzma`)
//! - Zstandard

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use wadforge_core::{ByteBuffer, Error, Result};

/// Compression algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Raw DEFLATE stream without header
    Deflate,
    /// DEFLATE with zlib header and adler32 trailer
    Zlib,
    /// gzip member
    Gzip,
    /// bzip2 stream
    Bzip2,
    /// xz container around LZMA2
    Lzma,
    /// Zstandard frame
    Zstd,
}

impl Codec {
    /// Short lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Codec::Deflate => "deflate",
            Codec::Zlib => "zlib",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Lzma => "lzma",
            Codec::Zstd => "zstd",
        }
    }

    /// Whether this build can (de)compress the codec
    pub const fn is_available(self) -> bool {
        match self {
            Codec::Lzma => cfg!(feature = "lzma"),
            _ => true,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compression level, 0 (fastest) to 9 (smallest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Level(u8);

impl Level {
    pub const FASTEST: Level = Level(1);
    pub const DEFAULT: Level = Level(6);
    pub const BEST: Level = Level(9);

    /// Clamp `level` into `0..=9`
    pub const fn new(level: u8) -> Self {
        if level > 9 {
            Level(9)
        } else {
            Level(level)
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::DEFAULT
    }
}

/// Decompress `input`, checking the result length against `expected` if given
///
/// Output is capped at [`ByteBuffer::MAX_SIZE`].
pub fn inflate(codec: Codec, input: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    inflate_limited(codec, input, expected, ByteBuffer::MAX_SIZE)
}

/// Decompress with an explicit output limit
///
/// A stream that would expand past `limit` fails with `CompressionFailure`.
pub fn inflate_limited(
    codec: Codec,
    input: &[u8],
    expected: Option<usize>,
    limit: usize,
) -> Result<Vec<u8>> {
    let output = if input.is_empty() {
        Vec::new()
    } else {
        let capacity = expected.unwrap_or(input.len() * 2).min(limit);
        let mut output = Vec::with_capacity(capacity);
        let cap = limit as u64 + 1;

        let read = match codec {
            Codec::Deflate => flate2::read::DeflateDecoder::new(input)
                .take(cap)
                .read_to_end(&mut output),
            Codec::Zlib => flate2::read::ZlibDecoder::new(input)
                .take(cap)
                .read_to_end(&mut output),
            Codec::Gzip => flate2::read::GzDecoder::new(input)
                .take(cap)
                .read_to_end(&mut output),
            Codec::Bzip2 => bzip2::read::BzDecoder::new(input)
                .take(cap)
                .read_to_end(&mut output),
            Codec::Lzma => read_lzma(input, cap, &mut output),
            Codec::Zstd => zstd::stream::read::Decoder::new(input)
                .and_then(|decoder| decoder.take(cap).read_to_end(&mut output)),
        };

        read.map_err(|e| Error::compression(format!("{codec} decompression failed: {e}")))?;

        if output.len() > limit {
            return Err(Error::compression(format!(
                "{codec} stream expands past the {limit} byte limit"
            )));
        }
        output
    };

    if let Some(expected) = expected {
        if output.len() != expected {
            return Err(Error::SizeMismatch {
                expected: expected as u64,
                actual: output.len() as u64,
            });
        }
    }

    Ok(output)
}

/// Compress `input` with `codec` at `level`
pub fn deflate(codec: Codec, input: &[u8], level: Level) -> Result<Vec<u8>> {
    let fail = |e: std::io::Error| Error::compression(format!("{codec} compression failed: {e}"));
    let flate_level = flate2::Compression::new(u32::from(level.value()));

    match codec {
        Codec::Deflate => {
            let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate_level);
            encoder.write_all(input).map_err(fail)?;
            encoder.finish().map_err(fail)
        }
        Codec::Zlib => {
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate_level);
            encoder.write_all(input).map_err(fail)?;
            encoder.finish().map_err(fail)
        }
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate_level);
            encoder.write_all(input).map_err(fail)?;
            encoder.finish().map_err(fail)
        }
        Codec::Bzip2 => {
            // bzip2 block sizes run 1..=9
            let block = u32::from(level.value().max(1));
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(block));
            encoder.write_all(input).map_err(fail)?;
            encoder.finish().map_err(fail)
        }
        Codec::Lzma => write_lzma(input, level).map_err(fail),
        Codec::Zstd => zstd::stream::encode_all(input, i32::from(level.value())).map_err(fail),
    }
}

#[cfg(feature = "lzma")]
fn read_lzma(input: &[u8], cap: u64, output: &mut Vec<u8>) -> std::io::Result<usize> {
    xz2::read::XzDecoder::new(input).take(cap).read_to_end(output)
}

#[cfg(not(feature = "lzma"))]
fn read_lzma(_input: &[u8], _cap: u64, _output: &mut Vec<u8>) -> std::io::Result<usize> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "built without the lzma feature",
    ))
}

#[cfg(feature = "lzma")]
fn write_lzma(input: &[u8], level: Level) -> std::io::Result<Vec<u8>> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), u32::from(level.value()));
    encoder.write_all(input)?;
    encoder.finish()
}

#[cfg(not(feature = "lzma"))]
fn write_lzma(_input: &[u8], _level: Level) -> std::io::Result<Vec<u8>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "built without the lzma feature",
    ))
}

/// Calculate CRC32 checksum
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verify data integrity using CRC32
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODECS: [Codec; 5] = [
        Codec::Deflate,
        Codec::Zlib,
        Codec::Gzip,
        Codec::Bzip2,
        Codec::Zstd,
    ];

    fn sample() -> Vec<u8> {
        b"E1M1: Hangar. E1M2: Nuclear Plant. ".repeat(40)
    }

    #[test]
    fn test_round_trip_every_codec() {
        let data = sample();
        for codec in CODECS {
            let packed = deflate(codec, &data, Level::DEFAULT).unwrap();
            assert!(packed.len() < data.len(), "{codec} did not shrink input");
            let unpacked = inflate(codec, &packed, Some(data.len())).unwrap();
            assert_eq!(unpacked, data, "{codec}");
        }
    }

    #[test]
    fn test_zero_length_round_trip() {
        for codec in CODECS {
            let packed = deflate(codec, &[], Level::DEFAULT).unwrap();
            let unpacked = inflate(codec, &packed, Some(0)).unwrap();
            assert!(unpacked.is_empty(), "{codec}");
        }
    }

    #[test]
    fn test_empty_input_inflates_to_nothing() {
        assert!(inflate(Codec::Zlib, &[], None).unwrap().is_empty());
    }

    #[test]
    fn test_size_mismatch_reported() {
        let packed = deflate(Codec::Zlib, b"abcdef", Level::FASTEST).unwrap();
        let err = inflate(Codec::Zlib, &packed, Some(10)).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 10, actual: 6 }));
    }

    #[test]
    fn test_garbage_fails() {
        let err = inflate(Codec::Zlib, b"definitely not zlib", None).unwrap_err();
        assert!(matches!(err, Error::CompressionFailure { .. }));
    }

    #[test]
    fn test_limit_enforced() {
        let data = vec![0u8; 4096];
        let packed = deflate(Codec::Deflate, &data, Level::BEST).unwrap();
        let err = inflate_limited(Codec::Deflate, &packed, None, 1024).unwrap_err();
        assert!(matches!(err, Error::CompressionFailure { .. }));
    }

    #[test]
    fn test_level_clamped() {
        assert_eq!(Level::new(42).value(), 9);
        assert_eq!(Level::default(), Level::DEFAULT);
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn test_lzma_round_trip() {
        let data = sample();
        let packed = deflate(Codec::Lzma, &data, Level::DEFAULT).unwrap();
        assert_eq!(inflate(Codec::Lzma, &packed, None).unwrap(), data);
    }

    #[cfg(not(feature = "lzma"))]
    #[test]
    fn test_lzma_unavailable() {
        assert!(!Codec::Lzma.is_available());
        assert!(deflate(Codec::Lzma, b"x", Level::DEFAULT).is_err());
    }

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert!(verify_crc32(b"", 0));
    }
}
