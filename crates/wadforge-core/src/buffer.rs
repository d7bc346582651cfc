//! Growable byte buffer with a bounds-checked cursor
//!
//! `ByteBuffer` is the in-memory representation of every lump, entry and
//! encoded image. Reads are explicit about width and byte order and never
//! move the cursor past the end; writes overwrite at the cursor and grow the
//! buffer up to [`ByteBuffer::MAX_SIZE`].

use std::io::SeekFrom;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Owned bytes plus a read/write cursor
///
/// Invariant: `cursor <= data.len()`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl ByteBuffer {
    /// Largest size a buffer may grow to (2 GiB)
    pub const MAX_SIZE: usize = 0x8000_0000;

    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.min(Self::MAX_SIZE)),
            cursor: 0,
        }
    }

    /// Wrap existing bytes, cursor at the start
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    /// Copy a slice into a new buffer
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// A zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Result<Self> {
        let mut buffer = Self::new();
        buffer.resize(len)?;
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes between the cursor and the end
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Move the cursor. Positions outside `[0, len]` are rejected and leave
    /// the cursor where it was.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<usize> {
        let len = self.data.len() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => self.cursor as i128 + i128::from(delta),
            SeekFrom::End(delta) => len + i128::from(delta),
        };

        if target < 0 || target > len {
            let offset = usize::try_from(target.max(0)).unwrap_or(usize::MAX);
            return Err(Error::out_of_bounds(offset, self.data.len()));
        }

        self.cursor = target as usize;
        Ok(self.cursor)
    }

    /// Seek to an absolute position
    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        self.seek(SeekFrom::Start(offset as u64)).map(|_| ())
    }

    /// Reset the cursor to the start
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Resize to exactly `len` bytes, zero-filling growth
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if len > Self::MAX_SIZE {
            return Err(Error::unsupported(format!(
                "buffer of {} bytes exceeds the {} byte limit",
                len,
                Self::MAX_SIZE
            )));
        }
        self.data.resize(len, 0);
        self.cursor = self.cursor.min(len);
        Ok(())
    }

    // ==================== Reading ====================

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if count > available {
            return Err(Error::truncated(self.cursor, count, available));
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(&self.data[start..start + count])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Borrow the next `count` bytes and advance past them
    pub fn read_bytes(&mut self, count: usize) -> Result<&[u8]> {
        self.take(count)
    }

    /// Read a fixed-size array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a fixed-width, NUL-padded name field
    ///
    /// Everything from the first NUL on is ignored; invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String> {
        Ok(fixed_string(self.take(width)?))
    }

    // ==================== Positional access ====================

    /// Borrow `len` bytes at `offset` without moving the cursor
    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        range_checked(&self.data, offset, len)
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    pub fn u16_le_at(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes_at(offset, 2)?))
    }

    pub fn i16_le_at(&self, offset: usize) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.bytes_at(offset, 2)?))
    }

    pub fn u32_le_at(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes_at(offset, 4)?))
    }

    pub fn u32_be_at(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.bytes_at(offset, 4)?))
    }

    pub fn i32_le_at(&self, offset: usize) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.bytes_at(offset, 4)?))
    }

    // ==================== Writing ====================

    /// Write bytes at the cursor, overwriting and then growing
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self
            .cursor
            .checked_add(bytes.len())
            .ok_or_else(|| Error::unsupported("write position overflows"))?;
        if end > self.data.len() {
            self.resize(end)?;
        }
        self.data[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&[value as u8])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i16_le(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32_le(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write `value` into a `width`-byte NUL-padded field, truncating
    pub fn write_fixed_string(&mut self, value: &str, width: usize) -> Result<()> {
        let bytes = value.as_bytes();
        let used = bytes.len().min(width);
        self.write_bytes(&bytes[..used])?;
        self.write_zeros(width - used)
    }

    /// Append `count` zero bytes at the cursor
    pub fn write_zeros(&mut self, count: usize) -> Result<()> {
        let end = self
            .cursor
            .checked_add(count)
            .ok_or_else(|| Error::unsupported("write position overflows"))?;
        if end > self.data.len() {
            self.resize(end)?;
        }
        self.data[self.cursor..end].fill(0);
        self.cursor = end;
        Ok(())
    }

    // ==================== Patching ====================

    /// Overwrite bytes at `offset` without moving the cursor; never grows
    pub fn patch_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let len = self.data.len();
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= len)
            .ok_or_else(|| Error::out_of_bounds(offset, len))?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn patch_u16_le(&mut self, offset: usize, value: u16) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    pub fn patch_i16_le(&mut self, offset: usize, value: i16) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    pub fn patch_u32_le(&mut self, offset: usize, value: u32) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    pub fn patch_i32_le(&mut self, offset: usize, value: i32) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    // ==================== Ranges ====================

    /// Copy `len` bytes starting at `offset` out of the buffer
    pub fn export_range(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        Ok(self.bytes_at(offset, len)?.to_vec())
    }

    /// Copy `bytes` into the buffer at `offset`, growing if they run past the end
    ///
    /// `offset` itself must lie within `[0, len]`.
    pub fn import_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::out_of_bounds(offset, self.data.len()));
        }
        let saved = self.cursor;
        self.cursor = offset;
        let result = self.write_bytes(bytes);
        self.cursor = saved.min(self.data.len());
        result
    }

    /// CRC-32 of the whole contents
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.data)
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.data.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Decode a fixed-width NUL-padded name field
pub fn fixed_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Bounds-checked `data[offset..offset + len]`
pub fn range_checked(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .map(|end| &data[offset..end])
        .ok_or_else(|| {
            if offset >= data.len() {
                Error::out_of_bounds(offset, data.len())
            } else {
                Error::truncated(offset, len, data.len() - offset)
            }
        })
}

/// Non-failing field readers over plain slices, used by detectors
///
/// Each returns `None` when the field would extend past the end of `data`.
pub mod read {
    use byteorder::{BigEndian, ByteOrder, LittleEndian};

    pub fn bytes(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
        data.get(offset..offset.checked_add(len)?)
    }

    pub fn u8(data: &[u8], offset: usize) -> Option<u8> {
        data.get(offset).copied()
    }

    pub fn i8(data: &[u8], offset: usize) -> Option<i8> {
        data.get(offset).map(|&b| b as i8)
    }

    pub fn u16_le(data: &[u8], offset: usize) -> Option<u16> {
        bytes(data, offset, 2).map(LittleEndian::read_u16)
    }

    pub fn i16_le(data: &[u8], offset: usize) -> Option<i16> {
        bytes(data, offset, 2).map(LittleEndian::read_i16)
    }

    pub fn u16_be(data: &[u8], offset: usize) -> Option<u16> {
        bytes(data, offset, 2).map(BigEndian::read_u16)
    }

    pub fn u32_le(data: &[u8], offset: usize) -> Option<u32> {
        bytes(data, offset, 4).map(LittleEndian::read_u32)
    }

    pub fn i32_le(data: &[u8], offset: usize) -> Option<i32> {
        bytes(data, offset, 4).map(LittleEndian::read_i32)
    }

    pub fn u32_be(data: &[u8], offset: usize) -> Option<u32> {
        bytes(data, offset, 4).map(BigEndian::read_u32)
    }

    /// Whether `data` holds `magic` at `offset`
    pub fn magic_at(data: &[u8], offset: usize, magic: &[u8]) -> bool {
        bytes(data, offset, magic.len()) == Some(magic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_endianness() {
        let mut buf = ByteBuffer::from_slice(&[0x34, 0x12, 0x12, 0x34, 0xFF, 0xFF]);
        assert_eq!(buf.read_u16_le().unwrap(), 0x1234);
        assert_eq!(buf.read_u16_be().unwrap(), 0x1234);
        assert_eq!(buf.read_i16_le().unwrap(), -1);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_leaves_cursor() {
        let mut buf = ByteBuffer::from_slice(&[1, 2, 3]);
        buf.read_u8().unwrap();
        let err = buf.read_u32_le().unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedData { offset: 1, needed: 4, available: 2 }
        ));
        assert_eq!(buf.position(), 1);
    }

    #[test]
    fn test_seek_bounds() {
        let mut buf = ByteBuffer::from_slice(&[0; 8]);
        assert_eq!(buf.seek(SeekFrom::End(0)).unwrap(), 8);
        assert!(buf.seek(SeekFrom::Start(9)).is_err());
        assert!(buf.seek(SeekFrom::Current(-9)).is_err());
        assert_eq!(buf.position(), 8);
        assert_eq!(buf.seek(SeekFrom::Current(-3)).unwrap(), 5);
    }

    #[test]
    fn test_write_grows_and_overwrites() {
        let mut buf = ByteBuffer::from_slice(&[9, 9, 9]);
        buf.seek_to(1).unwrap();
        buf.write_u32_le(0xAABBCCDD).unwrap();
        assert_eq!(buf.as_slice(), &[9, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(buf.position(), 5);
    }

    #[test]
    fn test_resize_limit() {
        let mut buf = ByteBuffer::new();
        let err = buf.resize(ByteBuffer::MAX_SIZE + 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fixed_string_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.write_fixed_string("PLAYPAL", 8).unwrap();
        buf.write_fixed_string("TOOLONGNAME", 8).unwrap();
        assert_eq!(buf.len(), 16);

        buf.rewind();
        assert_eq!(buf.read_fixed_string(8).unwrap(), "PLAYPAL");
        assert_eq!(buf.read_fixed_string(8).unwrap(), "TOOLONGN");
    }

    #[test]
    fn test_fixed_string_stops_at_nul() {
        assert_eq!(fixed_string(b"AB\0CD\0\0\0"), "AB");
    }

    #[test]
    fn test_patch_never_grows() {
        let mut buf = ByteBuffer::zeroed(4).unwrap();
        buf.patch_u16_le(2, 0xBEEF).unwrap();
        assert_eq!(buf.as_slice(), &[0, 0, 0xEF, 0xBE]);
        assert!(buf.patch_u32_le(2, 1).is_err());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_export_import_range() {
        let mut buf = ByteBuffer::from_slice(b"abcdef");
        assert_eq!(buf.export_range(2, 3).unwrap(), b"cde");
        assert!(buf.export_range(4, 3).is_err());

        buf.import_at(4, b"XYZ").unwrap();
        assert_eq!(buf.as_slice(), b"abcdXYZ");
        assert!(buf.import_at(9, b"!").is_err());
    }

    #[test]
    fn test_range_checked_errors() {
        let data = [0u8; 4];
        assert!(matches!(
            range_checked(&data, 4, 1),
            Err(Error::OutOfBoundsOffset { offset: 4, length: 4 })
        ));
        assert!(matches!(
            range_checked(&data, 2, 4),
            Err(Error::TruncatedData { .. })
        ));
        assert_eq!(range_checked(&data, 4, 0).unwrap().len(), 0);
    }

    #[test]
    fn test_slice_readers() {
        let data = [0x01, 0x00, 0x00, 0x80];
        assert_eq!(read::u16_le(&data, 0), Some(1));
        assert_eq!(read::i32_le(&data, 0), Some(i32::MIN + 1));
        assert_eq!(read::u32_le(&data, 1), None);
        assert_eq!(read::u16_le(&data, usize::MAX), None);
        assert!(read::magic_at(&data, 2, &[0x00, 0x80]));
    }

    #[test]
    fn test_crc32() {
        let buf = ByteBuffer::from_slice(b"123456789");
        assert_eq!(buf.crc32(), 0xCBF4_3926);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cursor_never_passes_end(data in prop::collection::vec(any::<u8>(), 0..64),
                                       reads in prop::collection::vec(0usize..6, 0..32)) {
                let mut buf = ByteBuffer::from_vec(data);
                for r in reads {
                    let _ = match r {
                        0 => buf.read_u8().map(|_| ()),
                        1 => buf.read_u16_le().map(|_| ()),
                        2 => buf.read_u32_be().map(|_| ()),
                        3 => buf.read_u64_le().map(|_| ()),
                        4 => buf.read_bytes(7).map(|_| ()),
                        _ => buf.read_fixed_string(8).map(|_| ()),
                    };
                    prop_assert!(buf.position() <= buf.len());
                }
            }
        }
    }
}
