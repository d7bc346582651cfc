//! ZIP container
//!
//! # Format Structure
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ local header + data        (per entry)      │
//! ├─────────────────────────────────────────────┤
//! │ central directory records  (0x02014B50)     │
//! ├─────────────────────────────────────────────┤
//! │ [ZIP64 end record + locator]                │
//! ├─────────────────────────────────────────────┤
//! │ end of central directory   (0x06054B50)     │
//! │  - entry count, directory size and offset   │
//! │  - archive comment                          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Directory records (names ending in `/`) and the `/`-separated entry
//! names both become folders of the tree. Entries stored with a method this
//! build cannot decode keep their raw bytes and method code.

use bytes::Bytes;
use wadforge_core::buffer::{range_checked, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{check_span, index_progress, Archive, ArchiveContents, ArchiveEntry, ArchiveProps, EntryProps, TreeNode};
use crate::compression::{self, crc32, Codec};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

/// Local file header signature
const LOCAL_HEADER_SIGNATURE: u32 = 0x04034B50;

/// Central directory file header signature
const CD_SIGNATURE: u32 = 0x02014B50;

/// End of central directory signature
const EOCD_SIGNATURE: u32 = 0x06054B50;

/// ZIP64 end of central directory record signature
const ZIP64_EOCD_SIGNATURE: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature
const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064B50;

const LOCAL_HEADER_LEN: usize = 30;
const CD_RECORD_LEN: usize = 46;
const EOCD_LEN: usize = 22;
const ZIP64_EOCD_LEN: usize = 56;
const ZIP64_LOCATOR_LEN: usize = 20;
const MAX_COMMENT: usize = u16::MAX as usize;

/// General purpose flag: encrypted
const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose flag: names are UTF-8
const FLAG_UTF8: u16 = 0x0800;
/// Flags carried over with the stored bytes of an unmodified entry
const PASSTHROUGH_FLAGS: u16 = FLAG_ENCRYPTED | FLAG_UTF8;
/// MS-DOS directory attribute
const ATTR_DIRECTORY: u32 = 0x10;
/// 1980-01-01
const DEFAULT_DATE: u16 = 0x0021;

/// Compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,
    Deflate,
    Bzip2,
    Zstd,
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            12 => CompressionMethod::Bzip2,
            93 => CompressionMethod::Zstd,
            other => CompressionMethod::Unknown(other),
        }
    }
}

impl CompressionMethod {
    /// Method code as stored in headers
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Unknown(code) => code,
        }
    }

    /// Stream codec for compressed methods
    pub fn codec(self) -> Option<Codec> {
        match self {
            CompressionMethod::Deflate => Some(Codec::Deflate),
            CompressionMethod::Bzip2 => Some(Codec::Bzip2),
            CompressionMethod::Zstd => Some(Codec::Zstd),
            CompressionMethod::Store | CompressionMethod::Unknown(_) => None,
        }
    }

    fn version_needed(self) -> u16 {
        match self {
            CompressionMethod::Bzip2 => 46,
            CompressionMethod::Zstd => 63,
            _ => 20,
        }
    }
}

/// End of Central Directory record
#[derive(Debug)]
struct EndOfCentralDirectory {
    offset: usize,
    total_entries: u64,
    cd_size: u64,
    cd_offset: u64,
    comment: String,
}

/// Locate and parse the end of central directory record
///
/// The record is at least 22 bytes and may be followed by a comment of up
/// to 64 KiB, so only that tail is searched.
fn parse_eocd(data: &[u8]) -> Result<EndOfCentralDirectory> {
    if data.len() < EOCD_LEN {
        return Err(Error::truncated(0, EOCD_LEN, data.len()));
    }
    let search_start = data.len().saturating_sub(MAX_COMMENT + EOCD_LEN);
    let sig_bytes = EOCD_SIGNATURE.to_le_bytes();

    // the last signature whose comment length fits the file
    let offset = (search_start..=data.len() - EOCD_LEN)
        .rev()
        .find(|&pos| {
            data[pos..pos + 4] == sig_bytes
                && read::u16_le(data, pos + 20)
                    .is_some_and(|len| pos + EOCD_LEN + len as usize <= data.len())
        })
        .ok_or_else(|| Error::malformed("no end of central directory record"))?;

    let field16 = |at: usize| read::u16_le(data, offset + at).unwrap_or(0);
    let field32 = |at: usize| read::u32_le(data, offset + at).unwrap_or(0);

    let disk_number = field16(4);
    let cd_disk = field16(6);
    if disk_number != 0 || cd_disk != 0 {
        return Err(Error::unsupported("multi-volume ZIP archives"));
    }

    let total_entries = field16(10);
    let cd_size = field32(12);
    let cd_offset = field32(16);
    let comment_len = field16(20) as usize;
    let comment_start = offset + EOCD_LEN;
    let comment = String::from_utf8_lossy(&data[comment_start..comment_start + comment_len]).into_owned();

    let mut eocd = EndOfCentralDirectory {
        offset,
        total_entries: u64::from(total_entries),
        cd_size: u64::from(cd_size),
        cd_offset: u64::from(cd_offset),
        comment,
    };

    // Check for ZIP64
    if cd_offset == u32::MAX || cd_size == u32::MAX || total_entries == u16::MAX {
        if let Some((total, size, cd)) = parse_zip64_eocd(data, offset)? {
            eocd.total_entries = total;
            eocd.cd_size = size;
            eocd.cd_offset = cd;
        }
    }

    Ok(eocd)
}

/// Parse the ZIP64 end record located just before the classic one
///
/// `None` when there is no locator, i.e. the saturated fields are genuine.
fn parse_zip64_eocd(data: &[u8], eocd_offset: usize) -> Result<Option<(u64, u64, u64)>> {
    let Some(locator_offset) = eocd_offset.checked_sub(ZIP64_LOCATOR_LEN) else {
        return Ok(None);
    };
    if read::u32_le(data, locator_offset) != Some(ZIP64_EOCD_LOCATOR_SIGNATURE) {
        return Ok(None);
    }

    let record_offset = usize::try_from(u64_at(data, locator_offset + 8))
        .map_err(|_| Error::malformed("ZIP64 end record offset overflows"))?;
    let record = range_checked(data, record_offset, ZIP64_EOCD_LEN)?;

    if read::u32_le(record, 0) != Some(ZIP64_EOCD_SIGNATURE) {
        return Err(Error::malformed(format!(
            "bad ZIP64 end record signature at {record_offset}"
        )));
    }

    Ok(Some((u64_at(record, 32), u64_at(record, 40), u64_at(record, 48))))
}

fn u64_at(data: &[u8], offset: usize) -> u64 {
    read::bytes(data, offset, 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .unwrap_or(0)
}

/// Sizes and offset from the ZIP64 extended information extra field
///
/// Only the fields saturated in the fixed record are present, in order.
fn parse_zip64_extra(extra: &[u8], compressed: u32, uncompressed: u32, local_offset: u32) -> (u64, u64, u64) {
    let mut sizes = (u64::from(compressed), u64::from(uncompressed), u64::from(local_offset));

    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let id = read::u16_le(extra, pos).unwrap_or(0);
        let size = read::u16_le(extra, pos + 2).unwrap_or(0) as usize;
        pos += 4;

        if id == 0x0001 && pos + size <= extra.len() {
            let field = &extra[pos..pos + size];
            let mut field_pos = 0;
            let mut next = |saturated: bool, value: &mut u64| {
                if saturated && field_pos + 8 <= field.len() {
                    *value = u64_at(field, field_pos);
                    field_pos += 8;
                }
            };
            next(uncompressed == u32::MAX, &mut sizes.1);
            next(compressed == u32::MAX, &mut sizes.0);
            next(local_offset == u32::MAX, &mut sizes.2);
            break;
        }

        pos += size;
    }

    sizes
}

/// One central directory record, resolved to its payload
struct CentralRecord {
    path: String,
    method: u16,
    flags: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    compressed: u64,
    uncompressed: u64,
    local_offset: u64,
    record_len: usize,
}

fn parse_cd_record(data: &[u8], offset: usize) -> Result<CentralRecord> {
    let header = range_checked(data, offset, CD_RECORD_LEN)?;
    let sig = read::u32_le(header, 0).unwrap_or(0);
    if sig != CD_SIGNATURE {
        return Err(Error::malformed(format!(
            "bad central directory signature {sig:08x} at {offset}"
        )));
    }

    let u16_at = |at: usize| read::u16_le(header, at).unwrap_or(0);
    let u32_at = |at: usize| read::u32_le(header, at).unwrap_or(0);

    let flags = u16_at(8);
    let name_length = u16_at(28) as usize;
    let extra_length = u16_at(30) as usize;
    let comment_length = u16_at(32) as usize;

    let name_bytes = range_checked(data, offset + CD_RECORD_LEN, name_length)?;
    let extra = range_checked(data, offset + CD_RECORD_LEN + name_length, extra_length)?;
    let (compressed, uncompressed, local_offset) = parse_zip64_extra(extra, u32_at(20), u32_at(24), u32_at(42));

    Ok(CentralRecord {
        path: String::from_utf8_lossy(name_bytes).into_owned(),
        method: u16_at(10),
        flags,
        mod_time: u16_at(12),
        mod_date: u16_at(14),
        crc32: u32_at(16),
        compressed,
        uncompressed,
        local_offset,
        record_len: CD_RECORD_LEN + name_length + extra_length + comment_length,
    })
}

/// Offset of an entry's data, read from its local header
fn data_offset(data: &[u8], local_offset: u64, name: &str) -> Result<u64> {
    let offset = usize::try_from(local_offset)
        .map_err(|_| Error::out_of_bounds(usize::MAX, data.len()))?;
    let local = range_checked(data, offset, LOCAL_HEADER_LEN)
        .map_err(|e| e.with_context(format!("local header of '{name}'")))?;

    let sig = read::u32_le(local, 0).unwrap_or(0);
    if sig != LOCAL_HEADER_SIGNATURE {
        return Err(Error::malformed(format!(
            "bad local header signature {sig:08x} for '{name}'"
        )));
    }

    let name_len = u64::from(read::u16_le(local, 26).unwrap_or(0));
    let extra_len = u64::from(read::u16_le(local, 28).unwrap_or(0));
    Ok(local_offset + LOCAL_HEADER_LEN as u64 + name_len + extra_len)
}

/// ZIP archive
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipFormat;

impl Detect for ZipFormat {
    fn id(&self) -> &str {
        "zip"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        EOCD_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < EOCD_LEN {
            return Confidence::NoMatch;
        }
        if read::magic_at(data, 0, b"PK\x03\x04") {
            match parse_eocd(data) {
                Ok(_) => Confidence::Certain,
                Err(_) => Confidence::Maybe,
            }
        } else if read::magic_at(data, 0, b"PK\x05\x06") {
            // empty archive: nothing but the end record
            Confidence::Certain
        } else {
            Confidence::NoMatch
        }
    }
}

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &str {
        "ZIP"
    }

    fn extensions(&self) -> &[&str] {
        &["zip", "pk3", "pk7", "pke", "ipk3"]
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            directories: true,
            max_name_len: Some(u16::MAX as usize),
            compresses: true,
            single_entry: false,
        }
    }

    fn read_directory(
        &self,
        source: &Bytes,
        _options: &OpenOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<ArchiveContents> {
        let eocd = parse_eocd(source)?;

        let cd_end = eocd
            .cd_offset
            .checked_add(eocd.cd_size)
            .filter(|end| *end <= eocd.offset as u64)
            .ok_or_else(|| Error::out_of_bounds(eocd.offset, source.len()).with_context("ZIP central directory"))?;
        let total = usize::try_from(eocd.total_entries)
            .map_err(|_| Error::malformed(format!("{} entries", eocd.total_entries)))?;

        let mut contents = ArchiveContents {
            props: ArchiveProps {
                comment: (!eocd.comment.is_empty()).then_some(eocd.comment),
                ..ArchiveProps::default()
            },
            ..ArchiveContents::default()
        };

        let mut pos = eocd.cd_offset as usize;
        for i in 0..total {
            if pos as u64 >= cd_end {
                return Err(Error::truncated(pos, CD_RECORD_LEN, 0).with_context(format!(
                    "central directory ends after {i} of {total} records"
                )));
            }
            let record = parse_cd_record(source, pos)?;
            pos += record.record_len;
            index_progress(progress, i, total, &record.path);

            if record.path.ends_with('/') || record.path.ends_with('\\') {
                contents
                    .root
                    .ensure_dirs(record.path.split(['/', '\\']).filter(|p| !p.is_empty()));
                continue;
            }

            let (dirs, name) = super::entry::split_path(&record.path);
            let Some(name) = name else {
                tracing::warn!(path = %record.path, "skipping ZIP record with an empty name");
                continue;
            };

            let offset = data_offset(source, record.local_offset, name)?;
            check_span(source.len(), offset, record.compressed, &record.path)?;

            let method = CompressionMethod::from(record.method);
            let encrypted = record.flags & FLAG_ENCRYPTED != 0;
            if encrypted {
                tracing::warn!(entry = %record.path, "encrypted entry kept as stored bytes");
            } else if let CompressionMethod::Unknown(code) = method {
                tracing::warn!(entry = %record.path, method = code, "unsupported compression method, kept raw");
            }

            let props = EntryProps {
                full_size: record.uncompressed,
                compression: if encrypted { None } else { method.codec() },
                crc32: Some(record.crc32),
                lump_type: None,
                mod_time: record.mod_time,
                mod_date: record.mod_date,
                raw_method: Some(record.method),
                raw_flags: record.flags,
            };
            let entry = ArchiveEntry::on_disk(name, offset, record.compressed).with_props(props);

            let ids = contents.root.ensure_dirs(dirs);
            if let Some(dir) = contents.root.descend_mut(&ids) {
                dir.entries.push(entry);
            }
        }

        tracing::debug!(entries = total, comment = contents.props.comment.is_some(), "ZIP directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut out = ByteBuffer::new();
        let mut central = ByteBuffer::new();
        let mut count = 0usize;

        for node in archive.walk() {
            let record = match node {
                TreeNode::Folder { path, .. } => PendingRecord::folder(format!("{path}/")),
                TreeNode::File { path, entry, .. } => PendingRecord::file(archive, path, entry, options)?,
            };
            record.write(&mut out, &mut central)?;
            count += 1;
        }

        if count >= u16::MAX as usize {
            return Err(Error::unsupported(format!("{count} entries needs ZIP64")));
        }

        let cd_offset = zip32(out.position(), "central directory offset")?;
        let cd_size = zip32(central.len(), "central directory size")?;
        out.write_bytes(central.as_slice())?;

        let comment = archive.props().comment.as_deref().unwrap_or_default().as_bytes();
        let comment = &comment[..comment.len().min(MAX_COMMENT)];

        out.write_u32_le(EOCD_SIGNATURE)?;
        out.write_u16_le(0)?; // disk number
        out.write_u16_le(0)?; // central directory disk
        out.write_u16_le(count as u16)?;
        out.write_u16_le(count as u16)?;
        out.write_u32_le(cd_size)?;
        out.write_u32_le(cd_offset)?;
        out.write_u16_le(comment.len() as u16)?;
        out.write_bytes(comment)?;

        Ok(out.into_vec())
    }
}

/// Checked 32-bit field; the all-ones value is reserved for ZIP64
fn zip32(value: impl TryInto<u32>, what: &str) -> Result<u32> {
    value
        .try_into()
        .ok()
        .filter(|v| *v != u32::MAX)
        .ok_or_else(|| Error::unsupported(format!("{what} needs ZIP64")))
}

fn name_flags(path: &str) -> u16 {
    if path.is_ascii() {
        0
    } else {
        FLAG_UTF8
    }
}

/// A record ready to be written: stored bytes plus header fields
struct PendingRecord<'a> {
    path: String,
    flags: u16,
    method: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    uncompressed: u64,
    stored: std::borrow::Cow<'a, [u8]>,
    external_attrs: u32,
}

impl<'a> PendingRecord<'a> {
    fn folder(path: String) -> Self {
        Self {
            flags: name_flags(&path),
            path,
            method: 0,
            mod_time: 0,
            mod_date: DEFAULT_DATE,
            crc32: 0,
            uncompressed: 0,
            stored: std::borrow::Cow::Borrowed(&[]),
            external_attrs: ATTR_DIRECTORY,
        }
    }

    fn file(archive: &'a Archive, path: String, entry: &'a ArchiveEntry, options: &WriteOptions) -> Result<Self> {
        let mod_date = if entry.props.mod_date == 0 { DEFAULT_DATE } else { entry.props.mod_date };
        let mut record = Self {
            flags: name_flags(&path),
            path,
            method: 0,
            mod_time: entry.props.mod_time,
            mod_date,
            crc32: 0,
            uncompressed: 0,
            stored: std::borrow::Cow::Borrowed(&[]),
            external_attrs: 0,
        };

        // unmodified entries keep their stored bytes and method
        if let (false, Some(method)) = (entry.modified, entry.props.raw_method) {
            record.method = method;
            record.flags |= entry.props.raw_flags & PASSTHROUGH_FLAGS;
            record.crc32 = entry.props.crc32.unwrap_or(0);
            record.uncompressed = entry.props.full_size;
            record.stored = std::borrow::Cow::Borrowed(archive.raw_bytes(entry)?);
            return Ok(record);
        }

        let data = archive.payload(entry)?;
        record.crc32 = crc32(&data);
        record.uncompressed = data.len() as u64;

        let method = match entry.props.raw_method.map(CompressionMethod::from) {
            Some(CompressionMethod::Store) => CompressionMethod::Store,
            Some(known @ (CompressionMethod::Bzip2 | CompressionMethod::Zstd)) => known,
            _ => CompressionMethod::Deflate,
        };

        let compressed = match method.codec() {
            Some(codec) if !data.is_empty() => match compression::deflate(codec, &data, options.compression_level) {
                Ok(packed) if packed.len() < data.len() => Some((method, packed)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(entry = %record.path, error = %e, "compression failed, storing");
                    None
                }
            },
            _ => None,
        };

        match compressed {
            Some((method, packed)) => {
                record.method = method.code();
                record.stored = std::borrow::Cow::Owned(packed);
            }
            None => {
                record.method = CompressionMethod::Store.code();
                record.stored = data;
            }
        }
        Ok(record)
    }

    fn write(&self, out: &mut ByteBuffer, central: &mut ByteBuffer) -> Result<()> {
        let name = self.path.as_bytes();
        let name_len = u16::try_from(name.len())
            .map_err(|_| Error::invalid_operation(format!("path '{}' is too long", self.path)))?;
        let flags = self.flags;
        let version = CompressionMethod::from(self.method).version_needed();
        let local_offset = zip32(out.position(), "local header offset")?;
        let compressed = zip32(self.stored.len(), "compressed size")?;
        let uncompressed = zip32(self.uncompressed, "uncompressed size")?;

        out.write_u32_le(LOCAL_HEADER_SIGNATURE)?;
        out.write_u16_le(version)?;
        out.write_u16_le(flags)?;
        out.write_u16_le(self.method)?;
        out.write_u16_le(self.mod_time)?;
        out.write_u16_le(self.mod_date)?;
        out.write_u32_le(self.crc32)?;
        out.write_u32_le(compressed)?;
        out.write_u32_le(uncompressed)?;
        out.write_u16_le(name_len)?;
        out.write_u16_le(0)?; // extra length
        out.write_bytes(name)?;
        out.write_bytes(&self.stored)?;

        central.write_u32_le(CD_SIGNATURE)?;
        central.write_u16_le(20)?; // version made by: MS-DOS, 2.0
        central.write_u16_le(version)?;
        central.write_u16_le(flags)?;
        central.write_u16_le(self.method)?;
        central.write_u16_le(self.mod_time)?;
        central.write_u16_le(self.mod_date)?;
        central.write_u32_le(self.crc32)?;
        central.write_u32_le(compressed)?;
        central.write_u32_le(uncompressed)?;
        central.write_u16_le(name_len)?;
        central.write_u16_le(0)?; // extra length
        central.write_u16_le(0)?; // comment length
        central.write_u16_le(0)?; // disk number
        central.write_u16_le(0)?; // internal attributes
        central.write_u32_le(self.external_attrs)?;
        central.write_u32_le(local_offset)?;
        central.write_bytes(name)?;
        Ok(())
    }
}
