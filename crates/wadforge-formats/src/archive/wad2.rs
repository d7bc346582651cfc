//! Quake / Half-Life texture WADs (`WAD2` / `WAD3`)
//!
//! ```text
//! 0   "WAD2" | "WAD3"
//! 4   i32   lump count
//! 8   i32   directory offset
//! dir 32-byte records {
//!       i32 offset, i32 disk size, i32 size,
//!       u8 type, u8 compression, u16 padding, name[16]
//!     }
//! ```
//!
//! No known tool writes compressed lumps; a non-zero compression byte is
//! kept verbatim and the payload returned undecoded.

use bytes::Bytes;
use wadforge_core::buffer::{fixed_string, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{
    check_span, field_i32, flat_entries, index_progress, Archive, ArchiveContents, ArchiveEntry, ArchiveProps,
    EntryProps,
};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 32;
const NAME_FIELD: usize = 16;
const MAX_NAME: usize = NAME_FIELD - 1;

/// Common lump type bytes
pub mod lump_type {
    pub const PALETTE: u8 = 0x40;
    pub const QTEX: u8 = 0x41;
    pub const QPIC: u8 = 0x42;
    pub const SOUND: u8 = 0x43;
    pub const MIPTEX: u8 = 0x44;
    /// Half-Life (WAD3) mip texture
    pub const MIPTEX_HL: u8 = 0x43;
}

fn parse_header(data: &[u8]) -> Result<(String, usize, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    let magic = &data[..4];
    if magic != b"WAD2" && magic != b"WAD3" {
        return Err(Error::malformed(format!("not a WAD2/WAD3: magic {magic:02x?}")));
    }
    let count = read::i32_le(data, 4).unwrap_or(-1);
    let dir_offset = read::i32_le(data, 8).unwrap_or(-1);
    if count < 0 || dir_offset < 0 {
        return Err(Error::malformed(format!(
            "negative lump count ({count}) or directory offset ({dir_offset})"
        )));
    }
    let (count, dir_offset) = (count as usize, dir_offset as usize);
    let dir_end = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| len.checked_add(dir_offset))
        .unwrap_or(usize::MAX);
    if dir_end > data.len() {
        return Err(Error::out_of_bounds(dir_end, data.len()).with_context("WAD2 directory"));
    }
    Ok((String::from_utf8_lossy(magic).into_owned(), count, dir_offset))
}

/// Quake WAD2 / Half-Life WAD3 container
#[derive(Debug, Default, Clone, Copy)]
pub struct Wad2Format;

impl Detect for Wad2Format {
    fn id(&self) -> &str {
        "wad2"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        HEADER_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < HEADER_LEN || !(read::magic_at(data, 0, b"WAD2") || read::magic_at(data, 0, b"WAD3")) {
            return Confidence::NoMatch;
        }
        match parse_header(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ArchiveFormat for Wad2Format {
    fn name(&self) -> &str {
        "Quake WAD2/WAD3"
    }

    fn extensions(&self) -> &[&str] {
        &["wad"]
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            directories: false,
            max_name_len: Some(MAX_NAME),
            compresses: false,
            single_entry: false,
        }
    }

    fn read_directory(
        &self,
        source: &Bytes,
        _options: &OpenOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<ArchiveContents> {
        let (variant, count, dir_offset) = parse_header(source)?;
        let mut contents = ArchiveContents {
            props: ArchiveProps {
                variant: Some(variant),
                ..ArchiveProps::default()
            },
            ..ArchiveContents::default()
        };
        contents.root.entries.reserve(count);

        for i in 0..count {
            let record = dir_offset + i * RECORD_LEN;
            let offset = read::i32_le(source, record).unwrap_or(-1);
            let disk_size = read::i32_le(source, record + 4).unwrap_or(-1);
            let size = read::i32_le(source, record + 8).unwrap_or(-1);
            let kind = source[record + 12];
            let method = source[record + 13];
            let name = fixed_string(&source[record + 16..record + RECORD_LEN]);

            if offset < 0 || disk_size < 0 || size < 0 {
                return Err(Error::malformed(format!("lump {i} '{name}' has a negative field")));
            }
            check_span(source.len(), offset as u64, disk_size as u64, &name)?;
            index_progress(progress, i, count, &name);

            if method != 0 {
                tracing::warn!(lump = %name, method, "compressed WAD2 lump kept undecoded");
            }

            let props = EntryProps {
                full_size: size as u64,
                lump_type: Some(kind),
                raw_method: Some(u16::from(method)),
                ..EntryProps::default()
            };
            contents
                .root
                .entries
                .push(ArchiveEntry::on_disk(name, offset as u64, disk_size as u64).with_props(props));
        }

        tracing::debug!(lumps = count, "WAD2 directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, _options: &WriteOptions) -> Result<Vec<u8>> {
        let entries = flat_entries(archive)?;
        let magic = match archive.props().variant.as_deref() {
            Some("WAD3") => b"WAD3",
            _ => b"WAD2",
        };

        let mut out = ByteBuffer::new();
        out.write_bytes(magic)?;
        out.write_i32_le(field_i32(entries.len(), "lump count")?)?;
        out.write_i32_le(0)?; // directory offset, patched below

        struct Record<'a> {
            offset: usize,
            disk_size: usize,
            size: u64,
            kind: u8,
            method: u8,
            name: &'a str,
        }

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.name.len() > MAX_NAME {
                return Err(Error::invalid_operation(format!(
                    "lump name '{}' is longer than {MAX_NAME} bytes",
                    entry.name
                )));
            }
            let kind = entry.props.lump_type.unwrap_or(0);
            let method = entry.props.raw_method.unwrap_or(0);
            let offset = out.position();

            // compressed lumps can only be carried over untouched
            let record = if !entry.modified && method != 0 {
                let raw = archive.raw_bytes(entry)?;
                out.write_bytes(raw)?;
                Record {
                    offset,
                    disk_size: raw.len(),
                    size: entry.props.full_size,
                    kind,
                    method: u8::try_from(method).unwrap_or(0),
                    name: &entry.name,
                }
            } else {
                let data = archive.payload(entry)?;
                out.write_bytes(&data)?;
                Record {
                    offset,
                    disk_size: data.len(),
                    size: data.len() as u64,
                    kind,
                    method: 0,
                    name: &entry.name,
                }
            };
            records.push(record);
        }

        let dir_offset = out.position();
        for record in &records {
            out.write_i32_le(field_i32(record.offset, "lump offset")?)?;
            out.write_i32_le(field_i32(record.disk_size, "lump size")?)?;
            out.write_i32_le(field_i32(record.size as usize, "lump size")?)?;
            out.write_u8(record.kind)?;
            out.write_u8(record.method)?;
            out.write_u16_le(0)?;
            out.write_fixed_string(record.name, NAME_FIELD)?;
        }
        out.patch_i32_le(8, field_i32(dir_offset, "directory offset")?)?;

        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::test_support::{build, listing, open};

    fn format() -> Arc<dyn ArchiveFormat> {
        Arc::new(Wad2Format)
    }

    #[test]
    fn test_round_trip_keeps_types() {
        let mut archive = Archive::new(format());
        archive.props_mut().variant = Some("WAD3".to_string());
        let mut tex = ArchiveEntry::new("+0BUTTON", vec![5; 40]);
        tex.props.lump_type = Some(lump_type::MIPTEX_HL);
        archive.add_entry("", tex, None).unwrap();
        archive.add_entry("", ArchiveEntry::new("CONCHARS", vec![1; 8]), None).unwrap();

        let bytes = archive.write(&WriteOptions::default()).unwrap();
        assert_eq!(&bytes[..4], b"WAD3");

        let reopened = open(format(), bytes.clone());
        let button = reopened.entry("+0BUTTON").unwrap();
        assert_eq!(button.props.lump_type, Some(lump_type::MIPTEX_HL));
        assert_eq!(button.props.raw_method, Some(0));
        assert_eq!(reopened.entry("CONCHARS").unwrap().props.lump_type, Some(0));
        assert_eq!(reopened.write(&WriteOptions::default()).unwrap(), bytes);
    }

    #[test]
    fn test_compressed_lump_carried_over() {
        let mut bytes = build(format(), &[("PAL", b"packed!")]);
        let dir = read::i32_le(&bytes, 8).unwrap() as usize;
        bytes[dir + 8..dir + 12].copy_from_slice(&64i32.to_le_bytes());
        bytes[dir + 13] = 1;

        let archive = open(format(), bytes);
        let pal = archive.entry("PAL").unwrap();
        assert_eq!(pal.props.raw_method, Some(1));
        assert_eq!(pal.props.full_size, 64);
        assert_eq!(&archive.entry_data("PAL").unwrap()[..], b"packed!");

        let again = open(format(), archive.write(&WriteOptions::default()).unwrap());
        let pal = again.entry("PAL").unwrap();
        assert_eq!(pal.props.raw_method, Some(1));
        assert_eq!(pal.props.full_size, 64);
        assert_eq!(pal.size_on_disk, 7);
    }

    #[test]
    fn test_name_limit() {
        let mut archive = Archive::new(format());
        assert!(archive
            .add_entry("", ArchiveEntry::new("A".repeat(16), vec![]), None)
            .is_err());
        assert!(archive
            .add_entry("", ArchiveEntry::new("A".repeat(15), vec![]), None)
            .is_ok());
    }

    #[test]
    fn test_detection() {
        let bytes = build(format(), &[("A", b"a")]);
        assert_eq!(Wad2Format.test(&bytes), Confidence::Certain);
        assert_eq!(listing(&open(format(), bytes)), vec![("A".to_string(), 1)]);
        assert_eq!(Wad2Format.test(b"WAD2\xff\xff\xff\xff\0\0\0\0"), Confidence::Unlikely);
        assert_eq!(Wad2Format.test(b"PWAD\0\0\0\0\0\0\0\0"), Confidence::NoMatch);
    }
}
