//! Doom WAD (`IWAD` / `PWAD`)
//!
//! ```text
//! 0   magic      "IWAD" | "PWAD"
//! 4   i32        lump count
//! 8   i32        directory offset
//! ..  lump data
//! dir 16-byte records { i32 offset, i32 size, name[8] }
//! ```

use bytes::Bytes;
use wadforge_core::buffer::{fixed_string, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{check_span, field_i32, flat_entries, index_progress, Archive, ArchiveContents, ArchiveEntry, ArchiveProps};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 16;
const NAME_LEN: usize = 8;

/// Header fields with the directory location validated
struct WadHeader {
    variant: String,
    count: usize,
    dir_offset: usize,
}

fn parse_header(data: &[u8]) -> Result<WadHeader> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    let magic = &data[..4];
    if magic != b"IWAD" && magic != b"PWAD" {
        return Err(Error::malformed(format!("not a WAD: magic {magic:02x?}")));
    }
    let (Some(count), Some(dir_offset)) = (read::i32_le(data, 4), read::i32_le(data, 8)) else {
        return Err(Error::truncated(4, 8, data.len() - 4));
    };
    if count < 0 || dir_offset < 0 {
        return Err(Error::malformed(format!(
            "negative lump count ({count}) or directory offset ({dir_offset})"
        )));
    }

    let count = count as usize;
    let dir_offset = dir_offset as usize;
    let dir_end = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| len.checked_add(dir_offset))
        .ok_or_else(|| Error::malformed(format!("lump count {count} overflows")))?;
    if dir_end > data.len() {
        return Err(Error::out_of_bounds(dir_end, data.len()).with_context("WAD directory"));
    }

    Ok(WadHeader {
        variant: String::from_utf8_lossy(magic).into_owned(),
        count,
        dir_offset,
    })
}

/// Doom WAD container
#[derive(Debug, Default, Clone, Copy)]
pub struct WadFormat;

impl Detect for WadFormat {
    fn id(&self) -> &str {
        "wad"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        HEADER_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < HEADER_LEN || !(read::magic_at(data, 0, b"IWAD") || read::magic_at(data, 0, b"PWAD")) {
            return Confidence::NoMatch;
        }
        match parse_header(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ArchiveFormat for WadFormat {
    fn name(&self) -> &str {
        "Doom WAD"
    }

    fn extensions(&self) -> &[&str] {
        &["wad", "iwad", "pwad"]
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            directories: false,
            max_name_len: Some(NAME_LEN),
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
        let header = parse_header(source)?;
        let mut contents = ArchiveContents {
            props: ArchiveProps {
                variant: Some(header.variant),
                ..ArchiveProps::default()
            },
            ..ArchiveContents::default()
        };
        contents.root.entries.reserve(header.count);

        for i in 0..header.count {
            let record = header.dir_offset + i * RECORD_LEN;
            let offset = read::i32_le(source, record).unwrap_or(-1);
            let size = read::i32_le(source, record + 4).unwrap_or(-1);
            let name = fixed_string(&source[record + 8..record + RECORD_LEN]);

            if offset < 0 || size < 0 {
                return Err(Error::malformed(format!(
                    "lump {i} '{name}' has negative offset ({offset}) or size ({size})"
                )));
            }
            check_span(source.len(), offset as u64, size as u64, &name)?;
            index_progress(progress, i, header.count, &name);

            contents
                .root
                .entries
                .push(ArchiveEntry::on_disk(name, offset as u64, size as u64));
        }

        tracing::debug!(lumps = header.count, "WAD directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, _options: &WriteOptions) -> Result<Vec<u8>> {
        let entries = flat_entries(archive)?;
        let magic = match archive.props().variant.as_deref() {
            Some("IWAD") => b"IWAD",
            _ => b"PWAD",
        };

        let mut out = ByteBuffer::with_capacity(HEADER_LEN + entries.len() * RECORD_LEN);
        out.write_bytes(magic)?;
        out.write_i32_le(field_i32(entries.len(), "lump count")?)?;
        out.write_i32_le(0)?; // directory offset, patched below

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.name.len() > NAME_LEN {
                return Err(Error::invalid_operation(format!(
                    "lump name '{}' is longer than {NAME_LEN} bytes",
                    entry.name
                )));
            }
            let data = archive.payload(entry)?;
            records.push((out.position(), data.len(), entry.name.as_str()));
            out.write_bytes(&data)?;
        }

        let dir_offset = out.position();
        for (offset, size, name) in records {
            out.write_i32_le(field_i32(offset, "lump offset")?)?;
            out.write_i32_le(field_i32(size, "lump size")?)?;
            out.write_fixed_string(name, NAME_LEN)?;
        }
        out.patch_i32_le(8, field_i32(dir_offset, "directory offset")?)?;

        Ok(out.into_vec())
    }
}
