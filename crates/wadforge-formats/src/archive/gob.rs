//! Dark Forces GOB
//!
//! ```text
//! 0   "GOB\x0A"
//! 4   u32   directory offset
//! dir u32 count, then 21-byte records { u32 offset, u32 size, name[13] }
//! ```

use bytes::Bytes;
use wadforge_core::buffer::{fixed_string, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{check_span, field_u32, flat_entries, index_progress, Archive, ArchiveContents, ArchiveEntry};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const MAGIC: &[u8] = b"GOB\x0A";
const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 21;
const NAME_FIELD: usize = 13;
const MAX_NAME: usize = NAME_FIELD - 1;

/// Directory offset and record count, validated against `data`
fn directory(data: &[u8]) -> Result<(usize, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    if !read::magic_at(data, 0, MAGIC) {
        return Err(Error::malformed("not a GOB: missing GOB\\x0A magic"));
    }
    let dir_offset = read::u32_le(data, 4).unwrap_or(u32::MAX) as usize;
    let count = read::u32_le(data, dir_offset)
        .ok_or_else(|| Error::out_of_bounds(dir_offset, data.len()).with_context("GOB directory"))?
        as usize;
    let dir_end = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| len.checked_add(dir_offset + 4))
        .unwrap_or(usize::MAX);
    if dir_end > data.len() {
        return Err(Error::out_of_bounds(dir_end, data.len()).with_context("GOB directory"));
    }
    Ok((dir_offset + 4, count))
}

/// Dark Forces GOB container
#[derive(Debug, Default, Clone, Copy)]
pub struct GobFormat;

impl Detect for GobFormat {
    fn id(&self) -> &str {
        "gob"
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
        match directory(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ArchiveFormat for GobFormat {
    fn name(&self) -> &str {
        "Dark Forces GOB"
    }

    fn extensions(&self) -> &[&str] {
        &["gob"]
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
        let (records, count) = directory(source)?;
        let mut contents = ArchiveContents::default();
        contents.root.entries.reserve(count);

        for i in 0..count {
            let record = records + i * RECORD_LEN;
            let offset = u64::from(read::u32_le(source, record).unwrap_or(0));
            let size = u64::from(read::u32_le(source, record + 4).unwrap_or(0));
            let name = fixed_string(&source[record + 8..record + RECORD_LEN]);

            check_span(source.len(), offset, size, &name)?;
            index_progress(progress, i, count, &name);
            contents.root.entries.push(ArchiveEntry::on_disk(name, offset, size));
        }

        tracing::debug!(files = count, "GOB directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, _options: &WriteOptions) -> Result<Vec<u8>> {
        let entries = flat_entries(archive)?;

        let mut out = ByteBuffer::new();
        out.write_bytes(MAGIC)?;
        out.write_u32_le(0)?; // directory offset, patched below

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.name.len() > MAX_NAME {
                return Err(Error::invalid_operation(format!(
                    "name '{}' is longer than {MAX_NAME} bytes",
                    entry.name
                )));
            }
            let data = archive.payload(entry)?;
            records.push((out.position(), data.len(), entry.name.as_str()));
            out.write_bytes(&data)?;
        }

        let dir_offset = out.position();
        out.write_u32_le(field_u32(records.len(), "file count")?)?;
        for (offset, size, name) in records {
            out.write_u32_le(field_u32(offset, "file offset")?)?;
            out.write_u32_le(field_u32(size, "file size")?)?;
            out.write_fixed_string(name, NAME_FIELD)?;
        }
        out.patch_u32_le(4, field_u32(dir_offset, "directory offset")?)?;

        Ok(out.into_vec())
    }
}
