//! Build engine GRP
//!
//! ```text
//! 0   "KenSilverman"
//! 12  u32   file count
//! 16  16-byte records { name[12], u32 size }
//! ..  file data, contiguous and in record order
//! ```

use bytes::Bytes;
use wadforge_core::buffer::{fixed_string, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::{check_span, field_u32, flat_entries, index_progress, Archive, ArchiveContents, ArchiveEntry};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const MAGIC: &[u8; 12] = b"KenSilverman";
const HEADER_LEN: usize = 16;
const RECORD_LEN: usize = 16;
const NAME_LEN: usize = 12;

fn file_count(data: &[u8]) -> Result<usize> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    if !read::magic_at(data, 0, MAGIC) {
        return Err(Error::malformed("not a GRP: missing KenSilverman magic"));
    }
    let count = read::u32_le(data, 12).unwrap_or(0) as usize;
    let dir_end = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| len.checked_add(HEADER_LEN))
        .unwrap_or(usize::MAX);
    if dir_end > data.len() {
        return Err(Error::out_of_bounds(dir_end, data.len()).with_context("GRP directory"));
    }
    Ok(count)
}

/// Build engine GRP container
#[derive(Debug, Default, Clone, Copy)]
pub struct GrpFormat;

impl Detect for GrpFormat {
    fn id(&self) -> &str {
        "grp"
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
        match file_count(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ArchiveFormat for GrpFormat {
    fn name(&self) -> &str {
        "Build GRP"
    }

    fn extensions(&self) -> &[&str] {
        &["grp"]
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
        let count = file_count(source)?;
        let mut contents = ArchiveContents::default();
        contents.root.entries.reserve(count);

        // data follows the directory with no gaps
        let mut offset = (HEADER_LEN + count * RECORD_LEN) as u64;
        for i in 0..count {
            let record = HEADER_LEN + i * RECORD_LEN;
            let name = fixed_string(&source[record..record + NAME_LEN]);
            let size = u64::from(read::u32_le(source, record + NAME_LEN).unwrap_or(0));

            check_span(source.len(), offset, size, &name)?;
            index_progress(progress, i, count, &name);

            contents.root.entries.push(ArchiveEntry::on_disk(name, offset, size));
            offset += size;
        }

        tracing::debug!(files = count, "GRP directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, _options: &WriteOptions) -> Result<Vec<u8>> {
        let entries = flat_entries(archive)?;
        let mut payloads = Vec::with_capacity(entries.len());

        let mut out = ByteBuffer::with_capacity(HEADER_LEN + entries.len() * RECORD_LEN);
        out.write_bytes(MAGIC)?;
        out.write_u32_le(field_u32(entries.len(), "file count")?)?;

        for entry in entries {
            if entry.name.len() > NAME_LEN {
                return Err(Error::invalid_operation(format!(
                    "name '{}' is longer than {NAME_LEN} bytes",
                    entry.name
                )));
            }
            let data = archive.payload(entry)?;
            out.write_fixed_string(&entry.name, NAME_LEN)?;
            out.write_u32_le(field_u32(data.len(), "file size")?)?;
            payloads.push(data);
        }
        for data in payloads {
            out.write_bytes(&data)?;
        }

        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::test_support::{build, listing, open};

    fn format() -> Arc<dyn ArchiveFormat> {
        Arc::new(GrpFormat)
    }

    #[test]
    fn test_layout_and_offsets() {
        let bytes = build(format(), &[("TILES000.ART", b"art"), ("GAME.CON", b"define")]);
        assert_eq!(&bytes[..12], MAGIC);
        assert_eq!(read::u32_le(&bytes, 12), Some(2));
        assert_eq!(bytes.len(), HEADER_LEN + 2 * RECORD_LEN + 3 + 6);

        let archive = open(format(), bytes);
        let con = archive.entry("GAME.CON").unwrap();
        assert_eq!(con.offset_on_disk, (HEADER_LEN + 2 * RECORD_LEN + 3) as u64);
        assert_eq!(&archive.entry_data("game.con").unwrap()[..], b"define");
    }

    #[test]
    fn test_round_trip() {
        let first = open(format(), build(format(), &[("A.MAP", &[0; 100]), ("B.VOC", b""), ("C.MID", b"MThd")]));
        let bytes = first.write(&WriteOptions::default()).unwrap();
        assert_eq!(listing(&first), listing(&open(format(), bytes)));
    }

    #[test]
    fn test_truncated_data_fails() {
        let mut bytes = build(format(), &[("A.MAP", &[0; 10])]);
        bytes.truncate(bytes.len() - 1);
        let err = GrpFormat
            .read_directory(&Bytes::from(bytes), &OpenOptions::default(), None)
            .unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_detection() {
        let bytes = build(format(), &[("A", b"a")]);
        assert_eq!(GrpFormat.test(&bytes), Confidence::Certain);
        let mut lying = bytes.clone();
        lying[12..16].copy_from_slice(&1000u32.to_le_bytes());
        assert_eq!(GrpFormat.test(&lying), Confidence::Unlikely);
        assert_eq!(GrpFormat.test(b"KenSilverman"), Confidence::NoMatch);
    }
}
