//! Quake PAK
//!
//! ```text
//! 0   "PACK"
//! 4   i32   directory offset
//! 8   i32   directory size (multiple of 64)
//! dir 64-byte records { name[56], i32 offset, i32 size }
//! ```
//!
//! Names are full `/`-separated paths; the tree is rebuilt from them.
//! Empty directories cannot be represented.

use bytes::Bytes;
use wadforge_core::buffer::{fixed_string, read};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use super::entry::split_path;
use super::{check_span, field_i32, index_progress, Archive, ArchiveContents, ArchiveEntry, TreeNode};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 64;
const NAME_FIELD: usize = 56;
/// Longest path, leaving room for the terminating NUL
const MAX_PATH: usize = NAME_FIELD - 1;

fn directory_span(data: &[u8]) -> Result<(usize, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::truncated(0, HEADER_LEN, data.len()));
    }
    if !read::magic_at(data, 0, b"PACK") {
        return Err(Error::malformed("not a PAK: missing PACK magic"));
    }
    let offset = read::i32_le(data, 4).unwrap_or(-1);
    let size = read::i32_le(data, 8).unwrap_or(-1);
    if offset < 0 || size < 0 {
        return Err(Error::malformed(format!(
            "negative directory offset ({offset}) or size ({size})"
        )));
    }
    let (offset, size) = (offset as usize, size as usize);
    if size % RECORD_LEN != 0 {
        return Err(Error::malformed(format!(
            "directory size {size} is not a multiple of {RECORD_LEN}"
        )));
    }
    if offset + size > data.len() {
        return Err(Error::out_of_bounds(offset + size, data.len()).with_context("PAK directory"));
    }
    Ok((offset, size / RECORD_LEN))
}

/// Quake PAK container
#[derive(Debug, Default, Clone, Copy)]
pub struct PakFormat;

impl Detect for PakFormat {
    fn id(&self) -> &str {
        "pak"
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        HEADER_LEN
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if !read::magic_at(data, 0, b"PACK") || data.len() < HEADER_LEN {
            return Confidence::NoMatch;
        }
        match directory_span(data) {
            Ok(_) => Confidence::Certain,
            Err(_) => Confidence::Unlikely,
        }
    }
}

impl ArchiveFormat for PakFormat {
    fn name(&self) -> &str {
        "Quake PAK"
    }

    fn extensions(&self) -> &[&str] {
        &["pak"]
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            directories: true,
            max_name_len: Some(MAX_PATH),
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
        let (dir_offset, count) = directory_span(source)?;
        let mut contents = ArchiveContents::default();

        for i in 0..count {
            let record = dir_offset + i * RECORD_LEN;
            let path = fixed_string(&source[record..record + NAME_FIELD]);
            let offset = read::i32_le(source, record + NAME_FIELD).unwrap_or(-1);
            let size = read::i32_le(source, record + NAME_FIELD + 4).unwrap_or(-1);
            if offset < 0 || size < 0 {
                return Err(Error::malformed(format!(
                    "'{path}' has negative offset ({offset}) or size ({size})"
                )));
            }
            check_span(source.len(), offset as u64, size as u64, &path)?;
            index_progress(progress, i, count, &path);

            let (dirs, name) = split_path(&path);
            let Some(name) = name else {
                tracing::warn!(record = i, "skipping PAK record with an empty name");
                continue;
            };
            let ids = contents.root.ensure_dirs(dirs);
            if let Some(dir) = contents.root.descend_mut(&ids) {
                dir.entries.push(ArchiveEntry::on_disk(name, offset as u64, size as u64));
            }
        }

        tracing::debug!(files = count, "PAK directory read");
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, _options: &WriteOptions) -> Result<Vec<u8>> {
        let mut out = ByteBuffer::new();
        out.write_bytes(b"PACK")?;
        out.write_zeros(8)?; // directory offset and size, patched below

        let mut records = Vec::new();
        for node in archive.walk() {
            let TreeNode::File { path, entry, .. } = node else {
                continue;
            };
            if path.len() > MAX_PATH {
                return Err(Error::invalid_operation(format!(
                    "path '{path}' is longer than {MAX_PATH} bytes"
                )));
            }
            let data = archive.payload(entry)?;
            records.push((path, out.position(), data.len()));
            out.write_bytes(&data)?;
        }

        let dir_offset = out.position();
        for (path, offset, size) in &records {
            out.write_fixed_string(path, NAME_FIELD)?;
            out.write_i32_le(field_i32(*offset, "file offset")?)?;
            out.write_i32_le(field_i32(*size, "file size")?)?;
        }
        out.patch_i32_le(4, field_i32(dir_offset, "directory offset")?)?;
        out.patch_i32_le(8, field_i32(records.len() * RECORD_LEN, "directory size")?)?;

        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::test_support::{build, listing, open};

    fn format() -> Arc<dyn ArchiveFormat> {
        Arc::new(PakFormat)
    }

    #[test]
    fn test_tree_from_paths() {
        let bytes = build(
            format(),
            &[
                ("default.cfg", b"bind w +forward"),
                ("maps/e1m1.bsp", &[1; 40]),
                ("progs/player.mdl", b"IDPO"),
            ],
        );
        assert_eq!(read::i32_le(&bytes, 8), Some(3 * RECORD_LEN as i32));

        let archive = open(format(), bytes);
        assert_eq!(
            listing(&archive),
            vec![
                ("default.cfg".to_string(), 15),
                ("maps".to_string(), 0),
                ("maps/e1m1.bsp".to_string(), 40),
                ("progs".to_string(), 0),
                ("progs/player.mdl".to_string(), 4),
            ]
        );
        assert_eq!(&archive.entry_data("progs/player.mdl").unwrap()[..], b"IDPO");
    }

    #[test]
    fn test_rewrite_is_stable() {
        let first = open(format(), build(format(), &[("a/b/c.txt", b"c"), ("d.txt", b"dd")]));
        let bytes = first.write(&WriteOptions::default()).unwrap();
        let second = open(format(), bytes.clone());
        assert_eq!(listing(&first), listing(&second));
        assert_eq!(second.write(&WriteOptions::default()).unwrap(), bytes);
    }

    #[test]
    fn test_long_path_rejected_on_write() {
        let mut archive = Archive::new(format());
        let deep = "d".repeat(30);
        archive.add_directory(&deep).unwrap();
        archive
            .add_entry(&deep, ArchiveEntry::new("x".repeat(30), vec![1]), None)
            .unwrap();
        let err = archive.write(&WriteOptions::default()).unwrap_err();
        assert!(matches!(err.root(), Error::InvalidOperation { .. }));
    }

    #[test]
    fn test_bad_directory_size() {
        let mut bytes = build(format(), &[("a", b"a")]);
        bytes[8..12].copy_from_slice(&65i32.to_le_bytes());
        assert_eq!(PakFormat.test(&bytes), Confidence::Unlikely);
        assert!(PakFormat
            .read_directory(&Bytes::from(bytes), &OpenOptions::default(), None)
            .is_err());
    }

    #[test]
    fn test_detection() {
        assert_eq!(PakFormat.test(&build(format(), &[])), Confidence::Certain);
        assert_eq!(PakFormat.test(b"PACK"), Confidence::NoMatch);
        assert_eq!(PakFormat.test(b"PWAD\0\0\0\0\0\0\0\0"), Confidence::NoMatch);
    }
}
