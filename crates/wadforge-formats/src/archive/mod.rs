//! Container archives
//!
//! Every container layout parses into the same owned tree of
//! [`ArchiveDirectory`] / [`ArchiveEntry`] values held by an [`Archive`].
//! Formats only read and write directories; payload loading, lookup and
//! mutation are shared.
//!
//! # Supported layouts
//!
//! | id     | Magic            | Tree              |
//! |--------|------------------|-------------------|
//! | `wad`  | `IWAD` / `PWAD`  | flat, 8-char names |
//! | `zip`  | `PK\x03\x04`     | directories        |
//! | `pak`  | `PACK`           | directories        |
//! | `grp`  | `KenSilverman`   | flat, 12-char names |
//! | `wad2` | `WAD2` / `WAD3`  | flat, 15-char names |
//! | `gob`  | `GOB\x0A`        | flat, 12-char names |
//! | `gzip` / `bz2` / `xz` | stream magic | one entry |

mod entry;
mod gob;
mod grp;
mod model;
mod pak;
mod stream;
mod wad;
mod wad2;
mod zip;

pub use entry::{ArchiveDirectory, ArchiveEntry, EntryId, EntryProps, TreeNode};
pub use gob::GobFormat;
pub use grp::GrpFormat;
pub use model::{Archive, ArchiveStatistics};
pub use pak::PakFormat;
pub use stream::{StreamFormat, StreamKind};
pub use wad::WadFormat;
pub use wad2::Wad2Format;
pub use zip::{CompressionMethod, ZipFormat};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wadforge_core::{Error, Result};

use crate::traits::{report, ArchiveFormat, FormatCapabilities, OpenPhase, ProgressCallback};

/// Archive-level properties recorded by the reader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProps {
    /// Header variant, e.g. `IWAD`/`PWAD` or `WAD2`/`WAD3`
    pub variant: Option<String>,
    /// Archive comment (ZIP)
    pub comment: Option<String>,
    /// Stream timestamp (gzip MTIME)
    pub timestamp: Option<u32>,
}

/// What a format reader produces
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    /// Root of the entry tree
    pub root: ArchiveDirectory,
    /// Archive-level properties
    pub props: ArchiveProps,
}

/// The built-in container formats in registration order
pub fn builtin_formats() -> Vec<Arc<dyn ArchiveFormat>> {
    vec![
        Arc::new(WadFormat),
        Arc::new(ZipFormat),
        Arc::new(PakFormat),
        Arc::new(GrpFormat),
        Arc::new(Wad2Format),
        Arc::new(GobFormat),
        Arc::new(StreamFormat::new(StreamKind::Gzip)),
        Arc::new(StreamFormat::new(StreamKind::Bzip2)),
        Arc::new(StreamFormat::new(StreamKind::Xz)),
    ]
}

/// Fail unless `size` bytes at `offset` lie inside a `len`-byte source
///
/// Zero-size records are exempt; markers often carry arbitrary offsets.
pub(crate) fn check_span(len: usize, offset: u64, size: u64, name: &str) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    match offset.checked_add(size) {
        Some(end) if end <= len as u64 => Ok(()),
        _ => Err(Error::out_of_bounds(
            usize::try_from(offset.saturating_add(size)).unwrap_or(usize::MAX),
            len,
        )
        .with_context(format!("entry '{name}'"))),
    }
}

/// Validate an entry name against a layout's limits
pub(crate) fn check_name(caps: FormatCapabilities, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::invalid_operation(format!("invalid entry name '{name}'")));
    }
    if let Some(max) = caps.max_name_len {
        if name.len() > max {
            return Err(Error::invalid_operation(format!(
                "name '{name}' is longer than {max} bytes"
            )));
        }
    }
    Ok(())
}

/// Root entries of an archive whose layout has no directories
pub(crate) fn flat_entries(archive: &Archive) -> Result<&[ArchiveEntry]> {
    if !archive.root().dirs.is_empty() {
        return Err(Error::invalid_operation(format!(
            "{} archives cannot hold directories",
            archive.format().name()
        )));
    }
    Ok(&archive.root().entries)
}

/// Convert a size or offset to a 32-bit directory field
pub(crate) fn field_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::unsupported(format!("{what} {value} does not fit in 32 bits")))
}

/// Convert a size or offset to a signed 32-bit directory field
pub(crate) fn field_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::unsupported(format!("{what} {value} does not fit in 31 bits")))
}

/// Report directory indexing progress every 1000 records
pub(crate) fn index_progress(progress: Option<&ProgressCallback>, index: usize, total: usize, name: &str) {
    if index % 1000 == 0 {
        report(progress, OpenPhase::Indexing, index as u64, Some(total as u64), Some(name));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;

    use super::*;
    use crate::traits::{OpenOptions, WriteOptions};

    /// Open `bytes` with `format`, lazily
    pub fn open(format: Arc<dyn ArchiveFormat>, bytes: Vec<u8>) -> Archive {
        Archive::open(format, Bytes::from(bytes), OpenOptions::default(), None).unwrap()
    }

    /// Build an archive from scratch and serialize it
    pub fn build(format: Arc<dyn ArchiveFormat>, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut archive = Archive::new(format);
        for (path, data) in entries {
            let (dirs, name) = super::entry::split_path(path);
            let dir = dirs.join("/");
            if !dir.is_empty() {
                archive.add_directory(&dir).unwrap();
            }
            archive
                .add_entry(&dir, ArchiveEntry::new(name.unwrap(), data.to_vec()), None)
                .unwrap();
        }
        archive.write(&WriteOptions::default()).unwrap()
    }

    /// (path, size) pairs in walk order
    pub fn listing(archive: &Archive) -> Vec<(String, u64)> {
        archive
            .walk()
            .iter()
            .map(|node| (node.path().to_string(), node.size()))
            .collect()
    }
}
