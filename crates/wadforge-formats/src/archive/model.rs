//! The opened archive: entry tree, payload loading and mutation

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;
use wadforge_core::buffer::range_checked;
use wadforge_core::{Error, Result, ResultExt};

use super::entry::{split_path, walk_into};
use super::{check_name, ArchiveContents, ArchiveDirectory, ArchiveEntry, ArchiveProps, EntryId, TreeNode};
use crate::compression::{self, crc32, verify_crc32};
use crate::logging;
use crate::traits::{
    report, ArchiveFormat, FormatCapabilities, LoadMode, OpenOptions, OpenPhase, ProgressCallback,
    WriteOptions,
};

/// An open container
///
/// Created by [`Archive::open`] (or empty by [`Archive::new`]), consumed by
/// [`Archive::close`]. Opening is all-or-nothing: a directory that fails
/// validation yields an error and no archive.
pub struct Archive {
    format: Arc<dyn ArchiveFormat>,
    root: ArchiveDirectory,
    source: Bytes,
    props: ArchiveProps,
    options: OpenOptions,
    modified: bool,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.format.id())
            .field("entries", &self.root.entry_count())
            .field("source_len", &self.source.len())
            .field("modified", &self.is_modified())
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// An empty, unsaved archive of `format`
    pub fn new(format: Arc<dyn ArchiveFormat>) -> Self {
        Self {
            format,
            root: ArchiveDirectory::default(),
            source: Bytes::new(),
            props: ArchiveProps::default(),
            options: OpenOptions::default(),
            modified: false,
        }
    }

    /// Parse `source` as `format`
    pub fn open(
        format: Arc<dyn ArchiveFormat>,
        source: Bytes,
        options: OpenOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<Self> {
        let id = format.id().to_string();
        logging::instrument_open(&id, source.len(), || -> Result<Self> {
            report(progress, OpenPhase::ReadingHeader, 0, None, None);

            let ArchiveContents { root, props } = format
                .read_directory(&source, &options, progress)
                .with_context(|| format!("opening {id} archive"))?;

            let mut archive = Self {
                format: Arc::clone(&format),
                root,
                source,
                props,
                options,
                modified: false,
            };

            if archive.options.load_mode == LoadMode::Eager {
                archive.load_all(progress)?;
            }

            let total = archive.entry_count() as u64;
            report(progress, OpenPhase::Complete, total, Some(total), None);
            crate::log_open_complete!(id, total);
            Ok(archive)
        })
    }

    fn load_all(&mut self, progress: Option<&ProgressCallback>) -> Result<()> {
        let total = self.root.entry_count() as u64;
        let source = self.source.clone();
        let options = self.options.clone();
        let mut done = 0u64;
        let mut failure: Option<Error> = None;
        let span = logging::progress_span("load_entries", total as usize);
        let _guard = span.enter();

        self.root.for_each_entry_mut(&mut |entry| {
            if failure.is_some() || entry.loaded {
                return;
            }
            match read_payload(&source, entry, &options) {
                Ok(data) => entry.set_data(data),
                Err(e) => failure = Some(e.with_context(format!("loading '{}'", entry.name))),
            }
            done += 1;
            logging::log_progress(done as usize, total as usize);
            if done % 1000 == 0 {
                report(progress, OpenPhase::Loading, done, Some(total), Some(entry.name.as_str()));
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ==================== Accessors ====================

    /// Container format
    pub fn format(&self) -> &Arc<dyn ArchiveFormat> {
        &self.format
    }

    /// Layout limits of the container format
    pub fn capabilities(&self) -> FormatCapabilities {
        self.format.capabilities()
    }

    /// Root directory
    pub fn root(&self) -> &ArchiveDirectory {
        &self.root
    }

    /// Archive-level properties
    pub fn props(&self) -> &ArchiveProps {
        &self.props
    }

    /// Mutable archive-level properties
    pub fn props_mut(&mut self) -> &mut ArchiveProps {
        self.modified = true;
        &mut self.props
    }

    /// Options the archive was opened with
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Bytes the archive was opened from
    pub fn source(&self) -> &Bytes {
        &self.source
    }

    /// Whether anything changed since open
    pub fn is_modified(&self) -> bool {
        self.modified || self.root.any_modified()
    }

    /// Number of entries (folders not counted)
    pub fn entry_count(&self) -> usize {
        self.root.entry_count()
    }

    /// Pre-order walk of the tree: folder, its entries, its subfolders
    pub fn walk(&self) -> Vec<TreeNode<'_>> {
        let mut out = Vec::with_capacity(self.root.entry_count() + self.root.dir_count());
        walk_into(&self.root, "", &mut SmallVec::new(), &mut out);
        out
    }

    /// Every entry with its path and id, in walk order
    pub fn entry_ids(&self) -> Vec<(String, EntryId)> {
        self.walk()
            .into_iter()
            .filter_map(|node| match node {
                TreeNode::File { path, id, .. } => Some((path, id)),
                TreeNode::Folder { .. } => None,
            })
            .collect()
    }

    // ==================== Lookup ====================

    fn resolve_dir(&self, path: &str) -> Result<SmallVec<[usize; 4]>> {
        let mut indices = SmallVec::new();
        let mut current = &self.root;
        for part in path.split(['/', '\\']).filter(|p| !p.is_empty()) {
            let idx = current
                .dir_index(part)
                .ok_or_else(|| Error::entry_not_found(path))?;
            indices.push(idx);
            current = &current.dirs[idx];
        }
        Ok(indices)
    }

    /// Locate an entry by `/`-separated path
    ///
    /// Each component matches exactly first, then case-insensitively. With
    /// duplicate names the first one wins.
    pub fn resolve(&self, path: &str) -> Result<EntryId> {
        let (dirs, name) = split_path(path);
        let name = name.ok_or_else(|| Error::entry_not_found(path))?;
        let dirs = self.resolve_dir(&dirs.join("/")).map_err(|_| Error::entry_not_found(path))?;
        let index = self
            .root
            .descend(&dirs)
            .and_then(|dir| dir.entry_index(name))
            .ok_or_else(|| Error::entry_not_found(path))?;
        Ok(EntryId { dirs, index })
    }

    /// Entry at an id
    pub fn get(&self, id: &EntryId) -> Option<&ArchiveEntry> {
        self.root.descend(&id.dirs)?.entries.get(id.index)
    }

    /// Mutable entry at an id
    pub fn get_mut(&mut self, id: &EntryId) -> Option<&mut ArchiveEntry> {
        self.root.descend_mut(&id.dirs)?.entries.get_mut(id.index)
    }

    /// Entry at a path
    pub fn entry(&self, path: &str) -> Result<&ArchiveEntry> {
        let id = self.resolve(path)?;
        self.get(&id).ok_or_else(|| Error::entry_not_found(path))
    }

    /// Mutable entry at a path; marks the archive modified
    pub fn entry_mut(&mut self, path: &str) -> Result<&mut ArchiveEntry> {
        let id = self.resolve(path)?;
        self.modified = true;
        self.get_mut(&id).ok_or_else(|| Error::entry_not_found(path))
    }

    /// Directory at a path (empty path is the root)
    pub fn directory(&self, path: &str) -> Result<&ArchiveDirectory> {
        let dirs = self.resolve_dir(path)?;
        self.root.descend(&dirs).ok_or_else(|| Error::entry_not_found(path))
    }

    /// Find entries matching a pattern (glob-like, `*` wildcards)
    ///
    /// Without wildcards the pattern matches any path containing it.
    pub fn find(&self, pattern: &str) -> Vec<(String, &ArchiveEntry)> {
        let pattern = pattern.to_lowercase();
        let parts: Vec<&str> = pattern.split('*').collect();

        self.walk()
            .into_iter()
            .filter_map(|node| match node {
                TreeNode::File { path, entry, .. } => Some((path, entry)),
                TreeNode::Folder { .. } => None,
            })
            .filter(|(path, _)| glob_match(&path.to_lowercase(), &pattern, &parts))
            .collect()
    }

    /// Get archive statistics
    pub fn statistics(&self) -> ArchiveStatistics {
        let mut stats = ArchiveStatistics {
            directory_count: self.root.dir_count(),
            ..ArchiveStatistics::default()
        };

        for node in self.walk() {
            if let TreeNode::File { entry, .. } = node {
                stats.total_entries += 1;
                stats.total_size += entry.size();
                stats.total_on_disk += entry.size_on_disk;
                if entry.is_marker() {
                    stats.marker_count += 1;
                }
                if let Some(ext) = entry.extension() {
                    *stats.extensions.entry(ext.to_lowercase()).or_insert(0) += 1;
                }
            }
        }

        if stats.total_size > 0 {
            stats.compression_ratio = stats.total_on_disk as f64 / stats.total_size as f64;
        }

        stats
    }

    // ==================== Payloads ====================

    /// Load an entry's payload (if needed) and return it
    pub fn load_entry_data(&mut self, path: &str) -> Result<&[u8]> {
        let id = self.resolve(path)?;
        self.load_by_id(&id)
    }

    /// Load the payload of the entry at `id`
    pub fn load_by_id(&mut self, id: &EntryId) -> Result<&[u8]> {
        let source = self.source.clone();
        let options = self.options.clone();
        let entry = self
            .get_mut(id)
            .ok_or_else(|| Error::entry_not_found(format!("{id:?}")))?;

        if !entry.loaded || entry.data.is_none() {
            let data = read_payload(&source, entry, &options)
                .with_context(|| format!("loading '{}'", entry.name))?;
            entry.set_data(data);
        }

        Ok(entry.data().unwrap_or_default())
    }

    /// Payload of the entry at `path` without caching it
    pub fn entry_data(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        let id = self.resolve(path)?;
        let entry = self.get(&id).ok_or_else(|| Error::entry_not_found(path))?;
        self.payload(entry)
    }

    /// Payload of an entry of this archive, loaded or read on the fly
    pub fn payload<'a>(&'a self, entry: &'a ArchiveEntry) -> Result<Cow<'a, [u8]>> {
        match entry.data() {
            Some(data) => Ok(Cow::Borrowed(data)),
            None => read_payload(&self.source, entry, &self.options)
                .map(Cow::Owned)
                .with_context(|| format!("reading '{}'", entry.name)),
        }
    }

    /// Stored (possibly compressed) bytes of an entry as they sit in the source
    pub fn raw_bytes(&self, entry: &ArchiveEntry) -> Result<&[u8]> {
        if entry.size_on_disk == 0 {
            return Ok(&[]);
        }
        let offset = to_usize(entry.offset_on_disk)?;
        let size = to_usize(entry.size_on_disk)?;
        range_checked(&self.source, offset, size)
    }

    // ==================== Mutation ====================

    fn dir_mut_checked(&mut self, dir_path: &str) -> Result<&mut ArchiveDirectory> {
        let dirs = self.resolve_dir(dir_path)?;
        if !dirs.is_empty() && !self.capabilities().directories {
            return Err(Error::invalid_operation(format!(
                "{} archives cannot hold directories",
                self.format.name()
            )));
        }
        self.root
            .descend_mut(&dirs)
            .ok_or_else(|| Error::entry_not_found(dir_path))
    }

    /// Insert `entry` into the directory at `dir_path`, at `position` or last
    pub fn add_entry(&mut self, dir_path: &str, entry: ArchiveEntry, position: Option<usize>) -> Result<EntryId> {
        let caps = self.capabilities();
        check_name(caps, &entry.name)?;
        if caps.single_entry && self.root.entry_count() > 0 {
            return Err(Error::invalid_operation(format!(
                "{} archives hold a single entry",
                self.format.name()
            )));
        }

        let dirs = self.resolve_dir(dir_path)?;
        let dir = self.dir_mut_checked(dir_path)?;
        let index = position.unwrap_or(dir.entries.len()).min(dir.entries.len());
        tracing::trace!(entry = %entry.name, dir = dir_path, index, "adding entry");
        dir.entries.insert(index, entry);
        self.modified = true;

        Ok(EntryId { dirs, index })
    }

    /// Create the directory at `path`, including missing parents
    pub fn add_directory(&mut self, path: &str) -> Result<()> {
        if !self.capabilities().directories {
            return Err(Error::invalid_operation(format!(
                "{} archives cannot hold directories",
                self.format.name()
            )));
        }
        let parts: Vec<&str> = path.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(Error::invalid_operation("directory path is empty"));
        }
        self.root.ensure_dirs(parts);
        self.modified = true;
        Ok(())
    }

    /// Remove and return the entry at `path`
    pub fn remove_entry(&mut self, path: &str) -> Result<ArchiveEntry> {
        let id = self.resolve(path)?;
        let dir = self
            .root
            .descend_mut(&id.dirs)
            .ok_or_else(|| Error::entry_not_found(path))?;
        self.modified = true;
        Ok(dir.entries.remove(id.index))
    }

    /// Remove and return the directory at `path` with everything in it
    pub fn remove_directory(&mut self, path: &str) -> Result<ArchiveDirectory> {
        let mut dirs = self.resolve_dir(path)?;
        let last = dirs
            .pop()
            .ok_or_else(|| Error::invalid_operation("cannot remove the root directory"))?;
        let parent = self
            .root
            .descend_mut(&dirs)
            .ok_or_else(|| Error::entry_not_found(path))?;
        self.modified = true;
        Ok(parent.dirs.remove(last))
    }

    /// Rename the entry at `path`
    pub fn rename_entry(&mut self, path: &str, new_name: &str) -> Result<()> {
        check_name(self.capabilities(), new_name)?;
        let entry = self.entry_mut(path)?;
        tracing::trace!(from = %entry.name, to = new_name, "renaming entry");
        entry.name = new_name.to_string();
        Ok(())
    }

    /// Move the entry at `path` into `dest_dir`, at `position` or last
    pub fn move_entry(&mut self, path: &str, dest_dir: &str, position: Option<usize>) -> Result<EntryId> {
        let dest = self.resolve_dir(dest_dir)?;
        if !dest.is_empty() && !self.capabilities().directories {
            return Err(Error::invalid_operation(format!(
                "{} archives cannot hold directories",
                self.format.name()
            )));
        }
        let id = self.resolve(path)?;
        let source = self
            .root
            .descend_mut(&id.dirs)
            .ok_or_else(|| Error::entry_not_found(path))?;
        let entry = source.entries.remove(id.index);

        // removing from the same directory shifts later positions down
        let position = match position {
            Some(p) if dest == id.dirs && p > id.index => Some(p - 1),
            other => other,
        };

        let target = self
            .root
            .descend_mut(&dest)
            .ok_or_else(|| Error::entry_not_found(dest_dir))?;
        let index = position.unwrap_or(target.entries.len()).min(target.entries.len());
        target.entries.insert(index, entry);
        self.modified = true;

        Ok(EntryId { dirs: dest, index })
    }

    /// Swap two entries of the same directory
    pub fn swap_entries(&mut self, a: &str, b: &str) -> Result<()> {
        let first = self.resolve(a)?;
        let second = self.resolve(b)?;
        if first.dirs != second.dirs {
            return Err(Error::invalid_operation(format!(
                "'{a}' and '{b}' are in different directories"
            )));
        }
        let dir = self
            .root
            .descend_mut(&first.dirs)
            .ok_or_else(|| Error::entry_not_found(a))?;
        dir.entries.swap(first.index, second.index);
        self.modified = true;
        Ok(())
    }

    /// Replace the payload of the entry at `path`
    pub fn import_entry_data(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        let entry = self.entry_mut(path)?;
        entry.props.full_size = data.len() as u64;
        entry.props.crc32 = None;
        entry.set_data(data);
        entry.modified = true;
        Ok(())
    }

    // ==================== Output ====================

    /// Serialize the tree into the container layout
    pub fn write(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let bytes = self
            .format
            .write_archive(self, options)
            .with_context(|| format!("writing {} archive", self.format.id()))?;
        tracing::debug!(
            format = %self.format.id(),
            entries = self.entry_count(),
            bytes = bytes.len(),
            "archive written"
        );
        Ok(bytes)
    }

    /// Write, then reopen from the written bytes
    ///
    /// On success every offset refers to the new bytes and nothing is marked
    /// modified. On failure the archive is left as it was.
    pub fn save(&mut self, options: &WriteOptions) -> Result<Bytes> {
        let bytes = Bytes::from(self.write(options)?);
        let reopened = Self::open(Arc::clone(&self.format), bytes.clone(), self.options.clone(), None)?;
        *self = reopened;
        Ok(bytes)
    }

    /// Release the archive and everything it holds
    pub fn close(self) {
        if self.is_modified() {
            tracing::debug!(format = %self.format.id(), "closing archive with unsaved changes");
        }
    }
}

/// Read (and inflate) an entry's payload from `source`
///
/// Inflate failures and size mismatches are logged and answered with the
/// best data available.
pub(crate) fn read_payload(source: &[u8], entry: &ArchiveEntry, options: &OpenOptions) -> Result<Vec<u8>> {
    if entry.size_on_disk == 0 {
        return Ok(Vec::new());
    }
    let raw = range_checked(source, to_usize(entry.offset_on_disk)?, to_usize(entry.size_on_disk)?)?;

    let Some(codec) = entry.props.compression else {
        if let Some(method) = entry.props.raw_method.filter(|&m| m != 0) {
            tracing::trace!(entry = %entry.name, method, "returning undecoded payload");
        }
        return Ok(raw.to_vec());
    };

    let data = match compression::inflate_limited(codec, raw, None, options.decompression_limit) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(entry = %entry.name, %codec, error = %e, "inflate failed, returning raw bytes");
            return Ok(raw.to_vec());
        }
    };

    let expected = entry.props.full_size;
    if expected != 0 && data.len() as u64 != expected {
        tracing::warn!(
            entry = %entry.name,
            expected,
            actual = data.len(),
            "inflated size differs from directory"
        );
    }

    if options.strict_validation {
        if let Some(stored) = entry.props.crc32.filter(|&stored| !verify_crc32(&data, stored)) {
            return Err(Error::compression(format!(
                "CRC32 mismatch: stored {stored:08x}, computed {:08x}",
                crc32(&data)
            )));
        }
    }

    Ok(data)
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::out_of_bounds(usize::MAX, 0))
}

fn glob_match(path: &str, pattern: &str, parts: &[&str]) -> bool {
    if parts.len() == 1 {
        return path.contains(pattern);
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == parts.len() - 1 {
            if !path[pos..].ends_with(part) {
                return false;
            }
        } else if let Some(idx) = path[pos..].find(part) {
            pos += idx + part.len();
        } else {
            return false;
        }
    }
    true
}

/// Archive statistics
#[derive(Debug, Default)]
pub struct ArchiveStatistics {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of directories
    pub directory_count: usize,
    /// Zero-length entries
    pub marker_count: usize,
    /// Total uncompressed size in bytes
    pub total_size: u64,
    /// Total stored size in bytes
    pub total_on_disk: u64,
    /// Overall compression ratio
    pub compression_ratio: f64,
    /// Entry count by extension
    pub extensions: HashMap<String, usize>,
}

impl ArchiveStatistics {
    /// Get top N extensions by entry count
    pub fn top_extensions(&self, n: usize) -> Vec<(&str, usize)> {
        let mut exts: Vec<_> = self.extensions.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        exts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        exts.truncate(n);
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{build, listing, open};
    use crate::archive::{WadFormat, ZipFormat};
    use crate::compression::{deflate, Codec, Level};
    use crate::traits::OpenPhase;
    use std::sync::Mutex;

    fn wad() -> Arc<dyn ArchiveFormat> {
        Arc::new(WadFormat)
    }

    fn zip() -> Arc<dyn ArchiveFormat> {
        Arc::new(ZipFormat)
    }

    fn sample_wad() -> Archive {
        open(
            wad(),
            build(wad(), &[("MAP01", b""), ("THINGS", b"things!"), ("LINEDEFS", b"lines"), ("THINGS", b"dup")]),
        )
    }

    #[test]
    fn test_lazy_then_load() {
        let mut archive = sample_wad();
        assert!(!archive.entry("THINGS").unwrap().loaded);
        assert!(archive.entry("MAP01").unwrap().loaded);

        assert_eq!(archive.load_entry_data("things").unwrap(), b"things!");
        assert!(archive.entry("THINGS").unwrap().loaded);
        assert!(!archive.is_modified());
    }

    #[test]
    fn test_eager_matches_lazy() {
        let bytes = build(wad(), &[("A", b"alpha"), ("B", b"beta")]);
        let lazy = open(wad(), bytes.clone());
        let eager = Archive::open(wad(), Bytes::from(bytes), OpenOptions::eager(), None).unwrap();

        for (path, _) in lazy.entry_ids() {
            assert!(eager.entry(&path).unwrap().loaded);
            assert_eq!(lazy.entry_data(&path).unwrap(), eager.entry_data(&path).unwrap());
        }
    }

    #[test]
    fn test_duplicate_names_addressed_by_id() {
        let archive = sample_wad();
        let ids = archive.entry_ids();
        assert_eq!(ids.len(), 4);
        assert_eq!(archive.payload(archive.get(&ids[3].1).unwrap()).unwrap().as_ref(), b"dup");
        assert_eq!(archive.entry_data("THINGS").unwrap().as_ref(), b"things!");
    }

    #[test]
    fn test_progress_phases() {
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let cb: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p.phase));
        let bytes = build(wad(), &[("A", b"x")]);
        Archive::open(wad(), Bytes::from(bytes), OpenOptions::default(), Some(&cb)).unwrap();

        let seen = phases.lock().unwrap();
        assert_eq!(seen.first(), Some(&OpenPhase::ReadingHeader));
        assert_eq!(seen.last(), Some(&OpenPhase::Complete));
    }

    #[test]
    fn test_mutations_mark_modified() {
        let mut archive = sample_wad();
        archive.rename_entry("LINEDEFS", "SIDEDEFS").unwrap();
        assert!(archive.is_modified());
        assert!(archive.entry("SIDEDEFS").is_ok());
        assert!(archive.entry("LINEDEFS").unwrap_err().is_not_found());
    }

    #[test]
    fn test_name_limits_enforced() {
        let mut archive = sample_wad();
        let err = archive.rename_entry("MAP01", "WAYTOOLONG").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        let err = archive
            .add_entry("", ArchiveEntry::new("NINECHARS", vec![]), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert!(archive.add_directory("maps").is_err());
    }

    #[test]
    fn test_add_remove_swap_move() {
        let mut archive = sample_wad();
        archive.add_entry("", ArchiveEntry::new("NEW", b"n".to_vec()), Some(0)).unwrap();
        assert_eq!(archive.root().entries[0].name, "NEW");

        archive.swap_entries("NEW", "MAP01").unwrap();
        assert_eq!(archive.root().entries[0].name, "MAP01");
        assert_eq!(archive.root().entries[1].name, "NEW");

        archive.move_entry("MAP01", "", Some(3)).unwrap();
        let names: Vec<_> = archive.root().entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["NEW", "THINGS", "MAP01", "LINEDEFS", "THINGS"]);

        let removed = archive.remove_entry("NEW").unwrap();
        assert_eq!(removed.data(), Some(&b"n"[..]));
        assert_eq!(archive.entry_count(), 4);
    }

    #[test]
    fn test_tree_operations() {
        let mut archive = Archive::new(zip());
        archive.add_directory("sprites/monsters").unwrap();
        archive
            .add_entry("sprites/monsters", ArchiveEntry::new("TROOA1.png", vec![1]), None)
            .unwrap();
        archive.add_entry("", ArchiveEntry::new("readme.txt", vec![2]), None).unwrap();
        archive.move_entry("readme.txt", "sprites", None).unwrap();

        assert_eq!(
            listing(&archive),
            vec![
                ("sprites".to_string(), 0),
                ("sprites/readme.txt".to_string(), 1),
                ("sprites/monsters".to_string(), 0),
                ("sprites/monsters/TROOA1.png".to_string(), 1),
            ]
        );

        let err = archive.swap_entries("sprites/readme.txt", "sprites/monsters/TROOA1.png").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        let removed = archive.remove_directory("sprites/monsters").unwrap();
        assert_eq!(removed.entries.len(), 1);
        assert_eq!(archive.entry_count(), 1);
        assert!(archive.remove_directory("").is_err());
    }

    #[test]
    fn test_import_and_save() {
        let mut archive = sample_wad();
        archive.import_entry_data("LINEDEFS", b"replaced".to_vec()).unwrap();
        assert!(archive.entry("LINEDEFS").unwrap().modified);

        archive.save(&WriteOptions::default()).unwrap();
        assert!(!archive.is_modified());
        assert_eq!(archive.entry_data("LINEDEFS").unwrap().as_ref(), b"replaced");
        assert_eq!(archive.entry_data("THINGS").unwrap().as_ref(), b"things!");
    }

    #[test]
    fn test_find_and_statistics() {
        let bytes = build(
            zip(),
            &[("maps/map01.wad", b"PWAD"), ("maps/map02.wad", b"PWAD"), ("textures.txt", b"t")],
        );
        let archive = open(zip(), bytes);

        assert_eq!(archive.find("*.wad").len(), 2);
        assert_eq!(archive.find("maps/*").len(), 2);
        assert_eq!(archive.find("TEXTURES").len(), 1);

        let stats = archive.statistics();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.directory_count, 1);
        assert_eq!(stats.total_size, 9);
        assert_eq!(stats.top_extensions(1), vec![("wad", 2)]);
    }

    #[test]
    fn test_inflate_failure_returns_raw() {
        let mut entry = ArchiveEntry::on_disk("BROKEN", 0, 4);
        entry.props.compression = Some(Codec::Deflate);
        entry.props.full_size = 100;
        let data = read_payload(b"\xff\xff\xff\xff", &entry, &OpenOptions::default()).unwrap();
        assert_eq!(data, b"\xff\xff\xff\xff");
    }

    #[test]
    fn test_size_mismatch_is_best_effort() {
        let packed = deflate(Codec::Deflate, b"hello world", Level::DEFAULT).unwrap();
        let mut entry = ArchiveEntry::on_disk("HELLO", 0, packed.len() as u64);
        entry.props.compression = Some(Codec::Deflate);
        entry.props.full_size = 5;
        let data = read_payload(&packed, &entry, &OpenOptions::default()).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_strict_crc() {
        let packed = deflate(Codec::Deflate, b"payload", Level::DEFAULT).unwrap();
        let mut entry = ArchiveEntry::on_disk("P", 0, packed.len() as u64);
        entry.props.compression = Some(Codec::Deflate);
        entry.props.crc32 = Some(0xDEAD_BEEF);
        let strict = OpenOptions {
            strict_validation: true,
            ..OpenOptions::default()
        };
        assert!(read_payload(&packed, &entry, &OpenOptions::default()).is_ok());
        assert!(read_payload(&packed, &entry, &strict).unwrap_err().is_compression_error());

        entry.props.crc32 = Some(crc32(b"payload"));
        assert_eq!(read_payload(&packed, &entry, &strict).unwrap(), b"payload");
    }
}
