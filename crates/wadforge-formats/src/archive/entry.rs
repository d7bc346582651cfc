//! Archive entry and directory tree structures

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use wadforge_core::ByteBuffer;

use crate::compression::Codec;

/// Per-entry properties read from (and written back to) the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProps {
    /// Uncompressed size; 0 when the container does not record it
    pub full_size: u64,
    /// Codec the on-disk bytes are stored with
    pub compression: Option<Codec>,
    /// CRC32 of the uncompressed data, when the container stores one
    pub crc32: Option<u32>,
    /// WAD2/WAD3 lump type byte
    pub lump_type: Option<u8>,
    /// DOS modification time
    pub mod_time: u16,
    /// DOS modification date
    pub mod_date: u16,
    /// Container-specific method code as read from disk
    pub raw_method: Option<u16>,
    /// ZIP general purpose flags as read from disk
    #[serde(default)]
    pub raw_flags: u16,
}

impl EntryProps {
    /// Parse DOS date/time to components
    pub fn modification_datetime(&self) -> (u16, u8, u8, u8, u8, u8) {
        let year = 1980 + ((self.mod_date >> 9) & 0x7F);
        let month = ((self.mod_date >> 5) & 0x0F) as u8;
        let day = (self.mod_date & 0x1F) as u8;
        let hour = ((self.mod_time >> 11) & 0x1F) as u8;
        let minute = ((self.mod_time >> 5) & 0x3F) as u8;
        let second = ((self.mod_time & 0x1F) * 2) as u8;

        (year, month, day, hour, minute, second)
    }
}

/// A named unit of data inside an archive
///
/// Entries hold no reference to their directory; the path used to reach an
/// entry is its parent relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name within its directory
    pub name: String,
    pub(crate) data: Option<ByteBuffer>,
    /// Bytes occupied in the source container
    pub size_on_disk: u64,
    /// Offset of the payload in the source container
    pub offset_on_disk: u64,
    /// Detected payload format, set by the classifier
    pub format_id: Option<String>,
    /// Payload has been read into memory
    pub loaded: bool,
    /// Payload or metadata changed since open
    pub modified: bool,
    /// Container-specific properties
    pub props: EntryProps,
}

impl ArchiveEntry {
    /// A new in-memory entry
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let full_size = data.len() as u64;
        Self {
            name: name.into(),
            data: Some(ByteBuffer::from_vec(data)),
            size_on_disk: 0,
            offset_on_disk: 0,
            format_id: None,
            loaded: true,
            modified: true,
            props: EntryProps {
                full_size,
                ..EntryProps::default()
            },
        }
    }

    /// An entry whose payload still lives in the container
    ///
    /// Zero-size entries (markers) count as loaded.
    pub fn on_disk(name: impl Into<String>, offset: u64, size: u64) -> Self {
        let empty = size == 0;
        Self {
            name: name.into(),
            data: empty.then(ByteBuffer::new),
            size_on_disk: size,
            offset_on_disk: offset,
            format_id: None,
            loaded: empty,
            modified: false,
            props: EntryProps {
                full_size: size,
                ..EntryProps::default()
            },
        }
    }

    /// Set the entry properties
    pub fn with_props(mut self, props: EntryProps) -> Self {
        self.props = props;
        self
    }

    /// Loaded payload, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_ref().map(ByteBuffer::as_slice)
    }

    /// Size of the uncompressed payload
    pub fn size(&self) -> u64 {
        match &self.data {
            Some(data) => data.len() as u64,
            None => self.props.full_size,
        }
    }

    /// Zero-length entry (e.g. a WAD map marker)
    pub fn is_marker(&self) -> bool {
        self.size() == 0
    }

    /// Get the file extension
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rfind('.')
            .filter(|&idx| idx > 0)
            .map(|idx| &self.name[idx + 1..])
    }

    /// Calculate compression ratio
    pub fn compression_ratio(&self) -> f64 {
        if self.props.full_size == 0 {
            return 1.0;
        }
        self.size_on_disk as f64 / self.props.full_size as f64
    }

    pub(crate) fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(ByteBuffer::from_vec(data));
        self.loaded = true;
    }
}

/// Ordered group of entries and subdirectories
///
/// Insertion order is the serialization order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveDirectory {
    /// Directory name (empty for the root)
    pub name: String,
    /// Entries directly in this directory
    pub entries: Vec<ArchiveEntry>,
    /// Child directories
    pub dirs: Vec<ArchiveDirectory>,
}

impl ArchiveDirectory {
    /// Create an empty directory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Index of an entry by name; exact match first, then case-insensitive
    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .or_else(|| self.entries.iter().position(|e| e.name.eq_ignore_ascii_case(name)))
    }

    /// Index of a child directory by name; exact match first, then case-insensitive
    pub fn dir_index(&self, name: &str) -> Option<usize> {
        self.dirs
            .iter()
            .position(|d| d.name == name)
            .or_else(|| self.dirs.iter().position(|d| d.name.eq_ignore_ascii_case(name)))
    }

    /// Child directory by name
    pub fn dir(&self, name: &str) -> Option<&ArchiveDirectory> {
        self.dir_index(name).map(|i| &self.dirs[i])
    }

    /// Entry by name
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entry_index(name).map(|i| &self.entries[i])
    }

    /// Walk (creating as needed) the directory chain `parts`
    ///
    /// Returns the index path of the final directory.
    pub fn ensure_dirs<'a, I>(&mut self, parts: I) -> SmallVec<[usize; 4]>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut indices = SmallVec::new();
        let mut current = self;
        for part in parts {
            let idx = match current.dir_index(part) {
                Some(i) => i,
                None => {
                    current.dirs.push(ArchiveDirectory::new(part));
                    current.dirs.len() - 1
                }
            };
            indices.push(idx);
            current = &mut current.dirs[idx];
        }
        indices
    }

    /// Directory at an index path
    pub fn descend(&self, dirs: &[usize]) -> Option<&ArchiveDirectory> {
        dirs.iter().try_fold(self, |dir, &i| dir.dirs.get(i))
    }

    /// Mutable directory at an index path
    pub fn descend_mut(&mut self, dirs: &[usize]) -> Option<&mut ArchiveDirectory> {
        dirs.iter().try_fold(self, |dir, &i| dir.dirs.get_mut(i))
    }

    /// Entries in this directory and below
    pub fn entry_count(&self) -> usize {
        self.entries.len() + self.dirs.iter().map(ArchiveDirectory::entry_count).sum::<usize>()
    }

    /// Directories below this one
    pub fn dir_count(&self) -> usize {
        self.dirs.len() + self.dirs.iter().map(ArchiveDirectory::dir_count).sum::<usize>()
    }

    /// Whether anything in this subtree is marked modified
    pub fn any_modified(&self) -> bool {
        self.entries.iter().any(|e| e.modified) || self.dirs.iter().any(ArchiveDirectory::any_modified)
    }

    pub(crate) fn for_each_entry_mut(&mut self, f: &mut impl FnMut(&mut ArchiveEntry)) {
        for entry in &mut self.entries {
            f(entry);
        }
        for dir in &mut self.dirs {
            dir.for_each_entry_mut(f);
        }
    }
}

/// Position of an entry in the tree
///
/// Addresses entries by index rather than name so duplicate lump names stay
/// distinguishable. Invalidated by structural edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId {
    /// Directory indices from the root
    pub dirs: SmallVec<[usize; 4]>,
    /// Index within the final directory
    pub index: usize,
}

impl EntryId {
    /// Entry in the root directory
    pub fn root(index: usize) -> Self {
        Self {
            dirs: SmallVec::new(),
            index,
        }
    }
}

/// Node yielded by a tree walk
#[derive(Debug, Clone)]
pub enum TreeNode<'a> {
    /// A directory, surfaced as a zero-length folder entry
    Folder {
        /// Full path without a trailing slash
        path: String,
        /// The directory itself
        dir: &'a ArchiveDirectory,
    },
    /// An entry
    File {
        /// Full path
        path: String,
        /// Position in the tree
        id: EntryId,
        /// The entry itself
        entry: &'a ArchiveEntry,
    },
}

impl TreeNode<'_> {
    /// Full path of the node
    pub fn path(&self) -> &str {
        match self {
            TreeNode::Folder { path, .. } | TreeNode::File { path, .. } => path,
        }
    }

    /// Whether this is a folder node
    pub fn is_folder(&self) -> bool {
        matches!(self, TreeNode::Folder { .. })
    }

    /// Payload size; folders are zero-length
    pub fn size(&self) -> u64 {
        match self {
            TreeNode::Folder { .. } => 0,
            TreeNode::File { entry, .. } => entry.size(),
        }
    }
}

/// Pre-order walk: each folder, then its entries, then its subfolders
pub(crate) fn walk_into<'a>(
    dir: &'a ArchiveDirectory,
    prefix: &str,
    ids: &mut SmallVec<[usize; 4]>,
    out: &mut Vec<TreeNode<'a>>,
) {
    for (index, entry) in dir.entries.iter().enumerate() {
        out.push(TreeNode::File {
            path: join(prefix, &entry.name),
            id: EntryId {
                dirs: ids.clone(),
                index,
            },
            entry,
        });
    }
    for (index, child) in dir.dirs.iter().enumerate() {
        let path = join(prefix, &child.name);
        out.push(TreeNode::Folder {
            path: path.clone(),
            dir: child,
        });
        ids.push(index);
        walk_into(child, &path, ids, out);
        ids.pop();
    }
}

/// Join a directory path and a name with `/`
pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Split `a/b/c` into (`[a, b]`, `c`), ignoring empty components
pub(crate) fn split_path(path: &str) -> (Vec<&str>, Option<&str>) {
    let mut parts: Vec<&str> = path.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    let last = parts.pop();
    (parts, last)
}
