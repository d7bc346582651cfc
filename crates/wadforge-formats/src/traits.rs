// wadforge-formats/src/traits.rs
//! Core traits defining the format interface.
//!
//! Every container format and image codec is a trait object stored in a
//! registry. This module establishes:
//! - the shared detection interface ([`Detect`])
//! - the container interface ([`ArchiveFormat`])
//! - the image interface ([`ImageCodec`])
//! - options and progress reporting for long opens

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use wadforge_core::{ByteBuffer, Confidence, Error, Result};

use crate::archive::{Archive, ArchiveContents};
use crate::compression::Level;
use crate::image::convert::{self, ConvertOptions};
use crate::image::{Image, ImageInfo, Palette, PixelFormat};

/// Progress callback for long-running opens
pub type ProgressCallback = Box<dyn Fn(OpenProgress) + Send + Sync>;

/// Progress information while opening an archive
#[derive(Debug, Clone)]
pub struct OpenProgress {
    /// Current phase
    pub phase: OpenPhase,
    /// Directory records or entries handled so far
    pub items_processed: u64,
    /// Total items to process (if known)
    pub total_items: Option<u64>,
    /// Current item being processed (e.g., entry name)
    pub current_item: Option<String>,
}

impl OpenProgress {
    /// Calculate fraction complete (0.0 - 1.0)
    pub fn fraction(&self) -> Option<f32> {
        self.total_items.map(|total| {
            if total == 0 {
                1.0
            } else {
                self.items_processed as f32 / total as f32
            }
        })
    }
}

/// Phases of opening an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPhase {
    /// Reading and validating the header
    ReadingHeader,
    /// Walking the directory and building the entry tree
    Indexing,
    /// Loading entry payloads (eager mode only)
    Loading,
    /// Open complete
    Complete,
}

/// Send a progress event if a callback is installed
pub(crate) fn report(
    progress: Option<&ProgressCallback>,
    phase: OpenPhase,
    items_processed: u64,
    total_items: Option<u64>,
    current_item: Option<&str>,
) {
    if let Some(cb) = progress {
        cb(OpenProgress {
            phase,
            items_processed,
            total_items,
            current_item: current_item.map(str::to_owned),
        });
    }
}

/// When entry payloads are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Read each payload on first access
    #[default]
    Lazy,
    /// Read and decompress every payload during open
    Eager,
}

/// Configuration options for opening archives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Lazy or eager payload loading
    pub load_mode: LoadMode,
    /// Verify stored checksums when loading payloads
    pub strict_validation: bool,
    /// File name the bytes came from, used to name single-stream entries
    pub name_hint: Option<String>,
    /// Maximum decompressed size of a single entry (in bytes)
    pub decompression_limit: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            load_mode: LoadMode::Lazy,
            strict_validation: false,
            name_hint: None,
            decompression_limit: 512 * 1024 * 1024, // 512 MB
        }
    }
}

impl OpenOptions {
    /// Default options with eager loading
    pub fn eager() -> Self {
        Self {
            load_mode: LoadMode::Eager,
            ..Self::default()
        }
    }

    /// Set the originating file name
    pub fn with_name_hint(mut self, name: impl Into<String>) -> Self {
        self.name_hint = Some(name.into());
        self
    }
}

/// Configuration options for writing archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Level used when (re)compressing entries
    pub compression_level: Level,
}

/// Anything that can be asked "is this buffer yours?"
pub trait Detect: Send + Sync {
    /// Stable identifier, unique within a registry
    fn id(&self) -> &str;

    /// Priority used to order and prune candidates (255 = magic-number exact)
    fn reliability(&self) -> u8;

    /// Buffers shorter than this never match
    fn min_size(&self) -> usize;

    /// Pure, bounds-checked format test
    fn test(&self, data: &[u8]) -> Confidence;
}

/// What a container layout can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCapabilities {
    /// Entries may live in subdirectories
    pub directories: bool,
    /// Longest entry name the directory record can hold
    pub max_name_len: Option<usize>,
    /// Entries are individually compressed
    pub compresses: bool,
    /// The container holds exactly one entry
    pub single_entry: bool,
}

/// A container byte layout
///
/// Implementors parse a directory into an entry tree and serialize a tree
/// back into the layout. Payload loading is shared by all formats and lives
/// on [`Archive`].
pub trait ArchiveFormat: Detect {
    /// Human-readable name
    fn name(&self) -> &str;

    /// File extensions (lowercase, no dot)
    fn extensions(&self) -> &[&str];

    /// Structural limits of the layout
    fn capabilities(&self) -> FormatCapabilities;

    /// Parse and validate the directory, building the entry tree
    ///
    /// Must fail without side effects when any record points outside
    /// `source`.
    fn read_directory(
        &self,
        source: &Bytes,
        options: &OpenOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<ArchiveContents>;

    /// Serialize the archive, recomputing every offset
    fn write_archive(&self, archive: &Archive, options: &WriteOptions) -> Result<Vec<u8>>;
}

/// Whether a codec can encode an image as it stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writable {
    /// Encodable directly
    Yes,
    /// Encodable after an explicit `convert_writable`
    Convert,
    /// Not representable in this format
    No,
}

/// An image encoding
pub trait ImageCodec: Detect {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Preferred file extension
    fn extension(&self) -> &str;

    /// Cheap header parse
    fn info(&self, data: &[u8]) -> Result<ImageInfo>;

    /// Full decode into the canonical model
    fn decode(&self, data: &[u8]) -> Result<Image>;

    /// Pixel format `encode` accepts, `None` for read-only codecs
    fn target_format(&self) -> Option<PixelFormat> {
        None
    }

    /// Whether the format can hold an image of these dimensions
    fn accepts_size(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0
    }

    /// Whether `image` can be encoded as is
    fn can_write(&self, image: &Image) -> Writable {
        match self.target_format() {
            Some(_) if !self.accepts_size(image.width(), image.height()) => Writable::No,
            Some(format) if format == image.format() => Writable::Yes,
            Some(_) => Writable::Convert,
            None => Writable::No,
        }
    }

    /// Produce a copy of `image` this codec can encode
    fn convert_writable(&self, image: &Image, options: &ConvertOptions) -> Result<Image> {
        match (self.target_format(), self.can_write(image)) {
            (Some(_), Writable::Yes) => Ok(image.clone()),
            (Some(target), Writable::Convert) => convert::convert(image, target, options),
            _ => Err(Error::unsupported(format!(
                "{} cannot hold a {}x{} image",
                self.name(),
                image.width(),
                image.height()
            ))),
        }
    }

    /// Encode `image`; fails unless `can_write` answers `Yes`
    fn encode(&self, image: &Image, palette: Option<&Palette>) -> Result<Vec<u8>> {
        let _ = (image, palette);
        Err(Error::unsupported(format!("{} is read-only", self.name())))
    }

    /// Rewrite the hotspot offsets stored in encoded `data`
    fn set_offsets(&self, data: &[u8], x: i32, y: i32) -> Result<Vec<u8>> {
        let _ = (data, x, y);
        Err(Error::unsupported(format!(
            "{} does not store offsets",
            self.name()
        )))
    }
}

/// Reject images a codec cannot take directly
pub(crate) fn ensure_writable(codec: &dyn ImageCodec, image: &Image) -> Result<()> {
    match codec.can_write(image) {
        Writable::Yes => Ok(()),
        Writable::Convert => Err(Error::unsupported(format!(
            "{} needs a {:?} image, got {:?}; convert it first",
            codec.name(),
            codec.target_format().unwrap_or(image.format()),
            image.format()
        ))),
        Writable::No => Err(Error::unsupported(format!(
            "{} cannot hold a {}x{} image",
            codec.name(),
            image.width(),
            image.height()
        ))),
    }
}

/// Copy `data` into a buffer for in-place header edits
pub(crate) fn patchable(data: &[u8]) -> ByteBuffer {
    ByteBuffer::from_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_progress_fraction() {
        let p = OpenProgress {
            phase: OpenPhase::Indexing,
            items_processed: 5,
            total_items: Some(20),
            current_item: None,
        };
        assert!((p.fraction().unwrap() - 0.25).abs() < f32::EPSILON);

        let empty = OpenProgress { total_items: Some(0), ..p.clone() };
        assert_eq!(empty.fraction(), Some(1.0));

        let unknown = OpenProgress { total_items: None, ..p };
        assert_eq!(unknown.fraction(), None);
    }

    #[test]
    fn test_report_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p.phase));

        report(Some(&cb), OpenPhase::Indexing, 1, Some(2), Some("MAP01"));
        report(None, OpenPhase::Complete, 2, Some(2), None);

        assert_eq!(*seen.lock().unwrap(), vec![OpenPhase::Indexing]);
    }

    #[test]
    fn test_options_defaults() {
        let opts = OpenOptions::default();
        assert_eq!(opts.load_mode, LoadMode::Lazy);
        assert_eq!(OpenOptions::eager().load_mode, LoadMode::Eager);
        assert_eq!(
            OpenOptions::default().with_name_hint("doom.wad.gz").name_hint.as_deref(),
            Some("doom.wad.gz")
        );
        assert_eq!(WriteOptions::default().compression_level, Level::DEFAULT);
    }
}
