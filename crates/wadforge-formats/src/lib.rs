//! wadforge-formats
//!
//! Format detection, container archives and image codecs for legacy game
//! data.
//!
//! # Supported Formats
//!
//! | Kind      | Formats |
//! |-----------|---------|
//! | Archives  | WAD, ZIP/PK3, PAK, GRP, WAD2/WAD3, GOB, gzip/bzip2/xz streams |
//! | Images    | Doom picture, Doom alpha, flat, Quake gfx, Quake miptex, PNG, PCX, IMGZ, DDS, Hexen planar |
//! | Lumps     | PLAYPAL, COLORMAP, ENDOOM, PNAMES, TEXTUREx, ACS, fonts |
//! | Audio     | Doom sound, MUS, MIDI, WAV, OGG, FLAC, MP3, MOD, S3M, XM, IT |
//!
//! # Example
//!
//! ```rust,ignore
//! use wadforge_formats::{OpenOptions, BUILTIN};
//!
//! let bytes = std::fs::read("doom2.wad")?;
//! let mut archive = BUILTIN.archives.open(bytes, OpenOptions::default(), None)?;
//! wadforge_formats::classify_archive(&mut archive)?;
//!
//! for (path, entry) in archive.find("*") {
//!     println!("{path}: {:?}", entry.format_id);
//! }
//! ```

pub mod archive;
pub mod classify;
pub mod compression;
pub mod detect;
pub mod image;
pub mod logging;
pub mod registry;
pub mod traits;

// Re-export main types
pub use traits::{
    ArchiveFormat, Detect, FormatCapabilities, ImageCodec, LoadMode, OpenOptions, OpenPhase, OpenProgress,
    ProgressCallback, Writable, WriteOptions,
};

pub use registry::{
    ArchiveRegistry, Detection, FormatDescriptor, FormatRegistrationBuilder, FormatRegistry, ImageRegistry,
    Registries, RegistryError, BUILTIN, UNKNOWN_ID,
};

pub use archive::{
    Archive, ArchiveDirectory, ArchiveEntry, ArchiveStatistics, EntryId, EntryProps, GobFormat, GrpFormat,
    PakFormat, StreamFormat, StreamKind, TreeNode, Wad2Format, WadFormat, ZipFormat,
};
pub use classify::{classify_archive, Classification, EntryClassifier};
pub use compression::{Codec, Level};
pub use crate::image::convert::{convert, ConvertOptions, TransparencyMode};
pub use crate::image::{Image, ImageInfo, Palette, PixelFormat, TransparencySource};

pub use wadforge_core::{ByteBuffer, Confidence, Error, FormatCategory, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
