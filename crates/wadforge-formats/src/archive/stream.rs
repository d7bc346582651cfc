//! Single compressed streams (gzip, bzip2, xz) as one-entry archives
//!
//! The entry spans the whole file and carries the stream codec, so payload
//! loading inflates it like any other compressed entry. gzip records the
//! payload size in its trailer; bzip2 and xz do not, so those are decoded
//! once while opening and keep the result as their loaded payload.

use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use flate2::GzBuilder;
use wadforge_core::buffer::read;
use wadforge_core::{Confidence, Error, Result};

use super::model::read_payload;
use super::{flat_entries, Archive, ArchiveContents, ArchiveEntry, ArchiveProps, EntryProps};
use crate::compression::{self, Codec};
use crate::traits::{ArchiveFormat, Detect, FormatCapabilities, OpenOptions, ProgressCallback, WriteOptions};

const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B, 0x08];
const GZIP_MIN: usize = 18;
const BZIP2_MIN: usize = 10;
const BZIP2_BLOCK: &[u8] = &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
const BZIP2_END: &[u8] = &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
const XZ_MAGIC: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const XZ_MIN: usize = 12;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const FRESERVED: u8 = 0xE0;

/// Stream compression family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Gzip,
    Bzip2,
    Xz,
}

impl StreamKind {
    fn codec(self) -> Codec {
        match self {
            StreamKind::Gzip => Codec::Gzip,
            StreamKind::Bzip2 => Codec::Bzip2,
            StreamKind::Xz => Codec::Lzma,
        }
    }
}

/// What the gzip member header records
#[derive(Debug, Default, PartialEq, Eq)]
struct GzipHeader {
    name: Option<String>,
    mtime: u32,
    isize: u32,
    crc32: u32,
}

/// Walk the optional gzip header fields
fn parse_gzip(data: &[u8]) -> Result<GzipHeader> {
    if data.len() < GZIP_MIN || !read::magic_at(data, 0, GZIP_MAGIC) {
        return Err(Error::malformed("not a gzip member"));
    }
    let flags = data[3];
    if flags & FRESERVED != 0 {
        return Err(Error::malformed(format!("reserved gzip flags set: {flags:#04x}")));
    }

    let mut pos = 10;
    if flags & FEXTRA != 0 {
        let len = read::u16_le(data, pos).ok_or_else(|| Error::truncated(pos, 2, data.len() - pos))?;
        pos += 2 + len as usize;
    }

    // NUL-terminated latin-1 string
    let c_string = |pos: &mut usize| -> Result<String> {
        let rest = data.get(*pos..).unwrap_or_default();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::truncated(*pos, rest.len() + 1, rest.len()))?;
        *pos += end + 1;
        Ok(rest[..end].iter().map(|&b| b as char).collect())
    };

    let name = if flags & FNAME != 0 { Some(c_string(&mut pos)?) } else { None };
    if flags & FCOMMENT != 0 {
        c_string(&mut pos)?;
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }
    if pos + 8 > data.len() {
        return Err(Error::truncated(pos, 8, data.len().saturating_sub(pos)));
    }

    let trailer = data.len() - 8;
    Ok(GzipHeader {
        name: name.filter(|n| !n.is_empty()),
        mtime: read::u32_le(data, 4).unwrap_or(0),
        isize: read::u32_le(data, trailer + 4).unwrap_or(0),
        crc32: read::u32_le(data, trailer).unwrap_or(0),
    })
}

/// Entry name for a stream without a stored one
fn fallback_name(options: &OpenOptions) -> String {
    options
        .name_hint
        .as_deref()
        .and_then(|hint| Path::new(hint).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "data".to_string())
}

/// A single compressed stream presented as a one-entry archive
#[derive(Debug, Clone, Copy)]
pub struct StreamFormat {
    kind: StreamKind,
}

impl StreamFormat {
    pub fn new(kind: StreamKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Detect for StreamFormat {
    fn id(&self) -> &str {
        match self.kind {
            StreamKind::Gzip => "gzip",
            StreamKind::Bzip2 => "bz2",
            StreamKind::Xz => "xz",
        }
    }

    fn reliability(&self) -> u8 {
        u8::MAX
    }

    fn min_size(&self) -> usize {
        match self.kind {
            StreamKind::Gzip => GZIP_MIN,
            StreamKind::Bzip2 => BZIP2_MIN,
            StreamKind::Xz => XZ_MIN,
        }
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < self.min_size() {
            return Confidence::NoMatch;
        }
        match self.kind {
            StreamKind::Gzip if read::magic_at(data, 0, GZIP_MAGIC) => {
                if data[3] & FRESERVED == 0 {
                    Confidence::Certain
                } else {
                    Confidence::Unlikely
                }
            }
            StreamKind::Bzip2
                if read::magic_at(data, 0, b"BZh")
                    && (b'1'..=b'9').contains(&data[3])
                    && (read::magic_at(data, 4, BZIP2_BLOCK) || read::magic_at(data, 4, BZIP2_END)) =>
            {
                Confidence::Certain
            }
            StreamKind::Xz if read::magic_at(data, 0, XZ_MAGIC) => Confidence::Certain,
            _ => Confidence::NoMatch,
        }
    }
}

impl ArchiveFormat for StreamFormat {
    fn name(&self) -> &str {
        match self.kind {
            StreamKind::Gzip => "gzip stream",
            StreamKind::Bzip2 => "bzip2 stream",
            StreamKind::Xz => "xz stream",
        }
    }

    fn extensions(&self) -> &[&str] {
        match self.kind {
            StreamKind::Gzip => &["gz", "tgz"],
            StreamKind::Bzip2 => &["bz2", "tbz2"],
            StreamKind::Xz => &["xz", "txz"],
        }
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            directories: false,
            max_name_len: None,
            compresses: true,
            single_entry: true,
        }
    }

    fn read_directory(
        &self,
        source: &Bytes,
        options: &OpenOptions,
        _progress: Option<&ProgressCallback>,
    ) -> Result<ArchiveContents> {
        if self.test(source) != Confidence::Certain {
            return Err(Error::malformed(format!("not a {}", self.name())));
        }
        let codec = self.kind.codec();
        if !codec.is_available() {
            tracing::warn!(%codec, "codec not built in; the payload will be returned compressed");
        }

        let mut props = EntryProps {
            compression: Some(codec),
            ..EntryProps::default()
        };
        let mut archive_props = ArchiveProps::default();
        let mut name = None;

        if self.kind == StreamKind::Gzip {
            let header = parse_gzip(source)?;
            props.full_size = u64::from(header.isize);
            props.crc32 = Some(header.crc32);
            archive_props.timestamp = (header.mtime != 0).then_some(header.mtime);
            name = header.name;
        }

        let name = name.unwrap_or_else(|| fallback_name(options));
        let mut entry = ArchiveEntry::on_disk(name, 0, source.len() as u64).with_props(props);
        if self.kind != StreamKind::Gzip {
            let data = read_payload(source, &entry, options)?;
            tracing::trace!(entry = %entry.name, size = data.len(), "sized stream by decoding it");
            entry.props.full_size = data.len() as u64;
            entry.set_data(data);
        }

        let mut contents = ArchiveContents {
            props: archive_props,
            ..ArchiveContents::default()
        };
        contents.root.entries.push(entry);
        Ok(contents)
    }

    fn write_archive(&self, archive: &Archive, options: &WriteOptions) -> Result<Vec<u8>> {
        let [entry] = flat_entries(archive)? else {
            return Err(Error::invalid_operation(format!(
                "a {} holds exactly one entry",
                self.name()
            )));
        };

        if !entry.modified && entry.offset_on_disk == 0 && entry.size_on_disk == archive.source().len() as u64 {
            return Ok(archive.raw_bytes(entry)?.to_vec());
        }

        let data = archive.payload(entry)?;
        match self.kind {
            StreamKind::Gzip => {
                let fail = |e: std::io::Error| Error::compression(format!("gzip compression failed: {e}"));
                let level = flate2::Compression::new(u32::from(options.compression_level.value()));
                let mut encoder = GzBuilder::new()
                    .filename(entry.name.as_bytes())
                    .mtime(archive.props().timestamp.unwrap_or(0))
                    .write(Vec::new(), level);
                encoder.write_all(&data).map_err(fail)?;
                encoder.finish().map_err(fail)
            }
            kind => compression::deflate(kind.codec(), &data, options.compression_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::test_support::open;

    fn gzip() -> Arc<dyn ArchiveFormat> {
        Arc::new(StreamFormat::new(StreamKind::Gzip))
    }

    fn gz_bytes(name: Option<&str>, comment: Option<&str>, extra: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
        let mut builder = GzBuilder::new().mtime(1_234_567);
        if let Some(name) = name {
            builder = builder.filename(name);
        }
        if let Some(comment) = comment {
            builder = builder.comment(comment);
        }
        if let Some(extra) = extra {
            builder = builder.extra(extra.to_vec());
        }
        let mut encoder = builder.write(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_header_fields() {
        let bytes = gz_bytes(Some("doom2.wad"), Some("registered"), Some(b"xyz"), b"IWAD");
        let header = parse_gzip(&bytes).unwrap();
        assert_eq!(header.name.as_deref(), Some("doom2.wad"));
        assert_eq!(header.mtime, 1_234_567);
        assert_eq!(header.isize, 4);
        assert_eq!(header.crc32, compression::crc32(b"IWAD"));
    }

    #[test]
    fn test_gzip_entry() {
        let payload = b"PWAD and some more bytes".repeat(10);
        let archive = open(gzip(), gz_bytes(Some("maps.wad"), None, None, &payload));

        assert_eq!(archive.entry_count(), 1);
        let entry = archive.entry("maps.wad").unwrap();
        assert_eq!(entry.props.full_size, payload.len() as u64);
        assert_eq!(entry.props.compression, Some(Codec::Gzip));
        assert_eq!(&archive.entry_data("maps.wad").unwrap()[..], &payload[..]);
        assert_eq!(archive.props().timestamp, Some(1_234_567));
    }

    #[test]
    fn test_name_from_hint() {
        let bytes = gz_bytes(None, None, None, b"text");
        let options = OpenOptions::default().with_name_hint("/tmp/readme.txt.gz");
        let archive = Archive::open(gzip(), Bytes::from(bytes.clone()), options, None).unwrap();
        assert!(archive.entry("readme.txt").is_ok());

        let archive = open(gzip(), bytes);
        assert!(archive.entry("data").is_ok());
    }

    #[test]
    fn test_unmodified_passthrough() {
        let bytes = gz_bytes(Some("a"), Some("note"), None, b"payload");
        let archive = open(gzip(), bytes.clone());
        assert_eq!(archive.write(&WriteOptions::default()).unwrap(), bytes);
    }

    #[test]
    fn test_modified_rewrite() {
        let mut archive = open(gzip(), gz_bytes(Some("a.txt"), None, None, b"old"));
        archive.import_entry_data("a.txt", b"new contents".to_vec()).unwrap();
        let saved = archive.save(&WriteOptions::default()).unwrap();

        assert_eq!(parse_gzip(&saved).unwrap().name.as_deref(), Some("a.txt"));
        assert_eq!(archive.load_entry_data("a.txt").unwrap(), b"new contents");
        assert_eq!(archive.props().timestamp, Some(1_234_567));
    }

    #[test]
    fn test_single_entry_enforced() {
        let mut archive = open(gzip(), gz_bytes(Some("a"), None, None, b"x"));
        let err = archive
            .add_entry("", ArchiveEntry::new("b", vec![1]), None)
            .unwrap_err();
        assert!(matches!(err.root(), Error::InvalidOperation { .. }));

        archive.remove_entry("a").unwrap();
        assert!(archive.write(&WriteOptions::default()).is_err());
    }

    #[test]
    fn test_bzip2_stream() {
        let format: Arc<dyn ArchiveFormat> = Arc::new(StreamFormat::new(StreamKind::Bzip2));
        let mut archive = Archive::new(Arc::clone(&format));
        archive.add_entry("", ArchiveEntry::new("data", b"bzip me".repeat(30)), None).unwrap();
        let bytes = archive.write(&WriteOptions::default()).unwrap();

        assert_eq!(format.test(&bytes), Confidence::Certain);
        let reopened = open(format, bytes);
        assert_eq!(&reopened.entry_data("data").unwrap()[..], &b"bzip me".repeat(30)[..]);
    }

    #[test]
    fn test_bzip2_size_known_when_lazy() {
        let format: Arc<dyn ArchiveFormat> = Arc::new(StreamFormat::new(StreamKind::Bzip2));
        let mut archive = Archive::new(Arc::clone(&format));
        archive.add_entry("", ArchiveEntry::new("e1m1.wad", b"PWAD".repeat(64)), None).unwrap();
        let bytes = archive.write(&WriteOptions::default()).unwrap();

        let lazy = open(Arc::clone(&format), bytes.clone());
        let entry = lazy.entry("data").unwrap();
        assert_eq!(entry.size(), 256);
        assert_eq!(entry.props.full_size, 256);
        assert!(!entry.is_marker());

        let stats = lazy.statistics();
        assert_eq!(stats.marker_count, 0);
        assert_eq!(stats.total_size, 256);

        assert_eq!(lazy.write(&WriteOptions::default()).unwrap(), bytes);
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn test_xz_stream() {
        let format: Arc<dyn ArchiveFormat> = Arc::new(StreamFormat::new(StreamKind::Xz));
        let mut archive = Archive::new(Arc::clone(&format));
        archive.add_entry("", ArchiveEntry::new("data", b"xz".repeat(50)), None).unwrap();
        let bytes = archive.write(&WriteOptions::default()).unwrap();
        assert_eq!(format.test(&bytes), Confidence::Certain);
        assert_eq!(&open(format, bytes).entry_data("data").unwrap()[..], &b"xz".repeat(50)[..]);
    }

    #[test]
    fn test_detection() {
        let gz = StreamFormat::new(StreamKind::Gzip);
        let bz = StreamFormat::new(StreamKind::Bzip2);
        let xz = StreamFormat::new(StreamKind::Xz);
        let bytes = gz_bytes(None, None, None, b"");

        assert_eq!(gz.test(&bytes), Confidence::Certain);
        assert_eq!(bz.test(&bytes), Confidence::NoMatch);
        assert_eq!(gz.test(&bytes[..10]), Confidence::NoMatch);

        let mut reserved = bytes.clone();
        reserved[3] = 0x80;
        assert_eq!(gz.test(&reserved), Confidence::Unlikely);

        assert_eq!(bz.test(b"BZh9\x17\x72\x45\x38\x50\x90\0\0\0\0"), Confidence::Certain);
        assert_eq!(bz.test(b"BZh0\x31\x41\x59\x26\x53\x59"), Confidence::NoMatch);
        assert_eq!(xz.test(b"\xFD7zXZ\0\0\0\0\0\0\0"), Confidence::Certain);
    }
}
