//! Format registries and confidence-ranked detection.
//!
//! Three registries share one ranking rule:
//! - [`FormatRegistry`] holds plain descriptors for every detectable payload
//!   (lumps, sounds, and wrapped archive/image formats)
//! - [`ArchiveRegistry`] holds container formats
//! - [`ImageRegistry`] holds image codecs
//!
//! Registration is explicit and ordered; [`Registries::builtin`] builds the
//! standard set once.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use thiserror::Error;
use wadforge_core::{Confidence, Error, FormatCategory, Result};

use crate::archive::{self, Archive};
use crate::detect;
use crate::image::{self, Image};
use crate::traits::{ArchiveFormat, Detect, ImageCodec, OpenOptions, ProgressCallback};

/// Errors raised while building or querying a registry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Format already registered: {0}")]
    DuplicateId(String),

    #[error("Format not found: {0}")]
    NotFound(String),

    #[error("Registration is missing required field: {0}")]
    MissingField(&'static str),

    #[error("No format registered for extension: {0}")]
    NoFormatForExtension(String),
}

/// Boxed detector function
pub type DetectFn = Box<dyn Fn(&[u8]) -> Confidence + Send + Sync>;

/// Identifier of the sentinel returned when nothing matches
pub const UNKNOWN_ID: &str = "unknown";

/// A registered detectable format
pub struct FormatDescriptor {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Broad grouping
    pub category: FormatCategory,
    /// Scan priority; 255 marks magic-number exact formats
    pub reliability: u8,
    /// Shortest buffer that can possibly match
    pub min_size: usize,
    /// File extensions (lowercase)
    pub extensions: Vec<String>,
    detector: DetectFn,
}

impl FormatDescriptor {
    fn unknown() -> Self {
        Self {
            id: UNKNOWN_ID.to_string(),
            name: "Unknown data".to_string(),
            category: FormatCategory::Unknown,
            reliability: 0,
            min_size: 0,
            extensions: Vec::new(),
            detector: Box::new(|_| Confidence::NoMatch),
        }
    }

    /// Whether this is the "no semantic type" sentinel
    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_ID
    }
}

impl Detect for FormatDescriptor {
    fn id(&self) -> &str {
        &self.id
    }

    fn reliability(&self) -> u8 {
        self.reliability
    }

    fn min_size(&self) -> usize {
        self.min_size
    }

    fn test(&self, data: &[u8]) -> Confidence {
        if data.len() < self.min_size {
            return Confidence::NoMatch;
        }
        (self.detector)(data)
    }
}

impl std::fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("reliability", &self.reliability)
            .field("min_size", &self.min_size)
            .finish_non_exhaustive()
    }
}

/// Pick the best match among `candidates`, in registration order
///
/// A candidate whose reliability is below the current best's is skipped.
/// It replaces the best when its confidence is higher, or equal with a
/// higher reliability; otherwise the earlier registration wins. A `Certain`
/// answer from a reliability-255 candidate ends the scan.
pub fn select_best<'a, T, I>(candidates: I, data: &[u8]) -> Option<(&'a T, Confidence)>
where
    T: Detect + ?Sized + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<(&'a T, Confidence)> = None;

    for candidate in candidates {
        if let Some((current, _)) = best {
            if candidate.reliability() < current.reliability() {
                continue;
            }
        }

        let confidence = candidate.test(data);
        if !confidence.is_match() {
            continue;
        }

        let better = match best {
            None => true,
            Some((current, current_confidence)) => {
                confidence > current_confidence
                    || (confidence == current_confidence
                        && candidate.reliability() > current.reliability())
            }
        };

        if better {
            best = Some((candidate, confidence));
            if confidence == Confidence::Certain && candidate.reliability() == u8::MAX {
                break;
            }
        }
    }

    best
}

/// Every match, strongest first (confidence, then reliability, then order)
fn rank_all<'a, T, I>(candidates: I, data: &[u8]) -> Vec<(&'a T, Confidence)>
where
    T: Detect + ?Sized + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut matches: Vec<(&'a T, Confidence)> = candidates
        .into_iter()
        .map(|c| (c, c.test(data)))
        .filter(|(_, confidence)| confidence.is_match())
        .collect();
    matches.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then(b.reliability().cmp(&a.reliability())));
    matches
}

/// Result of a detection pass
#[derive(Debug, Clone, Copy)]
pub struct Detection<'a> {
    /// Winning descriptor, or the unknown sentinel
    pub descriptor: &'a FormatDescriptor,
    /// Its answer
    pub confidence: Confidence,
}

/// Ordered list of format descriptors
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
    index: HashMap<String, usize>,
    extension_map: HashMap<String, Vec<usize>>,
    unknown: FormatDescriptor,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.descriptors.iter().map(|d| d.id.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FormatRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
            extension_map: HashMap::new(),
            unknown: FormatDescriptor::unknown(),
        }
    }

    /// Append a descriptor; later registrations lose ties
    pub fn register(&mut self, descriptor: FormatDescriptor) -> std::result::Result<(), RegistryError> {
        if descriptor.id == UNKNOWN_ID || self.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateId(descriptor.id));
        }

        let position = self.descriptors.len();
        for ext in &descriptor.extensions {
            self.extension_map
                .entry(ext.to_lowercase())
                .or_default()
                .push(position);
        }
        self.index.insert(descriptor.id.clone(), position);
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Descriptor by id
    pub fn get(&self, id: &str) -> std::result::Result<&FormatDescriptor, RegistryError> {
        if id == UNKNOWN_ID {
            return Ok(&self.unknown);
        }
        self.index
            .get(id)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Descriptors claiming an extension, most reliable first
    pub fn for_extension(&self, ext: &str) -> std::result::Result<Vec<&FormatDescriptor>, RegistryError> {
        let ext_lower = ext.trim_start_matches('.').to_lowercase();
        let mut found: Vec<&FormatDescriptor> = self
            .extension_map
            .get(&ext_lower)
            .map(|ids| ids.iter().map(|&i| &self.descriptors[i]).collect())
            .unwrap_or_default();
        if found.is_empty() {
            return Err(RegistryError::NoFormatForExtension(ext_lower));
        }
        found.sort_by(|a, b| b.reliability.cmp(&a.reliability));
        Ok(found)
    }

    /// The unknown sentinel
    pub fn unknown(&self) -> &FormatDescriptor {
        &self.unknown
    }

    /// Best descriptor for `data`; the unknown sentinel if nothing matches
    pub fn detect(&self, data: &[u8]) -> &FormatDescriptor {
        self.detect_with_confidence(data).descriptor
    }

    /// Best descriptor plus its confidence
    pub fn detect_with_confidence(&self, data: &[u8]) -> Detection<'_> {
        match select_best(self.descriptors.iter(), data) {
            Some((descriptor, confidence)) => Detection { descriptor, confidence },
            None => Detection {
                descriptor: &self.unknown,
                confidence: Confidence::NoMatch,
            },
        }
    }

    /// Every matching descriptor, strongest first
    pub fn detect_all(&self, data: &[u8]) -> Vec<(&FormatDescriptor, Confidence)> {
        rank_all(self.descriptors.iter(), data)
    }

    /// Registered descriptors in registration order
    pub fn list(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for descriptor registrations
#[derive(Default)]
pub struct FormatRegistrationBuilder {
    id: Option<String>,
    name: Option<String>,
    category: Option<FormatCategory>,
    reliability: u8,
    min_size: usize,
    extensions: Vec<String>,
    detector: Option<DetectFn>,
}

impl FormatRegistrationBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            reliability: u8::MAX,
            ..Self::default()
        }
    }

    /// Set the format ID
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the category
    pub fn category(mut self, category: FormatCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the reliability (defaults to 255)
    pub fn reliability(mut self, reliability: u8) -> Self {
        self.reliability = reliability;
        self
    }

    /// Set the minimum buffer size
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the claimed file extensions
    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Set the detector
    pub fn detector<F>(mut self, detector: F) -> Self
    where
        F: Fn(&[u8]) -> Confidence + Send + Sync + 'static,
    {
        self.detector = Some(Box::new(detector));
        self
    }

    /// Build the descriptor
    pub fn build(self) -> std::result::Result<FormatDescriptor, RegistryError> {
        let id = self.id.ok_or(RegistryError::MissingField("id"))?;
        Ok(FormatDescriptor {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            category: self.category.ok_or(RegistryError::MissingField("category"))?,
            reliability: self.reliability,
            min_size: self.min_size,
            extensions: self.extensions,
            detector: self.detector.ok_or(RegistryError::MissingField("detector"))?,
        })
    }
}

/// Container formats in registration order
#[derive(Default)]
pub struct ArchiveRegistry {
    formats: Vec<Arc<dyn ArchiveFormat>>,
}

impl ArchiveRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a format
    pub fn register(&mut self, format: Arc<dyn ArchiveFormat>) -> std::result::Result<(), RegistryError> {
        if self.formats.iter().any(|f| f.id() == format.id()) {
            return Err(RegistryError::DuplicateId(format.id().to_string()));
        }
        self.formats.push(format);
        Ok(())
    }

    /// Format by id
    pub fn get(&self, id: &str) -> std::result::Result<Arc<dyn ArchiveFormat>, RegistryError> {
        self.formats
            .iter()
            .find(|f| f.id() == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Best container format for `data`
    pub fn detect(&self, data: &[u8]) -> Option<(Arc<dyn ArchiveFormat>, Confidence)> {
        select_best(self.formats.iter().map(|f| f.as_ref()), data)
            .and_then(|(found, confidence)| {
                self.formats
                    .iter()
                    .find(|f| f.id() == found.id())
                    .map(|f| (Arc::clone(f), confidence))
            })
    }

    /// Detect the container and open it
    pub fn open(
        &self,
        source: impl Into<Bytes>,
        options: OpenOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<Archive> {
        let source = source.into();
        let (format, _) = self
            .detect(&source)
            .ok_or_else(|| Error::unsupported("data is not a recognised container"))?;
        Archive::open(format, source, options, progress)
    }

    /// Registered formats in registration order
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn ArchiveFormat>> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Image codecs in registration order
#[derive(Default)]
pub struct ImageRegistry {
    codecs: Vec<Arc<dyn ImageCodec>>,
}

impl ImageRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a codec
    pub fn register(&mut self, codec: Arc<dyn ImageCodec>) -> std::result::Result<(), RegistryError> {
        if self.codecs.iter().any(|c| c.id() == codec.id()) {
            return Err(RegistryError::DuplicateId(codec.id().to_string()));
        }
        self.codecs.push(codec);
        Ok(())
    }

    /// Codec by id
    pub fn get(&self, id: &str) -> std::result::Result<Arc<dyn ImageCodec>, RegistryError> {
        self.codecs
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Best codec for `data`
    pub fn detect(&self, data: &[u8]) -> Option<(Arc<dyn ImageCodec>, Confidence)> {
        select_best(self.codecs.iter().map(|c| c.as_ref()), data)
            .and_then(|(found, confidence)| {
                self.codecs
                    .iter()
                    .find(|c| c.id() == found.id())
                    .map(|c| (Arc::clone(c), confidence))
            })
    }

    /// Detect the codec and decode
    pub fn decode(&self, data: &[u8]) -> Result<Image> {
        let (codec, _) = self
            .detect(data)
            .ok_or_else(|| Error::unsupported("data is not a recognised image"))?;
        codec.decode(data)
    }

    /// Registered codecs in registration order
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn ImageCodec>> {
        self.codecs.iter()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

/// The three registries built together
pub struct Registries {
    /// Every detectable payload
    pub formats: FormatRegistry,
    /// Container formats
    pub archives: ArchiveRegistry,
    /// Image codecs
    pub images: ImageRegistry,
}

impl Registries {
    /// Build the standard registries in their fixed order
    pub fn builtin() -> Self {
        let mut archives = ArchiveRegistry::new();
        for format in archive::builtin_formats() {
            if let Err(e) = archives.register(format) {
                tracing::error!(error = %e, "skipping archive format");
            }
        }

        let mut images = ImageRegistry::new();
        for codec in image::builtin_codecs() {
            if let Err(e) = images.register(codec) {
                tracing::error!(error = %e, "skipping image codec");
            }
        }

        let mut formats = FormatRegistry::new();
        for descriptor in builtin_descriptors(&archives, &images) {
            if let Err(e) = formats.register(descriptor) {
                tracing::error!(error = %e, "skipping format descriptor");
            }
        }

        tracing::debug!(
            formats = formats.len(),
            archives = archives.len(),
            images = images.len(),
            "registries built"
        );

        Self { formats, archives, images }
    }
}

/// Shared read-only instance of [`Registries::builtin`]
pub static BUILTIN: Lazy<Registries> = Lazy::new(Registries::builtin);

/// Descriptor wrapping a container format
fn archive_descriptor(format: &Arc<dyn ArchiveFormat>) -> std::result::Result<FormatDescriptor, RegistryError> {
    let inner = Arc::clone(format);
    FormatRegistrationBuilder::new()
        .id(format.id())
        .name(format.name())
        .category(FormatCategory::Archive)
        .reliability(format.reliability())
        .min_size(format.min_size())
        .extensions(format.extensions())
        .detector(move |data| inner.test(data))
        .build()
}

/// Descriptor wrapping an image codec
fn image_descriptor(codec: &Arc<dyn ImageCodec>) -> std::result::Result<FormatDescriptor, RegistryError> {
    let inner = Arc::clone(codec);
    FormatRegistrationBuilder::new()
        .id(codec.id())
        .name(codec.name())
        .category(FormatCategory::Image)
        .reliability(codec.reliability())
        .min_size(codec.min_size())
        .extensions(&[codec.extension()])
        .detector(move |data| inner.test(data))
        .build()
}

/// All descriptors in scan order: exact formats first, heuristics after,
/// generic fallbacks last
fn builtin_descriptors(archives: &ArchiveRegistry, images: &ImageRegistry) -> Vec<FormatDescriptor> {
    let mut out = Vec::new();
    let mut push = |built: std::result::Result<FormatDescriptor, RegistryError>| match built {
        Ok(descriptor) => out.push(descriptor),
        Err(e) => tracing::error!(error = %e, "invalid builtin descriptor"),
    };

    for format in archives.list() {
        push(archive_descriptor(format));
    }

    let (exact_images, heuristic_images): (Vec<_>, Vec<_>) =
        images.list().partition(|c| c.reliability() == u8::MAX);
    for codec in exact_images {
        push(image_descriptor(codec));
    }

    let (exact_lumps, heuristic_lumps): (Vec<_>, Vec<_>) = detect::builtin_detectors()
        .into_iter()
        .partition(|d| d.reliability == u8::MAX);
    for lump in exact_lumps {
        push(lump.into_descriptor());
    }

    let mut rest: Vec<Pending> = heuristic_images
        .into_iter()
        .map(Pending::Image)
        .chain(heuristic_lumps.into_iter().map(Pending::Lump))
        .collect();
    // stable: equal reliabilities keep image-before-lump order
    rest.sort_by(|a, b| b.reliability().cmp(&a.reliability()));
    for entry in rest {
        match entry {
            Pending::Image(codec) => push(image_descriptor(codec)),
            Pending::Lump(lump) => push(lump.into_descriptor()),
        }
    }

    out
}

enum Pending<'a> {
    Image(&'a Arc<dyn ImageCodec>),
    Lump(detect::Sniffer),
}

impl Pending<'_> {
    fn reliability(&self) -> u8 {
        match self {
            Pending::Image(codec) => codec.reliability(),
            Pending::Lump(lump) => lump.reliability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, reliability: u8, answer: Confidence) -> FormatDescriptor {
        FormatRegistrationBuilder::new()
            .id(id)
            .category(FormatCategory::Lump)
            .reliability(reliability)
            .detector(move |_| answer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_fields() {
        let err = FormatRegistrationBuilder::new()
            .category(FormatCategory::Lump)
            .detector(|_| Confidence::NoMatch)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingField("id"));

        let err = FormatRegistrationBuilder::new().id("x").category(FormatCategory::Lump).build().unwrap_err();
        assert_eq!(err, RegistryError::MissingField("detector"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("a", 10, Confidence::Maybe)).unwrap();
        let err = registry.register(descriptor("a", 20, Confidence::Maybe)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("a".into()));
        assert!(registry.register(descriptor(UNKNOWN_ID, 1, Confidence::Maybe)).is_err());
    }

    #[test]
    fn test_unknown_sentinel() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("never", 255, Confidence::NoMatch)).unwrap();
        let found = registry.detect(b"abc");
        assert!(found.is_unknown());
        assert_eq!(registry.get(UNKNOWN_ID).unwrap().id, UNKNOWN_ID);
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("first", 100, Confidence::Maybe)).unwrap();
        registry.register(descriptor("second", 100, Confidence::Maybe)).unwrap();
        assert_eq!(registry.detect(b"x").id, "first");
    }

    #[test]
    fn test_higher_confidence_replaces() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("weak", 100, Confidence::Unlikely)).unwrap();
        registry.register(descriptor("strong", 100, Confidence::Probably)).unwrap();
        let detection = registry.detect_with_confidence(b"x");
        assert_eq!(detection.descriptor.id, "strong");
        assert_eq!(detection.confidence, Confidence::Probably);
    }

    #[test]
    fn test_less_reliable_candidates_skipped() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("specific", 200, Confidence::Maybe)).unwrap();
        registry.register(descriptor("generic", 50, Confidence::Probably)).unwrap();
        assert_eq!(registry.detect(b"x").id, "specific");
    }

    #[test]
    fn test_equal_confidence_higher_reliability_replaces() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("low", 10, Confidence::Maybe)).unwrap();
        registry.register(descriptor("high", 90, Confidence::Maybe)).unwrap();
        assert_eq!(registry.detect(b"x").id, "high");
    }

    #[test]
    fn test_certain_stops_scan() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut registry = FormatRegistry::new();
        registry.register(descriptor("exact", 255, Confidence::Certain)).unwrap();
        registry
            .register(
                FormatRegistrationBuilder::new()
                    .id("later")
                    .category(FormatCategory::Lump)
                    .detector(|_| {
                        CALLS.fetch_add(1, Ordering::SeqCst);
                        Confidence::Certain
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(registry.detect(b"x").id, "exact");
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_min_size_enforced() {
        let mut registry = FormatRegistry::new();
        registry
            .register(
                FormatRegistrationBuilder::new()
                    .id("sized")
                    .category(FormatCategory::Lump)
                    .min_size(4)
                    .detector(|_| Confidence::Certain)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(registry.detect(b"abc").is_unknown());
        assert_eq!(registry.detect(b"abcd").id, "sized");
    }

    #[test]
    fn test_detect_all_ranked() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("maybe", 100, Confidence::Maybe)).unwrap();
        registry.register(descriptor("none", 100, Confidence::NoMatch)).unwrap();
        registry.register(descriptor("certain", 50, Confidence::Certain)).unwrap();
        let ids: Vec<_> = registry.detect_all(b"x").iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["certain", "maybe"]);
    }

    #[test]
    fn test_extension_lookup() {
        let mut registry = FormatRegistry::new();
        registry
            .register(
                FormatRegistrationBuilder::new()
                    .id("wad")
                    .category(FormatCategory::Archive)
                    .extensions(&["WAD"])
                    .detector(|_| Confidence::NoMatch)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(registry.for_extension(".wad").unwrap()[0].id, "wad");
        assert!(matches!(
            registry.for_extension("zip"),
            Err(RegistryError::NoFormatForExtension(_))
        ));
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = FormatRegistry::new();
        registry.register(descriptor("lump_a", 10, Confidence::Probably)).unwrap();
        assert_eq!(format!("{registry:?}"), "FormatRegistry { formats: [\"lump_a\"], .. }");
    }

    #[test]
    fn test_builtin_has_unique_ids() {
        let built = Registries::builtin();
        let total = archive::builtin_formats().len()
            + crate::image::builtin_codecs().len()
            + detect::builtin_detectors().len();
        assert_eq!(built.formats.len(), total);
        assert!(!built.archives.is_empty());
        assert!(!built.images.is_empty());
    }
}
