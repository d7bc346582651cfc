//! Entry type classification
//!
//! Content detection first; when no detector claims the bytes, the entry's
//! extension is looked up and answered with `Unlikely`.

use serde::Serialize;
use wadforge_core::{Confidence, Result};

use crate::archive::Archive;
use crate::registry::{FormatRegistry, BUILTIN, UNKNOWN_ID};

/// Outcome of classifying one payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub format_id: String,
    pub confidence: Confidence,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            format_id: UNKNOWN_ID.to_string(),
            confidence: Confidence::NoMatch,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.format_id == UNKNOWN_ID
    }
}

/// Classifies payloads against a format registry
#[derive(Debug, Clone, Copy)]
pub struct EntryClassifier<'a> {
    registry: &'a FormatRegistry,
}

impl EntryClassifier<'static> {
    /// Classifier over the shared built-in registry
    pub fn builtin() -> Self {
        Self::new(&BUILTIN.formats)
    }
}

impl<'a> EntryClassifier<'a> {
    pub fn new(registry: &'a FormatRegistry) -> Self {
        Self { registry }
    }

    /// Classify `data`, falling back to the extension of `name`
    pub fn classify(&self, data: &[u8], name: &str) -> Classification {
        let detection = self.registry.detect_with_confidence(data);
        if !detection.descriptor.is_unknown() {
            return Classification {
                format_id: detection.descriptor.id.clone(),
                confidence: detection.confidence,
            };
        }

        let Some((_, ext)) = name.rsplit_once('.').filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty()) else {
            return Classification::unknown();
        };
        match self.registry.for_extension(ext) {
            Ok(found) => found.first().map_or_else(Classification::unknown, |descriptor| Classification {
                format_id: descriptor.id.clone(),
                confidence: Confidence::Unlikely,
            }),
            Err(_) => Classification::unknown(),
        }
    }

    /// Tag every entry's `format_id`; returns how many were recognised
    ///
    /// Entries whose payload cannot be read are tagged unknown.
    pub fn classify_archive(&self, archive: &mut Archive) -> Result<usize> {
        let mut tags = Vec::new();
        for (path, id) in archive.entry_ids() {
            let Some(entry) = archive.get(&id) else {
                continue;
            };
            let classification = match archive.payload(entry) {
                Ok(data) => self.classify(&data, &entry.name),
                Err(e) => {
                    tracing::warn!(entry = %path, error = %e, "cannot read entry for classification");
                    Classification::unknown()
                }
            };
            tracing::trace!(entry = %path, format = %classification.format_id, "classified");
            tags.push((id, classification));
        }

        let mut recognised = 0;
        for (id, classification) in tags {
            if let Some(entry) = archive.get_mut(&id) {
                if !classification.is_unknown() {
                    recognised += 1;
                }
                entry.format_id = Some(classification.format_id);
            }
        }
        tracing::debug!(recognised, total = archive.entry_count(), "archive classified");
        Ok(recognised)
    }
}

/// Tag every entry of `archive` using the built-in registry
pub fn classify_archive(archive: &mut Archive) -> Result<usize> {
    EntryClassifier::builtin().classify_archive(archive)
}
