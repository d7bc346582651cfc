//! Common types used across wadforge
//!
//! This module provides the detection vocabulary shared by every format
//! registry: graded confidence and broad format categories.

use serde::{Deserialize, Serialize};

/// How strongly a detector believes a buffer is in its format
///
/// The variants are ordered, so `Confidence::Maybe < Confidence::Certain`.
/// Heuristic detectors stop at `Probably`; only magic-number checks answer
/// `Certain`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// The data is definitely not this format
    #[default]
    NoMatch,
    /// Unlikely, but not ruled out
    Unlikely,
    /// Could be this format
    Maybe,
    /// Very likely this format
    Probably,
    /// Structurally identified
    Certain,
}

impl Confidence {
    /// All levels, weakest first
    pub const ALL: [Confidence; 5] = [
        Confidence::NoMatch,
        Confidence::Unlikely,
        Confidence::Maybe,
        Confidence::Probably,
        Confidence::Certain,
    ];

    /// Numeric score (0, 64, 128, 192, 255)
    pub const fn score(self) -> u8 {
        match self {
            Confidence::NoMatch => 0,
            Confidence::Unlikely => 64,
            Confidence::Maybe => 128,
            Confidence::Probably => 192,
            Confidence::Certain => 255,
        }
    }

    /// Map a raw score onto the nearest level at or below it
    pub const fn from_score(score: u8) -> Self {
        match score {
            0..=63 => Confidence::NoMatch,
            64..=127 => Confidence::Unlikely,
            128..=191 => Confidence::Maybe,
            192..=254 => Confidence::Probably,
            255 => Confidence::Certain,
        }
    }

    /// Whether the detector matched at all
    pub const fn is_match(self) -> bool {
        !matches!(self, Confidence::NoMatch)
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Confidence::NoMatch => "no match",
            Confidence::Unlikely => "unlikely",
            Confidence::Maybe => "maybe",
            Confidence::Probably => "probably",
            Confidence::Certain => "certain",
        };
        f.write_str(name)
    }
}

/// Broad grouping of detectable formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCategory {
    /// Container holding other entries
    Archive,
    /// Picture or texture
    Image,
    /// Sampled sound
    Audio,
    /// Sequenced or tracked music
    Music,
    /// Engine data lump (palettes, texture tables, ...)
    Lump,
    /// 3D model
    Model,
    /// Bitmap font
    Font,
    /// Compiled script bytecode
    Script,
    /// Plain text
    Text,
    /// Not identified
    Unknown,
}

impl std::fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormatCategory::Archive => "archive",
            FormatCategory::Image => "image",
            FormatCategory::Audio => "audio",
            FormatCategory::Music => "music",
            FormatCategory::Lump => "lump",
            FormatCategory::Model => "model",
            FormatCategory::Font => "font",
            FormatCategory::Script => "script",
            FormatCategory::Text => "text",
            FormatCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::NoMatch < Confidence::Unlikely);
        assert!(Confidence::Unlikely < Confidence::Maybe);
        assert!(Confidence::Maybe < Confidence::Probably);
        assert!(Confidence::Probably < Confidence::Certain);
    }

    #[test]
    fn test_score_round_trip() {
        for level in Confidence::ALL {
            assert_eq!(Confidence::from_score(level.score()), level);
        }
    }

    #[test]
    fn test_from_score_rounds_down() {
        assert_eq!(Confidence::from_score(100), Confidence::Unlikely);
        assert_eq!(Confidence::from_score(254), Confidence::Probably);
        assert_eq!(Confidence::from_score(1), Confidence::NoMatch);
    }

    #[test]
    fn test_is_match() {
        assert!(!Confidence::NoMatch.is_match());
        assert!(Confidence::Unlikely.is_match());
    }
}
