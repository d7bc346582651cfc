//! Integration tests for format detection
//!
//! Covers the built-in registries end to end: short-buffer safety of every
//! detector, deterministic ranking, and the classifier's extension fallback.

use proptest::prelude::*;
use wadforge_formats::detect::builtin_detectors;
use wadforge_formats::{Confidence, EntryClassifier, FormatCategory, Registries, BUILTIN, UNKNOWN_ID};

/// Longest prefix the short-buffer properties bother generating
const PROBE_CAP: usize = 4096;

fn mus_lump() -> Vec<u8> {
    let mut data = b"MUS\x1a".to_vec();
    data.extend_from_slice(&4u16.to_le_bytes()); // score length
    data.extend_from_slice(&16u16.to_le_bytes()); // score start
    data.resize(16, 0);
    data.extend_from_slice(&[0x60, 0, 0, 0]);
    data
}

fn wav_file() -> Vec<u8> {
    let mut data = b"RIFF".to_vec();
    data.extend_from_slice(&36u32.to_le_bytes());
    data.extend_from_slice(b"WAVEfmt ");
    data.resize(44, 0);
    data
}

mod short_buffer_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn sniffers_reject_short_buffers(seed in prop::collection::vec(any::<u8>(), PROBE_CAP)) {
            for sniffer in builtin_detectors() {
                let limit = sniffer.min_size.min(PROBE_CAP);
                for len in 0..limit {
                    prop_assert_eq!((sniffer.test)(&seed[..len]), Confidence::NoMatch, "{} at {}", sniffer.id, len);
                }
            }
        }

        #[test]
        fn codecs_reject_short_buffers(seed in prop::collection::vec(any::<u8>(), 0..PROBE_CAP)) {
            for codec in BUILTIN.images.list() {
                if seed.len() < codec.min_size() {
                    prop_assert_eq!(codec.test(&seed), Confidence::NoMatch, "{}", codec.id());
                }
            }
            for format in BUILTIN.archives.list() {
                if seed.len() < format.min_size() {
                    prop_assert_eq!(format.test(&seed), Confidence::NoMatch, "{}", format.id());
                }
            }
        }

        #[test]
        fn detection_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let first = BUILTIN.formats.detect_with_confidence(&data);
            let second = BUILTIN.formats.detect_with_confidence(&data);
            prop_assert_eq!(&first.descriptor.id, &second.descriptor.id);
            prop_assert_eq!(first.confidence, second.confidence);

            let rebuilt = Registries::builtin();
            prop_assert_eq!(&rebuilt.formats.detect(&data).id, &first.descriptor.id);
        }
    }

    #[test]
    fn test_png_signature_alone_is_not_png() {
        let stub = [0x89, b'P', b'N', b'G'];
        let png = BUILTIN.images.get("png").unwrap();
        assert_eq!(png.test(&stub), Confidence::NoMatch);
        assert_ne!(BUILTIN.formats.detect(&stub).id, "png");

        let mut signature_only = b"\x89PNG\r\n\x1a\n".to_vec();
        signature_only.resize(33, 0);
        assert!(png.test(&signature_only) <= Confidence::Unlikely);
    }

    #[test]
    fn test_empty_buffer_is_unknown() {
        let detection = BUILTIN.formats.detect_with_confidence(&[]);
        assert!(detection.descriptor.is_unknown());
        assert_eq!(detection.confidence, Confidence::NoMatch);
        assert!(BUILTIN.formats.detect_all(&[]).is_empty());
    }
}

mod ranking_tests {
    use super::*;

    #[test]
    fn test_magic_formats_win() {
        assert_eq!(BUILTIN.formats.detect(&mus_lump()).id, "mus");
        assert_eq!(BUILTIN.formats.detect(&wav_file()).id, "wav");
        assert_eq!(BUILTIN.formats.detect(b"MThd\0\0\0\x06\0\x01\0\x02\0\x60").id, "midi");
    }

    #[test]
    fn test_flat_is_last_resort() {
        let flat = vec![0x40u8; 4096];
        let all = BUILTIN.formats.detect_all(&flat);
        assert!(all.iter().any(|(d, _)| d.id == "doom_flat"));

        let best = BUILTIN.formats.detect_with_confidence(&flat);
        let flat_descriptor = BUILTIN.formats.get("doom_flat").unwrap();
        assert!(best.descriptor.reliability >= flat_descriptor.reliability);
    }

    #[test]
    fn test_detect_all_is_sorted() {
        let all = BUILTIN.formats.detect_all(&vec![0u8; 4096]);
        for pair in all.windows(2) {
            let ((a, ca), (b, cb)) = (&pair[0], &pair[1]);
            assert!(ca > cb || (ca == cb && a.reliability >= b.reliability));
        }
    }

    #[test]
    fn test_registry_lookup() {
        let wad = BUILTIN.formats.get("wad").unwrap();
        assert_eq!(wad.category, FormatCategory::Archive);
        assert!(BUILTIN.formats.get("nonexistent").is_err());
        assert!(BUILTIN.formats.get(UNKNOWN_ID).unwrap().is_unknown());

        let pk3: Vec<_> = BUILTIN.formats.for_extension("PK3").unwrap().into_iter().map(|d| d.id.as_str()).collect();
        assert_eq!(pk3, vec!["zip"]);
        assert!(BUILTIN.formats.for_extension("nothing").is_err());
    }
}

mod classify_tests {
    use super::*;

    #[test]
    fn test_content_beats_extension() {
        let classification = EntryClassifier::builtin().classify(&mus_lump(), "D_RUNNIN.mid");
        assert_eq!(classification.format_id, "mus");
        assert_eq!(classification.confidence, Confidence::Certain);
    }

    #[test]
    fn test_extension_fallback_is_unlikely() {
        let classification = EntryClassifier::builtin().classify(&[0xFF, 0x00], "sound.wav");
        assert_eq!(classification.format_id, "wav");
        assert_eq!(classification.confidence, Confidence::Unlikely);
    }

    #[test]
    fn test_no_match_is_unknown() {
        let classification = EntryClassifier::builtin().classify(&[0xFF, 0x00], "LUMP");
        assert!(classification.is_unknown());
        assert_eq!(classification.confidence, Confidence::NoMatch);
    }
}
