//! Built-in payload sniffers
//!
//! Each sniffer is a plain `fn(&[u8]) -> Confidence`: pure, bounds-checked,
//! and never panicking. Formats with a magic number answer `Certain` and
//! carry reliability 255; heuristic sniffers answer at most `Probably` and
//! carry lower reliability so they are only consulted when nothing exact
//! matched.

mod audio;
mod doom;
mod misc;
mod tracker;

pub use audio::{detect_doom_sound, detect_flac, detect_midi, detect_mp3, detect_mus, detect_ogg, detect_wav};
pub use doom::{detect_acs, detect_colormap, detect_endoom, detect_playpal, detect_pnames, detect_texturex};
pub use misc::{detect_fon1, detect_fon2, detect_md2, detect_md3, detect_text};
pub use tracker::{detect_it, detect_mod, detect_s3m, detect_xm};

use wadforge_core::{Confidence, FormatCategory};

use crate::registry::{FormatDescriptor, FormatRegistrationBuilder, RegistryError};

/// Static description of a built-in sniffer
#[derive(Debug, Clone, Copy)]
pub struct Sniffer {
    pub id: &'static str,
    pub name: &'static str,
    pub category: FormatCategory,
    pub reliability: u8,
    pub min_size: usize,
    pub extensions: &'static [&'static str],
    pub test: fn(&[u8]) -> Confidence,
}

impl Sniffer {
    /// Wrap into a registry descriptor
    pub fn into_descriptor(self) -> Result<FormatDescriptor, RegistryError> {
        let test = self.test;
        FormatRegistrationBuilder::new()
            .id(self.id)
            .name(self.name)
            .category(self.category)
            .reliability(self.reliability)
            .min_size(self.min_size)
            .extensions(self.extensions)
            .detector(test)
            .build()
    }
}

/// The built-in sniffers, most specific first
pub fn builtin_detectors() -> Vec<Sniffer> {
    use FormatCategory::{Audio, Font, Lump, Model, Music, Script, Text};

    vec![
        // Magic-number formats
        Sniffer { id: "midi", name: "MIDI", category: Music, reliability: 255, min_size: audio::MIDI_MIN, extensions: &["mid", "midi"], test: detect_midi },
        Sniffer { id: "mus", name: "DMX MUS", category: Music, reliability: 255, min_size: audio::MUS_MIN, extensions: &["mus"], test: detect_mus },
        Sniffer { id: "wav", name: "Wave", category: Audio, reliability: 255, min_size: audio::WAV_MIN, extensions: &["wav"], test: detect_wav },
        Sniffer { id: "ogg", name: "Ogg", category: Audio, reliability: 255, min_size: audio::OGG_MIN, extensions: &["ogg"], test: detect_ogg },
        Sniffer { id: "flac", name: "FLAC", category: Audio, reliability: 255, min_size: audio::FLAC_MIN, extensions: &["flac"], test: detect_flac },
        Sniffer { id: "xm", name: "FastTracker 2 module", category: Music, reliability: 255, min_size: tracker::XM_MIN, extensions: &["xm"], test: detect_xm },
        Sniffer { id: "s3m", name: "ScreamTracker 3 module", category: Music, reliability: 255, min_size: tracker::S3M_MIN, extensions: &["s3m"], test: detect_s3m },
        Sniffer { id: "acs", name: "ACS bytecode", category: Script, reliability: 255, min_size: doom::ACS_MIN, extensions: &["o"], test: detect_acs },
        Sniffer { id: "md2", name: "Quake 2 model", category: Model, reliability: 255, min_size: misc::MD2_MIN, extensions: &["md2"], test: detect_md2 },
        Sniffer { id: "md3", name: "Quake 3 model", category: Model, reliability: 255, min_size: misc::MD3_MIN, extensions: &["md3"], test: detect_md3 },
        Sniffer { id: "font_fon1", name: "FON1 font", category: Font, reliability: 255, min_size: misc::FON1_MIN, extensions: &["fon"], test: detect_fon1 },
        Sniffer { id: "font_fon2", name: "FON2 font", category: Font, reliability: 255, min_size: misc::FON2_MIN, extensions: &["fon2"], test: detect_fon2 },
        // Heuristics, strongest first
        Sniffer { id: "it", name: "Impulse Tracker module", category: Music, reliability: 230, min_size: tracker::IT_MIN, extensions: &["it"], test: detect_it },
        Sniffer { id: "doom_sound", name: "Doom sound", category: Audio, reliability: 200, min_size: audio::DOOM_SOUND_MIN, extensions: &["lmp"], test: detect_doom_sound },
        Sniffer { id: "mod", name: "ProTracker module", category: Music, reliability: 200, min_size: tracker::MOD_MIN, extensions: &["mod"], test: detect_mod },
        Sniffer { id: "pnames", name: "Patch names", category: Lump, reliability: 180, min_size: doom::PNAMES_MIN, extensions: &[], test: detect_pnames },
        Sniffer { id: "texturex", name: "Texture definitions", category: Lump, reliability: 180, min_size: doom::TEXTUREX_MIN, extensions: &[], test: detect_texturex },
        Sniffer { id: "playpal", name: "Palette set", category: Lump, reliability: 160, min_size: doom::PLAYPAL_MIN, extensions: &["pal"], test: detect_playpal },
        Sniffer { id: "mp3", name: "MPEG audio", category: Audio, reliability: 120, min_size: audio::MP3_MIN, extensions: &["mp3"], test: detect_mp3 },
        Sniffer { id: "colormap", name: "Colour map", category: Lump, reliability: 120, min_size: doom::COLORMAP_SIZE, extensions: &[], test: detect_colormap },
        Sniffer { id: "endoom", name: "ENDOOM screen", category: Lump, reliability: 100, min_size: doom::ENDOOM_SIZE, extensions: &[], test: detect_endoom },
        Sniffer { id: "text", name: "Text", category: Text, reliability: 10, min_size: misc::TEXT_MIN, extensions: &["txt", "cfg", "deh", "bex"], test: detect_text },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ids_unique() {
        let sniffers = builtin_detectors();
        let mut ids: Vec<_> = sniffers.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), sniffers.len());
    }

    #[test]
    fn test_exact_sniffers_registered_first() {
        let sniffers = builtin_detectors();
        let first_heuristic = sniffers.iter().position(|s| s.reliability < 255).unwrap();
        assert!(sniffers[first_heuristic..].iter().all(|s| s.reliability < 255));
        assert!(sniffers.windows(2).skip(first_heuristic).all(|w| w[0].reliability >= w[1].reliability));
    }

    #[test]
    fn test_empty_buffer_never_matches() {
        for sniffer in builtin_detectors() {
            assert_eq!((sniffer.test)(&[]), Confidence::NoMatch, "{}", sniffer.id);
        }
    }

    proptest! {
        #[test]
        fn short_buffers_never_match(seed in prop::collection::vec(any::<u8>(), 0..2048)) {
            for sniffer in builtin_detectors() {
                let cut = seed.len().min(sniffer.min_size.saturating_sub(1));
                prop_assert_eq!((sniffer.test)(&seed[..cut]), Confidence::NoMatch, "{}", sniffer.id);
            }
        }

        #[test]
        fn sniffers_never_panic(data in prop::collection::vec(any::<u8>(), 0..4096)) {
            for sniffer in builtin_detectors() {
                let _ = (sniffer.test)(&data);
            }
        }
    }
}
