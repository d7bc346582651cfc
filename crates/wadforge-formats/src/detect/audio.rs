//! Sampled-audio and sequenced-music sniffers

use wadforge_core::buffer::read;
use wadforge_core::Confidence;

pub(crate) const MIDI_MIN: usize = 14;
pub(crate) const MUS_MIN: usize = 16;
pub(crate) const WAV_MIN: usize = 12;
pub(crate) const OGG_MIN: usize = 27;
pub(crate) const FLAC_MIN: usize = 8;
pub(crate) const MP3_MIN: usize = 10;
pub(crate) const DOOM_SOUND_MIN: usize = 8;

/// Standard MIDI file: `MThd` chunk of length 6
pub fn detect_midi(data: &[u8]) -> Confidence {
    if data.len() < MIDI_MIN || !read::magic_at(data, 0, b"MThd") {
        return Confidence::NoMatch;
    }
    match read::u32_be(data, 4) {
        Some(6) => Confidence::Certain,
        _ => Confidence::Unlikely,
    }
}

/// DMX MUS: `MUS\x1A`, then score length and score start
pub fn detect_mus(data: &[u8]) -> Confidence {
    if data.len() < MUS_MIN || !read::magic_at(data, 0, b"MUS\x1a") {
        return Confidence::NoMatch;
    }
    let (Some(score_len), Some(score_start)) = (read::u16_le(data, 4), read::u16_le(data, 6)) else {
        return Confidence::NoMatch;
    };
    let score_end = usize::from(score_start) + usize::from(score_len);
    if usize::from(score_start) >= MUS_MIN && score_end <= data.len() {
        Confidence::Certain
    } else {
        Confidence::Unlikely
    }
}

/// RIFF WAVE
pub fn detect_wav(data: &[u8]) -> Confidence {
    if data.len() >= WAV_MIN && read::magic_at(data, 0, b"RIFF") && read::magic_at(data, 8, b"WAVE") {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// Ogg page with stream structure version 0
pub fn detect_ogg(data: &[u8]) -> Confidence {
    if data.len() >= OGG_MIN && read::magic_at(data, 0, b"OggS") && read::u8(data, 4) == Some(0) {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// Native FLAC stream
pub fn detect_flac(data: &[u8]) -> Confidence {
    if data.len() >= FLAC_MIN && read::magic_at(data, 0, b"fLaC") {
        Confidence::Certain
    } else {
        Confidence::NoMatch
    }
}

/// MPEG audio with a leading ID3v2 tag
///
/// Bare frame-sync detection is left out; too many raw lumps start with
/// 0xFFEx by chance.
pub fn detect_mp3(data: &[u8]) -> Confidence {
    if data.len() < MP3_MIN || !read::magic_at(data, 0, b"ID3") {
        return Confidence::NoMatch;
    }
    match read::u8(data, 3) {
        Some(2..=4) => Confidence::Probably,
        _ => Confidence::NoMatch,
    }
}

/// Doom digitized sound: format 3, sample rate, sample count
pub fn detect_doom_sound(data: &[u8]) -> Confidence {
    if data.len() < DOOM_SOUND_MIN {
        return Confidence::NoMatch;
    }
    let (Some(format), Some(rate), Some(samples)) =
        (read::u16_le(data, 0), read::u16_le(data, 2), read::u32_le(data, 4))
    else {
        return Confidence::NoMatch;
    };

    if format != 3 || !(4000..=48000).contains(&rate) || samples == 0 {
        return Confidence::NoMatch;
    }
    match (samples as usize).checked_add(DOOM_SOUND_MIN) {
        Some(end) if end <= data.len() => Confidence::Probably,
        _ => Confidence::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi() {
        let mut data = b"MThd\0\0\0\x06\0\x01\0\x02\0\x60".to_vec();
        assert_eq!(detect_midi(&data), Confidence::Certain);
        data[7] = 7;
        assert_eq!(detect_midi(&data), Confidence::Unlikely);
        assert_eq!(detect_midi(&data[..10]), Confidence::NoMatch);
    }

    #[test]
    fn test_mus() {
        let mut data = b"MUS\x1a".to_vec();
        data.extend_from_slice(&4u16.to_le_bytes()); // score length
        data.extend_from_slice(&16u16.to_le_bytes()); // score start
        data.resize(20, 0);
        assert_eq!(detect_mus(&data), Confidence::Certain);

        data[4] = 200; // score runs past the end
        assert_eq!(detect_mus(&data), Confidence::Unlikely);
    }

    #[test]
    fn test_wav_ogg_flac() {
        assert_eq!(detect_wav(b"RIFF\x24\0\0\0WAVEfmt "), Confidence::Certain);
        assert_eq!(detect_wav(b"RIFF\x24\0\0\0AVI LIST"), Confidence::NoMatch);

        let mut ogg = b"OggS\0".to_vec();
        ogg.resize(OGG_MIN, 0);
        assert_eq!(detect_ogg(&ogg), Confidence::Certain);
        ogg[4] = 1;
        assert_eq!(detect_ogg(&ogg), Confidence::NoMatch);

        assert_eq!(detect_flac(b"fLaC\0\0\0\x22"), Confidence::Certain);
    }

    #[test]
    fn test_mp3_requires_tag() {
        assert_eq!(detect_mp3(b"ID3\x03\0\0\0\0\0\0"), Confidence::Probably);
        assert_eq!(detect_mp3(b"\xff\xfb\x90\x64\0\0\0\0\0\0"), Confidence::NoMatch);
    }

    #[test]
    fn test_doom_sound() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&11025u16.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0x80; 4]);
        assert_eq!(detect_doom_sound(&data), Confidence::Probably);

        // sample count larger than the lump
        data[4] = 5;
        assert_eq!(detect_doom_sound(&data), Confidence::NoMatch);

        data[4] = 4;
        data[2..4].copy_from_slice(&100u16.to_le_bytes());
        assert_eq!(detect_doom_sound(&data), Confidence::NoMatch);
    }
}
