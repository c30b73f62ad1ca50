//! Note names, the equal-tempered tuning table, and the chord vocabulary
//! shared by detection and playback.

use std::fmt::{self, Display};
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of semitones in an octave.
pub const SEMITONES: usize = 12;

/// MIDI number of middle C, the fallback for unrecognized note names.
pub const MIDDLE_C: u8 = 60;

/// MIDI notes of the C-major triad, the fallback for unrecognized chords.
pub const C_MAJOR_TRIAD: [u8; 3] = [60, 64, 67];

/// Lowest octave covered by the tuning table.
const LOWEST_OCTAVE: u8 = 1;

/// Highest octave covered by the tuning table.
const HIGHEST_OCTAVE: u8 = 8;

/// Twelve chromatic pitch classes, sharp spelling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    /// C
    C,
    /// C sharp / D flat
    #[serde(rename = "C#")]
    Cs,
    /// D
    D,
    /// D sharp / E flat
    #[serde(rename = "D#")]
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    #[serde(rename = "F#")]
    Fs,
    /// G
    G,
    /// G sharp / A flat
    #[serde(rename = "G#")]
    Gs,
    /// A
    A,
    /// A sharp / B flat
    #[serde(rename = "A#")]
    As,
    /// B
    B,
}

impl PitchClass {
    /// All pitch classes in ascending chromatic order.
    pub const ALL: [PitchClass; SEMITONES] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    /// The seven natural (unsharped) pitch classes in letter order.
    pub const NATURALS: [PitchClass; 7] = [
        PitchClass::C,
        PitchClass::D,
        PitchClass::E,
        PitchClass::F,
        PitchClass::G,
        PitchClass::A,
        PitchClass::B,
    ];

    /// Semitone offset from C (0..=11).
    pub const fn semitone(self) -> u8 {
        self as u8
    }

    /// Pitch class for a semitone count; wraps modulo the octave.
    pub const fn from_semitone(semitone: u8) -> PitchClass {
        Self::ALL[(semitone as usize) % SEMITONES]
    }

    const fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }
}

impl Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_pitch_class(s) {
            Some((pc, "")) => Ok(pc),
            _ => Err(NameError::UnknownPitchClass(s.to_string())),
        }
    }
}

/// Split a leading pitch-class name (sharp or flat spelling) off a string.
fn split_pitch_class(s: &str) -> Option<(PitchClass, &str)> {
    let mut chars = s.chars();
    let letter = chars.next()?;
    let natural = match letter {
        'C' => 0u8,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    match chars.clone().next() {
        Some('#') => Some((PitchClass::from_semitone(natural + 1), chars.as_str())),
        Some('b') => Some((
            PitchClass::from_semitone(natural.wrapping_add(11)),
            chars.as_str(),
        )),
        _ => Some((PitchClass::from_semitone(natural), chars.as_str())),
    }
}

/// Errors when parsing note or chord names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The string does not begin with a recognizable pitch class.
    #[error("unrecognized pitch class in `{0}`")]
    UnknownPitchClass(String),

    /// The trailing characters are not a supported octave or quality.
    #[error("unrecognized suffix `{suffix}` in `{name}`")]
    UnknownSuffix {
        /// The full name being parsed.
        name: String,
        /// The suffix that failed to parse.
        suffix: String,
    },
}

/// A named note with its equal-tempered frequency.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Note {
    /// Pitch class of the note.
    pub pitch_class: PitchClass,
    /// Scientific octave number (C4 is middle C).
    pub octave: u8,
    /// MIDI note number (A4 = 69).
    pub midi: u8,
    /// Frequency in Hz at A4 = 440 Hz.
    pub frequency_hz: f32,
}

impl Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

static NOTE_TABLE: Lazy<Vec<Note>> = Lazy::new(|| {
    let mut table = Vec::with_capacity(SEMITONES * (HIGHEST_OCTAVE - LOWEST_OCTAVE + 1) as usize);
    for octave in LOWEST_OCTAVE..=HIGHEST_OCTAVE {
        for pc in PitchClass::ALL {
            let midi = (octave + 1) * SEMITONES as u8 + pc.semitone();
            let frequency_hz = 440.0 * 2f32.powf((midi as f32 - 69.0) / 12.0);
            table.push(Note {
                pitch_class: pc,
                octave,
                midi,
                frequency_hz,
            });
        }
    }
    table
});

/// The immutable tuning table covering octaves 1 through 8.
pub fn note_table() -> &'static [Note] {
    &NOTE_TABLE
}

/// Nearest table note to `frequency_hz` by octave-relative distance.
///
/// Returns `None` when the closest entry is farther than `max_log2_distance`
/// in log2-frequency space, or when the frequency is not positive.
pub fn nearest_note(frequency_hz: f32, max_log2_distance: f32) -> Option<&'static Note> {
    if frequency_hz <= 0.0 {
        return None;
    }
    let mut best: Option<(&'static Note, f32)> = None;
    for note in note_table() {
        let distance = (frequency_hz / note.frequency_hz).log2().abs();
        if distance < max_log2_distance && best.map_or(true, |(_, d)| distance < d) {
            best = Some((note, distance));
        }
    }
    best.map(|(note, _)| note)
}

/// Chord qualities recognized by detection and playback.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChordQuality {
    /// Major triad (e.g. C-E-G)
    Major,
    /// Minor triad (e.g. C-Eb-G)
    Minor,
    /// Dominant seventh (e.g. C-E-G-Bb)
    DominantSeventh,
    /// Minor seventh (e.g. C-Eb-G-Bb)
    MinorSeventh,
    /// Major seventh (e.g. C-E-G-B)
    MajorSeventh,
}

impl ChordQuality {
    /// Qualities in dictionary order.
    pub const ALL: [ChordQuality; 5] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::DominantSeventh,
        ChordQuality::MinorSeventh,
        ChordQuality::MajorSeventh,
    ];

    /// Semitone offsets from the root.
    pub const fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
            ChordQuality::MinorSeventh => &[0, 3, 7, 10],
            ChordQuality::MajorSeventh => &[0, 4, 7, 11],
        }
    }

    /// Name suffix appended to the root ("" for major).
    pub const fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::DominantSeventh => "7",
            ChordQuality::MinorSeventh => "m7",
            ChordQuality::MajorSeventh => "maj7",
        }
    }
}

/// A chord result: either a recognized chord or a lone sustained pitch class.
///
/// Both render to the plain names the rest of the system exchanges ("G",
/// "Gm7"); a lone pitch class and the major chord on the same root share a
/// rendering on purpose.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChordLabel {
    /// A single pitch class reported in place of a chord.
    Single(PitchClass),
    /// A chord with a root and quality.
    Chord {
        /// Root pitch class.
        root: PitchClass,
        /// Chord quality.
        quality: ChordQuality,
    },
}

impl ChordLabel {
    /// MIDI notes this label plays, rooted in octave 4.
    pub fn midi_notes(&self) -> Vec<u8> {
        let (root, quality) = match *self {
            ChordLabel::Single(pc) => (pc, ChordQuality::Major),
            ChordLabel::Chord { root, quality } => (root, quality),
        };
        let base = MIDDLE_C + root.semitone();
        quality.intervals().iter().map(|&i| base + i).collect()
    }
}

impl Display for ChordLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChordLabel::Single(pc) => write!(f, "{pc}"),
            ChordLabel::Chord { root, quality } => write!(f, "{}{}", root, quality.suffix()),
        }
    }
}

impl FromStr for ChordLabel {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, rest) =
            split_pitch_class(s).ok_or_else(|| NameError::UnknownPitchClass(s.to_string()))?;
        if rest.is_empty() {
            return Ok(ChordLabel::Single(root));
        }
        let quality = ChordQuality::ALL
            .into_iter()
            .find(|q| q.suffix() == rest)
            .ok_or_else(|| NameError::UnknownSuffix {
                name: s.to_string(),
                suffix: rest.to_string(),
            })?;
        Ok(ChordLabel::Chord { root, quality })
    }
}

impl Serialize for ChordLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChordLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// MIDI number for a note name like "C#", "A4", or "G#3".
///
/// A bare pitch class defaults to octave 4 (C4 = 60). Anything that fails to
/// parse, including multi-digit octaves, falls back to middle C.
pub fn note_to_midi(name: &str) -> u8 {
    parse_note_midi(name).unwrap_or(MIDDLE_C)
}

fn parse_note_midi(name: &str) -> Option<u8> {
    let (pc, rest) = split_pitch_class(name)?;
    let octave = match rest.as_bytes() {
        [] => 4,
        [d @ b'0'..=b'9'] => d - b'0',
        _ => return None,
    };
    Some((octave + 1) * SEMITONES as u8 + pc.semitone())
}

/// MIDI notes for a chord name, for playback.
///
/// Unrecognized names fall back to the C-major triad.
pub fn chord_to_midi(name: &str) -> Vec<u8> {
    name.parse::<ChordLabel>()
        .map(|label| label.midi_notes())
        .unwrap_or_else(|_| C_MAJOR_TRIAD.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_standard_midi_tuning() {
        let a4 = note_table()
            .iter()
            .find(|n| n.pitch_class == PitchClass::A && n.octave == 4)
            .unwrap();
        assert_eq!(a4.midi, 69);
        assert!((a4.frequency_hz - 440.0).abs() < 1e-3);

        let c4 = note_table()
            .iter()
            .find(|n| n.pitch_class == PitchClass::C && n.octave == 4)
            .unwrap();
        assert_eq!(c4.midi, 60);
        assert!((c4.frequency_hz - 261.626).abs() < 1e-2);

        assert_eq!(note_table().len(), 96);
        assert_eq!(note_table().first().unwrap().midi, 24);
        assert_eq!(note_table().last().unwrap().midi, 119);
    }

    #[test]
    fn nearest_note_respects_tolerance() {
        let note = nearest_note(440.0, 0.1).unwrap();
        assert_eq!(note.pitch_class, PitchClass::A);
        assert_eq!(note.octave, 4);

        // Quarter-tone off A4 still lands on A4 with the loose threshold.
        let near = nearest_note(452.0, 0.1).unwrap();
        assert_eq!(near.pitch_class, PitchClass::A);

        assert!(nearest_note(440.0, 0.0).is_none());
        assert!(nearest_note(-10.0, 0.1).is_none());
    }

    #[test]
    fn pitch_class_parsing_accepts_both_spellings() {
        assert_eq!("C#".parse(), Ok(PitchClass::Cs));
        assert_eq!("Db".parse(), Ok(PitchClass::Cs));
        assert_eq!("Cb".parse(), Ok(PitchClass::B));
        assert_eq!("B#".parse(), Ok(PitchClass::C));
        assert!("H".parse::<PitchClass>().is_err());
        assert!("C##".parse::<PitchClass>().is_err());
    }

    #[test]
    fn note_to_midi_matches_playback_map() {
        assert_eq!(note_to_midi("C"), 60);
        assert_eq!(note_to_midi("A"), 69);
        assert_eq!(note_to_midi("B"), 71);
        assert_eq!(note_to_midi("C#3"), 49);
        assert_eq!(note_to_midi("A4"), 69);
        assert_eq!(note_to_midi("C10"), MIDDLE_C);
        assert_eq!(note_to_midi("banana"), MIDDLE_C);
    }

    #[test]
    fn chord_labels_round_trip() {
        for (name, notes) in [
            ("G", vec![67, 71, 74]),
            ("A#m", vec![70, 73, 77]),
            ("C7", vec![60, 64, 67, 70]),
            ("Am7", vec![69, 72, 76, 79]),
            ("Fmaj7", vec![65, 69, 72, 76]),
        ] {
            let label: ChordLabel = name.parse().unwrap();
            assert_eq!(label.to_string(), name);
            assert_eq!(label.midi_notes(), notes, "{name}");
        }
        assert_eq!(chord_to_midi("Xyz"), C_MAJOR_TRIAD.to_vec());
    }
}
