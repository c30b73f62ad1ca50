//! Chord building
//!
//! Accumulates recently heard pitch classes into a rolling set with per-note
//! expiry and matches the set against the chord dictionary by Jaccard
//! similarity.

use log::debug;
use once_cell::sync::Lazy;

use crate::notes::{ChordLabel, ChordQuality, PitchClass};

/// Minimum Jaccard similarity for a dictionary chord to match.
const MATCH_FLOOR: f32 = 0.6;

/// Default quiescence delay before a chord analysis, in ms.
const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default per-note expiry, in ms.
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// One dictionary entry: a chord label and its defining pitch classes.
#[derive(Debug, Clone)]
pub struct ChordEntry {
    /// The chord's label.
    pub label: ChordLabel,
    /// Pitch classes that define the chord, octave-independent.
    pub pitch_classes: Vec<PitchClass>,
    mask: u16,
}

static CHORD_DICTIONARY: Lazy<Vec<ChordEntry>> = Lazy::new(|| {
    let mut dictionary = Vec::with_capacity(ChordQuality::ALL.len() * PitchClass::NATURALS.len());
    for quality in ChordQuality::ALL {
        for root in PitchClass::NATURALS {
            let pitch_classes: Vec<PitchClass> = quality
                .intervals()
                .iter()
                .map(|&i| PitchClass::from_semitone(root.semitone() + i))
                .collect();
            let mask = pc_mask(pitch_classes.iter().copied());
            dictionary.push(ChordEntry {
                label: ChordLabel::Chord { root, quality },
                pitch_classes,
                mask,
            });
        }
    }
    dictionary
});

/// The immutable chord dictionary, in match-priority order: the seven
/// natural roots C through B, first as major triads, then minor, dominant
/// seventh, minor seventh, and major seventh.
pub fn chord_dictionary() -> &'static [ChordEntry] {
    &CHORD_DICTIONARY
}

fn pc_mask(pitch_classes: impl Iterator<Item = PitchClass>) -> u16 {
    pitch_classes.fold(0, |mask, pc| mask | (1 << pc.semitone()))
}

fn jaccard(a: u16, b: u16) -> f32 {
    let union = (a | b).count_ones();
    if union == 0 {
        return 0.0;
    }
    (a & b).count_ones() as f32 / union as f32
}

/// Builds chords from stabilized note detections.
///
/// Callers record each stable note with [`note_heard`](Self::note_heard) and,
/// after [`debounce_ms`](Self::debounce_ms) of quiescence, run
/// [`analyze`](Self::analyze). A result is returned only when it differs from
/// the previously emitted one.
#[derive(Debug)]
pub struct ChordBuilder {
    active: Vec<(PitchClass, u64)>,
    timeout_ms: u64,
    debounce_ms: u64,
    last_emitted: Option<ChordLabel>,
}

impl ChordBuilder {
    /// A builder with the default 2000 ms note expiry and 500 ms debounce.
    pub fn new() -> Self {
        ChordBuilder {
            active: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            last_emitted: None,
        }
    }

    /// Record a stabilized note at `now_ms`, refreshing its expiry.
    pub fn note_heard(&mut self, note: PitchClass, now_ms: u64) {
        self.evict_expired(now_ms);
        match self.active.iter_mut().find(|(pc, _)| *pc == note) {
            Some((_, last_seen)) => *last_seen = now_ms,
            None => self.active.push((note, now_ms)),
        }
    }

    /// Evict stale notes and match the remainder against the dictionary.
    ///
    /// Returns the newly emitted label when the result changed: the lone
    /// pitch class when exactly one note is held, otherwise the first
    /// dictionary chord whose Jaccard similarity exceeds 0.6. No match, or a
    /// repeat of the previous result, returns `None`.
    pub fn analyze(&mut self, now_ms: u64) -> Option<ChordLabel> {
        self.evict_expired(now_ms);

        let label = match self.active.len() {
            0 => return None,
            1 => ChordLabel::Single(self.active[0].0),
            _ => {
                let active_mask = pc_mask(self.active.iter().map(|(pc, _)| *pc));
                let mut best: Option<(&ChordEntry, f32)> = None;
                for entry in chord_dictionary() {
                    let score = jaccard(active_mask, entry.mask);
                    if score > MATCH_FLOOR && best.map_or(true, |(_, s)| score > s) {
                        best = Some((entry, score));
                    }
                }
                let (entry, score) = best?;
                debug!("chord match {} (jaccard {score:.2})", entry.label);
                entry.label
            }
        };

        if self
            .last_emitted
            .is_some_and(|last| last.to_string() == label.to_string())
        {
            return None;
        }
        self.last_emitted = Some(label);
        Some(label)
    }

    /// The most recently emitted label, if any.
    pub fn current_chord(&self) -> Option<ChordLabel> {
        self.last_emitted
    }

    /// Pitch classes currently held, oldest first.
    pub fn active_notes(&self) -> Vec<PitchClass> {
        self.active.iter().map(|(pc, _)| *pc).collect()
    }

    /// Quiescence delay callers should wait after a note before analyzing.
    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    /// Set the quiescence delay.
    pub fn set_debounce_ms(&mut self, ms: u64) {
        self.debounce_ms = ms;
    }

    /// Set the per-note expiry. Values below 500 ms are raised to 500.
    pub fn set_timeout_ms(&mut self, ms: u64) {
        self.timeout_ms = ms.max(500);
    }

    /// Forget held notes and the last emitted label.
    pub fn reset(&mut self) {
        self.active.clear();
        self.last_emitted = None;
    }

    fn evict_expired(&mut self, now_ms: u64) {
        let timeout = self.timeout_ms;
        self.active
            .retain(|(_, last_seen)| now_ms.saturating_sub(*last_seen) <= timeout);
    }
}

impl Default for ChordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heard(builder: &mut ChordBuilder, notes: &[PitchClass], now_ms: u64) {
        for &note in notes {
            builder.note_heard(note, now_ms);
        }
    }

    #[test]
    fn c_major_triad_matches_exactly() {
        use PitchClass::{C, E, G};
        let mut builder = ChordBuilder::new();
        heard(&mut builder, &[C, E, G], 0);
        let label = builder.analyze(100).unwrap();
        assert_eq!(label.to_string(), "C");
    }

    #[test]
    fn dictionary_order_breaks_ties() {
        use PitchClass::{C, E};
        // {C,E} scores 2/3 against both C major and A minor; the major
        // section comes first.
        let mut builder = ChordBuilder::new();
        heard(&mut builder, &[C, E], 0);
        assert_eq!(builder.analyze(0).unwrap().to_string(), "C");
    }

    #[test]
    fn lone_note_reports_itself() {
        let mut builder = ChordBuilder::new();
        builder.note_heard(PitchClass::Fs, 0);
        assert_eq!(builder.analyze(0).unwrap().to_string(), "F#");
    }

    #[test]
    fn unchanged_result_is_not_re_emitted() {
        use PitchClass::{C, E, G};
        let mut builder = ChordBuilder::new();
        heard(&mut builder, &[C, E, G], 0);
        assert!(builder.analyze(100).is_some());
        heard(&mut builder, &[C, E, G], 200);
        assert!(builder.analyze(300).is_none());
    }

    #[test]
    fn notes_expire_after_the_timeout() {
        use PitchClass::{C, E, G};
        let mut builder = ChordBuilder::new();
        heard(&mut builder, &[C, E, G], 0);
        assert_eq!(builder.analyze(100).unwrap().to_string(), "C");

        // Only G is refreshed; C and E age out and the result changes.
        builder.note_heard(G, 2500);
        assert_eq!(builder.active_notes(), vec![G]);
        assert_eq!(builder.analyze(2600).unwrap().to_string(), "G");
    }

    #[test]
    fn minor_seventh_chords_are_in_the_dictionary() {
        use PitchClass::{A, C, D, F};
        let mut builder = ChordBuilder::new();
        heard(&mut builder, &[D, F, A, C], 0);
        assert_eq!(builder.analyze(0).unwrap().to_string(), "Dm7");
    }

    #[test]
    fn dictionary_has_thirty_five_ordered_entries() {
        let dictionary = chord_dictionary();
        assert_eq!(dictionary.len(), 35);
        assert_eq!(dictionary[0].label.to_string(), "C");
        assert_eq!(dictionary[7].label.to_string(), "Cm");
        assert_eq!(dictionary[34].label.to_string(), "Bmaj7");
    }
}
