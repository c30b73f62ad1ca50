//! Timbre classification
//!
//! Scores magnitude spectra against harmonic-profile templates, one per
//! instrument, and stabilizes the winner across recent frames.

use std::fmt::{self, Display};

use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::{strict_plurality, History};

/// Offset keeping the per-harmonic score finite for tiny expectations.
const SCORE_EPSILON: f32 = 0.001;

/// Instruments the classifier can recognize.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    /// Acoustic piano
    Piano,
    /// Acoustic guitar
    Guitar,
    /// Violin
    Violin,
    /// Flute
    Flute,
    /// Trumpet
    Trumpet,
    /// Saxophone
    Saxophone,
    /// Clarinet
    Clarinet,
    /// Singing voice
    Voice,
}

impl Instrument {
    /// General MIDI program number playing this instrument, for use as the
    /// program-change value when rendering MIDI files.
    pub fn general_midi_program(self) -> u8 {
        match self {
            Instrument::Piano => 0,
            Instrument::Guitar => 24,
            Instrument::Violin => 40,
            Instrument::Flute => 73,
            Instrument::Trumpet => 56,
            Instrument::Saxophone => 64,
            Instrument::Clarinet => 71,
            Instrument::Voice => 52,
        }
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Attack character of an instrument's envelope. Informational only; not
/// used in scoring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Attack {
    /// Percussive onset
    Sharp,
    /// Gradual onset
    Smooth,
}

/// Sustain character of an instrument's envelope. Informational only; not
/// used in scoring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sustain {
    /// Decays within a few seconds
    Medium,
    /// Rings while driven
    Long,
    /// Depends on the player
    Variable,
}

/// Expected harmonic signature for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentProfile {
    /// The instrument this profile describes.
    pub instrument: Instrument,
    /// Relative amplitudes of the fundamental and its overtones.
    pub harmonics: &'static [f32],
    /// Inclusive frequency range searched for the fundamental, in Hz.
    pub frequency_range_hz: (f32, f32),
    /// Envelope attack tag.
    pub attack: Attack,
    /// Envelope sustain tag.
    pub sustain: Sustain,
}

const PROFILES: [InstrumentProfile; 8] = [
    InstrumentProfile {
        instrument: Instrument::Piano,
        harmonics: &[1.0, 0.4, 0.3, 0.2, 0.15, 0.1, 0.08, 0.06],
        frequency_range_hz: (80.0, 4000.0),
        attack: Attack::Sharp,
        sustain: Sustain::Medium,
    },
    InstrumentProfile {
        instrument: Instrument::Guitar,
        harmonics: &[1.0, 0.6, 0.4, 0.25, 0.15, 0.1, 0.06, 0.04],
        frequency_range_hz: (80.0, 3000.0),
        attack: Attack::Sharp,
        sustain: Sustain::Long,
    },
    InstrumentProfile {
        instrument: Instrument::Violin,
        harmonics: &[1.0, 0.8, 0.6, 0.4, 0.3, 0.2, 0.15, 0.1],
        frequency_range_hz: (200.0, 8000.0),
        attack: Attack::Smooth,
        sustain: Sustain::Long,
    },
    InstrumentProfile {
        instrument: Instrument::Flute,
        harmonics: &[1.0, 0.2, 0.1, 0.05, 0.02, 0.01],
        frequency_range_hz: (250.0, 4000.0),
        attack: Attack::Smooth,
        sustain: Sustain::Medium,
    },
    InstrumentProfile {
        instrument: Instrument::Trumpet,
        harmonics: &[1.0, 0.7, 0.5, 0.3, 0.2, 0.15, 0.1, 0.08],
        frequency_range_hz: (150.0, 5000.0),
        attack: Attack::Sharp,
        sustain: Sustain::Medium,
    },
    InstrumentProfile {
        instrument: Instrument::Saxophone,
        harmonics: &[1.0, 0.5, 0.3, 0.4, 0.2, 0.15, 0.1, 0.05],
        frequency_range_hz: (120.0, 3000.0),
        attack: Attack::Smooth,
        sustain: Sustain::Long,
    },
    InstrumentProfile {
        instrument: Instrument::Clarinet,
        harmonics: &[1.0, 0.1, 0.8, 0.1, 0.6, 0.1, 0.4, 0.1],
        frequency_range_hz: (150.0, 2000.0),
        attack: Attack::Smooth,
        sustain: Sustain::Medium,
    },
    InstrumentProfile {
        instrument: Instrument::Voice,
        harmonics: &[1.0, 0.6, 0.4, 0.3, 0.2, 0.15, 0.1, 0.08],
        frequency_range_hz: (80.0, 2000.0),
        attack: Attack::Smooth,
        sustain: Sustain::Variable,
    },
];

/// The fixed catalog of instrument profiles, in matching order.
pub fn profile_catalog() -> &'static [InstrumentProfile] {
    &PROFILES
}

/// Errors returned by the timbre classifier.
#[derive(Debug, Error)]
pub enum TimbreError {
    /// An error occurred during the configuration of the classifier.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A stabilized timbre classification.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimbreDetection {
    /// The stable instrument.
    pub instrument: Instrument,
    /// Raw match score of the current frame's best profile, in 0..=1.
    pub confidence: f32,
}

/// Builder for a [`TimbreClassifier`].
pub struct TimbreClassifierBuilder {
    score_floor: f32,
    magnitude_floor: f32,
    history_size: usize,
}

impl TimbreClassifierBuilder {
    /// Start with default parameters:
    /// score_floor = 0.3, magnitude_floor = 0.01, history_size = 10.
    pub fn new() -> Self {
        TimbreClassifierBuilder {
            score_floor: 0.3,
            magnitude_floor: 0.01,
            history_size: 10,
        }
    }

    /// Set the minimum winning match score.
    pub fn score_floor(mut self, floor: f32) -> Self {
        self.score_floor = floor;
        self
    }

    /// Set the minimum in-range peak magnitude for a profile to score.
    pub fn magnitude_floor(mut self, floor: f32) -> Self {
        self.magnitude_floor = floor;
        self
    }

    /// Set the stability history length.
    pub fn history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Finalize and create the classifier.
    pub fn build(self) -> Result<TimbreClassifier, TimbreError> {
        if self.history_size == 0 {
            return Err(TimbreError::Configuration(
                "history_size cannot be zero".into(),
            ));
        }

        let stability_threshold = (self.history_size as f32 * 0.5).ceil() as usize;
        Ok(TimbreClassifier {
            score_floor: self.score_floor,
            magnitude_floor: self.magnitude_floor,
            stability_threshold,
            history: History::new(self.history_size),
        })
    }
}

impl Default for TimbreClassifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches spectra against the profile catalog and reports the stable winner.
pub struct TimbreClassifier {
    score_floor: f32,
    magnitude_floor: f32,
    stability_threshold: usize,
    history: History<Instrument>,
}

impl TimbreClassifier {
    /// Start customizing with a builder.
    pub fn builder() -> TimbreClassifierBuilder {
        TimbreClassifierBuilder::new()
    }

    /// Classify the instrument playing in one spectrum.
    ///
    /// Only frames where some profile beats the score floor feed the
    /// stability history. Returns `None` until a single instrument holds a
    /// strict plurality covering at least half the history capacity; the
    /// reported confidence is always the current frame's best score.
    pub fn classify(
        &mut self,
        spectrum: &[f32],
        frequency_resolution: f32,
    ) -> Option<TimbreDetection> {
        let mut best: Option<(Instrument, f32)> = None;
        for profile in profile_catalog() {
            let score = self.profile_score(spectrum, profile, frequency_resolution);
            if score > self.score_floor && best.map_or(true, |(_, s)| score > s) {
                best = Some((profile.instrument, score));
            }
        }

        let (instrument, best_score) = best?;
        trace!("timbre frame winner {instrument} score {best_score:.3}");
        self.history.push(instrument);

        let (&stable, count) = strict_plurality(self.history.iter())?;
        if count < self.stability_threshold {
            return None;
        }
        Some(TimbreDetection {
            instrument: stable,
            confidence: best_score,
        })
    }

    /// Forget the stability history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// How well one profile explains the spectrum, in roughly 0..=1.
    ///
    /// The in-range peak estimates the fundamental; each harmonic's expected
    /// magnitude (peak times the profile weight) is compared with the actual
    /// magnitude at that harmonic's bin.
    fn profile_score(
        &self,
        spectrum: &[f32],
        profile: &InstrumentProfile,
        frequency_resolution: f32,
    ) -> f32 {
        let min_bin = (profile.frequency_range_hz.0 / frequency_resolution) as usize;
        let max_bin = (profile.frequency_range_hz.1 / frequency_resolution) as usize;

        let mut peak_magnitude = 0.0f32;
        let mut fundamental_bin = 0usize;
        for bin in min_bin..max_bin.min(spectrum.len()) {
            if spectrum[bin] > peak_magnitude {
                peak_magnitude = spectrum[bin];
                fundamental_bin = bin;
            }
        }

        if peak_magnitude < self.magnitude_floor {
            return 0.0;
        }

        let mut score = 0.0;
        let mut total_weight = 0.0;
        for (h, &weight) in profile.harmonics.iter().enumerate() {
            let harmonic_bin = fundamental_bin * (h + 1);
            if harmonic_bin < spectrum.len() {
                let expected = peak_magnitude * weight;
                let actual = spectrum[harmonic_bin];
                let harmonic_score = 1.0 - (expected - actual).abs() / (expected + SCORE_EPSILON);
                score += harmonic_score * weight;
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            score / total_weight
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOLUTION: f32 = 44_100.0 / 2048.0;

    /// Spectrum whose harmonics at `fundamental_bin` follow `weights`.
    fn harmonic_spectrum(fundamental_bin: usize, weights: &[f32]) -> Vec<f32> {
        let mut spectrum = vec![0.0; 1024];
        for (h, &w) in weights.iter().enumerate() {
            let bin = fundamental_bin * (h + 1);
            if bin < spectrum.len() {
                spectrum[bin] = w;
            }
        }
        spectrum
    }

    #[test]
    fn recognizes_a_flute_like_signature() {
        let mut classifier = TimbreClassifier::builder().build().unwrap();
        // Bin 14 is ~301 Hz, inside the flute's range.
        let spectrum = harmonic_spectrum(14, &[1.0, 0.2, 0.1, 0.05, 0.02, 0.01]);

        let mut detection = None;
        for _ in 0..5 {
            detection = classifier.classify(&spectrum, RESOLUTION);
        }
        let detection = detection.expect("five matching frames should stabilize");
        assert_eq!(detection.instrument, Instrument::Flute);
        assert!(detection.confidence > 0.9);
    }

    #[test]
    fn silence_never_classifies() {
        let mut classifier = TimbreClassifier::builder().build().unwrap();
        let spectrum = vec![0.0; 1024];
        for _ in 0..20 {
            assert!(classifier.classify(&spectrum, RESOLUTION).is_none());
        }
    }

    #[test]
    fn reports_nothing_below_the_stability_bar() {
        let mut classifier = TimbreClassifier::builder().build().unwrap();
        let spectrum = harmonic_spectrum(14, &[1.0, 0.2, 0.1, 0.05, 0.02, 0.01]);
        for _ in 0..4 {
            assert!(classifier.classify(&spectrum, RESOLUTION).is_none());
        }
    }

    #[test]
    fn catalog_covers_every_instrument_once() {
        let catalog = profile_catalog();
        assert_eq!(catalog.len(), 8);
        for (i, a) in catalog.iter().enumerate() {
            for b in &catalog[i + 1..] {
                assert_ne!(a.instrument, b.instrument);
            }
        }
    }
}
