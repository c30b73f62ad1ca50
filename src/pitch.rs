//! Pitch estimation
//!
//! Dominant-frequency scan over a magnitude spectrum with nearest-note
//! matching and a short stability history to suppress frame-to-frame noise.

use log::trace;
use thiserror::Error;

use crate::history::{strict_plurality, History};
use crate::notes::{nearest_note, PitchClass, SEMITONES};

/// Errors returned by the pitch estimator.
#[derive(Debug, Error)]
pub enum PitchError {
    /// An error occurred during the configuration of the estimator.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A stabilized pitch detection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PitchDetection {
    /// Detected pitch class; the octave is stripped before reporting.
    pub pitch_class: PitchClass,
    /// Confidence in 0..=1, derived from the current peak magnitude.
    pub confidence: f32,
}

/// Builder for a [`PitchEstimator`].
pub struct PitchEstimatorBuilder {
    band_hz: (f32, f32),
    quiet_floor: f32,
    max_log2_distance: f32,
    history_size: usize,
}

impl PitchEstimatorBuilder {
    /// Start with default parameters:
    /// band = 80–2000 Hz, quiet_floor = 0.01,
    /// max_log2_distance = 0.1, history_size = 5.
    pub fn new() -> Self {
        PitchEstimatorBuilder {
            band_hz: (80.0, 2000.0),
            quiet_floor: 0.01,
            max_log2_distance: 0.1,
            history_size: 5,
        }
    }

    /// Set the frequency band searched for the dominant peak.
    pub fn band_hz(mut self, min_hz: f32, max_hz: f32) -> Self {
        self.band_hz = (min_hz, max_hz);
        self
    }

    /// Set the magnitude below which a frame counts as silence.
    pub fn quiet_floor(mut self, floor: f32) -> Self {
        self.quiet_floor = floor;
        self
    }

    /// Set the accepted log2-frequency distance to the nearest table note.
    pub fn max_log2_distance(mut self, distance: f32) -> Self {
        self.max_log2_distance = distance;
        self
    }

    /// Set the stability history length.
    pub fn history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Finalize and create the estimator.
    pub fn build(self) -> Result<PitchEstimator, PitchError> {
        if !(self.band_hz.0 > 0.0 && self.band_hz.0 < self.band_hz.1) {
            return Err(PitchError::Configuration(
                "frequency band must satisfy 0 < min < max".into(),
            ));
        }
        if self.max_log2_distance <= 0.0 {
            return Err(PitchError::Configuration(
                "max_log2_distance must be positive".into(),
            ));
        }
        if self.history_size == 0 {
            return Err(PitchError::Configuration(
                "history_size cannot be zero".into(),
            ));
        }

        let stability_threshold = (self.history_size as f32 * 0.6).ceil() as usize;
        Ok(PitchEstimator {
            band_hz: self.band_hz,
            quiet_floor: self.quiet_floor,
            max_log2_distance: self.max_log2_distance,
            stability_threshold,
            history: History::new(self.history_size),
        })
    }
}

impl Default for PitchEstimatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans magnitude spectra for the dominant in-band note.
///
/// A frame contributes to the stability history only when its peak clears the
/// quiet floor and lands within tolerance of a table note. The note is
/// reported once a single name (octave included) holds a strict plurality of
/// the history covering at least 60% of its capacity.
pub struct PitchEstimator {
    band_hz: (f32, f32),
    quiet_floor: f32,
    max_log2_distance: f32,
    stability_threshold: usize,
    history: History<u8>,
}

impl PitchEstimator {
    /// Start customizing with a builder.
    pub fn builder() -> PitchEstimatorBuilder {
        PitchEstimatorBuilder::new()
    }

    /// Estimate the stable pitch for one spectrum.
    ///
    /// `frequency_resolution` is the bin width in Hz (sample rate divided by
    /// transform size). Returns `None` while the signal is too quiet, no
    /// table note is close enough, or the history lacks a stable majority.
    pub fn estimate(
        &mut self,
        spectrum: &[f32],
        frequency_resolution: f32,
    ) -> Option<PitchDetection> {
        let mut peak_magnitude = 0.0f32;
        let mut peak_frequency = 0.0f32;
        for (bin, &magnitude) in spectrum.iter().enumerate().skip(1) {
            let frequency = bin as f32 * frequency_resolution;
            if magnitude > peak_magnitude
                && frequency > self.band_hz.0
                && frequency < self.band_hz.1
            {
                peak_magnitude = magnitude;
                peak_frequency = frequency;
            }
        }

        if peak_magnitude < self.quiet_floor {
            return None; // too quiet
        }

        let note = nearest_note(peak_frequency, self.max_log2_distance)?;
        trace!(
            "pitch peak {:.1} Hz (mag {:.3}) -> {}",
            peak_frequency,
            peak_magnitude,
            note
        );
        self.history.push(note.midi);

        let (&stable_midi, count) = strict_plurality(self.history.iter())?;
        if count < self.stability_threshold {
            return None;
        }
        Some(PitchDetection {
            pitch_class: PitchClass::from_semitone(stable_midi % SEMITONES as u8),
            confidence: (peak_magnitude * 10.0).min(1.0),
        })
    }

    /// Forget the stability history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
