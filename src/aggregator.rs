//! Cross-frame smoothing of note and instrument detections.
//!
//! Raw per-frame detections flicker. The [`DetectionAggregator`] keeps a short
//! history per channel, promotes a label only once it holds a clear majority,
//! and gates repeat reports behind a confidence-change threshold so downstream
//! consumers only hear about meaningful changes.

use log::debug;

use crate::history::{plurality_lead, History};
use crate::notes::PitchClass;
use crate::timbre::Instrument;

/// Detections kept per channel before the oldest is evicted.
const DEFAULT_HISTORY_SIZE: usize = 8;
/// Entries required before a stable detection can form.
const MIN_ENTRIES: usize = 3;
/// Lead over the runner-up label required for stability. A stream that
/// alternates between two labels never builds this margin.
const STABILITY_MARGIN: usize = 2;
/// Default confidence delta that re-reports an unchanged note.
const DEFAULT_NOTE_CHANGE_THRESHOLD: f32 = 0.15;
/// Default confidence delta that re-reports an unchanged instrument.
const DEFAULT_INSTRUMENT_CHANGE_THRESHOLD: f32 = 0.25;

/// A label that held a majority of its history, with the mean confidence of
/// the frames that voted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableDetection<L> {
    /// The stabilized label.
    pub label: L,
    /// Mean confidence across the history entries carrying `label`.
    pub confidence: f32,
}

struct Channel<L> {
    name: &'static str,
    history: History<(L, f32)>,
    last_reported: Option<StableDetection<L>>,
    change_threshold: f32,
}

impl<L: Copy + Eq + std::fmt::Display> Channel<L> {
    fn new(name: &'static str, change_threshold: f32) -> Self {
        Self {
            name,
            history: History::new(DEFAULT_HISTORY_SIZE),
            last_reported: None,
            change_threshold,
        }
    }

    fn observe(&mut self, label: L, confidence: f32) -> Option<StableDetection<L>> {
        self.history.push((label, confidence));
        let stable = self.stable()?;
        let report = match &self.last_reported {
            None => true,
            Some(last) => {
                last.label != stable.label
                    || (stable.confidence - last.confidence).abs() > self.change_threshold
            }
        };
        if !report {
            return None;
        }
        debug!(
            "stable {} {} at confidence {:.2}",
            self.name, stable.label, stable.confidence
        );
        self.last_reported = Some(stable);
        Some(stable)
    }

    fn stable(&self) -> Option<StableDetection<L>> {
        if self.history.len() < MIN_ENTRIES {
            return None;
        }
        let (label, count, lead) = plurality_lead(self.history.iter().map(|(l, _)| l))?;
        let threshold = (self.history.len() as f32 * 0.5).ceil() as usize;
        if count < threshold || lead < STABILITY_MARGIN {
            return None;
        }
        let label = *label;
        let sum: f32 = self
            .history
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|(_, c)| *c)
            .sum();
        Some(StableDetection {
            label,
            confidence: sum / count as f32,
        })
    }

    fn reset(&mut self) {
        self.history.clear();
        self.last_reported = None;
    }
}

/// Majority-vote smoother sitting between the raw detectors and the
/// event stream.
///
/// Notes and instruments run through independent channels that share one
/// history size. A channel reports when a label first reaches a stable
/// majority, when the stable label changes, or when its mean confidence
/// moves by more than the channel's change threshold.
pub struct DetectionAggregator {
    notes: Channel<PitchClass>,
    instruments: Channel<Instrument>,
}

impl DetectionAggregator {
    /// Creates an aggregator with an 8-entry history per channel.
    pub fn new() -> Self {
        Self {
            notes: Channel::new("note", DEFAULT_NOTE_CHANGE_THRESHOLD),
            instruments: Channel::new("instrument", DEFAULT_INSTRUMENT_CHANGE_THRESHOLD),
        }
    }

    /// Feeds one raw note detection and returns a report when the stable
    /// note changed.
    pub fn observe_note(
        &mut self,
        pitch_class: PitchClass,
        confidence: f32,
    ) -> Option<StableDetection<PitchClass>> {
        self.notes.observe(pitch_class, confidence)
    }

    /// Feeds one raw instrument detection and returns a report when the
    /// stable instrument changed.
    pub fn observe_instrument(
        &mut self,
        instrument: Instrument,
        confidence: f32,
    ) -> Option<StableDetection<Instrument>> {
        self.instruments.observe(instrument, confidence)
    }

    /// Most recently reported stable note, if any.
    pub fn current_note(&self) -> Option<StableDetection<PitchClass>> {
        self.notes.last_reported
    }

    /// Most recently reported stable instrument, if any.
    pub fn current_instrument(&self) -> Option<StableDetection<Instrument>> {
        self.instruments.last_reported
    }

    /// History capacity shared by both channels.
    pub fn history_size(&self) -> usize {
        self.notes.history.capacity()
    }

    /// Resizes both channel histories, clamped to 3..=20 entries.
    pub fn set_history_size(&mut self, size: usize) {
        let size = size.clamp(3, 20);
        self.notes.history.set_capacity(size);
        self.instruments.history.set_capacity(size);
    }

    /// Sets the note confidence-change gate, clamped to 0.0..=1.0.
    pub fn set_note_change_threshold(&mut self, threshold: f32) {
        self.notes.change_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Sets the instrument confidence-change gate, clamped to 0.0..=1.0.
    pub fn set_instrument_change_threshold(&mut self, threshold: f32) {
        self.instruments.change_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Clears both histories and forgets the last reports.
    pub fn reset(&mut self) {
        self.notes.reset();
        self.instruments.reset();
    }
}

impl Default for DetectionAggregator {
    fn default() -> Self {
        Self::new()
    }
}
