//! Live analysis engine.
//!
//! [`AnalysisEngine`] owns the whole detection pipeline: samples pushed in are
//! buffered into transform-size chunks, each chunk runs through the spectral
//! analyzer, pitch estimator, and timbre classifier, raw detections are
//! smoothed by the aggregator, and stabilized notes feed the chord builder.
//! Results leave through a `crossbeam-channel` sender as [`EngineEvent`]s.
//!
//! The engine never blocks and owns no thread. Chord debounce and the
//! once-a-second snapshot run on an internal timer queue against an
//! injectable [`Clock`]; the host calls [`AnalysisEngine::pump`] to fire
//! whatever is due.

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info, trace};
use serde::Serialize;
use thiserror::Error;

use crate::aggregator::DetectionAggregator;
use crate::chord::ChordBuilder;
use crate::notes::{ChordLabel, PitchClass};
use crate::pitch::{PitchError, PitchEstimator};
use crate::spectrum::{SpectralAnalyzer, SpectralAnalyzerBuilder, SpectrumError, WindowFunction};
use crate::timbre::{Instrument, TimbreClassifier, TimbreError};
use crate::timer::{Clock, SystemClock, TimerHandle, TimerQueue};

/// Milliseconds between periodic snapshot events.
const SNAPSHOT_INTERVAL_MS: u64 = 1_000;

/// An error occurred while assembling the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The spectral analyzer rejected its configuration.
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    /// The pitch estimator rejected its configuration.
    #[error(transparent)]
    Pitch(#[from] PitchError),
    /// The timbre classifier rejected its configuration.
    #[error(transparent)]
    Timbre(#[from] TimbreError),
}

/// Everything the engine reports while samples flow through it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Input loudness of the latest `push_samples` call, 0..=100.
    AudioLevel(f32),
    /// The stable note changed.
    NoteDetected {
        /// Stabilized pitch class.
        pitch_class: PitchClass,
        /// Mean confidence behind the stabilization, 0..=1.
        confidence: f32,
    },
    /// The stable instrument changed.
    InstrumentDetected {
        /// Stabilized instrument.
        instrument: Instrument,
        /// Mean confidence behind the stabilization, 0..=1.
        confidence: f32,
    },
    /// The quiescence debounce elapsed and the held notes name a new chord.
    ChordDetected {
        /// Best-matching chord label.
        chord: ChordLabel,
    },
    /// Periodic summary of the whole detection state.
    Snapshot(AnalysisSnapshot),
}

/// Point-in-time summary of the detection state, emitted once a second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    /// Stable note, if one has been reported.
    pub current_note: Option<PitchClass>,
    /// Confidence behind `current_note`, 0.0 when none.
    pub note_confidence: f32,
    /// Stable instrument, if one has been reported.
    pub current_instrument: Option<Instrument>,
    /// Confidence behind `current_instrument`, 0.0 when none.
    pub instrument_confidence: f32,
    /// Most recently emitted chord label.
    pub current_chord: Option<ChordLabel>,
    /// Pitch classes currently held by the chord builder.
    pub active_notes: Vec<PitchClass>,
    /// Clock reading when the snapshot was taken.
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineTimer {
    ChordDebounce,
    Snapshot,
}

/// Builder for [`AnalysisEngine`].
pub struct AnalysisEngineBuilder {
    spectrum: SpectralAnalyzerBuilder,
    clock: Arc<dyn Clock>,
}

impl AnalysisEngineBuilder {
    /// Defaults: 2048-point transform, 44.1 kHz, rectangular window, system
    /// clock.
    pub fn new() -> Self {
        Self {
            spectrum: SpectralAnalyzer::builder(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Set the FFT transform size (must be a non-zero power of two).
    pub fn transform_size(mut self, size: usize) -> Self {
        self.spectrum = self.spectrum.transform_size(size);
        self
    }

    /// Set the input sample rate in Hz.
    pub fn sample_rate(mut self, rate: usize) -> Self {
        self.spectrum = self.spectrum.sample_rate(rate);
        self
    }

    /// Set the window function applied before each transform.
    pub fn window(mut self, window: WindowFunction) -> Self {
        self.spectrum = self.spectrum.window(window);
        self
    }

    /// Replace the clock, e.g. with a manual one in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// Events are delivered through `events`; sends never block and are
    /// dropped when the channel is full.
    pub fn build(self, events: Sender<EngineEvent>) -> Result<AnalysisEngine, EngineError> {
        let analyzer = self.spectrum.build()?;
        let pitch = PitchEstimator::builder().build()?;
        let timbre = TimbreClassifier::builder().build()?;

        let mut timers = TimerQueue::new();
        timers.schedule_after(
            self.clock.now_ms(),
            SNAPSHOT_INTERVAL_MS,
            EngineTimer::Snapshot,
        );

        info!(
            "analysis engine ready: {}-point transform at {} Hz",
            analyzer.transform_size(),
            analyzer.sample_rate()
        );
        Ok(AnalysisEngine {
            samples: Vec::with_capacity(analyzer.transform_size() * 2),
            analyzer,
            pitch,
            timbre,
            aggregator: DetectionAggregator::new(),
            chords: ChordBuilder::new(),
            timers,
            debounce_timer: None,
            clock: self.clock,
            events,
        })
    }
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled live-analysis pipeline. See the module docs for the flow.
pub struct AnalysisEngine {
    analyzer: SpectralAnalyzer,
    pitch: PitchEstimator,
    timbre: TimbreClassifier,
    aggregator: DetectionAggregator,
    chords: ChordBuilder,
    timers: TimerQueue<EngineTimer>,
    debounce_timer: Option<TimerHandle>,
    clock: Arc<dyn Clock>,
    events: Sender<EngineEvent>,
    samples: Vec<f32>,
}

impl AnalysisEngine {
    /// Start customizing with a builder.
    pub fn builder() -> AnalysisEngineBuilder {
        AnalysisEngineBuilder::new()
    }

    /// Feed captured samples into the pipeline.
    ///
    /// Every non-empty call emits an [`EngineEvent::AudioLevel`]. Once a full
    /// transform of samples has accumulated, exactly one chunk is analyzed;
    /// the backlog is trimmed to at most two transforms so a slow consumer
    /// falls behind instead of growing without bound.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let mean_square =
            samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let level = (mean_square.sqrt() * 100.0).clamp(0.0, 100.0);
        trace!("audio level {level:.1}");
        let _ = self.events.try_send(EngineEvent::AudioLevel(level));

        self.samples.extend_from_slice(samples);
        let size = self.analyzer.transform_size();
        if self.samples.len() >= size {
            let chunk: Vec<f32> = self.samples.drain(..size).collect();
            self.analyze_chunk(&chunk);
        }
        if self.samples.len() > size * 2 {
            let excess = self.samples.len() - size;
            self.samples.drain(..excess);
        }
    }

    fn analyze_chunk(&mut self, chunk: &[f32]) {
        let now = self.clock.now_ms();
        let resolution = self.analyzer.frequency_resolution();
        let spectrum = self.analyzer.transform(chunk);

        if let Some(detection) = self.pitch.estimate(spectrum, resolution) {
            if let Some(stable) = self
                .aggregator
                .observe_note(detection.pitch_class, detection.confidence)
            {
                let _ = self.events.try_send(EngineEvent::NoteDetected {
                    pitch_class: stable.label,
                    confidence: stable.confidence,
                });
                self.chords.note_heard(stable.label, now);
                if let Some(handle) = self.debounce_timer.take() {
                    self.timers.cancel(handle);
                }
                self.debounce_timer = Some(self.timers.schedule_after(
                    now,
                    self.chords.debounce_ms(),
                    EngineTimer::ChordDebounce,
                ));
            }
        }

        if let Some(detection) = self.timbre.classify(spectrum, resolution) {
            if let Some(stable) = self
                .aggregator
                .observe_instrument(detection.instrument, detection.confidence)
            {
                let _ = self.events.try_send(EngineEvent::InstrumentDetected {
                    instrument: stable.label,
                    confidence: stable.confidence,
                });
            }
        }
    }

    /// Fire every due timer: chord debounce and periodic snapshots.
    pub fn pump(&mut self) {
        let now = self.clock.now_ms();
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                EngineTimer::ChordDebounce => {
                    self.debounce_timer = None;
                    if let Some(chord) = self.chords.analyze(now) {
                        debug!("chord {chord}");
                        let _ = self.events.try_send(EngineEvent::ChordDetected { chord });
                    }
                }
                EngineTimer::Snapshot => {
                    let snapshot = self.snapshot();
                    let _ = self.events.try_send(EngineEvent::Snapshot(snapshot));
                    self.timers
                        .schedule_after(now, SNAPSHOT_INTERVAL_MS, EngineTimer::Snapshot);
                }
            }
        }
    }

    /// The summary the next snapshot event would carry.
    pub fn snapshot(&self) -> AnalysisSnapshot {
        let note = self.aggregator.current_note();
        let instrument = self.aggregator.current_instrument();
        AnalysisSnapshot {
            current_note: note.map(|n| n.label),
            note_confidence: note.map_or(0.0, |n| n.confidence),
            current_instrument: instrument.map(|i| i.label),
            instrument_confidence: instrument.map_or(0.0, |i| i.confidence),
            current_chord: self.chords.current_chord(),
            active_notes: self.chords.active_notes(),
            timestamp_ms: self.clock.now_ms(),
        }
    }

    /// Drop buffered samples, histories, and chord state.
    ///
    /// The snapshot timer keeps running.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.pitch.reset();
        self.timbre.reset();
        self.aggregator.reset();
        self.chords.reset();
        if let Some(handle) = self.debounce_timer.take() {
            self.timers.cancel(handle);
        }
        info!("analysis engine reset");
    }

    /// Resize the aggregator histories, clamped to 3..=20.
    pub fn set_history_size(&mut self, size: usize) {
        self.aggregator.set_history_size(size);
    }

    /// Set the note confidence-change gate, clamped to 0.0..=1.0.
    pub fn set_note_change_threshold(&mut self, threshold: f32) {
        self.aggregator.set_note_change_threshold(threshold);
    }

    /// Set the instrument confidence-change gate, clamped to 0.0..=1.0.
    pub fn set_instrument_change_threshold(&mut self, threshold: f32) {
        self.aggregator.set_instrument_change_threshold(threshold);
    }

    /// Set how long an unrefreshed note stays in the chord pool, min 500 ms.
    pub fn set_chord_timeout_ms(&mut self, ms: u64) {
        self.chords.set_timeout_ms(ms);
    }

    /// Set the quiescence delay before held notes are analyzed as a chord.
    pub fn set_chord_debounce_ms(&mut self, ms: u64) {
        self.chords.set_debounce_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use std::f32::consts::TAU;

    const SIZE: usize = 2048;
    const RATE: usize = 44_100;

    fn tone(frequency: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|n| (TAU * frequency * n as f32 / RATE as f32).sin())
            .collect()
    }

    fn engine_with_clock() -> (
        AnalysisEngine,
        Arc<ManualClock>,
        crossbeam_channel::Receiver<EngineEvent>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let engine = AnalysisEngine::builder()
            .transform_size(SIZE)
            .sample_rate(RATE)
            .clock(clock.clone())
            .build(tx)
            .unwrap();
        (engine, clock, rx)
    }

    fn drain(rx: &crossbeam_channel::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn every_push_reports_a_level() {
        let (mut engine, _clock, rx) = engine_with_clock();
        engine.push_samples(&tone(440.0, 512));
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match events[0] {
            // RMS of a full-scale sine is 1/sqrt(2).
            EngineEvent::AudioLevel(level) => assert!((level - 70.7).abs() < 1.0),
            ref other => panic!("unexpected event {other:?}"),
        }

        engine.push_samples(&[]);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn sustained_tone_becomes_a_note_event() {
        let (mut engine, _clock, rx) = engine_with_clock();
        let chunk = tone(440.0, SIZE);
        // Pitch stabilizes on the third frame, the aggregator on its third
        // stable frame after that.
        for _ in 0..6 {
            engine.push_samples(&chunk);
        }
        let notes: Vec<_> = drain(&rx)
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::NoteDetected {
                    pitch_class,
                    confidence,
                } => Some((pitch_class, confidence)),
                _ => None,
            })
            .collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, PitchClass::A);
        assert!(notes[0].1 > 0.0);
    }

    #[test]
    fn quiescence_after_notes_emits_a_chord() {
        let (mut engine, clock, rx) = engine_with_clock();
        let chunk = tone(440.0, SIZE);
        for _ in 0..6 {
            engine.push_samples(&chunk);
        }
        drain(&rx);

        clock.advance(600);
        engine.pump();
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::ChordDetected { chord } => assert_eq!(chord.to_string(), "A"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn snapshots_rearm_once_a_second() {
        let (mut engine, clock, rx) = engine_with_clock();
        clock.advance(1_000);
        engine.pump();
        clock.advance(1_000);
        engine.pump();
        let snapshots: Vec<_> = drain(&rx)
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::Snapshot(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].current_note, None);
        assert_eq!(snapshots[0].timestamp_ms, 1_000);
        assert_eq!(snapshots[1].timestamp_ms, 2_000);
        assert_eq!(snapshots[1], engine.snapshot());
    }

    #[test]
    fn backlog_is_trimmed_to_two_transforms() {
        let (mut engine, _clock, rx) = engine_with_clock();
        let silence = vec![0.0; 5_000];
        engine.push_samples(&silence);
        assert_eq!(engine.samples.len(), 5_000 - SIZE);
        engine.push_samples(&silence);
        assert_eq!(engine.samples.len(), SIZE);
        drain(&rx);
    }
}
