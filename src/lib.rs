//! # note_scribe
//!
//! Live musical analysis for single-channel audio: stabilized pitch,
//! instrument, and chord detection over windowed FFT spectra, plus a
//! recording sequencer that replays takes with musical timing and exports
//! Standard MIDI Files.
//!
//! ## Example
//! ```rust
//! use note_scribe::{AnalysisEngine, EngineEvent};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build the analysis pipeline
//!     let (tx, rx) = crossbeam_channel::unbounded();
//!     let mut engine = AnalysisEngine::builder()
//!         .transform_size(2048)
//!         .sample_rate(44_100)
//!         .build(tx)?;
//!
//!     // 2) In your capture loop:
//!     let captured: Vec<f32> = vec![0.0; 2048]; // fill with actual samples
//!     engine.push_samples(&captured);
//!     engine.pump();
//!
//!     // 3) React to what was heard:
//!     for event in rx.try_iter() {
//!         if let EngineEvent::NoteDetected { pitch_class, confidence } = event {
//!             println!("heard {pitch_class} with confidence {confidence:.2}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Cross-frame smoothing of raw detections.
pub use aggregator::{DetectionAggregator, StableDetection};

/// Chord assembly from simultaneously held notes.
pub use chord::{chord_dictionary, ChordBuilder, ChordEntry};

/// The live analysis pipeline.
pub use engine::{
    AnalysisEngine, AnalysisEngineBuilder, AnalysisSnapshot, EngineError, EngineEvent,
};

/// Bounded detection history.
pub use history::History;

/// Standard MIDI File export.
pub use midi::{render_midi_file, MidiError};

/// Musical reference data: pitch classes, the note table, chord labels.
pub use notes::{
    chord_to_midi, nearest_note, note_table, note_to_midi, ChordLabel, ChordQuality, NameError,
    Note, PitchClass, C_MAJOR_TRIAD, MIDDLE_C,
};

/// Pitch estimation from magnitude spectra.
pub use pitch::{PitchDetection, PitchError, PitchEstimator, PitchEstimatorBuilder};

/// Recording, playback, and export of detected material.
pub use sequencer::{
    DetectedMode, ExportedSequence, PlaybackInfo, Quantization, SequenceEvent, Sequencer,
    SequencerEvent,
};

/// Windowed FFT magnitude analysis.
pub use spectrum::{SpectralAnalyzer, SpectralAnalyzerBuilder, SpectrumError, WindowFunction};

/// Harmonic-profile instrument classification.
pub use timbre::{
    profile_catalog, Attack, Instrument, InstrumentProfile, Sustain, TimbreClassifier,
    TimbreClassifierBuilder, TimbreDetection, TimbreError,
};

/// Injectable clocks and the pollable timer queue.
pub use timer::{Clock, ManualClock, SystemClock, TimerHandle, TimerQueue};

/// Detection smoothing module.
pub mod aggregator;
/// Chord pool and dictionary matching module.
pub mod chord;
/// Analysis engine module.
pub mod engine;
/// Detection history module.
pub mod history;
/// MIDI file serialization module.
pub mod midi;
/// Note and chord vocabulary module.
pub mod notes;
/// Pitch estimation module.
pub mod pitch;
/// Sequencer module.
pub mod sequencer;
/// Spectral analysis module.
pub mod spectrum;
/// Timbre classification module.
pub mod timbre;
/// Clock and timer module.
pub mod timer;
