//! Integration tests for pitch, timbre, and chord detection on synthesized
//! tones.

use note_scribe::{
    note_table, AnalysisEngine, AnalysisSnapshot, EngineEvent, Instrument, ManualClock,
    PitchClass, PitchEstimator, SpectralAnalyzer,
};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::sync::{Arc, Mutex};

/// Pure sine at `frequency` Hz, amplitude 1.0.
fn tone(frequency: f32, sample_rate: usize, len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            (std::f64::consts::TAU * f64::from(frequency) * n as f64 / sample_rate as f64).sin()
                as f32
        })
        .collect()
}

/// Run one synthesized note through a fresh analyzer and estimator for enough
/// frames to stabilize, returning the reported pitch class.
fn detect_pitch_class(
    frequency: f32,
    sample_rate: usize,
    transform_size: usize,
) -> Option<PitchClass> {
    let mut analyzer = SpectralAnalyzer::builder()
        .transform_size(transform_size)
        .sample_rate(sample_rate)
        .build()
        .unwrap();
    let mut estimator = PitchEstimator::builder().build().unwrap();
    let samples = tone(frequency, sample_rate, transform_size);
    let resolution = analyzer.frequency_resolution();

    let mut detection = None;
    for _ in 0..3 {
        let spectrum = analyzer.transform(&samples);
        detection = estimator.estimate(spectrum, resolution);
    }
    detection.map(|d| d.pitch_class)
}

#[test]
fn every_audible_table_note_is_recovered_from_a_pure_tone() {
    let sample_rate = 44_100;
    let transform_size = 16_384;

    // Stay inside the estimator's default band with room for the bin grid.
    let audible: Vec<_> = note_table()
        .iter()
        .filter(|note| note.frequency_hz > 85.0 && note.frequency_hz < 1_950.0)
        .collect();
    assert!(audible.len() > 50);

    let failures = Arc::new(Mutex::new(Vec::<String>::new()));
    audible.par_iter().for_each(|note| {
        let detected = detect_pitch_class(note.frequency_hz, sample_rate, transform_size);
        if detected != Some(note.pitch_class) {
            let msg = format!(
                "{} ({:.2} Hz) detected as {:?}",
                note, note.frequency_hz, detected
            );
            failures.lock().unwrap().push(msg);
        }
    });

    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();
    assert!(
        failures.is_empty(),
        "{} notes missed:\n{}",
        failures.len(),
        failures.join("\n")
    );
}

#[test]
fn tolerance_decides_how_detuned_a_tone_may_be() {
    let sample_rate = 44_100;
    let transform_size = 16_384;
    // 30 cents sharp of A4; the default tolerance shrugs it off.
    let sharp_a4 = 440.0 * 2f32.powf(0.025);
    assert_eq!(
        detect_pitch_class(sharp_a4, sample_rate, transform_size),
        Some(PitchClass::A)
    );

    // An estimator demanding near-exact tuning refuses the same tone.
    let mut analyzer = SpectralAnalyzer::builder()
        .transform_size(transform_size)
        .sample_rate(sample_rate)
        .build()
        .unwrap();
    let mut strict = PitchEstimator::builder()
        .max_log2_distance(0.01)
        .build()
        .unwrap();
    let samples = tone(sharp_a4, sample_rate, transform_size);
    let resolution = analyzer.frequency_resolution();
    for _ in 0..6 {
        let spectrum = analyzer.transform(&samples);
        assert!(strict.estimate(spectrum, resolution).is_none());
    }
}

#[test]
fn a_progression_of_tones_drives_the_whole_pipeline() {
    let clock = Arc::new(ManualClock::new());
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut engine = AnalysisEngine::builder()
        .clock(clock.clone())
        .build(tx)
        .unwrap();

    // Enough frames per tone for the pitch history and then the aggregator
    // to flip: the first note stabilizes fastest, later ones must also
    // outvote the previous note's entries.
    let steps: [(f32, usize); 3] = [(261.63, 5), (329.63, 7), (392.0, 7)];
    for (frequency, frames) in steps {
        let chunk = tone(frequency, 44_100, 2_048);
        for _ in 0..frames {
            engine.push_samples(&chunk);
        }
    }

    let mut notes = Vec::new();
    let mut instruments = Vec::new();
    for event in rx.try_iter() {
        match event {
            EngineEvent::NoteDetected { pitch_class, .. } => notes.push(pitch_class),
            EngineEvent::InstrumentDetected { instrument, .. } => instruments.push(instrument),
            EngineEvent::AudioLevel(level) => assert!(level > 50.0),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(notes, vec![PitchClass::C, PitchClass::E, PitchClass::G]);
    // A pure sine reads as the most fundamental-heavy profile in the catalog.
    assert_eq!(instruments, vec![Instrument::Flute]);

    // Quiescence fires the chord debounce and the held notes name C major.
    clock.advance(600);
    engine.pump();
    let chords: Vec<String> = rx
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::ChordDetected { chord } => Some(chord.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(chords, vec!["C"]);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.current_note, Some(PitchClass::G));
    assert_eq!(snapshot.current_instrument, Some(Instrument::Flute));
    assert_eq!(
        snapshot.current_chord.map(|chord| chord.to_string()),
        Some("C".to_string())
    );
    assert_eq!(
        snapshot.active_notes,
        vec![PitchClass::C, PitchClass::E, PitchClass::G]
    );
}

#[test]
fn snapshots_serialize_with_plain_names() {
    let snapshot = AnalysisSnapshot {
        current_note: Some(PitchClass::Cs),
        note_confidence: 0.75,
        current_instrument: Some(Instrument::Guitar),
        instrument_confidence: 0.5,
        current_chord: Some("Am7".parse().unwrap()),
        active_notes: vec![PitchClass::A, PitchClass::C, PitchClass::E, PitchClass::G],
        timestamp_ms: 4_200,
    };

    let value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(value["current_note"], "C#");
    assert_eq!(value["current_instrument"], "Guitar");
    assert_eq!(value["current_chord"], "Am7");
    assert_eq!(value["active_notes"][0], "A");
    assert_eq!(value["note_confidence"], 0.75);
    assert_eq!(value["timestamp_ms"], 4_200);
}
