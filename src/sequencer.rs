//! Recording and timer-driven replay of detected notes and chords.
//!
//! The [`Sequencer`] captures stabilized detections with wall-clock onsets
//! while recording, derives per-note durations from the gaps between onsets,
//! and cleans the whole take up once recording stops (sorting, overlap
//! trimming, optional grid quantization). Playback is cooperative: events and
//! their note-offs are scheduled on a [`TimerQueue`] against an injectable
//! [`Clock`], and the host calls [`Sequencer::pump`] to fire whatever is due.
//! Commands and notifications leave through a `crossbeam-channel` sender.

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::notes::{ChordLabel, PitchClass, MIDDLE_C};
use crate::timer::{Clock, SystemClock, TimerQueue};

/// Duration given to the first note of a take, before any gap is known.
const FIRST_NOTE_DURATION_MS: u64 = 500;
/// Shortest duration a gap-derived note may get.
const MIN_NOTE_DURATION_MS: u64 = 100;
/// Longest duration a gap-derived note may get.
const MAX_NOTE_DURATION_MS: u64 = 2_000;
/// Gaps under this count as consecutive melody notes.
const NOTE_GAP_THRESHOLD_MS: u64 = 200;
/// Fixed duration and minimum finalized duration for chords.
const CHORD_DURATION_MS: u64 = 1_000;
/// Velocity for chord events; note velocities derive from confidence.
const CHORD_VELOCITY: u8 = 100;
/// Cap on the final event's duration after a melody take.
const FINAL_DURATION_CAP_MS: u64 = 800;
/// How many trailing events vote on the detected mode.
const MODE_WINDOW: usize = 5;

/// One recorded event of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SequenceEvent {
    /// A single melody note.
    Note {
        /// Detected pitch class.
        note: PitchClass,
        /// Onset relative to the start of the recording.
        timestamp_ms: u64,
        /// How long the note sounds during playback.
        duration_ms: u64,
        /// Detection confidence at capture time, 0..=1.
        confidence: f32,
        /// MIDI velocity derived from the confidence.
        velocity: u8,
    },
    /// Several notes sounding together.
    Chord {
        /// The chord's label.
        chord: ChordLabel,
        /// MIDI notes sounded for the chord.
        notes: Vec<u8>,
        /// Onset relative to the start of the recording.
        timestamp_ms: u64,
        /// How long the chord sounds during playback.
        duration_ms: u64,
        /// MIDI velocity.
        velocity: u8,
    },
}

impl SequenceEvent {
    /// Onset relative to the start of the recording.
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            SequenceEvent::Note { timestamp_ms, .. }
            | SequenceEvent::Chord { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Playback duration.
    pub fn duration_ms(&self) -> u64 {
        match self {
            SequenceEvent::Note { duration_ms, .. }
            | SequenceEvent::Chord { duration_ms, .. } => *duration_ms,
        }
    }

    /// MIDI velocity.
    pub fn velocity(&self) -> u8 {
        match self {
            SequenceEvent::Note { velocity, .. } | SequenceEvent::Chord { velocity, .. } => {
                *velocity
            }
        }
    }

    /// The MIDI notes this event sounds: a note maps into octave 4, a chord
    /// plays its recorded note set.
    pub fn midi_notes(&self) -> Vec<u8> {
        match self {
            SequenceEvent::Note { note, .. } => vec![MIDDLE_C + note.semitone()],
            SequenceEvent::Chord { notes, .. } => notes.clone(),
        }
    }

    fn is_chord(&self) -> bool {
        matches!(self, SequenceEvent::Chord { .. })
    }

    fn set_timestamp_ms(&mut self, ms: u64) {
        match self {
            SequenceEvent::Note { timestamp_ms, .. }
            | SequenceEvent::Chord { timestamp_ms, .. } => *timestamp_ms = ms,
        }
    }

    fn set_duration_ms(&mut self, ms: u64) {
        match self {
            SequenceEvent::Note { duration_ms, .. }
            | SequenceEvent::Chord { duration_ms, .. } => *duration_ms = ms,
        }
    }
}

/// What kind of material the current take looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedMode {
    /// Mostly single notes.
    Melody,
    /// Mostly chords.
    Chord,
    /// A blend of both.
    Mixed,
}

impl std::fmt::Display for DetectedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Grid that event onsets snap to when a take is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// Keep onsets as played.
    #[default]
    Free,
    /// Snap to quarter notes.
    Quarter,
    /// Snap to eighth notes.
    Eighth,
    /// Snap to sixteenth notes.
    Sixteenth,
}

impl Quantization {
    /// How many grid steps fit in one beat, `None` for no snapping.
    fn divisor(self) -> Option<f64> {
        match self {
            Quantization::Free => None,
            Quantization::Quarter => Some(1.0),
            Quantization::Eighth => Some(2.0),
            Quantization::Sixteenth => Some(4.0),
        }
    }
}

/// Notifications and playback commands emitted by the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// The recorded sequence changed.
    SequenceUpdated,
    /// Playback began.
    PlaybackStarted,
    /// Playback was cut short by `stop()`.
    PlaybackStopped,
    /// Playback reached the end and every note-off has fired.
    PlaybackFinished,
    /// Sound these MIDI notes now.
    PlayNotes {
        /// Notes to sound.
        notes: Vec<u8>,
        /// How long they should ring.
        duration_ms: u64,
    },
    /// Silence these MIDI notes now.
    StopNotes {
        /// Notes to silence.
        notes: Vec<u8>,
    },
}

/// Snapshot of the transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackInfo {
    /// Whether playback is running.
    pub playing: bool,
    /// Whether a take is being recorded.
    pub recording: bool,
    /// Current detected mode.
    pub mode: DetectedMode,
    /// Number of recorded events.
    pub event_count: usize,
    /// Index of the next event to play.
    pub cursor: usize,
}

/// A finished take in exportable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSequence {
    /// The recorded events, sorted by onset once finalized.
    pub events: Vec<SequenceEvent>,
    /// Detected mode of the take.
    pub mode: DetectedMode,
    /// Tempo the take is meant to play at.
    pub tempo_bpm: u32,
    /// `max(onset + duration)` over all events, 0 when empty.
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlaybackTimer {
    Advance,
    NoteOff { notes: Vec<u8> },
}

/// Records detections into a timed sequence and replays it.
///
/// See the module docs for the lifecycle. All state transitions are silent
/// no-ops when called in the wrong state.
pub struct Sequencer {
    events: Vec<SequenceEvent>,
    recording: bool,
    playing: bool,
    recording_started_ms: u64,
    last_note_at_ms: Option<u64>,
    mode: DetectedMode,
    tempo_bpm: u32,
    quantization: Quantization,
    playback_origin_ms: u64,
    cursor: usize,
    sounding: Vec<u8>,
    timers: TimerQueue<PlaybackTimer>,
    clock: Arc<dyn Clock>,
    sender: Sender<SequencerEvent>,
}

impl Sequencer {
    /// Creates a sequencer on the system clock.
    pub fn new(sender: Sender<SequencerEvent>) -> Self {
        Self::with_clock(sender, Arc::new(SystemClock::new()))
    }

    /// Creates a sequencer on the given clock.
    pub fn with_clock(sender: Sender<SequencerEvent>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Vec::new(),
            recording: false,
            playing: false,
            recording_started_ms: 0,
            last_note_at_ms: None,
            mode: DetectedMode::Melody,
            tempo_bpm: 120,
            quantization: Quantization::Free,
            playback_origin_ms: 0,
            cursor: 0,
            sounding: Vec::new(),
            timers: TimerQueue::new(),
            clock,
            sender,
        }
    }

    /// Begin a fresh take. No-op while already recording.
    pub fn start_recording(&mut self) {
        if self.recording {
            return;
        }
        self.recording = true;
        self.recording_started_ms = self.clock.now_ms();
        self.events.clear();
        self.last_note_at_ms = None;
        info!("recording started");
        self.notify(SequencerEvent::SequenceUpdated);
    }

    /// End the take and finalize it. No-op unless recording.
    pub fn stop_recording(&mut self) {
        if !self.recording {
            return;
        }
        self.recording = false;
        self.finalize();
        info!("recording stopped with {} events", self.events.len());
        self.notify(SequencerEvent::SequenceUpdated);
    }

    /// Start or stop recording depending on the current state.
    pub fn toggle_recording(&mut self) {
        if self.recording {
            self.stop_recording();
        } else {
            self.start_recording();
        }
    }

    /// Record one note at an absolute clock time. Ignored unless recording.
    ///
    /// The duration comes from the gap since the previous note: the first
    /// note gets 500 ms, close notes get 80% of the gap (at least 100 ms),
    /// spaced notes 60% (at most 2000 ms).
    pub fn add_note(&mut self, note: PitchClass, timestamp_ms: u64, confidence: f32) {
        if !self.recording {
            return;
        }
        let relative_ms = timestamp_ms.saturating_sub(self.recording_started_ms);
        let duration_ms = self.note_duration(timestamp_ms);
        let velocity = (confidence.clamp(0.0, 1.0) * 127.0).floor() as u8;
        debug!("recorded note {note} at {relative_ms} ms for {duration_ms} ms");
        self.events.push(SequenceEvent::Note {
            note,
            timestamp_ms: relative_ms,
            duration_ms,
            confidence,
            velocity,
        });
        self.update_mode();
        self.notify(SequencerEvent::SequenceUpdated);
    }

    /// Record one chord at an absolute clock time. Ignored unless recording.
    ///
    /// When `notes` is `None` the chord label decides the note set.
    pub fn add_chord(&mut self, chord: ChordLabel, timestamp_ms: u64, notes: Option<Vec<u8>>) {
        if !self.recording {
            return;
        }
        let relative_ms = timestamp_ms.saturating_sub(self.recording_started_ms);
        let notes = notes.unwrap_or_else(|| chord.midi_notes());
        debug!("recorded chord {chord} at {relative_ms} ms");
        self.events.push(SequenceEvent::Chord {
            chord,
            notes,
            timestamp_ms: relative_ms,
            duration_ms: CHORD_DURATION_MS,
            velocity: CHORD_VELOCITY,
        });
        self.update_mode();
        self.notify(SequencerEvent::SequenceUpdated);
    }

    fn note_duration(&mut self, now_ms: u64) -> u64 {
        let gap = match self.last_note_at_ms.replace(now_ms) {
            None => return FIRST_NOTE_DURATION_MS,
            Some(previous) => now_ms.saturating_sub(previous),
        };
        let duration = if gap < NOTE_GAP_THRESHOLD_MS {
            (gap as f64 * 0.8).max(MIN_NOTE_DURATION_MS as f64)
        } else {
            (gap as f64 * 0.6).min(MAX_NOTE_DURATION_MS as f64)
        };
        duration.floor() as u64
    }

    fn update_mode(&mut self) {
        if self.events.len() < 2 {
            return;
        }
        let recent = &self.events[self.events.len().saturating_sub(MODE_WINDOW)..];
        let chords = recent.iter().filter(|event| event.is_chord()).count();
        let notes = recent.len() - chords;
        self.mode = if notes > chords * 2 {
            DetectedMode::Melody
        } else if chords > notes {
            DetectedMode::Chord
        } else {
            DetectedMode::Mixed
        };
    }

    fn finalize(&mut self) {
        if self.events.is_empty() {
            return;
        }
        self.events.sort_by_key(SequenceEvent::timestamp_ms);
        match self.mode {
            DetectedMode::Melody => self.settle_melody_durations(),
            DetectedMode::Chord => self.settle_chord_durations(),
            DetectedMode::Mixed => {}
        }
        self.quantize();
    }

    /// Trim every duration to 90% of the gap to the next onset so melody
    /// notes never overlap, and cap the final event.
    fn settle_melody_durations(&mut self) {
        for i in 0..self.events.len().saturating_sub(1) {
            let gap = self.events[i + 1].timestamp_ms() - self.events[i].timestamp_ms();
            let capped = self.events[i]
                .duration_ms()
                .min((gap as f64 * 0.9).floor() as u64);
            self.events[i].set_duration_ms(capped);
        }
        if let Some(last) = self.events.last_mut() {
            let capped = last.duration_ms().min(FINAL_DURATION_CAP_MS);
            last.set_duration_ms(capped);
        }
    }

    fn settle_chord_durations(&mut self) {
        for event in &mut self.events {
            if let SequenceEvent::Chord { duration_ms, .. } = event {
                *duration_ms = (*duration_ms).max(CHORD_DURATION_MS);
            }
        }
    }

    fn quantize(&mut self) {
        let divisor = match self.quantization.divisor() {
            Some(divisor) => divisor,
            None => return,
        };
        let unit = 60_000.0 / f64::from(self.tempo_bpm) / divisor;
        for event in &mut self.events {
            let snapped = (event.timestamp_ms() as f64 / unit).round() * unit;
            event.set_timestamp_ms(snapped.round() as u64);
        }
    }

    /// Begin playback from the top. No-op while playing or when empty.
    pub fn play(&mut self) {
        if self.playing || self.events.is_empty() {
            return;
        }
        self.playing = true;
        self.playback_origin_ms = self.clock.now_ms();
        self.cursor = 0;
        self.sounding.clear();
        info!(
            "playback started: {} mode, {} events",
            self.mode,
            self.events.len()
        );
        self.notify(SequencerEvent::PlaybackStarted);
        self.advance();
    }

    /// Cut playback short. No-op unless playing.
    ///
    /// Cancels the advance timer and every pending note-off, then silences
    /// all sounding notes with a single `StopNotes`.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        self.timers.clear();
        if !self.sounding.is_empty() {
            let notes = std::mem::take(&mut self.sounding);
            let _ = self.sender.try_send(SequencerEvent::StopNotes { notes });
        }
        info!("playback stopped");
        self.notify(SequencerEvent::PlaybackStopped);
    }

    /// Fire every due playback timer.
    pub fn pump(&mut self) {
        let now = self.clock.now_ms();
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                PlaybackTimer::Advance => self.advance(),
                PlaybackTimer::NoteOff { notes } => {
                    let _ = self.sender.try_send(SequencerEvent::StopNotes {
                        notes: notes.clone(),
                    });
                    self.sounding.retain(|note| !notes.contains(note));
                    self.maybe_finish();
                }
            }
        }
    }

    /// Play every due event in order, then schedule one timer for the next.
    fn advance(&mut self) {
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.playback_origin_ms);
        while self.playing && self.cursor < self.events.len() {
            let onset = self.events[self.cursor].timestamp_ms();
            if elapsed >= onset {
                let event = self.events[self.cursor].clone();
                self.cursor += 1;
                self.execute(&event, now);
            } else {
                self.timers
                    .schedule_after(now, onset - elapsed, PlaybackTimer::Advance);
                return;
            }
        }
        self.maybe_finish();
    }

    fn execute(&mut self, event: &SequenceEvent, now_ms: u64) {
        let notes = event.midi_notes();
        if notes.is_empty() {
            return;
        }
        debug!("playing {notes:?} for {} ms", event.duration_ms());
        let _ = self.sender.try_send(SequencerEvent::PlayNotes {
            notes: notes.clone(),
            duration_ms: event.duration_ms(),
        });
        for &note in &notes {
            if !self.sounding.contains(&note) {
                self.sounding.push(note);
            }
        }
        self.timers
            .schedule_after(now_ms, event.duration_ms(), PlaybackTimer::NoteOff { notes });
    }

    /// Finish once the cursor has passed the end and no note-off is pending.
    fn maybe_finish(&mut self) {
        if !self.playing || self.cursor < self.events.len() || !self.timers.is_empty() {
            return;
        }
        self.playing = false;
        info!("playback finished");
        self.notify(SequencerEvent::PlaybackFinished);
    }

    /// Stop playback, drop the take, and reset the mode to melody.
    pub fn clear(&mut self) {
        self.stop();
        self.events.clear();
        self.mode = DetectedMode::Melody;
        self.notify(SequencerEvent::SequenceUpdated);
    }

    /// The recorded events.
    pub fn sequence(&self) -> &[SequenceEvent] {
        &self.events
    }

    /// Whether a take is being recorded.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Whether playback is running.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current detected mode.
    pub fn mode(&self) -> DetectedMode {
        self.mode
    }

    /// Transport state for displays.
    pub fn playback_info(&self) -> PlaybackInfo {
        PlaybackInfo {
            playing: self.playing,
            recording: self.recording,
            mode: self.mode,
            event_count: self.events.len(),
            cursor: self.cursor,
        }
    }

    /// Set the tempo (clamped to 60..=200 BPM) and quantization grid.
    pub fn set_rhythm(&mut self, tempo_bpm: u32, quantization: Quantization) {
        self.tempo_bpm = tempo_bpm.clamp(60, 200);
        self.quantization = quantization;
    }

    /// Package the take for export.
    pub fn export(&self) -> ExportedSequence {
        ExportedSequence {
            events: self.events.clone(),
            mode: self.mode,
            tempo_bpm: self.tempo_bpm,
            total_duration_ms: self
                .events
                .iter()
                .map(|event| event.timestamp_ms() + event.duration_ms())
                .max()
                .unwrap_or(0),
        }
    }

    fn notify(&self, event: SequencerEvent) {
        let _ = self.sender.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use PitchClass::{C, D, E, G};

    fn sequencer() -> (
        Sequencer,
        Arc<ManualClock>,
        crossbeam_channel::Receiver<SequencerEvent>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let sequencer = Sequencer::with_clock(tx, clock.clone());
        (sequencer, clock, rx)
    }

    #[test]
    fn events_are_ignored_unless_recording() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.add_note(C, 100, 1.0);
        assert!(sequencer.sequence().is_empty());

        sequencer.start_recording();
        sequencer.add_note(C, 100, 0.9);
        assert_eq!(sequencer.sequence().len(), 1);
        match &sequencer.sequence()[0] {
            SequenceEvent::Note {
                note,
                timestamp_ms,
                duration_ms,
                velocity,
                ..
            } => {
                assert_eq!(*note, C);
                assert_eq!(*timestamp_ms, 100);
                assert_eq!(*duration_ms, FIRST_NOTE_DURATION_MS);
                assert_eq!(*velocity, 114);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn durations_follow_the_gaps() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.start_recording();
        sequencer.add_note(C, 0, 1.0);
        sequencer.add_note(D, 150, 1.0);
        sequencer.add_note(E, 500, 1.0);
        let durations: Vec<u64> = sequencer
            .sequence()
            .iter()
            .map(SequenceEvent::duration_ms)
            .collect();
        // 500 default, 150 * 0.8, 350 * 0.6.
        assert_eq!(durations, vec![500, 120, 210]);
    }

    #[test]
    fn mode_follows_the_recent_event_mix() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.start_recording();
        for (i, note) in [C, D, E].iter().enumerate() {
            sequencer.add_note(*note, i as u64 * 300, 1.0);
        }
        assert_eq!(sequencer.mode(), DetectedMode::Melody);

        sequencer.add_chord(ChordLabel::Single(G), 1_000, None);
        sequencer.add_chord(ChordLabel::Single(C), 1_400, None);
        // Last five: three notes, two chords.
        assert_eq!(sequencer.mode(), DetectedMode::Mixed);

        sequencer.add_chord(ChordLabel::Single(D), 1_900, None);
        // Last five: two notes, three chords.
        assert_eq!(sequencer.mode(), DetectedMode::Chord);
    }

    #[test]
    fn melody_finalize_removes_overlap() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.start_recording();
        // Out of order on purpose; finalize sorts before trimming.
        sequencer.add_note(C, 300, 1.0);
        sequencer.add_note(D, 100, 1.0);
        sequencer.stop_recording();

        let events = sequencer.sequence();
        let onsets: Vec<u64> = events.iter().map(SequenceEvent::timestamp_ms).collect();
        assert_eq!(onsets, vec![100, 300]);
        for pair in events.windows(2) {
            let gap = pair[1].timestamp_ms() - pair[0].timestamp_ms();
            assert!(pair[0].duration_ms() <= gap);
        }
        assert!(events.last().unwrap().duration_ms() <= FINAL_DURATION_CAP_MS);
    }

    #[test]
    fn quantization_snaps_onsets() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.set_rhythm(120, Quantization::Eighth);
        sequencer.start_recording();
        for (note, at) in [(C, 0), (D, 130), (E, 260), (G, 380)] {
            sequencer.add_note(note, at, 1.0);
        }
        sequencer.stop_recording();
        let onsets: Vec<u64> = sequencer
            .sequence()
            .iter()
            .map(SequenceEvent::timestamp_ms)
            .collect();
        // 120 BPM eighths put the grid at 250 ms.
        assert_eq!(onsets, vec![0, 250, 250, 500]);
    }

    #[test]
    fn tempo_is_clamped() {
        let (mut sequencer, _clock, _rx) = sequencer();
        sequencer.set_rhythm(500, Quantization::Free);
        assert_eq!(sequencer.export().tempo_bpm, 200);
        sequencer.set_rhythm(10, Quantization::Free);
        assert_eq!(sequencer.export().tempo_bpm, 60);
    }

    #[test]
    fn play_is_a_no_op_when_empty() {
        let (mut sequencer, _clock, rx) = sequencer();
        sequencer.play();
        assert!(!sequencer.is_playing());
        assert!(rx.try_iter().count() == 0);
    }

    #[test]
    fn playback_plays_stops_and_finishes() {
        let (mut sequencer, clock, rx) = sequencer();
        sequencer.start_recording();
        sequencer.add_note(C, 0, 1.0);
        sequencer.add_note(E, 300, 1.0);
        sequencer.stop_recording();
        clock.set(1_000);
        sequencer.play();
        while sequencer.is_playing() {
            clock.advance(10);
            sequencer.pump();
        }

        let played: Vec<SequencerEvent> = rx
            .try_iter()
            .filter(|event| {
                !matches!(
                    event,
                    SequencerEvent::SequenceUpdated | SequencerEvent::PlaybackStarted
                )
            })
            .collect();
        assert_eq!(
            played,
            vec![
                // First note trimmed to 270 by the melody finalize, second
                // capped by its own 180 ms duration.
                SequencerEvent::PlayNotes {
                    notes: vec![60],
                    duration_ms: 270
                },
                SequencerEvent::StopNotes { notes: vec![60] },
                SequencerEvent::PlayNotes {
                    notes: vec![64],
                    duration_ms: 180
                },
                SequencerEvent::StopNotes { notes: vec![64] },
                SequencerEvent::PlaybackFinished,
            ]
        );
    }

    #[test]
    fn stop_silences_everything_with_no_strays() {
        let (mut sequencer, clock, rx) = sequencer();
        sequencer.start_recording();
        sequencer.add_note(C, 0, 1.0);
        sequencer.add_note(E, 2_000, 1.0);
        sequencer.stop_recording();
        sequencer.play();
        drop(rx.try_iter().count());

        sequencer.stop();
        let after_stop: Vec<SequencerEvent> = rx.try_iter().collect();
        assert_eq!(
            after_stop,
            vec![
                SequencerEvent::StopNotes { notes: vec![60] },
                SequencerEvent::PlaybackStopped,
            ]
        );

        // Nothing left scheduled: no stray note-offs later.
        clock.advance(10_000);
        sequencer.pump();
        assert!(rx.try_iter().count() == 0);
        assert!(!sequencer.is_playing());
    }
}
