//! Standard MIDI File rendering for exported sequences.
//!
//! [`render_midi_file`] serializes an [`ExportedSequence`] as a single-track
//! format-1 file: header chunk, tempo meta event, a program change, then one
//! note-on/note-off pair per sounded note with delta times encoded as
//! variable-length quantities. Pure byte generation, no I/O.

use thiserror::Error;

use crate::sequencer::ExportedSequence;

/// Pulses per quarter note written to the header.
const TICKS_PER_QUARTER: u16 = 480;
/// Gap, in ticks, between the last event and the end-of-track meta.
const END_OF_TRACK_PAD_TICKS: u32 = 480;

/// The sequence cannot be rendered.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MidiError {
    /// There are no events to write.
    #[error("cannot render an empty sequence")]
    EmptySequence,
    /// The requested instrument program is not a MIDI program number.
    #[error("program {0} is outside the MIDI range 0..=127")]
    ProgramOutOfRange(u8),
}

/// Render `sequence` as a single-track format-1 Standard MIDI File.
///
/// `program` selects the General MIDI instrument for channel 0 (see
/// [`Instrument::general_midi_program`](crate::timbre::Instrument::general_midi_program)).
/// The file carries a tempo meta event so players honor the sequence's own
/// tempo, and the end-of-track meta lands one beat after the final note-off.
pub fn render_midi_file(sequence: &ExportedSequence, program: u8) -> Result<Vec<u8>, MidiError> {
    if sequence.events.is_empty() {
        return Err(MidiError::EmptySequence);
    }
    if program > 127 {
        return Err(MidiError::ProgramOutOfRange(program));
    }

    let ms_per_tick = 60_000.0 / f64::from(sequence.tempo_bpm) / f64::from(TICKS_PER_QUARTER);
    let tick_at = |ms: u64| (ms as f64 / ms_per_tick).round() as u32;

    // (absolute tick, raw event bytes); deltas come from the sorted list.
    let mut timed: Vec<(u32, Vec<u8>)> = Vec::new();
    let microseconds_per_quarter = 60_000_000 / sequence.tempo_bpm;
    let [_, t2, t1, t0] = microseconds_per_quarter.to_be_bytes();
    timed.push((0, vec![0xFF, 0x51, 0x03, t2, t1, t0]));
    timed.push((0, vec![0xC0, program]));

    for event in &sequence.events {
        let on = tick_at(event.timestamp_ms());
        let off = tick_at(event.timestamp_ms() + event.duration_ms());
        for note in event.midi_notes() {
            timed.push((on, vec![0x90, note, event.velocity()]));
            timed.push((off, vec![0x80, note, 0]));
        }
    }

    let last = timed.iter().map(|(tick, _)| *tick).max().unwrap_or(0);
    timed.push((
        last.saturating_add(END_OF_TRACK_PAD_TICKS),
        vec![0xFF, 0x2F, 0x00],
    ));
    timed.sort_by_key(|(tick, _)| *tick);

    let mut track = Vec::new();
    let mut previous = 0;
    for (tick, bytes) in &timed {
        push_variable_length(&mut track, tick - previous);
        track.extend_from_slice(bytes);
        previous = *tick;
    }

    let mut file = Vec::with_capacity(14 + 8 + track.len());
    file.extend_from_slice(b"MThd");
    file.extend_from_slice(&6u32.to_be_bytes());
    file.extend_from_slice(&1u16.to_be_bytes());
    file.extend_from_slice(&1u16.to_be_bytes());
    file.extend_from_slice(&TICKS_PER_QUARTER.to_be_bytes());
    file.extend_from_slice(b"MTrk");
    file.extend_from_slice(&(track.len() as u32).to_be_bytes());
    file.extend_from_slice(&track);
    Ok(file)
}

/// Append `value` in the variable-length quantity encoding: seven bits per
/// byte, high bit set on every byte but the last.
fn push_variable_length(out: &mut Vec<u8>, value: u32) {
    let mut buffer = [0u8; 5];
    let mut index = buffer.len() - 1;
    buffer[index] = (value & 0x7F) as u8;
    let mut rest = value >> 7;
    while rest > 0 {
        index -= 1;
        buffer[index] = ((rest & 0x7F) | 0x80) as u8;
        rest >>= 7;
    }
    out.extend_from_slice(&buffer[index..]);
}
