//! # Notation Encoder
//!
//! Renders a melody as ABC notation: a fixed 4/4, C-major header with an
//! eighth-note base length, then one token per note with bar lines every
//! eight eighths.
//!
//! Durations are rounded into four buckets (eighth, quarter, half, whole) by
//! [`duration_units`]. The same function decides the token suffix, the bar
//! placement and the playback length, so the three can never disagree.

use crate::segmenter::NoteEvent;

/// Eighth-note units in one 4/4 bar.
pub const UNITS_PER_BAR: u32 = 8;

const BAR_LINE: &str = "|";
const FINAL_BAR: &str = "|]";

/// Length of an eighth note at `bpm`, in seconds.
pub fn eighth_seconds(bpm: u32) -> f64 {
    60.0 / bpm.max(1) as f64 / 2.0
}

/// Rounds a duration into eighth-note units: 1, 2, 4 or 8.
///
/// With `ratio = duration / eighth`: up to 1.5 is an eighth, up to 3 a
/// quarter, up to 6 a half, anything longer a whole note.
pub fn duration_units(duration: f64, bpm: u32) -> u32 {
    let ratio = duration / eighth_seconds(bpm);
    if ratio <= 1.5 {
        1
    } else if ratio <= 3.0 {
        2
    } else if ratio <= 6.0 {
        4
    } else {
        8
    }
}

/// How long a note sounds when the notation is played back, in seconds.
pub fn playback_seconds(duration: f64, bpm: u32) -> f64 {
    duration_units(duration, bpm) as f64 * eighth_seconds(bpm)
}

/// Fixed header: reference number, meter, base length, tempo and key.
pub fn header(bpm: u32) -> String {
    format!("X:1\nM:4/4\nL:1/8\nQ:1/4={bpm}\nK:C\n")
}

/// Pitch part of a token: sharp marker, letter and octave marks.
///
/// Octave 4 is the plain uppercase letter, octave 5 and above lowercase with
/// one `'` per octave above 5, octave 3 and below uppercase with one `,` per
/// octave below 4.
pub fn pitch_token(note: &NoteEvent) -> String {
    let mut token = String::new();
    if note.sharp {
        token.push('^');
    }
    let letter = note.letter.to_ascii_uppercase();
    if note.octave >= 5 {
        token.push(letter.to_ascii_lowercase());
        for _ in 5..note.octave {
            token.push('\'');
        }
    } else {
        token.push(letter);
        for _ in note.octave..4 {
            token.push(',');
        }
    }
    token
}

fn length_suffix(units: u32) -> String {
    if units == 1 {
        String::new()
    } else {
        units.to_string()
    }
}

/// Full token for one note: pitch plus duration suffix.
pub fn note_token(note: &NoteEvent, bpm: u32) -> String {
    let units = duration_units(note.duration, bpm);
    format!("{}{}", pitch_token(note), length_suffix(units))
}

/// Encodes a time-normalized melody. An empty melody encodes to an empty string.
pub fn encode(notes: &[NoteEvent], bpm: u32) -> String {
    if notes.is_empty() {
        return String::new();
    }

    let mut tokens: Vec<String> = Vec::with_capacity(notes.len() * 2);
    let mut units_in_bar = 0;
    for note in notes {
        tokens.push(note_token(note, bpm));
        units_in_bar += duration_units(note.duration, bpm);
        if units_in_bar >= UNITS_PER_BAR {
            tokens.push(BAR_LINE.to_string());
            units_in_bar -= UNITS_PER_BAR;
        }
    }
    if tokens.last().map(String::as_str) == Some(BAR_LINE) {
        tokens.pop();
    }
    tokens.push(FINAL_BAR.to_string());

    let mut out = header(bpm);
    out.push_str(&tokens.join(" "));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(midi: i32, duration: f64) -> NoteEvent {
        NoteEvent::from_midi(midi, 0.0, duration)
    }

    #[test]
    fn empty_melody_has_no_header() {
        assert_eq!(encode(&[], 120), "");
    }

    #[test]
    fn buckets() {
        // Eighth at 120 BPM is 0.25s.
        assert_eq!(duration_units(0.25, 120), 1);
        assert_eq!(duration_units(0.375, 120), 1);
        assert_eq!(duration_units(0.5, 120), 2);
        assert_eq!(duration_units(0.75, 120), 2);
        assert_eq!(duration_units(1.0, 120), 4);
        assert_eq!(duration_units(1.5, 120), 4);
        assert_eq!(duration_units(1.6, 120), 8);
    }

    #[test]
    fn playback_matches_buckets() {
        assert!((playback_seconds(0.49, 120) - 0.5).abs() < 1e-12);
        assert!((playback_seconds(0.9, 120) - 1.0).abs() < 1e-12);
        assert!((playback_seconds(0.1, 60) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn octave_marks() {
        assert_eq!(pitch_token(&note(60, 0.25)), "C");
        assert_eq!(pitch_token(&note(72, 0.25)), "c");
        assert_eq!(pitch_token(&note(84, 0.25)), "c'");
        assert_eq!(pitch_token(&note(96, 0.25)), "c''");
        assert_eq!(pitch_token(&note(59, 0.25)), "B,");
        assert_eq!(pitch_token(&note(47, 0.25)), "B,,");
        assert_eq!(pitch_token(&note(70, 0.25)), "^A");
        assert_eq!(pitch_token(&note(73, 0.25)), "^c");
    }

    #[test]
    fn header_and_body() {
        let melody = vec![note(69, 0.5), note(71, 0.5)];
        let text = encode(&melody, 120);
        assert_eq!(text, "X:1\nM:4/4\nL:1/8\nQ:1/4=120\nK:C\nA2 B2 |]\n");
    }

    #[test]
    fn bars_every_eight_units() {
        let melody = vec![
            note(60, 1.0),
            note(62, 0.5),
            note(64, 0.25),
            note(65, 0.25),
            note(67, 2.0),
            note(69, 0.5),
        ];
        let text = encode(&melody, 120);
        let body = text.lines().last().unwrap_or_default();
        assert_eq!(body, "C4 D2 E F | G8 | A2 |]");
    }

    #[test]
    fn overfull_bar_carries_remainder() {
        // 4 + 8 units: the bar closes after the whole note with 4 left over.
        let melody = vec![note(60, 1.0), note(62, 2.0), note(64, 1.0)];
        let body = encode(&melody, 120).lines().last().unwrap_or_default().to_string();
        assert_eq!(body, "C4 D8 | E4 |]");
    }

    #[test]
    fn encoding_is_deterministic() {
        let melody = vec![note(61, 0.3), note(75, 0.8), note(50, 1.7)];
        assert_eq!(encode(&melody, 90), encode(&melody, 90));
    }
}
