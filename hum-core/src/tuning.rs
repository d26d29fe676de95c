//! # Musical Tuning Module
//!
//! Equal-tempered pitch mapping used by every stage of the transcription
//! pipeline. All conversions are anchored at A4 = 440 Hz = MIDI 69.
//!
//! ## Features
//! - Frequency to nearest MIDI number and back
//! - Pitch letter, sharp flag and octave for a MIDI number (sharps only, no flats)
//! - Cent deviation calculations
//! - A precomputed frequency table for the full MIDI range

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI number of A4.
pub const A4_MIDI: i32 = 69;

/// Pitch letters per pitch class, starting at C. The sharp flag is kept separately.
const PITCH_CLASSES: [(char, bool); 12] = [
    ('C', false),
    ('C', true),
    ('D', false),
    ('D', true),
    ('E', false),
    ('F', false),
    ('F', true),
    ('G', false),
    ('G', true),
    ('A', false),
    ('A', true),
    ('B', false),
];

/// Statically computed equal-tempered frequencies for MIDI notes 0 to 127.
///
/// Computed once on first use; lookups outside this range fall back to the
/// closed-form formula.
static MIDI_FREQUENCIES: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..128)
        .map(|midi| A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0))
        .collect()
});

/// Spelled pitch of a single equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchInfo {
    /// Pitch letter, `A` to `G`.
    pub letter: char,
    /// True for the five sharp pitch classes.
    pub sharp: bool,
    /// Octave number, 4 being the middle-C octave.
    pub octave: i32,
    /// Nearest MIDI number.
    pub midi: i32,
    /// Deviation of the measured frequency from the nearest note, in cents.
    pub cents: f32,
}

impl PitchInfo {
    /// Display name such as `A4` or `C#5`.
    pub fn note_name(&self) -> String {
        note_name(self.letter, self.sharp, self.octave)
    }
}

/// Formats a note name from its parts.
pub fn note_name(letter: char, sharp: bool, octave: i32) -> String {
    if sharp {
        format!("{letter}#{octave}")
    } else {
        format!("{letter}{octave}")
    }
}

/// Fractional MIDI number of a frequency.
pub fn frequency_to_midi_float(freq: f32) -> f32 {
    12.0 * (freq / A4_FREQUENCY).log2() + A4_MIDI as f32
}

/// Nearest MIDI number: `round(12 * log2(freq / 440) + 69)`.
pub fn frequency_to_midi(freq: f32) -> i32 {
    frequency_to_midi_float(freq).round() as i32
}

/// Equal-tempered frequency of a MIDI number.
pub fn midi_to_frequency(midi: i32) -> f32 {
    match usize::try_from(midi).ok().and_then(|i| MIDI_FREQUENCIES.get(i)) {
        Some(&freq) => freq,
        None => A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0),
    }
}

/// Letter, sharp flag and octave of a MIDI number.
pub fn spell_midi(midi: i32) -> (char, bool, i32) {
    let (letter, sharp) = PITCH_CLASSES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    (letter, sharp, octave)
}

/// Finds the nearest equal-tempered note to a frequency and spells it.
///
/// # Arguments
/// * `freq` - Measured frequency in Hz (must be positive)
///
/// # Returns
/// * `PitchInfo` with the nearest note and the deviation from it in cents
pub fn pitch_info(freq: f32) -> PitchInfo {
    let midi = frequency_to_midi(freq);
    let (letter, sharp, octave) = spell_midi(midi);
    PitchInfo {
        letter,
        sharp,
        octave,
        midi,
        cents: calculate_cents_deviation(freq, midi_to_frequency(midi)),
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a440_maps_to_a4() {
        let info = pitch_info(440.0);
        assert_eq!(info.letter, 'A');
        assert!(!info.sharp);
        assert_eq!(info.octave, 4);
        assert_eq!(info.midi, 69);
        assert!(info.cents.abs() < 1e-3);
        assert_eq!(info.note_name(), "A4");
    }

    #[test]
    fn octave_above_a4_is_midi_81() {
        assert_eq!(frequency_to_midi(880.0), 81);
        assert_eq!(pitch_info(880.0).octave, 5);
    }

    #[test]
    fn middle_c_and_sharps() {
        assert_eq!(spell_midi(60), ('C', false, 4));
        assert_eq!(spell_midi(61), ('C', true, 4));
        assert_eq!(spell_midi(59), ('B', false, 3));
        assert_eq!(pitch_info(277.18).note_name(), "C#4");
    }

    #[test]
    fn table_matches_formula() {
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((midi_to_frequency(60) - 261.6256).abs() < 1e-2);
        // Outside the table range.
        assert!((midi_to_frequency(129) - 440.0 * 2.0_f32.powf(5.0)).abs() < 1.0);
    }

    #[test]
    fn cents_are_signed() {
        assert!(calculate_cents_deviation(445.0, 440.0) > 0.0);
        assert!(calculate_cents_deviation(435.0, 440.0) < 0.0);
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-3);
    }
}
