//! # Grid Quantization
//!
//! Snaps note timings onto a tempo grid without letting a note run into the
//! next one, plus the plain time normalization used when quantization is off.
//! Both paths are pure: they take the buffered notes and return a new melody
//! whose first note starts at zero.

use serde::{Deserialize, Serialize};

use crate::segmenter::NoteEvent;
use crate::tempo::{DEFAULT_BPM, estimate_tempo};

/// Lowest tempo accepted from a manual setting.
pub const MIN_MANUAL_BPM: u32 = 40;
/// Highest tempo accepted from a manual setting.
pub const MAX_MANUAL_BPM: u32 = 240;
/// Default grid units per quarter note (eighth-note grid is 2, sixteenth is 4, ...).
pub const DEFAULT_SUBDIVISION: u32 = 8;
/// Gap kept between a quantized note's end and the next note's start, in seconds.
pub const OVERLAP_GAP: f64 = 0.01;

/// Tempo grid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationGrid {
    pub bpm: u32,
    /// Grid units per quarter note.
    pub subdivision: u32,
    /// Swing amount; carried in configuration but not applied by the grid.
    pub swing: f32,
}

impl Default for QuantizationGrid {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            subdivision: DEFAULT_SUBDIVISION,
            swing: 0.0,
        }
    }
}

impl QuantizationGrid {
    pub fn new(bpm: u32, subdivision: u32) -> Self {
        Self {
            bpm: clamp_manual_bpm(bpm),
            subdivision: subdivision.max(1),
            swing: 0.0,
        }
    }

    /// Length of one grid unit in seconds: `(60 / bpm) / (subdivision / 4)`.
    pub fn grid_unit(&self) -> f64 {
        let beat = 60.0 / self.bpm.max(1) as f64;
        beat / (self.subdivision.max(1) as f64 / 4.0)
    }

    /// Sets the tempo from user input, clamped to the manual range.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = clamp_manual_bpm(bpm);
    }
}

/// Clamps a manually entered tempo to `[40, 240]`.
pub fn clamp_manual_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_MANUAL_BPM, MAX_MANUAL_BPM)
}

fn snap(time: f64, unit: f64) -> f64 {
    (time / unit).round() * unit
}

/// Snaps starts and durations to the grid.
///
/// Starts are measured from the first note's original start. Every duration
/// is at least one grid unit and is capped so the note ends [`OVERLAP_GAP`]
/// before the next quantized start; if that cap would fall below one grid
/// unit the note keeps exactly one unit, so extremely tight spacing may still
/// overlap slightly.
///
/// A note already held up to its cap stays capped, which keeps re-quantizing
/// a quantized melody a no-op even when the grid unit is finer than the gap.
pub fn quantize(notes: &[NoteEvent], grid: &QuantizationGrid) -> Vec<NoteEvent> {
    let Some(first) = notes.first() else {
        return Vec::new();
    };
    let unit = grid.grid_unit();
    let reference = first.start;
    let starts: Vec<f64> = notes.iter().map(|n| snap(n.start - reference, unit)).collect();

    notes
        .iter()
        .enumerate()
        .map(|(i, note)| {
            let start = starts[i];
            let units = (note.duration / unit).round().max(1.0);
            let mut duration = units * unit;
            if let Some(&next_start) = starts.get(i + 1) {
                let cap = next_start - OVERLAP_GAP - start;
                if duration > cap || note.duration >= cap {
                    duration = if cap < unit { unit } else { cap };
                }
            }
            note.retimed(start, duration)
        })
        .collect()
}

/// Quantizes, optionally replacing the grid tempo with an estimate from the notes first.
///
/// Returns the quantized melody and the tempo that was used.
pub fn quantize_with_tempo(
    notes: &[NoteEvent],
    grid: &QuantizationGrid,
    auto_tempo: bool,
) -> (Vec<NoteEvent>, u32) {
    if auto_tempo {
        let grid = QuantizationGrid {
            bpm: estimate_tempo(notes),
            ..grid.clone()
        };
        (quantize(notes, &grid), grid.bpm)
    } else {
        (quantize(notes, grid), grid.bpm)
    }
}

/// Shifts every note so the first one starts at zero; durations are untouched.
pub fn normalize_times(notes: &[NoteEvent]) -> Vec<NoteEvent> {
    let Some(first) = notes.first() else {
        return Vec::new();
    };
    let reference = first.start;
    notes
        .iter()
        .map(|n| n.retimed(n.start - reference, n.duration))
        .collect()
}
