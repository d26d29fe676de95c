//! # Note Segmenter
//!
//! Hysteresis state machine that cuts the stabilized observation stream into
//! discrete note events. A new pitch must be confirmed on several consecutive
//! voiced frames before it opens (or replaces) a note, and a note only closes
//! after a run of silent frames. Notes shorter than the minimum duration are
//! dropped as transient noise.

use serde::{Deserialize, Serialize};

use crate::stabilizer::PitchObservation;
use crate::tuning::{self, frequency_to_midi, midi_to_frequency, spell_midi};

/// Consecutive frames a new pitch needs before it becomes a note.
pub const CONFIRMATION_FRAMES: u32 = 5;
/// Consecutive silent frames that close the active note.
pub const SILENCE_FRAMES: u32 = 8;
/// Shortest note that is ever emitted, in seconds.
pub const MIN_NOTE_DURATION: f64 = 0.18;
/// Observations below this confidence count as silence.
pub const SILENCE_CONFIDENCE: f32 = 0.01;

/// Tunables for [`NoteSegmenter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub confirmation_frames: u32,
    pub silence_frames: u32,
    pub min_note_duration: f64,
    pub silence_confidence: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            confirmation_frames: CONFIRMATION_FRAMES,
            silence_frames: SILENCE_FRAMES,
            min_note_duration: MIN_NOTE_DURATION,
            silence_confidence: SILENCE_CONFIDENCE,
        }
    }
}

/// A finalized, immutable note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Pitch letter, `A` to `G`.
    pub letter: char,
    /// True for the five sharp pitch classes.
    pub sharp: bool,
    /// Octave number, 4 being the middle-C octave.
    pub octave: i32,
    pub midi: i32,
    /// Start time in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Mean frequency over the frames that matched the note exactly, in Hz.
    pub frequency: f32,
}

impl NoteEvent {
    /// Builds a note from its MIDI number, spelling it on the way.
    pub fn new(midi: i32, start: f64, duration: f64, frequency: f32) -> Self {
        let (letter, sharp, octave) = spell_midi(midi);
        Self {
            letter,
            sharp,
            octave,
            midi,
            start,
            duration,
            frequency,
        }
    }

    /// Builds a note at the equal-tempered frequency of `midi`.
    pub fn from_midi(midi: i32, start: f64, duration: f64) -> Self {
        Self::new(midi, start, duration, midi_to_frequency(midi))
    }

    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Display name such as `A4` or `C#5`.
    pub fn name(&self) -> String {
        tuning::note_name(self.letter, self.sharp, self.octave)
    }

    /// Copy of this note with new timing.
    pub fn retimed(&self, start: f64, duration: f64) -> Self {
        Self {
            start,
            duration,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveNote {
    midi: i32,
    start: f64,
    frequency_sum: f64,
    frequency_count: u32,
}

impl ActiveNote {
    fn open(midi: i32, start: f64, frequency: f32) -> Self {
        Self {
            midi,
            start,
            frequency_sum: frequency as f64,
            frequency_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingCandidate {
    midi: i32,
    confirmations: u32,
}

/// Where the segmenter currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// No note and no candidate.
    Idle,
    /// A candidate pitch is collecting confirmations.
    Pending { midi: i32, confirmations: u32 },
    /// A note is accumulating.
    Active { midi: i32 },
}

/// Streaming note segmenter. One instance per recording session.
#[derive(Debug, Clone)]
pub struct NoteSegmenter {
    config: SegmenterConfig,
    active: Option<ActiveNote>,
    pending: Option<PendingCandidate>,
    silent_frames: u32,
    silence_started: Option<f64>,
}

impl Default for NoteSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

impl NoteSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            active: None,
            pending: None,
            silent_frames: 0,
            silence_started: None,
        }
    }

    pub fn state(&self) -> SegmenterState {
        match (&self.active, &self.pending) {
            (Some(active), _) => SegmenterState::Active { midi: active.midi },
            (None, Some(pending)) => SegmenterState::Pending {
                midi: pending.midi,
                confirmations: pending.confirmations,
            },
            (None, None) => SegmenterState::Idle,
        }
    }

    /// Length of the current run of silent observations.
    pub fn silent_frames(&self) -> u32 {
        self.silent_frames
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.active = None;
        self.pending = None;
        self.silent_frames = 0;
        self.silence_started = None;
    }

    /// Consumes one observation; returns a note when one was finalized.
    pub fn process_frame(&mut self, observation: &PitchObservation) -> Option<NoteEvent> {
        let frequency = observation
            .frequency
            .filter(|_| observation.confidence >= self.config.silence_confidence);

        let Some(frequency) = frequency else {
            return self.silent_frame(observation.timestamp);
        };

        self.silent_frames = 0;
        self.silence_started = None;
        let midi = frequency_to_midi(frequency);
        let now = observation.timestamp;

        if let Some(active) = self.active.as_mut() {
            let distance = (midi - active.midi).abs();
            if distance <= 1 {
                if distance == 0 {
                    active.frequency_sum += frequency as f64;
                    active.frequency_count += 1;
                }
                self.pending = None;
                return None;
            }
        }

        if !self.confirm(midi) {
            return None;
        }

        let finished = self.active.take().and_then(|active| self.finalize(active, now));
        log::debug!("Note opened at MIDI {midi} ({now:.3}s)");
        self.active = Some(ActiveNote::open(midi, now, frequency));
        finished
    }

    /// Forces out the active note at `end_time`. Call once when capture stops.
    ///
    /// If the note was already trailing off into silence, it ends where the
    /// silence began.
    pub fn flush(&mut self, end_time: f64) -> Option<NoteEvent> {
        let end = match self.silence_started {
            Some(silence) => silence.min(end_time),
            None => end_time,
        };
        self.pending = None;
        let active = self.active.take()?;
        self.finalize(active, end)
    }

    fn silent_frame(&mut self, timestamp: f64) -> Option<NoteEvent> {
        self.silent_frames += 1;
        self.pending = None;
        if self.silence_started.is_none() {
            self.silence_started = Some(timestamp);
        }

        if self.silent_frames >= self.config.silence_frames {
            let end = self.silence_started.unwrap_or(timestamp);
            if let Some(active) = self.active.take() {
                return self.finalize(active, end);
            }
        }
        None
    }

    /// Counts one confirmation for `midi`; true once the candidate is confirmed.
    fn confirm(&mut self, midi: i32) -> bool {
        let confirmations = match self.pending {
            Some(pending) if pending.midi == midi => pending.confirmations + 1,
            _ => 1,
        };
        if confirmations >= self.config.confirmation_frames {
            self.pending = None;
            true
        } else {
            self.pending = Some(PendingCandidate { midi, confirmations });
            false
        }
    }

    fn finalize(&self, active: ActiveNote, end: f64) -> Option<NoteEvent> {
        let duration = end - active.start;
        if duration < self.config.min_note_duration {
            log::debug!(
                "Dropped MIDI {} note of {:.3}s (below {:.2}s)",
                active.midi,
                duration,
                self.config.min_note_duration
            );
            return None;
        }

        let frequency = if active.frequency_count > 0 {
            (active.frequency_sum / active.frequency_count as f64) as f32
        } else {
            midi_to_frequency(active.midi)
        };
        let note = NoteEvent::new(active.midi, active.start, duration, frequency);
        log::debug!("Note {} at {:.3}s for {:.3}s", note.name(), note.start, note.duration);
        Some(note)
    }
}
