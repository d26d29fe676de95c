//! # Transcription Session
//!
//! Owns one stabilizer and one segmenter for the life of a recording, the
//! buffered raw notes they produce, and everything derived from those notes.
//!
//! The raw notes are the single source of truth. The time-normalized melody,
//! the quantized melody and the notation text are rebuilt from them whenever
//! a note arrives, the tempo changes or quantization is toggled, so switching
//! modes back and forth never loses anything.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::BUFFER_SIZE;
use crate::config::TranscriberConfig;
use crate::notation;
use crate::pitch::FrequencyEstimator;
use crate::quantize::{normalize_times, quantize_with_tempo};
use crate::segmenter::{NoteEvent, NoteSegmenter};
use crate::stabilizer::{PitchObservation, PitchStabilizer, RawEstimate};
use crate::tuning::{PitchInfo, pitch_info};

/// Result of one frame, for live display.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Stabilized observation for this frame.
    pub observation: PitchObservation,
    /// Nearest note and cents of the stabilized frequency.
    pub pitch: Option<PitchInfo>,
    /// Note finalized on this frame, if any.
    pub note: Option<NoteEvent>,
}

/// Outcome of a finished recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionStatus {
    /// Nothing singable was heard.
    NoNotes,
    /// This many notes were transcribed.
    Notes(usize),
}

/// Live transcription pipeline plus its derived melodies.
#[derive(Debug, Clone)]
pub struct Transcriber {
    config: TranscriberConfig,
    /// Tempo a fresh take starts from; auto-tempo only overrides it per take.
    configured_bpm: u32,
    stabilizer: PitchStabilizer,
    segmenter: NoteSegmenter,
    raw_notes: Vec<NoteEvent>,
    melody: Vec<NoteEvent>,
    quantized: Vec<NoteEvent>,
    encoding: String,
    finished: bool,
}

impl Default for Transcriber {
    fn default() -> Self {
        Self::new(TranscriberConfig::default())
    }
}

impl Transcriber {
    pub fn new(mut config: TranscriberConfig) -> Self {
        config.grid.set_bpm(config.grid.bpm);
        Self {
            stabilizer: PitchStabilizer::new(config.stabilizer.clone()),
            segmenter: NoteSegmenter::new(config.segmenter.clone()),
            configured_bpm: config.grid.bpm,
            config,
            raw_notes: Vec::new(),
            melody: Vec::new(),
            quantized: Vec::new(),
            encoding: String::new(),
            finished: false,
        }
    }

    /// Rebuilds a finished session from previously captured raw notes.
    pub fn from_notes(config: TranscriberConfig, notes: Vec<NoteEvent>) -> Self {
        let mut transcriber = Self::new(config);
        transcriber.raw_notes = notes;
        transcriber.finished = true;
        transcriber.regenerate();
        transcriber
    }

    /// Feeds one frame: the raw estimate and the block it was made from.
    pub fn process_frame(&mut self, estimate: RawEstimate, samples: &[f32]) -> FrameResult {
        let observation = self.stabilizer.process(estimate, samples);
        let note = self.segmenter.process_frame(&observation);
        if let Some(note) = &note {
            self.push_note(note.clone());
        }
        FrameResult {
            observation,
            pitch: observation.frequency.map(pitch_info),
            note,
        }
    }

    /// Closes the recording at `end_time`.
    ///
    /// Flushes the active note, estimates the tempo when auto-tempo is on,
    /// and rebuilds the derived melodies. Later calls do nothing.
    pub fn finish(&mut self, end_time: f64) -> TranscriptionStatus {
        if self.finished {
            return self.status();
        }
        self.finished = true;
        if let Some(note) = self.segmenter.flush(end_time) {
            self.raw_notes.push(note);
        }
        self.rebuild(self.config.auto_tempo);
        log::info!(
            "Transcription finished: {} notes at {} BPM",
            self.raw_notes.len(),
            self.config.grid.bpm
        );
        self.status()
    }

    /// Drops all notes and pipeline state, keeping the configuration.
    ///
    /// A tempo detected for the previous take is discarded.
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.segmenter.reset();
        self.raw_notes.clear();
        self.finished = false;
        self.config.grid.bpm = self.configured_bpm;
        self.regenerate();
    }

    /// Sets the tempo manually (clamped to 40..=240) and rebuilds.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.config.grid.set_bpm(bpm);
        self.configured_bpm = self.config.grid.bpm;
        self.regenerate();
    }

    /// Estimates the tempo from the raw notes, applies it and returns it.
    pub fn detect_tempo(&mut self) -> u32 {
        self.rebuild(true);
        self.config.grid.bpm
    }

    pub fn set_quantize(&mut self, enabled: bool) {
        self.config.quantize = enabled;
        self.regenerate();
    }

    /// Flips quantization and returns the new setting.
    pub fn toggle_quantize(&mut self) -> bool {
        self.set_quantize(!self.config.quantize);
        self.config.quantize
    }

    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    pub fn bpm(&self) -> u32 {
        self.config.grid.bpm
    }

    pub fn quantize_enabled(&self) -> bool {
        self.config.quantize
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Notes as emitted by the segmenter, with their original timestamps.
    pub fn raw_notes(&self) -> &[NoteEvent] {
        &self.raw_notes
    }

    /// Raw notes shifted so the first starts at zero.
    pub fn melody(&self) -> &[NoteEvent] {
        &self.melody
    }

    /// Raw notes snapped to the current grid.
    pub fn quantized_melody(&self) -> &[NoteEvent] {
        &self.quantized
    }

    /// The melody the notation is built from in the current mode.
    pub fn current_melody(&self) -> &[NoteEvent] {
        if self.config.quantize {
            &self.quantized
        } else {
            &self.melody
        }
    }

    /// ABC notation of the current melody; empty when there are no notes.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn status(&self) -> TranscriptionStatus {
        match self.raw_notes.len() {
            0 => TranscriptionStatus::NoNotes,
            n => TranscriptionStatus::Notes(n),
        }
    }

    /// Snapshot suitable for saving.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            config: self.config.clone(),
            raw_notes: self.raw_notes.clone(),
            quantized_notes: self.quantized.clone(),
            encoding: self.encoding.clone(),
        }
    }

    fn push_note(&mut self, note: NoteEvent) {
        self.raw_notes.push(note);
        self.regenerate();
    }

    fn regenerate(&mut self) {
        self.rebuild(false);
    }

    /// Rederives everything from the raw notes, re-estimating the tempo first if asked.
    fn rebuild(&mut self, auto_tempo: bool) {
        let (quantized, bpm) = quantize_with_tempo(&self.raw_notes, &self.config.grid, auto_tempo);
        self.config.grid.bpm = bpm;
        self.melody = normalize_times(&self.raw_notes);
        self.quantized = quantized;
        self.encoding = notation::encode(self.current_melody(), bpm);
    }
}

/// A saved session: configuration, raw notes and what was derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub config: TranscriberConfig,
    pub raw_notes: Vec<NoteEvent>,
    pub quantized_notes: Vec<NoteEvent>,
    pub encoding: String,
}

impl SessionRecord {
    /// Writes the record as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing session {}", path.display()))?;
        Ok(())
    }

    /// Reads a record written by [`SessionRecord::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading session {}", path.display()))?;
        let record = serde_json::from_str(&data)
            .with_context(|| format!("parsing session {}", path.display()))?;
        Ok(record)
    }

    /// Rebuilds a transcriber from the raw notes; derived fields are recomputed.
    pub fn into_transcriber(self) -> Transcriber {
        Transcriber::from_notes(self.config, self.raw_notes)
    }
}

/// Runs a whole mono recording through the frame pipeline and finishes it.
///
/// The buffer is cut into [`BUFFER_SIZE`] blocks; a trailing partial block is ignored.
pub fn transcribe_samples<E: FrequencyEstimator>(
    samples: &[f32],
    sample_rate: u32,
    estimator: &mut E,
    config: TranscriberConfig,
) -> Transcriber {
    let mut transcriber = Transcriber::new(config);
    if sample_rate == 0 {
        transcriber.finish(0.0);
        return transcriber;
    }
    let block_seconds = BUFFER_SIZE as f64 / sample_rate as f64;
    for (i, block) in samples.chunks_exact(BUFFER_SIZE).enumerate() {
        let estimate = RawEstimate {
            frequency: estimator.estimate(block, sample_rate),
            timestamp: i as f64 * block_seconds,
        };
        transcriber.process_frame(estimate, block);
    }
    transcriber.finish(samples.len() as f64 / sample_rate as f64);
    transcriber
}
