//! # Pitch Stabilizer
//!
//! Turns a jittery stream of raw per-frame frequency estimates into a stable
//! observation. A rolling history of recent estimates feeds a median
//! candidate; a locked MIDI note only changes once enough of the history
//! agrees, and the output frequency is exponentially smoothed while the lock
//! holds. Confidence comes from the frame's RMS amplitude alone.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::tuning::frequency_to_midi;

/// Number of raw estimates kept in the rolling history.
pub const HISTORY_LEN: usize = 12;
/// Votes needed to establish the first lock.
pub const INITIAL_LOCK_VOTES: usize = 5;
/// Votes needed to move the lock by exactly one semitone.
pub const SEMITONE_SWITCH_VOTES: usize = 8;
/// Votes needed to move the lock by two or more semitones.
pub const LEAP_SWITCH_VOTES: usize = 6;
/// Null entries in the history that clear the lock.
pub const SILENCE_RESET_NULLS: usize = 6;
/// Weight of the new candidate in the exponential smoother.
pub const SMOOTHING_FACTOR: f32 = 0.15;
/// Lowest plausible sung frequency in Hz.
pub const MIN_VOCAL_FREQUENCY: f32 = 80.0;
/// Highest plausible sung frequency in Hz.
pub const MAX_VOCAL_FREQUENCY: f32 = 1000.0;
/// Gain applied to frame RMS before clamping to a confidence.
pub const CONFIDENCE_GAIN: f32 = 20.0;

/// Below this many non-null entries the median is not trusted.
const MIN_MEDIAN_ENTRIES: usize = 3;

/// Tunables for [`PitchStabilizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub history_len: usize,
    pub initial_lock_votes: usize,
    pub semitone_switch_votes: usize,
    pub leap_switch_votes: usize,
    pub silence_reset_nulls: usize,
    pub smoothing_factor: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub confidence_gain: f32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_len: HISTORY_LEN,
            initial_lock_votes: INITIAL_LOCK_VOTES,
            semitone_switch_votes: SEMITONE_SWITCH_VOTES,
            leap_switch_votes: LEAP_SWITCH_VOTES,
            silence_reset_nulls: SILENCE_RESET_NULLS,
            smoothing_factor: SMOOTHING_FACTOR,
            min_frequency: MIN_VOCAL_FREQUENCY,
            max_frequency: MAX_VOCAL_FREQUENCY,
            confidence_gain: CONFIDENCE_GAIN,
        }
    }
}

/// One unprocessed frequency estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEstimate {
    /// Estimated frequency in Hz, `None` when the estimator found no pitch.
    pub frequency: Option<f32>,
    /// Frame time in seconds.
    pub timestamp: f64,
}

/// Stabilized per-frame pitch observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    /// Locked, smoothed frequency in Hz.
    pub frequency: Option<f32>,
    /// Loudness-derived confidence in `[0, 1]`.
    pub confidence: f32,
    /// Frame time in seconds.
    pub timestamp: f64,
}

/// Confidence of a block from its RMS amplitude, scaled by `gain` and clamped to `[0, 1]`.
pub fn rms_confidence(samples: &[f32], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let rms = (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    (rms * gain).clamp(0.0, 1.0)
}

/// Median of a non-empty slice; the mean of the two middle values for even lengths.
fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Rolling-history pitch lock. One instance per recording session.
#[derive(Debug, Clone)]
pub struct PitchStabilizer {
    config: StabilizerConfig,
    history: VecDeque<Option<f32>>,
    locked_midi: Option<i32>,
    smoothed: Option<f32>,
}

impl Default for PitchStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

impl PitchStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_len),
            config,
            locked_midi: None,
            smoothed: None,
        }
    }

    /// Currently locked MIDI number, if any.
    pub fn locked_midi(&self) -> Option<i32> {
        self.locked_midi
    }

    /// Clears history, lock and smoother.
    pub fn reset(&mut self) {
        self.history.clear();
        self.locked_midi = None;
        self.smoothed = None;
    }

    /// Feeds one raw estimate and the block it came from.
    pub fn process(&mut self, estimate: RawEstimate, samples: &[f32]) -> PitchObservation {
        let confidence = rms_confidence(samples, self.config.confidence_gain);
        let frequency = estimate
            .frequency
            .filter(|f| (self.config.min_frequency..=self.config.max_frequency).contains(f));

        self.history.push_back(frequency);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }

        let nulls = self.history.iter().filter(|f| f.is_none()).count();
        if nulls >= self.config.silence_reset_nulls {
            if self.locked_midi.is_some() {
                log::debug!("Silence reset: {nulls} of {} frames without pitch", self.history.len());
            }
            self.locked_midi = None;
            self.smoothed = None;
        } else if let Some(candidate) = self.candidate() {
            self.update_lock(candidate);
        }

        PitchObservation {
            frequency: self.smoothed,
            confidence,
            timestamp: estimate.timestamp,
        }
    }

    /// Median of the non-null history, or the latest entry when too few are present.
    fn candidate(&self) -> Option<f32> {
        let mut voiced: Vec<f32> = self.history.iter().flatten().copied().collect();
        if voiced.len() >= MIN_MEDIAN_ENTRIES {
            Some(median(&mut voiced))
        } else {
            voiced.last().copied()
        }
    }

    fn votes_for(&self, midi: i32) -> usize {
        self.history
            .iter()
            .flatten()
            .filter(|&&f| frequency_to_midi(f) == midi)
            .count()
    }

    fn update_lock(&mut self, candidate: f32) {
        let candidate_midi = frequency_to_midi(candidate);
        let votes = self.votes_for(candidate_midi);

        match self.locked_midi {
            None => {
                if votes >= self.config.initial_lock_votes {
                    log::debug!("Pitch locked at MIDI {candidate_midi} ({votes} votes)");
                    self.locked_midi = Some(candidate_midi);
                    self.smoothed = Some(candidate);
                }
            }
            Some(locked) if locked == candidate_midi => {
                let alpha = self.config.smoothing_factor;
                self.smoothed = Some(match self.smoothed {
                    Some(previous) => alpha * candidate + (1.0 - alpha) * previous,
                    None => candidate,
                });
            }
            Some(locked) => {
                let required = if (candidate_midi - locked).abs() == 1 {
                    self.config.semitone_switch_votes
                } else {
                    self.config.leap_switch_votes
                };
                if votes >= required {
                    log::debug!("Pitch lock moved MIDI {locked} -> {candidate_midi} ({votes} votes)");
                    self.locked_midi = Some(candidate_midi);
                    self.smoothed = Some(candidate);
                }
            }
        }
    }
}
