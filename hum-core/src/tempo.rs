//! # Tempo Estimation
//!
//! Best-effort BPM estimate for a finished melody. Plausible note durations
//! are grouped in a single ascending pass; the most populated group is taken
//! as one quarter note. Group membership depends on input order at the
//! tolerance boundary, which is expected for this heuristic.

use crate::segmenter::NoteEvent;

/// Tempo returned when there is too little material to estimate from.
pub const DEFAULT_BPM: u32 = 120;
/// Lowest auto-detected tempo.
pub const MIN_DETECTED_BPM: f64 = 60.0;
/// Highest auto-detected tempo.
pub const MAX_DETECTED_BPM: f64 = 180.0;
/// Durations at or below this are too short to be a beat, in seconds.
pub const MIN_BEAT_DURATION: f64 = 0.1;
/// Durations at or above this are too long to be a beat, in seconds.
pub const MAX_BEAT_DURATION: f64 = 2.0;
/// Maximum distance from a cluster mean for a duration to join it, in seconds.
pub const CLUSTER_TOLERANCE: f64 = 0.15;

#[derive(Debug, Clone, Copy)]
struct DurationCluster {
    mean: f64,
    count: usize,
}

/// Groups ascending durations into clusters by running mean.
fn cluster_durations(durations: &[f64]) -> Vec<DurationCluster> {
    let mut clusters: Vec<DurationCluster> = Vec::new();
    for &duration in durations {
        match clusters
            .iter_mut()
            .find(|c| (c.mean - duration).abs() <= CLUSTER_TOLERANCE)
        {
            Some(cluster) => {
                cluster.count += 1;
                cluster.mean += (duration - cluster.mean) / cluster.count as f64;
            }
            None => clusters.push(DurationCluster {
                mean: duration,
                count: 1,
            }),
        }
    }
    clusters
}

/// Estimates the tempo of a melody in beats per minute.
///
/// Always returns a value in `[60, 180]`; fewer than two notes, or no
/// plausible beat durations, yield [`DEFAULT_BPM`].
pub fn estimate_tempo(notes: &[NoteEvent]) -> u32 {
    if notes.len() < 2 {
        return DEFAULT_BPM;
    }

    let mut durations: Vec<f64> = notes
        .iter()
        .map(|n| n.duration)
        .filter(|&d| d > MIN_BEAT_DURATION && d < MAX_BEAT_DURATION)
        .collect();
    if durations.is_empty() {
        return DEFAULT_BPM;
    }
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let clusters = cluster_durations(&durations);
    // First cluster wins ties.
    let Some(dominant) = clusters
        .iter()
        .fold(None::<&DurationCluster>, |best, c| match best {
            Some(b) if b.count >= c.count => Some(b),
            _ => Some(c),
        })
    else {
        return DEFAULT_BPM;
    };

    let mut bpm = 60.0 / dominant.mean;
    if bpm > MAX_DETECTED_BPM {
        bpm /= 2.0;
    } else if bpm < MIN_DETECTED_BPM {
        bpm *= 2.0;
    }
    let bpm = bpm.clamp(MIN_DETECTED_BPM, MAX_DETECTED_BPM).round() as u32;

    log::debug!(
        "Tempo {bpm} BPM from {} durations in {} clusters (beat {:.3}s)",
        durations.len(),
        clusters.len(),
        dominant.mean
    );
    bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    fn melody(durations: &[f64]) -> Vec<NoteEvent> {
        let mut start = 0.0;
        durations
            .iter()
            .map(|&d| {
                let note = NoteEvent::from_midi(69, start, d);
                start += d;
                note
            })
            .collect()
    }

    #[test]
    fn too_few_notes_use_default() {
        assert_eq!(estimate_tempo(&[]), DEFAULT_BPM);
        assert_eq!(estimate_tempo(&melody(&[0.5])), DEFAULT_BPM);
    }

    #[test]
    fn implausible_durations_use_default() {
        assert_eq!(estimate_tempo(&melody(&[0.05, 2.5, 3.0])), DEFAULT_BPM);
    }

    #[test]
    fn steady_quarters() {
        assert_eq!(estimate_tempo(&melody(&[0.5, 0.52, 0.48, 0.5, 1.0])), 120);
        assert_eq!(estimate_tempo(&melody(&[0.6, 0.6, 0.6, 1.2])), 100);
    }

    #[test]
    fn fast_beats_are_halved() {
        // 60 / 0.25 = 240 -> 120
        assert_eq!(estimate_tempo(&melody(&[0.25, 0.25, 0.25, 0.5])), 120);
    }

    #[test]
    fn slow_beats_are_doubled() {
        // 60 / 1.5 = 40 -> 80
        assert_eq!(estimate_tempo(&melody(&[1.5, 1.5, 1.5])), 80);
    }

    #[test]
    fn result_is_clamped() {
        // 60 / 0.15 = 400 -> 200 -> 180
        assert_eq!(estimate_tempo(&melody(&[0.15, 0.15, 0.15])), 180);
        // 60 / 1.9 = 31.6 -> 63.2 -> 63
        assert_eq!(estimate_tempo(&melody(&[1.9, 1.9])), 63);
    }

    #[test]
    fn ties_go_to_the_shorter_cluster() {
        assert_eq!(estimate_tempo(&melody(&[0.5, 0.5, 1.0, 1.0])), 120);
    }

    #[test]
    fn estimate_is_in_range() {
        for d in [0.11, 0.2, 0.33, 0.75, 1.2, 1.99] {
            let bpm = estimate_tempo(&melody(&[d, d, d]));
            assert!((60..=180).contains(&bpm), "{d}s gave {bpm} BPM");
        }
    }
}
