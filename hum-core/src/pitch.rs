//! # Pitch Detection Module
//!
//! The frequency estimation primitive consumed by the transcription pipeline.
//! The pipeline treats it as opaque: one sample block in, one optional
//! frequency out. The default implementation is a YIN detector followed by a
//! spectral peak refinement.
//!
//! ## Features
//! - YIN pitch detection with octave error prevention
//! - Noise rejection through amplitude gating and clarity checking
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement for improved precision

use rustfft::FftPlanner;

use crate::fft;

/// Minimum RMS for a block to be analysed at all.
pub const DEFAULT_AMPLITUDE_THRESHOLD: f32 = 0.01;

/// Maximum normalized difference at the chosen period; above it the block is noise.
const CLARITY_THRESHOLD: f32 = 0.1;

/// Anything that turns a block of samples into an optional fundamental frequency.
pub trait FrequencyEstimator {
    /// Estimates the fundamental frequency of `block` in Hz, or `None` for
    /// silence, noise or an unusable block.
    fn estimate(&mut self, block: &[f32], sample_rate: u32) -> Option<f32>;
}

/// YIN detector with spectral refinement.
pub struct YinEstimator {
    amplitude_threshold: f32,
    refine: bool,
    planner: FftPlanner<f32>,
}

impl std::fmt::Debug for YinEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YinEstimator")
            .field("amplitude_threshold", &self.amplitude_threshold)
            .field("refine", &self.refine)
            .finish()
    }
}

impl Default for YinEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_AMPLITUDE_THRESHOLD)
    }
}

impl YinEstimator {
    pub fn new(amplitude_threshold: f32) -> Self {
        Self {
            amplitude_threshold,
            refine: true,
            planner: FftPlanner::new(),
        }
    }

    /// Enables or disables the FFT refinement pass.
    pub fn with_refinement(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }
}

impl FrequencyEstimator for YinEstimator {
    fn estimate(&mut self, block: &[f32], sample_rate: u32) -> Option<f32> {
        let rough = detect_pitch_yin(block, sample_rate, self.amplitude_threshold)?;
        if !self.refine {
            return Some(rough);
        }
        let spectrum = fft::perform_fft(&mut self.planner, block);
        let magnitudes = fft::spectrum_to_magnitudes(&spectrum);
        refine_from_spectrum(&magnitudes, rough, sample_rate).or(Some(rough))
    }
}

/// YIN pitch detection.
///
/// # Arguments
/// * `signal` - Input audio block
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude_threshold` - Minimum RMS for pitch detection
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected (silence, noise, or invalid signal)
pub fn detect_pitch_yin(signal: &[f32], sample_rate: u32, amplitude_threshold: f32) -> Option<f32> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 4 || sample_rate == 0 {
        return None;
    }

    // --- Noise Gate ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < amplitude_threshold {
        return None;
    }

    // --- Difference function ---
    let mut yin_buffer = vec![0.0; half];
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- First significant dip, to avoid octave errors ---
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .cloned()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = 0;
    for tau in 2..half {
        if yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1] {
            period = tau;
            break;
        }
    }
    if period == 0 {
        return None;
    }
    // Descend to the bottom of the dip.
    while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // --- Clarity check ---
    if yin_buffer[period] > CLARITY_THRESHOLD {
        return None;
    }

    // --- Parabolic interpolation ---
    if period + 1 >= half {
        return None;
    }
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    if frequency.is_finite() && frequency > 20.0 {
        Some(frequency)
    } else {
        None
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Looks for the strongest bin within two bins of the estimate and
/// interpolates its log-magnitude neighbourhood.
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate (or the input when no
///   better peak is found)
/// * `None` - The estimate itself is unusable
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 || sample_rate == 0 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin = match spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
    {
        Some((offset, _)) => start_bin + offset,
        None => return Some(rough_freq),
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f32 + peak_shift;
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    // A refinement that wanders more than half a semitone is a neighbouring partial.
    if final_freq.is_finite() && final_freq > 0.0 && (final_freq / rough_freq - 1.0).abs() < 0.03 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn yin_finds_a440() {
        let block = sine(440.0, 44100, 2048, 0.5);
        let freq = detect_pitch_yin(&block, 44100, DEFAULT_AMPLITUDE_THRESHOLD);
        assert!(freq.is_some());
        let freq = freq.unwrap_or_default();
        assert!((freq - 440.0).abs() < 5.0, "got {freq}");
    }

    #[test]
    fn silence_is_gated() {
        let block = vec![0.0; 2048];
        assert_eq!(detect_pitch_yin(&block, 44100, DEFAULT_AMPLITUDE_THRESHOLD), None);
        let quiet = sine(440.0, 44100, 2048, 0.001);
        assert_eq!(detect_pitch_yin(&quiet, 44100, DEFAULT_AMPLITUDE_THRESHOLD), None);
    }

    #[test]
    fn tiny_blocks_are_rejected() {
        assert_eq!(detect_pitch_yin(&[0.5, -0.5, 0.5], 44100, 0.0), None);
    }

    #[test]
    fn estimator_refines_within_a_few_cents() {
        let block = sine(261.63, 44100, 2048, 0.5);
        let mut estimator = YinEstimator::default();
        let freq = estimator.estimate(&block, 44100).unwrap_or_default();
        let cents = crate::tuning::calculate_cents_deviation(freq, 261.63);
        assert!(cents.abs() < 20.0, "{freq} Hz is {cents} cents off");
    }
}
