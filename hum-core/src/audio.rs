//! # Audio Capture Module
//!
//! Real-time capture from the default input device using CPAL. Incoming
//! samples are cut into fixed-size blocks, each stamped with its start time
//! in seconds since capture began, and handed to the transcription thread
//! over a channel.

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use anyhow::{Result, anyhow};

/// Samples per analysis block (~46 ms at 44.1 kHz).
pub const BUFFER_SIZE: usize = 2048;

/// Sample rate requested from the device.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// One fixed-size block of mono samples.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    /// Start of the block in seconds since capture began. Strictly increasing.
    pub timestamp: f64,
}

/// Cuts a continuous sample stream into timestamped blocks.
#[derive(Debug)]
pub struct BlockAssembler {
    sample_rate: u32,
    pending: Vec<f32>,
    blocks_emitted: u64,
}

impl BlockAssembler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            pending: Vec::with_capacity(BUFFER_SIZE * 2),
            blocks_emitted: 0,
        }
    }

    /// Appends samples and returns every block that is now complete.
    pub fn push(&mut self, data: &[f32]) -> Vec<AudioBlock> {
        self.pending.extend_from_slice(data);
        let mut blocks = Vec::new();
        while self.pending.len() >= BUFFER_SIZE {
            let samples: Vec<f32> = self.pending.drain(..BUFFER_SIZE).collect();
            let timestamp =
                self.blocks_emitted as f64 * BUFFER_SIZE as f64 / self.sample_rate as f64;
            self.blocks_emitted += 1;
            blocks.push(AudioBlock { samples, timestamp });
        }
        blocks
    }

    /// Time at which the next block would start.
    pub fn elapsed(&self) -> f64 {
        self.blocks_emitted as f64 * BUFFER_SIZE as f64 / self.sample_rate as f64
    }
}

/// Starts audio capture from the default input device.
///
/// Blocks are sent with `try_send`; if the consumer falls behind on a
/// bounded channel, blocks are dropped rather than stalling the audio thread.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Stream handle (capture stops when dropped) and sample rate
/// * `Err(e)` - No usable input device or format
pub fn start_audio_capture(sender: Sender<AudioBlock>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 mono input format found"))?;

    let rate = TARGET_SAMPLE_RATE
        .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();

    log::info!("Selected sample rate: {} Hz", sample_rate);

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

    let mut assembler = BlockAssembler::new(sample_rate);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for block in assembler.push(data) {
                let _ = sender.try_send(block);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the mono f32 configuration whose rate range is closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            min_diff.min(max_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembler_emits_full_blocks_with_increasing_timestamps() {
        let mut assembler = BlockAssembler::new(44100);
        assert!(assembler.push(&vec![0.1; BUFFER_SIZE - 1]).is_empty());
        let blocks = assembler.push(&vec![0.2; BUFFER_SIZE * 2 + 10]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].samples.len(), BUFFER_SIZE);
        assert_eq!(blocks[0].timestamp, 0.0);
        assert_eq!(blocks[0].samples[0], 0.1);
        assert_eq!(blocks[0].samples[BUFFER_SIZE - 1], 0.2);
        assert!(blocks[1].timestamp > blocks[0].timestamp);
        assert!((blocks[1].timestamp - BUFFER_SIZE as f64 / 44100.0).abs() < 1e-12);
        assert!((assembler.elapsed() - 2.0 * BUFFER_SIZE as f64 / 44100.0).abs() < 1e-12);
    }
}
