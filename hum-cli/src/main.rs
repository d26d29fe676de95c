//! # Hum - sing a melody, get ABC notation
//!
//! Command-line front end for `hum-core`.
//!
//! ## Architecture
//! - **Audio Thread**: CPAL callback cuts the input into timestamped blocks
//! - **Main Thread**: owns the `Transcriber` and runs every block through it
//! - **Stdin Thread**: waits for Enter and signals the main thread to stop
//! - **Communication**: Crossbeam channels between all three

mod options;

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, select};
use hum_core::audio::{self, AudioBlock, BUFFER_SIZE};
use hum_core::{
    FrequencyEstimator, RawEstimate, SessionRecord, Transcriber, TranscriberConfig,
    TranscriptionStatus, YinEstimator, transcribe_samples,
};

use options::{CliOptions, Source};

/// Blocks buffered between the audio callback and the main thread.
const BLOCK_QUEUE: usize = 64;

fn main() -> Result<()> {
    env_logger::init();

    let options = match CliOptions::parse(std::env::args().skip(1))? {
        Some(options) => options,
        None => {
            println!("{}", options::USAGE);
            return Ok(());
        }
    };

    let config = build_config(&options)?;
    let mut transcriber = match &options.source {
        Source::Microphone { seconds } => record_microphone(config, *seconds)?,
        Source::Wav(path) => {
            let (samples, sample_rate) = load_wav(path)?;
            log::info!("Transcribing {} ({} samples at {} Hz)", path, samples.len(), sample_rate);
            let mut estimator = YinEstimator::default();
            transcribe_samples(&samples, sample_rate, &mut estimator, config)
        }
        Source::Session(path) => {
            let record = SessionRecord::load(path)?;
            log::info!("Reloaded {} notes from {}", record.raw_notes.len(), path);
            record.into_transcriber()
        }
    };

    // Manual settings win over whatever was detected or saved.
    if let Some(bpm) = options.bpm {
        transcriber.set_bpm(bpm);
    }
    if options.no_quantize {
        transcriber.set_quantize(false);
    }

    report(&transcriber);

    if let Some(path) = &options.abc_out {
        std::fs::write(path, transcriber.encoding())
            .with_context(|| format!("writing notation {}", path))?;
        log::info!("Notation written to {}", path);
    }
    if let Some(path) = &options.save {
        transcriber.record().save(path)?;
        log::info!("Session saved to {}", path);
    }
    Ok(())
}

fn build_config(options: &CliOptions) -> Result<TranscriberConfig> {
    let mut config = match &options.config {
        Some(path) => TranscriberConfig::load(path)?,
        None => TranscriberConfig::default(),
    };
    if let Some(bpm) = options.bpm {
        config.grid.set_bpm(bpm);
        config.auto_tempo = false;
    }
    if options.no_quantize {
        config.quantize = false;
    }
    Ok(config)
}

fn report(transcriber: &Transcriber) {
    match transcriber.status() {
        TranscriptionStatus::NoNotes => println!("No notes detected."),
        TranscriptionStatus::Notes(count) => {
            println!(
                "{} notes at {} BPM ({})",
                count,
                transcriber.bpm(),
                if transcriber.quantize_enabled() { "quantized" } else { "unquantized" }
            );
            println!();
            print!("{}", transcriber.encoding());
        }
    }
}

/// Records from the default input until the time limit or Enter, then finishes the session.
fn record_microphone(config: TranscriberConfig, seconds: f64) -> Result<Transcriber> {
    let (block_tx, block_rx) = crossbeam_channel::bounded::<AudioBlock>(BLOCK_QUEUE);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    let (stream, sample_rate) =
        audio::start_audio_capture(block_tx).context("starting audio capture")?;

    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = stop_tx.send(());
    });

    eprintln!("Recording for {:.0}s - sing now, press Enter to stop early.", seconds);

    let mut transcriber = Transcriber::new(config);
    let mut estimator = YinEstimator::default();
    let mut end_time = 0.0;
    let limit = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("recording length {}s", seconds))?;
    let deadline = crossbeam_channel::after(limit);

    loop {
        select! {
            recv(block_rx) -> msg => match msg {
                Ok(block) => {
                    end_time = process_block(&mut transcriber, &mut estimator, &block, sample_rate);
                }
                Err(_) => {
                    log::warn!("Audio channel closed");
                    break;
                }
            },
            recv(stop_rx) -> _ => {
                log::debug!("Stop requested");
                break;
            },
            recv(deadline) -> _ => {
                log::debug!("Recording time limit reached");
                break;
            },
        }
    }

    if let Err(e) = stream.pause() {
        log::warn!("Error pausing stream: {}", e);
    }
    drop(stream);

    // Frames queued before the stream stopped still belong to the take.
    end_time = drain(&block_rx, end_time, |block| {
        process_block(&mut transcriber, &mut estimator, block, sample_rate)
    });

    eprintln!();
    transcriber.finish(end_time);
    Ok(transcriber)
}

fn drain(rx: &Receiver<AudioBlock>, mut end_time: f64, mut f: impl FnMut(&AudioBlock) -> f64) -> f64 {
    while let Ok(block) = rx.try_recv() {
        end_time = f(&block);
    }
    end_time
}

/// Runs one block through the pipeline and returns the time at which it ends.
fn process_block(
    transcriber: &mut Transcriber,
    estimator: &mut YinEstimator,
    block: &AudioBlock,
    sample_rate: u32,
) -> f64 {
    let estimate = RawEstimate {
        frequency: estimator.estimate(&block.samples, sample_rate),
        timestamp: block.timestamp,
    };
    let result = transcriber.process_frame(estimate, &block.samples);

    match result.pitch {
        Some(pitch) => eprint!(
            "\r{:<4} {:+4.0} cents  confidence {:.2}   ",
            pitch.note_name(),
            pitch.cents,
            result.observation.confidence
        ),
        None => eprint!("\r--                               "),
    }
    if let Some(note) = &result.note {
        eprintln!("\r{:<4} {:.2}s                        ", note.name(), note.duration);
    }

    block.timestamp + BUFFER_SIZE as f64 / sample_rate as f64
}

/// Loads a WAV file as mono f32 samples.
fn load_wav(path: &str) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("opening {}", path))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = int_sample_scale(spec.bits_per_sample)
                .with_context(|| format!("reading {}", path))?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(anyhow!("{} has no channels", path));
    }
    let mono = if channels == 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Full-scale value of a signed integer sample of the given width.
fn int_sample_scale(bits_per_sample: u16) -> Result<f32> {
    if !(1..=32).contains(&bits_per_sample) {
        return Err(anyhow!("unsupported sample width {}", bits_per_sample));
    }
    Ok((1_i64 << (bits_per_sample - 1)) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sample_widths() {
        assert_eq!(int_sample_scale(16).expect("16-bit"), 32768.0);
        assert_eq!(int_sample_scale(24).expect("24-bit"), 8_388_608.0);
        assert_eq!(int_sample_scale(8).expect("8-bit"), 128.0);
        assert!(int_sample_scale(0).is_err());
        assert!(int_sample_scale(48).is_err());
    }
}
