//! End-to-end tests: synthetic voices through the whole pipeline

use hum_core::audio::BUFFER_SIZE;
use hum_core::notation::{self, duration_units};
use hum_core::quantize::{QuantizationGrid, normalize_times, quantize};
use hum_core::{
    NoteEvent, NoteSegmenter, PitchStabilizer, RawEstimate, Transcriber, TranscriberConfig,
    TranscriptionStatus, YinEstimator, tempo, transcribe_samples,
};

const SAMPLE_RATE: u32 = 44100;

/// Concatenated sine tones; a frequency of 0 is silence.
fn tones(parts: &[(f32, f32)]) -> Vec<f32> {
    let mut signal = Vec::new();
    for &(freq, seconds) in parts {
        let len = (seconds * SAMPLE_RATE as f32) as usize;
        signal.extend((0..len).map(|i| {
            if freq > 0.0 {
                0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
            } else {
                0.0
            }
        }));
    }
    signal
}

fn fixed_tempo(bpm: u32) -> TranscriberConfig {
    TranscriberConfig {
        auto_tempo: false,
        grid: QuantizationGrid::new(bpm, 8),
        ..TranscriberConfig::default()
    }
}

#[test]
fn two_sung_notes_are_transcribed() {
    let signal = tones(&[(440.0, 1.5), (493.88, 1.5)]);
    let mut estimator = YinEstimator::default();
    let transcriber = transcribe_samples(&signal, SAMPLE_RATE, &mut estimator, fixed_tempo(120));

    assert_eq!(transcriber.status(), TranscriptionStatus::Notes(2));
    let midis: Vec<i32> = transcriber.raw_notes().iter().map(|n| n.midi).collect();
    assert_eq!(midis, vec![69, 71]);

    let first = &transcriber.raw_notes()[0];
    assert!((first.frequency - 440.0).abs() < 3.0, "mean {} Hz", first.frequency);
    for note in transcriber.raw_notes() {
        assert!(note.duration >= 0.18);
    }

    let text = transcriber.encoding();
    assert!(text.starts_with("X:1\nM:4/4\nL:1/8\nQ:1/4=120\nK:C\n"));
    assert!(text.trim_end().ends_with("|]"));
    assert!(text.contains('A') && text.contains('B'));
}

#[test]
fn silence_transcribes_to_nothing() {
    let signal = tones(&[(0.0, 2.0)]);
    let mut estimator = YinEstimator::default();
    let transcriber = transcribe_samples(&signal, SAMPLE_RATE, &mut estimator, TranscriberConfig::default());
    assert_eq!(transcriber.status(), TranscriptionStatus::NoNotes);
    assert_eq!(transcriber.encoding(), "");
    assert!(transcriber.quantized_melody().is_empty());
}

#[test]
fn note_closed_by_silence_keeps_its_length() {
    let frame = BUFFER_SIZE as f64 / SAMPLE_RATE as f64;
    let block = vec![0.3_f32; BUFFER_SIZE];
    let mut script = vec![Some(392.0_f32); 12];
    script.extend(std::iter::repeat_n(None, 16));

    let mut transcriber = Transcriber::new(fixed_tempo(120));
    let mut closed_on = None;
    for (i, frequency) in script.into_iter().enumerate() {
        let estimate = RawEstimate {
            frequency,
            timestamp: i as f64 * frame,
        };
        if transcriber.process_frame(estimate, &block).note.is_some() {
            closed_on = Some(i);
        }
    }
    // The stabilizer holds its lock through five nulls, so the segmenter's
    // silence run starts at frame 17 and reaches eight frames at frame 24.
    assert_eq!(closed_on, Some(24));
    assert_eq!(transcriber.finish(28.0 * frame), TranscriptionStatus::Notes(1));

    let note = &transcriber.raw_notes()[0];
    assert_eq!(note.name(), "G4");
    // Locked on frame 4, confirmed on frame 8, ended where silence began.
    assert!((note.start - 8.0 * frame).abs() < 1e-9);
    assert!((note.end() - 17.0 * frame).abs() < 1e-9);
}

#[test]
fn semitone_wobble_does_not_split_a_note() {
    let mut stabilizer = PitchStabilizer::default();
    let mut segmenter = NoteSegmenter::default();
    let loud = [0.5_f32; 32];
    let mut script = vec![440.0_f32; 20];
    script.extend([466.16; 7]);
    script.extend([440.0; 20]);

    let mut emitted = Vec::new();
    for (i, freq) in script.iter().enumerate() {
        let observation = stabilizer.process(
            RawEstimate {
                frequency: Some(*freq),
                timestamp: i as f64 * 0.03,
            },
            &loud,
        );
        emitted.extend(segmenter.process_frame(&observation));
    }
    emitted.extend(segmenter.flush(script.len() as f64 * 0.03));

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].midi, 69);
}

#[test]
fn half_second_notes_encode_as_quarters() {
    let notes = vec![
        NoteEvent::from_midi(69, 0.3, 0.5),
        NoteEvent::from_midi(71, 0.8, 0.5),
    ];
    let grid = QuantizationGrid::new(120, 8);
    assert!((grid.grid_unit() - 0.25).abs() < 1e-12);

    let quantized = quantize(&notes, &grid);
    assert_eq!(quantized[0].start, 0.0);
    assert_eq!(quantized[1].start, 0.5);
    for note in &quantized {
        assert_eq!(duration_units(note.duration, 120), 2);
    }
    let body = notation::encode(&quantized, 120);
    assert!(body.ends_with("A2 B2 |]\n"), "{body}");
}

#[test]
fn quantized_melodies_are_ordered_and_disjoint() {
    let notes: Vec<NoteEvent> = [
        (60, 0.8, 0.41),
        (62, 1.95, 1.3),
        (64, 3.1, 0.63),
        (65, 4.3, 0.95),
        (67, 5.6, 0.37),
        (69, 6.7, 1.4),
    ]
    .iter()
    .map(|&(m, s, d)| NoteEvent::from_midi(m, s, d))
    .collect();

    for bpm in [60, 90, 120, 150] {
        for subdivision in [4, 8, 16] {
            let quantized = quantize(&notes, &QuantizationGrid::new(bpm, subdivision));
            assert_eq!(quantized[0].start, 0.0);
            for pair in quantized.windows(2) {
                assert!(pair[0].start <= pair[1].start);
                assert!(
                    pair[0].start + pair[0].duration <= pair[1].start + 1e-9,
                    "{bpm} BPM / {subdivision}: {:?} runs into {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    let normalized = normalize_times(&notes);
    assert_eq!(normalized[0].start, 0.0);
    assert!(normalized.windows(2).all(|p| p[0].start <= p[1].start));
}

#[test]
fn auto_tempo_stays_in_range() {
    let notes: Vec<NoteEvent> = (0..6)
        .map(|i| NoteEvent::from_midi(60 + i, i as f64 * 0.4, 0.4))
        .collect();
    let bpm = tempo::estimate_tempo(&notes);
    assert_eq!(bpm, 150);
    assert!((60..=180).contains(&bpm));
}
