// hum-core/src/lib.rs

//! The core logic for turning a sung melody into notation.
//! This crate is responsible for audio capture, pitch estimation, note
//! segmentation, tempo estimation, quantization and ABC encoding. It is
//! completely headless and contains no UI code.
//!
//! Data flows one way:
//!
//! ```text
//! raw frequency -> PitchStabilizer -> NoteSegmenter -> raw notes
//!     -> TempoEstimator -> GridQuantizer -> NotationEncoder -> ABC text
//! ```
//!
//! The live half (stabilizer and segmenter) runs once per audio block on a
//! single thread. The snapshot half (tempo, quantization, notation) is pure
//! and can be rerun at will from the buffered raw notes.

pub mod audio;
pub mod config;
pub mod fft;
pub mod notation;
pub mod pitch;
pub mod quantize;
pub mod segmenter;
pub mod session;
pub mod stabilizer;
pub mod tempo;
pub mod tuning;

pub use config::TranscriberConfig;
pub use pitch::{FrequencyEstimator, YinEstimator};
pub use quantize::QuantizationGrid;
pub use segmenter::{NoteEvent, NoteSegmenter};
pub use session::{FrameResult, SessionRecord, Transcriber, TranscriptionStatus, transcribe_samples};
pub use stabilizer::{PitchObservation, PitchStabilizer, RawEstimate};
