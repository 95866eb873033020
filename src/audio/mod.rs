//! # Audio Module
//!
//! Audio data and file handling for the enhancement pipeline.
//!
//! ## Key Components:
//! - **Audio Buffer**: Mono samples plus sample rate, with peak normalization
//! - **Audio I/O**: Decode/downmix/resample on load, PCM-16 WAV plus optional
//!   format conversion on save
//!
//! ## Audio Format:
//! Everything inside the pipeline is mono `f32` at the configured target rate
//! (48kHz by default, which is what RNNoise expects).

pub mod buffer;  // In-memory audio representation
pub mod io;      // Load/save primitives

pub use buffer::AudioBuffer;
pub use io::{AudioIo, FfmpegConverter, FileAudioIo};
