//! # Enhancement Pipeline
//!
//! Bounded-memory noise suppression for whole files.
//!
//! ## Key Components:
//! - **Planner**: Splits long inputs into overlapping windows
//! - **Model**: The noise-suppression seam and its RNNoise implementation
//! - **Invoker**: Runs the model on one window and checks its output
//! - **Merger**: Crossfades enhanced windows back into one waveform
//! - **Gain**: Optional output gain with clip guarding
//! - **Orchestrator**: Wires everything into `process_file` and owns model initialization

pub mod gain;          // Output gain and clipping
pub mod invoker;       // Per-window model call
pub mod merger;        // Overlap crossfade
pub mod model;         // Model traits and RNNoise
pub mod orchestrator;  // process_file and lazy initialization
pub mod planner;       // Chunk windows

pub use model::RnnoiseLoader;
pub use orchestrator::{EnhancementOutcome, EnhancementSettings, Enhancer};

#[cfg(test)]
pub mod testing;       // Shared fakes for unit tests
