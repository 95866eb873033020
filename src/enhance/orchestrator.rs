//! # Enhancement Orchestrator
//!
//! Composes the pipeline into a single `process_file` call and owns the
//! model's lifecycle.
//!
//! ## Pipeline:
//! ```text
//! load → normalize → plan → invoke (per window, in order) → merge → gain → save
//! ```
//!
//! ## Model Lifecycle:
//! The model is loaded lazily on first use and then reused for every call.
//! Initialization walks `Uninitialized → Initializing → Ready | Failed`:
//! - Concurrent first callers wait on a condition variable while one thread
//!   performs the load
//! - Up to `init_attempts` tries, sleeping `backoff * 2^attempt` between
//!   them; a loader that panics counts as a failed attempt
//! - Once `Failed`, every later call fails immediately with the stored message
//!
//! ## Thread Safety:
//! `Enhancer` is `Send + Sync` and is shared by `Arc` with the blocking pool.
//! Windows of one call are processed strictly in order while holding the
//! model lock; different `Enhancer`s (one per worker) never share a model.

use crate::audio::{AudioBuffer, AudioIo};
use crate::config::EnhancementConfig;
use crate::enhance::gain::apply_gain;
use crate::enhance::invoker::invoke;
use crate::enhance::merger::{merge_chunks, EnhancedChunk};
use crate::enhance::model::{EnhancementModel, ModelLoader};
use crate::enhance::planner::plan_chunks;
use crate::error::EnhanceError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Number of model loading attempts before giving up for good.
pub const DEFAULT_INIT_ATTEMPTS: u32 = 3;

type SharedModel = Arc<Mutex<Box<dyn EnhancementModel>>>;

/// Pipeline parameters resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementSettings {
    pub target_sample_rate: u32,
    /// `None` disables chunking
    pub max_chunk_duration_secs: Option<f64>,
    pub chunk_overlap_secs: f64,
    /// `None` means unlimited suppression
    pub attenuation_limit_db: Option<f32>,
    pub output_gain_db: f32,
    pub init_attempts: u32,
    pub init_backoff: Duration,
}

impl EnhancementSettings {
    /// Non-positive chunk durations disable chunking and negative
    /// attenuation limits mean "no limit".
    pub fn from_config(config: &EnhancementConfig) -> Self {
        Self {
            target_sample_rate: config.target_sample_rate,
            max_chunk_duration_secs: Some(config.max_chunk_duration_secs)
                .filter(|secs| *secs > 0.0),
            chunk_overlap_secs: config.chunk_overlap_secs.max(0.0),
            attenuation_limit_db: normalize_attenuation(Some(config.attenuation_limit_db)),
            output_gain_db: config.output_gain_db,
            init_attempts: DEFAULT_INIT_ATTEMPTS,
            init_backoff: Duration::from_millis(config.init_backoff_ms),
        }
    }

    pub fn max_chunk_samples(&self) -> Option<usize> {
        self.max_chunk_duration_secs
            .map(|secs| (secs * self.target_sample_rate as f64) as usize)
    }

    pub fn overlap_samples(&self) -> usize {
        (self.chunk_overlap_secs * self.target_sample_rate as f64) as usize
    }
}

fn normalize_attenuation(limit_db: Option<f32>) -> Option<f32> {
    limit_db.filter(|db| *db >= 0.0)
}

/// Result of a successful `process_file` call.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementOutcome {
    /// Length of the loaded input
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub output_size_bytes: u64,
    /// The file that was actually written (may be a WAV fallback)
    pub output_path: PathBuf,
}

/// Model initialization state.
enum InitState {
    Uninitialized,
    Initializing,
    Ready(SharedModel),
    Failed(String),
}

/// Runs files through the enhancement pipeline.
pub struct Enhancer {
    settings: EnhancementSettings,
    loader: Box<dyn ModelLoader>,
    io: Arc<dyn AudioIo>,
    state: Mutex<InitState>,
    state_changed: Condvar,
}

impl Enhancer {
    pub fn new(settings: EnhancementSettings, loader: Box<dyn ModelLoader>, io: Arc<dyn AudioIo>) -> Self {
        Self {
            settings,
            loader,
            io,
            state: Mutex::new(InitState::Uninitialized),
            state_changed: Condvar::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), InitState::Ready(_))
    }

    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the loaded model, loading it first if needed.
    ///
    /// Idempotent: only the first caller performs the load; callers arriving
    /// while it is in progress block until it settles.
    pub fn initialize(&self) -> Result<SharedModel, EnhanceError> {
        {
            let mut state = self.lock_state();
            loop {
                match &*state {
                    InitState::Ready(model) => return Ok(model.clone()),
                    InitState::Failed(msg) => return Err(EnhanceError::Initialization(msg.clone())),
                    InitState::Uninitialized => break,
                    InitState::Initializing => {}
                }
                state = self
                    .state_changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *state = InitState::Initializing;
        }

        let result = self.load_with_retries();

        let mut state = self.lock_state();
        let outcome = match result {
            Ok(model) => {
                let model: SharedModel = Arc::new(Mutex::new(model));
                *state = InitState::Ready(model.clone());
                Ok(model)
            }
            Err(msg) => {
                *state = InitState::Failed(msg.clone());
                Err(EnhanceError::Initialization(msg))
            }
        };
        drop(state);
        self.state_changed.notify_all();
        outcome
    }

    fn load_with_retries(&self) -> Result<Box<dyn EnhancementModel>, String> {
        let attempts = self.settings.init_attempts.max(1);
        let mut last_error = String::from("model was never loaded");

        for attempt in 0..attempts {
            let started = Instant::now();
            let loaded = catch_unwind(AssertUnwindSafe(|| self.loader.load()));

            match loaded {
                Ok(Ok(model)) => {
                    info!(
                        model = model.name(),
                        attempt = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Enhancement model initialized"
                    );
                    return Ok(model);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(panic) => last_error = panic_message(panic.as_ref()),
            }

            warn!(
                attempt = attempt + 1,
                max_attempts = attempts,
                "Model initialization failed: {}",
                last_error
            );

            let backoff = self.settings.init_backoff * 2u32.pow(attempt);
            if attempt + 1 < attempts && !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
        }

        error!("Giving up on model initialization after {} attempts", attempts);
        Err(last_error)
    }

    /// Enhance `input_path` and write the result near `output_path`.
    ///
    /// ## Parameters:
    /// - **attenuation_limit_db**: per-call override; negative means unlimited,
    ///   `None` uses the configured default
    /// - **output_gain_db**: per-call override; `None` uses the configured default
    ///
    /// ## Returns:
    /// The outcome carries the path that was actually written. On failure no
    /// partial outcome is produced.
    pub fn process_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        attenuation_limit_db: Option<f32>,
        output_gain_db: Option<f32>,
    ) -> Result<EnhancementOutcome, EnhanceError> {
        let started = Instant::now();
        let model = self.initialize()?;

        let attenuation_limit_db = match attenuation_limit_db {
            Some(db) => normalize_attenuation(Some(db)),
            None => self.settings.attenuation_limit_db,
        };
        let output_gain_db = output_gain_db.unwrap_or(self.settings.output_gain_db);

        let mut audio = self.io.load(input_path, self.settings.target_sample_rate)?;
        let total_samples = audio.len();
        let sample_rate = audio.sample_rate;
        audio.normalize_peak();

        let plan = plan_chunks(total_samples, self.settings.max_chunk_samples(), self.settings.overlap_samples());
        if plan.is_chunked() {
            info!(
                chunks = plan.windows.len(),
                overlap = plan.overlap,
                duration_seconds = audio.duration_seconds(),
                "Processing audio in chunks"
            );
        }

        let mut chunks = Vec::with_capacity(plan.windows.len());
        {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            for window in &plan.windows {
                let samples = invoke(
                    &mut **model,
                    &audio.samples[window.start..window.end],
                    attenuation_limit_db,
                )?;
                debug!(index = window.index, len = window.len(), "Enhanced window");
                chunks.push(EnhancedChunk { index: window.index, samples });
            }
        }
        drop(audio);

        let mut merged = merge_chunks(&chunks, plan.overlap);
        drop(chunks);
        apply_gain(&mut merged, output_gain_db);

        let written = self.io.save(&AudioBuffer::new(merged, sample_rate), output_path)?;
        let output_size_bytes = std::fs::metadata(&written)
            .map(|m| m.len())
            .map_err(|e| EnhanceError::io("Failed to save audio file", e))?;

        let duration_seconds = if sample_rate > 0 {
            total_samples as f64 / sample_rate as f64
        } else {
            0.0
        };

        info!(
            input = %input_path.display(),
            output = %written.display(),
            duration_seconds,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audio enhancement complete"
        );

        Ok(EnhancementOutcome {
            duration_seconds,
            sample_rate,
            output_size_bytes,
            output_path: written,
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("model loader aborted: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("model loader aborted: {}", msg)
    } else {
        "model loader aborted".to_string()
    }
}
