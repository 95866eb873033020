//! Scripted fakes for the pipeline seams, shared by unit tests.

use crate::audio::{AudioBuffer, AudioIo};
use crate::enhance::model::{EnhancementModel, ModelLoader};
use crate::error::EnhanceError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Multiplies every sample by a constant.
pub struct ScaleModel(pub f32);

impl EnhancementModel for ScaleModel {
    fn name(&self) -> &str {
        "scale"
    }

    fn enhance(&mut self, samples: &[f32], _limit: Option<f32>) -> anyhow::Result<Vec<f32>> {
        Ok(samples.iter().map(|s| s * self.0).collect())
    }
}

/// Fails on every window.
pub struct FailingModel;

impl EnhancementModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn enhance(&mut self, _samples: &[f32], _limit: Option<f32>) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("CUDA out of memory"))
    }
}

pub enum Step {
    Fail(&'static str),
    Panic,
    Succeed,
    SucceedFailing,
}

/// Loader that plays back a script and counts calls. Once the script runs
/// out it keeps succeeding.
pub struct ScriptedLoader {
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Self { steps: Mutex::new(steps.into()), calls: calls.clone() };
        (loader, calls)
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self) -> anyhow::Result<Box<dyn EnhancementModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(msg)) => Err(anyhow::anyhow!(msg)),
            Some(Step::Panic) => panic!("native library crashed"),
            Some(Step::SucceedFailing) => Ok(Box::new(FailingModel)),
            Some(Step::Succeed) | None => Ok(Box::new(ScaleModel(0.5))),
        }
    }
}

/// Audio I/O that serves a fixed buffer for any existing input path and
/// writes a placeholder file on save.
pub struct MemoryIo {
    pub input: AudioBuffer,
    pub fallback_to_wav: bool,
    pub saved: Mutex<Option<AudioBuffer>>,
}

impl MemoryIo {
    pub fn new(input: AudioBuffer, fallback_to_wav: bool) -> Self {
        Self { input, fallback_to_wav, saved: Mutex::new(None) }
    }
}

impl AudioIo for MemoryIo {
    fn load(&self, path: &Path, target_rate: u32) -> Result<AudioBuffer, EnhanceError> {
        if !path.exists() {
            return Err(EnhanceError::io("Failed to load audio file", "no such file"));
        }
        assert_eq!(self.input.sample_rate, target_rate);
        Ok(self.input.clone())
    }

    fn save(&self, audio: &AudioBuffer, requested: &Path) -> Result<PathBuf, EnhanceError> {
        let written = if self.fallback_to_wav {
            requested.with_extension("wav")
        } else {
            requested.to_path_buf()
        };
        std::fs::write(&written, vec![0u8; audio.len() * 2 + 44])
            .map_err(|e| EnhanceError::io("Failed to save audio file", e))?;
        *self.saved.lock().unwrap() = Some(audio.clone());
        Ok(written)
    }
}
