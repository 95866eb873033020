//! # Enhancement Model
//!
//! The seam between the pipeline and the neural noise suppressor, plus the
//! RNNoise implementation shipped with the service.
//!
//! ## Key Types:
//! - **`EnhancementModel`**: enhances one window of mono audio
//! - **`ModelLoader`**: constructs a model; may fail (and is retried by the orchestrator)
//! - **`RnnoiseModel`**: nnnoiseless-backed model running at 48kHz
//!
//! ## Attenuation Limit:
//! RNNoise has no native cap on suppression, so the limit is applied by mixing
//! the noisy input back in at `10^(-limit/20)`. With a 12 dB limit roughly a
//! quarter of the original signal is retained; `None` means no limit.

use nnnoiseless::DenoiseState;
use tracing::debug;

/// RNNoise frame size (fixed at 480 samples at 48kHz = 10ms)
pub const RNNOISE_FRAME_SIZE: usize = 480;

/// RNNoise sample rate (fixed at 48kHz)
pub const RNNOISE_SAMPLE_RATE: u32 = 48000;

/// nnnoiseless works on floats in the 16-bit PCM range.
const PCM_SCALE: f32 = i16::MAX as f32;

/// A loaded noise-suppression model.
///
/// ## Contract:
/// `enhance` must return exactly `samples.len()` samples. The orchestrator
/// treats any other length as an enhancement failure.
pub trait EnhancementModel: Send {
    fn name(&self) -> &str;

    fn enhance(&mut self, samples: &[f32], attenuation_limit_db: Option<f32>) -> anyhow::Result<Vec<f32>>;
}

/// Factory for `EnhancementModel`s.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Box<dyn EnhancementModel>>;
}

/// Loads `RnnoiseModel`s for a given pipeline sample rate.
pub struct RnnoiseLoader {
    sample_rate: u32,
}

impl RnnoiseLoader {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl ModelLoader for RnnoiseLoader {
    fn load(&self) -> anyhow::Result<Box<dyn EnhancementModel>> {
        if self.sample_rate != RNNOISE_SAMPLE_RATE {
            return Err(anyhow::anyhow!(
                "RNNoise requires {} Hz audio, pipeline is configured for {} Hz",
                RNNOISE_SAMPLE_RATE,
                self.sample_rate
            ));
        }

        debug!("Loading RNNoise model");
        Ok(Box::new(RnnoiseModel::new()))
    }
}

/// RNNoise via nnnoiseless.
///
/// A fresh `DenoiseState` is created per window so no recurrent state leaks
/// from one chunk (or one job) into the next.
pub struct RnnoiseModel;

impl RnnoiseModel {
    pub fn new() -> Self {
        Self
    }

    fn denoise(samples: &[f32]) -> Vec<f32> {
        let mut state = DenoiseState::new();
        let mut output = Vec::with_capacity(samples.len());
        let mut input_frame = [0.0f32; RNNOISE_FRAME_SIZE];
        let mut output_frame = [0.0f32; RNNOISE_FRAME_SIZE];

        for frame in samples.chunks(RNNOISE_FRAME_SIZE) {
            input_frame.fill(0.0);
            for (dst, &src) in input_frame.iter_mut().zip(frame) {
                *dst = src * PCM_SCALE;
            }

            state.process_frame(&mut output_frame, &input_frame);

            // Padding in the last frame is dropped
            output.extend(output_frame[..frame.len()].iter().map(|&s| s / PCM_SCALE));
        }

        output
    }
}

impl Default for RnnoiseModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancementModel for RnnoiseModel {
    fn name(&self) -> &str {
        "rnnoise"
    }

    fn enhance(&mut self, samples: &[f32], attenuation_limit_db: Option<f32>) -> anyhow::Result<Vec<f32>> {
        let mut enhanced = Self::denoise(samples);

        if let Some(limit_db) = attenuation_limit_db {
            let retained = 10f32.powf(-limit_db / 20.0);
            for (out, &noisy) in enhanced.iter_mut().zip(samples) {
                *out = *out * (1.0 - retained) + noisy * retained;
            }
        }

        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rnnoise_preserves_length() {
        let mut model = RnnoiseModel::new();
        // Deliberately not a multiple of the frame size
        let samples: Vec<f32> = (0..1234).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();

        let enhanced = model.enhance(&samples, None).unwrap();
        assert_eq!(enhanced.len(), samples.len());
        assert!(model.enhance(&[], Some(12.0)).unwrap().is_empty());
    }

    #[test]
    fn test_zero_db_limit_returns_input() {
        // A 0 dB cap means no suppression at all
        let mut model = RnnoiseModel::new();
        let samples = vec![0.25f32; 960];
        let enhanced = model.enhance(&samples, Some(0.0)).unwrap();

        assert!(enhanced.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_loader_rejects_wrong_sample_rate() {
        assert!(RnnoiseLoader::new(16000).load().is_err());

        let model = RnnoiseLoader::new(48000).load().unwrap();
        assert_eq!(model.name(), "rnnoise");
    }
}
