//! # Audio Buffer
//!
//! The in-memory representation of a decoded recording: mono `f32` samples at a
//! known sample rate, nominally in `[-1.0, 1.0]`. Every pipeline stage consumes
//! and produces these by value.
//!
//! ## Key Features:
//! - **Peak normalization**: Rescales so the loudest sample sits at |x| ≤ 1.0
//! - **Duration helpers**: Sample count ↔ seconds at the buffer's rate

/// Mono audio samples at a fixed sample rate.
///
/// ## Rust Concepts:
/// - **Vec<f32>**: Owned sample storage, moved between pipeline stages
/// - **PartialEq**: Lets tests compare buffers directly
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample values, one channel
    pub samples: Vec<f32>,

    /// Samples per second
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Duration of the buffer in seconds.
    ///
    /// ## Calculation:
    /// Duration = number_of_samples / sample_rate
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Rescale in place so that the peak is at most 1.0.
    ///
    /// Buffers already within range are left untouched (scale factor 1).
    /// Returns the scale factor that was applied.
    pub fn normalize_peak(&mut self) -> f32 {
        normalize_peak(&mut self.samples)
    }
}

/// Largest absolute value in a sample slice.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Divide every sample by the peak when the peak exceeds 1.0.
pub fn normalize_peak(samples: &mut [f32]) -> f32 {
    let peak = peak(samples);
    if peak <= 1.0 || !peak.is_finite() {
        return 1.0;
    }

    let scale = 1.0 / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
    scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_seconds() {
        let buffer = AudioBuffer::new(vec![0.0; 48000 * 3], 48000);
        assert_eq!(buffer.duration_seconds(), 3.0);
        assert_eq!(AudioBuffer::new(Vec::new(), 48000).duration_seconds(), 0.0);
    }

    #[test]
    fn test_normalize_peak_rescales_loud_audio() {
        let mut buffer = AudioBuffer::new(vec![0.5, -4.0, 2.0], 48000);
        let scale = buffer.normalize_peak();

        assert_eq!(scale, 0.25);
        assert_eq!(buffer.samples, vec![0.125, -1.0, 0.5]);
        assert!(peak(&buffer.samples) <= 1.0);
    }

    #[test]
    fn test_normalize_peak_keeps_quiet_audio() {
        let mut buffer = AudioBuffer::new(vec![0.1, -0.9, 1.0], 48000);
        assert_eq!(buffer.normalize_peak(), 1.0);
        assert_eq!(buffer.samples, vec![0.1, -0.9, 1.0]);
    }
}
