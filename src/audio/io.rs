//! # Audio File I/O
//!
//! Load and save primitives used by the enhancement pipeline.
//!
//! ## Loading:
//! 1. Probe the container with symphonia (extension used as a hint)
//! 2. Decode every packet of the first audio track into interleaved `f32`
//! 3. Downmix to mono by averaging channels
//! 4. Resample to the requested rate with rubato's sinc resampler
//!
//! ## Saving:
//! A 16-bit PCM WAV is always written first. If the caller asked for a
//! different extension, the WAV is converted by a `FormatConverter`; when the
//! conversion fails or produces an empty file the WAV is kept and its path is
//! returned instead. Callers must treat the returned path as authoritative.

use crate::audio::buffer::AudioBuffer;
use crate::error::EnhanceError;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// WAV format tag for integer PCM.
const PCM_FORMAT_TAG: u16 = 1;

/// Load/save seam used by the enhancement orchestrator.
///
/// ## Contract:
/// - `load` returns mono audio whose sample rate equals `target_rate`
/// - `save` returns the path that was actually written, which may differ
///   from `requested` (WAV fallback)
pub trait AudioIo: Send + Sync {
    fn load(&self, path: &Path, target_rate: u32) -> Result<AudioBuffer, EnhanceError>;

    fn save(&self, audio: &AudioBuffer, requested: &Path) -> Result<PathBuf, EnhanceError>;
}

/// Converts a written WAV file into another container format.
pub trait FormatConverter: Send + Sync {
    fn convert(&self, wav_path: &Path, target_path: &Path) -> anyhow::Result<()>;
}

/// Conversion through an `ffmpeg` subprocess.
pub struct FfmpegConverter;

impl FormatConverter for FfmpegConverter {
    fn convert(&self, wav_path: &Path, target_path: &Path) -> anyhow::Result<()> {
        let output = std::process::Command::new("ffmpeg")
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(wav_path)
            .arg(target_path)
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to run ffmpeg (is it installed?): {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("ffmpeg conversion failed: {}", stderr.trim()));
        }

        Ok(())
    }
}

/// Filesystem-backed audio I/O.
pub struct FileAudioIo {
    converter: Box<dyn FormatConverter>,
}

impl FileAudioIo {
    pub fn new(converter: Box<dyn FormatConverter>) -> Self {
        Self { converter }
    }
}

impl AudioIo for FileAudioIo {
    fn load(&self, path: &Path, target_rate: u32) -> Result<AudioBuffer, EnhanceError> {
        let (interleaved, channels, source_rate) = decode_file(path)
            .map_err(|e| EnhanceError::io("Failed to load audio file", e))?;

        let mono = downmix(&interleaved, channels);
        let samples = resample(&mono, source_rate, target_rate)
            .map_err(|e| EnhanceError::io("Failed to load audio file", e))?;

        debug!(
            path = %path.display(),
            channels,
            source_rate,
            target_rate,
            samples = samples.len(),
            "Loaded audio"
        );

        Ok(AudioBuffer::new(samples, target_rate))
    }

    fn save(&self, audio: &AudioBuffer, requested: &Path) -> Result<PathBuf, EnhanceError> {
        if let Some(parent) = requested.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EnhanceError::io("Failed to save audio file", e))?;
            }
        }

        let target_ext = requested
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let wav_path = match target_ext.as_deref() {
            Some("wav") => requested.to_path_buf(),
            _ => requested.with_extension("wav"),
        };

        write_wav(audio, &wav_path).map_err(|e| EnhanceError::io("Failed to save audio file", e))?;
        info!(path = %wav_path.display(), "Saved enhanced audio");

        let target_ext = match target_ext {
            Some(ext) if ext != "wav" => ext,
            _ => return Ok(wav_path),
        };

        match self.converter.convert(&wav_path, requested) {
            Ok(()) => {
                let size = std::fs::metadata(requested).map(|m| m.len()).unwrap_or(0);
                if size > 0 {
                    info!(path = %requested.display(), size, "Converted enhanced audio");
                    if let Err(e) = std::fs::remove_file(&wav_path) {
                        warn!(path = %wav_path.display(), "Failed to remove intermediate WAV: {}", e);
                    }
                    return Ok(requested.to_path_buf());
                }
                warn!("Conversion to .{} produced empty file; keeping WAV instead", target_ext);
            }
            Err(e) => {
                warn!("Failed to convert to .{}; keeping WAV instead: {}", target_ext, e);
            }
        }

        Ok(wav_path)
    }
}

/// Decode a file into interleaved `f32` samples.
///
/// Returns `(samples, channel_count, sample_rate)`.
fn decode_file(path: &Path) -> anyhow::Result<(Vec<f32>, usize, u32)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| anyhow::anyhow!("Failed to probe format: {}", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio tracks found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow::anyhow!("Failed to create decoder: {}", e))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(anyhow::anyhow!("Decode error: {}", e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow::anyhow!("Unknown sample rate"))?;
    Ok((samples, channels.unwrap_or(1).max(1), sample_rate))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio; a no-op when the rates already match.
///
/// The output length is `round(len * target / source)`. The sinc filter's
/// delay is flushed out and trimmed so sample `i` of the input lines up with
/// sample `i * target / source` of the output.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> anyhow::Result<Vec<f32>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let expected_len = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| anyhow::anyhow!("Failed to create resampler: {}", e))?;

    let delay = resampler.output_delay();
    let needed = delay + expected_len;

    let mut resampled = resampler
        .process(&[samples], None)
        .map_err(|e| anyhow::anyhow!("Failed to resample: {}", e))?
        .into_iter()
        .next()
        .unwrap_or_default();

    while resampled.len() < needed {
        let flushed = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| anyhow::anyhow!("Failed to flush resampler: {}", e))?
            .into_iter()
            .next()
            .unwrap_or_default();
        if flushed.is_empty() {
            break;
        }
        resampled.extend(flushed);
    }

    resampled.drain(..delay.min(resampled.len()));
    resampled.resize(expected_len, 0.0);
    Ok(resampled)
}

/// Write a mono 16-bit PCM WAV file.
fn write_wav(audio: &AudioBuffer, path: &Path) -> anyhow::Result<()> {
    let pcm: Vec<i16> = audio
        .samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect();

    let header = wav::Header::new(PCM_FORMAT_TAG, 1, audio.sample_rate, 16);
    let mut file = File::create(path)?;
    wav::write(header, &wav::BitDepth::Sixteen(pcm), &mut file)?;
    Ok(())
}
