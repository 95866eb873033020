//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP__ prefix, `__` between section and key)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP__SERVER__PORT, APP__STORAGE__RETENTION_MINUTES, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub enhancement: EnhancementConfig,
    pub queue: QueueConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS (browser frontends)
    pub cors_origins: Vec<String>,
}

/// Where uploads and results live, and how long they are kept.
///
/// ## Retention:
/// Every file directly inside `upload_dir` and `processed_dir` is deleted once
/// its modification time is older than `retention_minutes`. The sweep runs
/// every `cleanup_interval_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub max_file_size_mb: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    pub retention_minutes: u64,
    pub cleanup_interval_secs: u64,
}

/// Enhancement pipeline tuning.
///
/// ## Fields:
/// - `target_sample_rate`: every input is resampled to this rate (RNNoise runs at 48kHz)
/// - `max_chunk_duration_secs`: window length for chunked processing; `<= 0` disables chunking
/// - `chunk_overlap_secs`: overlap between consecutive windows, crossfaded on merge
/// - `attenuation_limit_db`: cap on noise suppression; negative means unlimited
/// - `output_gain_db`: post-enhancement gain, clip-guarded
/// - `init_backoff_ms`: base delay of the model initialization backoff (doubles per attempt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementConfig {
    pub target_sample_rate: u32,
    pub max_chunk_duration_secs: f64,
    pub chunk_overlap_secs: f64,
    pub attenuation_limit_db: f32,
    pub output_gain_db: f32,
    pub init_backoff_ms: u64,
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of concurrent enhancement workers; each loads its own model
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                processed_dir: PathBuf::from("processed"),
                max_file_size_mb: 50,
                allowed_extensions: ["mp3", "wav", "ogg", "m4a", "flac", "aac", "wma"]
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
                retention_minutes: 10,
                cleanup_interval_secs: 300,  // Every 5 minutes
            },
            enhancement: EnhancementConfig {
                target_sample_rate: 48000,
                max_chunk_duration_secs: 30.0,
                chunk_overlap_secs: 0.05,
                attenuation_limit_db: 12.0,
                output_gain_db: 0.0,
                init_backoff_ms: 1000,
            },
            queue: QueueConfig {
                workers: 2,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`: Override server port
    /// - `APP__STORAGE__RETENTION_MINUTES=30`: Keep files for half an hour
    /// - `APP__STORAGE__ALLOWED_EXTENSIONS=wav,flac`: Comma separated list
    /// - `APP__ENHANCEMENT__ATTENUATION_LIMIT_DB=-1`: Unlimited suppression
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("storage.allowed_extensions")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.queue.workers == 0 {
            return Err(anyhow::anyhow!("At least one enhancement worker is required"));
        }

        if self.storage.retention_minutes == 0 {
            return Err(anyhow::anyhow!("File retention must be at least one minute"));
        }

        if self.storage.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.enhancement.target_sample_rate == 0 {
            return Err(anyhow::anyhow!("Target sample rate must be greater than 0"));
        }

        let enhancement = &self.enhancement;
        if enhancement.max_chunk_duration_secs > 0.0
            && enhancement.chunk_overlap_secs >= enhancement.max_chunk_duration_secs
        {
            return Err(anyhow::anyhow!(
                "Chunk overlap ({}s) must be shorter than the chunk duration ({}s)",
                enhancement.chunk_overlap_secs,
                enhancement.max_chunk_duration_secs
            ));
        }

        Ok(())
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes * 60)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}
