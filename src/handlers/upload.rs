//! # Upload Handler
//!
//! `POST /api/upload` accepts a multipart form with:
//! - `file`: the audio file (required)
//! - `noise_strength`: optional slider value from 0 (gentle) to 10 (aggressive)
//!
//! ## Flow:
//! 1. Validate the extension against the configured allow-list
//! 2. Stream the file to `uploads/{task_id}.{ext}`, enforcing the size limit
//! 3. Map `noise_strength` to per-job enhancement settings
//! 4. Submit the job and report its queue position

use crate::error::{AppError, AppResult};
use crate::jobs::SubmitRequest;
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Rough per-job processing estimate used for `estimated_wait_seconds`.
const ESTIMATED_SECONDS_PER_JOB: usize = 30;

/// Per-job overrides derived from the noise strength slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancementOverrides {
    pub attenuation_limit_db: Option<f32>,
    pub output_gain_db: Option<f32>,
}

impl EnhancementOverrides {
    /// Map a 0–10 slider onto an attenuation limit of 6–26 dB and a gentle
    /// voice lift that tapers from 2 dB to 1 dB as suppression increases.
    ///
    /// Without a slider value the configured defaults apply.
    pub fn from_noise_strength(noise_strength: Option<f32>) -> Self {
        match noise_strength {
            Some(strength) => {
                let strength = if strength.is_finite() { strength.clamp(0.0, 10.0) } else { 0.0 };
                let gain = ((2.0 - strength * 0.1) * 100.0).round() / 100.0;
                Self {
                    attenuation_limit_db: Some(6.0 + strength * 2.0),
                    output_gain_db: Some(gain.max(0.0)),
                }
            }
            None => Self {
                attenuation_limit_db: None,
                output_gain_db: None,
            },
        }
    }
}

/// Return the lowercase extension if it is allowed.
pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<String, AppError> {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    };

    if ext.is_empty() || !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
        return Err(AppError::ValidationError(format!(
            "File extension '.{}' not allowed. Allowed: {}",
            ext,
            allowed.join(", ")
        )));
    }

    Ok(ext)
}

/// A file that has been written to the upload directory.
struct StoredUpload {
    filename: String,
    path: PathBuf,
    extension: String,
    size: u64,
}

pub async fn upload_audio(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let storage = &state.get_config().storage;
    let task_id = uuid::Uuid::new_v4().simple().to_string();

    let mut upload: Option<StoredUpload> = None;
    let mut noise_strength: Option<f32> = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if upload.is_none() => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename".to_string()))?;

                let extension = validate_extension(&filename, &storage.allowed_extensions)?;
                let path = storage.upload_dir.join(format!("{}.{}", task_id, extension));
                let size = match save_field(&mut field, &path, storage.max_file_size_bytes()).await {
                    Ok(size) => size,
                    Err(e) => {
                        discard(&path).await;
                        return Err(e);
                    }
                };

                upload = Some(StoredUpload { filename, path, extension, size });
            }
            Some("noise_strength") => {
                let raw = read_text(&mut field).await?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    let value = trimmed.parse::<f32>().map_err(|_| {
                        AppError::BadRequest(format!("noise_strength must be a number, got '{}'", trimmed))
                    })?;
                    noise_strength = Some(value);
                }
            }
            _ => {
                // Drain unknown fields so the stream can advance
                while field.try_next().await?.is_some() {}
            }
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    info!(task_id = %task_id, file = %upload.filename, size = upload.size, "File uploaded");

    let overrides = EnhancementOverrides::from_noise_strength(noise_strength);
    let output_path = storage
        .processed_dir
        .join(format!("enhanced_{}.{}", task_id, upload.extension));

    let submitted = state.tracker.submit(SubmitRequest {
        task_id: task_id.clone(),
        filename: upload.filename.clone(),
        input_path: upload.path.clone(),
        output_path,
        attenuation_limit_db: overrides.attenuation_limit_db,
        output_gain_db: overrides.output_gain_db,
    });

    let record = match submitted {
        Ok(record) => record,
        Err(e) => {
            discard(&upload.path).await;
            return Err(AppError::Internal(format!("Upload failed: {}", e)));
        }
    };

    state.record_upload(upload.size);

    Ok(HttpResponse::Ok().json(json!({
        "task_id": task_id,
        "filename": upload.filename,
        "file_size_mb": round2(upload.size as f64 / (1024.0 * 1024.0)),
        "queue_position": record.queue_position,
        "estimated_wait_seconds": record.queue_position * ESTIMATED_SECONDS_PER_JOB,
        "retention_minutes": storage.retention_minutes,
        "message": "File uploaded successfully. Processing will begin shortly."
    })))
}

/// Stream a multipart field to disk, failing once `max_bytes` is exceeded.
async fn save_field(field: &mut Field, path: &Path, max_bytes: u64) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size: u64 = 0;

    while let Some(chunk) = field.try_next().await? {
        size += chunk.len() as u64;
        if size > max_bytes {
            return Err(AppError::ValidationError(format!(
                "File size exceeds maximum allowed size of {}MB",
                max_bytes / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if size == 0 {
        return Err(AppError::ValidationError("Uploaded file is empty".to_string()));
    }

    Ok(size)
}

/// Read a small text field (form values).
async fn read_text(field: &mut Field) -> AppResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > 1024 {
            return Err(AppError::BadRequest("Form value too long".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::BadRequest("Form value is not valid UTF-8".to_string()))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove rejected upload: {}", e);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::tests::test_state;
    use actix_web::{http::StatusCode, test as actix_test, App};

    fn allowed() -> Vec<String> {
        AppConfig::default().storage.allowed_extensions
    }

    #[test]
    fn test_validate_extension() {
        assert_eq!(validate_extension("Voice Memo.M4A", &allowed()).unwrap(), "m4a");
        assert_eq!(validate_extension("take.2.flac", &allowed()).unwrap(), "flac");
        assert!(validate_extension("payload.exe", &allowed()).is_err());
        assert!(validate_extension("README", &allowed()).is_err());
    }

    #[test]
    fn test_noise_strength_mapping() {
        let gentle = EnhancementOverrides::from_noise_strength(Some(0.0));
        assert_eq!(gentle.attenuation_limit_db, Some(6.0));
        assert_eq!(gentle.output_gain_db, Some(2.0));

        let strong = EnhancementOverrides::from_noise_strength(Some(10.0));
        assert_eq!(strong.attenuation_limit_db, Some(26.0));
        assert_eq!(strong.output_gain_db, Some(1.0));

        let mid = EnhancementOverrides::from_noise_strength(Some(5.0));
        assert_eq!(mid.attenuation_limit_db, Some(16.0));
        assert_eq!(mid.output_gain_db, Some(1.5));

        // Out-of-range values are clamped
        assert_eq!(
            EnhancementOverrides::from_noise_strength(Some(42.0)),
            EnhancementOverrides::from_noise_strength(Some(10.0))
        );

        let defaults = EnhancementOverrides::from_noise_strength(None);
        assert_eq!(defaults.attenuation_limit_db, None);
        assert_eq!(defaults.output_gain_db, None);
    }

    fn multipart_body(boundary: &str, filename: &str, content: &[u8], noise: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(noise) = noise {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"noise_strength\"\r\n\r\n{n}\r\n",
                    b = boundary,
                    n = noise
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    fn upload_request(filename: &str, content: &[u8], noise: Option<&str>) -> actix_test::TestRequest {
        let boundary = "----voiceenhanceboundary";
        actix_test::TestRequest::post()
            .uri("/api/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(multipart_body(boundary, filename, content, noise))
    }

    fn config_in(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.processed_dir = dir.path().join("processed");
        config.storage.max_file_size_mb = 1;
        std::fs::create_dir_all(&config.storage.upload_dir).unwrap();
        config
    }

    #[actix_web::test]
    async fn test_upload_accepts_audio() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(config_in(&dir));
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/upload", web::post().to(upload_audio)),
        )
        .await;

        let resp = actix_test::call_service(&app, upload_request("memo.mp3", b"ID3fakeaudio", Some("5")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        let task_id = body["task_id"].as_str().unwrap().to_string();
        assert_eq!(body["filename"], "memo.mp3");
        assert_eq!(body["queue_position"], 0);
        assert_eq!(body["retention_minutes"], 10);

        assert!(dir.path().join("uploads").join(format!("{}.mp3", task_id)).exists());
        let record = state.tracker.record(&task_id).unwrap().unwrap();
        assert_eq!(record.requested_output_path.file_name().unwrap().to_string_lossy(), format!("enhanced_{}.mp3", task_id));
        assert_eq!(state.get_metrics_snapshot().uploads_accepted, 1);
    }

    #[actix_web::test]
    async fn test_upload_rejects_bad_extension() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(config_in(&dir));
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/upload", web::post().to(upload_audio)),
        )
        .await;

        let resp = actix_test::call_service(&app, upload_request("evil.exe", b"MZ", None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn test_upload_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(config_in(&dir));
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/upload", web::post().to(upload_audio)),
        )
        .await;

        let too_big = vec![0u8; 1024 * 1024 + 1];
        let resp = actix_test::call_service(&app, upload_request("big.wav", &too_big, None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        // The partial upload is removed
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }
}
