//! # Task Handlers
//!
//! Per-job endpoints:
//! - `GET /api/status/{task_id}`: poll progress
//! - `GET /api/download/{task_id}`: fetch the enhanced file once completed
//! - `DELETE /api/delete/{task_id}`: remove the job's files immediately

use crate::error::{AppError, AppResult};
use crate::jobs::JobStatus;
use crate::state::AppState;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::path::Path;
use tracing::info;

pub async fn get_status(state: web::Data<AppState>, task_id: web::Path<String>) -> AppResult<HttpResponse> {
    let snapshot = state.tracker.status(&task_id)?;
    Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn download_file(state: web::Data<AppState>, task_id: web::Path<String>) -> AppResult<HttpResponse> {
    let task_id = task_id.into_inner();
    let record = state.tracker.record(&task_id)?;

    let status = record.as_ref().map(|r| r.status).unwrap_or(JobStatus::Queued);
    let record = match record {
        Some(record) if status == JobStatus::Completed => record,
        _ => {
            return Err(AppError::BadRequest(format!("File not ready. Current status: {}", status)));
        }
    };

    let output_path = record
        .output_path
        .clone()
        .ok_or_else(|| AppError::Internal("Completed job has no output path".to_string()))?;

    let bytes = match tokio::fs::read(&output_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(
                "Processed file not found. It may have been deleted after the retention period.".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let filename = download_name(&record.filename, &output_path);
    info!(task_id = %task_id, file = %filename, bytes = bytes.len(), "Serving enhanced file");

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&output_path))
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(bytes))
}

pub async fn delete_task(state: web::Data<AppState>, task_id: web::Path<String>) -> AppResult<HttpResponse> {
    let task_id = task_id.into_inner();
    let tracker = state.tracker.clone();

    let report = web::block(move || tracker.delete(&task_id))
        .await
        .map_err(|e| AppError::Internal(format!("Delete task panicked: {}", e)))??;

    let message = if report.deleted_files.is_empty() {
        "No files found to delete"
    } else {
        "Files deleted successfully"
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "task_id": report.task_id,
        "deleted_files": report.deleted_files,
        "message": message
    })))
}

/// `enhanced_{original stem}.{extension of the file actually written}`.
///
/// The written extension can differ from the upload's when conversion back
/// to the original format failed and WAV was kept instead.
fn download_name(original: &str, written: &Path) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    match written.extension() {
        Some(ext) => format!("enhanced_{}.{}", stem, ext.to_string_lossy()),
        None => format!("enhanced_{}", stem),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        "wma" => "audio/x-ms-wma",
        _ => "application/octet-stream",
    }
}
