//! Health and metrics endpoints.
//!
//! `health_check` is what load balancers and the frontend poll; it reports
//! queue load, storage settings and process memory. `detailed_metrics`
//! breaks request metrics down per route.

use crate::config::AppConfig;
use crate::jobs::QueueStats;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let queue = state.tracker.queue_stats();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "voice-enhance-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "storage": {
            "upload_dir": config.storage.upload_dir.display().to_string(),
            "upload_dir_exists": config.storage.upload_dir.is_dir(),
            "processed_dir": config.storage.processed_dir.display().to_string(),
            "processed_dir_exists": config.storage.processed_dir.is_dir(),
            "max_file_size_mb": config.storage.max_file_size_mb,
            "file_retention_minutes": config.storage.retention_minutes
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "uploads_accepted": metrics.uploads_accepted
        },
        "memory": get_memory_info(),
        "system": get_system_status(config, &queue)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "uploads": {
            "accepted": metrics.uploads_accepted,
            "total_bytes": metrics.upload_bytes
        },
        "queue": state.tracker.queue_stats(),
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    let pid = process::id();

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    vm_rss = parse_kb(rest);
                } else if let Some(rest) = line.strip_prefix("VmSize:") {
                    vm_size = parse_kb(rest);
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    let _ = pid;
    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

#[cfg(target_os = "linux")]
fn parse_kb(field: &str) -> u64 {
    field
        .split_whitespace()
        .next()
        .and_then(|kb| kb.parse::<u64>().ok())
        .unwrap_or(0)
        * 1024
}

/// Load classification from the queue backlog relative to the worker count.
fn get_system_status(config: &AppConfig, queue: &QueueStats) -> serde_json::Value {
    let workers = config.queue.workers.max(1);
    let backlog_per_worker = queue.total() as f64 / workers as f64;

    let status = if backlog_per_worker > 4.0 {
        "high_load"
    } else if backlog_per_worker > 2.0 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "workers": config.queue.workers,
        "active_tasks": queue.active,
        "pending_tasks": queue.reserved,
        "load_warnings": if backlog_per_worker > 3.0 {
            vec!["Queue backlog is growing - consider increasing queue.workers"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use actix_web::{test as actix_test, App};

    #[test]
    fn test_system_status_levels() {
        let config = AppConfig::default();
        let idle = get_system_status(&config, &QueueStats::default());
        assert_eq!(idle["status"], "normal");

        let busy = get_system_status(&config, &QueueStats { active: 2, reserved: 8 });
        assert_eq!(busy["status"], "high_load");
        assert_eq!(busy["pending_tasks"], 8);
        assert_eq!(busy["load_warnings"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_health_reports_storage() {
        let state = test_state(AppConfig::default());
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"]["name"], "voice-enhance-backend");
        assert_eq!(body["storage"]["max_file_size_mb"], 50);
        assert_eq!(body["storage"]["file_retention_minutes"], 10);
        assert_eq!(body["system"]["status"], "normal");
    }
}
