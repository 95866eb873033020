use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the running configuration.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "cors_origins": config.server.cors_origins
            },
            "storage": {
                "max_file_size_mb": config.storage.max_file_size_mb,
                "allowed_extensions": config.storage.allowed_extensions,
                "retention_minutes": config.storage.retention_minutes,
                "cleanup_interval_secs": config.storage.cleanup_interval_secs
            },
            "enhancement": {
                "target_sample_rate": config.enhancement.target_sample_rate,
                "max_chunk_duration_secs": config.enhancement.max_chunk_duration_secs,
                "chunk_overlap_secs": config.enhancement.chunk_overlap_secs,
                "attenuation_limit_db": config.enhancement.attenuation_limit_db,
                "output_gain_db": config.enhancement.output_gain_db
            },
            "queue": {
                "workers": config.queue.workers
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::tests::test_state;
    use actix_web::{test as actix_test, App};

    #[actix_web::test]
    async fn test_config_is_exposed() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(AppConfig::default())))
                .route("/api/config", web::get().to(get_config)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api/config").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["config"]["enhancement"]["target_sample_rate"], 48000);
        assert_eq!(body["config"]["storage"]["allowed_extensions"].as_array().unwrap().len(), 7);
    }
}
