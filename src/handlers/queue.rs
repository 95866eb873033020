use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/queue`: how busy the workers are.
pub async fn get_queue_status(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let stats = state.tracker.queue_stats();

    Ok(HttpResponse::Ok().json(json!({
        "active_tasks": stats.active,
        "pending_tasks": stats.reserved,
        "total_queue": stats.total()
    })))
}
