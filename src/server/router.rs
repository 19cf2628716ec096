use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use skuflow_scheduler::JobService;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::metrics;

mod flows;
mod jobs;

use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    metrics::register_metrics();
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(jobs::router())
        .merge(flows::router())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let jobs = state.jobs.list().await;
    let active = jobs
        .iter()
        .filter(|job| !job.status.is_terminal())
        .count();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.health.uptime_secs(),
        "jobs_total": jobs.len(),
        "jobs_active": active,
    }))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok((body, content_type)) => match HeaderValue::from_str(&content_type) {
            Ok(value) => ([(header::CONTENT_TYPE, value)], body).into_response(),
            Err(err) => {
                error!(?err, "failed to build content-type header for metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
            }
        },
        Err(err) => {
            error!(?err, "failed to encode prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
