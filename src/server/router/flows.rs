use action_flow::{Flow, FlowDocument};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use skuflow_core_types::FlowId;
use tracing::instrument;

use crate::errors::ApiError;
use crate::server::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/flows", get(list_flows_handler).post(create_flow_handler))
        .route("/flows/by-name/:name", get(flow_by_name_handler))
        .route(
            "/flows/:flow_id",
            get(get_flow_handler)
                .put(replace_flow_handler)
                .patch(replace_flow_handler)
                .delete(delete_flow_handler),
        )
}

fn document(payload: Result<Json<FlowDocument>, JsonRejection>) -> Result<FlowDocument, ApiError> {
    payload
        .map(|Json(document)| document)
        .map_err(|err| ApiError::bad_request(err.body_text()))
}

#[instrument(skip_all)]
async fn list_flows_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.catalog.list() }))
}

#[instrument(skip_all)]
async fn create_flow_handler(
    State(state): State<AppState>,
    payload: Result<Json<FlowDocument>, JsonRejection>,
) -> Result<(StatusCode, Json<Flow>), ApiError> {
    let flow = state.catalog.create(document(payload)?)?;
    Ok((StatusCode::CREATED, Json(flow)))
}

#[instrument(skip(state))]
async fn get_flow_handler(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<Flow>, ApiError> {
    Ok(Json(state.catalog.get(&FlowId(flow_id))?))
}

#[instrument(skip(state))]
async fn flow_by_name_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Flow>, ApiError> {
    Ok(Json(state.catalog.get_by_name(&name)?))
}

#[instrument(skip(state, payload))]
async fn replace_flow_handler(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    payload: Result<Json<FlowDocument>, JsonRejection>,
) -> Result<Json<Flow>, ApiError> {
    let flow = state.catalog.replace(&FlowId(flow_id), document(payload)?)?;
    Ok(Json(flow))
}

#[instrument(skip(state))]
async fn delete_flow_handler(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.catalog.delete(&FlowId(flow_id))?;
    Ok(Json(json!({ "success": true, "id": removed.id() })))
}
