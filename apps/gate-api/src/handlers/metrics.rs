//! GET /metrics（管理员）：进程内通行计数器快照。

use crate::AppState;
use crate::middleware::{require_admin, require_caller};
use crate::utils::response::metrics_to_dto;
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

pub async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_caller(&state, &headers).and_then(|ctx| require_admin(&ctx)) {
        return response;
    }
    let dto = metrics_to_dto(gate_telemetry::metrics().snapshot());
    (StatusCode::OK, Json(ApiResponse::success(dto))).into_response()
}
