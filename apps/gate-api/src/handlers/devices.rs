//! 门禁设备 handlers
//!
//! 设备端（`x-device-key`）：
//! - POST /devices/heartbeat
//! - POST /devices/validate
//!
//! 运维端（Bearer token）：
//! - POST /devices/register
//! - GET /devices
//! - GET /devices/health
//! - PATCH /devices/{id}/deactivate
//! - PATCH /devices/{id}/status
//! - GET /devices/{id}/attempts

use crate::AppState;
use crate::middleware::{require_caller, require_device_key};
use crate::utils::response::{
    access_error, attempt_to_dto, bad_request_error, device_decision_to_dto, device_error,
    device_to_dto, heartbeat_ack_to_dto, reason_error, system_info_from_dto,
};
use crate::utils::validation::{normalize_optional, normalize_required};
use api_contract::{
    AccessAttemptDto, ApiResponse, DeviceDto, DeviceHealthDto, DeviceValidateRequest,
    HeartbeatRequest, RegisterDeviceRequest, UpdateDeviceStatusRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{DeviceStatus, ReasonCode, now_epoch_ms};
use gate_devices::normalize_device_id;
use gate_ratelimit::RateLimitAction;

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    owner_id: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// 注册设备：新建 201，同一场馆重复注册 200，其他场馆已占用 409。
pub async fn register_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let device_id = match normalize_required(req.device_id, "deviceId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let owner_id = match normalize_required(req.owner_id, "ownerId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let location = normalize_optional(req.location).unwrap_or_default();
    match state
        .devices
        .register(&ctx, &device_id, &owner_id, &location, now_epoch_ms())
        .await
    {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(ApiResponse::success(device_to_dto(outcome.device))),
            )
                .into_response()
        }
        Err(err) => device_error(err),
    }
}

/// 设备心跳：未注册 404，已停用 410。心跳本身按设备限流（存储故障时放行）。
pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<HeartbeatRequest>,
) -> Response {
    if let Err(response) = require_device_key(&state, &headers) {
        return response;
    }
    let Some(device_id) = normalize_device_id(&req.device_id) else {
        return bad_request_error("deviceId required");
    };
    let now_ms = now_epoch_ms();
    let limit = state
        .rate_limiter
        .check_and_record(&device_id, RateLimitAction::Heartbeat, now_ms)
        .await;
    if !limit.allowed {
        return reason_error(ReasonCode::RateLimited, limit.retry_after_ms(now_ms));
    }
    match state
        .devices
        .heartbeat(&device_id, system_info_from_dto(req.telemetry), now_ms)
        .await
    {
        Ok(ack) => (
            StatusCode::OK,
            Json(ApiResponse::success(heartbeat_ack_to_dto(ack))),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}

/// 设备转发的扫码内容，由服务端判定后回传闸机指令。判定结果总是 200。
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeviceValidateRequest>,
) -> Response {
    if let Err(response) = require_device_key(&state, &headers) {
        return response;
    }
    let device_id = match normalize_required(req.device_id, "deviceId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let payload = match normalize_required(req.credential_payload, "credentialPayload") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let outcome = state
        .verifier
        .verify_device_scan(&device_id, &payload, now_epoch_ms())
        .await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(device_decision_to_dto(outcome))),
    )
        .into_response()
}

pub async fn deactivate_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .devices
        .deactivate(&ctx, &path.device_id, now_epoch_ms())
        .await
    {
        Ok(view) => (StatusCode::OK, Json(ApiResponse::success(device_to_dto(view)))).into_response(),
        Err(err) => device_error(err),
    }
}

/// active ⇄ maintenance
pub async fn update_device_status(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
    Json(req): Json<UpdateDeviceStatusRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let Some(status) = DeviceStatus::parse(&req.status) else {
        return bad_request_error("status must be active or maintenance");
    };
    match state
        .devices
        .set_status(&ctx, &path.device_id, status, now_epoch_ms())
        .await
    {
        Ok(view) => (StatusCode::OK, Json(ApiResponse::success(device_to_dto(view)))).into_response(),
        Err(err) => device_error(err),
    }
}

pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let owner_id = normalize_optional(query.owner_id);
    match state
        .devices
        .list_for_owner(&ctx, owner_id.as_deref(), now_epoch_ms())
        .await
    {
        Ok(items) => {
            let data: Vec<DeviceDto> = items.into_iter().map(device_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => device_error(err),
    }
}

/// 健康快照，供外部定时轮询。
pub async fn device_health(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let owner_id = normalize_optional(query.owner_id);
    match state
        .devices
        .health(&ctx, owner_id.as_deref(), now_epoch_ms())
        .await
    {
        Ok(health) => {
            let dto = DeviceHealthDto {
                total: health.total,
                online: health.online,
                offline: health.offline,
                maintenance: health.maintenance,
                deactivated: health.deactivated,
                checked_at_ms: health.checked_at_ms,
                devices: health.devices.into_iter().map(device_to_dto).collect(),
            };
            (StatusCode::OK, Json(ApiResponse::success(dto))).into_response()
        }
        Err(err) => device_error(err),
    }
}

pub async fn device_attempts(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .verifier
        .device_attempts(&ctx, &path.device_id, query.limit, query.offset)
        .await
    {
        Ok(items) => {
            let data: Vec<AccessAttemptDto> = items.into_iter().map(attempt_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => access_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::response::system_info_to_dto;

    #[test]
    fn device_list_query_reads_camel_case() {
        let query: DeviceListQuery =
            serde_json::from_value(serde_json::json!({ "ownerId": "gym-1" })).expect("query");
        assert_eq!(query.owner_id.as_deref(), Some("gym-1"));
    }

    #[test]
    fn system_info_defaults_when_missing() {
        let info = system_info_from_dto(None);
        assert_eq!(system_info_to_dto(&info).rssi, None);
    }
}
