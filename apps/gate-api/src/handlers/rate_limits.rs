//! 支付流程限流 handlers
//!
//! - POST /rate-limits/check：计入一次尝试（仅下单 / 支付校验 / 取密钥）
//! - GET /rate-limits/status：只读查询
//! - POST /rate-limits/reset：管理员清除（本身限流并写审计）

use crate::AppState;
use crate::middleware::require_caller;
use crate::utils::response::{
    bad_request_error, forbidden_error, rate_limit_error, rate_limit_status_to_dto, reason_error,
};
use crate::utils::validation::{normalize_optional, normalize_required};
use api_contract::{ApiResponse, RateLimitCheckRequest, RateLimitResetRequest, RateLimitStatusQuery};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{ReasonCode, now_epoch_ms};
use gate_ratelimit::RateLimitAction;

fn parse_action(value: &str) -> Result<RateLimitAction, Response> {
    RateLimitAction::parse(value)
        .ok_or_else(|| bad_request_error(format!("unsupported action: {value}")))
}

pub async fn check_rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RateLimitCheckRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let action = match parse_action(&req.action) {
        Ok(action) => action,
        Err(response) => return response,
    };
    if !action.is_client_checkable() {
        return bad_request_error("action is not client checkable");
    }
    let now_ms = now_epoch_ms();
    let decision = state
        .rate_limiter
        .check_and_record(&ctx.subject_id, action, now_ms)
        .await;
    if !decision.allowed {
        let reason = if decision.degraded {
            ReasonCode::StorageUnavailable
        } else {
            ReasonCode::RateLimited
        };
        return reason_error(reason, decision.retry_after_ms(now_ms));
    }
    (
        StatusCode::OK,
        Json(ApiResponse::success(rate_limit_status_to_dto(
            &ctx.subject_id,
            action.as_str(),
            &decision,
            now_ms,
        ))),
    )
        .into_response()
}

/// 查询他人状态需要管理员。
pub async fn rate_limit_status(
    State(state): State<AppState>,
    Query(query): Query<RateLimitStatusQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let action = match parse_action(&query.action) {
        Ok(action) => action,
        Err(response) => return response,
    };
    let subject_id =
        normalize_optional(query.subject_id).unwrap_or_else(|| ctx.subject_id.clone());
    if subject_id != ctx.subject_id && !ctx.is_admin() {
        return forbidden_error();
    }
    let now_ms = now_epoch_ms();
    match state.rate_limiter.status(&subject_id, action, now_ms).await {
        Ok(decision) => (
            StatusCode::OK,
            Json(ApiResponse::success(rate_limit_status_to_dto(
                &subject_id,
                action.as_str(),
                &decision,
                now_ms,
            ))),
        )
            .into_response(),
        Err(err) => rate_limit_error(err, now_ms),
    }
}

pub async fn reset_rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RateLimitResetRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let subject_id = match normalize_required(req.subject_id, "subjectId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let action = match parse_action(&req.action) {
        Ok(action) => action,
        Err(response) => return response,
    };
    let now_ms = now_epoch_ms();
    match state
        .rate_limiter
        .reset(&ctx, &subject_id, action, now_ms)
        .await
    {
        Ok(cleared) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "subjectId": subject_id,
                "action": action.as_str(),
                "cleared": cleared,
            }))),
        )
            .into_response(),
        Err(err) => rate_limit_error(err, now_ms),
    }
}
