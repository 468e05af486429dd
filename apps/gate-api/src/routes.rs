//! 路由定义
//!
//! - 探针：/health, /livez, /readyz
//! - 认证：/login, /refresh-token
//! - 设备：/devices/*
//! - 通行：/access/*
//! - 会员：/members/{id}/*
//! - 限流：/rate-limits/*
//! - 审计：/audit-logs
//! - 指标：/metrics
//!
//! 同时挂在 / 与 /api/ 前缀下。

use super::AppState;
use super::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/devices", get(list_devices))
        .route("/devices/register", post(register_device))
        .route("/devices/heartbeat", post(heartbeat))
        .route("/devices/validate", post(validate))
        .route("/devices/health", get(device_health))
        .route("/devices/:device_id/deactivate", patch(deactivate_device))
        .route("/devices/:device_id/status", patch(update_device_status))
        .route("/devices/:device_id/attempts", get(device_attempts))
        .route("/access/verify", post(verify))
        .route("/access/staff-pin-verify", post(staff_pin_verify))
        .route("/access/staff-biometric-verify", post(staff_biometric_verify))
        .route("/access/staff-emergency-verify", post(staff_emergency_verify))
        .route("/access/admin-override", post(admin_override))
        .route("/access/mark", post(mark_attendance))
        .route("/access/log-attempt", post(log_attempt))
        .route("/access/attempts", get(list_attempts))
        .route("/access/review-queue", get(review_queue))
        .route("/members/:member_id/membership", get(get_membership))
        .route("/members/:member_id/attendance", get(list_attendance))
        .route("/members/:member_id/attendance/stats", get(attendance_stats))
        .route("/rate-limits/check", post(check_rate_limit))
        .route("/rate-limits/status", get(rate_limit_status))
        .route("/rate-limits/reset", post(reset_rate_limit))
        .route("/audit-logs", get(list_audit_logs))
        .route("/metrics", get(get_metrics))
}

/// 完整应用：路由 + 状态 + 请求上下文。
pub fn app(state: AppState) -> Router {
    let api = create_api_router();
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context))
}
