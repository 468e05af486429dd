//! 探针与认证 handlers
//!
//! ### 公开端点
//! - `GET /health`、`GET /livez`：进程存活
//! - `GET /readyz`：配置了 Postgres 时做一次往返
//! - `POST /login`：用户名口令登录，返回 access/refresh token
//! - `POST /refresh-token`：refresh token 轮换（旧 token 同时失效）

use crate::AppState;
use crate::utils::response::{auth_error, internal_auth_error};
use api_contract::{
    ApiResponse, LoginRequest, LoginResponse, RefreshTokenRequest, RefreshTokenResponse,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gate_auth::{AuthError, AuthTokens};

fn probe(ok: bool) -> Response {
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ "ok": ok }))).into_response()
}

pub async fn health() -> Response {
    probe(true)
}

/// 只反映进程存活，不做外部依赖检查。
pub async fn livez() -> Response {
    probe(true)
}

/// 未配置 Postgres 时恒为就绪。
pub async fn readyz(State(state): State<AppState>) -> Response {
    let Some(pool) = state.db_pool.as_ref() else {
        return probe(true);
    };
    match gate_storage::ping(pool).await {
        Ok(()) => probe(true),
        Err(err) => {
            tracing::warn!(target: "gate.api", error = %err, "readyz_check_failed");
            probe(false)
        }
    }
}

/// 客户端约定 `expires` 为毫秒时间戳。
fn expires_ms(tokens: &AuthTokens) -> u64 {
    tokens.expires_at.saturating_mul(1000)
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let (subject, tokens) = match state.auth.login(req.username.trim(), &req.password).await {
        Ok(pair) => pair,
        Err(AuthError::InvalidCredentials) => return auth_error(StatusCode::UNAUTHORIZED),
        Err(err) => return internal_auth_error(err),
    };
    let response = LoginResponse {
        expires: expires_ms(&tokens),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        subject_id: subject.subject_id,
        username: subject.username,
        facility_id: subject.facility_id,
        roles: subject.roles,
    };
    (StatusCode::OK, Json(ApiResponse::success(response))).into_response()
}

/// 旧 refresh token 在轮换后立即失效，重放返回 401。
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Response {
    let tokens = match state.auth.refresh(&req.refresh_token).await {
        Ok(tokens) => tokens,
        Err(AuthError::TokenInvalid | AuthError::TokenExpired) => {
            return auth_error(StatusCode::UNAUTHORIZED);
        }
        Err(err) => return internal_auth_error(err),
    };
    let response = RefreshTokenResponse {
        expires: expires_ms(&tokens),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    (StatusCode::OK, Json(ApiResponse::success(response))).into_response()
}
