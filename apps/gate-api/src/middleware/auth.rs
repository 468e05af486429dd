//! 认证和授权中间件
//!
//! - request_context：请求上下文中间件，注入 request_id/trace_id
//! - bearer_token：从 Authorization 头提取 Bearer token
//! - require_caller：验证 access token 并得到 CallerContext
//! - require_admin：仅管理员
//! - require_device_key：设备接口的共享密钥（`x-device-key`）
//!
//! 设备端（心跳 / 扫码校验）不走 JWT，固件只持有共享密钥。

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use domain::CallerContext;
use gate_auth::AuthError;
use gate_telemetry::new_request_ids;
use subtle::ConstantTimeEq;
use tracing::{Instrument, info_span, warn};

use crate::AppState;
use crate::utils::response::{auth_error, forbidden_error, internal_auth_error};

pub const DEVICE_KEY_HEADER: &str = "x-device-key";

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头中提取 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

/// 验证 access token 并提取调用方上下文
pub fn require_caller(state: &AppState, headers: &HeaderMap) -> Result<CallerContext, Response> {
    let token = match bearer_token(headers) {
        Some(token) => token,
        None => return Err(auth_error(StatusCode::UNAUTHORIZED)),
    };
    match state.auth.verify_access_token(token) {
        Ok(ctx) => Ok(ctx),
        Err(AuthError::TokenInvalid | AuthError::TokenExpired) => {
            Err(auth_error(StatusCode::UNAUTHORIZED))
        }
        Err(err) => Err(internal_auth_error(err)),
    }
}

pub fn require_admin(ctx: &CallerContext) -> Result<(), Response> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(forbidden_error())
    }
}

/// 校验设备共享密钥（常量时间比较）
pub fn require_device_key(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(DEVICE_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let matches: bool = state
        .device_api_key
        .as_bytes()
        .ct_eq(presented.as_bytes())
        .into();
    if presented.is_empty() || !matches {
        warn!(target: "gate.security", "device_key_rejected");
        return Err(auth_error(StatusCode::UNAUTHORIZED));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bearer_token;
    use axum::http::{HeaderMap, HeaderValue, header};

    #[test]
    fn bearer_token_extracts() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token-1"),
        );
        assert_eq!(bearer_token(&headers), Some("token-1"));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("token-1"));
        assert_eq!(bearer_token(&headers), None);
    }
}
