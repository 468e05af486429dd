//! 通行校验 handlers
//!
//! 所有入口都由已认证主体本人调用，最终汇入 `AccessVerifier::verify`：
//! - POST /access/verify
//! - POST /access/staff-pin-verify
//! - POST /access/staff-biometric-verify
//! - POST /access/staff-emergency-verify
//! - POST /access/admin-override
//!
//! 其余：
//! - POST /access/mark：放行后的签到确认（同一次放行只记一次）
//! - POST /access/log-attempt：客户端自报结果，仅审计
//! - GET /access/attempts
//! - GET /access/review-queue

use crate::AppState;
use crate::middleware::require_caller;
use crate::utils::response::{
    access_error, attempt_to_dto, attendance_error, attendance_to_dto, bad_request_error,
    verify_response,
};
use crate::utils::validation::{normalize_optional, normalize_required};
use api_contract::{
    AccessAttemptDto, AccessAttemptQuery, AdminOverrideRequest, ApiResponse,
    BiometricAssertionDto, LogAttemptRequest, MarkAttendanceRequest, StaffBiometricVerifyRequest,
    StaffEmergencyVerifyRequest, StaffPinVerifyRequest, VerifyRequest,
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{
    AccessMethod, BiometricAssertion, CallerContext, Credential, Decision, ReasonCode,
    now_epoch_ms,
};
use gate_access::AccessRequest;
use serde_json::Value;

#[derive(Debug, Default, serde::Deserialize)]
pub struct ReviewQueueQuery {
    limit: Option<i64>,
}

fn assertion_from_dto(dto: BiometricAssertionDto) -> BiometricAssertion {
    BiometricAssertion {
        credential_id: dto.credential_id,
        signed_at_ms: dto.signed_at_ms,
        signature: dto.signature,
    }
}

/// 按 `credentialType` 解析 `payload`。
pub fn credential_from_request(credential_type: &str, payload: Value) -> Result<Credential, String> {
    let method = AccessMethod::parse(credential_type)
        .ok_or_else(|| format!("unsupported credentialType: {credential_type}"))?;
    let text = |payload: Value| match payload {
        Value::String(value) => Ok(value),
        _ => Err(format!("{} payload must be a string", method.as_str())),
    };
    match method {
        AccessMethod::Qr => match payload {
            Value::String(raw) => Ok(Credential::Qr(raw)),
            Value::Object(_) => Ok(Credential::Qr(payload.to_string())),
            _ => Err("qr payload must be a string or object".to_string()),
        },
        AccessMethod::Pin => text(payload).map(Credential::Pin),
        AccessMethod::Emergency => text(payload).map(Credential::Emergency),
        AccessMethod::Biometric => match payload {
            Value::Null => Ok(Credential::Biometric(None)),
            other => serde_json::from_value::<BiometricAssertionDto>(other)
                .map(|dto| Credential::Biometric(Some(assertion_from_dto(dto))))
                .map_err(|err| format!("invalid biometric assertion: {err}")),
        },
        AccessMethod::AdminOverride => Ok(Credential::AdminOverride),
    }
}

async fn run_verify(
    state: &AppState,
    ctx: &CallerContext,
    facility_id: String,
    device_id: Option<String>,
    credential: Credential,
) -> Response {
    let request = AccessRequest {
        subject_id: ctx.subject_id.clone(),
        facility_id,
        device_id: normalize_optional(device_id),
        credential,
    };
    let outcome = state.verifier.verify(request, now_epoch_ms()).await;
    verify_response(outcome)
}

/// 通用校验入口。
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let credential = match credential_from_request(&req.credential_type, req.payload) {
        Ok(credential) => credential,
        Err(message) => return bad_request_error(message),
    };
    // 二维码自带场馆，其余方式必须指明
    let facility_id = if credential.method() == AccessMethod::Qr {
        req.facility_id.trim().to_string()
    } else {
        match normalize_required(req.facility_id, "facilityId") {
            Ok(value) => value,
            Err(response) => return response,
        }
    };
    run_verify(&state, &ctx, facility_id, req.device_id, credential).await
}

pub async fn staff_pin_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StaffPinVerifyRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let facility_id = match normalize_required(req.facility_id, "facilityId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    run_verify(&state, &ctx, facility_id, req.device_id, Credential::Pin(req.pin)).await
}

pub async fn staff_biometric_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StaffBiometricVerifyRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let facility_id = match normalize_required(req.facility_id, "facilityId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let credential = Credential::Biometric(req.assertion.map(assertion_from_dto));
    run_verify(&state, &ctx, facility_id, req.device_id, credential).await
}

pub async fn staff_emergency_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StaffEmergencyVerifyRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let facility_id = match normalize_required(req.facility_id, "facilityId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    run_verify(
        &state,
        &ctx,
        facility_id,
        req.device_id,
        Credential::Emergency(req.code),
    )
    .await
}

pub async fn admin_override(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdminOverrideRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let facility_id = match normalize_required(req.facility_id, "facilityId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    run_verify(
        &state,
        &ctx,
        facility_id,
        req.device_id,
        Credential::AdminOverride,
    )
    .await
}

/// 签到确认：新建 201，重复确认 200 并返回既有记录。
pub async fn mark_attendance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MarkAttendanceRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let attempt_id = match normalize_required(req.attempt_id, "attemptId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state.ledger.mark(&ctx, &attempt_id).await {
        Ok(written) => {
            let status = if written.inserted {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(ApiResponse::success(attendance_to_dto(
                    written.record,
                    written.inserted,
                ))),
            )
                .into_response()
        }
        Err(err) => attendance_error(err),
    }
}

/// 客户端自报结果。`result` 接受 granted/success 与 denied/failed。
pub async fn log_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogAttemptRequest>,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let Some(method) = AccessMethod::parse(&req.method) else {
        return bad_request_error(format!("unsupported method: {}", req.method));
    };
    let decision = match req.result.trim() {
        "granted" | "success" => Decision::Granted,
        "denied" | "failed" => Decision::Denied(
            req.reason
                .as_deref()
                .and_then(ReasonCode::parse)
                .unwrap_or(ReasonCode::InvalidCredential),
        ),
        other => return bad_request_error(format!("unsupported result: {other}")),
    };
    let device_id = normalize_optional(req.device_id);
    match state
        .verifier
        .log_client_attempt(
            &ctx,
            method,
            req.facility_id.trim(),
            device_id.as_deref(),
            decision,
            now_epoch_ms(),
        )
        .await
    {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(attempt_to_dto(record))),
        )
            .into_response(),
        Err(err) => access_error(err),
    }
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<AccessAttemptQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let granted = match query.result.as_deref().map(str::trim) {
        None | Some("") => None,
        Some("granted") => Some(true),
        Some("denied") => Some(false),
        Some(other) => return bad_request_error(format!("unsupported result: {other}")),
    };
    let store_query = gate_storage::AccessAttemptQuery {
        subject_id: normalize_optional(query.subject_id),
        device_id: normalize_optional(query.device_id).map(|id| id.to_ascii_uppercase()),
        granted,
        from_ms: query.from,
        to_ms: query.to,
        limit: query.limit,
        offset: query.offset,
        ..gate_storage::AccessAttemptQuery::default()
    };
    match state.verifier.list_attempts(&ctx, store_query).await {
        Ok(items) => {
            let data: Vec<AccessAttemptDto> = items.into_iter().map(attempt_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => access_error(err),
    }
}

/// 待复核的应急放行（场馆主 / 管理员）。
pub async fn review_queue(
    State(state): State<AppState>,
    Query(query): Query<ReviewQueueQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_caller(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.verifier.review_queue(&ctx, query.limit).await {
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
    use serde_json::json;

    #[test]
    fn qr_payload_accepts_object_and_string() {
        let object = credential_from_request(
            "qr",
            json!({ "type": "gym_owner", "gymOwnerId": "gym-1" }),
        )
        .expect("object");
        assert!(matches!(object, Credential::Qr(raw) if raw.contains("gym-1")));
        let text = credential_from_request("qr", json!("gym-1:member-1")).expect("string");
        assert_eq!(text, Credential::Qr("gym-1:member-1".to_string()));
    }

    #[test]
    fn biometric_null_means_no_assertion() {
        assert_eq!(
            credential_from_request("biometric", Value::Null).expect("credential"),
            Credential::Biometric(None)
        );
        let assertion = credential_from_request(
            "biometric",
            json!({ "credentialId": "cred-1", "signedAtMs": 1, "signature": "ab" }),
        )
        .expect("assertion");
        assert!(matches!(assertion, Credential::Biometric(Some(_))));
    }

    #[test]
    fn rejects_unknown_type_and_wrong_shape() {
        assert!(credential_from_request("face", Value::Null).is_err());
        assert!(credential_from_request("pin", json!(1234)).is_err());
    }
}
