//! HTTP 响应辅助函数和 DTO 转换
//!
//! 错误响应统一为 `ApiResponse` 格式；存储与配置类错误只记日志，不把原文返回给调用方。

use api_contract::{
    AccessAttemptDto, ApiError, ApiResponse, AttendanceRecordDto, AttendanceStatsDto, AuditLogDto,
    DeviceDecisionDto, DeviceDto, GymSummaryDto, HeartbeatAckDto, MemberSummaryDto,
    MembershipDto, MetricsSnapshotDto, RateLimitStatusDto, SystemInfoDto, VerifyResponse,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{Decision, RateLimitDecision, ReasonCode, Role, SystemInfo};
use gate_access::{AccessError, VerifyOutcome};
use gate_attendance::{AttendanceError, AttendanceStats};
use gate_auth::AuthError;
use gate_devices::{DeviceError, DeviceView, HeartbeatAck};
use gate_membership::{MemberMembership, MembershipError, MembershipState};
use gate_ratelimit::RateLimitError;
use gate_storage::{AccessAttemptRecord, AttendanceRecord, AuditLogRecord};
use gate_telemetry::MetricsSnapshot;
use std::fmt::Display;
use tracing::error;

/// 认证错误响应
pub fn auth_error(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()>::error(
            "AUTH.UNAUTHORIZED",
            "unauthorized",
        )),
    )
        .into_response()
}

/// 禁止访问错误响应
pub fn forbidden_error() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ApiResponse::<()>::error("AUTH.FORBIDDEN", "forbidden")),
    )
        .into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

pub fn conflict_error(code: &str, message: &str) -> Response {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::<()>::error(code, message)),
    )
        .into_response()
}

/// 认证内部错误响应
pub fn internal_auth_error(err: AuthError) -> Response {
    internal_error(err)
}

/// 存储错误响应
pub fn storage_error(err: impl Display) -> Response {
    internal_error(err)
}

fn internal_error(err: impl Display) -> Response {
    error!(target: "gate.api", error = %err, "internal_error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", "internal error")),
    )
        .into_response()
}

/// 拒绝原因对应的 HTTP 状态码
pub fn status_for_reason(reason: ReasonCode) -> StatusCode {
    match reason {
        ReasonCode::InvalidCredential | ReasonCode::MembershipExpired | ReasonCode::WrongFacility => {
            StatusCode::FORBIDDEN
        }
        ReasonCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ReasonCode::UnknownDevice => StatusCode::NOT_FOUND,
        ReasonCode::Deactivated => StatusCode::GONE,
        ReasonCode::DuplicateDevice => StatusCode::CONFLICT,
        ReasonCode::UnsupportedDevice => StatusCode::UNPROCESSABLE_ENTITY,
        ReasonCode::DeviceOffline
        | ReasonCode::DeviceTimeout
        | ReasonCode::ConfigurationError
        | ReasonCode::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// 携带补救提示的拒绝响应
pub fn reason_error(reason: ReasonCode, retry_after_ms: Option<i64>) -> Response {
    (
        status_for_reason(reason),
        Json(ApiResponse::<()>::error_with_hint(
            reason.code(),
            reason.user_message(),
            reason.remediation().map(str::to_string),
            retry_after_ms,
        )),
    )
        .into_response()
}

pub fn device_error(err: DeviceError) -> Response {
    match err {
        DeviceError::Forbidden => forbidden_error(),
        DeviceError::InvalidInput(message) => bad_request_error(message),
        DeviceError::Storage(message) => storage_error(message),
        other => match other.reason() {
            Some(reason) => reason_error(reason, None),
            None => storage_error(other),
        },
    }
}

pub fn access_error(err: AccessError) -> Response {
    match err {
        AccessError::Forbidden => forbidden_error(),
        AccessError::NotFound => not_found_error(),
        AccessError::InvalidInput(message) => bad_request_error(message),
        AccessError::Storage(message) => storage_error(message),
    }
}

pub fn attendance_error(err: AttendanceError) -> Response {
    match err {
        AttendanceError::NotFound => not_found_error(),
        AttendanceError::Forbidden => forbidden_error(),
        AttendanceError::NotGranted => conflict_error(
            "ATTENDANCE.NOT_GRANTED",
            "attempt was not granted by the server",
        ),
        AttendanceError::NotMember => {
            conflict_error("ATTENDANCE.NOT_MEMBER", "subject is not a member")
        }
        AttendanceError::Storage(message) => storage_error(message),
    }
}

pub fn membership_error(err: MembershipError) -> Response {
    match err {
        MembershipError::NotFound => not_found_error(),
        MembershipError::Storage(message) => storage_error(message),
    }
}

pub fn rate_limit_error(err: RateLimitError, now_ms: i64) -> Response {
    match err {
        RateLimitError::Forbidden => forbidden_error(),
        RateLimitError::RateLimited { blocked_until_ms } => reason_error(
            ReasonCode::RateLimited,
            blocked_until_ms.map(|until| (until - now_ms).max(0)),
        ),
        RateLimitError::Storage(message) => {
            error!(target: "gate.api", error = %message, "rate_limit_store_failed");
            reason_error(ReasonCode::StorageUnavailable, None)
        }
    }
}

/// 通行校验结论：放行 200；拒绝按原因映射状态码，`data` 仍带完整结论。
pub fn verify_response(outcome: VerifyOutcome) -> Response {
    let reason = outcome.decision.reason();
    let status = reason.map(status_for_reason).unwrap_or(StatusCode::OK);
    let error = reason.map(|reason| ApiError {
        code: reason.code().to_string(),
        message: reason.user_message().to_string(),
        remediation: reason.remediation().map(str::to_string),
        retry_after_ms: outcome.retry_after_ms,
    });
    let body = ApiResponse {
        success: outcome.decision.is_granted(),
        data: Some(verify_outcome_to_dto(outcome)),
        error,
    };
    (status, Json(body)).into_response()
}

pub fn verify_outcome_to_dto(outcome: VerifyOutcome) -> VerifyResponse {
    let reason = outcome.decision.reason();
    let membership = outcome.membership;
    let (status, message) = match reason {
        None => ("success", "access granted".to_string()),
        Some(reason) => ("error", reason.user_message().to_string()),
    };
    let member = outcome.subject.as_ref().and_then(|subject| {
        subject.roles.contains(&Role::Member).then(|| MemberSummaryDto {
            id: subject.subject_id.clone(),
            name: subject.display_name.clone(),
            membership: membership.map(|state| {
                membership_state_to_dto(&subject.subject_id, facility_of(&outcome), state)
            }),
        })
    });
    VerifyResponse {
        status: status.to_string(),
        message,
        member,
        gym: outcome.facility.as_ref().map(|facility| GymSummaryDto {
            id: facility.facility_id.clone(),
            name: facility.name.clone(),
        }),
        attempt_id: Some(outcome.attempt_id.clone()),
        reason: reason.map(|reason| reason.code().to_string()),
        remediation: reason.and_then(|reason| reason.remediation().map(str::to_string)),
        retry_after_ms: outcome.retry_after_ms,
        review_required: outcome.review_required,
    }
}

fn facility_of(outcome: &VerifyOutcome) -> &str {
    outcome
        .facility
        .as_ref()
        .map(|facility| facility.facility_id.as_str())
        .unwrap_or_default()
}

/// 设备端结论：设备据 `action` 驱动闸机，`node_mcu_response` 供旧固件使用。
pub fn device_decision_to_dto(outcome: VerifyOutcome) -> DeviceDecisionDto {
    let granted = outcome.decision.is_granted();
    let reason = outcome.decision.reason();
    DeviceDecisionDto {
        decision: outcome.decision.result_str().to_string(),
        action: if granted { "GRANT_ACCESS" } else { "DENY_ACCESS" }.to_string(),
        duration_ms: if granted { outcome.door_open_ms as i64 } else { 0 },
        reason: reason.map(|reason| reason.code().to_string()),
        message: match reason {
            None => "access granted".to_string(),
            Some(reason) => reason.user_message().to_string(),
        },
        node_mcu_response: if granted { "ACTIVE" } else { "INACTIVE" }.to_string(),
        attempt_id: Some(outcome.attempt_id),
    }
}

pub fn system_info_to_dto(info: &SystemInfo) -> SystemInfoDto {
    SystemInfoDto {
        uptime_ms: info.uptime_ms,
        free_heap: info.free_heap,
        rssi: info.rssi,
    }
}

pub fn system_info_from_dto(dto: Option<SystemInfoDto>) -> SystemInfo {
    let dto = dto.unwrap_or_default();
    SystemInfo {
        uptime_ms: dto.uptime_ms,
        free_heap: dto.free_heap,
        rssi: dto.rssi,
    }
}

pub fn device_to_dto(view: DeviceView) -> DeviceDto {
    let record = view.record;
    DeviceDto {
        system_info: system_info_to_dto(&record.system_info),
        device_id: record.device_id,
        owner_id: record.owner_id,
        location: record.location,
        status: record.status.as_str().to_string(),
        is_online: view.is_online,
        last_heartbeat_ms: record.last_heartbeat_ms,
        granted_count: record.granted_count,
        denied_count: record.denied_count,
        created_at_ms: record.created_at_ms,
    }
}

pub fn heartbeat_ack_to_dto(ack: HeartbeatAck) -> HeartbeatAckDto {
    HeartbeatAckDto {
        device_id: ack.device_id,
        status: ack.status.as_str().to_string(),
        received_at_ms: ack.received_at_ms,
        next_heartbeat_ms: ack.next_heartbeat_ms,
    }
}

pub fn attempt_to_dto(record: AccessAttemptRecord) -> AccessAttemptDto {
    AccessAttemptDto {
        attempt_id: record.attempt_id,
        subject_id: record.subject_id,
        method: record.method.as_str().to_string(),
        facility_id: record.facility_id,
        device_id: record.device_id,
        result: record.decision.result_str().to_string(),
        reason: match record.decision {
            Decision::Granted => None,
            Decision::Denied(reason) => Some(reason.code().to_string()),
        },
        origin: record.origin.as_str().to_string(),
        review_required: record.review_required,
        timestamp_ms: record.ts_ms,
    }
}

pub fn attendance_to_dto(record: AttendanceRecord, created: bool) -> AttendanceRecordDto {
    AttendanceRecordDto {
        attendance_id: record.attendance_id,
        attempt_id: record.attempt_id,
        member_id: record.member_id,
        facility_id: record.facility_id,
        timestamp_ms: record.ts_ms,
        created,
    }
}

pub fn membership_state_to_dto(
    member_id: &str,
    facility_id: &str,
    state: MembershipState,
) -> MembershipDto {
    MembershipDto {
        member_id: member_id.to_string(),
        facility_id: facility_id.to_string(),
        membership_end_ms: state.membership_end_ms,
        status: state.status.as_str().to_string(),
        days_remaining: state.days_remaining,
        expiring_soon: state.expiring_soon(),
    }
}

pub fn membership_to_dto(membership: &MemberMembership) -> MembershipDto {
    membership_state_to_dto(
        &membership.member_id,
        &membership.facility_id,
        membership.state,
    )
}

pub fn stats_to_dto(member_id: &str, stats: AttendanceStats) -> AttendanceStatsDto {
    AttendanceStatsDto {
        member_id: member_id.to_string(),
        total_days: stats.total_days,
        this_month: stats.this_month,
        today: stats.today,
        average_per_week: stats.average_per_week,
        current_streak: stats.current_streak,
    }
}

pub fn rate_limit_status_to_dto(
    subject_id: &str,
    action: &str,
    decision: &RateLimitDecision,
    now_ms: i64,
) -> RateLimitStatusDto {
    RateLimitStatusDto {
        subject_id: subject_id.to_string(),
        action: action.to_string(),
        allowed: decision.allowed,
        remaining_attempts: decision.remaining_attempts,
        blocked_until_ms: decision.blocked_until_ms,
        retry_after_ms: decision.retry_after_ms(now_ms),
    }
}

pub fn audit_log_to_dto(record: AuditLogRecord) -> AuditLogDto {
    AuditLogDto {
        audit_id: record.audit_id,
        facility_id: record.facility_id,
        actor: record.actor,
        action: record.action,
        resource: record.resource,
        result: record.result,
        detail: record.detail,
        timestamp_ms: record.ts_ms,
    }
}

pub fn metrics_to_dto(snapshot: MetricsSnapshot) -> MetricsSnapshotDto {
    let verify_latency_ms_avg = snapshot
        .verify_latency_ms_total
        .checked_div(snapshot.verify_latency_ms_count)
        .unwrap_or(0);
    MetricsSnapshotDto {
        access_granted: snapshot.access_granted,
        access_denied: snapshot.access_denied,
        rate_limited: snapshot.rate_limited,
        emergency_grants: snapshot.emergency_grants,
        heartbeats_accepted: snapshot.heartbeats_accepted,
        heartbeats_rejected: snapshot.heartbeats_rejected,
        attendance_recorded: snapshot.attendance_recorded,
        storage_failures: snapshot.storage_failures,
        verify_latency_ms_total: snapshot.verify_latency_ms_total,
        verify_latency_ms_count: snapshot.verify_latency_ms_count,
        verify_latency_ms_avg,
    }
}
