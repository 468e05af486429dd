//! 稳定的 DTO 与 API 响应契约。
//!
//! 设备端（嵌入式固件）与会员/员工客户端共用同一套 JSON 约定：字段统一 camelCase，
//! 时间统一为 epoch 毫秒。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                remediation: None,
                retry_after_ms: None,
            }),
        }
    }

    /// 附带补救提示（重试时间 / 联系运营方）的错误响应。
    pub fn error_with_hint(
        code: impl Into<String>,
        message: impl Into<String>,
        remediation: Option<String>,
        retry_after_ms: Option<i64>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                remediation,
                retry_after_ms,
            }),
        }
    }
}

// ============================================
// 认证
// ============================================

/// 登录请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应体。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires: u64,
    pub subject_id: String,
    pub username: String,
    pub facility_id: String,
    pub roles: Vec<String>,
}

/// 刷新 token 请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

/// 刷新 token 响应体。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires: u64,
}

// ============================================
// 设备
// ============================================

/// 设备遥测。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfoDto {
    #[serde(default, alias = "uptime")]
    pub uptime_ms: Option<i64>,
    #[serde(default, alias = "free_heap")]
    pub free_heap: Option<i64>,
    #[serde(default, alias = "signalStrength")]
    pub rssi: Option<i32>,
}

/// 设备注册请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// 心跳请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub device_id: String,
    #[serde(default, alias = "systemInfo")]
    pub telemetry: Option<SystemInfoDto>,
}

/// 心跳应答。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAckDto {
    pub device_id: String,
    pub status: String,
    pub received_at_ms: i64,
    pub next_heartbeat_ms: i64,
}

/// 设备端校验请求：设备把扫码内容原样转发给服务端。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceValidateRequest {
    pub device_id: String,
    pub credential_payload: String,
}

/// 设备端校验结论，设备据此驱动闸机。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDecisionDto {
    pub decision: String,
    /// `GRANT_ACCESS` / `DENY_ACCESS`
    pub action: String,
    pub duration_ms: i64,
    pub reason: Option<String>,
    pub message: String,
    /// `ACTIVE` / `INACTIVE`
    pub node_mcu_response: String,
    pub attempt_id: Option<String>,
}

/// 设备状态更新请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceStatusRequest {
    pub status: String,
}

/// 设备返回结构。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    pub owner_id: String,
    pub location: String,
    pub status: String,
    pub is_online: bool,
    pub last_heartbeat_ms: Option<i64>,
    pub system_info: SystemInfoDto,
    pub granted_count: i64,
    pub denied_count: i64,
    pub created_at_ms: i64,
}

/// 设备健康快照（供外部定时轮询）。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealthDto {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub maintenance: usize,
    pub deactivated: usize,
    pub checked_at_ms: i64,
    pub devices: Vec<DeviceDto>,
}

// ============================================
// 通行校验
// ============================================

/// 通用校验请求体。
///
/// `payload` 的结构随 `credentialType` 变化：qr 为二维码原文（字符串或对象），
/// pin / emergency 为字符串，biometric 为断言对象或 null。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub credential_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// 生物识别断言。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricAssertionDto {
    pub credential_id: String,
    pub signed_at_ms: i64,
    pub signature: String,
}

/// 员工 PIN 入口。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPinVerifyRequest {
    pub pin: String,
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// 员工生物识别入口。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffBiometricVerifyRequest {
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub assertion: Option<BiometricAssertionDto>,
}

/// 应急码入口。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffEmergencyVerifyRequest {
    #[serde(alias = "emergencyCode")]
    pub code: String,
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// 管理员越权放行。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverrideRequest {
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// 会员摘要。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummaryDto {
    pub id: String,
    pub name: String,
    pub membership: Option<MembershipDto>,
}

/// 场馆摘要。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GymSummaryDto {
    pub id: String,
    pub name: String,
}

/// 校验结论（客户端形态）。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// `success` / `error`
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberSummaryDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gym: Option<GymSummaryDto>,
    pub attempt_id: Option<String>,
    pub reason: Option<String>,
    pub remediation: Option<String>,
    pub retry_after_ms: Option<i64>,
    pub review_required: bool,
}

/// 签到确认请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub attempt_id: String,
}

/// 签到记录。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecordDto {
    pub attendance_id: String,
    pub attempt_id: String,
    pub member_id: String,
    pub facility_id: String,
    pub timestamp_ms: i64,
    /// 本次请求是否新建（重复确认返回 false）。
    pub created: bool,
}

/// 客户端自报的通行结果（仅审计）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAttemptRequest {
    pub method: String,
    pub facility_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub result: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 通行审计记录。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAttemptDto {
    pub attempt_id: String,
    pub subject_id: String,
    pub method: String,
    pub facility_id: String,
    pub device_id: Option<String>,
    pub result: String,
    pub reason: Option<String>,
    pub origin: String,
    pub review_required: bool,
    pub timestamp_ms: i64,
}

/// 通行审计查询参数。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAttemptQuery {
    pub subject_id: Option<String>,
    pub device_id: Option<String>,
    pub result: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================
// 会员与签到统计
// ============================================

/// 会员状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDto {
    pub member_id: String,
    pub facility_id: String,
    pub membership_end_ms: Option<i64>,
    pub status: String,
    pub days_remaining: Option<i64>,
    pub expiring_soon: bool,
}

/// 签到统计。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStatsDto {
    pub member_id: String,
    pub total_days: u32,
    pub this_month: u32,
    pub today: u32,
    pub average_per_week: u32,
    pub current_streak: u32,
}

// ============================================
// 限流
// ============================================

/// 支付流程限流检查。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCheckRequest {
    pub action: String,
}

/// 限流状态查询参数。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatusQuery {
    pub action: String,
    #[serde(default)]
    pub subject_id: Option<String>,
}

/// 管理员清除限流状态。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResetRequest {
    pub subject_id: String,
    pub action: String,
}

/// 限流状态。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatusDto {
    pub subject_id: String,
    pub action: String,
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub blocked_until_ms: Option<i64>,
    pub retry_after_ms: Option<i64>,
}

// ============================================
// 指标
// ============================================

/// 通行指标快照。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub access_granted: u64,
    pub access_denied: u64,
    pub rate_limited: u64,
    pub emergency_grants: u64,
    pub heartbeats_accepted: u64,
    pub heartbeats_rejected: u64,
    pub attendance_recorded: u64,
    pub storage_failures: u64,
    pub verify_latency_ms_total: u64,
    pub verify_latency_ms_count: u64,
    /// 无样本时为 0。
    pub verify_latency_ms_avg: u64,
}

// ============================================
// 运维审计
// ============================================

/// 审计记录。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDto {
    pub audit_id: String,
    pub facility_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub detail: Option<String>,
    pub timestamp_ms: i64,
}

/// 审计查询参数。`action` 为动作前缀，如 `DEVICE.`。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQueryParams {
    pub facility_id: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<i64>,
}
