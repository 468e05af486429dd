//! 数据模型
//!
//! - 主体：SubjectRecord（会员 / 教练 / 场馆主 / 管理员）
//! - 设备：DeviceRecord, DeviceCreateResult
//! - 通行审计：AccessAttemptRecord, AccessAttemptQuery
//! - 签到：AttendanceRecord, AttendanceWriteResult
//! - 运维审计：AuditLogRecord

use domain::{
    AccessMethod, AttemptOrigin, CallerContext, Decision, DeviceStatus, Role, SystemInfo,
};

/// 主体记录。
///
/// `pin_hash` 与 `password_hash` 同为 argon2 PHC 串；`biometric_secret` 为注册时
/// 下发给终端的 HMAC 密钥（十六进制）。
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub subject_id: String,
    pub facility_id: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub pin_hash: Option<String>,
    pub biometric_credential_id: Option<String>,
    pub biometric_secret: Option<String>,
    pub membership_end_ms: Option<i64>,
    /// 显式会员状态标记（管理员覆盖）。
    pub membership_status: Option<String>,
}

impl SubjectRecord {
    /// 解析后的角色；未知角色码被忽略。
    pub fn parsed_roles(&self) -> Vec<Role> {
        self.roles.iter().filter_map(|role| Role::parse(role)).collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.parsed_roles().contains(&role)
    }

    pub fn to_caller_context(&self) -> CallerContext {
        CallerContext::new(
            self.facility_id.clone(),
            self.subject_id.clone(),
            self.parsed_roles(),
        )
    }
}

/// 门禁设备记录。`is_online` 不落库，读取时由 `domain::is_online` 推导。
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub owner_id: String,
    pub location: String,
    pub status: DeviceStatus,
    pub last_heartbeat_ms: Option<i64>,
    pub system_info: SystemInfo,
    pub granted_count: i64,
    pub denied_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// 设备注册结果：`inserted = false` 表示设备已存在，`record` 为既有记录。
#[derive(Debug, Clone)]
pub struct DeviceCreateResult {
    pub record: DeviceRecord,
    pub inserted: bool,
}

/// 通行审计记录（只追加）。
#[derive(Debug, Clone)]
pub struct AccessAttemptRecord {
    pub attempt_id: String,
    pub subject_id: String,
    pub method: AccessMethod,
    pub facility_id: String,
    pub device_id: Option<String>,
    pub decision: Decision,
    pub origin: AttemptOrigin,
    /// 应急放行等需要人工复核的记录。
    pub review_required: bool,
    pub ts_ms: i64,
}

impl AccessAttemptRecord {
    /// 放行已入账但闸机驱动失败时，追加的拒绝记录使用此 ID，
    /// 原放行记录因此失效（不能再补签到）。
    pub fn actuation_failure_id(attempt_id: &str) -> String {
        format!("{attempt_id}:actuation")
    }
}

/// 通行审计查询条件。
#[derive(Debug, Clone, Default)]
pub struct AccessAttemptQuery {
    pub facility_id: Option<String>,
    pub subject_id: Option<String>,
    pub device_id: Option<String>,
    pub granted: Option<bool>,
    pub review_only: bool,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AccessAttemptQuery {
    pub fn matches(&self, record: &AccessAttemptRecord) -> bool {
        if let Some(facility_id) = self.facility_id.as_deref() {
            if record.facility_id != facility_id {
                return false;
            }
        }
        if let Some(subject_id) = self.subject_id.as_deref() {
            if record.subject_id != subject_id {
                return false;
            }
        }
        if let Some(device_id) = self.device_id.as_deref() {
            if record.device_id.as_deref() != Some(device_id) {
                return false;
            }
        }
        if let Some(granted) = self.granted {
            if record.decision.is_granted() != granted {
                return false;
            }
        }
        if self.review_only && !record.review_required {
            return false;
        }
        if self.from_ms.is_some_and(|from| record.ts_ms < from) {
            return false;
        }
        if self.to_ms.is_some_and(|to| record.ts_ms > to) {
            return false;
        }
        true
    }
}

/// 签到记录。`attempt_id` 唯一，保证同一次放行只签到一次。
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub attendance_id: String,
    pub attempt_id: String,
    pub member_id: String,
    pub facility_id: String,
    pub ts_ms: i64,
}

/// 签到写入结果：重复写入时返回既有记录且 `inserted = false`。
#[derive(Debug, Clone)]
pub struct AttendanceWriteResult {
    pub record: AttendanceRecord,
    pub inserted: bool,
}

/// 运维审计记录（设备注册 / 停用 / 状态变更 / 限流重置）。
#[derive(Debug, Clone)]
pub struct AuditLogRecord {
    pub audit_id: String,
    pub facility_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub detail: Option<String>,
    pub ts_ms: i64,
}

/// 审计查询条件。`action_prefix` 按动作族过滤，如 `DEVICE.`。
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub facility_id: Option<String>,
    pub actor: Option<String>,
    pub action_prefix: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<i64>,
}

impl AuditLogQuery {
    pub const DEFAULT_LIMIT: i64 = 100;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn matches(&self, record: &AuditLogRecord) -> bool {
        self.facility_id
            .as_deref()
            .is_none_or(|id| record.facility_id.as_deref() == Some(id))
            && self.actor.as_deref().is_none_or(|actor| record.actor == actor)
            && self
                .action_prefix
                .as_deref()
                .is_none_or(|prefix| record.action.starts_with(prefix))
            && self.from_ms.is_none_or(|from| record.ts_ms >= from)
            && self.to_ms.is_none_or(|to| record.ts_ms <= to)
    }
}
