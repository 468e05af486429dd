//! 存储接口 Trait 定义
//!
//! - SubjectStore：主体（登录、凭证、会员日期）
//! - DeviceStore：门禁设备（注册、心跳、状态、计数器）
//! - AccessAttemptStore：通行审计（只追加）
//! - AttendanceStore：签到流水（按 attempt_id 幂等）
//! - AuditLogStore：运维审计
//! - RateLimitStore：限流窗口（原子检查并记录）
//!
//! 写路径由服务端在校验流程中调用，不带调用方上下文；
//! 运维读路径显式接收 `CallerContext` 并做场馆作用域校验。

use crate::error::StorageError;
use crate::models::{
    AccessAttemptQuery, AccessAttemptRecord, AttendanceRecord, AttendanceWriteResult,
    AuditLogQuery, AuditLogRecord, DeviceCreateResult, DeviceRecord, SubjectRecord,
};
use async_trait::async_trait;
use domain::{CallerContext, DeviceStatus, RateLimitDecision, RateLimitPolicy, SystemInfo};

/// 主体存储接口。
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn find_by_username(&self, username: &str)
    -> Result<Option<SubjectRecord>, StorageError>;

    async fn find_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StorageError>;

    /// 新增或整体覆盖主体（初始化数据、测试夹具）。
    async fn upsert_subject(&self, record: SubjectRecord) -> Result<SubjectRecord, StorageError>;

    async fn update_password_hash(
        &self,
        subject_id: &str,
        password_hash: &str,
    ) -> Result<bool, StorageError>;

    async fn get_refresh_jti(&self, subject_id: &str) -> Result<Option<String>, StorageError>;

    async fn set_refresh_jti(
        &self,
        subject_id: &str,
        refresh_jti: Option<&str>,
    ) -> Result<bool, StorageError>;
}

/// 门禁设备存储接口。
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError>;

    /// 不存在则插入；已存在时返回既有记录（`inserted = false`），不覆盖。
    async fn create_device(&self, record: DeviceRecord)
    -> Result<DeviceCreateResult, StorageError>;

    /// `owner_id = None` 表示全量（仅管理员）。
    async fn list_devices(
        &self,
        ctx: &CallerContext,
        owner_id: Option<&str>,
    ) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 写入心跳；设备不存在或已停用时返回 `None`。
    async fn record_heartbeat(
        &self,
        device_id: &str,
        ts_ms: i64,
        system_info: SystemInfo,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 原子自增放行 / 拒绝计数。
    async fn increment_access(&self, device_id: &str, granted: bool)
    -> Result<bool, StorageError>;
}

/// 通行审计存储接口。
#[async_trait]
pub trait AccessAttemptStore: Send + Sync {
    async fn append_attempt(
        &self,
        record: AccessAttemptRecord,
    ) -> Result<AccessAttemptRecord, StorageError>;

    async fn find_attempt(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AccessAttemptRecord>, StorageError>;

    /// 按时间倒序返回。
    async fn list_attempts(
        &self,
        ctx: &CallerContext,
        query: &AccessAttemptQuery,
    ) -> Result<Vec<AccessAttemptRecord>, StorageError>;
}

/// 签到存储接口。
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn append_attendance(
        &self,
        record: AttendanceRecord,
    ) -> Result<AttendanceWriteResult, StorageError>;

    /// 按时间倒序返回会员的签到记录。
    async fn list_attendance(
        &self,
        member_id: &str,
        from_ms: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, StorageError>;
}

/// 运维审计存储接口。
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn create_audit_log(&self, record: AuditLogRecord)
    -> Result<AuditLogRecord, StorageError>;

    /// 按时间倒序返回；未指定场馆的查询仅限管理员。
    async fn list_audit_logs(
        &self,
        ctx: &CallerContext,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogRecord>, StorageError>;
}

/// 限流窗口存储接口。
///
/// 实现必须保证 `check_and_record` 对同一个键是原子的：
/// 并发请求不能同时通过本应拦截后一个的检查。
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_record(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError>;

    async fn peek(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError>;

    /// 清空日志与封禁。返回键是否存在。
    async fn reset(&self, key: &str) -> Result<bool, StorageError>;
}
