//! 内存存储实现模块
//!
//! 用于测试与未配置数据库时的本地演示。
//!
//! - SubjectStore: InMemorySubjectStore
//! - DeviceStore: InMemoryDeviceStore
//! - AccessAttemptStore: InMemoryAccessAttemptStore
//! - AttendanceStore: InMemoryAttendanceStore
//! - AuditLogStore: InMemoryAuditLogStore
//! - RateLimitStore: InMemoryRateLimitStore

pub mod access_attempt;
pub mod attendance;
pub mod audit;
pub mod device;
pub mod rate_limit;
pub mod subject;

pub use access_attempt::*;
pub use attendance::*;
pub use audit::*;
pub use device::*;
pub use rate_limit::*;
pub use subject::*;
