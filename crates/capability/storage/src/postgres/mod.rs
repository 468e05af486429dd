//! # PostgreSQL 存储实现模块
//!
//! 所有查询使用参数绑定；时间列为 `timestamptz`，读写时与 epoch 毫秒互转
//! （`to_timestamp($n / 1000.0)` / `extract(epoch from ..) * 1000`）。
//!
//! ## 包含的实现
//!
//! - **SubjectStore** (`subject.rs`)
//! - **DeviceStore** (`device.rs`)：计数器在 SQL 内自增，心跳更新带 `status <> 'deactivated'` 条件
//! - **AccessAttemptStore** (`access_attempt.rs`)
//! - **AttendanceStore** (`attendance.rs`)：`attempt_id` 唯一约束 + `on conflict do nothing`
//! - **AuditLogStore** (`audit.rs`)
//!
//! 表结构见仓库根目录 `migrations/0001_init.sql`。

pub mod access_attempt;
pub mod attendance;
pub mod audit;
pub mod device;
pub mod subject;

pub use access_attempt::*;
pub use attendance::*;
pub use audit::*;
pub use device::*;
pub use subject::*;
