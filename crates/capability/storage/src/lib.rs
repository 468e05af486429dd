//! # Gate Storage 模块
//!
//! 通行子系统的存储抽象层。
//!
//! ## 分层
//!
//! 1. **接口抽象层** (`traits.rs`)：各资源的异步 Trait
//! 2. **数据模型层** (`models.rs`)
//! 3. **错误处理层** (`error.rs`)
//! 4. **验证辅助层** (`validation.rs`)：场馆作用域校验
//! 5. **连接管理层** (`connection.rs`)
//! 6. **实现层**：
//!    - `in_memory/`：`RwLock<HashMap>` / `Mutex` 实现，用于测试与未配置数据库时的演示
//!    - `postgres/`：sqlx 实现
//!    - `redis`：多实例共享的限流窗口
//!
//! ## 原子性约定
//!
//! - 限流：`RateLimitStore::check_and_record` 对单个键原子（内存锁 / Lua 脚本）
//! - 设备计数器：在存储内自增，服务层不做读-改-写
//! - 签到：按 `attempt_id` 唯一，重复写入返回既有记录
//! - 设备注册：不存在才插入，冲突时返回既有记录

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod redis;
pub mod traits;
pub mod validation;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use self::redis::RedisRateLimitStore;
pub use traits::*;
pub use validation::*;

pub use in_memory::{
    InMemoryAccessAttemptStore, InMemoryAttendanceStore, InMemoryAuditLogStore,
    InMemoryDeviceStore, InMemoryRateLimitStore, InMemorySubjectStore,
};

pub use postgres::{
    PgAccessAttemptStore, PgAttendanceStore, PgAuditLogStore, PgDeviceStore, PgSubjectStore,
};
