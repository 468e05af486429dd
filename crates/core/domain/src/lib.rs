//! 通行校验子系统共享的领域模型。
//!
//! 本 crate 不依赖任何运行时或存储实现，只承载纯数据结构与纯函数：
//! 调用方上下文、凭证变体、拒绝原因、设备在线判定与限流窗口算法。

pub mod access;
pub mod device;
pub mod ratelimit;
pub mod time;

pub use access::{
    AccessMethod, AttemptOrigin, BiometricAssertion, Credential, Decision, ReasonCode, Severity,
};
pub use device::{DeviceStatus, SystemInfo, is_online};
pub use ratelimit::{RateLimitDecision, RateLimitPolicy, RateLimitWindow};
pub use time::{DAY_MS, now_epoch_ms};

/// 主体角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Member,
    Trainer,
    GymOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Trainer => "trainer",
            Role::GymOwner => "gym-owner",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "member" => Some(Role::Member),
            "trainer" => Some(Role::Trainer),
            "gym-owner" | "gym_owner" | "gymOwner" => Some(Role::GymOwner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// 员工角色（可使用 PIN / 生物识别入口）。
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Trainer | Role::GymOwner)
    }
}

/// 调用方上下文：已认证的主体及其所属场馆。
///
/// 场馆归属规则：场馆主的场馆即其自身 ID；教练归属其所属场馆；会员归属创建其档案的场馆。
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub facility_id: String,
    pub subject_id: String,
    pub roles: Vec<Role>,
}

impl CallerContext {
    pub fn new(
        facility_id: impl Into<String>,
        subject_id: impl Into<String>,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            facility_id: facility_id.into(),
            subject_id: subject_id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.roles.iter().any(Role::is_staff)
    }

    /// 管理员可跨场馆；其余角色只能访问自身场馆。
    pub fn can_access_facility(&self, facility_id: &str) -> bool {
        self.is_admin() || self.facility_id == facility_id
    }
}

impl Default for CallerContext {
    /// 空上下文（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            facility_id: String::new(),
            subject_id: String::new(),
            roles: Vec::new(),
        }
    }
}
