//! 通行凭证、校验结论与拒绝原因。

/// 通行方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMethod {
    Qr,
    Pin,
    Biometric,
    Emergency,
    AdminOverride,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Qr => "qr",
            AccessMethod::Pin => "pin",
            AccessMethod::Biometric => "biometric",
            AccessMethod::Emergency => "emergency",
            AccessMethod::AdminOverride => "admin-override",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "qr" => Some(AccessMethod::Qr),
            "pin" => Some(AccessMethod::Pin),
            "biometric" => Some(AccessMethod::Biometric),
            "emergency" => Some(AccessMethod::Emergency),
            "admin-override" | "admin_override" => Some(AccessMethod::AdminOverride),
            _ => None,
        }
    }
}

/// 平台签发的生物识别断言。
///
/// `signature` 为十六进制 HMAC-SHA256，签名内容为 `subject|credential_id|signed_at_ms`，
/// 密钥为注册时下发给设备的凭证密钥。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiometricAssertion {
    pub credential_id: String,
    pub signed_at_ms: i64,
    pub signature: String,
}

/// 通行凭证（单一入口分派）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// 扫描得到的二维码原文（JSON）。
    Qr(String),
    Pin(String),
    /// `None` 表示终端无法产出断言。
    Biometric(Option<BiometricAssertion>),
    Emergency(String),
    AdminOverride,
}

impl Credential {
    pub fn method(&self) -> AccessMethod {
        match self {
            Credential::Qr(_) => AccessMethod::Qr,
            Credential::Pin(_) => AccessMethod::Pin,
            Credential::Biometric(_) => AccessMethod::Biometric,
            Credential::Emergency(_) => AccessMethod::Emergency,
            Credential::AdminOverride => AccessMethod::AdminOverride,
        }
    }
}

/// 日志级别映射。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 预期的业务拒绝。
    Normal,
    /// 限流、设备异常。
    Elevated,
    /// 配置、存储故障。
    Critical,
}

/// 拒绝原因（错误分类）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    InvalidCredential,
    MembershipExpired,
    WrongFacility,
    RateLimited,
    DeviceOffline,
    DeviceTimeout,
    UnknownDevice,
    Deactivated,
    DuplicateDevice,
    UnsupportedDevice,
    ConfigurationError,
    StorageUnavailable,
}

impl ReasonCode {
    /// 稳定的对外错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ReasonCode::InvalidCredential => "ACCESS.INVALID_CREDENTIAL",
            ReasonCode::MembershipExpired => "ACCESS.MEMBERSHIP_EXPIRED",
            ReasonCode::WrongFacility => "ACCESS.WRONG_FACILITY",
            ReasonCode::RateLimited => "ACCESS.RATE_LIMITED",
            ReasonCode::DeviceOffline => "DEVICE.OFFLINE",
            ReasonCode::DeviceTimeout => "DEVICE.TIMEOUT",
            ReasonCode::UnknownDevice => "DEVICE.UNKNOWN",
            ReasonCode::Deactivated => "DEVICE.DEACTIVATED",
            ReasonCode::DuplicateDevice => "DEVICE.DUPLICATE",
            ReasonCode::UnsupportedDevice => "DEVICE.UNSUPPORTED",
            ReasonCode::ConfigurationError => "INTERNAL.CONFIGURATION",
            ReasonCode::StorageUnavailable => "INTERNAL.STORAGE",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        const ALL: [ReasonCode; 12] = [
            ReasonCode::InvalidCredential,
            ReasonCode::MembershipExpired,
            ReasonCode::WrongFacility,
            ReasonCode::RateLimited,
            ReasonCode::DeviceOffline,
            ReasonCode::DeviceTimeout,
            ReasonCode::UnknownDevice,
            ReasonCode::Deactivated,
            ReasonCode::DuplicateDevice,
            ReasonCode::UnsupportedDevice,
            ReasonCode::ConfigurationError,
            ReasonCode::StorageUnavailable,
        ];
        ALL.into_iter().find(|reason| reason.code() == code)
    }

    /// 可展示给终端用户的提示（不含内部细节）。
    pub fn user_message(&self) -> &'static str {
        match self {
            ReasonCode::InvalidCredential => "credential not recognised",
            ReasonCode::MembershipExpired => "membership is not active",
            ReasonCode::WrongFacility => "not a member of this facility",
            ReasonCode::RateLimited => "too many attempts",
            ReasonCode::DeviceOffline => "entry device is offline",
            ReasonCode::DeviceTimeout => "entry device did not respond",
            ReasonCode::UnknownDevice => "device not registered",
            ReasonCode::Deactivated => "device is deactivated",
            ReasonCode::DuplicateDevice => "device already registered",
            ReasonCode::UnsupportedDevice => "this device cannot perform the requested verification",
            ReasonCode::ConfigurationError | ReasonCode::StorageUnavailable => {
                "access temporarily unavailable"
            }
        }
    }

    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ReasonCode::RateLimited => Some("retry after the block expires"),
            ReasonCode::DeviceOffline | ReasonCode::DeviceTimeout => {
                Some("contact the facility operator")
            }
            ReasonCode::MembershipExpired => Some("renew the membership"),
            _ => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ReasonCode::RateLimited
            | ReasonCode::DeviceOffline
            | ReasonCode::DeviceTimeout
            | ReasonCode::UnknownDevice
            | ReasonCode::Deactivated => Severity::Elevated,
            ReasonCode::ConfigurationError | ReasonCode::StorageUnavailable => Severity::Critical,
            _ => Severity::Normal,
        }
    }
}

/// 校验结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied(ReasonCode),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Decision::Granted => None,
            Decision::Denied(reason) => Some(*reason),
        }
    }

    pub fn result_str(&self) -> &'static str {
        match self {
            Decision::Granted => "granted",
            Decision::Denied(_) => "denied",
        }
    }
}

/// 审计记录的来源：服务端判定，或客户端自报（仅审计，不产生签到）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOrigin {
    Server,
    Client,
}

impl AttemptOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOrigin::Server => "server",
            AttemptOrigin::Client => "client",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "server" => Some(AttemptOrigin::Server),
            "client" => Some(AttemptOrigin::Client),
            _ => None,
        }
    }
}
