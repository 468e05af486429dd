//! 受限流保护的动作与各自的策略。

use domain::{AccessMethod, RateLimitPolicy};
use gate_config::RateLimitSettings;

/// 设备心跳的窗口上限（按设备计）。
const HEARTBEAT_MAX: u32 = 30;
/// 管理员重置操作的窗口上限（按操作者计）。
const RESET_MAX: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    QrVerify,
    PinVerify,
    BiometricVerify,
    EmergencyVerify,
    AdminOverride,
    Heartbeat,
    OrderCreate,
    PaymentVerify,
    KeyFetch,
    Reset,
}

/// 存储不可用时的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// 拒绝（凡是可能导致放行的动作）。
    Closed,
    /// 放行（仅非安全类遥测）。
    Open,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::QrVerify => "verify-qr",
            RateLimitAction::PinVerify => "verify-pin",
            RateLimitAction::BiometricVerify => "verify-biometric",
            RateLimitAction::EmergencyVerify => "verify-emergency",
            RateLimitAction::AdminOverride => "admin-override",
            RateLimitAction::Heartbeat => "heartbeat",
            RateLimitAction::OrderCreate => "order",
            RateLimitAction::PaymentVerify => "payment-verify",
            RateLimitAction::KeyFetch => "key-fetch",
            RateLimitAction::Reset => "rate-limit-reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "verify-qr" | "qr" => Some(RateLimitAction::QrVerify),
            "verify-pin" | "pin" => Some(RateLimitAction::PinVerify),
            "verify-biometric" | "biometric" => Some(RateLimitAction::BiometricVerify),
            "verify-emergency" | "emergency" => Some(RateLimitAction::EmergencyVerify),
            "admin-override" => Some(RateLimitAction::AdminOverride),
            "heartbeat" => Some(RateLimitAction::Heartbeat),
            "order" | "createOrder" => Some(RateLimitAction::OrderCreate),
            "payment-verify" | "verifyPayment" => Some(RateLimitAction::PaymentVerify),
            "key-fetch" | "getKey" => Some(RateLimitAction::KeyFetch),
            "rate-limit-reset" => Some(RateLimitAction::Reset),
            _ => None,
        }
    }

    pub fn for_method(method: AccessMethod) -> Self {
        match method {
            AccessMethod::Qr => RateLimitAction::QrVerify,
            AccessMethod::Pin => RateLimitAction::PinVerify,
            AccessMethod::Biometric => RateLimitAction::BiometricVerify,
            AccessMethod::Emergency => RateLimitAction::EmergencyVerify,
            AccessMethod::AdminOverride => RateLimitAction::AdminOverride,
        }
    }

    pub fn fail_mode(&self) -> FailMode {
        match self {
            RateLimitAction::Heartbeat => FailMode::Open,
            _ => FailMode::Closed,
        }
    }

    /// 对外开放给客户端直接检查的支付类动作。
    pub fn is_client_checkable(&self) -> bool {
        matches!(
            self,
            RateLimitAction::OrderCreate | RateLimitAction::PaymentVerify | RateLimitAction::KeyFetch
        )
    }

    /// 存储键：`{action}:{subject}`。
    pub fn key_for(&self, subject: &str) -> String {
        format!("{}:{}", self.as_str(), subject)
    }
}

/// 各动作的策略表。
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    settings: RateLimitSettings,
}

impl RateLimitConfig {
    pub fn from_settings(settings: RateLimitSettings) -> Self {
        Self { settings }
    }

    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        let settings = &self.settings;
        let max_attempts = match action {
            RateLimitAction::QrVerify
            | RateLimitAction::PinVerify
            | RateLimitAction::BiometricVerify
            | RateLimitAction::AdminOverride => settings.verify_max,
            RateLimitAction::EmergencyVerify => settings.emergency_max,
            RateLimitAction::Heartbeat => HEARTBEAT_MAX,
            RateLimitAction::OrderCreate => settings.order_max,
            RateLimitAction::PaymentVerify => settings.payment_verify_max,
            RateLimitAction::KeyFetch => settings.key_fetch_max,
            RateLimitAction::Reset => RESET_MAX,
        };
        RateLimitPolicy::new(
            max_attempts,
            settings.window_ms as i64,
            settings.block_ms as i64,
        )
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_settings(RateLimitSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_wire_names() {
        for action in [
            RateLimitAction::QrVerify,
            RateLimitAction::EmergencyVerify,
            RateLimitAction::OrderCreate,
            RateLimitAction::KeyFetch,
        ] {
            assert_eq!(RateLimitAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(RateLimitAction::parse("verifyPayment"), Some(RateLimitAction::PaymentVerify));
    }

    #[test]
    fn only_heartbeat_fails_open() {
        assert_eq!(RateLimitAction::Heartbeat.fail_mode(), FailMode::Open);
        assert_eq!(RateLimitAction::QrVerify.fail_mode(), FailMode::Closed);
        assert_eq!(RateLimitAction::PaymentVerify.fail_mode(), FailMode::Closed);
    }

    #[test]
    fn policies_follow_settings() {
        let config = RateLimitConfig::default();
        assert_eq!(config.policy(RateLimitAction::EmergencyVerify).max_attempts, 3);
        assert_eq!(config.policy(RateLimitAction::PinVerify).max_attempts, 5);
        assert_eq!(config.policy(RateLimitAction::KeyFetch).max_attempts, 10);
        assert_eq!(config.policy(RateLimitAction::OrderCreate).window_ms, 60_000);
    }
}
