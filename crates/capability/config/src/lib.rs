//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未配置时使用内存存储。
    pub database_url: Option<String>,
    /// 未配置时限流窗口只在本进程内生效。
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_access_ttl_seconds: u64,
    pub jwt_refresh_ttl_seconds: u64,
    pub device_api_key: String,
    /// 未配置时应急通行一律以 ConfigurationError 拒绝。
    pub emergency_code: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub online_threshold_ms: u64,
    pub actuation_timeout_ms: u64,
    pub door_open_ms: u64,
    pub membership_cache_ttl_ms: u64,
    pub biometric_max_skew_ms: u64,
    pub facility_utc_offset_minutes: i32,
    pub rate_limit: RateLimitSettings,
}

/// 限流参数（各动作的上限共享窗口与封禁时长）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub block_ms: u64,
    pub verify_max: u32,
    pub emergency_max: u32,
    pub order_max: u32,
    pub payment_verify_max: u32,
    pub key_fetch_max: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            block_ms: 300_000,
            verify_max: 5,
            emergency_max: 3,
            order_max: 3,
            payment_verify_max: 5,
            key_fetch_max: 10,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试时传入固定表）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { lookup };
        let jwt_secret = reader.required("GATE_JWT_SECRET")?;
        let device_api_key = reader.required("GATE_DEVICE_API_KEY")?;
        let http_addr = reader
            .optional("GATE_HTTP_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let heartbeat_interval_ms = reader.u64_with_default("GATE_HEARTBEAT_INTERVAL_MS", 30_000)?;
        if heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "GATE_HEARTBEAT_INTERVAL_MS".to_string(),
                "0".to_string(),
            ));
        }
        let online_threshold_ms =
            reader.u64_with_default("GATE_ONLINE_THRESHOLD_MS", heartbeat_interval_ms * 3)?;

        let defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            window_ms: reader.u64_with_default("GATE_RATE_LIMIT_WINDOW_MS", defaults.window_ms)?,
            block_ms: reader.u64_with_default("GATE_RATE_LIMIT_BLOCK_MS", defaults.block_ms)?,
            verify_max: reader.u32_with_default("GATE_RATE_LIMIT_VERIFY_MAX", defaults.verify_max)?,
            emergency_max: reader
                .u32_with_default("GATE_RATE_LIMIT_EMERGENCY_MAX", defaults.emergency_max)?,
            order_max: reader.u32_with_default("GATE_RATE_LIMIT_ORDER_MAX", defaults.order_max)?,
            payment_verify_max: reader.u32_with_default(
                "GATE_RATE_LIMIT_PAYMENT_VERIFY_MAX",
                defaults.payment_verify_max,
            )?,
            key_fetch_max: reader
                .u32_with_default("GATE_RATE_LIMIT_KEY_FETCH_MAX", defaults.key_fetch_max)?,
        };

        Ok(Self {
            http_addr,
            database_url: reader.optional("GATE_DATABASE_URL"),
            redis_url: reader.optional("GATE_REDIS_URL"),
            jwt_secret,
            jwt_access_ttl_seconds: reader.u64_with_default("GATE_JWT_ACCESS_TTL_SECONDS", 3600)?,
            jwt_refresh_ttl_seconds: reader
                .u64_with_default("GATE_JWT_REFRESH_TTL_SECONDS", 604_800)?,
            device_api_key,
            emergency_code: reader.optional("GATE_EMERGENCY_CODE"),
            heartbeat_interval_ms,
            online_threshold_ms,
            actuation_timeout_ms: reader.u64_with_default("GATE_ACTUATION_TIMEOUT_MS", 5000)?,
            door_open_ms: reader.u64_with_default("GATE_DOOR_OPEN_MS", 5000)?,
            membership_cache_ttl_ms: reader
                .u64_with_default("GATE_MEMBERSHIP_CACHE_TTL_MS", 30_000)?,
            biometric_max_skew_ms: reader.u64_with_default("GATE_BIOMETRIC_MAX_SKEW_MS", 60_000)?,
            facility_utc_offset_minutes: reader
                .i32_with_default("GATE_FACILITY_UTC_OFFSET_MINUTES", 0)?,
            rate_limit,
        })
    }
}

struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        match (self.lookup)(key) {
            Some(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn u64_with_default(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.parsed_with_default(key, default)
    }

    fn u32_with_default(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        self.parsed_with_default(key, default)
    }

    fn i32_with_default(&self, key: &str, default: i32) -> Result<i32, ConfigError> {
        self.parsed_with_default(key, default)
    }

    fn parsed_with_default<T: std::str::FromStr>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        let value = match self.optional(key) {
            Some(value) => value,
            None => return Ok(default),
        };
        value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }
}
