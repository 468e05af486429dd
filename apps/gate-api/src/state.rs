//! 应用状态装配。
//!
//! 配置了 `GATE_DATABASE_URL` 时使用 Postgres，否则全部落在内存；
//! 限流窗口在配置了 `GATE_REDIS_URL` 时放在 Redis，多实例共享。

use gate_access::{AccessVerifier, AccessVerifierConfig, NoopActuator, VerifierDeps};
use gate_attendance::AttendanceLedger;
use gate_auth::{AuthService, JwtManager};
use gate_config::AppConfig;
use gate_devices::{DeviceRegistry, DeviceRegistryConfig};
use gate_membership::MembershipService;
use gate_ratelimit::{RateLimitConfig, RateLimiter};
use gate_storage::{
    AccessAttemptStore, AttendanceStore, AuditLogStore, DeviceStore, InMemoryAccessAttemptStore,
    InMemoryAttendanceStore, InMemoryAuditLogStore, InMemoryDeviceStore, InMemoryRateLimitStore,
    InMemorySubjectStore, PgAccessAttemptStore, PgAttendanceStore, PgAuditLogStore,
    PgDeviceStore, PgSubjectStore, RateLimitStore, RedisRateLimitStore, StorageError,
    SubjectStore, connect_pool,
};
use sqlx::PgPool;
use std::sync::Arc;

/// 各存储的具体实现。
pub struct Stores {
    pub subjects: Arc<dyn SubjectStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub attempts: Arc<dyn AccessAttemptStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub audit: Arc<dyn AuditLogStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub db_pool: Option<PgPool>,
}

impl Stores {
    /// 全内存存储，内置 admin 账户。
    pub fn in_memory() -> Self {
        Self {
            subjects: Arc::new(InMemorySubjectStore::with_default_admin()),
            devices: Arc::new(InMemoryDeviceStore::new()),
            attempts: Arc::new(InMemoryAccessAttemptStore::new()),
            attendance: Arc::new(InMemoryAttendanceStore::new()),
            audit: Arc::new(InMemoryAuditLogStore::new()),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
            db_pool: None,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let mut stores = match config.database_url.as_deref() {
            Some(database_url) => {
                let pool = connect_pool(database_url).await?;
                Self {
                    subjects: Arc::new(PgSubjectStore::new(pool.clone())),
                    devices: Arc::new(PgDeviceStore::new(pool.clone())),
                    attempts: Arc::new(PgAccessAttemptStore::new(pool.clone())),
                    attendance: Arc::new(PgAttendanceStore::new(pool.clone())),
                    audit: Arc::new(PgAuditLogStore::new(pool.clone())),
                    rate_limits: Arc::new(InMemoryRateLimitStore::new()),
                    db_pool: Some(pool),
                }
            }
            None => Self::in_memory(),
        };
        if let Some(redis_url) = config.redis_url.as_deref() {
            stores.rate_limits = Arc::new(RedisRateLimitStore::connect(redis_url)?);
        }
        Ok(stores)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub devices: Arc<DeviceRegistry>,
    pub verifier: Arc<AccessVerifier>,
    pub ledger: Arc<AttendanceLedger>,
    pub membership: Arc<MembershipService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit_log_store: Arc<dyn AuditLogStore>,
    pub device_api_key: Arc<str>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: &AppConfig, stores: Stores) -> Self {
        let jwt = JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_access_ttl_seconds,
            config.jwt_refresh_ttl_seconds,
        );
        let auth = Arc::new(AuthService::new(stores.subjects.clone(), jwt));
        let devices = Arc::new(DeviceRegistry::new(
            stores.devices.clone(),
            stores.audit.clone(),
            DeviceRegistryConfig {
                heartbeat_interval_ms: config.heartbeat_interval_ms as i64,
                online_threshold_ms: config.online_threshold_ms as i64,
            },
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            stores.rate_limits.clone(),
            stores.audit.clone(),
            RateLimitConfig::from_settings(config.rate_limit),
        ));
        let ledger = Arc::new(AttendanceLedger::new(
            stores.attendance.clone(),
            stores.attempts.clone(),
            stores.subjects.clone(),
            config.facility_utc_offset_minutes,
        ));
        let membership = Arc::new(MembershipService::new(
            stores.subjects.clone(),
            config.membership_cache_ttl_ms as i64,
        ));
        let verifier = Arc::new(AccessVerifier::new(
            VerifierDeps {
                subject_store: stores.subjects,
                attempt_store: stores.attempts,
                rate_limiter: rate_limiter.clone(),
                devices: devices.clone(),
                ledger: ledger.clone(),
                actuator: Arc::new(NoopActuator),
            },
            AccessVerifierConfig {
                emergency_code: config.emergency_code.clone(),
                actuation_timeout_ms: config.actuation_timeout_ms,
                door_open_ms: config.door_open_ms,
                biometric_max_skew_ms: config.biometric_max_skew_ms as i64,
            },
        ));
        Self {
            auth,
            devices,
            verifier,
            ledger,
            membership,
            rate_limiter,
            audit_log_store: stores.audit,
            device_api_key: Arc::from(config.device_api_key.as_str()),
            db_pool: stores.db_pool,
        }
    }
}
