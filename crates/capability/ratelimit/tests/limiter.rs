use std::sync::Arc;

use async_trait::async_trait;
use domain::{CallerContext, RateLimitDecision, RateLimitPolicy, Role};
use gate_ratelimit::{RateLimitAction, RateLimitConfig, RateLimitError, RateLimiter};
use gate_storage::{
    AuditLogQuery, AuditLogRecord, AuditLogStore, InMemoryAuditLogStore, InMemoryRateLimitStore, RateLimitStore,
    StorageError,
};

struct FailingStore;

#[async_trait]
impl RateLimitStore for FailingStore {
    async fn check_and_record(
        &self,
        _key: &str,
        _policy: &RateLimitPolicy,
        _now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        Err(StorageError::new("connection refused"))
    }

    async fn peek(
        &self,
        _key: &str,
        _policy: &RateLimitPolicy,
        _now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        Err(StorageError::new("connection refused"))
    }

    async fn reset(&self, _key: &str) -> Result<bool, StorageError> {
        Err(StorageError::new("connection refused"))
    }
}

struct UnwritableAuditStore;

#[async_trait]
impl AuditLogStore for UnwritableAuditStore {
    async fn create_audit_log(
        &self,
        _record: AuditLogRecord,
    ) -> Result<AuditLogRecord, StorageError> {
        Err(StorageError::new("audit table locked"))
    }

    async fn list_audit_logs(
        &self,
        _ctx: &CallerContext,
        _query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogRecord>, StorageError> {
        Ok(Vec::new())
    }
}

fn limiter() -> (RateLimiter, Arc<InMemoryAuditLogStore>) {
    let audit = Arc::new(InMemoryAuditLogStore::new());
    let limiter = RateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new()),
        audit.clone(),
        RateLimitConfig::default(),
    );
    (limiter, audit)
}

fn admin() -> CallerContext {
    CallerContext::new("", "admin", vec![Role::Admin])
}

#[tokio::test]
async fn emergency_blocks_after_three_attempts() {
    let (limiter, _) = limiter();
    for _ in 0..3 {
        let decision = limiter
            .check_and_record("trainer-1", RateLimitAction::EmergencyVerify, 1_000)
            .await;
        assert!(decision.allowed);
    }
    let fourth = limiter
        .check_and_record("trainer-1", RateLimitAction::EmergencyVerify, 1_500)
        .await;
    assert!(!fourth.allowed);
    assert_eq!(fourth.blocked_until_ms, Some(1_500 + 300_000));

    // 其他动作不受影响
    let pin = limiter
        .check_and_record("trainer-1", RateLimitAction::PinVerify, 1_500)
        .await;
    assert!(pin.allowed);
}

#[tokio::test]
async fn store_outage_fails_closed_for_verification() {
    let limiter = RateLimiter::new(
        Arc::new(FailingStore),
        Arc::new(InMemoryAuditLogStore::new()),
        RateLimitConfig::default(),
    );
    let decision = limiter
        .check_and_record("member-1", RateLimitAction::QrVerify, 0)
        .await;
    assert!(!decision.allowed);
    assert!(decision.degraded);

    let heartbeat = limiter
        .check_and_record("GATE-1", RateLimitAction::Heartbeat, 0)
        .await;
    assert!(heartbeat.allowed);
    assert!(heartbeat.degraded);
}

#[tokio::test]
async fn reset_requires_admin_and_is_audited() {
    let (limiter, audit) = limiter();
    for _ in 0..4 {
        limiter
            .check_and_record("member-1", RateLimitAction::OrderCreate, 0)
            .await;
    }
    let blocked = limiter
        .status("member-1", RateLimitAction::OrderCreate, 10)
        .await
        .expect("status");
    assert!(!blocked.allowed);

    let member = CallerContext::new("gym-1", "member-1", vec![Role::Member]);
    let denied = limiter
        .reset(&member, "member-1", RateLimitAction::OrderCreate, 20)
        .await;
    assert!(matches!(denied, Err(RateLimitError::Forbidden)));

    let cleared = limiter
        .reset(&admin(), "member-1", RateLimitAction::OrderCreate, 20)
        .await
        .expect("reset");
    assert!(cleared);
    let after = limiter
        .status("member-1", RateLimitAction::OrderCreate, 30)
        .await
        .expect("status");
    assert!(after.allowed);
    assert_eq!(after.remaining_attempts, 3);

    let logs = audit
        .list_audit_logs(&admin(), &AuditLogQuery::default())
        .await
        .expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "RATE_LIMIT.RESET");
}

#[tokio::test]
async fn reset_itself_is_rate_limited() {
    let (limiter, _) = limiter();
    for _ in 0..10 {
        limiter
            .reset(&admin(), "member-1", RateLimitAction::KeyFetch, 0)
            .await
            .expect("reset");
    }
    let result = limiter
        .reset(&admin(), "member-1", RateLimitAction::KeyFetch, 1)
        .await;
    assert!(matches!(result, Err(RateLimitError::RateLimited { .. })));
}

#[tokio::test]
async fn reset_with_unwritable_audit_still_clears_and_counts_failure() {
    let limiter = RateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new()),
        Arc::new(UnwritableAuditStore),
        RateLimitConfig::default(),
    );
    for _ in 0..4 {
        limiter
            .check_and_record("member-1", RateLimitAction::OrderCreate, 0)
            .await;
    }
    let before = gate_telemetry::metrics().snapshot().storage_failures;

    let cleared = limiter
        .reset(&admin(), "member-1", RateLimitAction::OrderCreate, 20)
        .await
        .expect("reset");
    assert!(cleared);
    assert!(gate_telemetry::metrics().snapshot().storage_failures > before);
    let after = limiter
        .status("member-1", RateLimitAction::OrderCreate, 30)
        .await
        .expect("status");
    assert!(after.allowed);
}
