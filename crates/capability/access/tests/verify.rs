use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    BiometricAssertion, CallerContext, Credential, DAY_MS, Decision, ReasonCode, Role,
    SystemInfo,
};
use gate_access::{
    AccessRequest, AccessVerifier, AccessVerifierConfig, ActuationError, GateActuator,
    NoopActuator, VerifierDeps,
};
use gate_attendance::AttendanceLedger;
use gate_auth::{hash_password, sign_assertion};
use gate_config::RateLimitSettings;
use gate_devices::{DeviceRegistry, DeviceRegistryConfig};
use gate_ratelimit::{RateLimitConfig, RateLimiter};
use gate_storage::{
    AccessAttemptQuery, AccessAttemptRecord, AccessAttemptStore, InMemoryAccessAttemptStore, InMemoryAttendanceStore,
    InMemoryAuditLogStore, InMemoryDeviceStore, InMemoryRateLimitStore, InMemorySubjectStore,
    StorageError, SubjectRecord, SubjectStore,
};

const NOW: i64 = 1_710_504_000_000;
const BIOMETRIC_SECRET: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f0";

struct SlowActuator;

#[async_trait]
impl GateActuator for SlowActuator {
    async fn open(&self, _device_id: &str, _hold_ms: u64) -> Result<(), ActuationError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

#[derive(Default)]
struct CountingActuator {
    opens: AtomicUsize,
}

#[async_trait]
impl GateActuator for CountingActuator {
    async fn open(&self, _device_id: &str, _hold_ms: u64) -> Result<(), ActuationError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 审计库不可写。
struct UnwritableAttemptStore;

#[async_trait]
impl AccessAttemptStore for UnwritableAttemptStore {
    async fn append_attempt(
        &self,
        _record: AccessAttemptRecord,
    ) -> Result<AccessAttemptRecord, StorageError> {
        Err(StorageError::new("attempt log unavailable"))
    }

    async fn find_attempt(
        &self,
        _attempt_id: &str,
    ) -> Result<Option<AccessAttemptRecord>, StorageError> {
        Ok(None)
    }

    async fn list_attempts(
        &self,
        _ctx: &CallerContext,
        _query: &AccessAttemptQuery,
    ) -> Result<Vec<AccessAttemptRecord>, StorageError> {
        Ok(Vec::new())
    }
}

struct Fixture {
    verifier: Arc<AccessVerifier>,
    devices: Arc<DeviceRegistry>,
    ledger: Arc<AttendanceLedger>,
    attempts: Arc<InMemoryAccessAttemptStore>,
}

fn subject(id: &str, facility: &str, role: Role, name: &str) -> SubjectRecord {
    SubjectRecord {
        subject_id: id.to_string(),
        facility_id: facility.to_string(),
        username: id.to_string(),
        display_name: name.to_string(),
        password_hash: String::new(),
        roles: vec![role.as_str().to_string()],
        pin_hash: None,
        biometric_credential_id: None,
        biometric_secret: None,
        membership_end_ms: None,
        membership_status: None,
    }
}

struct Options {
    emergency_code: Option<String>,
    actuator: Arc<dyn GateActuator>,
    attempt_log: Option<Arc<dyn AccessAttemptStore>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            emergency_code: Some("FIRE-2024".to_string()),
            actuator: Arc::new(NoopActuator),
            attempt_log: None,
        }
    }
}

async fn fixture(options: Options) -> Fixture {
    let subjects = Arc::new(InMemorySubjectStore::new());
    let mut seed = vec![
        subject("gym-1", "gym-1", Role::GymOwner, "Iron Den"),
        subject("gym-2", "gym-2", Role::GymOwner, "Pulse"),
        subject("admin", "", Role::Admin, "Administrator"),
    ];
    let mut member = subject("member-1", "gym-1", Role::Member, "Ana");
    member.membership_end_ms = Some(NOW + 5 * DAY_MS);
    seed.push(member);
    let mut expired = subject("member-2", "gym-1", Role::Member, "Ben");
    expired.membership_end_ms = Some(NOW - DAY_MS);
    seed.push(expired);
    let mut other_gym = subject("member-3", "gym-2", Role::Member, "Cy");
    other_gym.membership_end_ms = Some(NOW + 30 * DAY_MS);
    seed.push(other_gym);
    let mut trainer = subject("trainer-1", "gym-1", Role::Trainer, "Tess");
    trainer.pin_hash = Some(hash_password("4321").expect("hash"));
    trainer.biometric_credential_id = Some("cred-1".to_string());
    trainer.biometric_secret = Some(BIOMETRIC_SECRET.to_string());
    seed.push(trainer);
    for record in seed {
        subjects.upsert_subject(record).await.expect("seed");
    }

    let audit = Arc::new(InMemoryAuditLogStore::new());
    let attempts = Arc::new(InMemoryAccessAttemptStore::new());
    let devices = Arc::new(DeviceRegistry::new(
        Arc::new(InMemoryDeviceStore::new()),
        audit.clone(),
        DeviceRegistryConfig {
            heartbeat_interval_ms: 30_000,
            online_threshold_ms: 90_000,
        },
    ));
    let owner = CallerContext::new("gym-1", "gym-1", vec![Role::GymOwner]);
    for id in ["GATE-01", "GATE-02"] {
        devices
            .register(&owner, id, "gym-1", "Front door", NOW - DAY_MS)
            .await
            .expect("register");
    }
    devices
        .heartbeat("GATE-01", SystemInfo::default(), NOW - 1_000)
        .await
        .expect("heartbeat");
    // GATE-02 最后一次心跳早于在线阈值
    devices
        .heartbeat("GATE-02", SystemInfo::default(), NOW - 120_000)
        .await
        .expect("heartbeat");

    let rate_limiter = Arc::new(RateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new()),
        audit,
        RateLimitConfig::from_settings(RateLimitSettings {
            verify_max: 3,
            ..RateLimitSettings::default()
        }),
    ));
    let ledger = Arc::new(AttendanceLedger::new(
        Arc::new(InMemoryAttendanceStore::new()),
        attempts.clone(),
        subjects.clone(),
        0,
    ));
    let verifier = Arc::new(AccessVerifier::new(
        VerifierDeps {
            subject_store: subjects,
            attempt_store: options
                .attempt_log
                .unwrap_or_else(|| attempts.clone() as Arc<dyn AccessAttemptStore>),
            rate_limiter,
            devices: devices.clone(),
            ledger: ledger.clone(),
            actuator: options.actuator,
        },
        AccessVerifierConfig {
            emergency_code: options.emergency_code,
            actuation_timeout_ms: 50,
            door_open_ms: 5_000,
            biometric_max_skew_ms: 60_000,
        },
    ));
    Fixture {
        verifier,
        devices,
        ledger,
        attempts,
    }
}

fn gym_qr(facility: &str) -> String {
    serde_json::json!({
        "type": "gym_owner",
        "gymOwnerId": facility,
        "gymName": "Iron Den",
        "timestamp": "2001-01-01T00:00:00Z"
    })
    .to_string()
}

fn request(subject: &str, facility: &str, device: Option<&str>, credential: Credential) -> AccessRequest {
    AccessRequest {
        subject_id: subject.to_string(),
        facility_id: facility.to_string(),
        device_id: device.map(str::to_string),
        credential,
    }
}

fn admin_ctx() -> CallerContext {
    CallerContext::new("", "admin", vec![Role::Admin])
}

async fn attempt_count(fx: &Fixture) -> usize {
    fx.attempts_for(None).await.len()
}

impl Fixture {
    async fn attempts_for(&self, subject: Option<&str>) -> Vec<gate_storage::AccessAttemptRecord> {
        self.attempts
            .list_attempts(
                &admin_ctx(),
                &AccessAttemptQuery {
                    subject_id: subject.map(str::to_string),
                    limit: Some(1_000),
                    ..AccessAttemptQuery::default()
                },
            )
            .await
            .expect("attempts")
    }
}

#[tokio::test]
async fn member_qr_on_online_device_is_granted_and_recorded() {
    let fx = fixture(Options::default()).await;
    let outcome = fx
        .verifier
        .verify(
            request("member-1", "gym-1", Some("gate-01"), Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;

    assert_eq!(outcome.decision, Decision::Granted);
    assert!(outcome.attendance_recorded);
    assert_eq!(
        outcome.membership.and_then(|state| state.days_remaining),
        Some(5)
    );
    assert_eq!(outcome.facility.map(|gym| gym.name).as_deref(), Some("Iron Den"));

    let records = fx.ledger.list_for("member-1", None).await.expect("attendance");
    assert_eq!(records.len(), 1);
    let device = fx.devices.find("GATE-01").await.expect("find").expect("device");
    assert_eq!(device.granted_count, 1);
    assert_eq!(device.denied_count, 0);
}

#[tokio::test]
async fn member_using_staff_pin_is_denied_without_attendance() {
    let fx = fixture(Options::default()).await;
    let outcome = fx
        .verifier
        .verify(
            request("member-1", "gym-1", None, Credential::Pin("1234".to_string())),
            NOW,
        )
        .await;
    assert_eq!(
        outcome.decision,
        Decision::Denied(ReasonCode::InvalidCredential)
    );
    assert!(!outcome.attendance_recorded);
    assert!(fx.ledger.list_for("member-1", None).await.expect("list").is_empty());
    assert_eq!(attempt_count(&fx).await, 1);
}

#[tokio::test]
async fn rapid_attempts_beyond_budget_are_rate_limited() {
    let fx = fixture(Options::default()).await;
    let mut decisions = Vec::new();
    for i in 0..5 {
        let outcome = fx
            .verifier
            .verify(
                request("member-1", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
                NOW + i,
            )
            .await;
        decisions.push(outcome.decision);
    }
    assert!(decisions[..3].iter().all(Decision::is_granted));
    assert_eq!(decisions[3], Decision::Denied(ReasonCode::RateLimited));
    assert_eq!(decisions[4], Decision::Denied(ReasonCode::RateLimited));
    // 被限流的尝试同样写审计
    assert_eq!(attempt_count(&fx).await, 5);
}

#[tokio::test]
async fn rate_limited_outcome_carries_retry_after() {
    let fx = fixture(Options::default()).await;
    for i in 0..3 {
        fx.verifier
            .verify(
                request("member-1", "gym-1", None, Credential::Qr("garbage".to_string())),
                NOW + i,
            )
            .await;
    }
    let limited = fx
        .verifier
        .verify(
            request("member-1", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
            NOW + 10,
        )
        .await;
    assert_eq!(limited.decision, Decision::Denied(ReasonCode::RateLimited));
    assert_eq!(limited.retry_after_ms, Some(300_000));
}

#[tokio::test]
async fn offline_device_denies_even_valid_credentials() {
    let fx = fixture(Options::default()).await;
    let outcome = fx
        .verifier
        .verify(
            request("member-1", "gym-1", Some("GATE-02"), Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    assert_eq!(outcome.decision, Decision::Denied(ReasonCode::DeviceOffline));
    assert!(!outcome.attendance_recorded);
    let device = fx.devices.find("GATE-02").await.expect("find").expect("device");
    assert_eq!(device.denied_count, 1);

    let unknown = fx
        .verifier
        .verify(
            request("member-1", "gym-1", Some("GATE-99"), Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    assert_eq!(unknown.decision, Decision::Denied(ReasonCode::UnknownDevice));
}

#[tokio::test]
async fn membership_and_facility_are_enforced_for_qr() {
    let fx = fixture(Options::default()).await;
    let expired = fx
        .verifier
        .verify(
            request("member-2", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    assert_eq!(
        expired.decision,
        Decision::Denied(ReasonCode::MembershipExpired)
    );

    let foreign = fx
        .verifier
        .verify(
            request("member-3", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    assert_eq!(foreign.decision, Decision::Denied(ReasonCode::WrongFacility));

    let unknown_gym = fx
        .verifier
        .verify(
            request("member-1", "", None, Credential::Qr(gym_qr("gym-404"))),
            NOW,
        )
        .await;
    assert_eq!(
        unknown_gym.decision,
        Decision::Denied(ReasonCode::InvalidCredential)
    );
}

#[tokio::test]
async fn trainer_pin_checks_hash_and_facility() {
    let fx = fixture(Options::default()).await;
    let granted = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Pin("4321".to_string())),
            NOW,
        )
        .await;
    assert_eq!(granted.decision, Decision::Granted);
    assert!(!granted.attendance_recorded);

    let wrong = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Pin("4322".to_string())),
            NOW,
        )
        .await;
    assert_eq!(wrong.decision, Decision::Denied(ReasonCode::InvalidCredential));

    let elsewhere = fx
        .verifier
        .verify(
            request("trainer-1", "gym-2", None, Credential::Pin("4321".to_string())),
            NOW,
        )
        .await;
    assert_eq!(elsewhere.decision, Decision::Denied(ReasonCode::WrongFacility));
}

#[tokio::test]
async fn biometric_requires_assertion_and_valid_signature() {
    let fx = fixture(Options::default()).await;
    let unsupported = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Biometric(None)),
            NOW,
        )
        .await;
    assert_eq!(
        unsupported.decision,
        Decision::Denied(ReasonCode::UnsupportedDevice)
    );

    let signature = sign_assertion(BIOMETRIC_SECRET, "trainer-1", "cred-1", NOW - 500).expect("sign");
    let assertion = BiometricAssertion {
        credential_id: "cred-1".to_string(),
        signed_at_ms: NOW - 500,
        signature,
    };
    let granted = fx
        .verifier
        .verify(
            request(
                "trainer-1",
                "gym-1",
                None,
                Credential::Biometric(Some(assertion.clone())),
            ),
            NOW,
        )
        .await;
    assert_eq!(granted.decision, Decision::Granted);

    let tampered = BiometricAssertion {
        signature: "00".repeat(32),
        ..assertion
    };
    let denied = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Biometric(Some(tampered))),
            NOW,
        )
        .await;
    assert_eq!(denied.decision, Decision::Denied(ReasonCode::InvalidCredential));
}

#[tokio::test]
async fn emergency_grant_is_flagged_for_review() {
    let fx = fixture(Options::default()).await;
    let outcome = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Emergency("FIRE-2024".to_string())),
            NOW,
        )
        .await;
    assert_eq!(outcome.decision, Decision::Granted);
    assert!(outcome.review_required);

    let wrong = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Emergency("FIRE-2025".to_string())),
            NOW,
        )
        .await;
    assert_eq!(wrong.decision, Decision::Denied(ReasonCode::InvalidCredential));
    assert!(!wrong.review_required);

    let owner = CallerContext::new("gym-1", "gym-1", vec![Role::GymOwner]);
    let queue = fx.verifier.review_queue(&owner, None).await.expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].attempt_id, outcome.attempt_id);
}

#[tokio::test]
async fn emergency_without_configured_code_is_configuration_error() {
    let fx = fixture(Options {
        emergency_code: None,
        ..Options::default()
    })
    .await;
    let outcome = fx
        .verifier
        .verify(
            request("trainer-1", "gym-1", None, Credential::Emergency("FIRE-2024".to_string())),
            NOW,
        )
        .await;
    assert_eq!(
        outcome.decision,
        Decision::Denied(ReasonCode::ConfigurationError)
    );
}

#[tokio::test]
async fn admin_override_is_reserved_for_admins() {
    let fx = fixture(Options::default()).await;
    let member = fx
        .verifier
        .verify(request("member-1", "gym-1", None, Credential::AdminOverride), NOW)
        .await;
    assert_eq!(member.decision, Decision::Denied(ReasonCode::InvalidCredential));

    let admin = fx
        .verifier
        .verify(
            request("admin", "gym-1", Some("GATE-01"), Credential::AdminOverride),
            NOW,
        )
        .await;
    assert_eq!(admin.decision, Decision::Granted);
    assert!(!admin.attendance_recorded);
}

#[tokio::test]
async fn actuation_timeout_denies() {
    let fx = fixture(Options {
        actuator: Arc::new(SlowActuator),
        ..Options::default()
    })
    .await;
    let outcome = fx
        .verifier
        .verify(
            request("member-1", "gym-1", Some("GATE-01"), Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    assert_eq!(outcome.decision, Decision::Denied(ReasonCode::DeviceTimeout));
    assert!(!outcome.attendance_recorded);

    // 放行记录之后追加一条超时拒绝，原放行不能再补签到
    let recorded = fx.attempts_for(Some("member-1")).await;
    assert_eq!(recorded.len(), 2);
    let granted = recorded
        .iter()
        .find(|record| record.decision.is_granted())
        .expect("granted record");
    assert_eq!(
        outcome.attempt_id,
        AccessAttemptRecord::actuation_failure_id(&granted.attempt_id)
    );
    let ctx = CallerContext::new("gym-1", "member-1", vec![Role::Member]);
    assert!(fx.ledger.mark(&ctx, &granted.attempt_id).await.is_err());
    assert!(fx.ledger.list_for("member-1", None).await.expect("list").is_empty());

    let device = fx.devices.find("GATE-01").await.expect("find").expect("device");
    assert_eq!(device.granted_count, 0);
    assert_eq!(device.denied_count, 1);
}

#[tokio::test]
async fn unwritable_attempt_log_denies_without_opening_the_gate() {
    let actuator = Arc::new(CountingActuator::default());
    let fx = fixture(Options {
        actuator: actuator.clone(),
        attempt_log: Some(Arc::new(UnwritableAttemptStore)),
        ..Options::default()
    })
    .await;
    let outcome = fx
        .verifier
        .verify_device_scan("GATE-01", "gym-1:member-1", NOW)
        .await;

    assert_eq!(
        outcome.decision,
        Decision::Denied(ReasonCode::StorageUnavailable)
    );
    assert!(!outcome.attendance_recorded);
    assert_eq!(actuator.opens.load(Ordering::SeqCst), 0);
    assert!(fx.ledger.list_for("member-1", None).await.expect("list").is_empty());
    let device = fx.devices.find("GATE-01").await.expect("find").expect("device");
    assert_eq!(device.granted_count, 0);
    assert_eq!(device.denied_count, 1);
}

#[tokio::test]
async fn granted_device_scan_opens_the_gate_once() {
    let actuator = Arc::new(CountingActuator::default());
    let fx = fixture(Options {
        actuator: actuator.clone(),
        ..Options::default()
    })
    .await;
    let outcome = fx
        .verifier
        .verify_device_scan("GATE-01", "gym-1:member-1", NOW)
        .await;
    assert_eq!(outcome.decision, Decision::Granted);
    assert_eq!(actuator.opens.load(Ordering::SeqCst), 1);
    assert_eq!(fx.attempts_for(Some("member-1")).await.len(), 1);
}

#[tokio::test]
async fn rate_limited_device_scan_counts_as_device_denial() {
    let actuator = Arc::new(CountingActuator::default());
    let fx = fixture(Options {
        actuator: actuator.clone(),
        ..Options::default()
    })
    .await;
    let mut decisions = Vec::new();
    for i in 0..4 {
        let outcome = fx
            .verifier
            .verify_device_scan("GATE-01", "gym-1:member-1", NOW + i)
            .await;
        decisions.push(outcome.decision);
    }
    assert!(decisions[..3].iter().all(Decision::is_granted));
    assert_eq!(decisions[3], Decision::Denied(ReasonCode::RateLimited));
    assert_eq!(actuator.opens.load(Ordering::SeqCst), 3);

    let device = fx.devices.find("GATE-01").await.expect("find").expect("device");
    assert_eq!(device.granted_count, 3);
    assert_eq!(device.denied_count, 1);
}

#[tokio::test]
async fn device_scan_payload_identifies_member() {
    let fx = fixture(Options::default()).await;
    let granted = fx
        .verifier
        .verify_device_scan("gate-01", "gym-1:member-1", NOW)
        .await;
    assert_eq!(granted.decision, Decision::Granted);
    assert!(granted.attendance_recorded);

    let garbage = fx
        .verifier
        .verify_device_scan("GATE-01", "not-a-member-code", NOW)
        .await;
    assert_eq!(
        garbage.decision,
        Decision::Denied(ReasonCode::InvalidCredential)
    );
    let recorded = fx.attempts_for(Some("device:GATE-01")).await;
    assert_eq!(recorded.len(), 1);
}

#[tokio::test]
async fn marking_a_verified_grant_twice_keeps_one_record() {
    let fx = fixture(Options::default()).await;
    let outcome = fx
        .verifier
        .verify(
            request("member-1", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
            NOW,
        )
        .await;
    let ctx = CallerContext::new("gym-1", "member-1", vec![Role::Member]);
    let first = fx.ledger.mark(&ctx, &outcome.attempt_id).await.expect("mark");
    let second = fx.ledger.mark(&ctx, &outcome.attempt_id).await.expect("mark");
    assert!(!first.inserted);
    assert!(!second.inserted);
    assert_eq!(fx.ledger.list_for("member-1", None).await.expect("list").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_cannot_exceed_budget() {
    let fx = fixture(Options::default()).await;
    let mut handles = Vec::new();
    for _ in 0..10 {
        let verifier = fx.verifier.clone();
        handles.push(tokio::spawn(async move {
            verifier
                .verify(
                    request("member-1", "gym-1", None, Credential::Qr(gym_qr("gym-1"))),
                    NOW,
                )
                .await
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.expect("join").decision.is_granted() {
            granted += 1;
        }
    }
    assert_eq!(granted, 3);
    assert_eq!(attempt_count(&fx).await, 10);
}

#[tokio::test]
async fn client_reported_attempts_are_audited_only() {
    let fx = fixture(Options::default()).await;
    let ctx = CallerContext::new("gym-1", "member-1", vec![Role::Member]);
    let record = fx
        .verifier
        .log_client_attempt(&ctx, domain::AccessMethod::Qr, "gym-1", None, Decision::Granted, NOW)
        .await
        .expect("log");
    assert!(fx.ledger.mark(&ctx, &record.attempt_id).await.is_err());

    let foreign = fx
        .verifier
        .log_client_attempt(&ctx, domain::AccessMethod::Qr, "gym-2", None, Decision::Granted, NOW)
        .await;
    assert!(foreign.is_err());

    let own = fx
        .verifier
        .list_attempts(&ctx, AccessAttemptQuery::default())
        .await
        .expect("list");
    assert_eq!(own.len(), 1);
}
