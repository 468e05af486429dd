//! 通行校验编排。
//!
//! 所有方式（二维码 / PIN / 生物识别 / 应急码 / 管理员越权）都经 `AccessVerifier::verify`：
//!
//! 1. 限流：`(主体, 方式)` 维度，存储故障时拒绝
//! 2. 主体与凭证校验（按方式分派）
//! 3. 设备在线与归属（带设备时）
//! 4. 写通行审计；审计写入失败的放行改判为拒绝，闸机不动作
//! 5. 驱动闸机（超时即拒绝，并追加一条拒绝记录）
//! 6. 设备计数器、会员签到
//!
//! 同一主体的校验由 `SubjectLocks` 串行化。

mod actuator;
mod locks;
mod qr;

use domain::{
    AccessMethod, AttemptOrigin, BiometricAssertion, CallerContext, Credential, Decision,
    ReasonCode, Role, Severity,
};
use gate_attendance::AttendanceLedger;
use gate_auth::{
    AssertionCheck, EnrolledCredential, emergency_code_matches, verify_assertion, verify_pin,
};
use gate_devices::{DeviceRegistry, normalize_device_id};
use gate_membership::{MembershipState, resolve};
use gate_ratelimit::{RateLimitAction, RateLimiter};
use gate_storage::{
    AccessAttemptQuery, AccessAttemptRecord, AccessAttemptStore, DeviceRecord, SubjectRecord,
    SubjectStore,
};
use gate_telemetry::{
    record_access_denied, record_access_granted, record_emergency_grant, record_storage_failure,
    record_verify_latency_ms,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub use actuator::{ActuationError, GateActuator, NoopActuator};
pub use locks::SubjectLocks;
pub use qr::{ScanError, ScannedCode, parse_member_code, parse_scanned_code};

/// 运维查询类接口的错误。校验本身不返回错误，只返回判定。
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
}

fn storage_err(err: gate_storage::StorageError) -> AccessError {
    AccessError::Storage(err.to_string())
}

/// 一次校验请求。`subject_id` 为已认证主体（或设备转发的会员码中的会员）。
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub subject_id: String,
    pub facility_id: String,
    pub device_id: Option<String>,
    pub credential: Credential,
}

#[derive(Debug, Clone)]
pub struct AccessVerifierConfig {
    /// 未配置时应急通行一律拒绝。
    pub emergency_code: Option<String>,
    pub actuation_timeout_ms: u64,
    pub door_open_ms: u64,
    pub biometric_max_skew_ms: i64,
}

impl Default for AccessVerifierConfig {
    fn default() -> Self {
        Self {
            emergency_code: None,
            actuation_timeout_ms: 5_000,
            door_open_ms: 5_000,
            biometric_max_skew_ms: 60_000,
        }
    }
}

/// 校验器依赖的能力。
pub struct VerifierDeps {
    pub subject_store: Arc<dyn SubjectStore>,
    pub attempt_store: Arc<dyn AccessAttemptStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub devices: Arc<DeviceRegistry>,
    pub ledger: Arc<AttendanceLedger>,
    pub actuator: Arc<dyn GateActuator>,
}

#[derive(Debug, Clone)]
pub struct SubjectSummary {
    pub subject_id: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone)]
pub struct FacilitySummary {
    pub facility_id: String,
    pub name: String,
}

/// 校验结果。
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub attempt_id: String,
    pub method: AccessMethod,
    pub decision: Decision,
    /// 应急放行需要人工复核。
    pub review_required: bool,
    pub subject: Option<SubjectSummary>,
    pub facility: Option<FacilitySummary>,
    pub membership: Option<MembershipState>,
    pub retry_after_ms: Option<i64>,
    pub attendance_recorded: bool,
    pub door_open_ms: u64,
}

#[derive(Default)]
struct Evaluation {
    facility_id: String,
    subject: Option<SubjectRecord>,
    facility: Option<FacilitySummary>,
    membership: Option<MembershipState>,
    device: Option<DeviceRecord>,
    retry_after_ms: Option<i64>,
}

pub struct AccessVerifier {
    deps: VerifierDeps,
    config: AccessVerifierConfig,
    locks: SubjectLocks,
}

impl AccessVerifier {
    pub fn new(deps: VerifierDeps, config: AccessVerifierConfig) -> Self {
        Self {
            deps,
            config,
            locks: SubjectLocks::new(),
        }
    }

    pub fn config(&self) -> &AccessVerifierConfig {
        &self.config
    }

    /// 唯一的校验入口。每次调用都会写一条通行审计。
    pub async fn verify(&self, request: AccessRequest, now_ms: i64) -> VerifyOutcome {
        let started_at = Instant::now();
        let mut request = request;
        request.device_id = request
            .device_id
            .as_deref()
            .and_then(normalize_device_id);
        let method = request.credential.method();

        let _guard = self.locks.acquire(&request.subject_id).await;
        let mut eval = Evaluation {
            facility_id: request.facility_id.trim().to_string(),
            ..Evaluation::default()
        };
        let mut decision = match self.evaluate(&request, now_ms, &mut eval).await {
            Ok(()) => Decision::Granted,
            Err(reason) => Decision::Denied(reason),
        };

        let mut attempt_id = uuid::Uuid::new_v4().to_string();
        let record = self.attempt_record(&attempt_id, &request, &eval, decision, now_ms);
        if !self.append_attempt(record).await && decision.is_granted() {
            decision = Decision::Denied(ReasonCode::StorageUnavailable);
        }

        // 放行入账后才驱动闸机；驱动失败追加一条拒绝记录取代原放行
        if decision.is_granted() && request.device_id.is_some() {
            if let Some(device) = eval.device.as_ref() {
                if let Err(reason) = self.actuate(device).await {
                    decision = Decision::Denied(reason);
                    let failure_id = AccessAttemptRecord::actuation_failure_id(&attempt_id);
                    let record = self.attempt_record(&failure_id, &request, &eval, decision, now_ms);
                    if self.append_attempt(record).await {
                        attempt_id = failure_id;
                    }
                }
            }
        }

        if let Some(device) = eval.device.as_ref() {
            if let Err(err) = self
                .deps
                .devices
                .record_access(&device.device_id, decision.is_granted())
                .await
            {
                warn!(
                    target: "gate.access",
                    device_id = %device.device_id,
                    error = %err,
                    "device_counter_update_failed"
                );
            }
        }

        let mut attendance_recorded = false;
        let is_member = eval
            .subject
            .as_ref()
            .is_some_and(|subject| subject.has_role(Role::Member));
        if decision.is_granted() && is_member {
            match self
                .deps
                .ledger
                .record(&attempt_id, &request.subject_id, &eval.facility_id, now_ms)
                .await
            {
                Ok(written) => attendance_recorded = written.inserted,
                Err(err) => {
                    record_storage_failure();
                    error!(
                        target: "gate.attendance",
                        attempt_id = %attempt_id,
                        member_id = %request.subject_id,
                        error = %err,
                        "attendance_write_failed"
                    );
                }
            }
        }

        let outcome = VerifyOutcome {
            attempt_id,
            method,
            decision,
            review_required: requires_review(method, decision),
            subject: eval.subject.as_ref().map(|subject| SubjectSummary {
                subject_id: subject.subject_id.clone(),
                display_name: subject.display_name.clone(),
                roles: subject.parsed_roles(),
            }),
            facility: eval.facility.take(),
            membership: eval.membership,
            retry_after_ms: eval.retry_after_ms,
            attendance_recorded,
            door_open_ms: self.config.door_open_ms,
        };
        report_outcome(&request, &outcome, &eval.facility_id);
        record_verify_latency_ms(started_at.elapsed().as_millis() as u64);
        outcome
    }

    fn attempt_record(
        &self,
        attempt_id: &str,
        request: &AccessRequest,
        eval: &Evaluation,
        decision: Decision,
        now_ms: i64,
    ) -> AccessAttemptRecord {
        let method = request.credential.method();
        AccessAttemptRecord {
            attempt_id: attempt_id.to_string(),
            subject_id: request.subject_id.clone(),
            method,
            facility_id: eval.facility_id.clone(),
            device_id: request.device_id.clone(),
            decision,
            origin: AttemptOrigin::Server,
            review_required: requires_review(method, decision),
            ts_ms: now_ms,
        }
    }

    /// 写入失败只记日志与计数，由调用方决定判定如何降级。
    async fn append_attempt(&self, record: AccessAttemptRecord) -> bool {
        let attempt_id = record.attempt_id.clone();
        let subject_id = record.subject_id.clone();
        match self.deps.attempt_store.append_attempt(record).await {
            Ok(_) => true,
            Err(err) => {
                record_storage_failure();
                error!(
                    target: "gate.access",
                    attempt_id = %attempt_id,
                    subject_id = %subject_id,
                    error = %err,
                    "access_attempt_write_failed"
                );
                false
            }
        }
    }

    /// 闸机转发的会员码 `{facilityId}:{memberId}`。
    ///
    /// 无法解析时以设备为主体记录一次拒绝，限流同样按设备计。
    pub async fn verify_device_scan(
        &self,
        device_id: &str,
        payload: &str,
        now_ms: i64,
    ) -> VerifyOutcome {
        let device_key = normalize_device_id(device_id).unwrap_or_default();
        let (facility_id, subject_id) = match parse_member_code(payload) {
            Some((facility_id, member_id)) => (facility_id, member_id),
            None => (String::new(), format!("device:{}", device_key)),
        };
        let request = AccessRequest {
            subject_id,
            facility_id,
            device_id: Some(device_key),
            credential: Credential::Qr(payload.to_string()),
        };
        self.verify(request, now_ms).await
    }

    async fn evaluate(
        &self,
        request: &AccessRequest,
        now_ms: i64,
        eval: &mut Evaluation,
    ) -> Result<(), ReasonCode> {
        // 设备先行查出，限流拒绝同样计入设备的拒绝计数
        if let Some(device_id) = request.device_id.as_deref() {
            eval.device = self
                .deps
                .devices
                .find(device_id)
                .await
                .map_err(|_| ReasonCode::StorageUnavailable)?;
        }

        let action = RateLimitAction::for_method(request.credential.method());
        let limit = self
            .deps
            .rate_limiter
            .check_and_record(&request.subject_id, action, now_ms)
            .await;
        if !limit.allowed {
            if limit.degraded {
                return Err(ReasonCode::StorageUnavailable);
            }
            eval.retry_after_ms = limit.retry_after_ms(now_ms);
            return Err(ReasonCode::RateLimited);
        }

        let subject = self
            .deps
            .subject_store
            .find_subject(&request.subject_id)
            .await
            .map_err(|_| ReasonCode::StorageUnavailable)?
            .ok_or(ReasonCode::InvalidCredential)?;
        eval.subject = Some(subject.clone());

        match &request.credential {
            Credential::Qr(raw) => self.check_qr(raw, &subject, now_ms, eval).await?,
            Credential::Pin(pin) => check_pin(pin, &subject, &eval.facility_id)?,
            Credential::Biometric(assertion) => {
                self.check_biometric(assertion.as_ref(), &subject, now_ms, eval)?
            }
            Credential::Emergency(code) => self.check_emergency(code, &subject, &eval.facility_id)?,
            Credential::AdminOverride => {
                if !subject.has_role(Role::Admin) {
                    return Err(ReasonCode::InvalidCredential);
                }
            }
        }
        if eval.facility.is_none() {
            eval.facility = self.facility_summary(&eval.facility_id).await?;
        }

        if request.device_id.is_some() {
            self.check_device(eval, now_ms)?;
        }
        Ok(())
    }

    async fn check_qr(
        &self,
        raw: &str,
        subject: &SubjectRecord,
        now_ms: i64,
        eval: &mut Evaluation,
    ) -> Result<(), ReasonCode> {
        let code = parse_scanned_code(raw).map_err(|_| ReasonCode::InvalidCredential)?;
        if !eval.facility_id.is_empty() && eval.facility_id != code.facility_id {
            return Err(ReasonCode::InvalidCredential);
        }
        if code
            .member_id
            .as_deref()
            .is_some_and(|member_id| member_id != subject.subject_id)
        {
            return Err(ReasonCode::InvalidCredential);
        }
        eval.facility_id = code.facility_id.clone();
        let facility = self
            .facility_summary(&code.facility_id)
            .await?
            .ok_or(ReasonCode::InvalidCredential)?;
        eval.facility = Some(facility);
        self.check_standing(subject, now_ms, eval)
    }

    fn check_biometric(
        &self,
        assertion: Option<&BiometricAssertion>,
        subject: &SubjectRecord,
        now_ms: i64,
        eval: &mut Evaluation,
    ) -> Result<(), ReasonCode> {
        let assertion = assertion.ok_or(ReasonCode::UnsupportedDevice)?;
        let (Some(credential_id), Some(secret_hex)) = (
            subject.biometric_credential_id.as_deref(),
            subject.biometric_secret.as_deref(),
        ) else {
            return Err(ReasonCode::InvalidCredential);
        };
        let enrolled = EnrolledCredential {
            credential_id,
            secret_hex,
        };
        match verify_assertion(
            &enrolled,
            &subject.subject_id,
            assertion,
            now_ms,
            self.config.biometric_max_skew_ms,
        ) {
            Ok(AssertionCheck::Verified) => {}
            Ok(_) => return Err(ReasonCode::InvalidCredential),
            Err(err) => {
                error!(
                    target: "gate.access",
                    subject_id = %subject.subject_id,
                    error = %err,
                    "biometric_enrollment_invalid"
                );
                return Err(ReasonCode::ConfigurationError);
            }
        }
        self.check_standing(subject, now_ms, eval)
    }

    fn check_emergency(
        &self,
        code: &str,
        subject: &SubjectRecord,
        facility_id: &str,
    ) -> Result<(), ReasonCode> {
        let configured = self
            .config
            .emergency_code
            .as_deref()
            .ok_or(ReasonCode::ConfigurationError)?;
        let caller = subject.to_caller_context();
        if !caller.is_staff() && !caller.is_admin() {
            return Err(ReasonCode::InvalidCredential);
        }
        if !caller.can_access_facility(facility_id) {
            return Err(ReasonCode::WrongFacility);
        }
        if !emergency_code_matches(configured, code) {
            return Err(ReasonCode::InvalidCredential);
        }
        Ok(())
    }

    /// 场馆归属与会员有效期。管理员跨场馆，员工不看会员有效期。
    fn check_standing(
        &self,
        subject: &SubjectRecord,
        now_ms: i64,
        eval: &mut Evaluation,
    ) -> Result<(), ReasonCode> {
        let caller = subject.to_caller_context();
        if !caller.can_access_facility(&eval.facility_id) {
            return Err(ReasonCode::WrongFacility);
        }
        if caller.is_admin() || caller.is_staff() {
            return Ok(());
        }
        let state = resolve(
            subject.membership_end_ms,
            subject.membership_status.as_deref(),
            now_ms,
        );
        eval.membership = Some(state);
        if !state.is_active() {
            return Err(ReasonCode::MembershipExpired);
        }
        Ok(())
    }

    /// 离线判定优先于归属判定。
    fn check_device(&self, eval: &Evaluation, now_ms: i64) -> Result<(), ReasonCode> {
        let device = eval.device.as_ref().ok_or(ReasonCode::UnknownDevice)?;
        match device.status {
            domain::DeviceStatus::Deactivated => return Err(ReasonCode::Deactivated),
            domain::DeviceStatus::Maintenance => return Err(ReasonCode::DeviceOffline),
            domain::DeviceStatus::Active => {}
        }
        if !self.deps.devices.is_online(device, now_ms) {
            return Err(ReasonCode::DeviceOffline);
        }
        if device.owner_id != eval.facility_id {
            return Err(ReasonCode::WrongFacility);
        }
        Ok(())
    }

    async fn actuate(&self, device: &DeviceRecord) -> Result<(), ReasonCode> {
        let timeout = Duration::from_millis(self.config.actuation_timeout_ms);
        let open = self
            .deps
            .actuator
            .open(&device.device_id, self.config.door_open_ms);
        match tokio::time::timeout(timeout, open).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(target: "gate.access", device_id = %device.device_id, error = %err, "actuation_failed");
                Err(ReasonCode::DeviceTimeout)
            }
            Err(_) => {
                warn!(
                    target: "gate.access",
                    device_id = %device.device_id,
                    timeout_ms = self.config.actuation_timeout_ms,
                    "actuation_timeout"
                );
                Err(ReasonCode::DeviceTimeout)
            }
        }
    }

    /// 场馆即场馆主主体；名称取其展示名。
    async fn facility_summary(
        &self,
        facility_id: &str,
    ) -> Result<Option<FacilitySummary>, ReasonCode> {
        if facility_id.is_empty() {
            return Ok(None);
        }
        let owner = self
            .deps
            .subject_store
            .find_subject(facility_id)
            .await
            .map_err(|_| ReasonCode::StorageUnavailable)?;
        Ok(owner
            .filter(|owner| owner.has_role(Role::GymOwner))
            .map(|owner| FacilitySummary {
                facility_id: owner.subject_id,
                name: owner.display_name,
            }))
    }

    /// 客户端自报结果，只入审计，不产生签到。
    pub async fn log_client_attempt(
        &self,
        ctx: &CallerContext,
        method: AccessMethod,
        facility_id: &str,
        device_id: Option<&str>,
        decision: Decision,
        now_ms: i64,
    ) -> Result<AccessAttemptRecord, AccessError> {
        if facility_id.trim().is_empty() {
            return Err(AccessError::InvalidInput("facilityId required".to_string()));
        }
        if !ctx.can_access_facility(facility_id) {
            return Err(AccessError::Forbidden);
        }
        let record = AccessAttemptRecord {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            subject_id: ctx.subject_id.clone(),
            method,
            facility_id: facility_id.to_string(),
            device_id: device_id.and_then(normalize_device_id),
            decision,
            origin: AttemptOrigin::Client,
            review_required: false,
            ts_ms: now_ms,
        };
        let record = self
            .deps
            .attempt_store
            .append_attempt(record)
            .await
            .map_err(storage_err)?;
        info!(
            target: "gate.access",
            attempt_id = %record.attempt_id,
            subject_id = %record.subject_id,
            method = method.as_str(),
            result = decision.result_str(),
            "client_attempt_logged"
        );
        Ok(record)
    }

    /// 通行审计查询。会员只能看自己的记录；员工限本场馆；管理员不限。
    pub async fn list_attempts(
        &self,
        ctx: &CallerContext,
        mut query: AccessAttemptQuery,
    ) -> Result<Vec<AccessAttemptRecord>, AccessError> {
        if !ctx.is_admin() {
            if ctx.facility_id.is_empty() {
                return Err(AccessError::Forbidden);
            }
            match query.facility_id.as_deref() {
                Some(facility_id) if !ctx.can_access_facility(facility_id) => {
                    return Err(AccessError::Forbidden);
                }
                Some(_) => {}
                None => query.facility_id = Some(ctx.facility_id.clone()),
            }
            if !ctx.is_staff() {
                query.subject_id = Some(ctx.subject_id.clone());
            }
        }
        self.deps
            .attempt_store
            .list_attempts(ctx, &query)
            .await
            .map_err(storage_err)
    }

    /// 待复核的应急放行。
    pub async fn review_queue(
        &self,
        ctx: &CallerContext,
        limit: Option<i64>,
    ) -> Result<Vec<AccessAttemptRecord>, AccessError> {
        if !ctx.is_admin() && !ctx.has_role(Role::GymOwner) {
            return Err(AccessError::Forbidden);
        }
        let query = AccessAttemptQuery {
            review_only: true,
            limit,
            ..AccessAttemptQuery::default()
        };
        self.list_attempts(ctx, query).await
    }

    /// 单台设备的通行记录（设备需属于调用方场馆）。
    pub async fn device_attempts(
        &self,
        ctx: &CallerContext,
        device_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<AccessAttemptRecord>, AccessError> {
        let device = self
            .deps
            .devices
            .find_scoped(ctx, device_id)
            .await
            .map_err(|err| match err {
                gate_devices::DeviceError::UnknownDevice => AccessError::NotFound,
                gate_devices::DeviceError::Forbidden => AccessError::Forbidden,
                other => AccessError::Storage(other.to_string()),
            })?;
        let query = AccessAttemptQuery {
            facility_id: Some(device.owner_id.clone()),
            device_id: Some(device.device_id.clone()),
            limit,
            offset,
            ..AccessAttemptQuery::default()
        };
        self.deps
            .attempt_store
            .list_attempts(ctx, &query)
            .await
            .map_err(storage_err)
    }
}

/// PIN 仅限教练与场馆主，且只对自身场馆有效。
fn check_pin(pin: &str, subject: &SubjectRecord, facility_id: &str) -> Result<(), ReasonCode> {
    if !subject.has_role(Role::Trainer) && !subject.has_role(Role::GymOwner) {
        return Err(ReasonCode::InvalidCredential);
    }
    if subject.facility_id != facility_id {
        return Err(ReasonCode::WrongFacility);
    }
    let pin_hash = subject
        .pin_hash
        .as_deref()
        .ok_or(ReasonCode::InvalidCredential)?;
    match verify_pin(pin_hash, pin) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ReasonCode::InvalidCredential),
        Err(err) => {
            error!(
                target: "gate.access",
                subject_id = %subject.subject_id,
                error = %err,
                "pin_hash_invalid"
            );
            Err(ReasonCode::ConfigurationError)
        }
    }
}

/// 应急放行一律进入人工复核。
fn requires_review(method: AccessMethod, decision: Decision) -> bool {
    method == AccessMethod::Emergency && decision.is_granted()
}

fn report_outcome(request: &AccessRequest, outcome: &VerifyOutcome, facility_id: &str) {
    let method = outcome.method.as_str();
    match outcome.decision {
        Decision::Granted => {
            record_access_granted();
            info!(
                target: "gate.access",
                attempt_id = %outcome.attempt_id,
                subject_id = %request.subject_id,
                facility_id = %facility_id,
                device_id = ?request.device_id,
                method,
                attendance_recorded = outcome.attendance_recorded,
                "access_granted"
            );
            if outcome.review_required {
                record_emergency_grant();
                warn!(
                    target: "gate.security",
                    attempt_id = %outcome.attempt_id,
                    subject_id = %request.subject_id,
                    facility_id = %facility_id,
                    review_required = true,
                    "emergency_access_granted"
                );
            }
        }
        Decision::Denied(reason) => {
            record_access_denied();
            let code = reason.code();
            match reason.severity() {
                Severity::Normal => info!(
                    target: "gate.access",
                    attempt_id = %outcome.attempt_id,
                    subject_id = %request.subject_id,
                    facility_id = %facility_id,
                    method,
                    reason = code,
                    "access_denied"
                ),
                Severity::Elevated => warn!(
                    target: "gate.access",
                    attempt_id = %outcome.attempt_id,
                    subject_id = %request.subject_id,
                    facility_id = %facility_id,
                    device_id = ?request.device_id,
                    method,
                    reason = code,
                    retry_after_ms = ?outcome.retry_after_ms,
                    "access_denied"
                ),
                Severity::Critical => error!(
                    target: "gate.access",
                    attempt_id = %outcome.attempt_id,
                    subject_id = %request.subject_id,
                    facility_id = %facility_id,
                    method,
                    reason = code,
                    "access_denied"
                ),
            }
        }
    }
}
