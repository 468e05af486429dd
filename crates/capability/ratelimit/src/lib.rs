//! 限流能力：按 `(主体, 动作)` 的滑动窗口计数与封禁。
//!
//! 窗口算法在 `domain::RateLimitWindow`，原子性由 `RateLimitStore` 实现保证；
//! 本层负责策略选择、存储故障时的失败模式，以及管理员重置的鉴权与审计。

mod action;

use domain::{CallerContext, RateLimitDecision};
use gate_storage::{AuditLogRecord, AuditLogStore, RateLimitStore};
use gate_telemetry::{record_rate_limited, record_storage_failure};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use action::{FailMode, RateLimitAction, RateLimitConfig};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("forbidden")]
    Forbidden,
    #[error("rate limited")]
    RateLimited { blocked_until_ms: Option<i64> },
    #[error("storage error: {0}")]
    Storage(String),
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    audit_store: Arc<dyn AuditLogStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        audit_store: Arc<dyn AuditLogStore>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            audit_store,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 检查并记录一次尝试。
    ///
    /// 存储失败时按动作的失败模式合成结果，`degraded = true`。
    pub async fn check_and_record(
        &self,
        subject: &str,
        action: RateLimitAction,
        now_ms: i64,
    ) -> RateLimitDecision {
        let policy = self.config.policy(action);
        let key = action.key_for(subject);
        match self.store.check_and_record(&key, &policy, now_ms).await {
            Ok(decision) => {
                if !decision.allowed {
                    record_rate_limited();
                    warn!(
                        target: "gate.ratelimit",
                        subject = %subject,
                        action = action.as_str(),
                        blocked_until_ms = ?decision.blocked_until_ms,
                        "rate_limited"
                    );
                }
                decision
            }
            Err(err) => {
                record_storage_failure();
                let allowed = action.fail_mode() == FailMode::Open;
                error!(
                    target: "gate.ratelimit",
                    subject = %subject,
                    action = action.as_str(),
                    allowed,
                    error = %err,
                    "rate_limit_store_unavailable"
                );
                RateLimitDecision {
                    allowed,
                    remaining_attempts: 0,
                    blocked_until_ms: None,
                    degraded: true,
                }
            }
        }
    }

    /// 只读查询，不计入尝试。
    pub async fn status(
        &self,
        subject: &str,
        action: RateLimitAction,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let policy = self.config.policy(action);
        self.store
            .peek(&action.key_for(subject), &policy, now_ms)
            .await
            .map_err(|err| RateLimitError::Storage(err.to_string()))
    }

    /// 清空指定键的日志与封禁。仅管理员可用，操作本身限流并写审计。
    pub async fn reset(
        &self,
        ctx: &CallerContext,
        subject: &str,
        action: RateLimitAction,
        now_ms: i64,
    ) -> Result<bool, RateLimitError> {
        if !ctx.is_admin() {
            return Err(RateLimitError::Forbidden);
        }
        let guard = self
            .check_and_record(&ctx.subject_id, RateLimitAction::Reset, now_ms)
            .await;
        if guard.degraded {
            return Err(RateLimitError::Storage(
                "rate limit store unavailable".to_string(),
            ));
        }
        if !guard.allowed {
            return Err(RateLimitError::RateLimited {
                blocked_until_ms: guard.blocked_until_ms,
            });
        }

        let key = action.key_for(subject);
        let existed = self
            .store
            .reset(&key)
            .await
            .map_err(|err| RateLimitError::Storage(err.to_string()))?;
        let audit = AuditLogRecord {
            audit_id: uuid::Uuid::new_v4().to_string(),
            facility_id: None,
            actor: ctx.subject_id.clone(),
            action: "RATE_LIMIT.RESET".to_string(),
            resource: format!("rate-limit:{}", key),
            result: if existed { "cleared" } else { "noop" }.to_string(),
            detail: None,
            ts_ms: now_ms,
        };
        // 窗口已清除，无法回滚；审计缺失只能告警
        if let Err(err) = self.audit_store.create_audit_log(audit).await {
            record_storage_failure();
            error!(
                target: "gate.ratelimit",
                actor = %ctx.subject_id,
                key = %key,
                error = %err,
                "reset_audit_write_failed"
            );
        }
        info!(
            target: "gate.ratelimit",
            actor = %ctx.subject_id,
            key = %key,
            existed,
            "rate_limit_reset"
        );
        Ok(existed)
    }
}
