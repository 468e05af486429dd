//! 会员状态能力：纯解析函数 + 读路径的短 TTL 缓存。
//!
//! 通行判定调用 `state_for_decision`，总是回源重新解析；
//! 只有展示类读取走 `state_for` 的缓存。

mod cache;
mod resolve;

use gate_storage::SubjectStore;
use std::sync::Arc;
use tracing::debug;

pub use cache::MembershipCache;
pub use resolve::{EXPIRING_SOON_DAYS, MembershipState, MembershipStatus, resolve};

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("subject not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

/// 主体的会员视图。
#[derive(Debug, Clone)]
pub struct MemberMembership {
    pub member_id: String,
    pub facility_id: String,
    pub state: MembershipState,
}

pub struct MembershipService {
    subject_store: Arc<dyn SubjectStore>,
    cache: MembershipCache,
}

impl MembershipService {
    pub fn new(subject_store: Arc<dyn SubjectStore>, cache_ttl_ms: i64) -> Self {
        Self {
            subject_store,
            cache: MembershipCache::new(cache_ttl_ms),
        }
    }

    /// 读路径（展示用），命中缓存且未过期时直接返回。
    pub async fn state_for(
        &self,
        subject_id: &str,
        now_ms: i64,
    ) -> Result<MemberMembership, MembershipError> {
        if let Some((state, facility_id)) = self.cache.get(subject_id, now_ms) {
            debug!(target: "gate.membership", subject_id = %subject_id, "membership_cache_hit");
            return Ok(MemberMembership {
                member_id: subject_id.to_string(),
                facility_id,
                state,
            });
        }
        let membership = self.state_for_decision(subject_id, now_ms).await?;
        self.cache
            .put(subject_id, &membership.facility_id, membership.state, now_ms);
        Ok(membership)
    }

    /// 判定路径，不使用缓存。
    pub async fn state_for_decision(
        &self,
        subject_id: &str,
        now_ms: i64,
    ) -> Result<MemberMembership, MembershipError> {
        let subject = self
            .subject_store
            .find_subject(subject_id)
            .await
            .map_err(|err| MembershipError::Storage(err.to_string()))?
            .ok_or(MembershipError::NotFound)?;
        let state = resolve(
            subject.membership_end_ms,
            subject.membership_status.as_deref(),
            now_ms,
        );
        Ok(MemberMembership {
            member_id: subject.subject_id,
            facility_id: subject.facility_id,
            state,
        })
    }

    pub fn invalidate(&self, subject_id: &str) {
        self.cache.invalidate(subject_id);
    }
}
