//! 带显式 TTL 的会员状态缓存。

use std::collections::HashMap;
use std::sync::RwLock;

use crate::MembershipState;

struct CacheEntry {
    state: MembershipState,
    facility_id: String,
    cached_at_ms: i64,
}

/// 缓存条目过期后不返回，由调用方重新解析。
pub struct MembershipCache {
    ttl_ms: i64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MembershipCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, subject_id: &str, now_ms: i64) -> Option<(MembershipState, String)> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(subject_id)?;
        if now_ms - entry.cached_at_ms >= self.ttl_ms || now_ms < entry.cached_at_ms {
            return None;
        }
        Some((entry.state, entry.facility_id.clone()))
    }

    pub fn put(&self, subject_id: &str, facility_id: &str, state: MembershipState, now_ms: i64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| now_ms - entry.cached_at_ms < self.ttl_ms);
            entries.insert(
                subject_id.to_string(),
                CacheEntry {
                    state,
                    facility_id: facility_id.to_string(),
                    cached_at_ms: now_ms,
                },
            );
        }
    }

    pub fn invalidate(&self, subject_id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(subject_id);
        }
    }
}
