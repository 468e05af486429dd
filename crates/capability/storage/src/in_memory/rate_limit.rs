//! 限流窗口内存实现
//!
//! 仅在单进程内生效；多实例部署需使用 `RedisRateLimitStore`。

use crate::error::StorageError;
use crate::traits::RateLimitStore;
use domain::{RateLimitDecision, RateLimitPolicy, RateLimitWindow};
use std::collections::HashMap;
use std::sync::Mutex;

/// 两次回收空闲窗口之间的最小间隔。
const SWEEP_INTERVAL_MS: i64 = 60_000;

/// 每个键记住最后一次使用的策略，回收时按各自的窗口判断是否空闲。
struct TrackedWindow {
    policy: RateLimitPolicy,
    window: RateLimitWindow,
}

#[derive(Default)]
struct Windows {
    entries: HashMap<String, TrackedWindow>,
    last_sweep_ms: Option<i64>,
}

impl Windows {
    fn sweep(&mut self, now_ms: i64) {
        if self
            .last_sweep_ms
            .is_some_and(|last| now_ms - last < SWEEP_INTERVAL_MS)
        {
            return;
        }
        self.entries
            .retain(|_, tracked| !tracked.window.is_idle(&tracked.policy, now_ms));
        self.last_sweep_ms = Some(now_ms);
    }
}

/// 限流窗口内存存储
///
/// 检查与记录在同一把锁内完成，保证同一键上的原子性。
/// 主体 ID 可能来自设备转发的载荷，空闲窗口在记录时顺带回收。
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<Windows>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows
            .lock()
            .map(|windows| windows.entries.len())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        windows.sweep(now_ms);
        let tracked = windows
            .entries
            .entry(key.to_string())
            .or_insert_with(|| TrackedWindow {
                policy: *policy,
                window: RateLimitWindow::default(),
            });
        tracked.policy = *policy;
        Ok(tracked.window.check_and_record(policy, now_ms))
    }

    async fn peek(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(tracked) = windows.entries.get(key) else {
            return Ok(RateLimitWindow::default().peek(policy, now_ms));
        };
        let decision = tracked.window.peek(policy, now_ms);
        if tracked.window.is_idle(policy, now_ms) {
            windows.entries.remove(key);
        }
        Ok(decision)
    }

    async fn reset(&self, key: &str) -> Result<bool, StorageError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(windows.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy::new(3, 60_000, 300_000)
    }

    #[tokio::test]
    async fn expired_windows_are_reclaimed_on_record() {
        let store = InMemoryRateLimitStore::new();
        for i in 0..10_000 {
            store
                .check_and_record(&format!("qr:member-{i}"), &policy(), 0)
                .await
                .expect("record");
        }
        assert_eq!(store.len(), 10_000);

        store
            .check_and_record("qr:member-new", &policy(), DAY_MS)
            .await
            .expect("record");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn blocked_windows_survive_a_sweep() {
        let store = InMemoryRateLimitStore::new();
        for ts in 0..4 {
            store
                .check_and_record("qr:member-1", &policy(), ts)
                .await
                .expect("record");
        }
        // 窗口已过但封禁未到期
        let later = 120_000;
        store
            .check_and_record("qr:member-2", &policy(), later)
            .await
            .expect("record");
        assert_eq!(store.len(), 2);
        let decision = store
            .peek("qr:member-1", &policy(), later)
            .await
            .expect("peek");
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn each_key_is_judged_by_its_own_policy() {
        let store = InMemoryRateLimitStore::new();
        let long = RateLimitPolicy::new(3, 3_600_000, 3_600_000);
        store
            .check_and_record("payment:member-1", &long, 0)
            .await
            .expect("record");
        store
            .check_and_record("qr:member-1", &policy(), 120_000)
            .await
            .expect("record");
        assert_eq!(store.len(), 2);
    }
}
