//! 按主体串行化校验。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 同一主体的校验依次执行：限流检查、判定、审计写入在同一把锁内完成。
#[derive(Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, subject_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // 只剩表内一个引用的锁无人持有也无人等待
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(subject_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let locks = SubjectLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.len(), 2);
        }
        let _c = locks.acquire("c").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn same_subject_waits() {
        let locks = Arc::new(SubjectLocks::new());
        let guard = locks.acquire("a").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.expect("join");
    }
}
