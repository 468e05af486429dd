use domain::RateLimitPolicy;
use gate_storage::{InMemoryRateLimitStore, RateLimitStore};
use std::sync::Arc;

const POLICY: RateLimitPolicy = RateLimitPolicy::new(3, 60_000, 300_000);

#[tokio::test]
async fn parallel_attempts_never_exceed_budget() {
    let store = Arc::new(InMemoryRateLimitStore::new());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .check_and_record("pin:trainer-1", &POLICY, 1_000)
                .await
                .expect("check")
        }));
    }
    let mut allowed = 0;
    for handle in handles {
        if handle.await.expect("join").allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 3);
}

#[tokio::test]
async fn reset_clears_block() {
    let store = InMemoryRateLimitStore::new();
    for ts in 0..4 {
        store.check_and_record("qr:member-1", &POLICY, ts).await.expect("check");
    }
    let blocked = store.peek("qr:member-1", &POLICY, 10).await.expect("peek");
    assert!(!blocked.allowed);

    assert!(store.reset("qr:member-1").await.expect("reset"));
    let cleared = store.peek("qr:member-1", &POLICY, 10).await.expect("peek");
    assert!(cleared.allowed);
    assert_eq!(cleared.remaining_attempts, 3);
}

#[tokio::test]
async fn keys_are_independent() {
    let store = InMemoryRateLimitStore::new();
    for ts in 0..4 {
        store.check_and_record("qr:member-1", &POLICY, ts).await.expect("check");
    }
    let other = store.check_and_record("qr:member-2", &POLICY, 5).await.expect("check");
    assert!(other.allowed);
}
