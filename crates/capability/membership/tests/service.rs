use std::sync::Arc;

use domain::{DAY_MS, Role};
use gate_membership::{MembershipError, MembershipService, MembershipStatus};
use gate_storage::{InMemorySubjectStore, SubjectRecord, SubjectStore};

const NOW: i64 = 1_700_000_000_000;

fn member(end_ms: Option<i64>) -> SubjectRecord {
    SubjectRecord {
        subject_id: "member-1".to_string(),
        facility_id: "gym-1".to_string(),
        username: "member1".to_string(),
        display_name: "Member One".to_string(),
        password_hash: String::new(),
        roles: vec![Role::Member.as_str().to_string()],
        pin_hash: None,
        biometric_credential_id: None,
        biometric_secret: None,
        membership_end_ms: end_ms,
        membership_status: None,
    }
}

#[tokio::test]
async fn cached_read_survives_until_ttl() {
    let store = Arc::new(InMemorySubjectStore::new());
    store
        .upsert_subject(member(Some(NOW + 5 * DAY_MS)))
        .await
        .expect("seed");
    let service = MembershipService::new(store.clone(), 30_000);

    let first = service.state_for("member-1", NOW).await.expect("state");
    assert_eq!(first.state.days_remaining, Some(5));
    assert_eq!(first.facility_id, "gym-1");

    store
        .upsert_subject(member(Some(NOW - DAY_MS)))
        .await
        .expect("update");

    let cached = service.state_for("member-1", NOW + 1_000).await.expect("state");
    assert_eq!(cached.state.status, MembershipStatus::Active);

    // 判定路径总是回源
    let fresh = service
        .state_for_decision("member-1", NOW + 1_000)
        .await
        .expect("state");
    assert_eq!(fresh.state.status, MembershipStatus::Expired);

    let expired_cache = service
        .state_for("member-1", NOW + 30_000)
        .await
        .expect("state");
    assert_eq!(expired_cache.state.status, MembershipStatus::Expired);
}

#[tokio::test]
async fn invalidate_forces_reload() {
    let store = Arc::new(InMemorySubjectStore::new());
    store.upsert_subject(member(None)).await.expect("seed");
    let service = MembershipService::new(store.clone(), 30_000);
    service.state_for("member-1", NOW).await.expect("state");

    store
        .upsert_subject(member(Some(NOW - DAY_MS)))
        .await
        .expect("update");
    service.invalidate("member-1");
    let state = service.state_for("member-1", NOW).await.expect("state");
    assert_eq!(state.state.status, MembershipStatus::Expired);
}

#[tokio::test]
async fn unknown_subject_is_not_found() {
    let service = MembershipService::new(Arc::new(InMemorySubjectStore::new()), 30_000);
    let result = service.state_for("ghost", NOW).await;
    assert!(matches!(result, Err(MembershipError::NotFound)));
}
