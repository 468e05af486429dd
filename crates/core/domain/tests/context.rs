use domain::{CallerContext, Credential, AccessMethod, ReasonCode, Role, Severity};

#[test]
fn caller_context_builds() {
    let ctx = CallerContext::new("gym-1", "trainer-1", vec![Role::Trainer]);

    assert_eq!(ctx.facility_id, "gym-1");
    assert_eq!(ctx.subject_id, "trainer-1");
    assert!(ctx.is_staff());
    assert!(!ctx.is_admin());
    assert!(ctx.can_access_facility("gym-1"));
    assert!(!ctx.can_access_facility("gym-2"));
}

#[test]
fn admin_crosses_facilities() {
    let ctx = CallerContext::new("", "root", vec![Role::Admin]);
    assert!(ctx.can_access_facility("gym-9"));
}

#[test]
fn role_parse_accepts_owner_aliases() {
    assert_eq!(Role::parse("gym-owner"), Some(Role::GymOwner));
    assert_eq!(Role::parse("gymOwner"), Some(Role::GymOwner));
    assert_eq!(Role::parse("visitor"), None);
}

#[test]
fn credential_reports_method() {
    assert_eq!(Credential::Pin("1234".into()).method(), AccessMethod::Pin);
    assert_eq!(Credential::Biometric(None).method(), AccessMethod::Biometric);
    assert_eq!(Credential::AdminOverride.method(), AccessMethod::AdminOverride);
}

#[test]
fn reason_codes_round_trip_and_grade() {
    assert_eq!(
        ReasonCode::parse(ReasonCode::DeviceTimeout.code()),
        Some(ReasonCode::DeviceTimeout)
    );
    assert_eq!(ReasonCode::MembershipExpired.severity(), Severity::Normal);
    assert_eq!(ReasonCode::RateLimited.severity(), Severity::Elevated);
    assert_eq!(ReasonCode::ConfigurationError.severity(), Severity::Critical);
    assert!(ReasonCode::RateLimited.remediation().is_some());
    assert!(!ReasonCode::StorageUnavailable.user_message().contains("storage"));
}
