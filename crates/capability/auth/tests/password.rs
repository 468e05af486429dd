use gate_auth::{hash_password, is_valid_pin_format, verify_password_and_maybe_upgrade, verify_pin};

#[test]
fn argon2_hash_verifies() {
    let hash = hash_password("admin123").expect("hash");
    let check = verify_password_and_maybe_upgrade(&hash, "admin123").expect("check");
    assert!(check.verified);
    assert!(check.upgrade_hash.is_none());
}

#[test]
fn legacy_plaintext_upgrades() {
    let check = verify_password_and_maybe_upgrade("admin123", "admin123").expect("check");
    assert!(check.verified);
    assert!(check.upgrade_hash.as_deref().unwrap_or_default().starts_with("$argon2"));
}

#[test]
fn wrong_password_rejected() {
    let check = verify_password_and_maybe_upgrade("admin123", "bad").expect("check");
    assert!(!check.verified);
    assert!(check.upgrade_hash.is_none());
}

#[test]
fn pin_format_bounds() {
    assert!(is_valid_pin_format("1234"));
    assert!(is_valid_pin_format("12345678"));
    assert!(!is_valid_pin_format("123"));
    assert!(!is_valid_pin_format("123456789"));
    assert!(!is_valid_pin_format("12a4"));
}

#[test]
fn pin_verifies_against_argon2_hash() {
    let hash = hash_password("4321").expect("hash");
    assert!(verify_pin(&hash, "4321").expect("verify"));
    assert!(!verify_pin(&hash, "1234").expect("verify"));
    // 格式不合法直接拒绝
    assert!(!verify_pin(&hash, "43").expect("verify"));
}

#[test]
fn pin_requires_hashed_storage() {
    assert!(verify_pin("4321", "4321").is_err());
}

#[test]
fn corrupt_argon2_hash_is_an_internal_error() {
    assert!(verify_password_and_maybe_upgrade("$argon2id$broken", "admin123").is_err());
    assert!(verify_pin("$argon2id$broken", "4321").is_err());
}
