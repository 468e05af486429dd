use api_contract::{
    DeviceDecisionDto, HeartbeatRequest, LoginResponse, RefreshTokenRequest, VerifyRequest,
    VerifyResponse,
};
use serde_json::Value;

#[test]
fn login_response_is_camel_case() {
    let response = LoginResponse {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires: 1_700_000_000_000,
        subject_id: "owner-1".to_string(),
        username: "owner".to_string(),
        facility_id: "owner-1".to_string(),
        roles: vec!["gym-owner".to_string()],
    };
    let value = serde_json::to_value(response).expect("serialize");
    assert!(value.get("accessToken").is_some());
    assert!(value.get("facilityId").is_some());
    assert!(value.get("access_token").is_none());
    assert!(matches!(value.get("expires"), Some(Value::Number(_))));
}

#[test]
fn refresh_token_request_accepts_both_cases() {
    let camel: RefreshTokenRequest =
        serde_json::from_str(r#"{"refreshToken":"token-1"}"#).expect("parse");
    let snake: RefreshTokenRequest =
        serde_json::from_str(r#"{"refresh_token":"token-2"}"#).expect("parse");
    assert_eq!(camel.refresh_token, "token-1");
    assert_eq!(snake.refresh_token, "token-2");
}

#[test]
fn heartbeat_accepts_firmware_field_names() {
    let payload = r#"{"deviceId":"GATE-01","systemInfo":{"uptime":1200,"freeHeap":40000,"signalStrength":-61}}"#;
    let req: HeartbeatRequest = serde_json::from_str(payload).expect("parse");
    let telemetry = req.telemetry.expect("telemetry");
    assert_eq!(telemetry.uptime_ms, Some(1200));
    assert_eq!(telemetry.free_heap, Some(40000));
    assert_eq!(telemetry.rssi, Some(-61));
}

#[test]
fn verify_request_keeps_raw_payload() {
    let payload = r#"{"credentialType":"qr","payload":{"type":"gym_owner","gymOwnerId":"g1"},"facilityId":"g1"}"#;
    let req: VerifyRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.credential_type, "qr");
    assert!(req.payload.is_object());
    assert!(req.device_id.is_none());
}

#[test]
fn verify_response_omits_absent_member_and_gym() {
    let response = VerifyResponse {
        status: "error".to_string(),
        message: "too many attempts".to_string(),
        member: None,
        gym: None,
        attempt_id: Some("a-1".to_string()),
        reason: Some("ACCESS.RATE_LIMITED".to_string()),
        remediation: Some("retry after the block expires".to_string()),
        retry_after_ms: Some(30_000),
        review_required: false,
    };
    let value = serde_json::to_value(response).expect("serialize");
    assert!(value.get("member").is_none());
    assert!(value.get("gym").is_none());
    assert_eq!(value["retryAfterMs"], 30_000);
}

#[test]
fn device_decision_uses_relay_field_names() {
    let decision = DeviceDecisionDto {
        decision: "granted".to_string(),
        action: "GRANT_ACCESS".to_string(),
        duration_ms: 5000,
        reason: None,
        message: "access granted".to_string(),
        node_mcu_response: "ACTIVE".to_string(),
        attempt_id: None,
    };
    let value = serde_json::to_value(decision).expect("serialize");
    assert_eq!(value["nodeMcuResponse"], "ACTIVE");
    assert_eq!(value["durationMs"], 5000);
}
