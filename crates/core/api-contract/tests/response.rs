use api_contract::{
    ApiResponse, DeviceDecisionDto, HeartbeatRequest, StaffEmergencyVerifyRequest, VerifyRequest,
};
use serde_json::json;

#[test]
fn plain_error_omits_hint_fields() {
    let response = ApiResponse::<()>::error("AUTH.UNAUTHORIZED", "unauthorized");
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(value["success"], false);
    assert!(value["data"].is_null());
    assert!(value["error"].get("remediation").is_none());
    assert!(value["error"].get("retryAfterMs").is_none());
}

#[test]
fn rate_limited_error_carries_retry_after() {
    let response = ApiResponse::<()>::error_with_hint(
        "ACCESS.RATE_LIMITED",
        "too many attempts",
        Some("retry after the block expires".to_string()),
        Some(1500),
    );
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(value["error"]["retryAfterMs"], 1500);
    assert_eq!(value["error"]["remediation"], "retry after the block expires");
}

#[test]
fn device_decision_uses_firmware_field_names() {
    let dto = DeviceDecisionDto {
        decision: "granted".to_string(),
        action: "GRANT_ACCESS".to_string(),
        duration_ms: 5000,
        reason: None,
        message: "access granted".to_string(),
        node_mcu_response: "ACTIVE".to_string(),
        attempt_id: Some("attempt-1".to_string()),
    };
    let value = serde_json::to_value(ApiResponse::success(dto)).expect("serialize");
    assert_eq!(value["data"]["nodeMcuResponse"], "ACTIVE");
    assert_eq!(value["data"]["durationMs"], 5000);
}

#[test]
fn optional_request_fields_default() {
    let verify: VerifyRequest = serde_json::from_value(json!({
        "credentialType": "pin",
        "payload": "1234",
        "facilityId": "gym-1"
    }))
    .expect("verify");
    assert!(verify.device_id.is_none());

    let heartbeat: HeartbeatRequest =
        serde_json::from_value(json!({ "deviceId": "GATE-01" })).expect("heartbeat");
    assert!(heartbeat.telemetry.is_none());
}

#[test]
fn emergency_code_accepts_legacy_field_name() {
    let request: StaffEmergencyVerifyRequest = serde_json::from_value(json!({
        "emergencyCode": "FIRE-2024",
        "facilityId": "gym-1"
    }))
    .expect("emergency");
    assert_eq!(request.code, "FIRE-2024");
}
