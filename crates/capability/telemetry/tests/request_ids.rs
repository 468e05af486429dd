use gate_telemetry::{metrics, new_request_ids, record_access_granted, record_verify_latency_ms};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot();
    record_access_granted();
    record_verify_latency_ms(12);
    let after = metrics().snapshot();
    assert!(after.access_granted > before.access_granted);
    assert!(after.verify_latency_ms_total >= before.verify_latency_ms_total + 12);
    assert!(after.verify_latency_ms_count > before.verify_latency_ms_count);
}
