use pmon_telemetry::{
    TelemetryMetrics, metrics, new_message_id, record_dropped_decode, record_write_latency_ms,
};

#[test]
fn message_ids_are_unique() {
    let first = new_message_id();
    let second = new_message_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let metrics = TelemetryMetrics::new();
    assert_eq!(metrics.snapshot(), Default::default());
}

#[test]
fn recorders_update_global_snapshot() {
    let before = metrics().snapshot();
    record_dropped_decode();
    record_write_latency_ms(12);
    let after = metrics().snapshot();
    assert!(after.dropped_decode >= before.dropped_decode + 1);
    assert!(after.write_latency_ms_total >= before.write_latency_ms_total + 12);
    assert!(after.write_latency_ms_count >= before.write_latency_ms_count + 1);
}

#[test]
fn snapshot_serializes_field_names() {
    let json = serde_json::to_value(TelemetryMetrics::new().snapshot()).expect("json");
    assert_eq!(json["messages_received"], 0);
    assert_eq!(json["write_timeout"], 0);
}
