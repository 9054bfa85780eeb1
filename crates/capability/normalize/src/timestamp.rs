//! 时间戳选择：优先使用报文内 `timestamp`，否则使用接收时刻。

use crate::payload::{DecodedPayload, json_kind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// 报文中的时间戳字段名。
pub const TIMESTAMP_FIELD: &str = "timestamp";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 时间戳来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Payload,
    Received,
    /// 报文带有时间戳但无法解析或超出纳秒范围。
    Fallback,
}

/// 解析 ISO-8601 时间；无时区时按 UTC 处理。
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// 选择测点时间戳，结果保证可表示为纳秒。
pub fn resolve_timestamp(
    payload: &DecodedPayload,
    received_at: DateTime<Utc>,
) -> (DateTime<Utc>, TimestampSource) {
    let Some(value) = payload.get(TIMESTAMP_FIELD) else {
        return (received_at, TimestampSource::Received);
    };
    let parsed = match value {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number.as_i64().map(DateTime::from_timestamp_nanos),
        _ => None,
    };
    match parsed {
        Some(instant) if instant.timestamp_nanos_opt().is_some() => {
            (instant, TimestampSource::Payload)
        }
        _ => {
            debug!(
                target: "pmon.normalize",
                timestamp = %value,
                kind = json_kind(value),
                received_at = %received_at.to_rfc3339(),
                "timestamp_unparseable_using_receipt_time"
            );
            (received_at, TimestampSource::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_payload;
    use chrono::TimeZone;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn resolve(payload: &str) -> (DateTime<Utc>, TimestampSource) {
        resolve_timestamp(&decode_payload(payload.as_bytes()).expect("decoded"), received())
    }

    #[test]
    fn uses_payload_rfc3339_timestamp() {
        let (ts, source) = resolve(r#"{"timestamp": "2024-01-01T00:00:00Z", "current": 1.0}"#);
        assert_eq!(source, TimestampSource::Payload);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn converts_offsets_to_utc() {
        let (ts, _) = resolve(r#"{"timestamp": "2024-01-01T02:00:00+02:00"}"#);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let ts = parse_timestamp("2024-01-01T00:00:00.123456").expect("naive");
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
        assert_eq!(
            parse_timestamp("2024-01-01 00:00:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn absent_timestamp_uses_receipt_time() {
        assert_eq!(resolve(r#"{"current": 1.0}"#), (received(), TimestampSource::Received));
    }

    #[test]
    fn unparseable_timestamp_falls_back() {
        assert_eq!(
            resolve(r#"{"timestamp": "yesterday"}"#),
            (received(), TimestampSource::Fallback)
        );
        assert_eq!(
            resolve(r#"{"timestamp": null}"#),
            (received(), TimestampSource::Fallback)
        );
        assert_eq!(
            resolve(r#"{"timestamp": 1.5}"#),
            (received(), TimestampSource::Fallback)
        );
    }

    #[test]
    fn out_of_range_timestamp_falls_back() {
        assert_eq!(
            resolve(r#"{"timestamp": "2300-01-01T00:00:00Z"}"#),
            (received(), TimestampSource::Fallback)
        );
    }

    #[test]
    fn integer_timestamp_is_epoch_nanos() {
        let (ts, source) = resolve(r#"{"timestamp": 1704067200000000000}"#);
        assert_eq!(source, TimestampSource::Payload);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }
}
