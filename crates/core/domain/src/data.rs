use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::MEASUREMENT_NAME;

/// 规范字段名 -> 数值。按字段名有序，保证编码结果稳定。
pub type FieldSet = BTreeMap<String, f64>;

/// 传输层投递的原始消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// 从传输层取出消息的时刻。
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, received_at: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }
}

/// 测点构造错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    #[error("point has no fields")]
    EmptyFields,
    #[error("timestamp out of nanosecond range: {0}")]
    TimestampOutOfRange(String),
}

/// 写入时序库的一条测点记录（构造后不可变）。
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    machine: String,
    phase: String,
    fields: FieldSet,
    timestamp_ns: i64,
}

impl MeasurementPoint {
    /// 构造测点；字段为空或时间戳无法表示为纳秒时拒绝。
    pub fn new(
        machine: impl Into<String>,
        phase: impl Into<String>,
        fields: FieldSet,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        if fields.is_empty() {
            return Err(PointError::EmptyFields);
        }
        let timestamp_ns = timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| PointError::TimestampOutOfRange(timestamp.to_rfc3339()))?;
        Ok(Self {
            machine: machine.into(),
            phase: phase.into(),
            fields,
            timestamp_ns,
        })
    }

    pub fn measurement(&self) -> &'static str {
        MEASUREMENT_NAME
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    /// Unix 纪元以来的纳秒数。
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_ns)
    }
}
