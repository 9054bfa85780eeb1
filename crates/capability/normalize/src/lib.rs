//! RawMessage -> MeasurementPoint 的规范化链路。
//!
//! 各阶段依次执行：topic 解析、报文解码、字段映射、时间戳选择、测点组装。
//! 任一阶段失败都返回 [`NormalizeError`]，由调用方记录日志并丢弃该消息。

pub mod fields;
pub mod payload;
pub mod point;
pub mod timestamp;
pub mod topic;

pub use fields::{CoerceError, FIELD_MAPPINGS, FieldError, MappedFields, coerce_number, map_fields};
pub use payload::{DecodeError, DecodedPayload, MAX_PAYLOAD_PREVIEW, decode_payload, payload_preview};
pub use point::build_point;
pub use timestamp::{TIMESTAMP_FIELD, TimestampSource, parse_timestamp, resolve_timestamp};
pub use topic::{TopicError, TopicIds, parse_topic};

use domain::{MeasurementPoint, PointError, RawMessage};

/// 规范化错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error(transparent)]
    InvalidTopic(#[from] TopicError),
    #[error("{error}")]
    Decode {
        error: DecodeError,
        /// 截断后的原始报文。
        payload_preview: String,
    },
    #[error(transparent)]
    NoValidFields(#[from] FieldError),
    #[error(transparent)]
    Point(#[from] PointError),
}

/// 规范化结果。
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub point: MeasurementPoint,
    pub fields_added: usize,
    pub timestamp_source: TimestampSource,
}

/// 无状态规范化器；同一消息多次处理得到相同结果。
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, message: &RawMessage) -> Result<Normalized, NormalizeError> {
        let ids = parse_topic(&message.topic)?;
        let payload = decode_payload(&message.payload).map_err(|error| NormalizeError::Decode {
            error,
            payload_preview: payload_preview(&message.payload),
        })?;
        let mapped = map_fields(&payload)?;
        let fields_added = mapped.added;
        let (timestamp, timestamp_source) = resolve_timestamp(&payload, message.received_at);
        let point = build_point(ids, mapped, timestamp)?;
        Ok(Normalized {
            point,
            fields_added,
            timestamp_source,
        })
    }
}
