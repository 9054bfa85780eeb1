//! 消息处理链路装配
//!
//! 把规整化（Normalizer）与写入流水线（Pipeline）串在一起：
//! 每条 MQTT 消息依次经过 topic 解析、报文解码、字段映射、时间戳解析与测点构造，
//! 随后写入 InfluxDB。任何单条消息的错误都只记录日志并丢弃该消息，不影响会话。

use domain::RawMessage;
use pmon_ingest::{IngestError, RawMessageHandler};
use pmon_normalize::{NormalizeError, Normalizer};
use pmon_pipeline::{Pipeline, PipelineError, WriteResult};
use pmon_telemetry::{
    new_message_id, record_dropped_decode, record_dropped_invalid_topic, record_dropped_no_fields,
    record_point_built, record_write_failure, record_write_latency_ms, record_write_success,
    record_write_timeout,
};
use tracing::{Instrument, debug, error, info, warn};

/// 消息被丢弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidTopic,
    Decode,
    NoValidFields,
    InvalidPoint,
    WriteFailed,
    WriteTimeout,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidTopic => "invalid_topic",
            DropReason::Decode => "decode_error",
            DropReason::NoValidFields => "no_valid_fields",
            DropReason::InvalidPoint => "invalid_point",
            DropReason::WriteFailed => "write_failed",
            DropReason::WriteTimeout => "write_timeout",
        }
    }
}

/// 单条消息的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Written(WriteResult),
    Dropped(DropReason),
}

/// 桥接处理器
///
/// 实现 `RawMessageHandler`，由 MQTT 会话逐条调用。
pub struct BridgeHandler {
    /// 规整化器，把原始消息转换为测点
    normalizer: Normalizer,
    /// 写入流水线，负责超时与重试
    pipeline: Pipeline,
}

impl BridgeHandler {
    pub fn new(normalizer: Normalizer, pipeline: Pipeline) -> Self {
        Self {
            normalizer,
            pipeline,
        }
    }

    /// 处理一条消息直到写入完成或被丢弃。
    pub async fn process(&self, message: &RawMessage) -> MessageOutcome {
        debug!(
            target: "pmon.bridge",
            payload_size = message.payload.len(),
            "message_received"
        );

        let normalized = match self.normalizer.normalize(message) {
            Ok(normalized) => normalized,
            Err(err) => return MessageOutcome::Dropped(self.on_normalize_error(message, err)),
        };
        record_point_built();
        let point = normalized.point;
        debug!(
            target: "pmon.bridge",
            machine = %point.machine(),
            phase = %point.phase(),
            fields_added = normalized.fields_added,
            timestamp_source = ?normalized.timestamp_source,
            "point_built"
        );

        match self.pipeline.handle(&point).await {
            Ok(result) => {
                record_write_success();
                record_write_latency_ms(u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX));
                info!(
                    target: "pmon.bridge",
                    machine = %point.machine(),
                    phase = %point.phase(),
                    fields = point.fields().len(),
                    timestamp_ns = point.timestamp_ns(),
                    attempts = result.attempts,
                    "point_written"
                );
                MessageOutcome::Written(result)
            }
            Err(err) => {
                record_write_failure();
                let reason = match err {
                    PipelineError::Timeout(_) => {
                        record_write_timeout();
                        DropReason::WriteTimeout
                    }
                    PipelineError::Writer(_) => DropReason::WriteFailed,
                };
                error!(
                    target: "pmon.bridge",
                    topic = %message.topic,
                    machine = %point.machine(),
                    phase = %point.phase(),
                    reason = reason.as_str(),
                    error = %err,
                    "point_write_failed"
                );
                MessageOutcome::Dropped(reason)
            }
        }
    }

    fn on_normalize_error(&self, message: &RawMessage, err: NormalizeError) -> DropReason {
        let reason = match &err {
            NormalizeError::InvalidTopic(_) => {
                record_dropped_invalid_topic();
                DropReason::InvalidTopic
            }
            NormalizeError::Decode { .. } => {
                record_dropped_decode();
                DropReason::Decode
            }
            NormalizeError::NoValidFields(_) => {
                record_dropped_no_fields();
                DropReason::NoValidFields
            }
            NormalizeError::Point(_) => DropReason::InvalidPoint,
        };
        match &err {
            NormalizeError::Decode {
                payload_preview, ..
            } => warn!(
                target: "pmon.bridge",
                topic = %message.topic,
                reason = reason.as_str(),
                error = %err,
                payload = %payload_preview,
                "message_dropped"
            ),
            _ => warn!(
                target: "pmon.bridge",
                topic = %message.topic,
                reason = reason.as_str(),
                error = %err,
                "message_dropped"
            ),
        }
        reason
    }
}

#[async_trait::async_trait]
impl RawMessageHandler for BridgeHandler {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError> {
        let span = tracing::info_span!(
            "message",
            message_id = %new_message_id(),
            topic = %message.topic
        );
        // 丢弃已在 process 内记录，不向会话传播
        self.process(&message).instrument(span).await;
        Ok(())
    }
}
