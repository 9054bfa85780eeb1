//! 日志初始化、消息 ID 与基础计数指标。

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub dropped_invalid_topic: u64,
    pub dropped_decode: u64,
    pub dropped_no_fields: u64,
    pub invalid_field_values: u64,
    pub points_built: u64,
    pub write_success: u64,
    pub write_failure: u64,
    pub write_timeout: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
    pub mqtt_connects: u64,
    pub mqtt_disconnects: u64,
    pub mqtt_connect_rejected: u64,
}

/// 基础指标（进程级原子计数）。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    dropped_invalid_topic: AtomicU64,
    dropped_decode: AtomicU64,
    dropped_no_fields: AtomicU64,
    invalid_field_values: AtomicU64,
    points_built: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
    write_timeout: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
    mqtt_connects: AtomicU64,
    mqtt_disconnects: AtomicU64,
    mqtt_connect_rejected: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            dropped_invalid_topic: AtomicU64::new(0),
            dropped_decode: AtomicU64::new(0),
            dropped_no_fields: AtomicU64::new(0),
            invalid_field_values: AtomicU64::new(0),
            points_built: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            write_timeout: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
            mqtt_connects: AtomicU64::new(0),
            mqtt_disconnects: AtomicU64::new(0),
            mqtt_connect_rejected: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            dropped_invalid_topic: self.dropped_invalid_topic.load(Ordering::Relaxed),
            dropped_decode: self.dropped_decode.load(Ordering::Relaxed),
            dropped_no_fields: self.dropped_no_fields.load(Ordering::Relaxed),
            invalid_field_values: self.invalid_field_values.load(Ordering::Relaxed),
            points_built: self.points_built.load(Ordering::Relaxed),
            write_success: self.write_success.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
            write_timeout: self.write_timeout.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
            mqtt_connects: self.mqtt_connects.load(Ordering::Relaxed),
            mqtt_disconnects: self.mqtt_disconnects.load(Ordering::Relaxed),
            mqtt_connect_rejected: self.mqtt_connect_rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info），可选同时追加写入日志文件。
///
/// 日志文件无法打开时返回错误且不安装订阅器，调用方可改用 `init_tracing(None)`。
/// 重复初始化时静默忽略。
pub fn init_tracing(log_file: Option<&Path>) -> std::io::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    Ok(())
}

/// 生成新的 message_id（同一条消息的日志关联）。
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录收到的 MQTT 消息次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录因 topic 非法丢弃的次数。
pub fn record_dropped_invalid_topic() {
    metrics().dropped_invalid_topic.fetch_add(1, Ordering::Relaxed);
}

/// 记录因报文解码失败丢弃的次数。
pub fn record_dropped_decode() {
    metrics().dropped_decode.fetch_add(1, Ordering::Relaxed);
}

/// 记录因无有效字段丢弃的次数。
pub fn record_dropped_no_fields() {
    metrics().dropped_no_fields.fetch_add(1, Ordering::Relaxed);
}

/// 记录被跳过的单个字段值次数。
pub fn record_invalid_field_value() {
    metrics().invalid_field_values.fetch_add(1, Ordering::Relaxed);
}

/// 记录成功构造的测点次数。
pub fn record_point_built() {
    metrics().points_built.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入成功次数。
pub fn record_write_success() {
    metrics().write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入失败次数（含超时）。
pub fn record_write_failure() {
    metrics().write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入超时次数。
pub fn record_write_timeout() {
    metrics().write_timeout.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入延迟（毫秒）。
pub fn record_write_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录 MQTT 连接成功次数。
pub fn record_mqtt_connect() {
    metrics().mqtt_connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录 MQTT 断开次数。
pub fn record_mqtt_disconnect() {
    metrics().mqtt_disconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录 MQTT 连接被拒次数。
pub fn record_mqtt_connect_rejected() {
    metrics()
        .mqtt_connect_rejected
        .fetch_add(1, Ordering::Relaxed);
}
