//! MQTT → InfluxDB 电力监测桥接进程。
//!
//! 订阅 `power_monitoring/#`，把每条消息转换为 `equipment_power_usage` 测点逐条写入 InfluxDB，
//! 直到收到 Ctrl+C / SIGTERM 后有序断开。

mod bridge;
mod http;

use bridge::BridgeHandler;
use pmon_config::BridgeConfig;
use pmon_ingest::{MqttSource, MqttSourceConfig, Source};
use pmon_normalize::Normalizer;
use pmon_pipeline::{Pipeline, PipelineConfig, StoragePointWriter};
use pmon_storage::PointStore;
use pmon_storage::connection::{InfluxConfig, connect_influx};
use pmon_telemetry::init_tracing;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 关闭时等待运维 HTTP 退出的最长时间。
const HTTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 令牌等配置缺失必须在任何连接之前失败
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            let _ = init_tracing(None);
            error!(target: "pmon.bridge", error = %err, "config_invalid");
            return ExitCode::FAILURE;
        }
    };
    // 初始化结构化日志；日志文件不可用时退回仅 stdout
    if let Err(err) = init_tracing(config.log_file.as_deref()) {
        let _ = init_tracing(None);
        warn!(
            target: "pmon.bridge",
            path = ?config.log_file,
            error = %err,
            "log_file_unavailable"
        );
    }

    info!(
        target: "pmon.bridge",
        broker = %config.mqtt_host,
        port = config.mqtt_port,
        topic = %config.mqtt_topic,
        qos = config.mqtt_qos,
        influx_url = %config.influx_url,
        org = %config.influx_org,
        bucket = %config.influx_bucket,
        "bridge_starting"
    );

    // InfluxDB 连接与鉴权（失败即退出）
    let influx = InfluxConfig::new(
        config.influx_url.clone(),
        config.influx_token.clone(),
        config.influx_org.clone(),
        config.influx_bucket.clone(),
    );
    let store = match connect_influx(influx).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(target: "pmon.bridge", url = %config.influx_url, error = %err, "influx_connect_failed");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::with_config(
        Arc::new(StoragePointWriter::new(store.clone())),
        pipeline_config(&config),
    );
    let handler = Arc::new(BridgeHandler::new(Normalizer::new(), pipeline));
    let source = MqttSource::new(mqtt_source_config(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 运维 HTTP（可选）
    let http_task = config.http_addr.clone().map(|addr| {
        let session = source.subscribe_state();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = http::serve(&addr, session, shutdown).await {
                error!(target: "pmon.bridge", addr = %addr, error = %err, "ops_http_failed");
            }
        })
    });

    let run = source.run(handler, shutdown_rx);
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_signal() => {
            info!(target: "pmon.bridge", "shutdown_signal_received");
            let _ = shutdown_tx.send(true);
            // 会话在当前消息处理完后才退出
            run.await
        }
    };
    let _ = shutdown_tx.send(true);

    if let Err(err) = store.close().await {
        warn!(target: "pmon.bridge", error = %err, "influx_close_failed");
    }
    if let Some(task) = http_task {
        if tokio::time::timeout(HTTP_SHUTDOWN_GRACE, task).await.is_err() {
            warn!(target: "pmon.bridge", "ops_http_shutdown_timeout");
        }
    }

    match result {
        Ok(()) => {
            info!(target: "pmon.bridge", "bridge_stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(target: "pmon.bridge", error = %err, "mqtt_session_failed");
            ExitCode::FAILURE
        }
    }
}

fn mqtt_source_config(config: &BridgeConfig) -> MqttSourceConfig {
    let mut source = MqttSourceConfig::new(
        config.mqtt_host.clone(),
        config.mqtt_port,
        config.mqtt_topic.clone(),
    );
    source.client_id = config.mqtt_client_id.clone();
    source.username = config.mqtt_username.clone();
    source.password = config.mqtt_password.clone();
    source.qos = config.mqtt_qos;
    source.keep_alive = Duration::from_secs(config.mqtt_keep_alive_secs);
    source.reconnect = config.mqtt_reconnect;
    source.reconnect_delay = Duration::from_millis(config.mqtt_reconnect_delay_ms);
    source
}

fn pipeline_config(config: &BridgeConfig) -> PipelineConfig {
    PipelineConfig {
        write_timeout: match config.influx_write_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        },
        max_retries: config.influx_write_max_retries,
        retry_backoff: Duration::from_millis(config.influx_write_backoff_ms),
    }
}

/// 等待 Ctrl+C 或 SIGTERM。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "pmon.bridge", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(target: "pmon.bridge", error = %err, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
