//! MQTT 传输会话：连接、订阅、重连，并把每条消息按到达顺序交给处理器。

use async_trait::async_trait;
use domain::RawMessage;
use std::sync::Arc;
use tokio::sync::watch;

pub mod mqtt;
pub mod session;

pub use mqtt::{MqttSource, MqttSourceConfig};
pub use session::{SessionState, SessionTracker};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid source config: {0}")]
    Config(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("broker rejected connection: code {0}")]
    Rejected(u8),
    #[error("source error: {0}")]
    Source(String),
}

/// RawMessage 处理器。
///
/// 每条消息处理完成（含写入）后才会投递下一条。
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
///
/// `shutdown` 变为 `true` 后，源在两条消息之间停止并有序断开。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(
        &self,
        handler: Arc<dyn RawMessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError>;
}
