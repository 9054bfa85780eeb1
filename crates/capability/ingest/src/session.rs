use std::fmt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 传输会话状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Subscribed => "subscribed",
        }
    }

    /// 是否与 broker 保持着已确认的连接。
    pub fn is_online(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Subscribed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话状态跟踪：记录迁移日志与计数，并通过 watch 通道发布当前状态。
#[derive(Debug)]
pub struct SessionTracker {
    tx: watch::Sender<SessionState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Disconnected);
        Self { tx }
    }

    pub fn state(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn connecting(&self, host: &str, port: u16) {
        self.set(SessionState::Connecting);
        info!(target: "pmon.ingest", host = %host, port = port, "mqtt_connecting");
    }

    pub fn connected(&self, session_present: bool) {
        self.set(SessionState::Connected);
        pmon_telemetry::record_mqtt_connect();
        info!(target: "pmon.ingest", session_present = session_present, "mqtt_connected");
    }

    pub fn subscribed(&self, topic: &str, qos: u8) {
        self.set(SessionState::Subscribed);
        info!(target: "pmon.ingest", topic = %topic, qos = qos, "mqtt_subscribed");
    }

    /// 订阅未生效（请求未能入队或 SUBACK 返回失败），退回 `Connected`。
    pub fn subscription_lost(&self, topic: &str, reason: &str) {
        self.set(SessionState::Connected);
        error!(target: "pmon.ingest", topic = %topic, reason = %reason, "mqtt_subscribe_failed");
    }

    /// broker 以非零返回码拒绝连接。
    pub fn rejected(&self, code: u8) {
        self.set(SessionState::Disconnected);
        pmon_telemetry::record_mqtt_connect_rejected();
        error!(target: "pmon.ingest", code = code, "mqtt_connect_rejected");
    }

    /// 非本端发起的断开（传输错误或 broker 主动断开）。
    pub fn lost(&self, reason: &str) {
        let previous = self.set(SessionState::Disconnected);
        if previous.is_online() {
            pmon_telemetry::record_mqtt_disconnect();
            warn!(target: "pmon.ingest", reason = %reason, "mqtt_disconnected_unexpectedly");
        } else {
            warn!(target: "pmon.ingest", reason = %reason, "mqtt_connect_failed");
        }
    }

    /// 本端有序断开。
    pub fn closed(&self) {
        let previous = self.set(SessionState::Disconnected);
        if previous.is_online() {
            pmon_telemetry::record_mqtt_disconnect();
            info!(target: "pmon.ingest", "mqtt_disconnected");
        } else {
            debug!(target: "pmon.ingest", previous = %previous, "mqtt_closed");
        }
    }

    fn set(&self, next: SessionState) -> SessionState {
        self.tx.send_replace(next)
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.state(), SessionState::Disconnected);
    }

    #[test]
    fn happy_path_reaches_subscribed() {
        let tracker = SessionTracker::new();
        let rx = tracker.subscribe();
        tracker.connecting("localhost", 1883);
        assert_eq!(*rx.borrow(), SessionState::Connecting);
        tracker.connected(false);
        assert_eq!(*rx.borrow(), SessionState::Connected);
        tracker.subscribed("power_monitoring/#", 0);
        assert_eq!(*rx.borrow(), SessionState::Subscribed);
    }

    #[test]
    fn rejection_and_loss_return_to_disconnected() {
        let tracker = SessionTracker::new();
        tracker.connecting("localhost", 1883);
        tracker.rejected(5);
        assert_eq!(tracker.state(), SessionState::Disconnected);

        tracker.connecting("localhost", 1883);
        tracker.connected(true);
        tracker.subscribed("power_monitoring/#", 1);
        tracker.lost("connection reset");
        assert_eq!(tracker.state(), SessionState::Disconnected);
    }

    #[test]
    fn failed_subscription_falls_back_to_connected() {
        let tracker = SessionTracker::new();
        tracker.connecting("localhost", 1883);
        tracker.connected(false);
        tracker.subscribed("power_monitoring/#", 1);
        tracker.subscription_lost("power_monitoring/#", "suback failure");
        assert_eq!(tracker.state(), SessionState::Connected);
    }

    #[test]
    fn labels_are_lowercase() {
        assert_eq!(SessionState::Subscribed.to_string(), "subscribed");
        assert_eq!(SessionState::Disconnected.as_str(), "disconnected");
        assert!(SessionState::Connected.is_online());
        assert!(!SessionState::Connecting.is_online());
    }
}
