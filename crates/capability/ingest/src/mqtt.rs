use crate::session::{SessionState, SessionTracker};
use crate::{IngestError, RawMessageHandler, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::RawMessage;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, Publish, QoS, SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// 有序断开时等待 DISCONNECT 发出的最长时间。
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);
/// 客户端请求通道容量。
const REQUEST_CAPACITY: usize = 10;

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// 订阅的 topic 过滤器，如 `power_monitoring/#`。
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
    pub keep_alive: Duration,
    /// 传输错误后是否继续轮询（由 rumqttc 重新建连）。
    pub reconnect: bool,
    pub reconnect_delay: Duration,
}

impl MqttSourceConfig {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: "influxdb_bridge".to_string(),
            topic: topic.into(),
            username: None,
            password: None,
            qos: 0,
            keep_alive: Duration::from_secs(60),
            reconnect: true,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// 构造 rumqttc 连接参数。QoS ≥ 1 时启用手动 ack。
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_manual_acks(self.qos > 0);
        if let (Some(username), Some(password)) = (self.username.as_ref(), self.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

/// MQTT 采集源。
#[derive(Debug)]
pub struct MqttSource {
    config: MqttSourceConfig,
    session: SessionTracker,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self {
            config,
            session: SessionTracker::new(),
        }
    }

    pub fn config(&self) -> &MqttSourceConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// 订阅会话状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// 订阅请求只用 `try_subscribe` 入队：轮询事件循环的一方不能等待请求通道。
    fn try_subscribe(&self, client: &AsyncClient, qos: QoS) -> bool {
        match client.try_subscribe(self.config.topic.clone(), qos) {
            Ok(()) => {
                self.session.subscribed(&self.config.topic, self.config.qos);
                true
            }
            Err(err) => {
                self.session.subscription_lost(&self.config.topic, &err.to_string());
                false
            }
        }
    }

    async fn on_publish(
        &self,
        client: &AsyncClient,
        handler: &Arc<dyn RawMessageHandler>,
        publish: Publish,
        received_at: DateTime<Utc>,
    ) {
        let message = RawMessage::new(publish.topic.clone(), publish.payload.to_vec(), received_at);
        // 处理器内部吞掉数据错误；此处只兜底记录
        if let Err(err) = handler.handle(message).await {
            warn!(target: "pmon.ingest", topic = %publish.topic, error = %err, "message_handler_failed");
        }
        // 处理完成后才 ack，进程中途退出时由 broker 重投
        if self.config.qos > 0 {
            if let Err(err) = client.ack(&publish).await {
                warn!(target: "pmon.ingest", topic = %publish.topic, error = %err, "mqtt_ack_failed");
            }
        }
    }

    /// 重连前等待；期间收到关闭信号时返回 `true`。
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => true,
            _ = tokio::time::sleep(self.config.reconnect_delay) => false,
        }
    }

    /// 驱动事件循环：维护会话状态，把收到的 PUBLISH 按到达顺序转交给 `consume`。
    ///
    /// 返回时 `eventloop` 随之释放，`consume` 中挂起的 ack 随即返回错误而不会永久阻塞。
    async fn drive(
        &self,
        client: AsyncClient,
        mut eventloop: EventLoop,
        qos: QoS,
        publishes: mpsc::UnboundedSender<(Publish, DateTime<Utc>)>,
        mut shutdown: watch::Receiver<bool>,
        mut consumer_done: oneshot::Receiver<()>,
    ) -> Result<(), IngestError> {
        let mut subscribe_pending = false;
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.session.connected(ack.session_present);
                        subscribe_pending = true;
                    } else {
                        self.session.rejected(connack_code(ack.code));
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        self.session
                            .subscription_lost(&self.config.topic, "broker returned suback failure");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    pmon_telemetry::record_message_received();
                    if publishes.send((publish, Utc::now())).is_err() {
                        debug!(target: "pmon.ingest", "message_consumer_stopped");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    subscribe_pending = false;
                    self.session.lost("broker sent disconnect");
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) => {
                    subscribe_pending = false;
                    let code = connack_code(code);
                    self.session.rejected(code);
                    if !self.config.reconnect {
                        return Err(IngestError::Rejected(code));
                    }
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                    self.session.connecting(&self.config.host, self.config.port);
                }
                Err(err) => {
                    subscribe_pending = false;
                    self.session.lost(&err.to_string());
                    if !self.config.reconnect {
                        return Err(IngestError::Source(err.to_string()));
                    }
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                    self.session.connecting(&self.config.host, self.config.port);
                }
            }

            // 入队失败时保持 Connected，在后续事件（至少是心跳）上重试
            if subscribe_pending && self.session.state() == SessionState::Connected {
                subscribe_pending = !self.try_subscribe(&client, qos);
            }
        }

        info!(target: "pmon.ingest", "mqtt_shutdown_requested");
        drop(publishes);
        // 等待正在处理的消息完成；期间继续轮询，把它的 ack 送出
        loop {
            tokio::select! {
                biased;
                _ = &mut consumer_done => break,
                event = eventloop.poll() => {
                    if let Err(err) = event {
                        self.session.lost(&err.to_string());
                        break;
                    }
                }
            }
        }
        self.disconnect(&client, &mut eventloop).await;
        Ok(())
    }

    /// 逐条处理消息：上一条处理并 ack 完成后才取下一条。
    async fn consume(
        &self,
        client: AsyncClient,
        handler: Arc<dyn RawMessageHandler>,
        mut publishes: mpsc::UnboundedReceiver<(Publish, DateTime<Utc>)>,
        mut shutdown: watch::Receiver<bool>,
        done: oneshot::Sender<()>,
    ) {
        loop {
            // 只在消息之间响应关闭信号；未处理的 QoS ≥ 1 消息未 ack，由 broker 重投
            let (publish, received_at) = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                next = publishes.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };
            self.on_publish(&client, &handler, publish, received_at).await;
        }
        let _ = done.send(());
    }

    async fn disconnect(&self, client: &AsyncClient, eventloop: &mut EventLoop) {
        if !self.session.state().is_online() {
            self.session.closed();
            return;
        }
        if let Err(err) = client.try_disconnect() {
            warn!(target: "pmon.ingest", error = %err, "mqtt_disconnect_failed");
        }
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            warn!(target: "pmon.ingest", "mqtt_disconnect_flush_timeout");
        }
        self.session.closed();
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(
        &self,
        handler: Arc<dyn RawMessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        let qos = qos_from_u8(self.config.qos)?;
        let (client, eventloop) = AsyncClient::new(self.config.mqtt_options(), REQUEST_CAPACITY);
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        self.session.connecting(&self.config.host, self.config.port);

        // 事件循环与消息处理并发推进：处理器等待 ack 入队时事件循环仍在排空请求通道
        let (result, ()) = tokio::join!(
            self.drive(client.clone(), eventloop, qos, publish_tx, shutdown.clone(), done_rx),
            self.consume(client, handler, publish_rx, shutdown, done_tx),
        );
        result
    }
}

/// 等待关闭信号；发送端丢弃后永不返回。
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn qos_from_u8(value: u8) -> Result<QoS, IngestError> {
    match value {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(IngestError::Config(format!("unsupported qos: {}", other))),
    }
}

/// MQTT 3.1.1 CONNACK 返回码。
pub fn connack_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}
