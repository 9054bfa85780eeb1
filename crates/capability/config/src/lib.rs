//! 桥接进程运行配置加载。

use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_qos: u8,
    pub mqtt_keep_alive_secs: u64,
    pub mqtt_reconnect: bool,
    pub mqtt_reconnect_delay_ms: u64,
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    /// 单次写入超时，0 表示不限制。
    pub influx_write_timeout_ms: u64,
    pub influx_write_max_retries: u32,
    pub influx_write_backoff_ms: u64,
    pub log_file: Option<PathBuf>,
    pub http_addr: Option<String>,
}

impl BridgeConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试中避免改写进程环境）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        // 令牌缺失必须在任何连接之前失败
        let influx_token = vars
            .optional("INFLUX_TOKEN")
            .ok_or_else(|| ConfigError::Missing("INFLUX_TOKEN".to_string()))?;

        let mqtt_host = vars.string_with_default("MQTT_BROKER", "localhost");
        let mqtt_port = vars.u16_with_default("MQTT_PORT", 1883)?;
        let mqtt_topic = vars.string_with_default("MQTT_TOPIC", "power_monitoring/#");
        let mqtt_client_id = vars.string_with_default("MQTT_CLIENT_ID", "influxdb_bridge");
        let mqtt_username = vars.optional("MQTT_USERNAME");
        let mqtt_password = vars.optional("MQTT_PASSWORD");
        let mqtt_qos = vars.u8_with_default("MQTT_QOS", 0)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let mqtt_keep_alive_secs = vars.u64_with_default("MQTT_KEEP_ALIVE_SECS", 60)?;
        let mqtt_reconnect = vars.bool_with_default("MQTT_RECONNECT", true);
        let mqtt_reconnect_delay_ms = vars.u64_with_default("MQTT_RECONNECT_DELAY_MS", 1000)?;
        let influx_url = vars.string_with_default("INFLUX_URL", "http://localhost:8086");
        let influx_org = vars.string_with_default("INFLUX_ORG", "DataImage");
        let influx_bucket = vars.string_with_default("INFLUX_BUCKET", "power_monitoring");
        let influx_write_timeout_ms = vars.u64_with_default("INFLUX_WRITE_TIMEOUT_MS", 5000)?;
        let influx_write_max_retries = vars.u32_with_default("INFLUX_WRITE_MAX_RETRIES", 0)?;
        let influx_write_backoff_ms = vars.u64_with_default("INFLUX_WRITE_BACKOFF_MS", 200)?;
        let log_file = vars.optional("BRIDGE_LOG_FILE").map(PathBuf::from);
        let http_addr = vars.optional("BRIDGE_HTTP_ADDR");

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_topic,
            mqtt_client_id,
            mqtt_username,
            mqtt_password,
            mqtt_qos,
            mqtt_keep_alive_secs,
            mqtt_reconnect,
            mqtt_reconnect_delay_ms,
            influx_url,
            influx_token,
            influx_org,
            influx_bucket,
            influx_write_timeout_ms,
            influx_write_max_retries,
            influx_write_backoff_ms,
            log_file,
            http_addr,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        match (self.lookup)(key) {
            Some(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    fn string_with_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn u8_with_default(&self, key: &str, default: u8) -> Result<u8, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(default),
        }
    }

    fn u16_with_default(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(default),
        }
    }

    fn u32_with_default(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(default),
        }
    }

    fn u64_with_default(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(default),
        }
    }

    fn bool_with_default(&self, key: &str, default: bool) -> bool {
        match self.optional(key) {
            Some(value) => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            ),
            None => default,
        }
    }
}
