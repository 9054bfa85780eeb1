//! InfluxDB 连接管理
//!
//! 提供启动期连接与鉴权：
//! - connect_influx：校验 URL，ping 服务端，再用令牌查询组织完成鉴权
//!
//! 任一步失败都返回错误，由调用方按致命错误处理。

use crate::error::StorageError;
use crate::influx::InfluxPointStore;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::info;

/// InfluxDB 连接参数
#[derive(Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub connect_timeout: Duration,
}

impl InfluxConfig {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            org: org.into(),
            bucket: bucket.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// 令牌不进入 Debug 输出
impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// 建立到 InfluxDB 的长连接客户端
///
/// # 参数
/// - `config`：连接参数
///
/// # 返回
/// - `Result<InfluxPointStore, StorageError>`：已鉴权的写入器或错误
pub async fn connect_influx(config: InfluxConfig) -> Result<InfluxPointStore, StorageError> {
    let base = config.url.trim_end_matches('/').to_string();
    let ping_url = endpoint(&base, "/ping")?;
    let mut orgs_url = endpoint(&base, "/api/v2/orgs")?;
    orgs_url.query_pairs_mut().append_pair("org", &config.org);
    let mut write_url = endpoint(&base, "/api/v2/write")?;
    write_url
        .query_pairs_mut()
        .append_pair("org", &config.org)
        .append_pair("bucket", &config.bucket)
        .append_pair("precision", "ns");

    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()?;
    let authorization = format!("Token {}", config.token);

    let response = client.get(ping_url).send().await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::status(status, &body));
    }

    let response = client
        .get(orgs_url)
        .header(reqwest::header::AUTHORIZATION, &authorization)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::status(status, &body));
    }

    info!(
        target: "pmon.storage",
        url = %base,
        org = %config.org,
        bucket = %config.bucket,
        "influx_connected"
    );
    Ok(InfluxPointStore::new(client, write_url, authorization))
}

fn endpoint(base: &str, path: &str) -> Result<Url, StorageError> {
    Url::parse(&format!("{}{}", base, path))
        .map_err(|err| StorageError::Config(format!("{}: {}", base, err)))
}
