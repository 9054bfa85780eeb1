//! InfluxDB v2 写入实现

use crate::error::StorageError;
use crate::line_protocol::encode_point;
use crate::traits::PointStore;
use async_trait::async_trait;
use domain::MeasurementPoint;
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// 基于 HTTP `/api/v2/write` 的测点存储（同步写入，每次一条）
pub struct InfluxPointStore {
    client: Client,
    write_url: Url,
    authorization: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for InfluxPointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxPointStore")
            .field("write_url", &self.write_url.as_str())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl InfluxPointStore {
    pub(crate) fn new(client: Client, write_url: Url, authorization: String) -> Self {
        Self {
            client,
            write_url,
            authorization,
            closed: AtomicBool::new(false),
        }
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

#[async_trait]
impl PointStore for InfluxPointStore {
    async fn write_point(&self, point: &MeasurementPoint) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        let line = encode_point(point)?;
        debug!(target: "pmon.storage", line = %line, "influx_write");
        let response = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::status(status, &body));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(target: "pmon.storage", "influx_closed");
        }
        Ok(())
    }
}
