use async_trait::async_trait;
use domain::MeasurementPoint;
use pmon_storage::PointStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// 写入结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// 实际尝试次数（含首次）。
    pub attempts: u32,
    pub latency: Duration,
}

/// Pipeline 处理错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("writer error: {0}")]
    Writer(String),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Pipeline 参数。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 单次写入超时；`None` 表示不限制。
    pub write_timeout: Option<Duration>,
    /// 失败后的额外尝试次数，0 表示失败即丢弃。
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_secs(5)),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl PipelineConfig {
    fn sanitized(mut self) -> Self {
        if self.write_timeout == Some(Duration::ZERO) {
            self.write_timeout = None;
        }
        self
    }
}

/// 测点写入器抽象。
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write(&self, point: &MeasurementPoint) -> Result<(), PipelineError>;
}

/// Pipeline 入口：逐条写入，不缓冲、不批量。
///
/// 调用方 await `handle` 完成后才处理下一条消息，写入顺序与接收顺序一致。
#[derive(Clone)]
pub struct Pipeline {
    writer: Arc<dyn PointWriter>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(writer: Arc<dyn PointWriter>) -> Self {
        Self::with_config(writer, PipelineConfig::default())
    }

    pub fn with_config(writer: Arc<dyn PointWriter>, config: PipelineConfig) -> Self {
        Self {
            writer,
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 写入一条测点；重试耗尽后返回最后一次错误，测点即被丢弃。
    pub async fn handle(&self, point: &MeasurementPoint) -> Result<WriteResult, PipelineError> {
        let started_at = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.write_once(point).await {
                Ok(()) => {
                    return Ok(WriteResult {
                        attempts: attempt,
                        latency: started_at.elapsed(),
                    });
                }
                Err(err) => {
                    if attempt > self.config.max_retries {
                        return Err(err);
                    }
                    warn!(
                        target: "pmon.pipeline",
                        machine = %point.machine(),
                        phase = %point.phase(),
                        attempt = attempt,
                        error = %err,
                        "write_retry"
                    );
                    if !self.config.retry_backoff.is_zero() {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
    }

    async fn write_once(&self, point: &MeasurementPoint) -> Result<(), PipelineError> {
        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.writer.write(point))
                .await
                .map_err(|_| PipelineError::Timeout(limit))?,
            None => self.writer.write(point).await,
        }
    }
}

/// 基于存储层的写入器。
#[derive(Clone)]
pub struct StoragePointWriter {
    store: Arc<dyn PointStore>,
}

impl StoragePointWriter {
    pub fn new(store: Arc<dyn PointStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PointWriter for StoragePointWriter {
    async fn write(&self, point: &MeasurementPoint) -> Result<(), PipelineError> {
        self.store
            .write_point(point)
            .await
            .map_err(|err| PipelineError::Writer(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::FieldSet;
    use pmon_storage::InMemoryPointStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FlakyWriter {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PointWriter for FlakyWriter {
        async fn write(&self, _point: &MeasurementPoint) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(PipelineError::Writer("forced failure".to_string()));
            }
            Ok(())
        }
    }

    struct SlowWriter(Duration);

    #[async_trait]
    impl PointWriter for SlowWriter {
        async fn write(&self, _point: &MeasurementPoint) -> Result<(), PipelineError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    fn sample_point() -> MeasurementPoint {
        let mut fields = FieldSet::new();
        fields.insert("current".to_string(), 1.0);
        MeasurementPoint::new("press1", "total", fields, Utc::now()).expect("point")
    }

    fn config(max_retries: u32, write_timeout: Option<Duration>) -> PipelineConfig {
        PipelineConfig {
            write_timeout,
            max_retries,
            retry_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn pipeline_writes_through_storage() {
        let store = Arc::new(InMemoryPointStore::new());
        let pipeline = Pipeline::new(Arc::new(StoragePointWriter::new(store.clone())));
        let result = pipeline.handle(&sample_point()).await.expect("written");
        assert_eq!(result.attempts, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn pipeline_drops_on_failure_without_retry() {
        let writer = Arc::new(FlakyWriter {
            failures_left: AtomicU32::new(1),
            ..Default::default()
        });
        let pipeline = Pipeline::with_config(writer.clone(), config(0, None));
        let err = pipeline.handle(&sample_point()).await.expect_err("failure");
        assert_eq!(err, PipelineError::Writer("forced failure".to_string()));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pipeline_retries_when_configured() {
        let writer = Arc::new(FlakyWriter {
            failures_left: AtomicU32::new(2),
            ..Default::default()
        });
        let pipeline = Pipeline::with_config(writer.clone(), config(2, None));
        let result = pipeline.handle(&sample_point()).await.expect("written");
        assert_eq!(result.attempts, 3);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn pipeline_times_out_slow_writes() {
        let limit = Duration::from_millis(20);
        let pipeline = Pipeline::with_config(
            Arc::new(SlowWriter(Duration::from_millis(500))),
            config(0, Some(limit)),
        );
        let err = pipeline.handle(&sample_point()).await.expect_err("timeout");
        assert_eq!(err, PipelineError::Timeout(limit));
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let pipeline = Pipeline::with_config(
            Arc::new(SlowWriter(Duration::ZERO)),
            config(0, Some(Duration::ZERO)),
        );
        assert_eq!(pipeline.config().write_timeout, None);
    }

    #[tokio::test]
    async fn closed_store_maps_to_writer_error() {
        let store = Arc::new(InMemoryPointStore::new());
        store.close().await.expect("close");
        let pipeline = Pipeline::new(Arc::new(StoragePointWriter::new(store)));
        let err = pipeline.handle(&sample_point()).await.expect_err("closed");
        assert_eq!(err, PipelineError::Writer("sink connection closed".to_string()));
    }
}
