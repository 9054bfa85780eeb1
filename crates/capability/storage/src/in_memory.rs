//! 测点内存实现
//!
//! 仅用于本地测试和占位。

use crate::error::StorageError;
use crate::traits::PointStore;
use domain::MeasurementPoint;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// 测点内存存储
pub struct InMemoryPointStore {
    points: RwLock<Vec<MeasurementPoint>>,
    closed: AtomicBool,
}

impl InMemoryPointStore {
    /// 创建新的测点存储
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 获取当前累计的测点数量（用于测试）
    pub fn len(&self) -> usize {
        self.points.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按写入顺序返回全部测点（用于测试）
    pub fn points(&self) -> Vec<MeasurementPoint> {
        self.points.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for InMemoryPointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PointStore for InMemoryPointStore {
    async fn write_point(&self, point: &MeasurementPoint) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        let mut points = self
            .points
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        points.push(point.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
