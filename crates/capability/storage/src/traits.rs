//! 存储接口 Trait 定义
//!
//! - PointStore：测点写入
//!
//! 设计原则：
//! - 每次调用写入一条测点，不做批量与缓冲
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::MeasurementPoint;

/// 测点存储接口
#[async_trait]
pub trait PointStore: Send + Sync {
    /// 写入单条测点
    async fn write_point(&self, point: &MeasurementPoint) -> Result<(), StorageError>;

    /// 释放连接；之后的写入返回 `StorageError::Closed`
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
