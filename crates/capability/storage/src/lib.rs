//! # pmon Storage 模块
//!
//! 时序库写入抽象与 InfluxDB v2 实现。
//!
//! ## 模块说明
//!
//! - [`traits`]：`PointStore` 写入接口（每次一条测点，不缓冲）
//! - [`error`]：存储错误类型定义
//! - [`connection`]：启动期连接与鉴权（`connect_influx`）
//! - [`influx`]：基于 HTTP 的 InfluxDB 写入实现
//! - [`line_protocol`]：测点 -> line protocol 编码
//! - [`in_memory`]：内存实现（用于测试）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use pmon_storage::{InfluxConfig, PointStore, connect_influx};
//!
//! let store = connect_influx(InfluxConfig::new(
//!     "http://localhost:8086",
//!     "token",
//!     "DataImage",
//!     "power_monitoring",
//! ))
//! .await?;
//! store.write_point(&point).await?;
//! store.close().await?;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod influx;
pub mod line_protocol;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use in_memory::InMemoryPointStore;
pub use influx::InfluxPointStore;
pub use line_protocol::encode_point;
pub use traits::*;
