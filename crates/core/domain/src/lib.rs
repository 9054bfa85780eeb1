pub mod data;

pub use data::{FieldSet, MeasurementPoint, PointError, RawMessage};

/// 写入时序库的 measurement 名称。
pub const MEASUREMENT_NAME: &str = "equipment_power_usage";

/// topic 缺少第三段时使用的 phase 取值。
pub const DEFAULT_PHASE: &str = "total";

/// 设备标签名。
pub const TAG_MACHINE: &str = "machine";

/// 相位标签名。
pub const TAG_PHASE: &str = "phase";
