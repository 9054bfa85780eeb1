//! 测点组装。

use crate::fields::MappedFields;
use crate::topic::TopicIds;
use chrono::{DateTime, Utc};
use domain::{MeasurementPoint, PointError};

/// 由 topic 标识、有效字段和时间戳组装测点；字段为空时返回 `EmptyFields`。
pub fn build_point(
    ids: TopicIds,
    mapped: MappedFields,
    timestamp: DateTime<Utc>,
) -> Result<MeasurementPoint, PointError> {
    MeasurementPoint::new(ids.machine, ids.phase, mapped.fields, timestamp)
}
