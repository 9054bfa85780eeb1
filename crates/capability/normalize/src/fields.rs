//! 字段映射与数值校验。

use crate::payload::{DecodedPayload, json_kind, payload_preview};
use domain::FieldSet;
use pmon_telemetry::record_invalid_field_value;
use serde_json::Value;
use tracing::warn;

/// 报文字段名 -> 时序库规范字段名。
///
/// 按表顺序处理；`power` 与 `power_real` 同时出现时以 `power_real` 为准。
pub const FIELD_MAPPINGS: [(&str, &str); 9] = [
    ("current", "current"),
    ("voltage", "voltage"),
    ("power", "power_real"),
    ("power_real", "power_real"),
    ("power_apparent", "power_apparent"),
    ("power_reactive", "power_reactive"),
    ("frequency", "frequency"),
    ("power_factor", "power_factor"),
    ("energy", "energy"),
];

/// 字段映射错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("no valid fields in message")]
    NoValidFields,
}

/// 单个值无法转换为数值。`value` 已按日志上限截断。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value is not numeric ({kind}): {value}")]
pub struct CoerceError {
    pub kind: &'static str,
    pub value: String,
}

/// 映射结果。
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFields {
    pub fields: FieldSet,
    /// 成功转换的来源字段数（`power` 与 `power_real` 各计一次）。
    pub added: usize,
}

/// 将数值或数值字符串转换为有限 f64。
pub fn coerce_number(value: &Value) -> Result<f64, CoerceError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(number) if number.is_finite() => Ok(number),
        _ => Err(CoerceError {
            kind: json_kind(value),
            value: payload_preview(value.to_string().as_bytes()),
        }),
    }
}

/// 按映射表提取字段；非法值记录告警后跳过，全部无效时返回 `NoValidFields`。
pub fn map_fields(payload: &DecodedPayload) -> Result<MappedFields, FieldError> {
    let mut fields = FieldSet::new();
    let mut added = 0;
    for (source, canonical) in FIELD_MAPPINGS {
        let Some(value) = payload.get(source) else {
            continue;
        };
        match coerce_number(value) {
            Ok(number) => {
                fields.insert(canonical.to_string(), number);
                added += 1;
            }
            Err(err) => {
                record_invalid_field_value();
                warn!(
                    target: "pmon.normalize",
                    field = source,
                    value = %err.value,
                    kind = err.kind,
                    "invalid_field_value"
                );
            }
        }
    }
    if fields.is_empty() {
        return Err(FieldError::NoValidFields);
    }
    Ok(MappedFields { fields, added })
}
