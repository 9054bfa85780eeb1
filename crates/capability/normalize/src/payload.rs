//! 报文解码：UTF-8 文本承载的 JSON 对象。

use serde_json::{Map, Value};

/// 日志中保留的报文最大字节数。
pub const MAX_PAYLOAD_PREVIEW: usize = 256;

/// 报文解码错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid utf-8: {0}")]
    Utf8(String),
    #[error("payload is not valid json: {0}")]
    Json(String),
    #[error("payload is not a json object (got {0})")]
    NotAnObject(&'static str),
}

/// 解码后的报文：字段名 -> 值。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    entries: Map<String, Value>,
}

impl DecodedPayload {
    /// 字段存在（包括值为 null）时返回 `Some`。
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Map<String, Value>> for DecodedPayload {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

/// 解码原始报文。
pub fn decode_payload(payload: &[u8]) -> Result<DecodedPayload, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|err| DecodeError::Utf8(err.to_string()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|err| DecodeError::Json(err.to_string()))?;
    match value {
        Value::Object(entries) => Ok(DecodedPayload { entries }),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// 截断后的报文文本，用于日志。
pub fn payload_preview(payload: &[u8]) -> String {
    if payload.len() <= MAX_PAYLOAD_PREVIEW {
        return String::from_utf8_lossy(payload).into_owned();
    }
    format!(
        "{}...({} bytes)",
        String::from_utf8_lossy(&payload[..MAX_PAYLOAD_PREVIEW]),
        payload.len()
    )
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
