//! InfluxDB line protocol 编码
//!
//! 输出格式：`measurement,tag=value field=value timestamp_ns`
//! - 标签按键名排序，值为空的标签省略
//! - 字段按键名排序（FieldSet 本身有序）
//! - 浮点数使用最短往返格式
//! - 含换行、回车或制表符的名称无法无损表示，整条测点以 `Encode` 拒绝

use crate::error::StorageError;
use domain::{MeasurementPoint, TAG_MACHINE, TAG_PHASE};
use std::fmt::Write;

/// 将测点编码为一行 line protocol（不含换行）。
pub fn encode_point(point: &MeasurementPoint) -> Result<String, StorageError> {
    let mut line = String::new();
    escape_measurement(point.measurement(), &mut line)?;

    let mut tags = [(TAG_MACHINE, point.machine()), (TAG_PHASE, point.phase())];
    tags.sort_by_key(|(key, _)| *key);
    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        escape_key(key, &mut line)?;
        line.push('=');
        escape_key(value, &mut line)?;
    }

    if point.fields().is_empty() {
        return Err(StorageError::Encode("point has no fields".to_string()));
    }
    for (index, (name, value)) in point.fields().iter().enumerate() {
        if !value.is_finite() {
            return Err(StorageError::Encode(format!(
                "field {} is not finite: {}",
                name, value
            )));
        }
        line.push(if index == 0 { ' ' } else { ',' });
        escape_key(name, &mut line)?;
        // String 写入不会失败
        let _ = write!(line, "={}", value);
    }

    let _ = write!(line, " {}", point.timestamp_ns());
    Ok(line)
}

fn escape_measurement(value: &str, out: &mut String) -> Result<(), StorageError> {
    escape(value, out, false)
}

/// 标签键、标签值、字段键的转义规则相同。
fn escape_key(value: &str, out: &mut String) -> Result<(), StorageError> {
    escape(value, out, true)
}

fn escape(value: &str, out: &mut String, escape_equals: bool) -> Result<(), StorageError> {
    if value.contains(['\n', '\r', '\t']) {
        return Err(StorageError::Encode(format!(
            "line break or tab in name: {:?}",
            value
        )));
    }
    for ch in value.chars() {
        match ch {
            ',' | ' ' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '=' if escape_equals => out.push_str("\\="),
            _ => out.push(ch),
        }
    }
    Ok(())
}
