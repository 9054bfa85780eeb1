//! topic 解析：`<namespace>/<machine>[/<phase>]`。

use domain::DEFAULT_PHASE;

/// topic 分隔符。
pub const TOPIC_DELIMITER: char = '/';

/// topic 段数不足。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic format: {0}")]
pub struct TopicError(pub String);

/// 从 topic 中提取的标识。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicIds {
    pub machine: String,
    pub phase: String,
}

/// 拆分 topic；第一段为命名空间，不做校验。
pub fn parse_topic(topic: &str) -> Result<TopicIds, TopicError> {
    let mut segments = topic.split(TOPIC_DELIMITER);
    let _namespace = segments.next();
    let machine = segments
        .next()
        .ok_or_else(|| TopicError(topic.to_string()))?;
    let phase = segments.next().unwrap_or(DEFAULT_PHASE);
    Ok(TopicIds {
        machine: machine.to_string(),
        phase: phase.to_string(),
    })
}
