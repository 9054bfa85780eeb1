//! 存储层错误类型
//!
//! 定义统一的存储错误类型，用于封装底层错误：
//! - 配置错误（URL 无法解析）
//! - HTTP 传输错误
//! - InfluxDB 返回的非成功状态
//! - line protocol 编码错误

/// 错误响应体在错误信息中保留的最大长度。
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid sink config: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("sink returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("sink connection closed")]
    Closed,
    #[error("{0}")]
    Internal(String),
}

impl StorageError {
    pub fn status(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((index, _)) => format!("{}...", &body[..index]),
            None => body.to_string(),
        };
        Self::Status { status, body }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
