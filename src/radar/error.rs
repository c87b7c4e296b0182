//! 同步层错误类型
//!
//! 所有错误都只在编排层内部流转，最终只以“同步错误提示”的形式暴露给调用方。

use thiserror::Error;

/// 同步相关错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// 本地存储读写失败（总是被吞掉并记录日志）
    #[error("本地存储错误: {0}")]
    Storage(String),

    /// 缺少或无效的认证 token，任何网络请求之前就会被拦截
    #[error("未认证：缺少认证 token")]
    Unauthenticated,

    /// 网络层失败（连接失败、超时等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 服务器返回非 2xx 状态码
    #[error("HTTP 错误 {status}: {body}")]
    Http { status: u16, body: String },

    /// 数据格式损坏（本地 JSON 或服务器响应）
    #[error("数据格式错误: {0}")]
    MalformedData(String),
}

impl SyncError {
    /// 是否为认证错误（服务器 401 也视为认证错误）
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Unauthenticated | SyncError::Http { status: 401, .. })
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::MalformedData(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
