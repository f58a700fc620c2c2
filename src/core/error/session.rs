//! 会话错误类型
//!
//! 涵盖会话管理相关的错误

use thiserror::Error;

use crate::core::error::codes::{ErrorCode, ToPublicError};

/// 会话操作结果类型别名
pub type SessionResult<T> = Result<T, SessionError>;

/// 会话相关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("会话不存在: {0}")]
    SessionNotFound(u64),

    #[error("超过最大会话数限制: {0}")]
    MaxSessionsExceeded(usize),
}

impl ToPublicError for SessionError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            SessionError::SessionNotFound(_) => ErrorCode::ResourceNotFound,
            SessionError::MaxSessionsExceeded(_) => ErrorCode::ResourceExhausted,
        }
    }

    fn to_public_message(&self) -> String {
        self.to_string()
    }
}
