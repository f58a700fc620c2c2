//! 存储层错误类型
//!
//! 底层事务存储的错误通道是一个封闭的和类型，冲突中止与其他失败在类型上即可区分

use thiserror::Error;

use crate::core::error::codes::{ErrorCode, ToPublicError};

/// 存储操作结果类型别名
pub type StoreResult<T> = Result<T, StoreError>;

/// 事务存储返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 并发事务对同一键的写入冲突（乐观并发控制中止）
    #[error("事务已中止 (aborted): 键 {key} 存在并发写冲突")]
    Conflict { key: String },

    #[error("存储事务不存在: {0}")]
    TransactionNotFound(u64),

    #[error("存储错误: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl ToPublicError for StoreError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            StoreError::Conflict { .. } => ErrorCode::Conflict,
            StoreError::TransactionNotFound(_) => ErrorCode::InternalError,
            StoreError::Other(_) => ErrorCode::ExecutionError,
        }
    }

    fn to_public_message(&self) -> String {
        self.to_string()
    }
}
