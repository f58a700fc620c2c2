//! 语句执行错误类型
//!
//! 由执行协作者返回，分发器只关心它是否为冲突中止

use thiserror::Error;

use crate::core::error::codes::{ErrorCode, ToPublicError};
use crate::core::error::storage::StoreError;

/// 语句执行结果类型别名
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// 单条语句执行失败的原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("对象不存在: {0}")]
    ObjectNotFound(String),

    #[error("对象已存在: {0}")]
    ObjectAlreadyExists(String),

    #[error("约束冲突: {0}")]
    ConstraintViolation(String),

    #[error("类型错误: {0}")]
    TypeError(String),

    #[error("不支持的语句: {0}")]
    Unsupported(String),
}

impl ToPublicError for ExecutionError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            ExecutionError::Store(se) => se.to_error_code(),
            ExecutionError::ObjectNotFound(_) => ErrorCode::ResourceNotFound,
            ExecutionError::ObjectAlreadyExists(_) => ErrorCode::ResourceAlreadyExists,
            ExecutionError::ConstraintViolation(_) => ErrorCode::ConstraintViolation,
            ExecutionError::TypeError(_) => ErrorCode::TypeError,
            ExecutionError::Unsupported(_) => ErrorCode::UnsupportedStatement,
        }
    }

    fn to_public_message(&self) -> String {
        self.to_string()
    }
}
