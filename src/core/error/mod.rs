//! 统一错误处理系统
//!
//! ## 设计理念
//!
//! 1. **分层枚举**：存储、执行、事务、会话各自使用 `thiserror` 枚举，
//!    最终汇聚为对调用方可见的 `DBError`
//!
//! 2. **中止分类**：执行失败先经过中止分类器，冲突中止以 `ConflictAbort`
//!    暴露（可重试），其余以 `Failure` 暴露，原始错误原样保留
//!
//! 3. **统一接口**：`DBResult<T>` 提供统一的返回类型，简化错误传播

use thiserror::Error;

pub mod codes;
pub mod execution;
pub mod session;
pub mod storage;

pub use codes::{ErrorCategory, ErrorCode, PublicError, ToPublicError};
pub use execution::{ExecutionError, ExecutionResult};
pub use session::{SessionError, SessionResult};
pub use storage::{StoreError, StoreResult};

use crate::transaction::{AbortKind, TransactionError, TransactionOp, TransactionState};

/// 调用方可见的错误类型
#[derive(Error, Debug, Clone)]
pub enum DBError {
    /// 批次无法解析，不会到达分类器，不影响任何计数器
    #[error("语法解析错误: {0}")]
    Parse(String),

    /// 非法的状态转换，对当前批次是致命的
    #[error("无效的事务状态: 无法在 {state} 状态下执行 {operation}")]
    InvalidTransactionState {
        operation: TransactionOp,
        state: TransactionState,
    },

    /// 存储检测到写冲突，调用方应重试整个事务
    #[error("{0}")]
    ConflictAbort(String),

    #[error("{0}")]
    Failure(ExecutionError),

    #[error("语句已取消")]
    Cancelled,

    #[error("会话错误: {0}")]
    Session(#[from] SessionError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的结果类型
pub type DBResult<T> = Result<T, DBError>;

impl DBError {
    /// 根据中止分类结果包装执行错误
    pub fn from_execution(err: ExecutionError, kind: AbortKind) -> Self {
        match kind {
            AbortKind::ConflictAbort => DBError::ConflictAbort(err.to_string()),
            AbortKind::OtherFailure => DBError::Failure(err),
        }
    }

    /// 调用方是否应当重试整个事务
    pub fn is_retryable(&self) -> bool {
        matches!(self, DBError::ConflictAbort(_))
    }
}

impl From<TransactionError> for DBError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InvalidState { operation, state } => {
                DBError::InvalidTransactionState { operation, state }
            }
            TransactionError::Store { kind, source } => {
                DBError::from_execution(ExecutionError::Store(source), kind)
            }
        }
    }
}

impl ToPublicError for DBError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            DBError::Parse(_) => ErrorCode::ParseError,
            DBError::InvalidTransactionState { .. } => ErrorCode::InvalidTransactionState,
            DBError::ConflictAbort(_) => ErrorCode::Conflict,
            DBError::Failure(e) => e.to_error_code(),
            DBError::Cancelled => ErrorCode::Cancelled,
            DBError::Session(e) => e.to_error_code(),
            DBError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn to_public_message(&self) -> String {
        match self {
            DBError::Internal(_) => ErrorCode::InternalError.default_message().to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_surfaced_as_retryable() {
        let err = DBError::from_execution(
            ExecutionError::Store(StoreError::Conflict { key: "t/k".to_string() }),
            AbortKind::ConflictAbort,
        );
        assert!(err.is_retryable());
        assert_eq!(err.to_error_code(), ErrorCode::Conflict);
        assert!(err.to_string().contains("aborted"));
    }

    #[test]
    fn test_other_failure_keeps_original_error() {
        let err = DBError::from_execution(
            ExecutionError::ObjectNotFound("i_do.not_exist".to_string()),
            AbortKind::OtherFailure,
        );
        assert!(!err.is_retryable());
        assert!(matches!(err, DBError::Failure(ExecutionError::ObjectNotFound(_))));
        assert_eq!(err.to_error_code(), ErrorCode::ResourceNotFound);
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err: DBError = TransactionError::InvalidState {
            operation: TransactionOp::Commit,
            state: TransactionState::NoTxn,
        }
        .into();
        assert!(matches!(
            err,
            DBError::InvalidTransactionState {
                operation: TransactionOp::Commit,
                state: TransactionState::NoTxn
            }
        ));

        let err: DBError = TransactionError::Store {
            kind: AbortKind::ConflictAbort,
            source: StoreError::Conflict { key: "k".to_string() },
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_internal_message_is_filtered() {
        let err = DBError::Internal("lock poisoned at 0xdeadbeef".to_string());
        let public = err.to_public_error();
        assert_eq!(public.code, ErrorCode::InternalError);
        assert!(!public.message.contains("0xdeadbeef"));
    }
}
