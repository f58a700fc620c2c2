//! 冲突/中止分类器
//!
//! 把存储或执行协作者返回的错误归为冲突中止或其他失败。
//! 两者都会让所属事务进入 `Aborted`，计数效果相同，只有暴露给调用方的错误不同

use serde::{Deserialize, Serialize};

use crate::core::error::{ExecutionError, StoreError};

/// 中止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortKind {
    /// 存储检测到同一键上的并发写冲突，可重试
    ConflictAbort,
    /// 约束、对象缺失、类型、不支持的语句、IO 等失败
    OtherFailure,
}

/// 中止分类器
pub struct AbortClassifier;

impl AbortClassifier {
    /// 对执行协作者返回的错误分类
    pub fn classify(err: &ExecutionError) -> AbortKind {
        match err {
            ExecutionError::Store(se) => Self::classify_store(se),
            ExecutionError::ObjectNotFound(_)
            | ExecutionError::ObjectAlreadyExists(_)
            | ExecutionError::ConstraintViolation(_)
            | ExecutionError::TypeError(_)
            | ExecutionError::Unsupported(_) => AbortKind::OtherFailure,
        }
    }

    /// 对存储层 begin/commit/rollback 返回的错误分类
    pub fn classify_store(err: &StoreError) -> AbortKind {
        match err {
            StoreError::Conflict { .. } => AbortKind::ConflictAbort,
            StoreError::TransactionNotFound(_) | StoreError::Other(_) => AbortKind::OtherFailure,
        }
    }
}
