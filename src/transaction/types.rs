//! 事务管理类型定义
//!
//! 提供事务状态机所需的核心类型和结构

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::error::StoreError;
use crate::transaction::abort::AbortKind;

/// 事务ID，与存储层事务句柄的ID一致
pub type TransactionId = u64;

/// 事务状态
///
/// 每个会话在任一时刻恰好处于一个状态。`Committed` 与 `RolledBack` 为终态，
/// 下一条语句开始前会话会回到 `NoTxn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// 没有事务（初始状态）
    NoTxn,
    /// 事务已开启，可执行语句
    Open,
    /// 事务已中止，只接受 ROLLBACK
    Aborted,
    /// 已提交
    Committed,
    /// 已回滚
    RolledBack,
}

impl TransactionState {
    /// 检查是否可以执行语句
    pub fn can_execute(&self) -> bool {
        matches!(self, TransactionState::Open)
    }

    /// 检查是否已结束
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    /// 状态转换表
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        matches!(
            (self, next),
            (TransactionState::NoTxn, TransactionState::Open)
                | (TransactionState::Open, TransactionState::Committed)
                | (TransactionState::Open, TransactionState::Aborted)
                | (TransactionState::Open, TransactionState::RolledBack)
                | (TransactionState::Aborted, TransactionState::RolledBack)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::NoTxn => write!(f, "NoTxn"),
            TransactionState::Open => write!(f, "Open"),
            TransactionState::Aborted => write!(f, "Aborted"),
            TransactionState::Committed => write!(f, "Committed"),
            TransactionState::RolledBack => write!(f, "RolledBack"),
        }
    }
}

/// 事务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// 由客户端的 BEGIN / COMMIT / ROLLBACK 显式界定
    Explicit,
    /// 系统围绕单条语句自动开启和提交（autocommit）
    Implicit,
}

impl TransactionKind {
    pub fn is_explicit(&self) -> bool {
        matches!(self, TransactionKind::Explicit)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Explicit => write!(f, "explicit"),
            TransactionKind::Implicit => write!(f, "implicit"),
        }
    }
}

/// 状态机操作，用于报告非法转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionOp {
    BeginExplicit,
    BeginImplicit,
    Commit,
    Rollback,
    MarkAborted,
    Execute,
}

impl fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOp::BeginExplicit => write!(f, "BEGIN"),
            TransactionOp::BeginImplicit => write!(f, "implicit BEGIN"),
            TransactionOp::Commit => write!(f, "COMMIT"),
            TransactionOp::Rollback => write!(f, "ROLLBACK"),
            TransactionOp::MarkAborted => write!(f, "ABORT"),
            TransactionOp::Execute => write!(f, "statement execution"),
        }
    }
}

/// 事务错误类型
#[derive(Error, Debug, Clone)]
pub enum TransactionError {
    #[error("无效的事务状态: 无法在 {state} 状态下执行 {operation}")]
    InvalidState {
        operation: TransactionOp,
        state: TransactionState,
    },

    /// 存储层 begin/commit 失败，已经过中止分类
    #[error("{source}")]
    Store { kind: AbortKind, source: StoreError },
}

/// 事务操作结果类型别名
pub type TransactionResult<T> = Result<T, TransactionError>;

/// 事务信息（用于监控）
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub state: TransactionState,
    pub start_time: Instant,
    pub elapsed: Duration,
    pub statement_count: usize,
    pub abort_cause: Option<AbortKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use TransactionState::*;

        assert!(NoTxn.can_transition_to(Open));
        assert!(Open.can_transition_to(Committed));
        assert!(Open.can_transition_to(Aborted));
        assert!(Open.can_transition_to(RolledBack));
        assert!(Aborted.can_transition_to(RolledBack));

        assert!(!NoTxn.can_transition_to(Committed));
        assert!(!NoTxn.can_transition_to(RolledBack));
        assert!(!Aborted.can_transition_to(Committed));
        assert!(!Aborted.can_transition_to(Open));
        assert!(!Committed.can_transition_to(Open));
        assert!(!RolledBack.can_transition_to(Aborted));
    }

    #[test]
    fn test_state_predicates() {
        assert!(TransactionState::Open.can_execute());
        assert!(!TransactionState::Aborted.can_execute());
        assert!(!TransactionState::NoTxn.can_execute());

        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Aborted.is_terminal());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TransactionError::InvalidState {
            operation: TransactionOp::Commit,
            state: TransactionState::NoTxn,
        };
        assert!(err.to_string().contains("COMMIT"));
        assert!(err.to_string().contains("NoTxn"));
    }
}
