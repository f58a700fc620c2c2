//! 事务上下文
//!
//! 管理单个事务的状态和存储句柄。上下文只属于一个会话，不会被其他会话访问，
//! 因此不需要加锁

use std::time::Instant;

use crate::storage::TxnHandle;
use crate::transaction::abort::AbortKind;
use crate::transaction::types::*;

/// 事务上下文
#[derive(Debug)]
pub struct TransactionContext {
    /// 事务ID
    pub id: TransactionId,
    /// 显式或隐式
    pub kind: TransactionKind,
    /// 当前状态
    state: TransactionState,
    /// 存储事务句柄，提交、回滚或中止后被取走
    handle: Option<TxnHandle>,
    /// 进入 Aborted 的原因
    abort_cause: Option<AbortKind>,
    /// 开始时间
    pub start_time: Instant,
    /// 已尝试执行的语句数
    statement_count: usize,
}

impl TransactionContext {
    /// 基于已开启的存储事务创建上下文，初始状态为 Open
    pub fn new(kind: TransactionKind, handle: TxnHandle) -> Self {
        Self {
            id: handle.id,
            kind,
            state: TransactionState::Open,
            handle: Some(handle),
            abort_cause: None,
            start_time: Instant::now(),
            statement_count: 0,
        }
    }

    /// 获取当前状态
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn handle(&self) -> Option<&TxnHandle> {
        self.handle.as_ref()
    }

    /// 取出存储句柄（用于提交或回滚）
    pub fn take_handle(&mut self) -> Option<TxnHandle> {
        self.handle.take()
    }

    pub fn abort_cause(&self) -> Option<AbortKind> {
        self.abort_cause
    }

    /// 状态转换
    pub fn transition_to(
        &mut self,
        new_state: TransactionState,
        operation: TransactionOp,
    ) -> TransactionResult<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(TransactionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        self.state = new_state;
        Ok(())
    }

    /// 标记为中止并记录原因
    pub fn abort(&mut self, cause: AbortKind) -> TransactionResult<()> {
        self.transition_to(TransactionState::Aborted, TransactionOp::MarkAborted)?;
        self.abort_cause = Some(cause);
        Ok(())
    }

    pub fn record_statement(&mut self) {
        self.statement_count += 1;
    }

    pub fn statement_count(&self) -> usize {
        self.statement_count
    }

    /// 获取事务信息
    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id,
            kind: self.kind,
            state: self.state,
            start_time: self.start_time,
            elapsed: self.start_time.elapsed(),
            statement_count: self.statement_count,
            abort_cause: self.abort_cause,
        }
    }
}
