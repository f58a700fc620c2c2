//! 客户端连接会话
//!
//! 一个会话同一时刻只被一个调用方使用（由会话管理器加锁保证），
//! 唯一跨线程共享的部分是取消标志

use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_utils::atomic::AtomicCell;

use crate::storage::TxnHandle;
use crate::transaction::{slot_state, TransactionContext, TransactionInfo, TransactionSlot, TransactionState};

/// 会话ID
pub type SessionId = u64;

/// 取消句柄，可以在会话被锁住执行批次时从其他线程设置
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicCell<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load()
    }

    /// 读取并清除取消请求
    fn take(&self) -> bool {
        self.flag.swap(false)
    }
}

/// 连接会话
#[derive(Debug)]
pub struct ConnectionSession {
    id: SessionId,
    autocommit: bool,
    transaction: TransactionSlot,
    cancel: CancelHandle,
    created_at: SystemTime,
    closed: bool,
}

impl ConnectionSession {
    pub fn new(id: SessionId, autocommit: bool) -> Self {
        Self {
            id,
            autocommit,
            transaction: None,
            cancel: CancelHandle::default(),
            created_at: SystemTime::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// 关闭 autocommit 后，事务外的语句会开启显式事务
    pub fn set_autocommit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// 当前事务状态
    pub fn transaction_state(&self) -> TransactionState {
        slot_state(&self.transaction)
    }

    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }

    pub fn transaction_info(&self) -> Option<TransactionInfo> {
        self.transaction.as_ref().map(|ctx| ctx.info())
    }

    /// 事务槽位，交给事务管理器驱动状态机
    pub(crate) fn transaction_slot(&mut self) -> &mut TransactionSlot {
        &mut self.transaction
    }

    /// 当前事务的存储句柄
    pub fn transaction_handle(&self) -> Option<TxnHandle> {
        self.transaction.as_ref().and_then(|ctx| ctx.handle().copied())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub(crate) fn take_cancel_request(&self) -> bool {
        self.cancel.take()
    }

    /// 会话已从管理器移除，之后的批次一律拒绝
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_no_transaction() {
        let session = ConnectionSession::new(7, true);
        assert_eq!(session.id(), 7);
        assert!(session.autocommit());
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
        assert!(session.transaction_handle().is_none());
        assert!(session.transaction_info().is_none());
        assert!(!session.is_closed());
    }

    #[test]
    fn test_cancel_request_is_consumed_once() {
        let session = ConnectionSession::new(1, true);
        let handle = session.cancel_handle();

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(session.take_cancel_request());
        assert!(!session.take_cancel_request());
        assert!(!handle.is_cancelled());
    }
}
