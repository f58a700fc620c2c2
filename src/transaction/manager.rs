//! 事务管理器
//!
//! 驱动会话级事务状态机，并且是事务计数器的唯一写入者。
//! 管理器本身不保存事务：每个会话持有自己的事务槽位（`Option<TransactionContext>`），
//! 调用时以可变引用传入

use std::sync::Arc;

use log::{debug, info, warn};

use crate::core::error::StoreError;
use crate::services::{MetricName, MetricsRegistry};
use crate::storage::TransactionalStore;
use crate::transaction::abort::{AbortClassifier, AbortKind};
use crate::transaction::context::TransactionContext;
use crate::transaction::types::*;

/// 会话的事务槽位
pub type TransactionSlot = Option<TransactionContext>;

/// 读取槽位中的事务状态，空槽位为 `NoTxn`
pub fn slot_state(slot: &TransactionSlot) -> TransactionState {
    slot.as_ref()
        .map(|ctx| ctx.state())
        .unwrap_or(TransactionState::NoTxn)
}

/// 事务管理器
pub struct TransactionManager {
    store: Arc<dyn TransactionalStore>,
    metrics: Arc<MetricsRegistry>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn TransactionalStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { store, metrics }
    }

    /// 清掉已结束（Committed / RolledBack）的事务，会话回到 `NoTxn`
    pub fn clear_finished(&self, slot: &mut TransactionSlot) {
        if slot_state(slot).is_terminal() {
            *slot = None;
        }
    }

    /// 显式 BEGIN
    pub fn begin_explicit(&self, slot: &mut TransactionSlot) -> TransactionResult<TransactionId> {
        self.begin(slot, TransactionKind::Explicit)
    }

    /// 为单条语句开启隐式事务，不影响事务计数器
    pub fn begin_implicit(&self, slot: &mut TransactionSlot) -> TransactionResult<TransactionId> {
        self.begin(slot, TransactionKind::Implicit)
    }

    fn begin(&self, slot: &mut TransactionSlot, kind: TransactionKind) -> TransactionResult<TransactionId> {
        self.clear_finished(slot);
        let state = slot_state(slot);
        if !state.can_transition_to(TransactionState::Open) {
            let operation = match kind {
                TransactionKind::Explicit => TransactionOp::BeginExplicit,
                TransactionKind::Implicit => TransactionOp::BeginImplicit,
            };
            return Err(TransactionError::InvalidState { operation, state });
        }

        let handle = self.store.begin().map_err(store_error)?;
        let ctx = TransactionContext::new(kind, handle);
        let txn_id = ctx.id;
        *slot = Some(ctx);

        if kind.is_explicit() {
            self.metrics.increment_metric(MetricName::TxnBegin);
            info!("Transaction {} started (explicit)", txn_id);
        } else {
            debug!("Transaction {} started (implicit)", txn_id);
        }
        Ok(txn_id)
    }

    /// 提交
    ///
    /// 存储提交失败时事务进入 `Aborted`（显式事务计一次中止），并返回已分类的存储错误
    pub fn commit(&self, slot: &mut TransactionSlot) -> TransactionResult<()> {
        let ctx = open_context(slot, TransactionOp::Commit)?;
        let handle = ctx.take_handle().ok_or_else(|| missing_handle(ctx.id))?;

        match self.store.commit(handle) {
            Ok(()) => {
                ctx.transition_to(TransactionState::Committed, TransactionOp::Commit)?;
                if ctx.kind.is_explicit() {
                    self.metrics.increment_metric(MetricName::TxnCommit);
                    info!(
                        "Transaction {} committed after {} statement(s)",
                        ctx.id,
                        ctx.statement_count()
                    );
                } else {
                    debug!("Transaction {} committed (implicit)", ctx.id);
                }
                Ok(())
            }
            Err(source) => {
                // 存储在提交失败时已经丢弃了写集
                let kind = AbortClassifier::classify_store(&source);
                warn!("Transaction {} commit failed: {}", ctx.id, source);
                self.record_abort(ctx, kind)?;
                Err(TransactionError::Store { kind, source })
            }
        }
    }

    /// 回滚
    ///
    /// `Open` 的显式事务计一次回滚；`Aborted` 的事务中止已经计过，不再计数
    pub fn rollback(&self, slot: &mut TransactionSlot) -> TransactionResult<()> {
        let state = slot_state(slot);
        let ctx = match slot.as_mut() {
            Some(ctx) if matches!(state, TransactionState::Open | TransactionState::Aborted) => ctx,
            _ => {
                return Err(TransactionError::InvalidState {
                    operation: TransactionOp::Rollback,
                    state,
                })
            }
        };

        if let Some(handle) = ctx.take_handle() {
            if let Err(e) = self.store.rollback(handle) {
                warn!("Transaction {} store rollback failed: {}", ctx.id, e);
            }
        }
        ctx.transition_to(TransactionState::RolledBack, TransactionOp::Rollback)?;

        match (state, ctx.kind) {
            (TransactionState::Open, TransactionKind::Explicit) => {
                self.metrics.increment_metric(MetricName::TxnRollback);
                info!("Transaction {} rolled back", ctx.id);
            }
            (TransactionState::Aborted, _) => {
                info!("Aborted transaction {} acknowledged by rollback", ctx.id);
            }
            _ => debug!("Transaction {} rolled back (implicit)", ctx.id),
        }
        Ok(())
    }

    /// 标记事务中止并立即释放存储事务
    ///
    /// 已经中止的事务再次标记是空操作
    pub fn mark_aborted(&self, slot: &mut TransactionSlot, cause: AbortKind) -> TransactionResult<()> {
        let state = slot_state(slot);
        match (state, slot.as_mut()) {
            (TransactionState::Aborted, _) => Ok(()),
            (TransactionState::Open, Some(ctx)) => {
                if let Some(handle) = ctx.take_handle() {
                    if let Err(e) = self.store.rollback(handle) {
                        warn!("Transaction {} store rollback failed: {}", ctx.id, e);
                    }
                }
                self.record_abort(ctx, cause)
            }
            _ => Err(TransactionError::InvalidState {
                operation: TransactionOp::MarkAborted,
                state,
            }),
        }
    }

    /// 取消请求：把仍然打开的事务中止（恰好一次），会话保持可用
    pub fn abort_on_cancel(&self, slot: &mut TransactionSlot) -> TransactionResult<()> {
        if slot_state(slot) == TransactionState::Open {
            self.mark_aborted(slot, AbortKind::OtherFailure)?;
        }
        Ok(())
    }

    /// 连接断开：中止打开的事务，确认已中止的事务，并清空槽位
    pub fn finalize_on_disconnect(&self, slot: &mut TransactionSlot) -> TransactionResult<()> {
        self.abort_on_cancel(slot)?;
        if slot_state(slot) == TransactionState::Aborted {
            self.rollback(slot)?;
        }
        *slot = None;
        Ok(())
    }

    fn record_abort(&self, ctx: &mut TransactionContext, cause: AbortKind) -> TransactionResult<()> {
        ctx.abort(cause)?;
        if ctx.kind.is_explicit() {
            self.metrics.increment_metric(MetricName::TxnAbort);
            warn!("Transaction {} aborted ({:?})", ctx.id, cause);
        } else {
            debug!("Transaction {} aborted (implicit, {:?})", ctx.id, cause);
        }
        Ok(())
    }
}

fn open_context(slot: &mut TransactionSlot, operation: TransactionOp) -> TransactionResult<&mut TransactionContext> {
    let state = slot_state(slot);
    match slot.as_mut() {
        Some(ctx) if state == TransactionState::Open => Ok(ctx),
        _ => Err(TransactionError::InvalidState { operation, state }),
    }
}

fn store_error(source: StoreError) -> TransactionError {
    TransactionError::Store {
        kind: AbortClassifier::classify_store(&source),
        source,
    }
}

fn missing_handle(txn_id: TransactionId) -> TransactionError {
    store_error(StoreError::Other(format!("事务 {} 没有存储句柄", txn_id)))
}
