//! 语句分发器
//!
//! 编排一个批次：先整体解析，再逐条语句驱动事务状态机、更新类别计数器、
//! 调用执行协作者。第一条失败的语句终止批次，其后的语句不会被尝试

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::api::session::ConnectionSession;
use crate::core::error::{DBError, DBResult, PublicError, SessionError, ToPublicError};
use crate::query::execution::{ExecutionOutput, StatementExecutor};
use crate::query::statement::{parse_batch, ParsedStatement, StatementCategory};
use crate::services::MetricsRegistry;
use crate::transaction::{
    slot_state, AbortClassifier, TransactionKind, TransactionManager, TransactionOp,
    TransactionState,
};

/// 单条语句的成功结果
#[derive(Debug, Clone, Serialize)]
pub struct StatementResult {
    /// 语句在批次中的位置（从 0 开始）
    pub index: usize,
    pub category: StatementCategory,
    pub sql: String,
    pub output: ExecutionOutput,
}

/// 终止批次的失败
#[derive(Debug, Clone)]
pub struct StatementFailure {
    /// 解析失败时为 None
    pub index: Option<usize>,
    pub sql: Option<String>,
    pub category: Option<StatementCategory>,
    pub error: DBError,
}

impl StatementFailure {
    pub fn to_public_error(&self) -> PublicError {
        self.error.to_public_error()
    }
}

/// 批次结果：按顺序的成功结果，加上第一个失败（如果有）
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub results: Vec<StatementResult>,
    pub error: Option<StatementFailure>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> DBResult<Vec<StatementResult>> {
        match self.error {
            Some(failure) => Err(failure.error),
            None => Ok(self.results),
        }
    }
}

/// 语句分发器
pub struct StatementDispatcher {
    transactions: Arc<TransactionManager>,
    executor: Arc<dyn StatementExecutor>,
    metrics: Arc<MetricsRegistry>,
}

impl StatementDispatcher {
    pub fn new(
        transactions: Arc<TransactionManager>,
        executor: Arc<dyn StatementExecutor>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            transactions,
            executor,
            metrics,
        }
    }

    /// 在会话上执行一个批次
    pub fn execute(&self, session: &mut ConnectionSession, batch: &str) -> BatchResult {
        let mut result = BatchResult::default();

        // 关闭会话与本批次竞争会话锁时，关闭一方可能先完成
        if session.is_closed() {
            warn!("Session {} is closed, batch rejected", session.id());
            result.error = Some(StatementFailure {
                index: None,
                sql: None,
                category: None,
                error: SessionError::SessionNotFound(session.id()).into(),
            });
            return result;
        }

        let statements = match parse_batch(batch) {
            Ok(statements) => statements,
            Err(error) => {
                warn!("Session {} batch rejected: {}", session.id(), error);
                result.error = Some(StatementFailure {
                    index: None,
                    sql: None,
                    category: None,
                    error,
                });
                return result;
            }
        };
        if statements.is_empty() {
            return result;
        }

        // 空闲时遗留的取消请求不作用于新批次
        if session.take_cancel_request() {
            debug!("Session {} discarded stale cancel request", session.id());
        }

        for (index, statement) in statements.into_iter().enumerate() {
            let category = statement.category();
            match self.execute_statement(session, &statement) {
                Ok(output) => result.results.push(StatementResult {
                    index,
                    category,
                    sql: statement.sql().to_string(),
                    output,
                }),
                Err(error) => {
                    warn!(
                        "Session {} statement {} ({}) failed: {}",
                        session.id(),
                        index,
                        category,
                        error
                    );
                    result.error = Some(StatementFailure {
                        index: Some(index),
                        sql: Some(statement.sql().to_string()),
                        category: Some(category),
                        error,
                    });
                    break;
                }
            }
        }

        self.transactions.clear_finished(session.transaction_slot());
        result
    }

    fn execute_statement(
        &self,
        session: &mut ConnectionSession,
        statement: &ParsedStatement,
    ) -> DBResult<ExecutionOutput> {
        if session.take_cancel_request() {
            warn!("Session {} cancelled", session.id());
            self.transactions.abort_on_cancel(session.transaction_slot())?;
            return Err(DBError::Cancelled);
        }

        let slot = session.transaction_slot();
        self.transactions.clear_finished(slot);

        let category = statement.category();
        debug!("Session {} dispatching {}: {}", session.id(), category, statement.sql());
        match category {
            StatementCategory::TxnBegin => {
                self.transactions.begin_explicit(session.transaction_slot())?;
                Ok(ExecutionOutput::Ok)
            }
            StatementCategory::TxnCommit => {
                self.transactions.commit(session.transaction_slot())?;
                Ok(ExecutionOutput::Ok)
            }
            StatementCategory::TxnRollback => {
                self.transactions.rollback(session.transaction_slot())?;
                Ok(ExecutionOutput::Ok)
            }
            _ => self.execute_in_transaction(session, statement),
        }
    }

    fn execute_in_transaction(
        &self,
        session: &mut ConnectionSession,
        statement: &ParsedStatement,
    ) -> DBResult<ExecutionOutput> {
        let session_id = session.id();
        let autocommit = session.autocommit();
        let slot = session.transaction_slot();

        let kind = match slot_state(slot) {
            TransactionState::NoTxn if autocommit => {
                self.transactions.begin_implicit(slot)?;
                TransactionKind::Implicit
            }
            TransactionState::NoTxn => {
                // 相当于驱动在语句前代发 BEGIN
                self.transactions.begin_explicit(slot)?;
                TransactionKind::Explicit
            }
            state if state.can_execute() => TransactionKind::Explicit,
            state => {
                return Err(DBError::InvalidTransactionState {
                    operation: TransactionOp::Execute,
                    state,
                })
            }
        };

        let category = statement.category();
        self.metrics.increment_metric(category.metric());

        let handle = match slot.as_mut() {
            Some(ctx) => {
                ctx.record_statement();
                ctx.handle().copied()
            }
            None => None,
        };
        let Some(handle) = handle else {
            return Err(DBError::Internal(format!(
                "会话 {} 的事务没有存储句柄",
                session_id
            )));
        };

        match self.executor.execute(category, statement, &handle) {
            Ok(output) => {
                if kind == TransactionKind::Implicit {
                    if let Err(e) = self.transactions.commit(slot) {
                        // 提交失败已让事务进入 Aborted，确认回滚后会话回到 NoTxn
                        self.transactions.rollback(slot)?;
                        return Err(e.into());
                    }
                }
                Ok(output)
            }
            Err(error) => {
                let cause = AbortClassifier::classify(&error);
                self.transactions.mark_aborted(slot, cause)?;
                if kind == TransactionKind::Implicit {
                    self.transactions.rollback(slot)?;
                }
                Err(DBError::from_execution(error, cause))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ExecutionError;
    use crate::query::memory_executor::MemoryExecutor;
    use crate::services::MetricName;
    use crate::storage::MemoryStore;

    struct Fixture {
        dispatcher: StatementDispatcher,
        metrics: Arc<MetricsRegistry>,
        store: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let metrics = Arc::new(MetricsRegistry::new());
            let transactions = Arc::new(TransactionManager::new(store.clone(), metrics.clone()));
            let executor = Arc::new(MemoryExecutor::new(store.clone()));
            Self {
                dispatcher: StatementDispatcher::new(transactions, executor, metrics.clone()),
                metrics,
                store,
            }
        }

        fn count(&self, metric: MetricName) -> u64 {
            self.metrics.snapshot().metric(metric)
        }
    }

    #[test]
    fn test_begin_end_counts_only_transaction() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);

        let result = f.dispatcher.execute(&mut session, "BEGIN; END");
        assert!(result.is_ok());
        assert_eq!(result.results.len(), 2);
        assert_eq!(f.count(MetricName::TxnBegin), 1);
        assert_eq!(f.count(MetricName::TxnCommit), 1);
        assert_eq!(f.count(MetricName::Misc), 0);
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
    }

    #[test]
    fn test_implicit_statements() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);

        let result = f.dispatcher.execute(&mut session, "SELECT 1; SELECT 2; SELECT 3");
        assert!(result.is_ok());
        assert_eq!(f.count(MetricName::Select), 3);
        assert_eq!(f.count(MetricName::TxnBegin), 0);
        assert_eq!(f.count(MetricName::TxnCommit), 0);
        assert_eq!(f.store.stats().committed, 3);
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
    }

    #[test]
    fn test_parse_error_changes_nothing() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);
        let before = f.metrics.snapshot();

        let result = f.dispatcher.execute(&mut session, "SELECT 1; SELEKT 2");
        let failure = result.error.expect("应解析失败");
        assert!(matches!(failure.error, DBError::Parse(_)));
        assert_eq!(failure.index, None);
        assert!(result.results.is_empty());
        assert_eq!(f.metrics.snapshot().counters, before.counters);
    }

    #[test]
    fn test_failure_stops_batch() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);

        let result = f.dispatcher.execute(
            &mut session,
            "SELECT 1; SELECT * FROM missing; SELECT 3",
        );
        let failure = result.error.expect("第二条语句应失败");
        assert_eq!(failure.index, Some(1));
        assert_eq!(failure.category, Some(StatementCategory::Select));
        assert!(matches!(
            failure.error,
            DBError::Failure(ExecutionError::ObjectNotFound(_))
        ));
        assert_eq!(result.results.len(), 1);
        assert_eq!(f.count(MetricName::Select), 2);
        assert_eq!(f.count(MetricName::TxnAbort), 0);
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
        assert_eq!(f.store.active_transactions(), 0);
    }

    #[test]
    fn test_statement_in_aborted_transaction_is_rejected() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);

        let result = f.dispatcher.execute(&mut session, "BEGIN; SELECT * FROM missing");
        assert!(!result.is_ok());
        assert_eq!(session.transaction_state(), TransactionState::Aborted);

        let result = f.dispatcher.execute(&mut session, "SELECT 1");
        let failure = result.error.expect("Aborted 下应拒绝执行");
        assert!(matches!(
            failure.error,
            DBError::InvalidTransactionState {
                operation: TransactionOp::Execute,
                state: TransactionState::Aborted
            }
        ));
        assert_eq!(f.count(MetricName::Select), 1);
        assert_eq!(f.count(MetricName::TxnAbort), 1);

        let result = f.dispatcher.execute(&mut session, "ROLLBACK");
        assert!(result.is_ok());
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
        assert_eq!(f.count(MetricName::TxnRollback), 0);
    }

    #[test]
    fn test_autocommit_off_opens_explicit_transaction() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, false);

        let result = f.dispatcher.execute(&mut session, "SELECT 1");
        assert!(result.is_ok());
        assert_eq!(session.transaction_state(), TransactionState::Open);
        assert_eq!(f.count(MetricName::TxnBegin), 1);

        let result = f.dispatcher.execute(&mut session, "COMMIT");
        assert!(result.is_ok());
        assert_eq!(f.count(MetricName::TxnCommit), 1);
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
    }

    #[test]
    fn test_stale_cancel_request_is_ignored() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);
        session.cancel_handle().cancel();

        let result = f.dispatcher.execute(&mut session, "SELECT 1");
        assert!(result.is_ok());
    }

    #[test]
    fn test_closed_session_rejects_batch() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);
        session.mark_closed();

        let result = f.dispatcher.execute(&mut session, "BEGIN; SELECT 1");
        let failure = result.error.expect("已关闭的会话应拒绝批次");
        assert_eq!(failure.index, None);
        assert!(matches!(
            failure.error,
            DBError::Session(SessionError::SessionNotFound(1))
        ));
        assert_eq!(session.transaction_state(), TransactionState::NoTxn);
        assert_eq!(f.store.active_transactions(), 0);
        assert_eq!(f.count(MetricName::TxnBegin), 0);
        assert_eq!(f.count(MetricName::Select), 0);
    }

    #[test]
    fn test_into_result() {
        let f = Fixture::new();
        let mut session = ConnectionSession::new(1, true);

        let results = f
            .dispatcher
            .execute(&mut session, "SELECT 1")
            .into_result()
            .expect("执行失败");
        assert_eq!(results[0].category, StatementCategory::Select);
        assert_eq!(results[0].sql, "SELECT 1");

        let err = f
            .dispatcher
            .execute(&mut session, "COMMIT")
            .into_result()
            .expect_err("NoTxn 下 COMMIT 应失败");
        assert!(matches!(err, DBError::InvalidTransactionState { .. }));
    }
}
