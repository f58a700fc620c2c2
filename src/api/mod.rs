//! 引擎入口
//!
//! `SqlEngine` 把配置、指标注册表、存储、执行器、事务管理器、分发器和
//! 会话管理器组装在一起，是库的对外接口

use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;

pub mod session;

use crate::config::Config;
use crate::core::error::{DBResult, SessionError};
use crate::query::{BatchResult, MemoryExecutor, StatementDispatcher, StatementExecutor};
use crate::services::{MetricsRegistry, MetricsSnapshot};
use crate::storage::{MemoryStore, TransactionalStore};
use crate::transaction::{TransactionManager, TransactionState};
use session::{ConnectionSession, SessionId, SessionManager};

pub struct SqlEngine {
    config: Config,
    metrics: Arc<MetricsRegistry>,
    dispatcher: StatementDispatcher,
    sessions: SessionManager,
}

impl SqlEngine {
    pub fn new(
        config: Config,
        store: Arc<dyn TransactionalStore>,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let transactions = Arc::new(TransactionManager::new(store, Arc::clone(&metrics)));
        let dispatcher = StatementDispatcher::new(
            Arc::clone(&transactions),
            executor,
            Arc::clone(&metrics),
        );
        let sessions = SessionManager::new(
            transactions,
            config.session.max_sessions,
            config.session.default_autocommit,
        );
        info!(
            "Engine initialized (max sessions: {}, autocommit: {})",
            config.session.max_sessions, config.session.default_autocommit
        );
        Self {
            config,
            metrics,
            dispatcher,
            sessions,
        }
    }

    /// 基于新的内存存储和内存执行器创建引擎
    pub fn in_memory(config: Config) -> Self {
        Self::with_memory_store(config, Arc::new(MemoryStore::new()))
    }

    /// 基于给定的内存存储创建引擎，调用方保留存储以便注入故障或检查统计
    pub fn with_memory_store(config: Config, store: Arc<MemoryStore>) -> Self {
        let executor = Arc::new(MemoryExecutor::new(store.clone()));
        Self::new(config, store, executor)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn open_session(&self) -> DBResult<SessionId> {
        Ok(self.sessions.create_session()?)
    }

    pub fn session(&self, session_id: SessionId) -> DBResult<Arc<Mutex<ConnectionSession>>> {
        Ok(self.sessions.get_session(session_id)?)
    }

    /// 在会话上执行批次
    ///
    /// 只有会话不存在时返回 `Err`；语句级失败记录在 `BatchResult::error` 中
    pub fn execute(&self, session_id: SessionId, batch: &str) -> DBResult<BatchResult> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        if session.is_closed() {
            return Err(SessionError::SessionNotFound(session_id).into());
        }
        Ok(self.dispatcher.execute(&mut session, batch))
    }

    /// 取消会话，见 `SessionManager::cancel`
    pub fn cancel(&self, session_id: SessionId) -> DBResult<()> {
        self.sessions.cancel(session_id)
    }

    pub fn close_session(&self, session_id: SessionId) -> DBResult<()> {
        self.sessions.close_session(session_id)
    }

    pub fn set_autocommit(&self, session_id: SessionId, autocommit: bool) -> DBResult<()> {
        self.session(session_id)?.lock().set_autocommit(autocommit);
        Ok(())
    }

    pub fn transaction_state(&self, session_id: SessionId) -> DBResult<TransactionState> {
        Ok(self.session(session_id)?.lock().transaction_state())
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 关闭所有会话，返回关闭的数量
    pub fn shutdown(&self) -> usize {
        let closed = self.sessions.close_all();
        info!("Engine shut down, {} session(s) closed", closed);
        closed
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
