//! 集成测试共享工具模块
//!
//! 提供测试引擎和计数器断言，供所有集成测试使用

#![allow(dead_code)]

pub mod assertions;

use std::sync::Arc;

use sqlexec::api::session::SessionId;
use sqlexec::api::SqlEngine;
use sqlexec::config::Config;
use sqlexec::query::{BatchResult, StatementResult};
use sqlexec::services::MetricsSnapshot;
use sqlexec::storage::MemoryStore;
use sqlexec::transaction::TransactionState;

/// 测试引擎包装器
///
/// 每个测试持有独立的存储和指标注册表，并预先打开一个会话
pub struct TestEngine {
    pub engine: Arc<SqlEngine>,
    pub store: Arc<MemoryStore>,
    pub session: SessionId,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(SqlEngine::with_memory_store(config, store.clone()));
        let session = engine.open_session().expect("创建会话失败");
        Self {
            engine,
            store,
            session,
        }
    }

    pub fn open_session(&self) -> SessionId {
        self.engine.open_session().expect("创建会话失败")
    }

    /// 在默认会话上执行批次
    pub fn exec(&self, batch: &str) -> BatchResult {
        self.exec_on(self.session, batch)
    }

    pub fn exec_on(&self, session: SessionId, batch: &str) -> BatchResult {
        self.engine.execute(session, batch).expect("会话应存在")
    }

    /// 执行批次并要求全部成功
    pub fn exec_ok(&self, batch: &str) -> Vec<StatementResult> {
        let result = self.exec(batch);
        if let Some(failure) = &result.error {
            panic!("执行 '{}' 失败: {}", batch, failure.error);
        }
        result.results
    }

    pub fn state(&self) -> TransactionState {
        self.engine
            .transaction_state(self.session)
            .expect("会话应存在")
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.engine.metrics_snapshot()
    }
}
