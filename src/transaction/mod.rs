//! 事务管理模块
//!
//! 提供会话级的事务状态机：
//! - 显式事务（BEGIN / COMMIT / ROLLBACK）与隐式单语句事务
//! - 冲突/中止分类
//! - 事务计数器（只统计显式事务）
//!
//! ## 使用示例
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlexec::services::MetricsRegistry;
//! use sqlexec::storage::MemoryStore;
//! use sqlexec::transaction::TransactionManager;
//!
//! let metrics = Arc::new(MetricsRegistry::new());
//! let manager = TransactionManager::new(Arc::new(MemoryStore::new()), metrics.clone());
//!
//! let mut slot = None;
//! manager.begin_explicit(&mut slot).expect("开始事务失败");
//! manager.commit(&mut slot).expect("提交事务失败");
//! assert_eq!(metrics.get("sql.txn.commit.count"), 1);
//! ```

pub mod abort;
pub mod context;
pub mod manager;
pub mod types;

pub use abort::{AbortClassifier, AbortKind};
pub use context::TransactionContext;
pub use manager::{slot_state, TransactionManager, TransactionSlot};
pub use types::*;
