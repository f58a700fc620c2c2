//! 事务存储接口
//!
//! 分发器把存储当作不透明的协作者：begin/commit/rollback 返回成功或可分类的错误。
//! `MemoryStore` 是进程内的参考实现，带有键级写冲突检测

pub mod memory_storage;
pub mod store;

pub use memory_storage::{MemoryStore, StoreStatsSnapshot};
pub use store::{TransactionalStore, TxnHandle};

pub use crate::core::error::{StoreError, StoreResult};
