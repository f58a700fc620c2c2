use crate::core::error::StoreResult;

/// 存储事务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnHandle {
    /// 存储分配的事务ID
    pub id: u64,
    /// 事务开始时已提交的最新版本
    pub start_version: u64,
}

/// 分布式事务键值存储的抽象
///
/// 实现必须是 `Send + Sync`，多个会话会并发调用同一个存储实例。
/// 写冲突必须以 `StoreError::Conflict` 返回，以便中止分类器识别
pub trait TransactionalStore: Send + Sync {
    /// 开启新事务
    fn begin(&self) -> StoreResult<TxnHandle>;

    /// 读取单个键，事务自身未提交的写入可见
    fn read(&self, txn: &TxnHandle, key: &str) -> StoreResult<Option<String>>;

    /// 按前缀扫描，结果按键排序
    fn scan_prefix(&self, txn: &TxnHandle, prefix: &str) -> StoreResult<Vec<(String, String)>>;

    /// 写入键值，冲突时返回 `StoreError::Conflict`
    fn write(&self, txn: &TxnHandle, key: &str, value: String) -> StoreResult<()>;

    /// 删除键，冲突时返回 `StoreError::Conflict`
    fn delete(&self, txn: &TxnHandle, key: &str) -> StoreResult<()>;

    /// 提交事务
    fn commit(&self, txn: TxnHandle) -> StoreResult<()>;

    /// 回滚事务，丢弃所有未提交的写入
    fn rollback(&self, txn: TxnHandle) -> StoreResult<()>;
}
