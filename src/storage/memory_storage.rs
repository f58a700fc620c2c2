//! 内存事务存储
//!
//! 已提交数据按键有序保存并带有提交版本；每个事务的写入先缓存在待提交集合中。
//! 冲突规则：
//! - 键在事务开始之后被其他事务提交过，写入或提交时返回冲突
//! - 键上已有其他存活事务的写意向，后写者冲突（先写者胜）

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::core::error::{StoreError, StoreResult};
use crate::storage::store::{TransactionalStore, TxnHandle};

#[derive(Debug, Clone)]
struct Versioned {
    /// None 表示墓碑
    value: Option<String>,
    version: u64,
}

#[derive(Debug)]
struct PendingTxn {
    start_version: u64,
    writes: BTreeMap<String, Option<String>>,
}

/// 存储统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct StoreStats {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    conflicts: AtomicU64,
}

/// 内存事务存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: RwLock<BTreeMap<String, Versioned>>,
    pending: DashMap<u64, PendingTxn>,
    /// 键 -> 持有写意向的事务ID
    intents: Mutex<HashMap<String, u64>>,
    clock: AtomicU64,
    next_txn_id: AtomicU64,
    /// 注入的冲突标记，写入值包含标记时失败一次
    injected_conflicts: Mutex<Vec<String>>,
    stats: StoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次写入值包含 `marker` 的操作将以冲突失败（仅一次）
    pub fn inject_conflict_on(&self, marker: impl Into<String>) {
        self.injected_conflicts.lock().push(marker.into());
    }

    /// 当前存活（未提交也未回滚）的事务数
    pub fn active_transactions(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            begun: self.stats.begun.load(Ordering::Relaxed),
            committed: self.stats.committed.load(Ordering::Relaxed),
            rolled_back: self.stats.rolled_back.load(Ordering::Relaxed),
            conflicts: self.stats.conflicts.load(Ordering::Relaxed),
        }
    }

    fn conflict(&self, key: &str) -> StoreError {
        self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
        StoreError::Conflict { key: key.to_string() }
    }

    fn take_injected_conflict(&self, value: &str) -> bool {
        let mut markers = self.injected_conflicts.lock();
        match markers.iter().position(|m| value.contains(m.as_str())) {
            Some(pos) => {
                markers.remove(pos);
                true
            }
            None => false,
        }
    }

    fn release_intents(&self, txn_id: u64, keys: impl Iterator<Item = String>) {
        let mut intents = self.intents.lock();
        for key in keys {
            if intents.get(&key) == Some(&txn_id) {
                intents.remove(&key);
            }
        }
    }

    fn put(&self, txn: &TxnHandle, key: &str, value: Option<String>) -> StoreResult<()> {
        if let Some(v) = value.as_deref() {
            if self.take_injected_conflict(v) {
                debug!("Injected conflict on key {} for txn {}", key, txn.id);
                return Err(self.conflict(key));
            }
        }

        let mut pending = self
            .pending
            .get_mut(&txn.id)
            .ok_or(StoreError::TransactionNotFound(txn.id))?;

        let committed_after_start = self
            .committed
            .read()
            .get(key)
            .is_some_and(|v| v.version > pending.start_version);
        if committed_after_start {
            return Err(self.conflict(key));
        }

        {
            let mut intents = self.intents.lock();
            match intents.get(key) {
                Some(owner) if *owner != txn.id => return Err(self.conflict(key)),
                _ => {
                    intents.insert(key.to_string(), txn.id);
                }
            }
        }

        pending.writes.insert(key.to_string(), value);
        Ok(())
    }
}

impl TransactionalStore for MemoryStore {
    fn begin(&self) -> StoreResult<TxnHandle> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        // 持有读锁读取时钟，保证不会看到提交到一半的版本
        let start_version = {
            let _committed = self.committed.read();
            self.clock.load(Ordering::SeqCst)
        };
        self.pending.insert(
            id,
            PendingTxn {
                start_version,
                writes: BTreeMap::new(),
            },
        );
        self.stats.begun.fetch_add(1, Ordering::Relaxed);
        Ok(TxnHandle { id, start_version })
    }

    fn read(&self, txn: &TxnHandle, key: &str) -> StoreResult<Option<String>> {
        let pending = self
            .pending
            .get(&txn.id)
            .ok_or(StoreError::TransactionNotFound(txn.id))?;
        if let Some(own) = pending.writes.get(key) {
            return Ok(own.clone());
        }
        Ok(self.committed.read().get(key).and_then(|v| v.value.clone()))
    }

    fn scan_prefix(&self, txn: &TxnHandle, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let pending = self
            .pending
            .get(&txn.id)
            .ok_or(StoreError::TransactionNotFound(txn.id))?;

        let mut merged: BTreeMap<String, Option<String>> = self
            .committed
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        for (k, v) in pending.writes.range(prefix.to_string()..) {
            if !k.starts_with(prefix) {
                break;
            }
            merged.insert(k.clone(), v.clone());
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    fn write(&self, txn: &TxnHandle, key: &str, value: String) -> StoreResult<()> {
        self.put(txn, key, Some(value))
    }

    fn delete(&self, txn: &TxnHandle, key: &str) -> StoreResult<()> {
        self.put(txn, key, None)
    }

    fn commit(&self, txn: TxnHandle) -> StoreResult<()> {
        let (_, pending) = self
            .pending
            .remove(&txn.id)
            .ok_or(StoreError::TransactionNotFound(txn.id))?;

        let result = {
            let mut committed = self.committed.write();
            let stale = pending.writes.keys().find(|key| {
                committed
                    .get(key.as_str())
                    .is_some_and(|v| v.version > pending.start_version)
            });
            match stale {
                Some(key) => Err(self.conflict(key)),
                None => {
                    let version = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
                    for (key, value) in pending.writes.iter() {
                        committed.insert(
                            key.clone(),
                            Versioned {
                                value: value.clone(),
                                version,
                            },
                        );
                    }
                    Ok(())
                }
            }
        };

        self.release_intents(txn.id, pending.writes.into_keys());
        if result.is_ok() {
            self.stats.committed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn rollback(&self, txn: TxnHandle) -> StoreResult<()> {
        let (_, pending) = self
            .pending
            .remove(&txn.id)
            .ok_or(StoreError::TransactionNotFound(txn.id))?;
        self.release_intents(txn.id, pending.writes.into_keys());
        self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();

        let t1 = store.begin().expect("开始事务失败");
        store.write(&t1, "t/1", "a".to_string()).expect("写入失败");
        assert_eq!(store.read(&t1, "t/1").expect("读取失败"), Some("a".to_string()));
        store.commit(t1).expect("提交失败");

        let t2 = store.begin().expect("开始事务失败");
        assert_eq!(store.read(&t2, "t/1").expect("读取失败"), Some("a".to_string()));
        store.rollback(t2).expect("回滚失败");

        assert_eq!(store.active_transactions(), 0);
        assert_eq!(store.stats().committed, 1);
        assert_eq!(store.stats().rolled_back, 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = MemoryStore::new();

        let t1 = store.begin().expect("开始事务失败");
        store.write(&t1, "t/1", "a".to_string()).expect("写入失败");
        store.rollback(t1).expect("回滚失败");

        let t2 = store.begin().expect("开始事务失败");
        assert_eq!(store.read(&t2, "t/1").expect("读取失败"), None);
    }

    #[test]
    fn test_first_writer_wins() {
        let store = MemoryStore::new();

        let t1 = store.begin().expect("开始事务失败");
        let t2 = store.begin().expect("开始事务失败");
        store.write(&t1, "t/k", "one".to_string()).expect("写入失败");

        let result = store.write(&t2, "t/k", "two".to_string());
        assert!(matches!(result, Err(StoreError::Conflict { ref key }) if key == "t/k"));

        // 先写者释放写意向后，新事务可以写入
        store.commit(t1).expect("提交失败");
        let t3 = store.begin().expect("开始事务失败");
        store.write(&t3, "t/k", "three".to_string()).expect("写入失败");
        store.commit(t3).expect("提交失败");
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn test_write_after_concurrent_commit_conflicts() {
        let store = MemoryStore::new();

        let old = store.begin().expect("开始事务失败");
        let newer = store.begin().expect("开始事务失败");
        store.write(&newer, "t/k", "v".to_string()).expect("写入失败");
        store.commit(newer).expect("提交失败");

        let result = store.write(&old, "t/k", "stale".to_string());
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn test_injected_conflict_fires_once() {
        let store = MemoryStore::new();
        store.inject_conflict_on("marker");

        let t1 = store.begin().expect("开始事务失败");
        let result = store.write(&t1, "t/key", "[\"key\",\"marker\"]".to_string());
        assert!(result.expect_err("应该冲突").is_conflict());
        store.rollback(t1).expect("回滚失败");

        let t2 = store.begin().expect("开始事务失败");
        store
            .write(&t2, "t/key", "[\"key\",\"marker\"]".to_string())
            .expect("第二次写入不应冲突");
        store.commit(t2).expect("提交失败");
    }

    #[test]
    fn test_scan_prefix_overlays_own_writes() {
        let store = MemoryStore::new();

        let t1 = store.begin().expect("开始事务失败");
        store.write(&t1, "a/1", "x".to_string()).expect("写入失败");
        store.write(&t1, "a/2", "y".to_string()).expect("写入失败");
        store.write(&t1, "b/1", "z".to_string()).expect("写入失败");
        store.commit(t1).expect("提交失败");

        let t2 = store.begin().expect("开始事务失败");
        store.delete(&t2, "a/1").expect("删除失败");
        store.write(&t2, "a/3", "w".to_string()).expect("写入失败");

        let rows = store.scan_prefix(&t2, "a/").expect("扫描失败");
        assert_eq!(
            rows,
            vec![
                ("a/2".to_string(), "y".to_string()),
                ("a/3".to_string(), "w".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_transaction() {
        let store = MemoryStore::new();
        let ghost = TxnHandle { id: 42, start_version: 0 };
        assert_eq!(store.commit(ghost), Err(StoreError::TransactionNotFound(42)));
        assert_eq!(store.rollback(ghost), Err(StoreError::TransactionNotFound(42)));
    }
}
