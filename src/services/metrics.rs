//! SQL 执行指标注册表
//!
//! 一组具名的单调计数器：原子自增、时间点快照。计数器从不递减也不重置，
//! 生命周期与注册表实例一致（服务进程中即进程生命周期）。
//! 注册表不解释名称，状态机与分发器共享同一个扁平命名空间

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 预注册的计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    TxnBegin,
    TxnCommit,
    TxnRollback,
    TxnAbort,
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Misc,
}

impl MetricName {
    pub const ALL: [MetricName; 10] = [
        MetricName::TxnBegin,
        MetricName::TxnCommit,
        MetricName::TxnRollback,
        MetricName::TxnAbort,
        MetricName::Select,
        MetricName::Insert,
        MetricName::Update,
        MetricName::Delete,
        MetricName::Ddl,
        MetricName::Misc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::TxnBegin => "sql.txn.begin.count",
            MetricName::TxnCommit => "sql.txn.commit.count",
            MetricName::TxnRollback => "sql.txn.rollback.count",
            MetricName::TxnAbort => "sql.txn.abort.count",
            MetricName::Select => "sql.select.count",
            MetricName::Insert => "sql.insert.count",
            MetricName::Update => "sql.update.count",
            MetricName::Delete => "sql.delete.count",
            MetricName::Ddl => "sql.ddl.count",
            MetricName::Misc => "sql.misc.count",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 快照时间
    pub taken_at: DateTime<Utc>,
    /// 计数器名 -> 值
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// 按名称读取，未注册的名称视为 0
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn metric(&self, name: MetricName) -> u64 {
        self.get(name.as_str())
    }
}

/// 指标注册表
///
/// 以 `Arc<MetricsRegistry>` 显式注入，测试中每个用例使用独立实例
#[derive(Debug)]
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
}

impl MetricsRegistry {
    /// 创建注册表并预注册所有已知计数器
    pub fn new() -> Self {
        let counters = DashMap::new();
        for name in MetricName::ALL {
            counters.insert(name.as_str().to_string(), AtomicU64::new(0));
        }
        Self { counters }
    }

    /// 计数器自增 1
    ///
    /// 同一计数器的并发自增不会丢失更新；同时转发给 `metrics` 门面
    pub fn increment(&self, name: &str) {
        let known = self
            .counters
            .get(name)
            .map(|counter| counter.fetch_add(1, Ordering::Relaxed))
            .is_some();
        if !known {
            // 读引用已释放，再取 entry 不会在同一分片上重入
            self.counters
                .entry(name.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
        ::metrics::counter!(name.to_string()).increment(1);
    }

    pub fn increment_metric(&self, name: MetricName) {
        self.increment(name.as_str());
    }

    /// 读取单个计数器
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// 获取当前指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        MetricsSnapshot {
            taken_at: Utc::now(),
            counters,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
