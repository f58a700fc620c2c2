//! 计数器断言辅助模块

use sqlexec::services::{MetricName, MetricsSnapshot};

fn expected_value(expected: &[(MetricName, u64)], metric: MetricName) -> u64 {
    expected
        .iter()
        .find(|(name, _)| *name == metric)
        .map(|(_, value)| *value)
        .unwrap_or(0)
}

/// 断言计数器的绝对值，未列出的计数器必须为 0
pub fn assert_counters(snapshot: &MetricsSnapshot, expected: &[(MetricName, u64)]) {
    for metric in MetricName::ALL {
        let want = expected_value(expected, metric);
        assert_eq!(
            snapshot.metric(metric),
            want,
            "计数器 {} 不匹配: 期望 {}, 实际 {}",
            metric,
            want,
            snapshot.metric(metric)
        );
    }
}

/// 断言两个快照之间的增量，未列出的计数器必须不变
pub fn assert_deltas(before: &MetricsSnapshot, after: &MetricsSnapshot, expected: &[(MetricName, u64)]) {
    for metric in MetricName::ALL {
        let want = expected_value(expected, metric);
        let delta = after.metric(metric) - before.metric(metric);
        assert_eq!(
            delta, want,
            "计数器 {} 增量不匹配: 期望 {}, 实际 {}",
            metric, want, delta
        );
    }
}

/// 断言快照单调不减
pub fn assert_monotonic(before: &MetricsSnapshot, after: &MetricsSnapshot) {
    for (name, value) in &before.counters {
        assert!(
            after.get(name) >= *value,
            "计数器 {} 减小: {} -> {}",
            name,
            value,
            after.get(name)
        );
    }
}
