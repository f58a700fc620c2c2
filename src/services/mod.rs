pub mod metrics;

pub use metrics::{MetricName, MetricsRegistry, MetricsSnapshot};
