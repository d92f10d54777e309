//! 调度指标收集模块

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 调度指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub dispatched_total: u64,
    pub dispatched_success: u64,
    pub dispatched_failed: u64,
    pub dispatched_panicked: u64,
    /// 传输层关闭后被拒绝的调度
    pub rejected: u64,
    /// 最近一次调度耗时（毫秒）
    pub last_duration_ms: u64,
}

/// 调度指标收集器
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// 单次调度的结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failed,
    Panicked,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, outcome: Outcome, duration: Duration) {
        let counters = &self.inner;
        counters.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Success => counters.success.fetch_add(1, Ordering::Relaxed),
            Outcome::Failed => counters.failed.fetch_add(1, Ordering::Relaxed),
            Outcome::Panicked => counters.panicked.fetch_add(1, Ordering::Relaxed),
        };
        counters
            .last_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> Metrics {
        let counters = &self.inner;
        Metrics {
            dispatched_total: counters.total.load(Ordering::Relaxed),
            dispatched_success: counters.success.load(Ordering::Relaxed),
            dispatched_failed: counters.failed.load(Ordering::Relaxed),
            dispatched_panicked: counters.panicked.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            last_duration_ms: counters.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}
