//! Per-call latency sampling for external services.
//!
//! Collection is off by default and toggled with [`set_timing_enabled`]
//! (driven by `--timing` or `HYBENCH_TIMING`). Samples are grouped by
//! operation name (`embed`, `search.lexical`, `search.vector`, `rerank`) and
//! summarised as p50/p95/p99 plus the total time spent in each.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

/// Latency summary for all operations sampled in a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LatencyReport {
    pub operations: Vec<OpLatency>,
}

/// Latency statistics for one operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpLatency {
    pub name: String,
    pub count: usize,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub total: Duration,
}

thread_local! {
    static SAMPLES: RefCell<BTreeMap<String, Vec<Duration>>> = const { RefCell::new(BTreeMap::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);

/// `HYBENCH_TIMING` is set to `1`, `true`, `yes` or `on`.
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("HYBENCH_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(&value))
}

/// Turn sampling on or off. Turning it off drops pending samples.
pub fn set_timing_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Drop all samples recorded on this thread.
pub fn clear() {
    SAMPLES.with(|samples| samples.borrow_mut().clear());
}

/// Run `f`, recording its wall time under `name` when sampling is on.
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }
    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

/// Record a sample directly.
pub fn record(name: &str, elapsed: Duration) {
    SAMPLES.with(|samples| {
        samples
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(elapsed);
    });
}

/// Drain this thread's samples into a report.
#[must_use]
pub fn take_report() -> LatencyReport {
    let grouped = SAMPLES.with(|samples| std::mem::take(&mut *samples.borrow_mut()));
    let operations = grouped
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpLatency {
                count: values.len(),
                p50: percentile(&values, 50),
                p95: percentile(&values, 95),
                p99: percentile(&values, 99),
                total: values.iter().sum(),
                name,
            }
        })
        .collect();
    LatencyReport { operations }
}

impl LatencyReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OpLatency> {
        self.operations.iter().find(|op| op.name == name)
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations: Vec<_> = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_ms": op.p50.as_millis(),
                    "p95_ms": op.p95.as_millis(),
                    "p99_ms": op.p99.as_millis(),
                    "total_ms": op.total.as_millis(),
                })
            })
            .collect();
        json!({ "operations": operations })
    }

    /// Fixed-width table for stderr.
    #[must_use]
    pub fn render_table(&self) -> String {
        if self.operations.is_empty() {
            return "No upstream calls were timed.".to_string();
        }
        let mut out = String::new();
        out.push_str("call              count       p50       p95       p99     total\n");
        out.push_str("----------------------------------------------------------------\n");
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<16} {:>6} {:>9} {:>9} {:>9} {:>9}",
                op.name,
                op.count,
                human(op.p50),
                human(op.p95),
                human(op.p99),
                human(op.total),
            );
        }
        out
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = pct.min(100).saturating_mul(sorted.len()).saturating_add(99) / 100;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn human(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1_000 {
        format!("{}.{:02}s", ms / 1_000, (ms % 1_000) / 10)
    } else {
        format!("{ms}ms")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}
