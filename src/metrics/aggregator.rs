use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::tailer::event::{Level, LogEvent};
use crate::tailer::parser::ParserKind;

/// Aggregated view of one source over one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSnapshot {
    Access {
        source: String,
        interval_start: DateTime<Utc>,
        interval_end: DateTime<Utc>,
        request_count: u64,
        error_count: u64,
        /// Share of requests with status >= 400, as a percentage.
        error_rate_pct: f64,
        avg_response_time_ms: f64,
        p50_response_time_ms: u64,
        p90_response_time_ms: u64,
        p99_response_time_ms: u64,
    },
    AppLog {
        source: String,
        interval_start: DateTime<Utc>,
        interval_end: DateTime<Utc>,
        info_count: u64,
        warn_count: u64,
        error_count: u64,
    },
}

#[derive(Debug, Default)]
struct AccessStats {
    request_count: u64,
    error_count: u64,
    response_times_ms: Vec<u64>,
}

#[derive(Debug, Default)]
struct AppLogStats {
    info_count: u64,
    warn_count: u64,
    error_count: u64,
}

/// Accumulates per-source statistics for a single polling cycle. A fresh
/// aggregator is built at the start of every cycle; totals never carry
/// over between cycles.
#[derive(Debug, Default)]
pub struct CycleAggregator {
    access: BTreeMap<String, AccessStats>,
    applog: BTreeMap<String, AppLogStats>,
}

impl CycleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source so it can appear in the cycle's snapshots even
    /// when no lines arrive. Application log sources report zero counts
    /// for idle intervals; idle access sources stay silent.
    pub fn track_source(&mut self, source: &str, kind: ParserKind) {
        match kind {
            ParserKind::AccessLog => {
                self.access.entry(source.to_string()).or_default();
            }
            ParserKind::AppLog => {
                self.applog.entry(source.to_string()).or_default();
            }
        }
    }

    pub fn observe(&mut self, kind: ParserKind, event: &LogEvent) {
        match kind {
            ParserKind::AccessLog => {
                let stats = self.access.entry(event.source.clone()).or_default();
                stats.request_count += 1;
                if event.int_field("status").is_some_and(|s| s >= 400) {
                    stats.error_count += 1;
                }
                if let Some(ms) = event.int_field("response_time_ms") {
                    stats.response_times_ms.push(ms.max(0) as u64);
                }
            }
            ParserKind::AppLog => {
                let stats = self.applog.entry(event.source.clone()).or_default();
                match event.level {
                    Level::Info => stats.info_count += 1,
                    Level::Warn => stats.warn_count += 1,
                    Level::Error => stats.error_count += 1,
                }
            }
        }
    }

    /// Consume the cycle's counters and produce one snapshot per source.
    pub fn finish(
        self,
        interval_start: DateTime<Utc>,
        interval_end: DateTime<Utc>,
    ) -> Vec<SourceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.access.len() + self.applog.len());

        for (source, mut stats) in self.access {
            if stats.request_count == 0 {
                continue;
            }
            stats.response_times_ms.sort_unstable();
            let times = &stats.response_times_ms;
            let avg = if times.is_empty() {
                0.0
            } else {
                times.iter().sum::<u64>() as f64 / times.len() as f64
            };
            snapshots.push(SourceSnapshot::Access {
                source,
                interval_start,
                interval_end,
                request_count: stats.request_count,
                error_count: stats.error_count,
                error_rate_pct: stats.error_count as f64 / stats.request_count as f64 * 100.0,
                avg_response_time_ms: avg,
                p50_response_time_ms: nearest_rank(times, 50.0),
                p90_response_time_ms: nearest_rank(times, 90.0),
                p99_response_time_ms: nearest_rank(times, 99.0),
            });
        }

        for (source, stats) in self.applog {
            snapshots.push(SourceSnapshot::AppLog {
                source,
                interval_start,
                interval_end,
                info_count: stats.info_count,
                warn_count: stats.warn_count,
                error_count: stats.error_count,
            });
        }

        snapshots
    }
}

/// Nearest-rank percentile over an ascending-sorted slice: the value at
/// rank ceil(pct/100 * n), 1-indexed and clamped to the ends. Empty input
/// yields 0.
pub fn nearest_rank(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
