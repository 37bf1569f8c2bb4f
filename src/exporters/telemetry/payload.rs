//! Wire format for metric samples.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::SourceSnapshot;

/// One named measurement shipped to the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MetricSample {
    fn new(name: &str, value: f64, timestamp: DateTime<Utc>, source: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            timestamp,
            source: Some(source.to_string()),
        }
    }

    /// Liveness sample emitted once per cycle, not tied to any source.
    pub fn heartbeat(timestamp: DateTime<Utc>) -> Self {
        Self {
            name: "heartbeat".to_string(),
            value: 1.0,
            timestamp,
            source: None,
        }
    }
}

/// Flatten one source snapshot into named samples, stamped with the end
/// of the interval they cover.
pub fn samples_from_snapshot(snapshot: &SourceSnapshot) -> Vec<MetricSample> {
    match snapshot {
        SourceSnapshot::Access {
            source,
            interval_end,
            request_count,
            error_count,
            error_rate_pct,
            avg_response_time_ms,
            p50_response_time_ms,
            p90_response_time_ms,
            p99_response_time_ms,
            ..
        } => vec![
            MetricSample::new("request_count", *request_count as f64, *interval_end, source),
            MetricSample::new("error_http_count", *error_count as f64, *interval_end, source),
            MetricSample::new("error_rate", *error_rate_pct, *interval_end, source),
            MetricSample::new(
                "avg_response_time",
                *avg_response_time_ms,
                *interval_end,
                source,
            ),
            MetricSample::new(
                "p50_response_time",
                *p50_response_time_ms as f64,
                *interval_end,
                source,
            ),
            MetricSample::new(
                "p90_response_time",
                *p90_response_time_ms as f64,
                *interval_end,
                source,
            ),
            MetricSample::new(
                "p99_response_time",
                *p99_response_time_ms as f64,
                *interval_end,
                source,
            ),
        ],
        SourceSnapshot::AppLog {
            source,
            interval_end,
            info_count,
            warn_count,
            error_count,
            ..
        } => vec![
            MetricSample::new("info_count", *info_count as f64, *interval_end, source),
            MetricSample::new("warn_count", *warn_count as f64, *interval_end, source),
            MetricSample::new("error_count", *error_count as f64, *interval_end, source),
        ],
    }
}
