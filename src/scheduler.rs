// SPDX-License-Identifier: Apache-2.0

//! Fixed-interval polling scheduler.
//!
//! Each cycle tails every configured source from its stored offset,
//! parses new lines, ships events, aggregates per-source metrics, ships
//! the snapshot samples, persists offsets, and then emits a heartbeat.
//! File I/O runs on spawn_blocking workers bounded by a small pool;
//! parsed batches flow back to the async loop for export.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::{self, BoundedReceiver, BoundedSender};
use crate::exporters::telemetry::payload::{self, MetricSample};
use crate::exporters::telemetry::TelemetryExporter;
use crate::metrics::{CycleAggregator, SourceSnapshot};
use crate::tailer::event::LogEvent;
use crate::tailer::finder::SourceFinder;
use crate::tailer::offsets::OffsetStore;
use crate::tailer::parser::{LineParser, ParserKind};
use crate::tailer::reader;
use crate::tailer::LogSource;

pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub max_concurrent_files: usize,
    pub max_line_len: usize,
    pub host: String,
}

/// A configured source with its compiled parser and pattern resolver.
struct ActiveSource {
    id: String,
    kind: ParserKind,
    finder: SourceFinder,
    parser: Arc<LineParser>,
}

/// Work item dispatched to a blocking tail worker, one per file.
struct TailWork {
    source_id: String,
    kind: ParserKind,
    parser: Arc<LineParser>,
    path: PathBuf,
    offset: u64,
    max_line_len: usize,
    host: String,
}

/// Parsed output of one file read, sent back to the async loop.
struct TailBatch {
    source_id: String,
    kind: ParserKind,
    path: PathBuf,
    events: Vec<LogEvent>,
    new_offset: u64,
}

pub struct Scheduler {
    sources: Vec<ActiveSource>,
    offsets: OffsetStore,
    exporter: TelemetryExporter,
    config: SchedulerConfig,
    wake_rx: BoundedReceiver<()>,
}

impl Scheduler {
    /// Compile parsers and validate source patterns. Any failure here is
    /// a configuration error and aborts startup.
    pub fn new(
        sources: Vec<LogSource>,
        offsets: OffsetStore,
        exporter: TelemetryExporter,
        config: SchedulerConfig,
        wake_rx: BoundedReceiver<()>,
    ) -> std::result::Result<Self, BoxError> {
        let mut active = Vec::with_capacity(sources.len());
        for source in sources {
            let finder = SourceFinder::new(&source.pattern);
            finder
                .validate()
                .map_err(|e| -> BoxError { format!("source {}: {}", source.id, e).into() })?;
            let parser = LineParser::for_kind(source.parser)?;
            active.push(ActiveSource {
                id: source.id,
                kind: source.parser,
                finder,
                parser: Arc::new(parser),
            });
        }

        Ok(Self {
            sources: active,
            offsets,
            exporter,
            config,
            wake_rx,
        })
    }

    /// Run cycles at the configured interval until cancelled, then
    /// persist offsets one final time.
    pub async fn run(mut self, cancel: CancellationToken) -> std::result::Result<(), BoxError> {
        info!(
            sources = self.sources.len(),
            poll_interval = ?self.config.poll_interval,
            "Starting scheduler"
        );

        loop {
            self.run_cycle().await;

            select! {
                _ = cancel.cancelled() => break,
                wake = self.wake_rx.next() => {
                    if wake.is_none() {
                        break;
                    }
                    info!("Wake signal received, starting cycle early");
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        if let Err(e) = self.offsets.persist() {
            warn!(error = %e, "Failed to persist offsets during shutdown.");
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Execute one polling cycle. Mid-cycle failures are logged and
    /// never abort the loop: an unreadable file skips that file, a
    /// failed export drops that batch, a failed persist leaves the
    /// previous state file in place.
    pub async fn run_cycle(&mut self) {
        let interval_start = Utc::now();
        let mut aggregator = CycleAggregator::new();
        let mut staged: Vec<(PathBuf, u64)> = Vec::new();

        let mut pending: VecDeque<TailWork> = VecDeque::new();
        for source in &self.sources {
            aggregator.track_source(&source.id, source.kind);

            let paths = match source.finder.resolve() {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(
                        source = %source.id,
                        error = %e,
                        "File discovery failed, skipping source this cycle."
                    );
                    continue;
                }
            };
            if paths.is_empty() {
                debug!(source = %source.id, "No files matched this cycle.");
                continue;
            }

            for path in paths {
                let offset = self.offsets.get(&path);
                pending.push_back(TailWork {
                    source_id: source.id.clone(),
                    kind: source.kind,
                    parser: source.parser.clone(),
                    path,
                    offset,
                    max_line_len: self.config.max_line_len,
                    host: self.config.host.clone(),
                });
            }
        }

        let total_files = pending.len();
        let max_workers = self.config.max_concurrent_files.max(1);
        let (batch_tx, mut batch_rx) = bounded_channel::bounded::<TailBatch>(max_workers);
        let mut worker_futures: FuturesOrdered<JoinHandle<()>> = FuturesOrdered::new();
        let mut events_total = 0usize;

        loop {
            while worker_futures.len() < max_workers {
                let Some(work) = pending.pop_front() else { break };
                let tx = batch_tx.clone();
                worker_futures.push_back(tokio::task::spawn_blocking(move || {
                    run_tail_worker(work, tx);
                }));
            }

            if worker_futures.is_empty() {
                break;
            }

            select! {
                biased;

                Some(result) = worker_futures.next() => {
                    if let Err(e) = result {
                        error!("Tail worker failed: {}", e);
                    }
                }

                Some(batch) = batch_rx.next() => {
                    events_total += self.process_batch(batch, &mut aggregator, &mut staged).await;
                }
            }
        }

        // Workers are done; drop our sender so the drain below terminates.
        drop(batch_tx);
        while let Some(batch) = batch_rx.next().await {
            events_total += self.process_batch(batch, &mut aggregator, &mut staged).await;
        }

        let interval_end = Utc::now();
        let snapshots = aggregator.finish(interval_start, interval_end);

        let mut samples: Vec<MetricSample> = Vec::new();
        for snapshot in &snapshots {
            log_snapshot(snapshot);
            samples.extend(payload::samples_from_snapshot(snapshot));
        }

        if !samples.is_empty() {
            if let Err(e) = self.exporter.emit_metrics(&samples).await {
                warn!(error = %e, "Failed to ship metric samples, dropping batch.");
            }
        }

        for (path, offset) in staged {
            self.offsets.set(path, offset);
        }
        if let Err(e) = self.offsets.persist() {
            warn!(
                error = %e,
                "Failed to persist offsets, positions will be re-read after restart."
            );
        }

        // The heartbeat goes out only once the cycle's offsets have been
        // persisted.
        let heartbeat = [MetricSample::heartbeat(interval_end)];
        if let Err(e) = self.exporter.emit_metrics(&heartbeat).await {
            warn!(error = %e, "Failed to ship heartbeat.");
        }

        debug!(
            files = total_files,
            events = events_total,
            duration_ms = (interval_end - interval_start).num_milliseconds(),
            "Cycle complete"
        );
    }

    /// Feed a batch into the aggregator, ship its events, and stage the
    /// file's new offset. Offsets advance whether or not the batch
    /// shipped.
    async fn process_batch(
        &self,
        batch: TailBatch,
        aggregator: &mut CycleAggregator,
        staged: &mut Vec<(PathBuf, u64)>,
    ) -> usize {
        for event in &batch.events {
            aggregator.observe(batch.kind, event);
        }

        let count = batch.events.len();
        if !batch.events.is_empty() {
            if let Err(e) = self.exporter.emit_events(&batch.events).await {
                warn!(
                    source = %batch.source_id,
                    path = ?batch.path,
                    events = count,
                    error = %e,
                    "Failed to ship events, dropping batch."
                );
            }
        }

        staged.push((batch.path, batch.new_offset));
        count
    }
}

/// Read one file from its stored offset and parse the new lines.
/// Runs under spawn_blocking so file I/O stays off the async runtime.
fn run_tail_worker(work: TailWork, batch_tx: BoundedSender<TailBatch>) {
    debug!(
        source = %work.source_id,
        path = ?work.path,
        offset = work.offset,
        "Tailing file"
    );

    let read = match reader::tail_lines(&work.path, work.offset, work.max_line_len) {
        Ok(Some(read)) => read,
        Ok(None) => {
            // Disappeared between discovery and read. The stored offset
            // stays put in case the file comes back.
            warn!(
                source = %work.source_id,
                path = ?work.path,
                "File missing, keeping stored offset."
            );
            return;
        }
        Err(e) => {
            error!(
                source = %work.source_id,
                path = ?work.path,
                error = %e,
                "Failed to read file, skipping this cycle."
            );
            return;
        }
    };

    // Nothing new and the offset did not move (a rotation reset counts
    // as movement and must still be staged).
    if read.lines.is_empty() && read.new_offset == work.offset {
        return;
    }

    let mut events = Vec::with_capacity(read.lines.len());
    for line in &read.lines {
        match work.parser.parse(line) {
            Some(parsed) => events.push(parsed.into_event(&work.source_id, &work.host)),
            None => debug!(
                source = %work.source_id,
                "Skipping line that does not match the source format."
            ),
        }
    }

    let batch = TailBatch {
        source_id: work.source_id,
        kind: work.kind,
        path: work.path,
        events,
        new_offset: read.new_offset,
    };
    if batch_tx.send_blocking(batch).is_err() {
        debug!("Batch channel closed, discarding batch.");
    }
}

fn log_snapshot(snapshot: &SourceSnapshot) {
    match snapshot {
        SourceSnapshot::Access {
            source,
            request_count,
            error_count,
            error_rate_pct,
            avg_response_time_ms,
            p50_response_time_ms,
            p90_response_time_ms,
            p99_response_time_ms,
            ..
        } => {
            info!(
                source = %source,
                requests = *request_count,
                errors = *error_count,
                error_rate_pct = *error_rate_pct,
                avg_ms = *avg_response_time_ms,
                p50_ms = *p50_response_time_ms,
                p90_ms = *p90_response_time_ms,
                p99_ms = *p99_response_time_ms,
                "Access log interval summary"
            );
        }
        SourceSnapshot::AppLog {
            source,
            info_count,
            warn_count,
            error_count,
            ..
        } => {
            info!(
                source = %source,
                info = *info_count,
                warn = *warn_count,
                error = *error_count,
                "Application log interval summary"
            );
        }
    }
}
