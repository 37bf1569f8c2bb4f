// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::info;

use crate::bounded_channel::BoundedReceiver;
use crate::exporters::telemetry::TelemetryExporter;
use crate::init::args::AgentRun;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::tailer::finder::is_glob;
use crate::tailer::offsets::OffsetStore;
use crate::tailer::parser::ParserKind;
use crate::tailer::LogSource;

/// Assembles the tailing engine from parsed arguments and runs it until
/// cancelled. Construction failures here are configuration errors and
/// abort startup; everything after `run` begins is handled by the
/// scheduler's per-cycle error policy.
pub struct Agent {
    args: Box<AgentRun>,
    environment: String,
    wake_rx: BoundedReceiver<()>,
}

impl Agent {
    pub fn new(args: Box<AgentRun>, environment: String, wake_rx: BoundedReceiver<()>) -> Self {
        Self {
            args,
            environment,
            wake_rx,
        }
    }

    pub async fn run(self, cancel_token: CancellationToken) -> Result<(), BoxError> {
        let args = self.args;

        let sources = build_sources(&args)?;
        let legacy_target = legacy_offset_target(&sources);
        let offsets = OffsetStore::open(&args.state_file, legacy_target.as_deref())
            .map_err(|e| -> BoxError { format!("unable to open offset state: {}", e).into() })?;

        let exporter = TelemetryExporter::new(
            &args.endpoint,
            args.api_key.clone(),
            Duration::from_secs(args.export_timeout),
            args.export_retries,
        )?;

        let host = match args.host.clone() {
            Some(host) => host,
            None => gethostname::gethostname().to_string_lossy().into_owned(),
        };

        info!(
            environment = %self.environment,
            host = %host,
            endpoint = %args.endpoint,
            state_file = %args.state_file.display(),
            "Starting logship agent"
        );

        let scheduler = Scheduler::new(
            sources,
            offsets,
            exporter,
            SchedulerConfig {
                poll_interval: Duration::from_secs(args.poll_interval.max(1)),
                max_concurrent_files: args.max_concurrent_files,
                max_line_len: args.max_line_len,
                host,
            },
            self.wake_rx,
        )?;

        scheduler.run(cancel_token).await
    }
}

/// Turn source specs into LogSources, prepending `--log-dir` to relative
/// patterns. Duplicate ids are a configuration error.
fn build_sources(args: &AgentRun) -> Result<Vec<LogSource>, BoxError> {
    if args.sources.is_empty() {
        return Err("no log sources configured".into());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources = Vec::with_capacity(args.sources.len());
    for spec in &args.sources {
        if !seen.insert(spec.id.as_str()) {
            return Err(format!("duplicate source id: {}", spec.id).into());
        }

        let pattern = match &args.log_dir {
            Some(dir) if Path::new(&spec.pattern).is_relative() => {
                dir.join(&spec.pattern).to_string_lossy().into_owned()
            }
            _ => spec.pattern.clone(),
        };
        sources.push(LogSource::new(spec.id.clone(), pattern, spec.parser));
    }

    Ok(sources)
}

/// Target file for a legacy single-offset state entry: only meaningful
/// when exactly one access-log source with a literal path is configured.
fn legacy_offset_target(sources: &[LogSource]) -> Option<PathBuf> {
    let mut candidates = sources
        .iter()
        .filter(|s| s.parser == ParserKind::AccessLog && !is_glob(&s.pattern));

    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(PathBuf::from(&only.pattern)),
        _ => None,
    }
}
