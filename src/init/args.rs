// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;

use crate::init::parse::SourceSpec;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Log source as id=parser:pattern (parser: access|applog), repeatable
    #[arg(
        long = "source",
        env = "LOGSHIP_SOURCES",
        value_delimiter = ';',
        required = true
    )]
    pub sources: Vec<SourceSpec>,

    /// Directory prepended to relative source patterns
    #[arg(long, env = "LOGSHIP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Seconds between polling cycles
    #[arg(long, env = "LOGSHIP_POLL_INTERVAL", default_value = "60")]
    pub poll_interval: u64,

    /// Path of the persisted offset state file
    #[arg(long, env = "LOGSHIP_STATE_FILE", default_value = "logship_state.json")]
    pub state_file: PathBuf,

    /// Base URL of the telemetry backend
    #[arg(long, env = "LOGSHIP_ENDPOINT")]
    pub endpoint: String,

    /// API key sent with every backend request
    #[arg(long, env = "LOGSHIP_API_KEY")]
    pub api_key: Option<String>,

    /// Per-attempt backend request timeout in seconds
    #[arg(long, env = "LOGSHIP_EXPORT_TIMEOUT", default_value = "10")]
    pub export_timeout: u64,

    /// Attempts per backend request before a batch is dropped
    #[arg(long, env = "LOGSHIP_EXPORT_RETRIES", default_value = "3")]
    pub export_retries: u32,

    /// Maximum files tailed concurrently within one cycle
    #[arg(long, env = "LOGSHIP_MAX_CONCURRENT_FILES", default_value = "4")]
    pub max_concurrent_files: usize,

    /// Maximum characters kept from a single line, longer lines are truncated
    #[arg(long, env = "LOGSHIP_MAX_LINE_LEN", default_value = "16384")]
    pub max_line_len: usize,

    /// Hostname attached to events, defaults to the system hostname
    #[arg(long, env = "LOGSHIP_HOST")]
    pub host: Option<String>,
}
