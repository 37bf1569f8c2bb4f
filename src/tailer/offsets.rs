//! Durable path-to-offset state with atomic JSON persistence.
//!
//! The wire format is a single JSON object:
//! `{"last_positions": {"<path>": <offset>, ...}}`. Earlier agent
//! generations persisted one access-log offset as
//! `{"last_access_pos": <offset>}`; that form is migrated on load when
//! the configuration makes the target file unambiguous.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::tailer::error::{Error, Result};

const POSITIONS_KEY: &str = "last_positions";
const LEGACY_OFFSET_KEY: &str = "last_access_pos";

/// Offset state for every concrete file path the agent has read.
/// Single writer: the scheduler merges per-cycle updates in, then calls
/// persist once all of the cycle's workers have completed.
pub struct OffsetStore {
    path: PathBuf,
    positions: BTreeMap<PathBuf, u64>,
}

impl OffsetStore {
    /// Open the store, creating parent directories as needed. Loading
    /// is lenient: a missing file is a clean start, a corrupt file is
    /// discarded with a warning, and malformed entries are dropped
    /// individually while the rest are kept. `legacy_target` names the
    /// file a legacy single-offset state belongs to, when the source
    /// configuration makes that unambiguous.
    pub fn open(path: impl Into<PathBuf>, legacy_target: Option<&Path>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Persistence(format!("failed to create state directory: {}", e))
                })?;
            }
        }

        let positions = load_positions(&path, legacy_target);
        Ok(Self { path, positions })
    }

    /// Stored offset for a path, zero when the path has not been seen.
    pub fn get(&self, path: &Path) -> u64 {
        self.positions.get(path).copied().unwrap_or(0)
    }

    pub fn set(&mut self, path: PathBuf, offset: u64) {
        self.positions.insert(path, offset);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Persist the whole map atomically: write to a uniquely named temp
    /// file in the same directory, flush, then rename over the target.
    pub fn persist(&self) -> Result<()> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let positions: BTreeMap<String, u64> = self
            .positions
            .iter()
            .map(|(p, off)| (p.to_string_lossy().into_owned(), *off))
            .collect();
        let state = json!({ POSITIONS_KEY: positions });

        let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_path = self
            .path
            .with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

        let file = File::create(&temp_path)
            .map_err(|e| Error::Persistence(format!("failed to create temp state file: {}", e)))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &state)
            .map_err(|e| Error::Persistence(format!("failed to write state: {}", e)))?;
        writer
            .flush()
            .map_err(|e| Error::Persistence(format!("failed to flush state: {}", e)))?;
        drop(writer);

        fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::Persistence(format!("failed to rename state file: {}", e)))
    }
}

fn load_positions(path: &Path, legacy_target: Option<&Path>) -> BTreeMap<PathBuf, u64> {
    let mut positions = BTreeMap::new();

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No offset state file found, starting clean");
            return positions;
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Unable to read offset state file, starting clean"
            );
            return positions;
        }
    };

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Offset state file is corrupted, starting clean"
            );
            return positions;
        }
    };

    if let Some(map) = value.get(POSITIONS_KEY).and_then(Value::as_object) {
        for (key, entry) in map {
            match entry.as_u64() {
                Some(offset) => {
                    positions.insert(PathBuf::from(key), offset);
                }
                None => {
                    warn!(file = %key, "Dropping malformed offset entry from state file");
                }
            }
        }
    }

    if let Some(legacy) = value.get(LEGACY_OFFSET_KEY).and_then(Value::as_u64) {
        match legacy_target {
            Some(target) if !positions.contains_key(target) => {
                info!(
                    file = %target.display(),
                    offset = legacy,
                    "Migrating legacy single-file offset"
                );
                positions.insert(target.to_path_buf(), legacy);
            }
            Some(_) => {
                debug!("Legacy offset superseded by a per-file entry, ignoring");
            }
            None => {
                warn!(
                    offset = legacy,
                    "Dropping legacy single-file offset, no unambiguous target source"
                );
            }
        }
    }

    debug!(
        path = %path.display(),
        entries = positions.len(),
        "Loaded offset state"
    );
    positions
}
