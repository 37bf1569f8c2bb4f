use glob::glob;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::tailer::error::{Error, Result};

/// Returns true when the pattern contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// SourceFinder expands one source's path pattern into the concrete
/// paths that currently match it. Patterns are re-evaluated on every
/// call, so files rotated in after startup are picked up and deleted
/// files drop out.
///
/// A literal (non-glob) pattern is always returned, even when the file
/// does not currently exist; the reader tolerates absence and the
/// source keeps its stored offset.
#[derive(Debug, Clone)]
pub struct SourceFinder {
    pattern: String,
}

impl SourceFinder {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Check the pattern parses. Called at startup so an invalid glob
    /// is a fatal configuration error rather than a per-cycle warning.
    pub fn validate(&self) -> Result<()> {
        glob::Pattern::new(&self.pattern)
            .map(|_| ())
            .map_err(|e| Error::Pattern(format!("{}: {}", self.pattern, e)))
    }

    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        if !is_glob(&self.pattern) {
            return Ok(vec![PathBuf::from(&self.pattern)]);
        }

        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        let matches = glob(&self.pattern).map_err(|e| Error::Pattern(e.to_string()))?;
        for entry in matches {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;

            // Skip directories
            if path.is_dir() {
                continue;
            }

            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }

        Ok(paths)
    }
}
