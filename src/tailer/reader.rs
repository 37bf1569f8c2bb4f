//! Incremental line reads against a stored byte offset.
//!
//! Only complete (newline-terminated) lines are returned: a trailing
//! fragment still being written stays in the file and the offset holds
//! at the end of the last complete line, so the fragment is re-read on
//! the next cycle once the writer finishes it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::info;

use crate::tailer::error::Result;

/// Outcome of one tail read over a single file.
#[derive(Debug)]
pub struct TailRead {
    /// Complete new lines since the stored offset, in file order.
    pub lines: Vec<String>,
    /// Offset to persist: end of the last complete line consumed.
    pub new_offset: u64,
    /// True when the file shrank below the stored offset and the read
    /// restarted from the beginning.
    pub rotated: bool,
}

/// Read complete new lines from `path` starting at `offset`.
///
/// Returns `Ok(None)` when the file does not currently exist; the
/// caller keeps the stored offset so a transiently missing file does
/// not lose its position. A file size below the stored offset is
/// treated as rotation or truncation and the read restarts at zero.
/// An equal-or-larger replacement file is not detected.
pub fn tail_lines(path: &Path, offset: u64, max_line_len: usize) -> Result<Option<TailRead>> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let size = metadata.len();
    let (start, rotated) = if size < offset {
        info!(
            path = %path.display(),
            stored_offset = offset,
            current_size = size,
            "File shrank below stored offset, assuming rotation and restarting from the beginning"
        );
        (0, true)
    } else {
        (offset, false)
    };

    if size == start {
        return Ok(Some(TailRead {
            lines: Vec::new(),
            new_offset: start,
            rotated,
        }));
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        // Deleted between stat and open
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((size - start) as usize);
    file.read_to_end(&mut buf)?;

    let mut lines = Vec::new();
    let mut consumed = 0usize;

    for chunk in buf.split_inclusive(|b| *b == b'\n') {
        if chunk.last() != Some(&b'\n') {
            // Unterminated trailing fragment, re-read next cycle
            break;
        }
        consumed += chunk.len();

        let mut raw = &chunk[..chunk.len() - 1];
        if raw.last() == Some(&b'\r') {
            raw = &raw[..raw.len() - 1];
        }

        let line = String::from_utf8_lossy(raw);
        if line.trim().is_empty() {
            continue;
        }

        if line.chars().count() > max_line_len {
            lines.push(line.chars().take(max_line_len).collect());
        } else {
            lines.push(line.into_owned());
        }
    }

    Ok(Some(TailRead {
        lines,
        new_offset: start + consumed as u64,
        rotated,
    }))
}
