//! Severity classification for free-form application logs.

use std::collections::BTreeMap;

use super::ParsedLine;
use crate::tailer::event::Level;

/// Classifier for free-form application log lines. No fields are
/// extracted: the raw line becomes the event message and severity is
/// derived from keywords, ERROR taking precedence over WARN.
#[derive(Debug, Default)]
pub struct AppLogParser;

impl AppLogParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, line: &str) -> ParsedLine {
        ParsedLine {
            timestamp: None,
            level: classify(line),
            message: line.to_string(),
            fields: BTreeMap::new(),
        }
    }
}

/// WARN also covers WARNING. Lines with neither keyword are
/// informational.
pub fn classify(line: &str) -> Level {
    if line.contains("ERROR") {
        Level::Error
    } else if line.contains("WARN") {
        Level::Warn
    } else {
        Level::Info
    }
}
