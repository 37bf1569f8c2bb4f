//! Per-source line parsers.
//!
//! Each source selects a parser kind at startup; the compiled parser is
//! built once and shared by that source's tail workers.

pub mod access;
pub mod applog;

pub use access::AccessLogParser;
pub use applog::AppLogParser;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::tailer::error::Result;
use crate::tailer::event::{FieldValue, Level, LogEvent};

/// Parser applied to a source's lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// Combined-format HTTP access logs with a trailing response time.
    AccessLog,
    /// Free-form application logs classified by severity keywords.
    AppLog,
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessLog => write!(f, "access"),
            Self::AppLog => write!(f, "applog"),
        }
    }
}

impl FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" | "accesslog" => Ok(Self::AccessLog),
            "applog" | "app" => Ok(Self::AppLog),
            _ => Err(format!(
                "unknown parser kind: {} (expected access or applog)",
                s
            )),
        }
    }
}

/// Result of parsing a single line, before source attribution.
#[derive(Debug)]
pub struct ParsedLine {
    /// Timestamp extracted from the line, when the format carries one.
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ParsedLine {
    /// Attach source identity and agent host, producing the final event.
    /// Lines without their own timestamp are stamped with "now".
    pub fn into_event(self, source: &str, host: &str) -> LogEvent {
        LogEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            level: self.level,
            source: source.to_string(),
            message: self.message,
            host: host.to_string(),
            fields: self.fields,
        }
    }
}

/// Compiled parser for one source.
#[derive(Debug)]
pub enum LineParser {
    Access(AccessLogParser),
    App(AppLogParser),
}

impl LineParser {
    pub fn for_kind(kind: ParserKind) -> Result<Self> {
        match kind {
            ParserKind::AccessLog => Ok(Self::Access(AccessLogParser::new()?)),
            ParserKind::AppLog => Ok(Self::App(AppLogParser::new())),
        }
    }

    /// Parse one line. None means the line carries no event (an access
    /// line that does not match the format) and is skipped; a malformed
    /// line is never an error.
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        match self {
            Self::Access(p) => p.parse(line),
            Self::App(p) => Some(p.parse(line)),
        }
    }
}
