// SPDX-License-Identifier: Apache-2.0

//! Log tailing engine: source discovery, incremental reads with durable
//! byte offsets, and per-line parsing into structured events.

pub mod error;
pub mod event;
pub mod finder;
pub mod offsets;
pub mod parser;
pub mod reader;

pub use error::{Error, Result};

use crate::tailer::parser::ParserKind;

/// A configured log source: a stable identifier, a path pattern
/// (literal path or glob, re-evaluated every cycle) and the parser
/// applied to its lines. Built once at startup, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSource {
    pub id: String,
    pub pattern: String,
    pub parser: ParserKind,
}

impl LogSource {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            parser,
        }
    }
}
