// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use tower::BoxError;

use crate::tailer::parser::ParserKind;

/// One `--source` value: `id=parser:pattern`, where parser is `access`
/// or `applog` and the pattern is a literal path or a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub id: String,
    pub parser: ParserKind,
    pub pattern: String,
}

impl FromStr for SourceSpec {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid source `{s}`: expected id=parser:pattern"))?;
        let (parser, pattern) = rest
            .split_once(':')
            .ok_or_else(|| format!("invalid source `{s}`: expected id=parser:pattern"))?;

        let id = id.trim();
        let pattern = pattern.trim();
        if id.is_empty() {
            return Err(format!("invalid source `{s}`: empty id").into());
        }
        if pattern.is_empty() {
            return Err(format!("invalid source `{s}`: empty path pattern").into());
        }

        Ok(SourceSpec {
            id: id.to_string(),
            parser: parser.trim().parse::<ParserKind>()?,
            pattern: pattern.to_string(),
        })
    }
}
