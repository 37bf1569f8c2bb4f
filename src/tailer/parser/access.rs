//! Combined-format HTTP access log parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;

use super::ParsedLine;
use crate::tailer::error::{Error, Result};
use crate::tailer::event::{FieldValue, Level};

/// Pattern for combined-format access lines carrying a trailing response
/// time in milliseconds:
///
/// ```text
/// 10.2.3.4 - alice [01/Jan/2024:00:00:00 +0000] "GET /api/x HTTP/1.1" 200 512 120
/// ```
pub const ACCESS_LOG_PATTERN: &str = r#"^(?P<client_ip>\S+) - (?P<user>\S+) \[(?P<time_local>[^\]]+)\] "(?P<method>.*?) (?P<url>.*?) (?P<protocol>HTTP/\d\.\d)" (?P<status>\d{3}) (?P<size>\d+) (?P<time_ms>\d+)"#;

/// Primary format for the bracketed timestamp.
pub const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

// Tried in order when the primary format fails. Naive variants are
// interpreted as UTC.
const FALLBACK_TIME_FORMATS: &[&str] = &[
    "%d/%b/%Y:%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug)]
pub struct AccessLogParser {
    regex: Regex,
}

impl AccessLogParser {
    pub fn new() -> Result<Self> {
        let regex = Regex::new(ACCESS_LOG_PATTERN).map_err(|e| Error::Regex(e.to_string()))?;
        Ok(Self { regex })
    }

    /// Parse one access line. Lines that do not match the format yield
    /// None and are skipped.
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = self.regex.captures(line)?;

        let status: i64 = caps["status"].parse().ok()?;
        let size: i64 = caps["size"].parse().ok()?;
        let time_ms: i64 = caps["time_ms"].parse().ok()?;

        let method = &caps["method"];
        let url = &caps["url"];

        let mut fields = BTreeMap::new();
        fields.insert("client_ip".to_string(), FieldValue::from(&caps["client_ip"]));
        fields.insert("user".to_string(), FieldValue::from(&caps["user"]));
        fields.insert("method".to_string(), FieldValue::from(method));
        fields.insert("url".to_string(), FieldValue::from(url));
        fields.insert("protocol".to_string(), FieldValue::from(&caps["protocol"]));
        fields.insert("status".to_string(), FieldValue::Int(status));
        fields.insert("size".to_string(), FieldValue::Int(size));
        fields.insert("response_time_ms".to_string(), FieldValue::Int(time_ms));

        Some(ParsedLine {
            timestamp: parse_time_local(&caps["time_local"]),
            // HTTP outcome is carried in the status field, not severity.
            level: Level::Info,
            message: format!("{} {} {} {}ms", method, url, status, time_ms),
            fields,
        })
    }
}

pub(crate) fn parse_time_local(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(ts, TIME_LOCAL_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in FALLBACK_TIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(ts, format) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(ts, format) {
            return Some(dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parser() -> AccessLogParser {
        AccessLogParser::new().unwrap()
    }

    #[test]
    fn parses_full_line() {
        let line = r#"10.0.0.1 - alice [01/Jan/2024:00:00:00] "GET /api/x HTTP/1.1" 200 512 120"#;
        let parsed = parser().parse(line).unwrap();

        assert_eq!(parsed.level, Level::Info);
        assert_eq!(parsed.message, "GET /api/x 200 120ms");
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parsed.fields["client_ip"], FieldValue::Str("10.0.0.1".into()));
        assert_eq!(parsed.fields["user"], FieldValue::Str("alice".into()));
        assert_eq!(parsed.fields["method"], FieldValue::Str("GET".into()));
        assert_eq!(parsed.fields["url"], FieldValue::Str("/api/x".into()));
        assert_eq!(parsed.fields["protocol"], FieldValue::Str("HTTP/1.1".into()));
        assert_eq!(parsed.fields["status"], FieldValue::Int(200));
        assert_eq!(parsed.fields["size"], FieldValue::Int(512));
        assert_eq!(parsed.fields["response_time_ms"], FieldValue::Int(120));
    }

    #[test]
    fn parses_zoned_timestamp() {
        let line =
            r#"192.168.1.9 - - [17/Dec/2025:10:15:32 +0200] "POST /login HTTP/1.0" 302 0 45"#;
        let parsed = parser().parse(line).unwrap();

        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 12, 17, 8, 15, 32).unwrap())
        );
        assert_eq!(parsed.message, "POST /login 302 45ms");
    }

    #[test]
    fn client_error_status_keeps_info_level() {
        let line = r#"10.0.0.2 - bob [01/Jan/2024:00:00:01] "GET /missing HTTP/1.1" 404 90 10"#;
        let parsed = parser().parse(line).unwrap();

        assert_eq!(parsed.level, Level::Info);
        assert_eq!(parsed.fields["status"], FieldValue::Int(404));
    }

    #[test]
    fn non_matching_line_is_skipped() {
        assert!(parser().parse("2024-01-01 INFO not an access line").is_none());
        assert!(parser().parse("").is_none());
    }

    #[test]
    fn status_must_be_three_digits() {
        let line = r#"10.0.0.1 - - [01/Jan/2024:00:00:00] "GET / HTTP/1.1" 99 0 1"#;
        assert!(parser().parse(line).is_none());
    }

    #[test]
    fn unparseable_timestamp_yields_none_timestamp() {
        let line = r#"10.0.0.1 - - [yesterday-ish] "GET / HTTP/1.1" 200 0 1"#;
        let parsed = parser().parse(line).unwrap();
        assert!(parsed.timestamp.is_none());
    }

    #[test]
    fn time_local_fallback_formats() {
        assert!(parse_time_local("01/Jan/2024:00:00:00 +0000").is_some());
        assert!(parse_time_local("01/Jan/2024:00:00:00").is_some());
        assert!(parse_time_local("2024-01-01T00:00:00").is_some());
        assert!(parse_time_local("2024-01-01 00:00:00").is_some());
        assert!(parse_time_local("not a time").is_none());
    }
}
