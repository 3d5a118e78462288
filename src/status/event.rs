// src/status/event.rs

//! Structured Status Events and the `STAT:` line codec.
//!
//! Wire format (one event per line):
//!
//! ```text
//! STAT:<timestamp>:<major>:<minor>:<verb>[:<params-or-free-text>]
//! ```
//!
//! Anything that does not parse is kept as a comment.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

pub const STAT_PREFIX: &str = "STAT";
pub const IDENTITY_PREFIX: &str = "DATASETID=";

/// `YYYYMMDD_HHMMSS_ffffff`, always 22 characters.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const TIMESTAMP_LEN: usize = 22;

/// Placeholder for `:` inside parameter values and free text.
const COLON_ESCAPE: char = '^';

/// Fixed-width, zero-padded UTC timestamp.
///
/// Ordering is plain string ordering, which is chronological because every
/// field is fixed width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Accepts only the exact fixed-width form.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != TIMESTAMP_LEN {
            return None;
        }
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()?;
        Some(Timestamp(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The last field of a state. Unknown verbs are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Ready,
    Engaged,
    Returned,
    Pass,
    Fail,
    Hold,
    Free,
    Blocked,
    Unblocked,
    Approved,
    Unapproved,
    Other(String),
}

impl Verb {
    /// Binary partner, for the four toggle pairs.
    pub fn opposite(&self) -> Option<Verb> {
        match self {
            Verb::Hold => Some(Verb::Free),
            Verb::Free => Some(Verb::Hold),
            Verb::Blocked => Some(Verb::Unblocked),
            Verb::Unblocked => Some(Verb::Blocked),
            Verb::Engaged => Some(Verb::Returned),
            Verb::Returned => Some(Verb::Engaged),
            Verb::Pass => Some(Verb::Fail),
            Verb::Fail => Some(Verb::Pass),
            _ => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.opposite().is_some()
    }

    /// Gate markers that never become the dataset's current state.
    pub fn is_non_binding(&self) -> bool {
        matches!(
            self,
            Verb::Blocked | Verb::Unblocked | Verb::Approved | Verb::Unapproved
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Verb::Pass | Verb::Fail)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verb::Ready => "Ready",
            Verb::Engaged => "Engaged",
            Verb::Returned => "Returned",
            Verb::Pass => "Pass",
            Verb::Fail => "Fail",
            Verb::Hold => "Hold",
            Verb::Free => "Free",
            Verb::Blocked => "Blocked",
            Verb::Unblocked => "Unblocked",
            Verb::Approved => "Approved",
            Verb::Unapproved => "Unapproved",
            Verb::Other(s) => s,
        }
    }
}

impl From<&str> for Verb {
    fn from(s: &str) -> Self {
        match s {
            "Ready" => Verb::Ready,
            "Engaged" => Verb::Engaged,
            "Returned" => Verb::Returned,
            "Pass" => Verb::Pass,
            "Fail" => Verb::Fail,
            "Hold" => Verb::Hold,
            "Free" => Verb::Free,
            "Blocked" => Verb::Blocked,
            "Unblocked" => Verb::Unblocked,
            "Approved" => Verb::Approved,
            "Unapproved" => Verb::Unapproved,
            other => Verb::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified pipeline state, `major:minor:verb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State {
    pub major: String,
    pub minor: String,
    pub verb: Verb,
}

impl State {
    pub fn new(major: impl Into<String>, minor: impl Into<String>, verb: Verb) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            verb,
        }
    }

    /// Transition-table lookup key: the last two segments.
    pub fn key(&self) -> String {
        format!("{}:{}", self.minor, self.verb)
    }

    pub fn with_verb(&self, verb: Verb) -> Self {
        Self {
            major: self.major.clone(),
            minor: self.minor.clone(),
            verb,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.verb == Verb::Engaged
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.major, self.minor, self.verb)
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [major, minor, verb]
                if !major.is_empty() && !minor.is_empty() && !verb.is_empty() =>
            {
                Ok(State::new(*major, *minor, Verb::from(*verb)))
            }
            _ => Err(format!("invalid state '{s}' (expected MAJOR:MINOR:VERB)")),
        }
    }
}

/// Ordered `key=value` parameters attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", escape_param(k), escape_param(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `None` unless every comma-separated part is a `key=value` pair.
    fn decode(s: &str) -> Option<Self> {
        let mut params = Params::new();
        for part in s.split(',') {
            let (k, v) = part.split_once('=')?;
            if k.trim().is_empty() {
                return None;
            }
            params.insert(unescape(k.trim()), unescape(v));
        }
        Some(params)
    }
}

fn escape(s: &str) -> String {
    s.replace(':', &COLON_ESCAPE.to_string())
        .replace(['\n', '\r'], " ")
}

/// Parameter keys and values additionally cannot carry `,` or `=`.
fn escape_param(s: &str) -> String {
    escape(s).replace(',', ";").replace('=', "-")
}

fn unescape(s: &str) -> String {
    s.replace(COLON_ESCAPE, ":")
}

/// One parsed `STAT:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub timestamp: Timestamp,
    pub state: State,
    pub params: Params,
    /// Trailing free text that is not a parameter list.
    pub message: Option<String>,
}

impl StatusEvent {
    /// New event stamped with the current time.
    pub fn new(state: State) -> Self {
        Self {
            timestamp: Timestamp::now(),
            state,
            params: Params::new(),
            message: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn verb(&self) -> &Verb {
        &self.state.verb
    }

    /// Render as a log line (without trailing newline).
    pub fn to_line(&self) -> String {
        let mut line = format!("{STAT_PREFIX}:{}:{}", self.timestamp, self.state);
        let tail = match (&self.message, self.params.is_empty()) {
            (Some(msg), true) => Some(escape(msg)),
            (None, false) => Some(self.params.encode()),
            (Some(msg), false) => Some(format!(
                "{},message={}",
                self.params.encode(),
                escape_param(msg)
            )),
            (None, true) => None,
        };
        if let Some(tail) = tail {
            line.push(':');
            line.push_str(&tail);
        }
        line
    }

    /// Parse a `STAT:` line; `None` for anything malformed.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(6, ':');
        if fields.next()? != STAT_PREFIX {
            return None;
        }
        let timestamp = Timestamp::parse(fields.next()?)?;
        let major = fields.next()?;
        let minor = fields.next()?;
        let verb = fields.next()?.trim_end();
        if major.is_empty() || minor.is_empty() || verb.is_empty() {
            return None;
        }

        let (params, message) = match fields.next().map(str::trim_end) {
            None | Some("") => (Params::new(), None),
            Some(tail) => match Params::decode(tail) {
                Some(mut params) => {
                    let message = params.0.remove("message");
                    (params, message)
                }
                None => (Params::new(), Some(unescape(tail))),
            },
        };

        Some(StatusEvent {
            timestamp,
            state: State::new(major, minor, Verb::from(verb)),
            params,
            message,
        })
    }
}

/// Classification of one raw log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Identity(String),
    Event(StatusEvent),
    Comment(String),
}

impl LogLine {
    pub fn parse(line: &str) -> Self {
        if let Some(id) = line.strip_prefix(IDENTITY_PREFIX) {
            return LogLine::Identity(id.trim().to_string());
        }
        match StatusEvent::parse_line(line) {
            Some(event) => LogLine::Event(event),
            None => LogLine::Comment(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_fixed_width() {
        let dt = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.as_str(), "20210304_050607_000000");
        assert!(Timestamp::parse(ts.as_str()).is_some());
        assert!(Timestamp::parse("2021034_050607_000000").is_none());
    }

    #[test]
    fn params_escape_colons() {
        let event = StatusEvent::new(State::new("POSTPROCESS", "ClimoGen", Verb::Engaged))
            .with_params(Params::new().with("job_id", "42").with("path", "a:b"));
        let line = event.to_line();
        assert!(line.ends_with(":job_id=42,path=a^b"));

        let parsed = StatusEvent::parse_line(&line).unwrap();
        assert_eq!(parsed.params.get("path"), Some("a:b"));
        assert_eq!(parsed.params.get("job_id"), Some("42"));
    }

    #[test]
    fn free_text_tail_becomes_message() {
        let line = "STAT:20210304_050607_000001:POSTPROCESS:ClimoGen:Fail:ncclimo exited 2";
        let parsed = StatusEvent::parse_line(line).unwrap();
        assert_eq!(parsed.state.verb, Verb::Fail);
        assert_eq!(parsed.message.as_deref(), Some("ncclimo exited 2"));
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn malformed_lines_are_comments() {
        assert!(matches!(LogLine::parse("STAT:garbage"), LogLine::Comment(_)));
        assert!(matches!(
            LogLine::parse("STAT:20210304_050607_000001:A::Pass"),
            LogLine::Comment(_)
        ));
        assert!(matches!(LogLine::parse("note to self"), LogLine::Comment(_)));
        assert_eq!(
            LogLine::parse("DATASETID=E3SM.1_0.historical"),
            LogLine::Identity("E3SM.1_0.historical".to_string())
        );
    }
}
