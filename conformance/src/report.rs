//! Report types: severities, conformance levels, messages and reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Ordinal importance of a log message: `INFO < WARNING < ERROR < FATAL`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational message.
    #[default]
    Info,
    /// The source has an issue that does not block conformance.
    Warning,
    /// The source violates the rule.
    Error,
    /// The rule could not be evaluated at all.
    Fatal,
}

impl Severity {
    /// Every severity in ascending order.
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Returns the upper-case name used as a report key.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity `{s}`"))
    }
}

/// WCAG conformance level: `A < AA < AAA`.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Level A.
    A,
    /// Level AA.
    AA,
    /// Level AAA.
    AAA,
}

impl Level {
    /// Returns the level name used as a report key.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::A => "A",
            Level::AA => "AA",
            Level::AAA => "AAA",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Level::A),
            "AA" => Ok(Level::AA),
            "AAA" => Ok(Level::AAA),
            _ => Err(format!("unknown level `{s}`")),
        }
    }
}

/// A single log line produced by a rule.
///
/// Missing `severity` and `level` are filled in from the owning rule's
/// configured defaults when the message reaches the output buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Human-readable text.
    pub message: String,
    /// Severity of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// WCAG level the message relates to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
}

impl Message {
    /// Creates a message that inherits severity and level.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: None,
            level: None,
        }
    }

    /// Creates an `INFO` message.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message).with_severity(Severity::Info)
    }

    /// Creates a `WARNING` message.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message).with_severity(Severity::Warning)
    }

    /// Creates an `ERROR` message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message).with_severity(Severity::Error)
    }

    /// Creates a `FATAL` message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(message).with_severity(Severity::Fatal)
    }

    /// Sets the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the WCAG level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }
}

/// An ordered sequence of messages carried by one rule event.
///
/// Deserializes from either a single message object or an array of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Report {
    messages: Vec<Message>,
}

impl Report {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Returns the messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns an iterator over the messages.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the report carries no message.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Message> for Report {
    fn from(message: Message) -> Self {
        Self {
            messages: vec![message],
        }
    }
}

impl From<Vec<Message>> for Report {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl FromIterator<Message> for Report {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Report {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            One(Message),
            Many(Vec<Message>),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::One(message) => message.into(),
            Shape::Many(messages) => messages.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert!(Level::A < Level::AA && Level::AA < Level::AAA);
    }

    #[test]
    fn report_accepts_one_message_or_many() {
        let one: Result<Report, _> =
            serde_json::from_str(r#"{"message": "Source is empty", "severity": "ERROR"}"#);
        assert_eq!(
            one.ok(),
            Some(Report::from(Message::error("Source is empty")))
        );

        let many: Result<Report, _> = serde_json::from_str(
            r#"[{"message": "a"}, {"message": "b", "severity": "WARNING", "level": "AA"}]"#,
        );
        let expected: Report = vec![
            Message::new("a"),
            Message::warning("b").with_level(Level::AA),
        ]
        .into();
        assert_eq!(many.ok(), Some(expected));
    }

    #[test]
    fn message_serializes_without_absent_fields() {
        let value = serde_json::to_value(Message::fatal("No source supplied.")).ok();
        assert_eq!(
            value,
            Some(serde_json::json!({"message": "No source supplied.", "severity": "FATAL"}))
        );
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warning));
        assert!("loud".parse::<Severity>().is_err());
        assert_eq!("aa".parse::<Level>(), Ok(Level::AA));
    }
}
