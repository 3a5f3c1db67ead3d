//! The shared log buffer and its nested JSON projection.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::config::{Format, Segment};
use crate::logger::{ignore, LogRecord, Logger, Threshold};
use crate::report::{Level, Severity};

/// Key under which messages are stored when a path ends at an object.
pub const MESSAGES_KEY: &str = "messages";

/// One normalised message in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Message text.
    pub message: String,
    /// Severity, defaulted from the producing rule.
    pub severity: Severity,
    /// Level, defaulted from the producing rule.
    pub level: Option<Level>,
    /// Producing rule.
    pub test: Option<String>,
    /// Source identity.
    pub source: Option<String>,
    /// The producing rule's threshold.
    pub threshold: Threshold,
}

impl LogEntry {
    /// Returns true if the entry is below its rule's threshold.
    pub fn is_ignored(&self) -> bool {
        ignore(
            self.severity,
            self.threshold.severity,
            self.level,
            self.threshold.level,
        )
    }

    fn segment(&self, segment: Segment) -> Option<String> {
        match segment {
            Segment::Test => self.test.clone(),
            Segment::Source => self.source.clone(),
            Segment::Level => self.level.map(|level| level.as_str().to_string()),
            Segment::Severity => Some(self.severity.as_str().to_string()),
        }
    }
}

/// Append-only buffer of log entries shared by every rule of a run.
///
/// Handles are cheap to clone and share the same buffer.
#[derive(Clone, Default)]
pub struct Output {
    inner: Rc<OutputInner>,
}

#[derive(Default)]
struct OutputInner {
    format: RefCell<Format>,
    entries: RefCell<Vec<LogEntry>>,
}

impl Output {
    /// Creates an empty buffer printed with `format`.
    pub fn new(format: Format) -> Self {
        Self {
            inner: Rc::new(OutputInner {
                format: RefCell::new(format),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns the print format.
    pub fn format(&self) -> Format {
        self.inner.format.borrow().clone()
    }

    /// Replaces the print format.
    pub fn set_format(&self, format: Format) {
        *self.inner.format.borrow_mut() = format;
    }

    /// Appends every record `logger` emits.
    pub fn attach(&self, logger: &Logger) {
        self.attach_while(logger, || true);
    }

    /// Appends records `logger` emits while `live` returns true.
    pub fn attach_while(&self, logger: &Logger, live: impl Fn() -> bool + 'static) {
        let output = self.clone();
        logger.on_log(move |record| {
            if live() {
                output.record(record);
            }
        });
    }

    /// Normalises and appends every message of `record`.
    pub fn record(&self, record: &LogRecord) {
        let mut entries = self.inner.entries.borrow_mut();
        entries.extend(record.report.iter().map(|message| LogEntry {
            message: message.message.clone(),
            severity: message.severity.unwrap_or(record.threshold.severity),
            level: message.level.or(record.threshold.level),
            test: record.test.clone(),
            source: record.source.clone(),
            threshold: record.threshold,
        }));
    }

    /// Returns a copy of the buffer.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.entries.borrow().clone()
    }

    /// Number of buffered entries, ignored ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Returns true if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Empties the buffer. The format is kept.
    pub fn clear(&self) {
        self.inner.entries.borrow_mut().clear();
    }

    /// Highest severity among entries that survive filtering.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|entry| !entry.is_ignored())
            .map(|entry| entry.severity)
            .max()
    }

    /// Projects the buffer into a nested object keyed by the format path.
    ///
    /// Segments an entry has no value for are skipped, and messages keep
    /// their insertion order.
    pub fn print(&self) -> Value {
        let format = self.inner.format.borrow();
        let mut root = Value::Object(Map::new());
        for entry in self.inner.entries.borrow().iter() {
            if entry.is_ignored() {
                continue;
            }
            let path: Vec<String> = format
                .segments()
                .iter()
                .filter_map(|segment| entry.segment(*segment))
                .collect();
            push_message(&mut root, &path, &entry.message);
        }
        root
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("format", &self.inner.format.borrow().to_string())
            .field("entries", &self.inner.entries.borrow().len())
            .finish()
    }
}

fn push_message(node: &mut Value, path: &[String], message: &str) {
    let Some((head, rest)) = path.split_first() else {
        append(node, message);
        return;
    };
    if !node.is_object() {
        let mut map = Map::new();
        if let Value::Array(items) = node.take() {
            if !items.is_empty() {
                map.insert(MESSAGES_KEY.to_string(), Value::Array(items));
            }
        }
        *node = Value::Object(map);
    }
    if let Value::Object(map) = node {
        push_message(
            map.entry(head.clone()).or_insert(Value::Null),
            rest,
            message,
        );
    }
}

fn append(node: &mut Value, message: &str) {
    match node {
        Value::Array(items) => items.push(Value::String(message.to_string())),
        Value::Object(map) => append(
            map.entry(MESSAGES_KEY)
                .or_insert_with(|| Value::Array(Vec::new())),
            message,
        ),
        other => *other = Value::Array(vec![Value::String(message.to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Message, Report};
    use serde_json::json;

    fn record(test: &str, source: &str, report: impl Into<Report>, threshold: Threshold) -> LogRecord {
        LogRecord {
            report: report.into(),
            test: Some(test.to_string()),
            source: Some(source.to_string()),
            threshold,
        }
    }

    #[test]
    fn print_nests_by_default_format() {
        let output = Output::default();
        output.record(&record(
            "rule",
            "0",
            vec![Message::info("a"), Message::error("b"), Message::info("a")],
            Threshold::default(),
        ));
        assert_eq!(
            output.print(),
            json!({"rule": {"0": {"INFO": ["a", "a"], "ERROR": ["b"]}}})
        );
    }

    #[test]
    fn print_includes_level_when_known() {
        let output = Output::default();
        output.record(&record(
            "rule",
            "page.html",
            Message::warning("w").with_level(Level::AA),
            Threshold::default(),
        ));
        assert_eq!(
            output.print(),
            json!({"rule": {"page.html": {"AA": {"WARNING": ["w"]}}}})
        );
    }

    #[test]
    fn messages_inherit_rule_defaults() {
        let output = Output::default();
        let threshold = Threshold {
            severity: Severity::Warning,
            level: None,
        };
        output.record(&record("rule", "0", Message::new("plain"), threshold));
        let entries = output.entries();
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(output.print(), json!({"rule": {"0": {"WARNING": ["plain"]}}}));
    }

    #[test]
    fn filtered_entries_are_left_out() {
        let output = Output::default();
        let threshold = Threshold {
            severity: Severity::Error,
            level: Some(Level::AA),
        };
        output.record(&record(
            "rule",
            "0",
            vec![
                Message::warning("quiet"),
                Message::error("loud"),
                Message::error("minor").with_level(Level::A),
            ],
            threshold,
        ));
        assert_eq!(output.print(), json!({"rule": {"0": {"AA": {"ERROR": ["loud"]}}}}));
        assert_eq!(output.worst_severity(), Some(Severity::Error));
    }

    #[test]
    fn print_is_idempotent() {
        let output = Output::default();
        output.record(&record("r", "0", Message::info("x"), Threshold::default()));
        assert_eq!(output.print(), output.print());
        assert_eq!(output.len(), 1);
    }

    #[test]
    fn colliding_paths_use_messages_key() {
        let output = Output::new(Format::parse("test.level.json").unwrap_or_default());
        output.record(&record("r", "0", Message::info("flat"), Threshold::default()));
        output.record(&record(
            "r",
            "0",
            Message::info("deep").with_level(Level::A),
            Threshold::default(),
        ));
        assert_eq!(
            output.print(),
            json!({"r": {"messages": ["flat"], "A": ["deep"]}})
        );
    }

    #[test]
    fn clear_keeps_format() {
        let output = Output::new(Format::parse("severity.json").unwrap_or_default());
        output.record(&record("r", "0", Message::info("x"), Threshold::default()));
        output.clear();
        assert!(output.is_empty());
        assert_eq!(output.print(), json!({}));
        assert_eq!(output.format().to_string(), "severity.json");
    }
}
