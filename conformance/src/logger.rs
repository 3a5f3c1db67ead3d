//! Severity-aware log relay.

use crate::emitter::Emitter;
use crate::report::{Level, Report, Severity};

static SEVERITIES: [Severity; 4] = Severity::ALL;

/// The severity and level below which messages are suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Threshold {
    /// Minimum severity kept in the report.
    pub severity: Severity,
    /// Minimum WCAG level kept in the report. `None` keeps every level.
    pub level: Option<Level>,
}

/// One `log` event: a report stamped with the identity of its producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Messages being logged.
    pub report: Report,
    /// Name of the rule that produced the report.
    pub test: Option<String>,
    /// Identity of the source the rule was evaluating.
    pub source: Option<String>,
    /// The producing test's threshold, also the default for unset fields.
    pub threshold: Threshold,
}

/// Events emitted by a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoggerEvent {
    /// A record was logged.
    Log,
}

/// Relays log records to subscribers and knows which severities it keeps.
#[derive(Debug)]
pub struct Logger {
    threshold: Threshold,
    severities: &'static [Severity],
    events: Emitter<LoggerEvent, LogRecord>,
}

impl Logger {
    /// Creates a logger keeping severities at or above `threshold.severity`.
    pub fn new(threshold: Threshold) -> Self {
        let start = SEVERITIES
            .iter()
            .position(|severity| *severity == threshold.severity)
            .unwrap_or(0);
        Self {
            threshold,
            severities: &SEVERITIES[start..],
            events: Emitter::new(),
        }
    }

    /// Returns the configured threshold.
    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Returns the severities this logger keeps, lowest first.
    pub fn severities(&self) -> &'static [Severity] {
        self.severities
    }

    /// Returns true if `severity` is below this logger's threshold.
    pub fn ignores(&self, severity: Severity) -> bool {
        !self.severities.contains(&severity)
    }

    /// Emits `record` to every `log` subscriber.
    pub fn log(&self, record: LogRecord) -> &Self {
        self.events.emit(&LoggerEvent::Log, &record);
        self
    }

    /// Subscribes to `log` events.
    pub fn on_log(&self, listener: impl Fn(&LogRecord) + 'static) -> &Self {
        self.events.on(LoggerEvent::Log, listener);
        self
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Threshold::default())
    }
}

/// Returns true if a message should be left out of the report.
///
/// A message is suppressed when its severity is below `threshold`, or when
/// both levels are known and `level` is below `threshold_level`.
pub fn ignore(
    severity: Severity,
    threshold: Severity,
    level: Option<Level>,
    threshold_level: Option<Level>,
) -> bool {
    if severity < threshold {
        return true;
    }
    matches!((level, threshold_level), (Some(level), Some(min)) if level < min)
}
