//! Typed configuration and the option layering applied to every rule.
//!
//! Option precedence for a rule, lowest first:
//!
//! 1. global values ([`RunnerOptions`]: severity, level, source types),
//! 2. the defaults the rule was registered with,
//! 3. the rule's entry under `rules` in the configuration.
//!
//! Rule-specific keys travel as a JSON map and are layered with
//! [`merge_map`], so nested objects merge and arrays replace.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::logger::Threshold;
use crate::report::{Level, Severity};
use crate::source::SrcTypes;
use crate::util::merge_map;

/// Terminal segment every format must end with.
pub const JSON_TERMINAL: &str = "json";

/// Errors raised while applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The format does not end with `json`.
    #[error("unsupported output format `{0}`: the last segment must be `json`")]
    UnsupportedFormat(String),
    /// A format segment is not one of `test`, `source`, `level`, `severity`.
    #[error("unknown format segment `{0}`")]
    UnknownSegment(String),
    /// A rule's layered options do not fit [`TestOptions`].
    #[error("invalid options for rule `{name}`: {source}")]
    RuleOptions {
        /// Rule name.
        name: String,
        /// Deserialization failure.
        source: serde_json::Error,
    },
    /// No configured rule has this name.
    #[error("rule `{0}` is not configured")]
    UnknownRule(String),
    /// A run is in flight.
    #[error("cannot reconfigure while a run is in progress")]
    Busy,
}

/// One key of the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Rule name.
    Test,
    /// Source identity.
    Source,
    /// WCAG level.
    Level,
    /// Severity.
    Severity,
}

impl Segment {
    /// Returns the segment name used in format strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Test => "test",
            Segment::Source => "source",
            Segment::Level => "level",
            Segment::Severity => "severity",
        }
    }
}

impl FromStr for Segment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Segment::Test),
            "source" => Ok(Segment::Source),
            "level" => Ok(Segment::Level),
            "severity" => Ok(Segment::Severity),
            other => Err(ConfigError::UnknownSegment(other.to_string())),
        }
    }
}

/// A dot path such as `test.source.level.severity.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    segments: Vec<Segment>,
}

impl Format {
    /// Parses a dot path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] if the path does not end
    /// with `json`, or [`ConfigError::UnknownSegment`] for an unknown key.
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        let mut parts: Vec<&str> = format.split('.').map(str::trim).collect();
        if parts.pop() != Some(JSON_TERMINAL) {
            return Err(ConfigError::UnsupportedFormat(format.to_string()));
        }
        let segments = parts
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<Segment>, _>>()?;
        Ok(Self { segments })
    }

    /// The path keys, outermost first.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Default for Format {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Test,
                Segment::Source,
                Segment::Level,
                Segment::Severity,
            ],
        }
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::parse(s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{}.", segment.as_str())?;
        }
        f.write_str(JSON_TERMINAL)
    }
}

/// A configuration file or inline configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Minimum severity reported.
    pub severity: Option<Severity>,
    /// Minimum WCAG level reported.
    pub level: Option<Level>,
    /// Source types rules apply to unless they say otherwise.
    pub src_types: Option<SrcTypes>,
    /// Output path, e.g. `test.source.level.severity.json`.
    pub format: Option<String>,
    /// Files and directories to check.
    pub src: Vec<String>,
    /// Rules to run, each with its own options.
    pub rules: BTreeMap<String, Map<String, Value>>,
}

/// Options resolved for one rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    /// Default severity of messages and the reporting threshold.
    #[serde(default)]
    pub severity: Severity,
    /// Default level of messages and the reporting threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// Source types the rule applies to.
    #[serde(default)]
    pub src_types: SrcTypes,
    /// Rule-specific options.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl TestOptions {
    /// The reporting threshold these options define.
    pub fn threshold(&self) -> Threshold {
        Threshold {
            severity: self.severity,
            level: self.level,
        }
    }
}

/// Accumulated runner configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOptions {
    /// Global severity threshold.
    pub severity: Severity,
    /// Global level threshold.
    pub level: Option<Level>,
    /// Global source types.
    pub src_types: SrcTypes,
    /// Output path.
    pub format: Format,
    /// Default source paths.
    pub src: Vec<String>,
    /// Configured rules and their call-site options.
    pub rules: BTreeMap<String, Map<String, Value>>,
}

impl RunnerOptions {
    /// Overlays `config`. Rule option maps merge with earlier configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the format is invalid; nothing is
    /// applied in that case.
    pub fn apply(&mut self, config: &Config) -> Result<(), ConfigError> {
        let format = config.format.as_deref().map(Format::parse).transpose()?;
        if let Some(format) = format {
            self.format = format;
        }
        if let Some(severity) = config.severity {
            self.severity = severity;
        }
        if config.level.is_some() {
            self.level = config.level;
        }
        if let Some(src_types) = &config.src_types {
            self.src_types = src_types.clone();
        }
        if !config.src.is_empty() {
            self.src = config.src.clone();
        }
        for (name, options) in &config.rules {
            merge_map(self.rules.entry(name.clone()).or_default(), options);
        }
        Ok(())
    }

    /// Resolves the options of rule `name` registered with `defaults`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RuleOptions`] if a layered value has the wrong
    /// type, such as an unknown severity.
    pub fn test_options(
        &self,
        name: &str,
        defaults: &Map<String, Value>,
    ) -> Result<TestOptions, ConfigError> {
        let invalid = |source| ConfigError::RuleOptions {
            name: name.to_string(),
            source,
        };
        let globals = TestOptions {
            severity: self.severity,
            level: self.level,
            src_types: self.src_types.clone(),
            options: Map::new(),
        };
        let mut layered = match serde_json::to_value(globals).map_err(invalid)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merge_map(&mut layered, defaults);
        if let Some(call_site) = self.rules.get(name) {
            merge_map(&mut layered, call_site);
        }
        serde_json::from_value(Value::Object(layered)).map_err(invalid)
    }
}
