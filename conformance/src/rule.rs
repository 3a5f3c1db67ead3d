//! The rule contract and the context handed to every evaluation.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::engine::{Document, EngineError};
use crate::report::Report;
use crate::source::SrcType;
use crate::test::Test;

/// Errors a rule may return instead of completing.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule gave up with a message.
    #[error("{0}")]
    Failed(String),
    /// The rule needs a parsed document but the source has none.
    #[error("no engine is available for this source")]
    MissingEngine,
    /// A document query failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// An option had the wrong shape.
    #[error("option `{key}` is invalid: {source}")]
    Option {
        /// Option name.
        key: String,
        /// Deserialization failure.
        source: serde_json::Error,
    },
}

impl RuleError {
    /// Creates a [`RuleError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        RuleError::Failed(message.into())
    }
}

/// A validation rule.
///
/// `check` must eventually call [`RuleContext::complete`] (or
/// [`RuleContext::done`]) exactly once, either before returning or later from
/// a deferred task holding a clone of the context. It may call
/// [`RuleContext::log`] any number of times first. Returning `Err` or
/// panicking fails the evaluation with a `FATAL` message.
pub trait Rule {
    /// Evaluates `src`.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] when the rule cannot evaluate the source.
    fn check(&self, src: &str, cx: RuleContext) -> Result<(), RuleError>;
}

impl<F> Rule for F
where
    F: Fn(&str, RuleContext) -> Result<(), RuleError>,
{
    fn check(&self, src: &str, cx: RuleContext) -> Result<(), RuleError> {
        self(src, cx)
    }
}

/// Everything a rule may touch while evaluating one source.
#[derive(Clone)]
pub struct RuleContext {
    test: Test,
    src_type: Option<SrcType>,
    engine: Option<Rc<dyn Document>>,
    source: Option<String>,
}

impl RuleContext {
    pub(crate) fn new(
        test: Test,
        src_type: Option<SrcType>,
        engine: Option<Rc<dyn Document>>,
        source: Option<String>,
    ) -> Self {
        Self {
            test,
            src_type,
            engine,
            source,
        }
    }

    /// Finishes the evaluation with `report`.
    pub fn complete(&self, report: impl Into<Report>) {
        self.test.complete(report.into());
    }

    /// Finishes the evaluation with nothing to report.
    pub fn done(&self) {
        self.complete(Report::new());
    }

    /// Logs `report` without finishing.
    pub fn log(&self, report: impl Into<Report>) {
        self.test.log(report.into(), self.source.clone());
    }

    /// Rule-specific options after every configuration layer was applied.
    pub fn options(&self) -> &Map<String, Value> {
        &self.test.options().options
    }

    /// Reads a rule-specific option.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Option`] if the option is present but cannot be
    /// read as `T`.
    pub fn option<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RuleError> {
        match self.options().get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                serde_json::from_value(value.clone())
                    .map(Some)
                    .map_err(|source| RuleError::Option {
                        key: key.to_string(),
                        source,
                    })
            }
        }
    }

    /// The type of the source under evaluation, if known.
    pub fn src_type(&self) -> Option<SrcType> {
        self.src_type
    }

    /// The parsed document, if an engine processed the source.
    pub fn engine(&self) -> Option<&Rc<dyn Document>> {
        self.engine.as_ref()
    }

    /// The parsed document, or an error a rule can return with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::MissingEngine`] if the source was not parsed.
    pub fn document(&self) -> Result<&dyn Document, RuleError> {
        self.engine.as_deref().ok_or(RuleError::MissingEngine)
    }

    /// Identity of the source under evaluation.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Name of the rule being evaluated.
    pub fn test_name(&self) -> &str {
        self.test.name()
    }
}
