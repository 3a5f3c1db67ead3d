//! Checkup: a pluggable document-validation harness.
//!
//! A [`Registry`] holds named rules. A [`Runner`] is configured with the
//! rules to run and their options, then runs every rule against a set of
//! HTML or CSS sources. Rules report through a [`RuleContext`], synchronously
//! or from a deferred task, and the runner emits one combined report once
//! every rule has finished.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`emitter`] | keyed publish/subscribe |
//! | [`report`] | severities, levels, messages |
//! | [`source`] | source documents and type inference |
//! | [`engine`] | HTML (scraper) and CSS (cssparser) documents |
//! | [`test`] | one rule against one source |
//! | [`tester`] | one rule against every source |
//! | [`progress`] | exactly-once completion of a set of steps |
//! | [`output`] | log buffer and nested JSON report |
//! | [`runner`] | top-level orchestration |
//! | [`rules`] | built-in rules |
//! | [`loader`] | configuration files and source files |
//!
//! # Entry Point
//!
//! ```
//! use checkup_conformance::{Config, Registry, Runner, RunnerEvent};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let runner = Runner::new(Registry::builtin());
//! let config: Config = serde_json::from_value(json!({"rules": {"wai-img": {}}}))?;
//! runner.configure(&config)?;
//!
//! let report = Rc::new(RefCell::new(None));
//! let sink = Rc::clone(&report);
//! runner.on(RunnerEvent::Complete, move |value| *sink.borrow_mut() = Some(value.clone()));
//! runner.run(r#"<img src="logo.png">"#);
//!
//! assert_eq!(
//!     *report.borrow(),
//!     Some(json!({"wai-img": {"0": {
//!         "ERROR": [r#"Image <img src="logo.png">: does not have an "alt" attribute"#],
//!         "INFO": ["Complete."]
//!     }}}))
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod config;
pub mod emitter;
pub mod engine;
pub mod loader;
pub mod logger;
pub mod output;
pub mod progress;
pub mod registry;
pub mod report;
pub mod rule;
pub mod rules;
pub mod runner;
pub mod source;
pub mod test;
pub mod tester;
pub mod util;

pub use config::{Config, ConfigError, Format, RunnerOptions, Segment, TestOptions};
pub use engine::{Document, Element, Engine, EngineError, Engines};
pub use loader::{read_config, LoadError, SourceLoader};
pub use logger::{Logger, Threshold};
pub use output::{LogEntry, Output};
pub use progress::Progress;
pub use registry::{Registry, RuleEntry};
pub use report::{Level, Message, Report, Severity};
pub use rule::{Rule, RuleContext, RuleError};
pub use runner::{Runner, RunnerEvent};
pub use source::{Source, Sources, SrcType, SrcTypes};
pub use test::{Test, TestEvent, TestState};
pub use tester::{Tester, TesterEvent};
