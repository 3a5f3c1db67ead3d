//! One rule evaluated against one source.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::debug;

use crate::config::TestOptions;
use crate::emitter::Emitter;
use crate::engine::Document;
use crate::logger::{LogRecord, Logger};
use crate::report::{Message, Report};
use crate::rule::{Rule, RuleContext};
use crate::source::SrcType;

/// Prefix of the message reported when a rule errors or panics.
pub const EVALUATION_ERROR: &str = "Error during rule evaluation: ";

/// Events emitted by a [`Test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestEvent {
    /// The rule completed.
    Complete,
    /// The rule failed.
    Fail,
}

/// Lifecycle of a [`Test`]. `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    /// Not started.
    Idle,
    /// The rule was invoked and has not finished.
    Running,
    /// The rule completed.
    Completed,
    /// The rule failed.
    Failed,
}

/// Per-source values that take precedence over the test's own.
#[derive(Clone, Default)]
pub struct RunOverrides {
    /// Type of the source.
    pub src_type: Option<SrcType>,
    /// Parsed document.
    pub engine: Option<Rc<dyn Document>>,
    /// Identity of the source.
    pub source: Option<String>,
}

/// A single evaluation of a rule. Handles are cheap to clone.
#[derive(Clone)]
pub struct Test {
    inner: Rc<TestInner>,
}

struct TestInner {
    name: String,
    rule: Rc<dyn Rule>,
    options: Rc<TestOptions>,
    state: Cell<TestState>,
    events: Emitter<TestEvent, Report>,
    logger: Logger,
}

impl Test {
    /// Creates an idle test for `rule` with resolved `options`.
    pub fn new(name: impl Into<String>, rule: Rc<dyn Rule>, options: Rc<TestOptions>) -> Self {
        let logger = Logger::new(options.threshold());
        Self {
            inner: Rc::new(TestInner {
                name: name.into(),
                rule,
                options,
                state: Cell::new(TestState::Idle),
                events: Emitter::new(),
                logger,
            }),
        }
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Resolved options.
    pub fn options(&self) -> &TestOptions {
        &self.inner.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TestState {
        self.inner.state.get()
    }

    /// The logger that stamps this test's `log` records.
    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Returns true if the rule applies to sources of `src_type`.
    pub fn supports(&self, src_type: Option<SrcType>) -> bool {
        self.inner.options.src_types.supports(src_type)
    }

    /// Subscribes to `event`.
    pub fn on(&self, event: TestEvent, listener: impl Fn(&Report) + 'static) -> &Self {
        self.inner.events.on(event, listener);
        self
    }

    /// Invokes the rule on `src`. Ignored unless the test is idle.
    ///
    /// An error or panic escaping the rule becomes a `FATAL` failure.
    pub fn run(&self, src: &str, overrides: RunOverrides) {
        if self.state() != TestState::Idle {
            debug!(test = %self.name(), state = ?self.state(), "ignoring run of a started test");
            return;
        }
        self.inner.state.set(TestState::Running);
        let cx = RuleContext::new(
            self.clone(),
            overrides.src_type,
            overrides.engine,
            overrides.source,
        );
        if let Err(message) = self.evaluate(src, cx) {
            self.fail(message.into());
        }
    }

    fn evaluate(&self, src: &str, cx: RuleContext) -> Result<(), Message> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.inner.rule.check(src, cx)));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(evaluation_error(err)),
            Err(payload) => Err(evaluation_error(panic_message(payload.as_ref()))),
        }
    }

    /// Emits `complete`. Ignored unless the test is running.
    pub fn complete(&self, report: Report) {
        self.finish(TestState::Completed, TestEvent::Complete, report);
    }

    /// Emits `fail`. Ignored unless the test is running.
    pub fn fail(&self, report: Report) {
        self.finish(TestState::Failed, TestEvent::Fail, report);
    }

    fn finish(&self, state: TestState, event: TestEvent, report: Report) {
        if self.state() != TestState::Running {
            debug!(test = %self.name(), ?event, "ignoring late rule event");
            return;
        }
        self.inner.state.set(state);
        self.inner.events.emit(&event, &report);
    }

    /// Logs `report` for `source` through this test's logger. Ignored unless
    /// the test is running.
    pub fn log(&self, report: Report, source: Option<String>) {
        if self.state() != TestState::Running {
            debug!(test = %self.name(), state = ?self.state(), "ignoring late log");
            return;
        }
        self.inner.logger.log(LogRecord {
            report,
            test: Some(self.inner.name.clone()),
            source,
            threshold: self.inner.options.threshold(),
        });
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

fn evaluation_error(err: impl fmt::Display) -> Message {
    Message::fatal(format!("{EVALUATION_ERROR}{err}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "rule panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::rule::RuleError;
    use crate::source::SrcTypes;
    use std::cell::RefCell;

    fn test_with(
        rule: impl Fn(&str, RuleContext) -> Result<(), RuleError> + 'static,
        options: TestOptions,
    ) -> Test {
        Test::new("sample", Rc::new(rule), Rc::new(options))
    }

    fn capture(test: &Test) -> Rc<RefCell<Vec<(TestEvent, Report)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for event in [TestEvent::Complete, TestEvent::Fail] {
            let sink = Rc::clone(&seen);
            test.on(event, move |report| sink.borrow_mut().push((event, report.clone())));
        }
        seen
    }

    #[test]
    fn synchronous_completion() {
        let test = test_with(
            |_src, cx| {
                cx.complete(Message::info("ok"));
                Ok(())
            },
            TestOptions::default(),
        );
        let seen = capture(&test);
        test.run("<p></p>", RunOverrides::default());
        assert_eq!(test.state(), TestState::Completed);
        assert_eq!(
            *seen.borrow(),
            vec![(TestEvent::Complete, Report::from(Message::info("ok")))]
        );
    }

    #[test]
    fn returned_error_becomes_fatal_failure() {
        let test = test_with(
            |_src, _cx| Err(RuleError::msg("boom")),
            TestOptions::default(),
        );
        let seen = capture(&test);
        test.run("x", RunOverrides::default());
        assert_eq!(test.state(), TestState::Failed);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, TestEvent::Fail);
        let message = &seen[0].1.messages()[0];
        assert_eq!(message.severity, Some(Severity::Fatal));
        assert_eq!(message.message, "Error during rule evaluation: boom");
    }

    #[test]
    fn panic_becomes_fatal_failure() {
        #[allow(clippy::panic)]
        let test = test_with(
            |_src, _cx| panic!("exploded"),
            TestOptions::default(),
        );
        let seen = capture(&test);
        test.run("x", RunOverrides::default());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].1.messages()[0].message,
            "Error during rule evaluation: exploded"
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let test = test_with(
            |_src, cx| {
                cx.complete(Message::info("first"));
                cx.complete(Message::info("second"));
                Err(RuleError::msg("after completion"))
            },
            TestOptions::default(),
        );
        let seen = capture(&test);
        test.run("x", RunOverrides::default());
        test.run("x", RunOverrides::default());
        assert_eq!(test.state(), TestState::Completed);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn deferred_completion_keeps_running_state() {
        let parked = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&parked);
        let test = test_with(
            move |_src, cx| {
                *slot.borrow_mut() = Some(cx);
                Ok(())
            },
            TestOptions::default(),
        );
        let seen = capture(&test);
        test.run("x", RunOverrides::default());
        assert_eq!(test.state(), TestState::Running);

        let cx = parked.borrow_mut().take();
        if let Some(cx) = cx {
            cx.done();
        }
        assert_eq!(test.state(), TestState::Completed);
        assert_eq!(seen.borrow()[0], (TestEvent::Complete, Report::new()));
    }

    #[test]
    fn supports_follows_src_types() {
        let options = TestOptions {
            src_types: SrcTypes::One(SrcType::Html),
            ..TestOptions::default()
        };
        let test = test_with(
            |_src, cx| {
                cx.done();
                Ok(())
            },
            options,
        );
        assert!(test.supports(Some(SrcType::Html)));
        assert!(!test.supports(Some(SrcType::Css)));
        assert!(!test.supports(None));
    }

    #[test]
    fn log_stamps_test_and_source() {
        let test = test_with(
            |_src, cx| {
                cx.log(Message::warning("careful"));
                cx.done();
                Ok(())
            },
            TestOptions::default(),
        );
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        test.logger()
            .on_log(move |record| sink.borrow_mut().push(record.clone()));
        test.run(
            "x",
            RunOverrides {
                source: Some("page.html".into()),
                ..RunOverrides::default()
            },
        );
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test.as_deref(), Some("sample"));
        assert_eq!(records[0].source.as_deref(), Some("page.html"));
    }

    #[test]
    fn log_after_completion_is_not_relayed() {
        let parked = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&parked);
        let test = test_with(
            move |_src, cx| {
                cx.log(Message::warning("before"));
                cx.complete(Message::info("done"));
                *slot.borrow_mut() = Some(cx);
                Ok(())
            },
            TestOptions::default(),
        );
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        test.logger()
            .on_log(move |record| sink.borrow_mut().push(record.clone()));
        test.run("x", RunOverrides::default());

        let cx = parked.borrow_mut().take();
        if let Some(cx) = cx {
            cx.log(Message::error("after"));
        }
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].report, Report::from(Message::warning("before")));
    }

    #[test]
    fn log_before_run_is_not_relayed() {
        let test = test_with(|_src, _cx| Ok(()), TestOptions::default());
        let records = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&records);
        test.logger().on_log(move |_| *sink.borrow_mut() += 1);
        test.log(Message::error("early").into(), None);
        assert_eq!(*records.borrow(), 0);
    }
}
