//! The top-level orchestrator.
//!
//! A [`Runner`] turns configuration into one [`Tester`] per configured rule,
//! runs them all against the supplied sources and emits the combined report
//! once every rule has finished. At most one run is in flight at a time.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, RunnerOptions};
use crate::emitter::Emitter;
use crate::engine::Engines;
use crate::logger::{LogRecord, Threshold};
use crate::output::Output;
use crate::progress::Progress;
use crate::registry::Registry;
use crate::report::Message;
use crate::source::Sources;
use crate::tester::{Tester, TesterEvent, NO_SOURCE};

/// Reported when a run is requested while another is in flight.
pub const IN_PROGRESS: &str = "Tester is in progress. Cancelling...";

/// Logged for every rule still running when a deadline expires.
pub const DEADLINE_EXPIRED: &str = "Rule did not complete before the deadline.";

/// Events emitted by a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerEvent {
    /// The run finished; the payload is the printed report.
    Complete,
    /// The run was refused; the payload is a `FATAL` message object.
    Fail,
}

/// Runs configured rules against sources. Handles are cheap to clone.
#[derive(Clone)]
pub struct Runner {
    inner: Rc<RunnerInner>,
}

struct RunnerInner {
    registry: Rc<Registry>,
    engines: Rc<Engines>,
    options: RefCell<RunnerOptions>,
    testers: RefCell<BTreeMap<String, Tester>>,
    output: Output,
    progress: Progress<String>,
    events: Emitter<RunnerEvent, Value>,
    waiters: RefCell<Vec<oneshot::Sender<Value>>>,
}

impl RunnerInner {
    fn finish(&self, output: &Output) {
        let report = output.print();
        info!(entries = output.len(), "run complete");
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        self.events.emit(&RunnerEvent::Complete, &report);
        for waiter in waiters {
            let _ = waiter.send(report.clone());
        }
    }
}

impl Runner {
    /// Creates a runner over `registry` with the default engines.
    pub fn new(registry: impl Into<Rc<Registry>>) -> Self {
        Self::with_engines(registry, Engines::with_defaults())
    }

    /// Creates a runner over `registry` with custom engines.
    pub fn with_engines(registry: impl Into<Rc<Registry>>, engines: Engines) -> Self {
        let output = Output::default();
        let inner = Rc::new(RunnerInner {
            registry: registry.into(),
            engines: Rc::new(engines),
            options: RefCell::new(RunnerOptions::default()),
            testers: RefCell::new(BTreeMap::new()),
            progress: Progress::new(output.clone()),
            output,
            events: Emitter::new(),
            waiters: RefCell::new(Vec::new()),
        });
        let runner = Rc::downgrade(&inner);
        inner.progress.on_complete(move |output| {
            if let Some(inner) = runner.upgrade() {
                inner.finish(output);
            }
        });
        Self { inner }
    }

    /// Applies `config` and rebuilds the testers.
    ///
    /// Rule option maps merge with those of earlier calls. Configured rules
    /// missing from the registry are skipped. Sources bound to a rule survive
    /// reconfiguration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Busy`] during a run, or another
    /// [`ConfigError`] if the configuration is invalid. Nothing changes on
    /// error.
    pub fn configure(&self, config: &Config) -> Result<&Self, ConfigError> {
        if self.is_busy() {
            return Err(ConfigError::Busy);
        }
        let mut options = self.inner.options.borrow().clone();
        options.apply(config)?;

        let mut testers = BTreeMap::new();
        for name in options.rules.keys() {
            let Some(entry) = self.inner.registry.get(name) else {
                info!(rule = %name, "rule is not registered, skipping");
                continue;
            };
            let tester = Tester::new(
                entry.clone(),
                options.test_options(name, entry.options())?,
                self.inner.output.clone(),
                Rc::clone(&self.inner.engines),
            );
            let bound = self
                .inner
                .testers
                .borrow()
                .get(name)
                .and_then(Tester::bound_sources);
            if let Some(bound) = bound {
                tester.bind_sources(bound);
            }
            self.wire(&tester);
            testers.insert(name.clone(), tester);
        }

        debug!(rules = testers.len(), format = %options.format, "configured");
        self.inner.output.set_format(options.format.clone());
        *self.inner.options.borrow_mut() = options;
        *self.inner.testers.borrow_mut() = testers;
        Ok(self)
    }

    fn wire(&self, tester: &Tester) {
        let runner = Rc::downgrade(&self.inner);
        let name = tester.name().to_string();
        tester.on(TesterEvent::Complete, move |_| {
            if let Some(inner) = runner.upgrade() {
                inner.progress.signal(&name);
            }
        });

        let runner = Rc::downgrade(&self.inner);
        let name = tester.name().to_string();
        let threshold = tester.options().threshold();
        tester.on(TesterEvent::Fail, move |report| {
            let Some(inner) = runner.upgrade() else {
                return;
            };
            if !inner.progress.pending().contains(&name) {
                return;
            }
            inner.output.record(&LogRecord {
                report: report.clone(),
                test: Some(name.clone()),
                source: None,
                threshold,
            });
            inner.progress.signal(&name);
        });
    }

    /// Binds sources to one configured rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRule`] if no tester has that name.
    pub fn bind_sources(&self, name: &str, sources: impl Into<Sources>) -> Result<&Self, ConfigError> {
        let testers = self.inner.testers.borrow();
        let tester = testers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownRule(name.to_string()))?;
        tester.bind_sources(sources);
        Ok(self)
    }

    /// Starts a run. Completion and refusal are reported through
    /// [`RunnerEvent`]s.
    pub fn run(&self, sources: impl Into<Sources>) -> &Self {
        if let Err(message) = self.start(&sources.into()) {
            self.reject(&message);
        }
        self
    }

    /// Runs to completion and returns the printed report.
    ///
    /// With a `deadline`, rules still running when it passes are logged as
    /// `FATAL`, abandoned, and the report is returned without them.
    ///
    /// # Errors
    ///
    /// Returns the `FATAL` message if the run was refused.
    pub async fn run_until_complete(
        &self,
        sources: impl Into<Sources>,
        deadline: Option<Duration>,
    ) -> Result<Value, Message> {
        let (sender, mut receiver) = oneshot::channel();
        self.inner.waiters.borrow_mut().push(sender);
        if let Err(message) = self.start(&sources.into()) {
            self.inner.waiters.borrow_mut().pop();
            self.reject(&message);
            return Err(message);
        }

        if let Some(deadline) = deadline {
            if let Ok(received) = tokio::time::timeout(deadline, &mut receiver).await {
                return received.map_err(|_| Message::fatal("Runner dropped before completion."));
            }
            let expired = self.expire();
            warn!(expired, ?deadline, "deadline expired");
        }
        receiver
            .await
            .map_err(|_| Message::fatal("Runner dropped before completion."))
    }

    fn start(&self, sources: &Sources) -> Result<(), Message> {
        if self.is_busy() {
            return Err(Message::fatal(IN_PROGRESS));
        }
        let testers: Vec<Tester> = self.inner.testers.borrow().values().cloned().collect();
        let has_source = !sources.is_empty()
            || testers
                .iter()
                .any(|tester| tester.bound_sources().is_some_and(|bound| !bound.is_empty()));
        if !has_source {
            return Err(Message::fatal(NO_SOURCE));
        }

        self.inner.output.clear();
        info!(rules = testers.len(), sources = sources.len(), "run started");
        self.inner
            .progress
            .start(testers.iter().map(|tester| tester.name().to_string()));
        for tester in &testers {
            tester.run(sources);
        }
        Ok(())
    }

    fn reject(&self, message: &Message) {
        warn!(reason = %message.message, "run refused");
        let payload = json!({
            "severity": message.severity,
            "message": message.message,
        });
        self.inner.events.emit(&RunnerEvent::Fail, &payload);
    }

    /// Ends the current run now. Every rule still running is logged as
    /// `FATAL` and abandoned, then `complete` fires. Returns the number of
    /// rules cut off.
    pub fn expire(&self) -> usize {
        let testers = self.inner.testers.borrow().clone();
        let inner = &self.inner;
        inner.progress.expire(|name| {
            let threshold = match testers.get(name) {
                Some(tester) => {
                    tester.abandon();
                    tester.options().threshold()
                }
                None => Threshold::default(),
            };
            inner.output.record(&LogRecord {
                report: Message::fatal(DEADLINE_EXPIRED).into(),
                test: Some(name.clone()),
                source: None,
                threshold,
            });
        })
    }

    /// Returns true while a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.progress.is_busy()
    }

    /// Rules still running in the current run.
    pub fn pending(&self) -> Vec<String> {
        self.inner.progress.pending()
    }

    /// Subscribes to `event`.
    pub fn on(&self, event: RunnerEvent, listener: impl Fn(&Value) + 'static) -> &Self {
        self.inner.events.on(event, listener);
        self
    }

    /// The shared output buffer.
    pub fn output(&self) -> &Output {
        &self.inner.output
    }

    /// The accumulated configuration.
    pub fn options(&self) -> RunnerOptions {
        self.inner.options.borrow().clone()
    }

    /// The rule catalog.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The tester for a configured rule.
    pub fn tester(&self, name: &str) -> Option<Tester> {
        self.inner.testers.borrow().get(name).cloned()
    }

    /// Every configured tester in name order.
    pub fn testers(&self) -> Vec<Tester> {
        self.inner.testers.borrow().values().cloned().collect()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("rules", &self.inner.testers.borrow().keys().collect::<Vec<_>>())
            .field("busy", &self.is_busy())
            .finish()
    }
}
