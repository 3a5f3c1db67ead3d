//! One rule evaluated against every source of a run.
//!
//! A [`Tester`] owns a nested [`Progress`] keyed by source index. Each run
//! bumps a generation counter; events from an older generation (a previous
//! run, or a run abandoned at its deadline) are dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::config::TestOptions;
use crate::emitter::Emitter;
use crate::engine::{Document, Engines};
use crate::logger::LogRecord;
use crate::output::Output;
use crate::progress::Progress;
use crate::registry::RuleEntry;
use crate::report::{Message, Report};
use crate::source::{Source, Sources};
use crate::test::{RunOverrides, Test, TestEvent};

/// Reported when neither the run nor the tester has a source.
pub const NO_SOURCE: &str = "No source supplied.";

/// Default completion message for rules that complete with an empty report.
pub const COMPLETE: &str = "Complete.";

/// Events emitted by a [`Tester`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TesterEvent {
    /// Every source was evaluated.
    Complete,
    /// The tester could not run at all.
    Fail,
}

/// A rule bound to its resolved options, the shared output and engines.
/// Handles are cheap to clone.
#[derive(Clone)]
pub struct Tester {
    inner: Rc<TesterInner>,
}

struct TesterInner {
    entry: RuleEntry,
    options: Rc<TestOptions>,
    output: Output,
    engines: Rc<Engines>,
    sources: RefCell<Option<Sources>>,
    generation: Cell<u64>,
    progress: RefCell<Option<Progress<usize>>>,
    events: Emitter<TesterEvent, Report>,
}

impl TesterInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }
}

impl Tester {
    /// Binds `entry` to `options`, reporting into `output`.
    pub fn new(entry: RuleEntry, options: TestOptions, output: Output, engines: Rc<Engines>) -> Self {
        Self {
            inner: Rc::new(TesterInner {
                entry,
                options: Rc::new(options),
                output,
                engines,
                sources: RefCell::new(None),
                generation: Cell::new(0),
                progress: RefCell::new(None),
                events: Emitter::new(),
            }),
        }
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        self.inner.entry.name()
    }

    /// Rule description.
    pub fn description(&self) -> &str {
        self.inner.entry.description()
    }

    /// Resolved options.
    pub fn options(&self) -> &TestOptions {
        &self.inner.options
    }

    /// Subscribes to `event`.
    pub fn on(&self, event: TesterEvent, listener: impl Fn(&Report) + 'static) -> &Self {
        self.inner.events.on(event, listener);
        self
    }

    /// Binds sources this rule checks instead of the run's sources.
    pub fn bind_sources(&self, sources: impl Into<Sources>) {
        *self.inner.sources.borrow_mut() = Some(sources.into());
    }

    /// Sources bound with [`Tester::bind_sources`].
    pub fn bound_sources(&self) -> Option<Sources> {
        self.inner.sources.borrow().clone()
    }

    /// Returns true while a run has sources outstanding.
    pub fn is_busy(&self) -> bool {
        self.inner
            .progress
            .borrow()
            .as_ref()
            .is_some_and(Progress::is_busy)
    }

    /// Drops the current run. Its late events are ignored.
    pub fn abandon(&self) {
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.progress.borrow_mut().take();
        debug!(tester = %self.name(), "abandoned run");
    }

    /// Evaluates the rule against every source. Bound sources take
    /// precedence over `sources`.
    pub fn run(&self, sources: &Sources) {
        let sources = self
            .bound_sources()
            .filter(|bound| !bound.is_empty())
            .unwrap_or_else(|| sources.clone());

        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);

        if sources.is_empty() {
            warn!(tester = %self.name(), "no source supplied");
            self.inner
                .events
                .emit(&TesterEvent::Fail, &Message::fatal(NO_SOURCE).into());
            return;
        }

        let progress = Progress::new(self.inner.output.clone());
        let tester = Rc::downgrade(&self.inner);
        progress.on_complete(move |_| {
            let Some(inner) = tester.upgrade() else {
                return;
            };
            if inner.is_current(generation) {
                debug!(tester = %inner.entry.name(), "tester complete");
                inner.events.emit(&TesterEvent::Complete, &Report::new());
            }
        });
        *self.inner.progress.borrow_mut() = Some(progress.clone());

        progress.start(0..sources.len());
        for (index, source) in sources.iter().enumerate() {
            let slot = Slot {
                tester: Rc::downgrade(&self.inner),
                generation,
                progress: progress.clone(),
                index,
                identity: source.id().map_or_else(|| index.to_string(), str::to_string),
            };
            self.run_source(source, slot);
        }
    }

    fn run_source(&self, source: &Source, slot: Slot) {
        let src_type = source.src_type();
        let options = &self.inner.options;
        if !options.src_types.supports(src_type) {
            debug!(tester = %self.name(), source = %slot.identity, ?src_type, "unsupported source type");
            slot.progress.signal(&slot.index);
            return;
        }

        let test = Test::new(self.name(), self.inner.entry.rule(), Rc::clone(options));
        let generation = slot.generation;
        let tester = Weak::clone(&slot.tester);
        self.inner.output.attach_while(test.logger(), move || {
            tester
                .upgrade()
                .is_some_and(|inner| inner.is_current(generation))
        });
        for event in [TestEvent::Complete, TestEvent::Fail] {
            let slot = slot.clone();
            test.on(event, move |report| slot.settle(report));
        }

        let overrides = RunOverrides {
            src_type,
            engine: None,
            source: Some(slot.identity.clone()),
        };
        let engine = match source.engine() {
            Some(document) => {
                test.run(source.src(), with_engine(overrides, document));
                return;
            }
            None => src_type.and_then(|kind| self.inner.engines.get(kind)),
        };
        let Some(engine) = engine else {
            test.run(source.src(), overrides);
            return;
        };

        let parsed = source.clone();
        engine.process(
            source.src(),
            Box::new(move |processed| match processed {
                Ok(document) => {
                    parsed.set_engine(Rc::clone(&document));
                    test.run(parsed.src(), with_engine(overrides, document));
                }
                Err(err) => {
                    let message = format!("Engine failed to process source: {err}");
                    slot.settle(&Message::fatal(message).into());
                }
            }),
        );
    }
}

fn with_engine(overrides: RunOverrides, document: Rc<dyn Document>) -> RunOverrides {
    RunOverrides {
        engine: Some(document),
        ..overrides
    }
}

impl fmt::Debug for Tester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tester")
            .field("name", &self.name())
            .field("generation", &self.inner.generation.get())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// One source's step in a tester run.
#[derive(Clone)]
struct Slot {
    tester: Weak<TesterInner>,
    generation: u64,
    progress: Progress<usize>,
    index: usize,
    identity: String,
}

impl Slot {
    fn settle(&self, report: &Report) {
        let Some(inner) = self.tester.upgrade() else {
            return;
        };
        if !inner.is_current(self.generation) {
            debug!(tester = %inner.entry.name(), source = %self.identity, "dropping stale rule event");
            return;
        }
        let report = if report.is_empty() {
            Message::info(COMPLETE).into()
        } else {
            report.clone()
        };
        inner.output.record(&LogRecord {
            report,
            test: Some(inner.entry.name().to_string()),
            source: Some(self.identity.clone()),
            threshold: inner.options.threshold(),
        });
        drop(inner);
        self.progress.signal(&self.index);
    }
}
