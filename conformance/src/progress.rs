//! Completion tracking for a set of named steps.
//!
//! A cycle begins with [`Progress::start`]. Each step is signalled once; when
//! the last outstanding step is signalled the `complete` event fires exactly
//! once, carrying the shared [`Output`]. Steps may arrive in any order and
//! repeated signals are no-ops.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::debug;

use crate::emitter::Emitter;
use crate::output::Output;

/// Events emitted by a [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressEvent {
    /// Every step of the current cycle was signalled.
    Complete,
}

struct Step<K> {
    key: K,
    done: bool,
}

/// Tracks one cycle of steps keyed by `K`. Handles are cheap to clone.
pub struct Progress<K> {
    inner: Rc<ProgressInner<K>>,
}

struct ProgressInner<K> {
    output: Output,
    busy: Cell<bool>,
    steps: RefCell<Vec<Step<K>>>,
    events: Emitter<ProgressEvent, Output>,
}

impl<K> Clone for Progress<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: PartialEq + Debug> Progress<K> {
    /// Creates an idle tracker reporting into `output`.
    pub fn new(output: Output) -> Self {
        Self {
            inner: Rc::new(ProgressInner {
                output,
                busy: Cell::new(false),
                steps: RefCell::new(Vec::new()),
                events: Emitter::new(),
            }),
        }
    }

    /// The output handed to `complete` listeners.
    pub fn output(&self) -> &Output {
        &self.inner.output
    }

    /// Subscribes to `complete`.
    pub fn on_complete(&self, listener: impl Fn(&Output) + 'static) -> &Self {
        self.inner.events.on(ProgressEvent::Complete, listener);
        self
    }

    /// Returns true between `start` and the cycle's completion.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.get()
    }

    /// Begins a cycle over `keys`. An empty cycle completes immediately.
    pub fn start(&self, keys: impl IntoIterator<Item = K>) {
        let steps: Vec<Step<K>> = keys
            .into_iter()
            .map(|key| Step { key, done: false })
            .collect();
        if steps.is_empty() {
            self.inner.steps.borrow_mut().clear();
            self.finish();
            return;
        }
        debug!(steps = steps.len(), "progress started");
        *self.inner.steps.borrow_mut() = steps;
        self.inner.busy.set(true);
    }

    /// Marks `key` done. Returns false if the key is unknown, already done,
    /// or no cycle is running.
    pub fn signal(&self, key: &K) -> bool {
        if !self.is_busy() {
            return false;
        }
        let finished = {
            let mut steps = self.inner.steps.borrow_mut();
            let Some(step) = steps.iter_mut().find(|step| step.key == *key) else {
                debug!(?key, "signal for unknown step");
                return false;
            };
            if step.done {
                return false;
            }
            step.done = true;
            steps.iter().all(|step| step.done)
        };
        if finished {
            self.finish();
        }
        true
    }

    /// Ends the cycle early. `on_pending` is called with every outstanding
    /// key in start order before `complete` fires. Returns the number of
    /// outstanding keys; zero if no cycle is running.
    pub fn expire(&self, mut on_pending: impl FnMut(&K)) -> usize {
        if !self.is_busy() {
            return 0;
        }
        self.inner.busy.set(false);
        let mut steps = std::mem::take(&mut *self.inner.steps.borrow_mut());
        let mut expired = 0;
        for step in steps.iter_mut().filter(|step| !step.done) {
            on_pending(&step.key);
            step.done = true;
            expired += 1;
        }
        *self.inner.steps.borrow_mut() = steps;
        debug!(expired, "progress expired");
        self.inner
            .events
            .emit(&ProgressEvent::Complete, &self.inner.output);
        expired
    }

    /// Keys not yet signalled in the current cycle.
    pub fn pending(&self) -> Vec<K>
    where
        K: Clone,
    {
        if !self.is_busy() {
            return Vec::new();
        }
        self.inner
            .steps
            .borrow()
            .iter()
            .filter(|step| !step.done)
            .map(|step| step.key.clone())
            .collect()
    }

    fn finish(&self) {
        self.inner.busy.set(false);
        self.inner
            .events
            .emit(&ProgressEvent::Complete, &self.inner.output);
    }
}

impl<K: Debug> Debug for Progress<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps = self.inner.steps.borrow();
        let pending: Vec<&K> = steps
            .iter()
            .filter(|step| !step.done)
            .map(|step| &step.key)
            .collect();
        f.debug_struct("Progress")
            .field("busy", &self.inner.busy.get())
            .field("pending", &pending)
            .finish()
    }
}
