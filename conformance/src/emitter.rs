//! Minimal keyed publish/subscribe.
//!
//! Listeners are invoked synchronously, in registration order, on the thread
//! that calls [`Emitter::emit`]. There is no unsubscribe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

type Listener<A> = Rc<dyn Fn(&A)>;

/// Named events of type `K`, each carrying a payload of type `A`.
pub struct Emitter<K, A> {
    listeners: RefCell<HashMap<K, Vec<Listener<A>>>>,
}

impl<K: Eq + Hash, A> Emitter<K, A> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
        }
    }

    /// Appends `listener` to the list for `key`.
    pub fn on(&self, key: K, listener: impl Fn(&A) + 'static) -> &Self {
        self.listeners
            .borrow_mut()
            .entry(key)
            .or_default()
            .push(Rc::new(listener));
        self
    }

    /// Invokes every listener registered for `key` with `payload`.
    ///
    /// The listener list is snapshotted first, so a listener may register
    /// further listeners or emit again without deadlocking the emitter.
    /// Listeners added during dispatch only see later emissions.
    pub fn emit(&self, key: &K, payload: &A) -> &Self {
        let snapshot: Vec<Listener<A>> = match self.listeners.borrow().get(key) {
            Some(listeners) => listeners.clone(),
            None => return self,
        };
        for listener in snapshot {
            listener(payload);
        }
        self
    }

    /// Returns the number of listeners registered for `key`.
    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners.borrow().get(key).map_or(0, Vec::len)
    }
}

impl<K: Eq + Hash, A> Default for Emitter<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> fmt::Debug for Emitter<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.listeners.borrow().len();
        f.debug_struct("Emitter").field("events", &events).finish()
    }
}
