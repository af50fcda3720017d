use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dispatcher::{finish_traversal, NavigatorInner};
use crate::history::History;
use crate::key::Key;
use crate::services::Scope;

/// How a traversal's destination relates to its origin, for renderer
/// transition styling. Computed by the engine, never chosen freely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Replace,
}

/// One transition attempt from an origin history to a destination history.
///
/// Transient: the renderer receives it, acts on it, and signals the paired
/// [`TraversalCompletion`]; nothing about it persists past the transition.
/// `origin` is `None` only for the bootstrap traversal a freshly attached
/// renderer receives.
pub struct Traversal<K: Key> {
    origin: Option<History<K>>,
    destination: History<K>,
    direction: Direction,
    inner: Weak<RefCell<NavigatorInner<K>>>,
}

impl<K: Key> Traversal<K> {
    pub(crate) fn new(
        origin: Option<History<K>>,
        destination: History<K>,
        direction: Direction,
        inner: Weak<RefCell<NavigatorInner<K>>>,
    ) -> Self {
        Traversal {
            origin,
            destination,
            direction,
            inner,
        }
    }

    pub fn origin(&self) -> Option<&History<K>> {
        self.origin.as_ref()
    }

    pub fn destination(&self) -> &History<K> {
        &self.destination
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The live scope for `key`. Valid for every key on the origin or
    /// destination history for the whole life of this traversal; the
    /// engine does not tear down outgoing scopes until completion.
    ///
    /// # Panics
    ///
    /// Panics when `key` has no active scope, or when the owning engine
    /// has been dropped mid-traversal.
    pub fn services(&self, key: &K) -> Rc<Scope<K>> {
        let inner = self
            .inner
            .upgrade()
            .expect("navigator dropped during traversal");
        let guard = inner.borrow();
        guard.scope_services(key)
    }
}

/// Exactly-once completion signal for one traversal.
///
/// The renderer must invoke [`complete`](TraversalCompletion::complete)
/// once it has presented the destination; the engine does not commit the
/// new history or release outgoing scopes until then. Handles are
/// cloneable so a renderer can thread one through its own callbacks, but
/// all clones share the single shot.
pub struct TraversalCompletion<K: Key> {
    inner: Weak<RefCell<NavigatorInner<K>>>,
    fired: Rc<Cell<bool>>,
    ticket: u64,
}

impl<K: Key> Clone for TraversalCompletion<K> {
    fn clone(&self) -> Self {
        TraversalCompletion {
            inner: Weak::clone(&self.inner),
            fired: Rc::clone(&self.fired),
            ticket: self.ticket,
        }
    }
}

impl<K: Key> TraversalCompletion<K> {
    pub(crate) fn new(
        inner: Weak<RefCell<NavigatorInner<K>>>,
        fired: Rc<Cell<bool>>,
        ticket: u64,
    ) -> Self {
        TraversalCompletion {
            inner,
            fired,
            ticket,
        }
    }

    /// Commits the traversal: tears down scopes that became unreachable,
    /// publishes the destination history as current, and dispatches the
    /// next queued command if any.
    ///
    /// # Panics
    ///
    /// Panics when invoked a second time (on any clone of this handle).
    pub fn complete(&self) {
        if self.fired.replace(true) {
            panic!("traversal completion invoked twice");
        }
        match self.inner.upgrade() {
            Some(inner) => finish_traversal(&inner, self.ticket),
            None => log::debug!("completion after navigator was dropped; ignoring"),
        }
    }
}
