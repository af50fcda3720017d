use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::collections::map::HashSet;
use crate::history::{parent_chain, History, HistoryBuilder};
use crate::key::{Key, KeyStructure};
use crate::services::{Scope, ScopeFactory, ScopeTree};
use crate::traversal::{Direction, Traversal, TraversalCompletion};

/// Turns a [`Traversal`]'s destination into presented state.
///
/// Invoked with at most one traversal at a time; the engine holds every
/// further command until the paired completion fires. A renderer already
/// presenting the destination's top key should complete immediately; the
/// engine never short-circuits such traversals itself.
pub trait Renderer<K: Key> {
    fn dispatch(&mut self, traversal: Traversal<K>, completion: TraversalCompletion<K>);
}

/// A navigation command, queued at call time and evaluated against the
/// then-current history when its turn to dispatch comes.
enum Command<K: Key> {
    GoTo(K),
    GoBack,
    ResetTo(K),
    ReplaceTo(K),
    GoUp,
    Rebuild(History<K>, Direction),
    /// Re-present the current history to a freshly attached renderer.
    Bootstrap,
}

struct InFlight<K: Key> {
    ticket: u64,
    origin: Option<History<K>>,
    destination: History<K>,
    direction: Direction,
    /// Key values to tear down at commit, top-to-root order.
    outgoing: Vec<K>,
    fired: Rc<Cell<bool>>,
}

pub(crate) struct NavigatorInner<K: Key> {
    history: History<K>,
    scope_tree: ScopeTree<K>,
    /// Lives in its own cell so the drain loop can invoke the renderer
    /// while the navigator state is not borrowed.
    renderer: Rc<RefCell<Option<Box<dyn Renderer<K>>>>>,
    queue: VecDeque<Command<K>>,
    in_flight: Option<InFlight<K>>,
    /// True while a drain loop is on the stack; a synchronous completion
    /// unwinds into that loop instead of recursing.
    dispatching: bool,
    /// Whether a bootstrap traversal has set up the initial history's
    /// scopes yet. Later bootstraps re-present live scopes.
    scopes_bootstrapped: bool,
    next_ticket: u64,
}

impl<K: Key> NavigatorInner<K> {
    pub(crate) fn scope_services(&self, key: &K) -> Rc<Scope<K>> {
        self.scope_tree.services(key)
    }

    /// Evaluates one queued command against the current history. `None`
    /// means the command is a no-op under the current history and is
    /// dropped without a renderer call.
    fn evaluate(&self, command: Command<K>) -> Option<(Option<History<K>>, History<K>, Direction)> {
        let current = &self.history;
        match command {
            Command::GoTo(key) => {
                let mut builder = current.to_builder();
                builder.push(key);
                let next = builder.build().expect("push keeps the builder non-empty");
                Some((Some(current.clone()), next, Direction::Forward))
            }
            Command::GoBack => {
                if current.len() <= 1 {
                    return None;
                }
                let mut builder = current.to_builder();
                builder.pop().expect("history has more than one entry");
                let next = builder.build().expect("at least one entry remains");
                Some((Some(current.clone()), next, Direction::Backward))
            }
            Command::ResetTo(key) => {
                let mut builder = current.to_builder();
                match builder.pop_to(&key) {
                    // The matching entry is back on top with its original
                    // id; in-memory state keyed off it survives.
                    Ok(_) => {
                        let next = builder.build().expect("the match is still on the stack");
                        Some((Some(current.clone()), next, Direction::Backward))
                    }
                    Err(_) => {
                        builder.push(key);
                        let next = builder.build().expect("push keeps the builder non-empty");
                        Some((Some(current.clone()), next, Direction::Forward))
                    }
                }
            }
            Command::ReplaceTo(key) => {
                Some((
                    Some(current.clone()),
                    self.replacement_history(&key),
                    Direction::Replace,
                ))
            }
            Command::GoUp => match current.top_key().structure() {
                KeyStructure::Nested { parent } => Some((
                    Some(current.clone()),
                    self.replacement_history(&parent),
                    Direction::Replace,
                )),
                _ => None,
            },
            Command::Rebuild(history, direction) => {
                Some((Some(current.clone()), history, direction))
            }
            Command::Bootstrap => Some((None, current.clone(), Direction::Replace)),
        }
    }

    /// Builds `key`'s parent-chain history, reusing the identity of any
    /// entry whose key already appears on the current history. Unmatched
    /// keys get fresh entries allocated above everything the current
    /// history has ever handed out.
    fn replacement_history(&self, key: &K) -> History<K> {
        let mut builder = HistoryBuilder::new();
        builder.advance_ids_to(self.history.highest_entry_id());
        for chain_key in parent_chain(key) {
            match self.history.entry_with_key(&chain_key) {
                Some(existing) => {
                    builder.push_entry(Rc::clone(existing));
                }
                None => {
                    builder.push(chain_key);
                }
            }
        }
        builder.build().expect("parent chain contains the key itself")
    }

    /// Sets up scopes for keys new to `destination`, records the keys to
    /// tear down at commit, and marks the traversal in flight.
    fn begin(
        &mut self,
        origin: Option<History<K>>,
        destination: History<K>,
        direction: Direction,
        weak: &Weak<RefCell<NavigatorInner<K>>>,
    ) -> (Traversal<K>, TraversalCompletion<K>) {
        // A bootstrap has no origin, but only the first one finds scopes
        // missing; a re-attach presents keys whose scopes are already live,
        // and setting those up again would never be torn down.
        let bootstrap = origin.is_none();
        if !bootstrap || !self.scopes_bootstrapped {
            let origin_keys: HashSet<K> = origin
                .iter()
                .flat_map(|history| history.from_root())
                .map(|entry| entry.key().clone())
                .collect();
            let mut incoming_seen: HashSet<K> = HashSet::new();
            for entry in destination.from_root() {
                let key = entry.key();
                if !origin_keys.contains(key) && incoming_seen.insert(key.clone()) {
                    self.scope_tree.set_up(key);
                }
            }
        }
        if bootstrap {
            self.scopes_bootstrapped = true;
        }

        let destination_keys: HashSet<K> = destination
            .from_root()
            .map(|entry| entry.key().clone())
            .collect();
        let mut outgoing = Vec::new();
        let mut outgoing_seen: HashSet<K> = HashSet::new();
        if let Some(origin_history) = &origin {
            for entry in origin_history.from_top() {
                let key = entry.key();
                if !destination_keys.contains(key) && outgoing_seen.insert(key.clone()) {
                    outgoing.push(key.clone());
                }
            }
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let fired = Rc::new(Cell::new(false));
        log::debug!(
            "dispatching traversal {ticket}: {:?} -> {:?} ({direction:?})",
            origin.as_ref().map(History::top_key),
            destination.top_key(),
        );
        self.in_flight = Some(InFlight {
            ticket,
            origin: origin.clone(),
            destination: destination.clone(),
            direction,
            outgoing,
            fired: Rc::clone(&fired),
        });
        (
            Traversal::new(origin, destination, direction, Weak::clone(weak)),
            TraversalCompletion::new(Weak::clone(weak), fired, ticket),
        )
    }
}

/// The traversal dispatcher: owns the committed history, the pending
/// command queue, the scope tree, and the attached renderer.
///
/// Single-threaded and reentrant. Navigation calls return immediately; at
/// most one traversal is dispatched at a time, and commands issued while
/// one is in flight (including from inside the renderer's own dispatch
/// body) queue FIFO, one renderer call each. The committed history only
/// advances when a traversal's completion fires. Handles are cheap clones
/// sharing one engine.
pub struct Navigator<K: Key> {
    inner: Rc<RefCell<NavigatorInner<K>>>,
}

impl<K: Key> Clone for Navigator<K> {
    fn clone(&self) -> Self {
        Navigator {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: Key> Navigator<K> {
    pub fn new(initial: History<K>) -> Self {
        Self::with_factories(initial, Vec::new())
    }

    /// Creates the engine with its scope factories. Factories cannot be
    /// registered later; scope contents must be decided before the first
    /// scope exists. Scopes for `initial`'s keys are set up by the
    /// bootstrap traversal of the first attached renderer.
    pub fn with_factories(initial: History<K>, factories: Vec<Rc<dyn ScopeFactory<K>>>) -> Self {
        Navigator {
            inner: Rc::new(RefCell::new(NavigatorInner {
                history: initial,
                scope_tree: ScopeTree::new(factories),
                renderer: Rc::new(RefCell::new(None)),
                queue: VecDeque::new(),
                in_flight: None,
                dispatching: false,
                scopes_bootstrapped: false,
                next_ticket: 1,
            })),
        }
    }

    /// The committed history. Mid-traversal this is still the origin
    /// value; it advances only when the renderer completes.
    pub fn history(&self) -> History<K> {
        self.inner.borrow().history.clone()
    }

    /// Live scope lookup; see [`ScopeTree::services`] for the panic
    /// contract.
    pub fn services(&self, key: &K) -> Rc<Scope<K>> {
        self.inner.borrow().scope_tree.services(key)
    }

    /// Whether `key` currently has a live scope.
    pub fn has_scope(&self, key: &K) -> bool {
        self.inner.borrow().scope_tree.has_scope(key)
    }

    pub fn has_pending_traversal(&self) -> bool {
        let guard = self.inner.borrow();
        guard.in_flight.is_some() || !guard.queue.is_empty()
    }

    /// Attaches `renderer` and immediately hands it work: the unfinished
    /// in-flight traversal if one is pending completion, otherwise a
    /// bootstrap traversal presenting the current history with no origin.
    pub fn set_renderer(&self, renderer: Box<dyn Renderer<K>>) {
        let handoff = {
            let mut guard = self.inner.borrow_mut();
            *guard.renderer.borrow_mut() = Some(renderer);
            let pending = guard.in_flight.as_ref().map(|in_flight| {
                (
                    Traversal::new(
                        in_flight.origin.clone(),
                        in_flight.destination.clone(),
                        in_flight.direction,
                        Rc::downgrade(&self.inner),
                    ),
                    TraversalCompletion::new(
                        Rc::downgrade(&self.inner),
                        Rc::clone(&in_flight.fired),
                        in_flight.ticket,
                    ),
                    Rc::clone(&guard.renderer),
                )
            });
            if pending.is_some() {
                // Guard the direct dispatch below the same way the drain
                // loop guards itself, so a synchronous completion unwinds
                // instead of re-borrowing the renderer.
                guard.dispatching = true;
            } else {
                // Ahead of anything already queued: the new renderer sees
                // current state before pending commands apply.
                guard.queue.push_front(Command::Bootstrap);
            }
            pending
        };
        match handoff {
            Some((traversal, completion, renderer)) => {
                {
                    let mut slot = renderer.borrow_mut();
                    if let Some(renderer) = slot.as_mut() {
                        renderer.dispatch(traversal, completion);
                    }
                }
                self.inner.borrow_mut().dispatching = false;
                dispatch_pending(&self.inner);
            }
            None => dispatch_pending(&self.inner),
        }
    }

    /// Detaches the renderer. Commands keep queueing; a pending completion
    /// handle stays valid and still commits when it fires.
    pub fn remove_renderer(&self) -> Option<Box<dyn Renderer<K>>> {
        let renderer = {
            let guard = self.inner.borrow();
            Rc::clone(&guard.renderer)
        };
        let taken = renderer.borrow_mut().take();
        taken
    }

    /// Pushes `key`; direction forward. A key value equal to the current
    /// top is still a push; duplicates get a fresh entry.
    pub fn go_to(&self, key: K) {
        self.submit(Command::GoTo(key));
    }

    /// Pops the top entry; direction backward. Returns `false` when the
    /// committed history is a singleton and no work is pending, `true`
    /// when the command was accepted.
    pub fn go_back(&self) -> bool {
        {
            let guard = self.inner.borrow();
            let busy = guard.in_flight.is_some() || !guard.queue.is_empty();
            if !busy && guard.history.len() <= 1 {
                return false;
            }
        }
        self.submit(Command::GoBack);
        true
    }

    /// Pops down to the most recent value-equal entry (reusing it, id and
    /// all; direction backward), or pushes `key` fresh when no entry
    /// matches (direction forward).
    pub fn reset_to(&self, key: K) {
        self.submit(Command::ResetTo(key));
    }

    /// Replaces the whole history with `key`'s parent chain; direction
    /// replace. Entries for chain keys already on the history keep their
    /// identity; the rest are freshly allocated.
    pub fn replace_to(&self, key: K) {
        self.submit(Command::ReplaceTo(key));
    }

    /// [`replace_to`](Navigator::replace_to) aimed at the current top
    /// key's declared parent. Returns `false` when the top is not a
    /// nested key and no work is pending.
    pub fn go_up(&self) -> bool {
        {
            let guard = self.inner.borrow();
            let busy = guard.in_flight.is_some() || !guard.queue.is_empty();
            let nested = matches!(
                guard.history.top_key().structure(),
                KeyStructure::Nested { .. }
            );
            if !busy && !nested {
                return false;
            }
        }
        self.submit(Command::GoUp);
        true
    }

    /// Replaces the history wholesale with a caller-built one, the
    /// restoration path for a persisted history. Later builds derive
    /// from the new history's highest id.
    pub fn rebuild_history(&self, history: History<K>, direction: Direction) {
        self.submit(Command::Rebuild(history, direction));
    }

    fn submit(&self, command: Command<K>) {
        {
            let mut guard = self.inner.borrow_mut();
            guard.queue.push_back(command);
            if guard.queue.len() > 1 {
                log::trace!("queued navigation command ({} waiting)", guard.queue.len());
            }
        }
        dispatch_pending(&self.inner);
    }
}

/// Drains the command queue, one renderer invocation per command, until it
/// is empty or a traversal is left awaiting completion. No-ops when a
/// drain loop is already on the stack or no renderer is attached.
pub(crate) fn dispatch_pending<K: Key>(inner: &Rc<RefCell<NavigatorInner<K>>>) {
    {
        let mut guard = inner.borrow_mut();
        if guard.dispatching {
            return;
        }
        guard.dispatching = true;
    }
    loop {
        let prepared = {
            let mut guard = inner.borrow_mut();
            if guard.in_flight.is_some() || guard.renderer.borrow().is_none() {
                None
            } else {
                let mut next = None;
                while let Some(command) = guard.queue.pop_front() {
                    if let Some((origin, destination, direction)) = guard.evaluate(command) {
                        next = Some(guard.begin(
                            origin,
                            destination,
                            direction,
                            &Rc::downgrade(inner),
                        ));
                        break;
                    }
                }
                next.map(|(traversal, completion)| {
                    (traversal, completion, Rc::clone(&guard.renderer))
                })
            }
        };
        match prepared {
            Some((traversal, completion, renderer)) => {
                let mut slot = renderer.borrow_mut();
                match slot.as_mut() {
                    Some(renderer) => renderer.dispatch(traversal, completion),
                    // Detached between the check and the call; the
                    // traversal stays in flight and a future
                    // `set_renderer` re-dispatches it.
                    None => log::debug!("renderer detached before dispatch"),
                }
            }
            None => break,
        }
    }
    inner.borrow_mut().dispatching = false;
}

/// Commit half of the dispatch protocol, reached only through
/// [`TraversalCompletion::complete`].
pub(crate) fn finish_traversal<K: Key>(inner: &Rc<RefCell<NavigatorInner<K>>>, ticket: u64) {
    {
        let mut guard = inner.borrow_mut();
        let in_flight = match guard.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => in_flight,
            _ => panic!("completion for a traversal that is not in flight"),
        };
        for key in &in_flight.outgoing {
            guard.scope_tree.tear_down(key);
        }
        log::debug!(
            "committed traversal {ticket}; history top is {:?}",
            in_flight.destination.top_key()
        );
        guard.history = in_flight.destination;
    }
    dispatch_pending(inner);
}
