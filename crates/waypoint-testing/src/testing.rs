use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use waypoint_core::{
    Direction, Key, KeyStructure, Renderer, Scope, ScopeFactory, ServiceBinder, Traversal,
    TraversalCompletion,
};

/// Fixture key covering all three scope shapes.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TestKey {
    Screen(&'static str),
    Child {
        name: &'static str,
        parent: Rc<TestKey>,
    },
    Overlay {
        name: &'static str,
        members: Vec<TestKey>,
    },
}

impl TestKey {
    pub fn screen(name: &'static str) -> Self {
        TestKey::Screen(name)
    }

    pub fn child(name: &'static str, parent: TestKey) -> Self {
        TestKey::Child {
            name,
            parent: Rc::new(parent),
        }
    }

    pub fn overlay(name: &'static str, members: Vec<TestKey>) -> Self {
        TestKey::Overlay { name, members }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestKey::Screen(name) => name,
            TestKey::Child { name, .. } => name,
            TestKey::Overlay { name, .. } => name,
        }
    }
}

impl Key for TestKey {
    fn structure(&self) -> KeyStructure<Self> {
        match self {
            TestKey::Screen(_) => KeyStructure::Plain,
            TestKey::Child { parent, .. } => KeyStructure::Nested {
                parent: (**parent).clone(),
            },
            TestKey::Overlay { members, .. } => KeyStructure::Composite(members.clone()),
        }
    }
}

/// What a renderer saw for one traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalRecord<K: Key> {
    pub origin_top: Option<K>,
    pub destination_top: K,
    pub direction: Direction,
}

impl<K: Key> TraversalRecord<K> {
    fn of(traversal: &Traversal<K>) -> Self {
        TraversalRecord {
            origin_top: traversal.origin().map(|history| history.top_key().clone()),
            destination_top: traversal.destination().top_key().clone(),
            direction: traversal.direction(),
        }
    }
}

/// Renderer that records each traversal and completes it synchronously.
pub struct ImmediateRenderer<K: Key> {
    records: Rc<RefCell<Vec<TraversalRecord<K>>>>,
}

impl<K: Key> Default for ImmediateRenderer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> ImmediateRenderer<K> {
    pub fn new() -> Self {
        ImmediateRenderer {
            records: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared handle to the record log; grab it before boxing the renderer
    /// into the navigator.
    pub fn records(&self) -> Rc<RefCell<Vec<TraversalRecord<K>>>> {
        Rc::clone(&self.records)
    }
}

impl<K: Key> Renderer<K> for ImmediateRenderer<K> {
    fn dispatch(&mut self, traversal: Traversal<K>, completion: TraversalCompletion<K>) {
        self.records.borrow_mut().push(TraversalRecord::of(&traversal));
        completion.complete();
    }
}

/// Completion handles parked by a [`HoldingRenderer`], oldest first.
pub struct PendingCompletions<K: Key> {
    queue: Rc<RefCell<VecDeque<TraversalCompletion<K>>>>,
}

impl<K: Key> Clone for PendingCompletions<K> {
    fn clone(&self) -> Self {
        PendingCompletions {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<K: Key> PendingCompletions<K> {
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Completes the oldest parked traversal; `false` when none is parked.
    pub fn complete_next(&self) -> bool {
        match self.take_next() {
            Some(completion) => {
                completion.complete();
                true
            }
            None => false,
        }
    }

    /// Removes and returns the oldest parked completion without firing it.
    pub fn take_next(&self) -> Option<TraversalCompletion<K>> {
        self.queue.borrow_mut().pop_front()
    }
}

/// Renderer that records each traversal and parks its completion for the
/// test to fire manually, simulating a renderer that spans scheduler turns
/// (an animation, say) before acknowledging.
pub struct HoldingRenderer<K: Key> {
    records: Rc<RefCell<Vec<TraversalRecord<K>>>>,
    pending: Rc<RefCell<VecDeque<TraversalCompletion<K>>>>,
}

impl<K: Key> Default for HoldingRenderer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> HoldingRenderer<K> {
    pub fn new() -> Self {
        HoldingRenderer {
            records: Rc::new(RefCell::new(Vec::new())),
            pending: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn records(&self) -> Rc<RefCell<Vec<TraversalRecord<K>>>> {
        Rc::clone(&self.records)
    }

    pub fn pending(&self) -> PendingCompletions<K> {
        PendingCompletions {
            queue: Rc::clone(&self.pending),
        }
    }
}

impl<K: Key> Renderer<K> for HoldingRenderer<K> {
    fn dispatch(&mut self, traversal: Traversal<K>, completion: TraversalCompletion<K>) {
        self.records.borrow_mut().push(TraversalRecord::of(&traversal));
        self.pending.borrow_mut().push_back(completion);
    }
}

/// One scope lifecycle event seen by a [`RecordingScopeFactory`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeEvent<K: Key> {
    Bind { factory: &'static str, key: K },
    TearDown { factory: &'static str, key: K },
}

/// Scope factory that logs every bind/tear-down with a label, so tests can
/// assert creation order across several registered factories.
pub struct RecordingScopeFactory<K: Key> {
    label: &'static str,
    events: Rc<RefCell<Vec<ScopeEvent<K>>>>,
}

impl<K: Key> RecordingScopeFactory<K> {
    pub fn new(label: &'static str, events: Rc<RefCell<Vec<ScopeEvent<K>>>>) -> Self {
        RecordingScopeFactory { label, events }
    }
}

impl<K: Key> ScopeFactory<K> for RecordingScopeFactory<K> {
    fn bind_services(&self, binder: &mut ServiceBinder<'_, K>) {
        self.events.borrow_mut().push(ScopeEvent::Bind {
            factory: self.label,
            key: binder.key().clone(),
        });
    }

    fn tear_down_services(&self, scope: &Scope<K>) {
        let key = scope
            .key()
            .cloned()
            .expect("factories never tear down the root scope");
        self.events.borrow_mut().push(ScopeEvent::TearDown {
            factory: self.label,
            key,
        });
    }
}
