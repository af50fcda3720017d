use std::any::Any;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::key::{Key, KeyStructure};

/// An immutable bag of named service bindings tied to one key, chained to a
/// parent scope. Lookup walks up the chain; local bindings shadow
/// ancestors. The synthetic root scope has no key and is never torn down.
pub struct Scope<K: Key> {
    key: Option<K>,
    parent: Option<Rc<Scope<K>>>,
    bindings: HashMap<String, Rc<dyn Any>>,
}

impl<K: Key> Scope<K> {
    fn root() -> Rc<Self> {
        Rc::new(Scope {
            key: None,
            parent: None,
            bindings: HashMap::new(),
        })
    }

    /// The key this scope belongs to; `None` only for the root.
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn parent(&self) -> Option<&Rc<Scope<K>>> {
        self.parent.as_ref()
    }

    /// Looks `name` up in this scope, then in each ancestor.
    pub fn binding(&self, name: &str) -> Option<Rc<dyn Any>> {
        let mut scope = self;
        loop {
            if let Some(service) = scope.bindings.get(name) {
                return Some(Rc::clone(service));
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return None,
            }
        }
    }

    /// Typed variant of [`binding`](Scope::binding); `None` when the name
    /// is unbound or bound to a different type.
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.binding(name).and_then(|service| service.downcast().ok())
    }
}

/// Collects bindings for a scope under construction, then freezes them.
///
/// The key being set up is retrievable from the binder (and later from the
/// built [`Scope`]) so factories can branch on it, and ancestor bindings
/// are visible through [`get`](ServiceBinder::get) so factories can build
/// on services bound further up the chain.
pub struct ServiceBinder<'a, K: Key> {
    key: &'a K,
    parent: Rc<Scope<K>>,
    bindings: HashMap<String, Rc<dyn Any>>,
}

impl<'a, K: Key> ServiceBinder<'a, K> {
    fn new(key: &'a K, parent: Rc<Scope<K>>) -> Self {
        ServiceBinder {
            key,
            parent,
            bindings: HashMap::new(),
        }
    }

    /// The key whose scope is being populated.
    pub fn key(&self) -> &K {
        self.key
    }

    /// Binds `service` under `name`, replacing any earlier binding made for
    /// the same name while this scope was under construction.
    pub fn bind<T: Any>(&mut self, name: impl Into<String>, service: T) -> &mut Self {
        self.bindings.insert(name.into(), Rc::new(service));
        self
    }

    /// Binds an already-shared service without re-wrapping it.
    pub fn bind_shared(&mut self, name: impl Into<String>, service: Rc<dyn Any>) -> &mut Self {
        self.bindings.insert(name.into(), service);
        self
    }

    /// Resolves `name` against bindings made so far, then the parent chain.
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        if let Some(service) = self.bindings.get(name) {
            return Rc::clone(service).downcast().ok();
        }
        self.parent.get(name)
    }

    fn into_scope(self) -> Rc<Scope<K>> {
        Rc::new(Scope {
            key: Some(self.key.clone()),
            parent: Some(self.parent),
            bindings: self.bindings,
        })
    }
}

/// Populates and tears down per-key service bindings.
///
/// Factories are registered once, before the engine creates any scopes, and
/// are invoked in registration order on creation and reverse registration
/// order on destruction, once per scope-node lifetime rather than per
/// reference.
///
/// Implementations must not call back into the [`Navigator`] that owns the
/// scope tree; bind/tear-down runs inside the engine's dispatch
/// bookkeeping.
///
/// [`Navigator`]: crate::dispatcher::Navigator
pub trait ScopeFactory<K: Key> {
    fn bind_services(&self, binder: &mut ServiceBinder<'_, K>);

    fn tear_down_services(&self, scope: &Scope<K>) {
        let _ = scope;
    }
}

struct Node<K: Key> {
    scope: Rc<Scope<K>>,
    uses: usize,
}

/// Reference-counted tree of live scopes, one node per in-use key value.
///
/// `set_up`/`tear_down` must be strictly paired; the engine's traversal
/// bookkeeping is the only caller under normal operation. Composite keys
/// set up their members before themselves and tear them down after
/// themselves; nested keys set up their parent chain first and release it
/// last. A node whose use-count reaches zero is destroyed immediately and
/// deterministically.
pub struct ScopeTree<K: Key> {
    root: Rc<Scope<K>>,
    factories: Vec<Rc<dyn ScopeFactory<K>>>,
    nodes: HashMap<K, Node<K>>,
}

impl<K: Key> ScopeTree<K> {
    pub fn new(factories: Vec<Rc<dyn ScopeFactory<K>>>) -> Self {
        ScopeTree {
            root: Scope::root(),
            factories,
            nodes: HashMap::new(),
        }
    }

    /// The ambient base scope every top-level scope chains to.
    pub fn root_scope(&self) -> &Rc<Scope<K>> {
        &self.root
    }

    /// Creates or retains the scope for `key`, expanding composite members
    /// and nested parents first.
    pub fn set_up(&mut self, key: &K) {
        match key.structure() {
            KeyStructure::Plain => {
                self.retain_or_create(key, Rc::clone(&self.root));
            }
            KeyStructure::Composite(members) => {
                for member in &members {
                    self.set_up(member);
                }
                // The composite's own scope sits beside its members, not
                // under them.
                self.retain_or_create(key, Rc::clone(&self.root));
            }
            KeyStructure::Nested { parent } => {
                self.set_up(&parent);
                let parent_scope = self.services(&parent);
                self.retain_or_create(key, parent_scope);
            }
        }
    }

    /// Releases one reference to `key`'s scope, then to its members or
    /// parent, mirroring [`set_up`](ScopeTree::set_up) in reverse.
    ///
    /// # Panics
    ///
    /// Panics when `key` has no live node: a teardown without a matching
    /// setup is a protocol violation, not a recoverable condition.
    pub fn tear_down(&mut self, key: &K) {
        self.release(key);
        match key.structure() {
            KeyStructure::Plain => {}
            KeyStructure::Composite(members) => {
                for member in members.iter().rev() {
                    self.tear_down(member);
                }
            }
            KeyStructure::Nested { parent } => {
                self.tear_down(&parent);
            }
        }
    }

    /// The live scope for `key`.
    ///
    /// # Panics
    ///
    /// Panics when no scope is active for `key`. Every key reachable from
    /// the engine's current or pending history has one; asking for any
    /// other key is a programming error.
    pub fn services(&self, key: &K) -> Rc<Scope<K>> {
        match self.nodes.get(key) {
            Some(node) => Rc::clone(&node.scope),
            None => panic!("no active scope for {key:?}"),
        }
    }

    pub fn has_scope(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Current reference count for `key`'s node, if it is live.
    pub fn use_count(&self, key: &K) -> Option<usize> {
        self.nodes.get(key).map(|node| node.uses)
    }

    fn retain_or_create(&mut self, key: &K, parent: Rc<Scope<K>>) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.uses += 1;
            log::trace!("retained scope for {key:?} (uses={})", node.uses);
            return;
        }
        let mut binder = ServiceBinder::new(key, parent);
        for factory in &self.factories {
            factory.bind_services(&mut binder);
        }
        let scope = binder.into_scope();
        self.nodes.insert(key.clone(), Node { scope, uses: 1 });
        log::debug!("created scope for {key:?}");
    }

    fn release(&mut self, key: &K) {
        let node = match self.nodes.get_mut(key) {
            Some(node) => node,
            None => panic!("tear_down without matching set_up for {key:?}"),
        };
        node.uses -= 1;
        if node.uses > 0 {
            log::trace!("released scope for {key:?} (uses={})", node.uses);
            return;
        }
        let node = self
            .nodes
            .remove(key)
            .expect("node was present a moment ago");
        for factory in self.factories.iter().rev() {
            factory.tear_down_services(&node.scope);
        }
        log::debug!("destroyed scope for {key:?}");
    }
}
