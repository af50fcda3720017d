use std::fmt;
use std::hash::Hash;

/// How a key relates to other keys' scopes.
///
/// The engine switches over this closed set when expanding scope setup and
/// teardown; the three shapes are not mutually exclusive capabilities of a
/// key type, but each key value reports exactly one shape at a time.
#[derive(Clone, Debug)]
pub enum KeyStructure<K> {
    /// An independent destination; its scope hangs off the root.
    Plain,
    /// A destination whose member keys must each have an active scope
    /// whenever it is active (a dialog over a screen, say). Members are
    /// listed in declaration order; the composite's own scope still hangs
    /// off the root rather than nesting under any member.
    Composite(Vec<K>),
    /// A destination with a declared parent; the parent's scope must be
    /// active whenever this key is, and this key's scope nests under it.
    Nested { parent: K },
}

/// An opaque, value-comparable identifier for a navigation destination.
///
/// Keys are caller-supplied and the engine never invents or mutates them.
/// Value equality is the only comparison the engine performs (searching in
/// `reset_to`/`pop_to`, diffing histories for scope bookkeeping); identity
/// of repeated pushes is tracked separately through [`EntryId`]s.
///
/// [`EntryId`]: crate::history::EntryId
pub trait Key: Clone + Eq + Hash + fmt::Debug + 'static {
    /// Reports the scope shape of this key value. Defaults to
    /// [`KeyStructure::Plain`].
    fn structure(&self) -> KeyStructure<Self> {
        KeyStructure::Plain
    }
}
