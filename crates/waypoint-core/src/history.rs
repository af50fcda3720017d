use std::rc::Rc;

use crate::collections::map::HashSet;
use crate::error::HistoryError;
use crate::key::{Key, KeyStructure};

/// Strictly increasing identity of one pushed entry.
///
/// Ids are allocated at push time and never reused, so two value-equal keys
/// pushed at different times stay distinguishable, and platform layers can
/// key per-entry state (scroll positions and the like) off an id that is
/// stable across every rebuild that reuses the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    /// Sentinel below every allocated id; an empty builder starts here.
    pub(crate) const INITIAL: EntryId = EntryId(0);

    /// Rebuilds an id from its raw value. Only meant for restoring a
    /// previously saved history; fabricating ids defeats the uniqueness
    /// guarantee.
    pub fn from_raw(raw: u64) -> Self {
        EntryId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        EntryId(self.0 + 1)
    }
}

/// One slot on a history: an [`EntryId`] paired with its key.
///
/// Entries are immutable and shared by `Rc`; history operations only add or
/// remove them. An entry that survives a rebuild (`reset_to`, a matching
/// ancestor in `replace_to`, an explicit [`HistoryBuilder::push_entry`]) is
/// the same allocation with the same id.
#[derive(Debug, PartialEq, Eq)]
pub struct Entry<K> {
    id: EntryId,
    key: K,
}

impl<K> Entry<K> {
    fn new(id: EntryId, key: K) -> Rc<Self> {
        Rc::new(Entry { id, key })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

/// An immutable, non-empty, ordered stack of entries.
///
/// Stored root-first: index 0 is the bottom of the stack and the last
/// element is the top (most recently pushed). Cloning is cheap; all
/// mutation goes through [`HistoryBuilder`], which copies the backing
/// sequence and carries the running highest [`EntryId`] forward so ids stay
/// globally increasing across builds.
#[derive(Debug)]
pub struct History<K: Key> {
    entries: Rc<Vec<Rc<Entry<K>>>>,
    highest_id: EntryId,
}

impl<K: Key> Clone for History<K> {
    fn clone(&self) -> Self {
        History {
            entries: Rc::clone(&self.entries),
            highest_id: self.highest_id,
        }
    }
}

impl<K: Key> History<K> {
    /// A one-entry history.
    pub fn single(key: K) -> Self {
        let mut builder = HistoryBuilder::new();
        builder.push(key);
        builder.build().expect("single-entry history is non-empty")
    }

    /// Walks a [`KeyStructure::Nested`] key's parent chain to the root and
    /// builds the history root-first, leaf-last. A plain or composite key
    /// produces a single-entry history.
    ///
    /// # Panics
    ///
    /// Panics if the parent chain revisits a key. A cyclic chain is a
    /// caller programming error; the walk keeps a seen-set rather than
    /// looping forever.
    pub fn from_parent_chain(key: &K) -> Self {
        let mut builder = HistoryBuilder::new();
        builder.push_all(parent_chain(key));
        builder.build().expect("parent chain contains the key itself")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a built history; kept for symmetry with the
    /// builder.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently pushed entry.
    pub fn top(&self) -> &Rc<Entry<K>> {
        self.entries.last().expect("a built history is never empty")
    }

    pub fn top_key(&self) -> &K {
        self.top().key()
    }

    /// Read-only iteration from the bottom of the stack to the top.
    pub fn from_root(&self) -> impl DoubleEndedIterator<Item = &Rc<Entry<K>>> {
        self.entries.iter()
    }

    /// Read-only iteration from the top of the stack down to the bottom.
    pub fn from_top(&self) -> impl DoubleEndedIterator<Item = &Rc<Entry<K>>> {
        self.entries.iter().rev()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.iter().any(|entry| entry.key() == key)
    }

    /// First entry (root-first) whose key is value-equal to `key`.
    pub fn entry_with_key(&self, key: &K) -> Option<&Rc<Entry<K>>> {
        self.entries.iter().find(|entry| entry.key() == key)
    }

    /// Highest id ever allocated along this history's builder chain. May
    /// exceed the top entry's id when later entries have been popped.
    pub fn highest_entry_id(&self) -> EntryId {
        self.highest_id
    }

    /// A mutable copy of this history to derive the next one from.
    pub fn to_builder(&self) -> HistoryBuilder<K> {
        HistoryBuilder {
            entries: self.entries.as_ref().clone(),
            highest_id: self.highest_id,
        }
    }
}

/// Keys from the root of `key`'s parent chain down to `key` itself,
/// root-first. Panics on a cyclic chain.
pub(crate) fn parent_chain<K: Key>(key: &K) -> Vec<K> {
    let mut chain = vec![key.clone()];
    let mut seen: HashSet<K> = HashSet::new();
    seen.insert(key.clone());
    let mut cursor = key.clone();
    while let KeyStructure::Nested { parent } = cursor.structure() {
        assert!(
            seen.insert(parent.clone()),
            "cyclic parent chain: {parent:?} appears twice above {key:?}"
        );
        chain.push(parent.clone());
        cursor = parent;
    }
    chain.reverse();
    chain
}

/// Mutable working copy used to construct the next [`History`].
///
/// Popping an entry and pushing the same `Rc<Entry>` back (see
/// [`push_entry`](HistoryBuilder::push_entry)) preserves that entry's id,
/// which is what keeps caller-held per-entry state attached across a
/// pop/push round trip. A plain [`push`](HistoryBuilder::push) always
/// allocates a fresh id, even for a key value already on the stack.
#[derive(Debug)]
pub struct HistoryBuilder<K: Key> {
    entries: Vec<Rc<Entry<K>>>,
    highest_id: EntryId,
}

impl<K: Key> Default for HistoryBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> HistoryBuilder<K> {
    /// Fresh empty builder with the id counter at its initial sentinel.
    pub fn new() -> Self {
        HistoryBuilder {
            entries: Vec::new(),
            highest_id: EntryId::INITIAL,
        }
    }

    /// Appends `key` with a freshly allocated id.
    pub fn push(&mut self, key: K) -> &mut Self {
        self.highest_id = self.highest_id.next();
        self.entries.push(Entry::new(self.highest_id, key));
        self
    }

    pub fn push_all(&mut self, keys: impl IntoIterator<Item = K>) -> &mut Self {
        for key in keys {
            self.push(key);
        }
        self
    }

    /// Re-appends an existing entry, keeping its id. The id counter never
    /// regresses: re-inserting an entry with a higher id than anything this
    /// builder has seen raises the floor for subsequent pushes.
    pub fn push_entry(&mut self, entry: Rc<Entry<K>>) -> &mut Self {
        self.highest_id = self.highest_id.max(entry.id());
        self.entries.push(entry);
        self
    }

    /// Appends a key under a previously allocated id. Restoration hook for
    /// the persistence boundary; see [`EntryId::from_raw`].
    pub fn push_restored(&mut self, key: K, id: EntryId) -> &mut Self {
        self.highest_id = self.highest_id.max(id);
        self.entries.push(Entry::new(id, key));
        self
    }

    /// Raises the id floor so later pushes allocate above `id`.
    pub fn advance_ids_to(&mut self, id: EntryId) -> &mut Self {
        self.highest_id = self.highest_id.max(id);
        self
    }

    /// Removes and returns the top entry.
    pub fn pop(&mut self) -> Result<Rc<Entry<K>>, HistoryError> {
        self.entries.pop().ok_or(HistoryError::Empty)
    }

    /// Pops entries until the top's key is value-equal to `key`, leaving
    /// the match in place. Returns the popped entries, top-first. The
    /// builder is left unchanged when no match exists.
    pub fn pop_to(&mut self, key: &K) -> Result<Vec<Rc<Entry<K>>>, HistoryError> {
        match self.entries.iter().rposition(|entry| entry.key() == key) {
            Some(index) => {
                let mut popped = self.entries.split_off(index + 1);
                popped.reverse();
                Ok(popped)
            }
            None => Err(HistoryError::KeyNotFound),
        }
    }

    /// Pops exactly `count` entries off the top.
    pub fn pop_count(&mut self, count: usize) -> Result<(), HistoryError> {
        if count > self.entries.len() {
            return Err(HistoryError::InsufficientEntries {
                requested: count,
                available: self.entries.len(),
            });
        }
        let keep = self.entries.len() - count;
        self.entries.truncate(keep);
        Ok(())
    }

    /// The current top entry, if any, without removing it.
    pub fn peek(&self) -> Option<&Rc<Entry<K>>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> &mut Self {
        self.entries.clear();
        self
    }

    /// Freezes the builder into a [`History`]. An empty builder cannot be
    /// built; the engine relies on the current history never being empty.
    pub fn build(self) -> Result<History<K>, HistoryError> {
        if self.entries.is_empty() {
            return Err(HistoryError::Empty);
        }
        Ok(History {
            entries: Rc::new(self.entries),
            highest_id: self.highest_id,
        })
    }
}
