//! Persistence boundary for Waypoint histories.
//!
//! Converts a [`History`] plus per-entry opaque state into a serializable
//! [`SavedHistory`] and back, through a caller-supplied [`KeyCodec`]. The
//! on-disk format stays the caller's choice; this crate only defines the
//! serde-serializable shape and guarantees that restored entries keep
//! their original ids, so per-entry state stays attached and post-restore
//! pushes keep allocating strictly increasing ids.

use serde::{Deserialize, Serialize};

use waypoint_core::collections::map::{HashMap, HashSet};
use waypoint_core::{EntryId, History, HistoryBuilder, Key};

/// Failures at the persistence boundary. Recoverable: a corrupt or
/// incompatible payload is a data error, reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Key bytes the codec could not decode (or a value it refused to
    /// encode), with the codec's own description.
    Malformed(String),
    /// A saved history with no entries; a history is never empty, so
    /// nothing valid can be restored.
    EmptyHistory,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Malformed(detail) => write!(f, "malformed key payload: {detail}"),
            CodecError::EmptyHistory => write!(f, "saved history has no entries"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Caller-supplied key/bytes codec. Only the persistence boundary uses it;
/// the engine itself never serializes keys.
pub trait KeyCodec<K: Key> {
    fn encode(&self, key: &K) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<K, CodecError>;
}

/// Per-entry opaque state, keyed by [`EntryId`].
///
/// The platform layer stashes renderer-local state here (a scroll
/// position, say) and gets it back as long as the entry's identity
/// survives. The core guarantees that across every rebuild that reuses
/// the entry, and deliberately not when a value-equal key is pushed fresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStore {
    states: HashMap<EntryId, Vec<u8>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntryId, state: Vec<u8>) -> Option<Vec<u8>> {
        self.states.insert(id, state)
    }

    pub fn get(&self, id: EntryId) -> Option<&[u8]> {
        self.states.get(&id).map(Vec::as_slice)
    }

    pub fn remove(&mut self, id: EntryId) -> Option<Vec<u8>> {
        self.states.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drops state for entries no longer on `history`.
    pub fn retain_history<K: Key>(&mut self, history: &History<K>) {
        let live: HashSet<EntryId> = history.from_root().map(|entry| entry.id()).collect();
        self.states.retain(|id, _| live.contains(id));
    }
}

/// One saved entry: its id, encoded key, and stashed state if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEntry {
    pub id: u64,
    pub key: Vec<u8>,
    pub state: Option<Vec<u8>>,
}

/// Serializable form of a history, root-first, plus the highest id its
/// builder chain ever allocated (which can exceed every live entry's id
/// when entries have been popped since).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedHistory {
    pub entries: Vec<SavedEntry>,
    pub highest_id: u64,
}

/// Encodes `history` and the state attached to its entries.
pub fn save<K: Key, C: KeyCodec<K>>(
    history: &History<K>,
    codec: &C,
    states: &StateStore,
) -> Result<SavedHistory, CodecError> {
    let mut entries = Vec::with_capacity(history.len());
    for entry in history.from_root() {
        entries.push(SavedEntry {
            id: entry.id().raw(),
            key: codec.encode(entry.key())?,
            state: states.get(entry.id()).map(<[u8]>::to_vec),
        });
    }
    Ok(SavedHistory {
        entries,
        highest_id: history.highest_entry_id().raw(),
    })
}

/// Rebuilds a history and its state store from a saved form. Entries come
/// back under their original ids and the id floor advances past the saved
/// highest, so pushes on the restored history stay strictly increasing.
pub fn restore<K: Key, C: KeyCodec<K>>(
    saved: &SavedHistory,
    codec: &C,
) -> Result<(History<K>, StateStore), CodecError> {
    let mut builder = HistoryBuilder::new();
    let mut states = StateStore::new();
    for record in &saved.entries {
        let key = codec.decode(&record.key)?;
        let id = EntryId::from_raw(record.id);
        builder.push_restored(key, id);
        if let Some(state) = &record.state {
            states.insert(id, state.clone());
        }
    }
    builder.advance_ids_to(EntryId::from_raw(saved.highest_id));
    let history = builder.build().map_err(|_| CodecError::EmptyHistory)?;
    Ok((history, states))
}
