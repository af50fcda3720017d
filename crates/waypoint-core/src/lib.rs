//! Core engine pieces for the Waypoint navigation experiment.
//!
//! An ordered [`History`] of destination keys, a single-flight [`Navigator`]
//! that drives an external [`Renderer`] through one [`Traversal`] at a time,
//! and a reference-counted [`ScopeTree`] that keeps per-destination service
//! scopes alive exactly as long as their keys are reachable.

pub mod collections;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod key;
pub mod services;
pub mod traversal;

pub use dispatcher::{Navigator, Renderer};
pub use error::HistoryError;
pub use history::{Entry, EntryId, History, HistoryBuilder};
pub use key::{Key, KeyStructure};
pub use services::{Scope, ScopeFactory, ScopeTree, ServiceBinder};
pub use traversal::{Direction, Traversal, TraversalCompletion};
