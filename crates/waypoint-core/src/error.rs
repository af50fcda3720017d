/// Recoverable history/builder errors, reported to the caller of the
/// mutating operation. Protocol violations (double completion, unbalanced
/// scope teardown, missing scope lookup) are not represented here; those
/// panic at the violation point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// `pop` or `build` on a builder with no entries.
    Empty,
    /// `pop_to` exhausted the builder without finding a matching key.
    KeyNotFound,
    /// `pop_count` asked for more entries than the builder holds.
    InsufficientEntries { requested: usize, available: usize },
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Empty => write!(f, "history builder is empty"),
            HistoryError::KeyNotFound => write!(f, "no matching key on the history"),
            HistoryError::InsufficientEntries {
                requested,
                available,
            } => {
                write!(
                    f,
                    "cannot pop {requested} entries; only {available} available"
                )
            }
        }
    }
}

impl std::error::Error for HistoryError {}
