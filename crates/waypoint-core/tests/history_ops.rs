use std::rc::Rc;

use waypoint_core::{History, HistoryBuilder, HistoryError, Key, KeyStructure};
use waypoint_testing::TestKey;

fn history_of(names: &[&'static str]) -> History<TestKey> {
    let mut builder = HistoryBuilder::new();
    for name in names {
        builder.push(TestKey::screen(name));
    }
    builder.build().expect("test histories are non-empty")
}

#[test]
fn push_then_pop_restores_the_original_sequence() {
    let base = history_of(&["home", "list"]);
    let mut builder = base.to_builder();
    builder.push(TestKey::screen("detail"));
    let grown = builder.build().expect("three entries");

    let mut builder = grown.to_builder();
    builder.pop().expect("three entries");
    let shrunk = builder.build().expect("two entries");

    assert_eq!(shrunk.len(), base.len());
    for (ours, theirs) in shrunk.from_root().zip(base.from_root()) {
        assert!(Rc::ptr_eq(ours, theirs));
    }
}

#[test]
fn entry_ids_increase_and_are_never_reused() {
    let first = History::single(TestKey::screen("home"));
    assert_eq!(first.top().id().raw(), 1);

    let mut builder = first.to_builder();
    builder.push(TestKey::screen("list"));
    let second = builder.build().expect("two entries");
    assert_eq!(second.top().id().raw(), 2);

    // Popping does not hand the id back.
    let mut builder = second.to_builder();
    builder.pop().expect("two entries");
    builder.push(TestKey::screen("detail"));
    let third = builder.build().expect("two entries");
    assert_eq!(third.top().id().raw(), 3);
    assert_eq!(third.highest_entry_id().raw(), 3);
}

#[test]
fn pop_on_an_empty_builder_fails() {
    let mut builder = HistoryBuilder::<TestKey>::new();
    assert_eq!(builder.pop().unwrap_err(), HistoryError::Empty);
}

#[test]
fn an_empty_builder_cannot_build() {
    let builder = HistoryBuilder::<TestKey>::new();
    assert_eq!(builder.build().unwrap_err(), HistoryError::Empty);
}

#[test]
fn pop_to_stops_at_the_match_and_returns_the_popped_tail() {
    let history = history_of(&["a", "b", "c"]);
    let mut builder = history.to_builder();
    let popped = builder.pop_to(&TestKey::screen("a")).expect("a is present");

    assert_eq!(popped.len(), 2);
    assert_eq!(popped[0].key(), &TestKey::screen("c"));
    assert_eq!(popped[1].key(), &TestKey::screen("b"));
    assert_eq!(builder.len(), 1);
    assert_eq!(
        builder.peek().expect("one entry left").key(),
        &TestKey::screen("a")
    );
}

#[test]
fn pop_to_a_missing_key_leaves_the_builder_untouched() {
    let history = history_of(&["a", "b", "c"]);
    let mut builder = history.to_builder();
    assert_eq!(
        builder.pop_to(&TestKey::screen("zzz")).unwrap_err(),
        HistoryError::KeyNotFound
    );
    assert_eq!(builder.len(), 3);
}

#[test]
fn pop_count_checks_the_available_depth() {
    let history = history_of(&["a", "b", "c"]);
    let mut builder = history.to_builder();
    assert_eq!(
        builder.pop_count(4).unwrap_err(),
        HistoryError::InsufficientEntries {
            requested: 4,
            available: 3,
        }
    );
    builder.pop_count(2).expect("three entries");
    assert_eq!(builder.len(), 1);
}

#[test]
fn parent_chain_history_runs_root_to_leaf() {
    let home = TestKey::screen("home");
    let settings = TestKey::child("settings", home.clone());
    let panel = TestKey::child("panel", settings.clone());

    let history = History::from_parent_chain(&panel);
    let keys: Vec<_> = history.from_root().map(|entry| entry.key().clone()).collect();
    assert_eq!(keys, vec![home, settings, panel]);
    let ids: Vec<_> = history.from_root().map(|entry| entry.id().raw()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
#[should_panic(expected = "cyclic parent chain")]
fn a_cyclic_parent_chain_is_rejected() {
    #[derive(Clone, PartialEq, Eq, Hash, Debug)]
    struct LoopKey(u8);

    impl Key for LoopKey {
        fn structure(&self) -> KeyStructure<Self> {
            KeyStructure::Nested {
                parent: LoopKey((self.0 + 1) % 2),
            }
        }
    }

    History::from_parent_chain(&LoopKey(0));
}

#[test]
fn pushing_a_popped_entry_back_keeps_its_identity() {
    let history = history_of(&["home", "list"]);
    let mut builder = history.to_builder();
    let popped = builder.pop().expect("two entries");
    builder.push_entry(Rc::clone(&popped));
    let rebuilt = builder.build().expect("two entries");

    assert!(Rc::ptr_eq(rebuilt.top(), &popped));
    assert_eq!(rebuilt.top().id(), popped.id());

    // A fresh push afterwards still allocates above everything seen.
    let mut builder = rebuilt.to_builder();
    builder.push(TestKey::screen("detail"));
    assert_eq!(
        builder.peek().expect("three entries").id().raw(),
        popped.id().raw() + 1
    );
}

#[test]
fn iteration_runs_both_directions() {
    let history = history_of(&["a", "b", "c"]);
    let downward: Vec<_> = history.from_top().map(|entry| entry.key().name()).collect();
    assert_eq!(downward, vec!["c", "b", "a"]);
    let upward: Vec<_> = history.from_root().map(|entry| entry.key().name()).collect();
    assert_eq!(upward, vec!["a", "b", "c"]);
    assert_eq!(history.top_key(), &TestKey::screen("c"));
}

#[test]
fn duplicate_key_values_get_distinct_entries() {
    let mut builder = HistoryBuilder::new();
    builder.push(TestKey::screen("home"));
    builder.push(TestKey::screen("home"));
    let history = builder.build().expect("two entries");

    assert_eq!(history.len(), 2);
    let mut entries = history.from_root();
    let bottom = entries.next().expect("bottom entry");
    let top = entries.next().expect("top entry");
    assert_eq!(bottom.key(), top.key());
    assert_ne!(bottom.id(), top.id());
}
