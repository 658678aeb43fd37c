//! The task list together with the view state that reads it.
//!
//! `TaskStore` is the single owner of the tasks, the active filter and the
//! active locale. Every successful mutation writes the whole list back to the
//! `todos` slot before returning. Filter and locale are session state only and
//! start over at `all` / English on every load.

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::filter::Filter;
use crate::locale::Locale;
use crate::storage::{Storage, StorageError};
use crate::task::{Task, TaskId};

pub const TASKS_SLOT: &str = "todos";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no task at position {index} (list has {len})")]
    OutOfRange { index: usize, len: usize },
}

/// What happened to the durable copy after a mutation.
///
/// A failed write does not undo the in-memory change; the caller decides how
/// loudly to report it.
#[derive(Debug)]
#[must_use]
pub enum Persist {
    Saved,
    Skipped,
    Failed(StorageError),
}

impl Persist {
    pub fn warning(&self) -> Option<&StorageError> {
        match self {
            Persist::Failed(err) => Some(err),
            Persist::Saved | Persist::Skipped => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Persist::Saved)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

#[derive(Debug)]
pub struct TaskStore<S: Storage> {
    storage: S,
    tasks: Vec<Task>,
    filter: Filter,
    locale: Locale,
}

impl<S: Storage> TaskStore<S> {
    /// Reads the persisted list. Anything unusable in the slot yields an
    /// empty list rather than an error.
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: S) -> Self {
        let tasks = match storage.get_item(TASKS_SLOT) {
            Ok(Some(raw)) => decode_tasks(&raw),
            Ok(None) => {
                debug!("no persisted tasks; starting empty");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "could not read persisted tasks; starting empty");
                Vec::new()
            }
        };

        info!(count = tasks.len(), "loaded task list");
        Self {
            storage,
            tasks,
            filter: Filter::default(),
            locale: Locale::default(),
        }
    }

    #[tracing::instrument(skip(self, text))]
    pub fn add(&mut self, text: &str) -> Persist {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank task text");
            return Persist::Skipped;
        }

        self.tasks.push(Task::new(text.to_string(), Utc::now()));
        debug!(count = self.tasks.len(), "task added");
        self.persist()
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self, index: usize) -> Result<Persist, StoreError> {
        let len = self.tasks.len();
        let task = self
            .tasks
            .get_mut(index)
            .ok_or(StoreError::OutOfRange { index, len })?;
        task.completed = !task.completed;
        debug!(id = %task.id, completed = task.completed, "task toggled");
        Ok(self.persist())
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, index: usize) -> Result<Persist, StoreError> {
        let len = self.tasks.len();
        if index >= len {
            return Err(StoreError::OutOfRange { index, len });
        }
        let removed = self.tasks.remove(index);
        debug!(id = %removed.id, remaining = self.tasks.len(), "task deleted");
        Ok(self.persist())
    }

    pub fn set_filter(&mut self, filter: Filter) {
        debug!(%filter, "filter changed");
        self.filter = filter;
    }

    pub fn set_locale(&mut self, locale: Locale) {
        debug!(%locale, "locale changed");
        self.locale = locale;
    }

    pub fn toggle_locale(&mut self) -> Locale {
        self.set_locale(self.locale.toggled());
        self.locale
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// The unfiltered list in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Tasks passing the active filter, each paired with its index in the
    /// unfiltered list. That index is what `toggle` and `delete` take.
    pub fn visible_tasks(&self) -> impl Iterator<Item = (usize, &Task)> + '_ {
        let filter = self.filter;
        self.tasks
            .iter()
            .enumerate()
            .filter(move |(_, task)| filter.matches(task))
    }

    pub fn stats(&self) -> Stats {
        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|t| t.completed).count();
        Stats {
            total,
            active: total - completed,
            completed,
        }
    }

    /// An empty list is never "all completed".
    pub fn is_all_completed(&self) -> bool {
        let stats = self.stats();
        stats.total > 0 && stats.active == 0
    }

    pub fn completion_ratio(&self) -> f64 {
        let stats = self.stats();
        if stats.total == 0 {
            0.0
        } else {
            stats.completed as f64 / stats.total as f64
        }
    }

    /// Current position of a task, if it is still in the list.
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn persist(&mut self) -> Persist {
        let payload = match serde_json::to_string(&self.tasks) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize task list");
                return Persist::Failed(StorageError::Unavailable(format!(
                    "could not serialize tasks: {err}"
                )));
            }
        };

        match self.storage.set_item(TASKS_SLOT, &payload) {
            Ok(()) => {
                debug!(count = self.tasks.len(), "persisted task list");
                Persist::Saved
            }
            Err(err) => {
                warn!(error = %err, "failed to persist task list; in-memory change kept");
                Persist::Failed(err)
            }
        }
    }
}

fn decode_tasks(raw: &str) -> Vec<Task> {
    let records = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => records,
        Ok(Value::Null) => {
            debug!("persisted tasks slot holds null");
            return Vec::new();
        }
        Ok(other) => {
            warn!(kind = json_kind(&other), "persisted tasks are not an array; starting empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(error = %err, "persisted tasks are not valid JSON; starting empty");
            return Vec::new();
        }
    };

    let mut tasks = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Task>(record) {
            Ok(task) if task.text.trim().is_empty() => {
                warn!(record = idx, "skipping persisted task with blank text");
            }
            Ok(task) => tasks.push(task),
            Err(err) => {
                warn!(record = idx, error = %err, "skipping malformed persisted task");
            }
        }
    }
    tasks
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{Persist, Stats, StoreError, TASKS_SLOT, TaskStore};
    use crate::filter::Filter;
    use crate::locale::Locale;
    use crate::storage::{MemoryStorage, Storage};

    fn store_with(texts: &[&str]) -> TaskStore<MemoryStorage> {
        let mut store = TaskStore::load(MemoryStorage::new());
        for text in texts {
            assert!(store.add(text).is_saved());
        }
        store
    }

    fn texts(store: &TaskStore<MemoryStorage>) -> Vec<&str> {
        store.tasks().iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn add_trims_and_rejects_blanks() {
        let mut store = store_with(&[]);
        assert!(matches!(store.add("  "), Persist::Skipped));
        assert!(matches!(store.add(""), Persist::Skipped));
        assert!(matches!(store.add("\t\n"), Persist::Skipped));
        assert!(store.tasks().is_empty());
        assert!(store.storage().get_item(TASKS_SLOT).expect("get").is_none());

        assert!(store.add("  buy milk  ").is_saved());
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].text, "buy milk");
        assert!(!store.tasks()[0].completed);
        assert!(store.tasks()[0].created_at.is_some());
    }

    #[test]
    fn toggle_twice_restores_state_and_spares_neighbours() {
        let mut store = store_with(&["a", "b", "c"]);
        assert!(store.toggle(2).expect("toggle c").is_saved());
        let before: Vec<bool> = store.tasks().iter().map(|t| t.completed).collect();

        for _ in 0..2 {
            assert!(store.toggle(1).expect("toggle b").is_saved());
        }

        let after: Vec<bool> = store.tasks().iter().map(|t| t.completed).collect();
        assert_eq!(before, after);
        assert_eq!(texts(&store), ["a", "b", "c"]);
    }

    #[test]
    fn delete_shifts_later_indices() {
        let mut store = store_with(&["A", "B", "C"]);
        assert!(store.delete(0).expect("delete A").is_saved());
        assert_eq!(texts(&store), ["B", "C"]);

        assert!(store.toggle(0).expect("toggle B").is_saved());
        assert!(store.tasks()[0].completed);
        assert_eq!(store.tasks()[0].text, "B");
        assert!(!store.tasks()[1].completed);
    }

    #[test]
    fn out_of_range_touches_nothing() {
        let mut store = store_with(&["a", "b"]);
        store.storage_mut().reject_writes("must not be called");

        assert_eq!(
            store.toggle(2).expect_err("index 2 is past the end"),
            StoreError::OutOfRange { index: 2, len: 2 }
        );
        assert_eq!(
            store.delete(7).expect_err("index 7 is past the end"),
            StoreError::OutOfRange { index: 7, len: 2 }
        );
        assert_eq!(texts(&store), ["a", "b"]);
        assert!(store.tasks().iter().all(|t| !t.completed));

        let mut empty = store_with(&[]);
        assert!(empty.toggle(0).is_err());
        assert!(empty.delete(0).is_err());
    }

    #[test]
    fn filter_is_a_view_carrying_original_indices() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        assert!(store.toggle(1).expect("toggle b").is_saved());
        assert!(store.toggle(3).expect("toggle d").is_saved());
        let stats_before = store.stats();

        store.set_filter(Filter::Active);
        let active: Vec<(usize, String)> = store
            .visible_tasks()
            .map(|(i, t)| (i, t.text.clone()))
            .collect();
        assert_eq!(active, [(0, "a".to_string()), (2, "c".to_string())]);

        store.set_filter(Filter::Completed);
        let done: Vec<usize> = store.visible_tasks().map(|(i, _)| i).collect();
        assert_eq!(done, [1, 3]);

        store.set_filter(Filter::All);
        assert_eq!(store.visible_tasks().count(), 4);
        assert_eq!(store.stats(), stats_before);
        assert_eq!(texts(&store), ["a", "b", "c", "d"]);
    }

    #[test]
    fn visible_index_addresses_the_right_task() {
        let mut store = store_with(&["a", "b", "c"]);
        assert!(store.toggle(0).expect("toggle a").is_saved());
        store.set_filter(Filter::Active);

        let (original, task) = store.visible_tasks().next().expect("one active task");
        assert_eq!(task.text, "b");
        assert!(store.delete(original).expect("delete b").is_saved());
        assert_eq!(texts(&store), ["a", "c"]);
    }

    #[test]
    fn stats_add_up() {
        let mut store = store_with(&[]);
        assert_eq!(store.stats(), Stats::default());

        for text in ["a", "b", "c"] {
            let _ = store.add(text);
        }
        let _ = store.toggle(0).expect("toggle");
        let stats = store.stats();
        assert_eq!(stats.total, store.tasks().len());
        assert_eq!(stats.total, stats.active + stats.completed);
        assert_eq!(stats.completed, 1);
        assert!((store.completion_ratio() - 1.0 / 3.0).abs() < f64::EPSILON);

        store.set_filter(Filter::Completed);
        assert_eq!(store.stats(), stats);
    }

    #[test]
    fn all_completed_needs_a_non_empty_list() {
        let mut store = store_with(&[]);
        assert!(!store.is_all_completed());
        assert_eq!(store.completion_ratio(), 0.0);

        let _ = store.add("a");
        let _ = store.add("b");
        let _ = store.toggle(0).expect("toggle a");
        assert!(!store.is_all_completed());
        let _ = store.toggle(1).expect("toggle b");
        assert!(store.is_all_completed());

        let _ = store.add("c");
        assert!(!store.is_all_completed());
    }

    #[test]
    fn reload_reproduces_tasks_and_resets_view_state() {
        let mut store = store_with(&["x"]);
        let _ = store.add("y");
        let _ = store.toggle(1).expect("toggle y");
        store.set_filter(Filter::Completed);
        store.set_locale(Locale::Arabic);

        let reloaded = TaskStore::load(store.storage().clone());
        assert_eq!(texts(&reloaded), ["x", "y"]);
        assert!(!reloaded.tasks()[0].completed);
        assert!(reloaded.tasks()[1].completed);
        assert_eq!(reloaded.filter(), Filter::All);
        assert_eq!(reloaded.locale(), Locale::English);
    }

    #[test]
    fn malformed_slot_loads_empty() {
        for raw in ["not json", "{\"text\":\"x\"}", "42", "null", "\"[]\"", ""] {
            let storage = MemoryStorage::new().with_item(TASKS_SLOT, raw);
            let store = TaskStore::load(storage);
            assert!(store.tasks().is_empty(), "slot {raw:?} should load empty");
        }
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let raw = r#"[
            {"text":"keep","completed":true,"createdAt":"2026-03-01T09:30:00Z"},
            {"completed":false},
            "stray",
            {"text":"   ","completed":false},
            {"text":"also keep"}
        ]"#;
        let store = TaskStore::load(MemoryStorage::new().with_item(TASKS_SLOT, raw));
        let kept: Vec<(&str, bool)> = store
            .tasks()
            .iter()
            .map(|t| (t.text.as_str(), t.completed))
            .collect();
        assert_eq!(kept, [("keep", true), ("also keep", false)]);
    }

    #[test]
    fn odd_created_at_values_do_not_drop_tasks() {
        let raw = r#"[
            {"text":"keep me","completed":true,"createdAt":"last tuesday"},
            {"text":"b","completed":false,"createdAt":1700000000000}
        ]"#;
        let store = TaskStore::load(MemoryStorage::new().with_item(TASKS_SLOT, raw));
        assert_eq!(texts(&store), ["keep me", "b"]);
        assert!(store.tasks()[0].completed);
        assert!(store.tasks()[0].created_at.is_none());
        assert!(store.tasks()[1].created_at.is_some());
    }

    #[test]
    fn write_failure_keeps_in_memory_change() {
        let mut store = store_with(&["a"]);
        store.storage_mut().reject_writes("quota exceeded");

        let outcome = store.add("b");
        assert!(outcome.warning().is_some());
        assert_eq!(texts(&store), ["a", "b"]);

        let outcome = store.toggle(0).expect("toggle a");
        assert!(matches!(outcome, Persist::Failed(_)));
        assert!(store.tasks()[0].completed);

        let outcome = store.delete(1).expect("delete b");
        assert!(outcome.warning().is_some());
        assert_eq!(texts(&store), ["a"]);

        let stale = TaskStore::load(store.storage().clone());
        assert_eq!(texts(&stale), ["a"]);
        assert!(!stale.tasks()[0].completed);

        store.storage_mut().accept_writes();
        assert!(store.add("c").is_saved());
        let fresh = TaskStore::load(store.storage().clone());
        assert_eq!(texts(&fresh), ["a", "c"]);
        assert!(fresh.tasks()[0].completed);
    }

    #[test]
    fn ids_survive_index_shifts() {
        let mut store = store_with(&["a", "b", "c"]);
        let c = store.tasks()[2].id;
        assert_eq!(store.position(c), Some(2));

        let _ = store.delete(0).expect("delete a");
        assert_eq!(store.position(c), Some(1));

        let _ = store.delete(1).expect("delete c");
        assert_eq!(store.position(c), None);
    }

    #[test]
    fn locale_toggles_between_the_two_languages() {
        let mut store = store_with(&[]);
        assert_eq!(store.toggle_locale(), Locale::Arabic);
        assert_eq!(store.toggle_locale(), Locale::English);
        store.set_locale(Locale::Arabic);
        assert_eq!(store.locale(), Locale::Arabic);
    }
}
