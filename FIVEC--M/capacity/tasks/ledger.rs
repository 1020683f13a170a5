use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::model::Task;

/// Persistence boundary for composed tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores the tasks whose ids are not known yet and returns those.
    async fn persist(&self, tasks: &[Task]) -> Result<Vec<Task>>;

    /// Returns true when any task of `decision_id` was stored before.
    async fn has_decision(&self, decision_id: &str) -> Result<bool>;
}

/// In-memory store with insert-if-absent semantics keyed by task id.
#[derive(Debug, Default, Clone)]
pub struct TaskLedger {
    inner: Arc<RwLock<IndexMap<String, Task>>>,
}

impl TaskLedger {
    /// Inserts unseen tasks, returning only the ones that were new.
    pub fn insert_new(&self, tasks: &[Task]) -> Vec<Task> {
        let mut inner = self.inner.write();
        let mut inserted = Vec::new();
        for task in tasks {
            if !inner.contains_key(&task.id) {
                inner.insert(task.id.clone(), task.clone());
                inserted.push(task.clone());
            }
        }
        inserted
    }

    /// Returns true when a task with `id` is stored.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Returns true when any stored task derives from `decision_id`.
    #[must_use]
    pub fn contains_decision(&self, decision_id: &str) -> bool {
        self.inner
            .read()
            .values()
            .any(|task| task.belongs_to(decision_id))
    }

    /// Number of stored tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Stored tasks in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner.read().values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for TaskLedger {
    async fn persist(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        Ok(self.insert_new(tasks))
    }

    async fn has_decision(&self, decision_id: &str) -> Result<bool> {
        Ok(self.contains_decision(decision_id))
    }
}
