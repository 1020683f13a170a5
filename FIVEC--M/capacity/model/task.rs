use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Capacity, SprintLevel};

/// Actionable work item derived from a decision.
///
/// `id` is `<decisionId>:<discriminator>`, so composing twice from the same
/// decision yields the same ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Deterministic identifier.
    pub id: String,
    /// Title, `[CAPACITY] <action>`.
    pub title: String,
    /// Human readable context.
    pub description: String,
    /// Capacity responsible for the task.
    pub capacity: Capacity,
    /// Leverage tier.
    pub leverage: SprintLevel,
    /// Guardrail tags the task must respect.
    pub guardrails: Vec<String>,
    /// Deadline derived from the SRT horizon.
    pub due_at: DateTime<Utc>,
    /// Provenance (loop, decision, source, playbook parameters).
    #[serde(default)]
    pub meta: IndexMap<String, serde_json::Value>,
}

impl Task {
    /// Returns true when the task was derived from `decision_id`.
    #[must_use]
    pub fn belongs_to(&self, decision_id: &str) -> bool {
        self.id
            .strip_prefix(decision_id)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}
