use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Capacity, PerCapacity, SprintLevel};

/// Score per capacity.
pub type Scores = PerCapacity<f64>;

impl Scores {
    /// Score of `capacity`.
    #[must_use]
    pub const fn score(&self, capacity: Capacity) -> f64 {
        *self.get(capacity)
    }
}

/// Execution constraints attached to every task derived from a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Guardrails {
    /// Maximum length of the intervention.
    pub timebox_days: u32,
    /// Opaque cap tags, passed through untouched.
    pub caps: Vec<String>,
    /// Minimum gap between automatic routes for this loop.
    pub cool_down_ms: u64,
}

/// How often a response is expected to report back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Short-response-time window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Srt {
    /// Reporting cadence.
    pub cadence: Cadence,
    /// ISO-8601 whole-day duration, e.g. `P14D`.
    pub horizon: String,
}

/// Consent requirements before acting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    /// Whether a deliberative step must precede execution.
    pub require_deliberative: bool,
    /// Estimated legitimacy shortfall in [0, 1].
    pub legitimacy_gap: f64,
}

/// Ordered block of suggested actions for one capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAction {
    /// Capacity the block belongs to.
    pub capacity: Capacity,
    /// 1-based position of the block.
    pub order: u32,
    /// Leverage tier of the block.
    pub sprint_level: SprintLevel,
    /// Action descriptions.
    pub actions: Vec<String>,
}

/// Output of one decision engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    /// Loop the reading belonged to.
    pub loop_code: String,
    /// Indicator the reading measured.
    pub indicator: String,
    /// Severity in [0, 1].
    pub severity: f64,
    /// Score per capacity.
    pub scores: Scores,
    /// Capacities by descending score.
    pub order: Vec<Capacity>,
    /// First entry of `order`.
    pub primary: Capacity,
    /// Second entry of `order`.
    pub secondary: Capacity,
    /// Execution constraints.
    pub guardrails: Guardrails,
    /// Short-response-time window.
    pub srt: Srt,
    /// Consent requirements.
    pub consent: Consent,
    /// Suggested action blocks.
    #[serde(default)]
    pub template_actions: Vec<TemplateAction>,
    /// Primary minus secondary score, present only for near ties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_tie_delta: Option<f64>,
    /// Content-addressed fingerprint, used as idempotency key.
    pub decision_id: String,
}

impl DecisionResult {
    /// Prefix shared by every task id derived from this decision.
    #[must_use]
    pub fn task_prefix(&self) -> String {
        format!("{}:", self.decision_id)
    }
}
