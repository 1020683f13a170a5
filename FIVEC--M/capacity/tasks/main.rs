//! Task composition: decisions (and playbooks) in, idempotent task lists out.

/// SRT horizon parsing and due dates.
pub mod horizon;
/// Task persistence boundary and in-memory ledger.
pub mod ledger;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    model::{Capacity, CapacityError, DecisionResult, Srt, Task, TemplateAction},
    playbook::Playbook,
};
use horizon::{due_at, parse_horizon_days};

/// Default ceiling on how far out a due date may land.
pub const DEFAULT_MAX_HORIZON_DAYS: u32 = 30;

/// Expands decisions into tasks whose ids are derived from the decision id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskComposer {
    max_horizon_days: u32,
}

impl Default for TaskComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HORIZON_DAYS)
    }
}

impl TaskComposer {
    /// Creates a composer that caps due dates at `max_horizon_days`.
    #[must_use]
    pub const fn new(max_horizon_days: u32) -> Self {
        Self { max_horizon_days }
    }

    /// Due-date ceiling in days.
    #[must_use]
    pub const fn max_horizon_days(&self) -> u32 {
        self.max_horizon_days
    }

    /// Deadline for tasks of a decision with this SRT.
    pub fn due_at(&self, srt: &Srt, now: DateTime<Utc>) -> Result<DateTime<Utc>, CapacityError> {
        let days = parse_horizon_days(&srt.horizon)?;
        Ok(due_at(now, days, self.max_horizon_days))
    }

    /// One task per template action, or one default block per capacity in
    /// `decision.order` when the decision carries no template actions.
    pub fn compose_tasks_from_decision(
        &self,
        decision: &DecisionResult,
        loop_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, CapacityError> {
        let due = self.due_at(&decision.srt, now)?;
        Ok(self.compose_with_due(decision, loop_code, due))
    }

    /// Like [`TaskComposer::compose_tasks_from_decision`], but substitutes
    /// `fallback_days` for a malformed horizon and logs that it did.
    #[must_use]
    pub fn compose_with_fallback(
        &self,
        decision: &DecisionResult,
        loop_code: &str,
        now: DateTime<Utc>,
        fallback_days: u32,
    ) -> Vec<Task> {
        let due = self.due_or_fallback(decision, now, fallback_days);
        self.compose_with_due(decision, loop_code, due)
    }

    /// Playbook tasks (`<decisionId>:PB:<actionKey>`) followed by the default
    /// decision tasks, deduplicated by id keeping the first occurrence.
    pub fn expand_playbook(
        &self,
        decision: &DecisionResult,
        playbook: &Playbook,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, CapacityError> {
        self.expand_playbooks(decision, &[playbook], now)
    }

    /// Expands several playbooks at once; ids stay unique across all of them.
    pub fn expand_playbooks(
        &self,
        decision: &DecisionResult,
        playbooks: &[&Playbook],
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, CapacityError> {
        let due = self.due_at(&decision.srt, now)?;
        Ok(self.expand_with_due(decision, playbooks, due))
    }

    /// Playbook expansion with the same explicit fallback as
    /// [`TaskComposer::compose_with_fallback`].
    #[must_use]
    pub fn expand_playbooks_with_fallback(
        &self,
        decision: &DecisionResult,
        playbooks: &[&Playbook],
        now: DateTime<Utc>,
        fallback_days: u32,
    ) -> Vec<Task> {
        let due = self.due_or_fallback(decision, now, fallback_days);
        self.expand_with_due(decision, playbooks, due)
    }

    fn due_or_fallback(
        &self,
        decision: &DecisionResult,
        now: DateTime<Utc>,
        fallback_days: u32,
    ) -> DateTime<Utc> {
        match self.due_at(&decision.srt, now) {
            Ok(due) => due,
            Err(err) => {
                warn!(
                    decision_id = %decision.decision_id,
                    horizon = %decision.srt.horizon,
                    fallback_days,
                    error = %err,
                    "malformed SRT horizon, applying fallback"
                );
                due_at(now, fallback_days, self.max_horizon_days)
            }
        }
    }

    fn expand_with_due(
        &self,
        decision: &DecisionResult,
        playbooks: &[&Playbook],
        due: DateTime<Utc>,
    ) -> Vec<Task> {
        let mut tasks = Vec::new();
        for playbook in playbooks {
            tasks.extend(playbook_tasks(decision, playbook, due));
        }
        tasks.extend(self.compose_with_due(decision, &decision.loop_code, due));
        let tasks = dedupe_by_id(tasks);
        debug!(
            decision_id = %decision.decision_id,
            playbooks = playbooks.len(),
            tasks = tasks.len(),
            "playbooks expanded"
        );
        tasks
    }

    fn compose_with_due(
        &self,
        decision: &DecisionResult,
        loop_code: &str,
        due: DateTime<Utc>,
    ) -> Vec<Task> {
        let (blocks, source) = if decision.template_actions.is_empty() {
            (default_blocks(&decision.order), "default")
        } else {
            (decision.template_actions.clone(), "template")
        };
        let tasks = blocks
            .iter()
            .flat_map(|block| {
                block
                    .actions
                    .iter()
                    .map(move |action| block_task(decision, loop_code, block, action, source, due))
            })
            .collect();
        dedupe_by_id(tasks)
    }
}

fn default_blocks(order: &[Capacity]) -> Vec<TemplateAction> {
    order
        .iter()
        .zip(1_u32..)
        .map(|(capacity, position)| TemplateAction {
            capacity: *capacity,
            order: position,
            sprint_level: capacity.default_sprint_level(),
            actions: vec![capacity.default_action().to_string()],
        })
        .collect()
}

fn block_task(
    decision: &DecisionResult,
    loop_code: &str,
    block: &TemplateAction,
    action: &str,
    source: &str,
    due: DateTime<Utc>,
) -> Task {
    let title = format!("[{}] {action}", block.capacity.label());
    let mut meta = base_meta(decision, loop_code, source);
    meta.insert("order".into(), json!(block.order));
    Task {
        id: format!("{}{title}", decision.task_prefix()),
        description: format!(
            "{action} for {} on loop {loop_code} (severity {:.2})",
            decision.indicator, decision.severity
        ),
        title,
        capacity: block.capacity,
        leverage: block.sprint_level,
        guardrails: decision.guardrails.caps.clone(),
        due_at: due,
        meta,
    }
}

fn playbook_tasks(decision: &DecisionResult, playbook: &Playbook, due: DateTime<Utc>) -> Vec<Task> {
    let capacity = decision.primary;
    let guardrails = merge_tags(&decision.guardrails.caps, &playbook.guardrails);
    playbook
        .actions
        .iter()
        .zip(1_u32..)
        .map(|(action, position)| {
            let mut meta = base_meta(decision, &decision.loop_code, "playbook");
            meta.insert("order".into(), json!(position));
            meta.insert("playbookId".into(), json!(playbook.id));
            if !action.params.is_empty() {
                meta.insert("params".into(), json!(action.params));
            }
            Task {
                id: format!("{}PB:{}", decision.task_prefix(), action.key),
                title: format!("[{}] {}", capacity.label(), action.label),
                description: format!(
                    "{} ({}) for {} on loop {}",
                    action.label, playbook.name, decision.indicator, decision.loop_code
                ),
                capacity,
                leverage: action
                    .leverage
                    .unwrap_or_else(|| capacity.default_sprint_level()),
                guardrails: guardrails.clone(),
                due_at: due,
                meta,
            }
        })
        .collect()
}

fn base_meta(decision: &DecisionResult, loop_code: &str, source: &str) -> IndexMap<String, Value> {
    let mut meta = IndexMap::new();
    meta.insert("loopCode".into(), json!(loop_code));
    meta.insert("decisionId".into(), json!(decision.decision_id));
    meta.insert("source".into(), json!(source));
    meta
}

fn merge_tags(first: &[String], second: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .iter()
        .chain(second)
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

/// Keeps the first task for every id, preserving order.
#[must_use]
pub fn dedupe_by_id(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{decision_with, fixed_now};
    use crate::model::SprintLevel;
    use crate::playbook::PlaybookRegistry;
    use chrono::Duration;
    use proptest::prelude::*;

    fn health_surge() -> Playbook {
        PlaybookRegistry::builtin()
            .get("pb-health-surge")
            .cloned()
            .unwrap()
    }

    #[test]
    fn template_actions_become_one_task_each() {
        let decision = decision_with(
            &[Capacity::Responsive, Capacity::Anticipatory],
            0.75,
            true,
        );
        let tasks = TaskComposer::default()
            .compose_tasks_from_decision(&decision, "MES-L03", fixed_now())
            .unwrap();
        let expected: usize = decision
            .template_actions
            .iter()
            .map(|block| block.actions.len())
            .sum();
        assert_eq!(tasks.len(), expected);
        assert!(tasks[0].title.starts_with("[RESPONSIVE] "));
        assert_eq!(tasks[0].leverage, SprintLevel::P);
        assert_eq!(tasks[0].guardrails, decision.guardrails.caps);
        assert_eq!(tasks[0].meta["source"], json!("template"));
        assert!(tasks.iter().all(|task| task.belongs_to(&decision.decision_id)));
    }

    #[test]
    fn empty_templates_synthesise_default_block_per_capacity() {
        let decision = decision_with(&Capacity::PRIORITY, 0.3, false);
        let tasks = TaskComposer::default()
            .compose_tasks_from_decision(&decision, "MIC-X99", fixed_now())
            .unwrap();
        assert_eq!(tasks.len(), 5);
        let levels: Vec<_> = tasks.iter().map(|task| task.leverage).collect();
        assert_eq!(
            levels,
            vec![
                SprintLevel::P,
                SprintLevel::P,
                SprintLevel::N,
                SprintLevel::N,
                SprintLevel::S
            ]
        );
        assert_eq!(tasks[4].capacity, Capacity::Structural);
        assert_eq!(tasks[4].meta["order"], json!(5));
    }

    #[test]
    fn composing_twice_yields_identical_tasks() {
        let decision = decision_with(&[Capacity::Deliberative, Capacity::Reflexive], 0.5, true);
        let composer = TaskComposer::default();
        let first = composer
            .compose_tasks_from_decision(&decision, "MES-L07", fixed_now())
            .unwrap();
        let second = composer
            .compose_tasks_from_decision(&decision, "MES-L07", fixed_now())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn due_at_follows_horizon_and_cap() {
        let now = fixed_now();
        let mut decision = decision_with(&[Capacity::Responsive], 0.75, true);
        let tasks = TaskComposer::default()
            .compose_tasks_from_decision(&decision, "MES-L03", now)
            .unwrap();
        assert_eq!(tasks[0].due_at, now + Duration::days(14));
        assert!(tasks[0].due_at <= now + Duration::days(30));

        decision.srt.horizon = "P90D".into();
        let tasks = TaskComposer::default()
            .compose_tasks_from_decision(&decision, "MES-L03", now)
            .unwrap();
        assert_eq!(tasks[0].due_at, now + Duration::days(30));
    }

    #[test]
    fn malformed_horizon_is_surfaced() {
        let mut decision = decision_with(&[Capacity::Responsive], 0.75, true);
        decision.srt.horizon = "garbage".into();
        let composer = TaskComposer::default();
        assert_eq!(
            composer.compose_tasks_from_decision(&decision, "MES-L03", fixed_now()),
            Err(CapacityError::MalformedHorizon("garbage".into()))
        );
        assert!(matches!(
            composer.expand_playbook(&decision, &health_surge(), fixed_now()),
            Err(CapacityError::MalformedHorizon(_))
        ));
    }

    #[test]
    fn explicit_fallback_applies_when_requested() {
        let now = fixed_now();
        let mut decision = decision_with(&[Capacity::Responsive], 0.75, true);
        decision.srt.horizon = "P2W".into();
        let tasks = TaskComposer::default().compose_with_fallback(&decision, "MES-L03", now, 7);
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|task| task.due_at == now + Duration::days(7)));
    }

    #[test]
    fn health_surge_playbook_expansion() {
        let decision = decision_with(
            &[Capacity::Responsive, Capacity::Anticipatory],
            0.75,
            true,
        );
        let playbook = health_surge();
        assert_eq!(playbook.actions.len(), 4);
        let tasks = TaskComposer::default()
            .expand_playbook(&decision, &playbook, fixed_now())
            .unwrap();
        assert!(tasks.len() >= 4);
        let ids: HashSet<_> = tasks.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids.len(), tasks.len());
        assert!(tasks
            .iter()
            .all(|task| task.id.starts_with(&decision.decision_id)));
        let first = &tasks[0];
        assert_eq!(
            first.id,
            format!("{}:PB:{}", decision.decision_id, playbook.actions[0].key)
        );
        assert_eq!(first.meta["playbookId"], json!("pb-health-surge"));
        for tag in decision.guardrails.caps.iter().chain(&playbook.guardrails) {
            assert!(first.guardrails.contains(tag));
        }
    }

    #[test]
    fn expanding_same_playbook_twice_does_not_duplicate() {
        let decision = decision_with(&[Capacity::Responsive], 0.75, true);
        let playbook = health_surge();
        let composer = TaskComposer::default();
        let once = composer
            .expand_playbook(&decision, &playbook, fixed_now())
            .unwrap();
        let twice = composer
            .expand_playbooks(&decision, &[&playbook, &playbook], fixed_now())
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_tags_keeps_first_occurrence_order() {
        let merged = merge_tags(
            &["timebox_14d".into(), "overtime_cap".into()],
            &["overtime_cap".into(), "staffing_cap".into()],
        );
        assert_eq!(merged, vec!["timebox_14d", "overtime_cap", "staffing_cap"]);
    }

    proptest! {
        #[test]
        fn expansion_respects_dedup_law(
            order_len in 1_usize..=5,
            with_templates in any::<bool>(),
            severity in 0.0_f64..=1.0,
        ) {
            let decision = decision_with(&Capacity::PRIORITY[..order_len], severity, with_templates);
            let playbook = health_surge();
            let composer = TaskComposer::default();
            let composed = composer
                .compose_tasks_from_decision(&decision, &decision.loop_code, fixed_now())
                .unwrap();
            let expanded = composer
                .expand_playbook(&decision, &playbook, fixed_now())
                .unwrap();
            let ids: HashSet<_> = expanded.iter().map(|task| task.id.clone()).collect();
            prop_assert_eq!(ids.len(), expanded.len());
            prop_assert!(expanded.len() <= playbook.actions.len() + composed.len());
            let again = composer
                .expand_playbook(&decision, &playbook, fixed_now())
                .unwrap();
            prop_assert_eq!(expanded, again);
        }
    }
}
