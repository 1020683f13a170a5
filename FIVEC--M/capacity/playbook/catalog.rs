use indexmap::IndexMap;
use serde_json::Value;

use super::{Playbook, PlaybookAction, PlaybookConditions, ANY_LOOP};
use crate::model::{Capacity, SprintLevel};

fn action(key: &str, label: &str) -> PlaybookAction {
    PlaybookAction {
        key: key.into(),
        label: label.into(),
        params: IndexMap::new(),
        leverage: None,
    }
}

fn with_param(mut action: PlaybookAction, key: &str, value: impl Into<Value>) -> PlaybookAction {
    action.params.insert(key.into(), value.into());
    action
}

fn tags(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

/// Default catalog; extra playbooks come from config.
#[must_use]
pub fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook {
            id: "pb-health-surge".into(),
            name: "Health system surge".into(),
            loops: tags(&["MES-L03", "MES-L04", "MES-L05"]),
            conditions: PlaybookConditions {
                severity_min: Some(0.6),
                severity_max: None,
                primary: Some(Capacity::Responsive),
            },
            actions: vec![
                with_param(
                    action("surge-staffing", "Activate surge staffing roster"),
                    "maxOvertimeHours",
                    12,
                ),
                action("overflow-beds", "Open overflow bed capacity"),
                PlaybookAction {
                    leverage: Some(SprintLevel::N),
                    ..action("public-advisory", "Issue public care-seeking advisory")
                },
                with_param(
                    action("daily-checkpoint", "Stand up daily surge checkpoint"),
                    "cadence",
                    "daily",
                ),
            ],
            guardrails: tags(&["overtime_cap", "staffing_ratio_floor"]),
        },
        Playbook {
            id: "pb-trigger-refresh".into(),
            name: "Early-warning trigger refresh".into(),
            loops: tags(&["META-L08"]),
            conditions: PlaybookConditions {
                primary: Some(Capacity::Anticipatory),
                ..PlaybookConditions::default()
            },
            actions: vec![
                action("recalibrate-triggers", "Recalibrate trigger thresholds"),
                action("watch-rota", "Assign watch rota for leading indicators"),
            ],
            guardrails: tags(&["scope_cap"]),
        },
        Playbook {
            id: "pb-oscillation-damping".into(),
            name: "Oscillation damping".into(),
            loops: tags(&[ANY_LOOP]),
            conditions: PlaybookConditions {
                severity_min: Some(0.2),
                primary: Some(Capacity::Reflexive),
                ..PlaybookConditions::default()
            },
            actions: vec![
                action("lengthen-sampling", "Lengthen controller sampling interval"),
                with_param(
                    action("reduce-gain", "Reduce controller gain"),
                    "step",
                    0.1,
                ),
            ],
            guardrails: tags(&["change_freeze_48h"]),
        },
        Playbook {
            id: "pb-legitimacy-repair".into(),
            name: "Legitimacy repair".into(),
            loops: tags(&[ANY_LOOP]),
            conditions: PlaybookConditions {
                primary: Some(Capacity::Deliberative),
                ..PlaybookConditions::default()
            },
            actions: vec![
                action("stakeholder-map", "Refresh stakeholder map"),
                action("citizen-panel", "Convene citizen panel"),
                action("publish-rationale", "Publish decision rationale"),
            ],
            guardrails: tags(&["pilot_only"]),
        },
    ]
}
