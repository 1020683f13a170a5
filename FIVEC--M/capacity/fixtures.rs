//! Shared builders for unit tests.

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;

use crate::{
    decision::{fingerprint, policy::DecisionPolicy},
    model::{Capacity, Consent, DecisionResult, Scores, SignalReading, SprintLevel, Task},
};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Bed occupancy far above its band: responsive primary, anticipatory secondary.
pub fn health_surge_reading() -> SignalReading {
    SignalReading::new("MES-L03", "bed_occupancy", 185.0)
        .with_band(0.0, 100.0)
        .with_persistence(4)
        .with_integral_error(1.0)
        .with_oscillation(0.2)
        .with_dispersion(0.2)
        .with_hub_saturation(0.3)
}

/// Decision whose order is `order`, with policy-derived guardrails and SRT.
pub fn decision_with(order: &[Capacity], severity: f64, with_templates: bool) -> DecisionResult {
    decision_on("MES-L03", order, severity, with_templates)
}

/// Decision on `loop_code` led by `primary`.
pub fn decision_for_loop(loop_code: &str, primary: Capacity, severity: f64) -> DecisionResult {
    let mut order = vec![primary];
    order.extend(Capacity::PRIORITY.iter().copied().filter(|c| *c != primary));
    decision_on(loop_code, &order, severity, true)
}

fn decision_on(
    loop_code: &str,
    order: &[Capacity],
    severity: f64,
    with_templates: bool,
) -> DecisionResult {
    let policy = DecisionPolicy::default();
    let primary = order[0];
    let secondary = order.get(1).copied().unwrap_or(primary);
    let mut scores = Scores::default();
    for (capacity, position) in order.iter().zip(0_u32..) {
        *scores.get_mut(*capacity) = 0.1f64.mul_add(-f64::from(position), 0.9);
    }
    let consent = Consent {
        require_deliberative: primary == Capacity::Structural,
        legitimacy_gap: 0.2,
    };
    let guardrails = policy.guardrails(primary, severity, &consent);
    let srt = policy.srt(severity, &guardrails);
    let decision_id =
        fingerprint::decision_id(loop_code, "bed_occupancy", &scores, &srt, &guardrails).unwrap();
    DecisionResult {
        loop_code: loop_code.into(),
        indicator: "bed_occupancy".into(),
        severity,
        scores,
        order: order.to_vec(),
        primary,
        secondary,
        guardrails,
        srt,
        consent,
        template_actions: if with_templates {
            policy.template_actions(order)
        } else {
            Vec::new()
        },
        near_tie_delta: None,
        decision_id,
    }
}

pub fn task(id: &str) -> Task {
    Task {
        id: id.into(),
        title: format!("task {id}"),
        description: String::new(),
        capacity: Capacity::Responsive,
        leverage: SprintLevel::P,
        guardrails: vec!["timebox_14d".into()],
        due_at: fixed_now(),
        meta: IndexMap::new(),
    }
}
