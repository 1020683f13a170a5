//! Decision engine: signal reading in, capacity decision out.

/// Content-addressed decision ids.
pub mod fingerprint;
/// Guardrail, SRT, consent, and template policy.
pub mod policy;
/// Feature extraction, weights, and ranking.
pub mod scoring;

use tracing::{debug, instrument};

use crate::model::{Capacity, CapacityError, DecisionResult, SignalReading};
use policy::DecisionPolicy;
use scoring::{rank, ScoringWeights};

/// Pure, deterministic mapping from readings to decisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionEngine {
    weights: ScoringWeights,
    policy: DecisionPolicy,
}

impl DecisionEngine {
    /// Creates an engine with explicit scoring weights and policy.
    #[must_use]
    pub const fn new(weights: ScoringWeights, policy: DecisionPolicy) -> Self {
        Self { weights, policy }
    }

    /// Scoring weights in effect.
    #[must_use]
    pub const fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Guardrail policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Computes the decision for one reading.
    ///
    /// Identical readings always yield identical scores, order, and id.
    #[instrument(level = "debug", skip(self, reading), fields(loop_code = %reading.loop_code, indicator = %reading.indicator))]
    pub fn decide(&self, reading: &SignalReading) -> Result<DecisionResult, CapacityError> {
        reading.validate()?;
        let features = self.weights.features(reading);
        let scores = self.weights.score(&features);
        let order = rank(&scores);
        let (primary, secondary) = match order.as_slice() {
            [first, second, ..] => (*first, *second),
            _ => return Err(CapacityError::UnknownCapacity("<empty order>".into())),
        };

        let severity = features.severity;
        let consent = self.policy.consent(&features, primary);
        let guardrails = self.policy.guardrails(primary, severity, &consent);
        let srt = self.policy.srt(severity, &guardrails);
        let template_actions = self.policy.template_actions(&order);
        let near_tie_delta = self
            .policy
            .near_tie(scores.score(primary), scores.score(secondary));
        let decision_id = fingerprint::decision_id(
            &reading.loop_code,
            &reading.indicator,
            &scores,
            &srt,
            &guardrails,
        )?;

        debug!(
            %decision_id,
            %primary,
            %secondary,
            severity,
            near_tie = near_tie_delta.is_some(),
            "capacity decision computed"
        );

        Ok(DecisionResult {
            loop_code: reading.loop_code.clone(),
            indicator: reading.indicator.clone(),
            severity,
            scores,
            order,
            primary,
            secondary,
            guardrails,
            srt,
            consent,
            template_actions,
            near_tie_delta,
            decision_id,
        })
    }

    /// Convenience for callers that only need the winning capacity.
    pub fn primary(&self, reading: &SignalReading) -> Result<Capacity, CapacityError> {
        Ok(self.decide(reading)?.primary)
    }
}
