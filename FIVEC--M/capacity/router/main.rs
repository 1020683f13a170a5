//! Capacity router: decision in, workspace screen (or nothing) out.

/// Special-case screen table and per-capacity defaults.
pub mod screens;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Capacity, CapacityError, Consent, DecisionResult, Guardrails, Srt};
pub use screens::{default_screen, ScreenOverride, ScreenOverrideSpec, ScreenTable};

/// Route path of the capacity workspace.
pub const WORKSPACE_PATH: &str = "/workspace-5c";

/// Per-call routing inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteOptions {
    /// Capacity forced by the caller instead of the decision's primary.
    pub override_primary: Option<Capacity>,
    /// When the last automatic route happened.
    pub last_auto_route_at: Option<DateTime<Utc>>,
    /// Minimum gap between automatic routes.
    pub respect_cooldown_ms: Option<u64>,
    /// Bypasses the cooldown unconditionally.
    pub life_safety: bool,
}

impl RouteOptions {
    /// Sets the override capacity.
    #[must_use]
    pub const fn with_override(mut self, capacity: Capacity) -> Self {
        self.override_primary = Some(capacity);
        self
    }

    /// Parses and sets the override capacity.
    pub fn with_override_str(self, raw: &str) -> Result<Self, CapacityError> {
        Ok(self.with_override(raw.parse()?))
    }

    /// Sets the cooldown state.
    #[must_use]
    pub const fn with_cooldown(mut self, last_auto_route_at: DateTime<Utc>, cooldown_ms: u64) -> Self {
        self.last_auto_route_at = Some(last_auto_route_at);
        self.respect_cooldown_ms = Some(cooldown_ms);
        self
    }

    /// Marks the route as life-safety.
    #[must_use]
    pub const fn life_safety(mut self) -> Self {
        self.life_safety = true;
        self
    }

    /// Milliseconds left on the cooldown at `now`, if it still applies.
    #[must_use]
    pub fn cooldown_remaining_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.life_safety {
            return None;
        }
        let (last, cooldown) = self.last_auto_route_at.zip(self.respect_cooldown_ms)?;
        let cooldown = i64::try_from(cooldown).unwrap_or(i64::MAX);
        let elapsed = (now - last).num_milliseconds();
        (elapsed < cooldown).then(|| cooldown.saturating_sub(elapsed))
    }
}

/// Navigation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteParams {
    /// Capacity the screen belongs to.
    pub capacity: Capacity,
    /// Screen identifier.
    pub screen: String,
    /// Loop code.
    #[serde(rename = "loop")]
    pub loop_code: String,
}

/// Decision context passed through to the screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteUi {
    /// Whether to show the secondary-capacity chip.
    pub show_secondary_chip: bool,
    /// Consent requirements.
    pub consent: Consent,
    /// Reporting window.
    pub srt: Srt,
    /// Execution constraints.
    pub guardrails: Guardrails,
    /// Near-tie gap between primary and secondary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_tie_delta: Option<f64>,
}

/// Navigation target for one decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    /// Route path.
    pub path: String,
    /// Route parameters.
    pub params: RouteParams,
    /// Pass-through decision context.
    pub ui: RouteUi,
    /// Decision id the route was derived from.
    pub decision_hash: String,
}

/// Maps decisions onto workspace screens.
#[derive(Debug, Clone, Default)]
pub struct CapacityRouter {
    screens: ScreenTable,
}

impl CapacityRouter {
    /// Creates a router over `screens`.
    #[must_use]
    pub const fn new(screens: ScreenTable) -> Self {
        Self { screens }
    }

    /// Screen table in use.
    #[must_use]
    pub const fn screens(&self) -> &ScreenTable {
        &self.screens
    }

    /// Routes `decision` for `loop_code`; `Ok(None)` means the cooldown
    /// suppressed auto-navigation.
    pub fn route_from_decision(
        &self,
        loop_code: &str,
        decision: &DecisionResult,
        options: &RouteOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<RouteResult>, CapacityError> {
        let primary = match options.override_primary {
            Some(capacity) => capacity,
            None => decision
                .order
                .first()
                .copied()
                .ok_or_else(|| CapacityError::UnknownCapacity(String::new()))?,
        };
        if let Some(remaining_ms) = options.cooldown_remaining_ms(now) {
            debug!(
                loop_code,
                decision_id = %decision.decision_id,
                remaining_ms,
                "auto-route suppressed by cooldown"
            );
            return Ok(None);
        }
        let screen = self.screens.resolve(loop_code, primary).to_string();
        debug!(loop_code, %primary, %screen, "route selected");
        Ok(Some(RouteResult {
            path: WORKSPACE_PATH.into(),
            params: RouteParams {
                capacity: primary,
                screen,
                loop_code: loop_code.into(),
            },
            ui: RouteUi {
                show_secondary_chip: decision.near_tie_delta.is_some(),
                consent: decision.consent,
                srt: decision.srt.clone(),
                guardrails: decision.guardrails.clone(),
                near_tie_delta: decision.near_tie_delta,
            },
            decision_hash: decision.decision_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{decision_for_loop, decision_with, fixed_now};
    use chrono::Duration;
    use serde_json::json;

    const T: i64 = 60_000;

    fn route(loop_code: &str, decision: &DecisionResult, options: &RouteOptions) -> Option<RouteResult> {
        CapacityRouter::default()
            .route_from_decision(loop_code, decision, options, fixed_now())
            .unwrap()
    }

    fn cooling(elapsed_ms: i64) -> RouteOptions {
        RouteOptions::default().with_cooldown(
            fixed_now() - Duration::milliseconds(elapsed_ms),
            u64::try_from(T).unwrap(),
        )
    }

    #[test]
    fn cooldown_boundary() {
        let decision = decision_with(&[Capacity::Responsive, Capacity::Anticipatory], 0.75, true);
        assert!(route("MES-L03", &decision, &cooling(T - 1)).is_none());
        assert!(route("MES-L03", &decision, &cooling(T)).is_some());
        assert!(route("MES-L03", &decision, &cooling(T + 1)).is_some());
    }

    #[test]
    fn life_safety_bypasses_cooldown() {
        let decision = decision_with(&[Capacity::Responsive], 0.9, true);
        for elapsed in [0, 1, T - 1] {
            assert!(route("MES-L03", &decision, &cooling(elapsed).life_safety()).is_some());
        }
    }

    #[test]
    fn cooldown_needs_both_fields() {
        let decision = decision_with(&[Capacity::Responsive], 0.9, true);
        let options = RouteOptions {
            last_auto_route_at: Some(fixed_now()),
            ..RouteOptions::default()
        };
        assert!(route("MES-L03", &decision, &options).is_some());
    }

    #[test]
    fn meta_l08_anticipatory_opens_trigger_library() {
        let decision = decision_for_loop("META-L08", Capacity::Anticipatory, 0.5);
        let result = route("META-L08", &decision, &RouteOptions::default()).unwrap();
        assert_eq!(result.path, "/workspace-5c");
        assert_eq!(
            serde_json::to_value(&result.params).unwrap(),
            json!({ "capacity": "anticipatory", "screen": "trigger-library", "loop": "META-L08" })
        );
        assert_eq!(result.decision_hash, decision.decision_id);
    }

    #[test]
    fn unmatched_loop_falls_back_to_default_screen() {
        let decision = decision_for_loop("MIC-X99", Capacity::Structural, 0.5);
        let result = route("MIC-X99", &decision, &RouteOptions::default()).unwrap();
        assert_eq!(result.params.screen, "mandate-gate");
        assert_eq!(result.params.capacity, Capacity::Structural);
    }

    #[test]
    fn override_replaces_primary() {
        let decision = decision_for_loop("META-L08", Capacity::Responsive, 0.5);
        let options = RouteOptions::default().with_override_str("anticipatory").unwrap();
        let result = route("META-L08", &decision, &options).unwrap();
        assert_eq!(result.params.screen, "trigger-library");
        assert_eq!(
            RouteOptions::default().with_override_str("heroic"),
            Err(CapacityError::UnknownCapacity("heroic".into()))
        );
    }

    #[test]
    fn empty_order_without_override_is_rejected() {
        let mut decision = decision_with(&[Capacity::Responsive], 0.5, true);
        decision.order.clear();
        let err = CapacityRouter::default()
            .route_from_decision("MES-L03", &decision, &RouteOptions::default(), fixed_now())
            .unwrap_err();
        assert!(matches!(err, CapacityError::UnknownCapacity(_)));
        let options = RouteOptions::default().with_override(Capacity::Reflexive);
        assert_eq!(
            route("MES-L03", &decision, &options).unwrap().params.screen,
            "controller-tuner"
        );
    }

    #[test]
    fn ui_passes_decision_context_through() {
        let mut decision = decision_with(&[Capacity::Deliberative, Capacity::Reflexive], 0.5, true);
        let result = route("MES-L07", &decision, &RouteOptions::default()).unwrap();
        assert!(!result.ui.show_secondary_chip);
        assert_eq!(result.ui.guardrails, decision.guardrails);
        assert_eq!(result.ui.srt, decision.srt);

        decision.near_tie_delta = Some(0.01);
        let result = route("MES-L07", &decision, &RouteOptions::default()).unwrap();
        assert!(result.ui.show_secondary_chip);
        let ui = serde_json::to_value(&result.ui).unwrap();
        assert_eq!(ui["nearTieDelta"], json!(0.01));
        assert_eq!(ui["showSecondaryChip"], json!(true));
    }
}
