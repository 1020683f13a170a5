use serde::{Deserialize, Serialize};

use super::scoring::{round4, Features};
use crate::model::{Cadence, Capacity, Consent, Guardrails, PerCapacity, Srt, TemplateAction};

/// Guardrail, consent, and template policy applied after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Timebox per primary capacity.
    pub timebox_days: PerCapacity<u32>,
    /// Base cooldown between automatic routes.
    pub cooldown_ms: u64,
    /// Severity at which the cooldown is halved.
    pub urgent_severity: f64,
    /// Severity at which responsive work gets an overtime cap.
    pub overtime_severity: f64,
    /// Severity at or above which the cadence is daily.
    pub daily_severity: f64,
    /// Severity at or above which the cadence is weekly.
    pub weekly_severity: f64,
    /// Legitimacy gap that forces a deliberative step.
    pub consent_threshold: f64,
    /// Largest primary/secondary gap still reported as a near tie.
    pub near_tie_threshold: f64,
    /// Suggested actions per capacity.
    pub actions: PerCapacity<Vec<String>>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            timebox_days: PerCapacity {
                responsive: 14,
                reflexive: 30,
                deliberative: 21,
                anticipatory: 28,
                structural: 90,
            },
            cooldown_ms: 6 * 60 * 60 * 1_000,
            urgent_severity: 0.8,
            overtime_severity: 0.6,
            daily_severity: 0.7,
            weekly_severity: 0.4,
            consent_threshold: 0.5,
            near_tie_threshold: 0.05,
            actions: PerCapacity {
                responsive: strings(&[
                    "Stabilise the indicator back inside its band",
                    "Stand up a rapid-response checkpoint",
                ]),
                reflexive: strings(&[
                    "Retune controller gains",
                    "Review the last loop adjustments",
                ]),
                deliberative: strings(&[
                    "Convene a trade-off session",
                    "Publish options with their trade-offs",
                ]),
                anticipatory: strings(&[
                    "Update early-warning trigger thresholds",
                    "Run a scenario watch",
                ]),
                structural: strings(&[
                    "Draft a mandate change proposal",
                    "Review authority and budget lines",
                ]),
            },
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

impl DecisionPolicy {
    /// Checks thresholds are ordered and within [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        let unit = [
            ("urgent_severity", self.urgent_severity),
            ("overtime_severity", self.overtime_severity),
            ("daily_severity", self.daily_severity),
            ("weekly_severity", self.weekly_severity),
            ("consent_threshold", self.consent_threshold),
            ("near_tie_threshold", self.near_tie_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must lie in [0, 1], got {value}"));
            }
        }
        if self.weekly_severity > self.daily_severity {
            return Err("weekly_severity must not exceed daily_severity".into());
        }
        Ok(())
    }

    /// Consent requirement for the given features and primary capacity.
    #[must_use]
    pub fn consent(&self, features: &Features, primary: Capacity) -> Consent {
        let legitimacy_gap = round4(0.7 * features.dispersion + 0.3 * features.hub_saturation);
        Consent {
            require_deliberative: legitimacy_gap >= self.consent_threshold
                || primary == Capacity::Structural,
            legitimacy_gap,
        }
    }

    /// Guardrails for the primary capacity at the given severity.
    #[must_use]
    pub fn guardrails(&self, primary: Capacity, severity: f64, consent: &Consent) -> Guardrails {
        let timebox_days = *self.timebox_days.get(primary);
        let mut caps = vec![format!("timebox_{timebox_days}d")];
        match primary {
            Capacity::Responsive if severity >= self.overtime_severity => {
                caps.push("overtime_cap".into());
            }
            Capacity::Structural => caps.push("budget_cap".into()),
            Capacity::Anticipatory => caps.push("scope_cap".into()),
            Capacity::Responsive | Capacity::Reflexive | Capacity::Deliberative => {}
        }
        if consent.require_deliberative {
            caps.push("pilot_only".into());
        }
        let cool_down_ms = if severity >= self.urgent_severity {
            self.cooldown_ms / 2
        } else {
            self.cooldown_ms
        };
        Guardrails {
            timebox_days,
            caps,
            cool_down_ms,
        }
    }

    /// Reporting cadence and horizon.
    #[must_use]
    pub fn srt(&self, severity: f64, guardrails: &Guardrails) -> Srt {
        let cadence = if severity >= self.daily_severity {
            Cadence::Daily
        } else if severity >= self.weekly_severity {
            Cadence::Weekly
        } else {
            Cadence::Monthly
        };
        Srt {
            cadence,
            horizon: format!("P{}D", guardrails.timebox_days),
        }
    }

    /// Action blocks for the primary and secondary capacities.
    #[must_use]
    pub fn template_actions(&self, order: &[Capacity]) -> Vec<TemplateAction> {
        order
            .iter()
            .take(2)
            .zip(1_u32..)
            .filter(|(capacity, _)| !self.actions.get(**capacity).is_empty())
            .map(|(capacity, position)| TemplateAction {
                capacity: *capacity,
                order: position,
                sprint_level: capacity.default_sprint_level(),
                actions: self.actions.get(*capacity).clone(),
            })
            .collect()
    }

    /// Primary minus secondary score when the gap is within the near-tie threshold.
    #[must_use]
    pub fn near_tie(&self, primary_score: f64, secondary_score: f64) -> Option<f64> {
        let delta = round4(primary_score - secondary_score);
        (delta <= self.near_tie_threshold).then_some(delta)
    }
}
