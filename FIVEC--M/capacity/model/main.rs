//! Core vocabulary shared by the engine, composer, and router.

/// Decision records produced by the engine.
pub mod decision;
/// Actionable task records.
pub mod task;

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use decision::{Cadence, Consent, DecisionResult, Guardrails, Scores, Srt, TemplateAction};
pub use task::Task;

/// Errors surfaced by the capacity pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CapacityError {
    /// A reading field is missing, non-finite, or out of range.
    #[error("invalid reading field `{field}`: {reason}")]
    InvalidReading {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The SRT horizon is not a whole-day ISO-8601 duration.
    #[error("malformed SRT horizon `{0}` (expected P<n>D)")]
    MalformedHorizon(String),
    /// A capacity name outside the five known capacities, or none at all.
    #[error("unknown capacity `{0}`")]
    UnknownCapacity(String),
    /// An MCDA option cannot be compared on the requested criteria.
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        /// Option identifier.
        option: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Canonical encoding of a decision failed.
    #[error("decision encoding failed: {0}")]
    Encoding(String),
}

impl CapacityError {
    pub(crate) fn reading(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReading {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The five governance response modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Capacity {
    /// Immediate stabilisation of an out-of-band loop.
    Responsive,
    /// Tuning of the loop's own control behaviour.
    Reflexive,
    /// Negotiated trade-offs between stakeholders.
    Deliberative,
    /// Early warning and trigger management.
    Anticipatory,
    /// Changes to mandates, budgets, and institutions.
    Structural,
}

impl Capacity {
    /// Declaration order.
    pub const ALL: [Self; 5] = [
        Self::Responsive,
        Self::Reflexive,
        Self::Deliberative,
        Self::Anticipatory,
        Self::Structural,
    ];

    /// Tie-break order used when two capacities score the same.
    pub const PRIORITY: [Self; 5] = [
        Self::Responsive,
        Self::Anticipatory,
        Self::Deliberative,
        Self::Reflexive,
        Self::Structural,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Responsive => "responsive",
            Self::Reflexive => "reflexive",
            Self::Deliberative => "deliberative",
            Self::Anticipatory => "anticipatory",
            Self::Structural => "structural",
        }
    }

    /// Uppercase tag used in task titles.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Responsive => "RESPONSIVE",
            Self::Reflexive => "REFLEXIVE",
            Self::Deliberative => "DELIBERATIVE",
            Self::Anticipatory => "ANTICIPATORY",
            Self::Structural => "STRUCTURAL",
        }
    }

    /// Position in [`Capacity::PRIORITY`]; lower wins ties.
    #[must_use]
    pub const fn priority_rank(self) -> usize {
        match self {
            Self::Responsive => 0,
            Self::Anticipatory => 1,
            Self::Deliberative => 2,
            Self::Reflexive => 3,
            Self::Structural => 4,
        }
    }

    /// Leverage tier assumed when a block does not state one.
    #[must_use]
    pub const fn default_sprint_level(self) -> SprintLevel {
        match self {
            Self::Structural => SprintLevel::S,
            Self::Responsive | Self::Anticipatory => SprintLevel::P,
            Self::Reflexive | Self::Deliberative => SprintLevel::N,
        }
    }

    /// Action used when a decision carries no template actions.
    #[must_use]
    pub const fn default_action(self) -> &'static str {
        match self {
            Self::Responsive => "Run rapid-response checkpoint",
            Self::Reflexive => "Tune loop controller",
            Self::Deliberative => "Open trade-off deliberation",
            Self::Anticipatory => "Review early-warning triggers",
            Self::Structural => "Prepare mandate review",
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capacity {
    type Err = CapacityError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|capacity| capacity.as_str() == needle)
            .ok_or_else(|| CapacityError::UnknownCapacity(raw.to_string()))
    }
}

/// Leverage tier of an intervention: nudge, parameter, or structure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SprintLevel {
    /// Nudge: communication and norms.
    N,
    /// Parameter: thresholds, rates, staffing.
    P,
    /// Structure: rules, mandates, topology.
    S,
}

impl fmt::Display for SprintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::N => write!(f, "N"),
            Self::P => write!(f, "P"),
            Self::S => write!(f, "S"),
        }
    }
}

/// One value per capacity, accessed exhaustively.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct PerCapacity<T> {
    /// Responsive entry.
    pub responsive: T,
    /// Reflexive entry.
    pub reflexive: T,
    /// Deliberative entry.
    pub deliberative: T,
    /// Anticipatory entry.
    pub anticipatory: T,
    /// Structural entry.
    pub structural: T,
}

impl<T> PerCapacity<T> {
    /// Builds a table by evaluating `f` for every capacity.
    pub fn from_fn(mut f: impl FnMut(Capacity) -> T) -> Self {
        Self {
            responsive: f(Capacity::Responsive),
            reflexive: f(Capacity::Reflexive),
            deliberative: f(Capacity::Deliberative),
            anticipatory: f(Capacity::Anticipatory),
            structural: f(Capacity::Structural),
        }
    }

    /// Entry for `capacity`.
    #[must_use]
    pub const fn get(&self, capacity: Capacity) -> &T {
        match capacity {
            Capacity::Responsive => &self.responsive,
            Capacity::Reflexive => &self.reflexive,
            Capacity::Deliberative => &self.deliberative,
            Capacity::Anticipatory => &self.anticipatory,
            Capacity::Structural => &self.structural,
        }
    }

    /// Mutable entry for `capacity`.
    pub fn get_mut(&mut self, capacity: Capacity) -> &mut T {
        match capacity {
            Capacity::Responsive => &mut self.responsive,
            Capacity::Reflexive => &mut self.reflexive,
            Capacity::Deliberative => &mut self.deliberative,
            Capacity::Anticipatory => &mut self.anticipatory,
            Capacity::Structural => &mut self.structural,
        }
    }

    /// Entries in [`Capacity::PRIORITY`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Capacity, &T)> + '_ {
        Capacity::PRIORITY
            .into_iter()
            .map(move |capacity| (capacity, self.get(capacity)))
    }
}

/// Acceptable range for an indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Band {
    /// Lower bound (inclusive).
    pub lower: f64,
    /// Upper bound (inclusive).
    pub upper: f64,
}

/// One timestamped indicator observation for a loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalReading {
    /// Loop identifier, e.g. `MES-L03`.
    pub loop_code: String,
    /// Indicator name.
    pub indicator: String,
    /// Observed value.
    pub value: f64,
    /// Acceptable band, when the indicator has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    /// Oscillation intensity in [0, 1].
    pub oscillation: f64,
    /// Stakeholder dispersion in [0, 1].
    pub dispersion: f64,
    /// Consecutive periods the deviation has lasted.
    pub persistence: u32,
    /// Accumulated control error.
    pub integral_error: f64,
    /// Saturation of the loop's hub actors in [0, 1].
    pub hub_saturation: f64,
    /// Observation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl SignalReading {
    /// Creates a calm reading; adjust with the `with_*` helpers.
    #[must_use]
    pub fn new(loop_code: impl Into<String>, indicator: impl Into<String>, value: f64) -> Self {
        Self {
            loop_code: loop_code.into(),
            indicator: indicator.into(),
            value,
            band: None,
            oscillation: 0.0,
            dispersion: 0.0,
            persistence: 0,
            integral_error: 0.0,
            hub_saturation: 0.0,
            observed_at: None,
        }
    }

    /// Parses a reading from JSON, reporting missing fields as invalid readings.
    pub fn from_json(raw: &str) -> Result<Self, CapacityError> {
        serde_json::from_str(raw).map_err(|err| CapacityError::reading("<json>", err.to_string()))
    }

    /// Sets the acceptable band.
    #[must_use]
    pub fn with_band(mut self, lower: f64, upper: f64) -> Self {
        self.band = Some(Band { lower, upper });
        self
    }

    /// Sets oscillation.
    #[must_use]
    pub fn with_oscillation(mut self, oscillation: f64) -> Self {
        self.oscillation = oscillation;
        self
    }

    /// Sets dispersion.
    #[must_use]
    pub fn with_dispersion(mut self, dispersion: f64) -> Self {
        self.dispersion = dispersion;
        self
    }

    /// Sets persistence.
    #[must_use]
    pub fn with_persistence(mut self, persistence: u32) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets integral error.
    #[must_use]
    pub fn with_integral_error(mut self, integral_error: f64) -> Self {
        self.integral_error = integral_error;
        self
    }

    /// Sets hub saturation.
    #[must_use]
    pub fn with_hub_saturation(mut self, hub_saturation: f64) -> Self {
        self.hub_saturation = hub_saturation;
        self
    }

    /// Checks identifiers, finiteness, and unit ranges.
    pub fn validate(&self) -> Result<(), CapacityError> {
        if self.loop_code.trim().is_empty() {
            return Err(CapacityError::reading("loopCode", "must not be empty"));
        }
        if self.indicator.trim().is_empty() {
            return Err(CapacityError::reading("indicator", "must not be empty"));
        }
        require_finite("value", self.value)?;
        require_finite("integralError", self.integral_error)?;
        require_unit("oscillation", self.oscillation)?;
        require_unit("dispersion", self.dispersion)?;
        require_unit("hubSaturation", self.hub_saturation)?;
        if let Some(band) = self.band {
            require_finite("band.lower", band.lower)?;
            require_finite("band.upper", band.upper)?;
            if band.lower > band.upper {
                return Err(CapacityError::reading(
                    "band",
                    format!("lower {} exceeds upper {}", band.lower, band.upper),
                ));
            }
        }
        Ok(())
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), CapacityError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CapacityError::reading(field, format!("{value} is not finite")))
    }
}

fn require_unit(field: &str, value: f64) -> Result<(), CapacityError> {
    require_finite(field, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CapacityError::reading(
            field,
            format!("{value} outside [0, 1]"),
        ))
    }
}
