use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Band, Capacity, PerCapacity, Scores, SignalReading};

/// Normalised sub-metrics of a reading, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Features {
    /// Distance outside the band, normalised by the band width.
    pub deviation: f64,
    /// Combined severity.
    pub severity: f64,
    /// Oscillation as reported.
    pub oscillation: f64,
    /// Dispersion as reported.
    pub dispersion: f64,
    /// Persistence relative to the saturation point.
    pub persistence: f64,
    /// Squashed magnitude of the integral error.
    pub integral_error: f64,
    /// Hub saturation as reported.
    pub hub_saturation: f64,
}

/// Linear weights for one capacity: `bias + Σ weight · feature`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    /// Constant term.
    pub bias: f64,
    /// Severity weight.
    pub severity: f64,
    /// Oscillation weight.
    pub oscillation: f64,
    /// Dispersion weight.
    pub dispersion: f64,
    /// Persistence weight.
    pub persistence: f64,
    /// Integral error weight.
    pub integral_error: f64,
    /// Hub saturation weight.
    pub hub_saturation: f64,
}

impl FeatureWeights {
    /// Evaluates the weighted sum.
    #[must_use]
    pub fn apply(&self, features: &Features) -> f64 {
        self.bias
            + self.severity * features.severity
            + self.oscillation * features.oscillation
            + self.dispersion * features.dispersion
            + self.persistence * features.persistence
            + self.integral_error * features.integral_error
            + self.hub_saturation * features.hub_saturation
    }

    fn values(&self) -> [f64; 7] {
        [
            self.bias,
            self.severity,
            self.oscillation,
            self.dispersion,
            self.persistence,
            self.integral_error,
            self.hub_saturation,
        ]
    }
}

/// Mix of sub-metrics that make up severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    /// Band deviation weight.
    pub deviation: f64,
    /// Persistence weight.
    pub persistence: f64,
    /// Integral error weight.
    pub integral_error: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            deviation: 0.6,
            persistence: 0.25,
            integral_error: 0.15,
        }
    }
}

/// Scoring policy. Every coefficient can be overridden from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Periods of persistence that count as fully persistent.
    pub persistence_saturation: f64,
    /// Severity composition.
    pub severity: SeverityWeights,
    /// Per-capacity weights.
    pub capacities: PerCapacity<FeatureWeights>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            persistence_saturation: 6.0,
            severity: SeverityWeights::default(),
            capacities: PerCapacity {
                responsive: FeatureWeights {
                    severity: 0.8,
                    oscillation: 0.05,
                    integral_error: 0.05,
                    ..FeatureWeights::default()
                },
                reflexive: FeatureWeights {
                    severity: 0.1,
                    oscillation: 0.6,
                    persistence: 0.1,
                    integral_error: 0.2,
                    ..FeatureWeights::default()
                },
                deliberative: FeatureWeights {
                    severity: 0.15,
                    dispersion: 0.6,
                    persistence: 0.05,
                    hub_saturation: 0.2,
                    ..FeatureWeights::default()
                },
                anticipatory: FeatureWeights {
                    severity: 0.1,
                    oscillation: 0.1,
                    persistence: 0.4,
                    integral_error: 0.3,
                    ..FeatureWeights::default()
                },
                structural: FeatureWeights {
                    severity: 0.05,
                    dispersion: 0.1,
                    persistence: 0.25,
                    hub_saturation: 0.6,
                    ..FeatureWeights::default()
                },
            },
        }
    }
}

impl ScoringWeights {
    /// Checks that every coefficient is finite and the saturation positive.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.persistence_saturation.is_finite() && self.persistence_saturation > 0.0) {
            return Err(format!(
                "persistence_saturation must be positive, got {}",
                self.persistence_saturation
            ));
        }
        let severity = [
            self.severity.deviation,
            self.severity.persistence,
            self.severity.integral_error,
        ];
        if severity.iter().any(|w| !w.is_finite()) {
            return Err("severity weights must be finite".into());
        }
        for (capacity, weights) in self.capacities.iter() {
            if weights.values().iter().any(|w| !w.is_finite()) {
                return Err(format!("{capacity} weights must be finite"));
            }
        }
        Ok(())
    }

    /// Derives normalised features from a validated reading.
    #[must_use]
    pub fn features(&self, reading: &SignalReading) -> Features {
        let deviation = band_deviation(reading.value, reading.band);
        let persistence = (f64::from(reading.persistence) / self.persistence_saturation).min(1.0);
        let magnitude = reading.integral_error.abs();
        let integral_error = magnitude / (1.0 + magnitude);
        let severity = (self.severity.deviation * deviation
            + self.severity.persistence * persistence
            + self.severity.integral_error * integral_error)
            .clamp(0.0, 1.0);
        Features {
            deviation,
            severity: round4(severity),
            oscillation: reading.oscillation,
            dispersion: reading.dispersion,
            persistence,
            integral_error,
            hub_saturation: reading.hub_saturation,
        }
    }

    /// Scores every capacity, rounded to four decimals.
    #[must_use]
    pub fn score(&self, features: &Features) -> Scores {
        Scores::from_fn(|capacity| round4(self.capacities.get(capacity).apply(features)))
    }
}

/// Capacities by descending score; ties resolved by [`Capacity::PRIORITY`].
#[must_use]
pub fn rank(scores: &Scores) -> Vec<Capacity> {
    let mut order = Capacity::PRIORITY.to_vec();
    order.sort_by(|a, b| {
        scores
            .score(*b)
            .partial_cmp(&scores.score(*a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.priority_rank().cmp(&b.priority_rank()))
    });
    order
}

/// Normalised distance of `value` outside `band`, clamped to [0, 1].
#[must_use]
pub fn band_deviation(value: f64, band: Option<Band>) -> f64 {
    let Some(band) = band else {
        return 0.0;
    };
    let overshoot = if value > band.upper {
        value - band.upper
    } else if value < band.lower {
        band.lower - value
    } else {
        return 0.0;
    };
    let width = band.upper - band.lower;
    let scale = if width > 0.0 {
        width
    } else {
        band.upper.abs().max(1.0)
    };
    (overshoot / scale).clamp(0.0, 1.0)
}

/// Rounds to four decimal places so that equal inputs compare and hash equal.
/// Negative zero is folded into `0.0`.
#[must_use]
pub fn round4(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded.abs() < f64::EPSILON {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviation_is_zero_inside_band() {
        assert_eq!(band_deviation(50.0, Some(Band { lower: 0.0, upper: 100.0 })), 0.0);
        assert_eq!(band_deviation(500.0, None), 0.0);
    }

    #[test]
    fn deviation_scales_by_band_width_and_clamps() {
        let band = Some(Band { lower: 0.0, upper: 100.0 });
        assert!((band_deviation(150.0, band) - 0.5).abs() < 1e-12);
        assert!((band_deviation(-25.0, band) - 0.25).abs() < 1e-12);
        assert_eq!(band_deviation(1_000.0, band), 1.0);
    }

    #[test]
    fn degenerate_band_uses_bound_magnitude() {
        let band = Some(Band { lower: 10.0, upper: 10.0 });
        assert!((band_deviation(15.0, band) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn severity_mixes_deviation_persistence_and_integral() {
        let weights = ScoringWeights::default();
        let reading = SignalReading::new("MES-L03", "beds", 150.0)
            .with_band(0.0, 100.0)
            .with_persistence(3)
            .with_integral_error(1.0);
        let features = weights.features(&reading);
        // 0.6 * 0.5 + 0.25 * 0.5 + 0.15 * 0.5
        assert!((features.severity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rank_breaks_ties_by_priority() {
        let scores = Scores::from_fn(|_| 0.25);
        assert_eq!(rank(&scores), Capacity::PRIORITY.to_vec());

        let mut scores = Scores::from_fn(|_| 0.1);
        *scores.get_mut(Capacity::Structural) = 0.9;
        *scores.get_mut(Capacity::Reflexive) = 0.9;
        let order = rank(&scores);
        assert_eq!(&order[..2], &[Capacity::Reflexive, Capacity::Structural]);
    }

    #[test]
    fn negative_zero_scores_tie_with_zero() {
        assert_eq!(round4(-0.000_01).to_bits(), 0.0f64.to_bits());
        assert_eq!(round4(-0.0).to_bits(), 0.0f64.to_bits());
        assert!((round4(-0.123_46) + 0.1235).abs() < 1e-12);

        let mut scores = Scores::from_fn(|_| 0.0);
        *scores.get_mut(Capacity::Responsive) = -0.0;
        assert_eq!(rank(&scores), Capacity::PRIORITY.to_vec());
    }

    #[test]
    fn validate_rejects_non_positive_saturation() {
        let weights = ScoringWeights {
            persistence_saturation: 0.0,
            ..ScoringWeights::default()
        };
        assert!(weights.validate().is_err());
        assert!(ScoringWeights::default().validate().is_ok());
    }
}
