use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::CapacityError;

/// Whether larger or smaller values are better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Larger is better.
    Maximize,
    /// Smaller is better.
    Minimize,
}

/// One axis of comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    /// Key into [`McdaOption::values`].
    pub key: String,
    /// Preferred direction.
    pub direction: Direction,
    /// Weight used when ranking the frontier.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Criterion {
    /// Criterion with unit weight.
    #[must_use]
    pub fn new(key: impl Into<String>, direction: Direction) -> Self {
        Self {
            key: key.into(),
            direction,
            weight: default_weight(),
        }
    }

    /// Sets the ranking weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    fn oriented(&self, value: f64) -> f64 {
        match self.direction {
            Direction::Maximize => value,
            Direction::Minimize => -value,
        }
    }
}

/// Candidate option in a trade-off session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McdaOption {
    /// Identifier.
    pub id: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Criterion values by key.
    pub values: IndexMap<String, f64>,
}

impl McdaOption {
    fn value(&self, criterion: &Criterion) -> Result<f64, CapacityError> {
        let invalid = |reason: String| CapacityError::InvalidOption {
            option: self.id.clone(),
            reason,
        };
        let value = *self
            .values
            .get(&criterion.key)
            .ok_or_else(|| invalid(format!("missing value for `{}`", criterion.key)))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid(format!("non-finite value for `{}`", criterion.key)))
        }
    }
}

/// Frontier option with its weighted score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedOption {
    /// The option.
    pub option: McdaOption,
    /// Weighted normalised score in [0, total weight].
    pub score: f64,
}

fn matrix(options: &[McdaOption], criteria: &[Criterion]) -> Result<Vec<Vec<f64>>, CapacityError> {
    options
        .iter()
        .map(|option| criteria.iter().map(|c| option.value(c)).collect())
        .collect()
}

fn dominates(a: &[f64], b: &[f64], criteria: &[Criterion]) -> bool {
    let mut strictly = false;
    for ((x, y), criterion) in a.iter().zip(b).zip(criteria) {
        match criterion
            .oriented(*x)
            .partial_cmp(&criterion.oriented(*y))
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Less => return false,
            Ordering::Greater => strictly = true,
            Ordering::Equal => {}
        }
    }
    strictly
}

/// Non-dominated options, in input order.
pub fn pareto_frontier(
    options: &[McdaOption],
    criteria: &[Criterion],
) -> Result<Vec<McdaOption>, CapacityError> {
    let rows = matrix(options, criteria)?;
    Ok(options
        .iter()
        .zip(&rows)
        .filter(|(_, row)| !rows.iter().any(|other| dominates(other, row, criteria)))
        .map(|(option, _)| option.clone())
        .collect())
}

/// Pareto frontier ordered by weighted min-max score, best first; ties by id.
pub fn rank_frontier(
    options: &[McdaOption],
    criteria: &[Criterion],
) -> Result<Vec<RankedOption>, CapacityError> {
    let frontier = pareto_frontier(options, criteria)?;
    let rows = matrix(&frontier, criteria)?;
    let bounds: Vec<(f64, f64)> = (0..criteria.len())
        .map(|column| {
            rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                (lo.min(row[column]), hi.max(row[column]))
            })
        })
        .collect();
    let mut ranked: Vec<RankedOption> = frontier
        .into_iter()
        .zip(&rows)
        .map(|(option, row)| {
            let score = row
                .iter()
                .zip(criteria)
                .zip(&bounds)
                .map(|((value, criterion), (lo, hi))| {
                    let span = hi - lo;
                    let normalised = if span > 0.0 {
                        match criterion.direction {
                            Direction::Maximize => (value - lo) / span,
                            Direction::Minimize => (hi - value) / span,
                        }
                    } else {
                        1.0
                    };
                    criterion.weight * normalised
                })
                .sum();
            RankedOption { option, score }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.option.id.cmp(&b.option.id))
    });
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str, cost: f64, benefit: f64) -> McdaOption {
        McdaOption {
            id: id.into(),
            label: id.to_uppercase(),
            values: [("cost".to_string(), cost), ("benefit".to_string(), benefit)]
                .into_iter()
                .collect(),
        }
    }

    fn criteria() -> Vec<Criterion> {
        vec![
            Criterion::new("cost", Direction::Minimize),
            Criterion::new("benefit", Direction::Maximize).with_weight(2.0),
        ]
    }

    #[test]
    fn dominated_options_drop_out_in_input_order() {
        let options = vec![
            option("a", 10.0, 5.0),
            option("b", 12.0, 4.0),
            option("c", 5.0, 2.0),
            option("d", 20.0, 9.0),
        ];
        let ids: Vec<_> = pareto_frontier(&options, &criteria())
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn identical_options_both_survive() {
        let options = vec![option("x", 1.0, 1.0), option("y", 1.0, 1.0)];
        assert_eq!(pareto_frontier(&options, &criteria()).unwrap().len(), 2);
    }

    #[test]
    fn signed_zero_values_do_not_dominate() {
        let options = vec![option("plus", 0.0, 1.0), option("minus", -0.0, 1.0)];
        let frontier = pareto_frontier(&options, &criteria()).unwrap();
        assert_eq!(frontier.len(), 2);
        let ranked = rank_frontier(&options, &criteria()).unwrap();
        assert_eq!(ranked[0].option.id, "minus");
    }

    #[test]
    fn ranking_uses_weights_and_breaks_ties_by_id() {
        let options = vec![
            option("a", 10.0, 5.0),
            option("c", 5.0, 2.0),
            option("d", 20.0, 9.0),
        ];
        let ranked = rank_frontier(&options, &criteria()).unwrap();
        let ids: Vec<_> = ranked.iter().map(|r| r.option.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "c"]);
        assert!((ranked[0].score - 2.0).abs() < 1e-9);

        let ties = vec![option("z", 1.0, 1.0), option("m", 1.0, 1.0)];
        let ranked = rank_frontier(&ties, &criteria()).unwrap();
        assert_eq!(ranked[0].option.id, "m");
        assert!((ranked[0].score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_or_non_finite_values_are_rejected() {
        let mut broken = option("bad", 1.0, 1.0);
        broken.values.shift_remove("benefit");
        assert!(matches!(
            pareto_frontier(&[broken], &criteria()),
            Err(CapacityError::InvalidOption { option: id, .. }) if id == "bad"
        ));
        let nan = option("nan", f64::NAN, 1.0);
        assert!(pareto_frontier(&[nan], &criteria()).is_err());
    }
}
