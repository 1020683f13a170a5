//! Static catalog of pre-authored response playbooks.

/// Built-in playbook catalog.
pub mod catalog;

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Capacity, DecisionResult, SprintLevel};

/// Loop pattern matching every loop.
pub const ANY_LOOP: &str = "*";

/// One step of a playbook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybookAction {
    /// Stable key, part of the task id.
    pub key: String,
    /// Human readable label.
    pub label: String,
    /// Free-form parameters carried into task metadata.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, Value>,
    /// Leverage override; defaults to the primary capacity's tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<SprintLevel>,
}

/// When a playbook applies to a decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybookConditions {
    /// Minimum decision severity (inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_min: Option<f64>,
    /// Maximum decision severity (inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_max: Option<f64>,
    /// Required primary capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<Capacity>,
}

impl PlaybookConditions {
    /// Returns true when the decision satisfies every condition.
    #[must_use]
    pub fn admits(&self, decision: &DecisionResult) -> bool {
        self.severity_min.map_or(true, |min| decision.severity >= min)
            && self.severity_max.map_or(true, |max| decision.severity <= max)
            && self.primary.map_or(true, |primary| decision.primary == primary)
    }
}

/// Named, pre-authored response for a set of loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playbook {
    /// Unique identifier, e.g. `pb-health-surge`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Loop codes the playbook applies to; `*` matches all.
    pub loops: Vec<String>,
    /// Trigger conditions.
    #[serde(default)]
    pub conditions: PlaybookConditions,
    /// Ordered actions.
    pub actions: Vec<PlaybookAction>,
    /// Guardrail tags merged into every task.
    #[serde(default)]
    pub guardrails: Vec<String>,
}

impl Playbook {
    /// Returns true when the playbook is keyed to `loop_code`.
    #[must_use]
    pub fn covers_loop(&self, loop_code: &str) -> bool {
        self.loops
            .iter()
            .any(|candidate| candidate == ANY_LOOP || candidate == loop_code)
    }
}

#[derive(Debug, Deserialize)]
struct PlaybookFile {
    #[serde(default)]
    playbooks: Vec<Playbook>,
}

/// Read-only lookup over playbooks, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybookRegistry {
    playbooks: IndexMap<String, Playbook>,
}

impl PlaybookRegistry {
    /// The default catalog shipped with the crate.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            playbooks: catalog::builtin_playbooks()
                .into_iter()
                .map(|playbook| (playbook.id.clone(), playbook))
                .collect(),
        }
    }

    /// Builds a registry, rejecting duplicate ids and empty action lists.
    pub fn from_playbooks(playbooks: Vec<Playbook>) -> Result<Self> {
        let mut registry = Self::default();
        registry.extend(playbooks)?;
        Ok(registry)
    }

    /// Parses `[[playbooks]]` tables from TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: PlaybookFile = toml::from_str(raw).context("parsing playbook catalog")?;
        Self::from_playbooks(file.playbooks)
    }

    /// Loads a TOML catalog from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading playbook catalog {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    /// Adds playbooks after the existing ones.
    pub fn extend(&mut self, playbooks: Vec<Playbook>) -> Result<()> {
        for playbook in playbooks {
            if playbook.actions.is_empty() {
                bail!("playbook {} has no actions", playbook.id);
            }
            if self.playbooks.contains_key(&playbook.id) {
                bail!("duplicate playbook id {}", playbook.id);
            }
            self.playbooks.insert(playbook.id.clone(), playbook);
        }
        Ok(())
    }

    /// Looks up a playbook by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Playbook> {
        self.playbooks.get(id)
    }

    /// Number of playbooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.playbooks.len()
    }

    /// Returns true when the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.playbooks.is_empty()
    }

    /// All playbooks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Playbook> {
        self.playbooks.values()
    }

    /// Playbooks keyed to `loop_code`, ignoring conditions.
    #[must_use]
    pub fn find_for_loop(&self, loop_code: &str) -> Vec<&Playbook> {
        self.iter()
            .filter(|playbook| playbook.covers_loop(loop_code))
            .collect()
    }

    /// Playbooks keyed to the decision's loop whose conditions admit it.
    #[must_use]
    pub fn find_for_decision(&self, decision: &DecisionResult) -> Vec<&Playbook> {
        self.iter()
            .filter(|playbook| {
                playbook.covers_loop(&decision.loop_code) && playbook.conditions.admits(decision)
            })
            .collect()
    }
}
