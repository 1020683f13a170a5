use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
    decision::{policy::DecisionPolicy, scoring::ScoringWeights, DecisionEngine},
    playbook::PlaybookRegistry,
    router::{CapacityRouter, ScreenOverrideSpec, ScreenTable},
    tasks::{TaskComposer, DEFAULT_MAX_HORIZON_DAYS},
};

/// Runtime configuration, usually read from `capacity.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Feature and per-capacity weights.
    pub scoring: ScoringWeights,
    /// Guardrail, SRT, and consent thresholds.
    pub policy: DecisionPolicy,
    /// Task composition settings.
    pub composer: ComposerConfig,
    /// Routing settings.
    pub router: RouterConfig,
    /// Telemetry sinks.
    pub telemetry: TelemetryConfig,
    /// Extra playbook catalog loaded after the built-ins.
    pub playbooks: Option<PathBuf>,
}

/// `[composer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Due-date ceiling in days.
    pub max_horizon_days: u32,
    /// Day count used when a horizon is malformed; unset means fail.
    pub fallback_horizon_days: Option<u32>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_horizon_days: DEFAULT_MAX_HORIZON_DAYS,
            fallback_horizon_days: None,
        }
    }
}

/// `[router]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Cooldown applied when the caller passes none; unset uses the
    /// decision's own `coolDownMs`.
    pub default_cooldown_ms: Option<u64>,
    /// Whether the built-in screen overrides are kept.
    #[serde(default = "default_true")]
    pub builtin_screens: bool,
    /// Overrides appended after the built-ins.
    pub screens: Vec<ScreenOverrideSpec>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_cooldown_ms: None,
            builtin_screens: true,
            screens: Vec::new(),
        }
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSON-lines audit log.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log.
    pub events_path: Option<PathBuf>,
}

const fn default_true() -> bool {
    true
}

impl CapacityConfig {
    /// Loads and validates a TOML file; relative paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading capacity config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        for slot in [
            &mut config.playbooks,
            &mut config.telemetry.log_path,
            &mut config.telemetry.events_path,
        ] {
            if let Some(candidate) = slot.as_mut() {
                if candidate.is_relative() {
                    *candidate = source_dir.join(&*candidate);
                }
            }
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("parsing capacity config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if let Err(reason) = self.scoring.validate() {
            bail!("invalid [scoring]: {reason}");
        }
        if let Err(reason) = self.policy.validate() {
            bail!("invalid [policy]: {reason}");
        }
        if self.composer.max_horizon_days == 0 {
            bail!("invalid [composer]: max_horizon_days must be positive");
        }
        Ok(())
    }

    /// Engine with the configured weights and policy.
    #[must_use]
    pub fn build_engine(&self) -> DecisionEngine {
        DecisionEngine::new(self.scoring.clone(), self.policy.clone())
    }

    /// Composer with the configured ceiling.
    #[must_use]
    pub const fn build_composer(&self) -> TaskComposer {
        TaskComposer::new(self.composer.max_horizon_days)
    }

    /// Router with the configured screen table.
    pub fn build_router(&self) -> Result<CapacityRouter> {
        let mut screens = if self.router.builtin_screens {
            ScreenTable::builtin()
        } else {
            ScreenTable::empty()
        };
        screens.extend(&self.router.screens)?;
        Ok(CapacityRouter::new(screens))
    }

    /// Built-in playbooks followed by the configured catalog, if any.
    pub fn build_playbooks(&self) -> Result<PlaybookRegistry> {
        let mut registry = PlaybookRegistry::builtin();
        if let Some(path) = &self.playbooks {
            let extra = PlaybookRegistry::load(path)?;
            registry.extend(extra.iter().cloned().collect())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::health_surge_reading;
    use crate::model::Capacity;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_defaults() {
        let config = CapacityConfig::from_toml_str("").unwrap();
        assert_eq!(config.build_engine(), DecisionEngine::default());
        assert_eq!(config.build_composer(), TaskComposer::default());
        assert!(config.router.builtin_screens);
        assert!(config.composer.fallback_horizon_days.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = CapacityConfig::from_toml_str(
            r#"
            [scoring.capacities.structural]
            hub_saturation = 0.9

            [policy]
            cooldown_ms = 1000
            timebox_days = { responsive = 7, reflexive = 30, deliberative = 21, anticipatory = 28, structural = 90 }

            [composer]
            max_horizon_days = 10
            fallback_horizon_days = 5

            [router]
            default_cooldown_ms = 500

            [[router.screens]]
            pattern = 'MES-L\d+'
            capacity = "responsive"
            screen = "surge-board"
            "#,
        )
        .unwrap();
        assert!((config.scoring.capacities.structural.hub_saturation - 0.9).abs() < 1e-9);
        assert_eq!(config.policy.cooldown_ms, 1000);
        assert_eq!(config.policy.timebox_days.responsive, 7);
        assert_eq!(config.build_composer().max_horizon_days(), 10);
        let router = config.build_router().unwrap();
        assert_eq!(router.screens().resolve("MES-L03", Capacity::Responsive), "surge-board");
        assert_eq!(
            router.screens().resolve("META-L08", Capacity::Anticipatory),
            "trigger-library"
        );
    }

    #[test]
    fn scoring_section_changes_the_primary() {
        let reading = health_surge_reading();
        let baseline = CapacityConfig::default().build_engine().decide(&reading).unwrap();
        assert_eq!(baseline.primary, Capacity::Responsive);

        let config = CapacityConfig::from_toml_str(
            r#"
            [scoring.capacities.structural]
            bias = 1.0
            "#,
        )
        .unwrap();
        let decision = config.build_engine().decide(&reading).unwrap();
        assert_eq!(decision.primary, Capacity::Structural);
        assert_eq!(decision.secondary, Capacity::Responsive);
        assert_ne!(decision.decision_id, baseline.decision_id);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(CapacityConfig::from_toml_str("[policy]\nconsent_threshold = 1.5").is_err());
        assert!(CapacityConfig::from_toml_str("[composer]\nmax_horizon_days = 0").is_err());
        assert!(CapacityConfig::from_toml_str("[scoring]\npersistence_saturation = 0.0").is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("extra.toml"),
            r#"
            [[playbooks]]
            id = "pb-flood-watch"
            name = "Flood watch"
            loops = ["MES-L09"]

            [[playbooks.actions]]
            key = "levee-check"
            label = "Inspect levees"
            "#,
        )
        .unwrap();
        let path = dir.path().join("capacity.toml");
        fs::write(&path, "playbooks = \"extra.toml\"\n[telemetry]\nlog_path = \"audit.log\"\n").unwrap();
        let config = CapacityConfig::load(&path).unwrap();
        assert_eq!(config.telemetry.log_path, Some(dir.path().join("audit.log")));
        let registry = config.build_playbooks().unwrap();
        assert!(registry.get("pb-flood-watch").is_some());
        assert!(registry.get("pb-health-surge").is_some());
    }
}
