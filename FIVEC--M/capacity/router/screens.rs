use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::Capacity;

/// Screen shown when no override matches.
#[must_use]
pub const fn default_screen(capacity: Capacity) -> &'static str {
    match capacity {
        Capacity::Responsive => "checkpoint",
        Capacity::Reflexive => "controller-tuner",
        Capacity::Deliberative => "tradeoff-workbench",
        Capacity::Anticipatory => "risk-watchboard",
        Capacity::Structural => "mandate-gate",
    }
}

/// Serialisable form of a screen override, as written in config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenOverrideSpec {
    /// Loop-code regex; matched against the whole code.
    pub pattern: String,
    /// Capacity the override applies to.
    pub capacity: Capacity,
    /// Screen to open.
    pub screen: String,
}

/// Special-case screen for loops matching `pattern` under `capacity`.
#[derive(Debug, Clone)]
pub struct ScreenOverride {
    source: String,
    pattern: Regex,
    capacity: Capacity,
    screen: String,
}

impl ScreenOverride {
    /// Compiles `pattern` anchored at both ends.
    pub fn new(
        pattern: &str,
        capacity: Capacity,
        screen: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            source: pattern.to_string(),
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
            capacity,
            screen: screen.into(),
        })
    }

    /// Pattern as written.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Capacity the override applies to.
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Target screen.
    #[must_use]
    pub fn screen(&self) -> &str {
        &self.screen
    }

    /// Returns true when both the loop code and the capacity match.
    #[must_use]
    pub fn matches(&self, loop_code: &str, capacity: Capacity) -> bool {
        self.capacity == capacity && self.pattern.is_match(loop_code)
    }
}

impl TryFrom<&ScreenOverrideSpec> for ScreenOverride {
    type Error = regex::Error;

    fn try_from(spec: &ScreenOverrideSpec) -> Result<Self, Self::Error> {
        Self::new(&spec.pattern, spec.capacity, spec.screen.clone())
    }
}

/// Ordered override table; the first match wins.
#[derive(Debug, Clone)]
pub struct ScreenTable {
    overrides: Vec<ScreenOverride>,
}

impl Default for ScreenTable {
    fn default() -> Self {
        Self::builtin()
    }
}

const BUILTIN_SCREENS: [(&str, Capacity, &str); 2] = [
    ("META-L08", Capacity::Anticipatory, "trigger-library"),
    (r"META-L\d+", Capacity::Anticipatory, "meta-risk-watchboard"),
];

impl ScreenTable {
    /// Built-in special cases.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            overrides: BUILTIN_SCREENS
                .into_iter()
                .filter_map(|(pattern, capacity, screen)| {
                    ScreenOverride::new(pattern, capacity, screen).ok()
                })
                .collect(),
        }
    }

    /// Table with no special cases.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            overrides: Vec::new(),
        }
    }

    /// Appends overrides after the existing ones.
    pub fn extend(&mut self, specs: &[ScreenOverrideSpec]) -> Result<()> {
        for spec in specs {
            let entry = ScreenOverride::try_from(spec)
                .with_context(|| format!("invalid screen pattern `{}`", spec.pattern))?;
            self.overrides.push(entry);
        }
        Ok(())
    }

    /// Overrides in evaluation order.
    #[must_use]
    pub fn overrides(&self) -> &[ScreenOverride] {
        &self.overrides
    }

    /// Screen for `(loop_code, capacity)`.
    #[must_use]
    pub fn resolve(&self, loop_code: &str, capacity: Capacity) -> &str {
        self.overrides
            .iter()
            .find(|entry| entry.matches(loop_code, capacity))
            .map_or_else(|| default_screen(capacity), ScreenOverride::screen)
    }
}
