/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Planner parameters and scenario loading.
//!
//! Parameters come from a YAML file:
//! ```yaml
//! time_limit_secs: 10      # 0 = unbounded
//! optimize: true           # minimise the reconfiguration end
//! max_horizon: 3600        # upper bound of every moment variable
//! durations:
//!   boot_vm: 5
//!   migrate_vm: { attribute: migrate, default: 3 }
//! ```
//!
//! Every key is optional.  Action kinds missing from `durations` keep the
//! default estimator (see [`DurationEvaluators::new_bundle`]).
//!
//! The infrastructure itself is described by a [`Scenario`] file.

pub mod scenario;

pub use scenario::Scenario;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::duration::{ActionKind, DurationEvaluator, DurationEvaluators};

/// Default upper bound of every moment variable.
pub const DEFAULT_MAX_HORIZON: i64 = 3600;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlannerConfigFile {
    #[serde(default)]
    time_limit_secs: f64,
    #[serde(default = "default_optimize")]
    optimize: bool,
    #[serde(default = "default_max_horizon")]
    max_horizon: i64,
    #[serde(default)]
    durations: BTreeMap<ActionKind, DurationEvaluator>,
}

fn default_optimize() -> bool {
    true
}

fn default_max_horizon() -> i64 {
    DEFAULT_MAX_HORIZON
}

// ── PlannerConfig ─────────────────────────────────────────────────────────────

/// Tunables of one planning run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Search budget in seconds.  `0` = unbounded.
    pub time_limit_secs: f64,

    /// Minimise the reconfiguration end instead of stopping at the first plan.
    pub optimize: bool,

    pub max_horizon: i64,

    /// Estimators overriding the default bundle.
    pub durations: BTreeMap<ActionKind, DurationEvaluator>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 0.0,
            optimize: true,
            max_horizon: DEFAULT_MAX_HORIZON,
            durations: BTreeMap::new(),
        }
    }
}

impl PlannerConfig {
    /// Parse `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// holds out-of-range values (negative time limit, non-positive horizon).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading planner parameters from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open parameter file: {}", path.display()))?;
        let cfg = Self::from_yaml(&content)
            .with_context(|| format!("Invalid parameter file: {}", path.display()))?;

        info!(
            time_limit_secs = cfg.time_limit_secs,
            optimize = cfg.optimize,
            max_horizon = cfg.max_horizon,
            overrides = cfg.durations.len(),
            "Planner parameters loaded"
        );
        Ok(cfg)
    }

    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: PlannerConfigFile =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;
        let cfg = Self {
            time_limit_secs: file.time_limit_secs,
            optimize: file.optimize,
            max_horizon: file.max_horizon,
            durations: file.durations,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the planner cannot use.
    pub fn validate(&self) -> Result<()> {
        if !self.time_limit_secs.is_finite() || self.time_limit_secs < 0.0 {
            bail!("time_limit_secs must be >= 0, got {}", self.time_limit_secs);
        }
        if self.max_horizon <= 0 {
            bail!("max_horizon must be > 0, got {}", self.max_horizon);
        }
        for (kind, ev) in &self.durations {
            let d = match ev {
                DurationEvaluator::Constant(d) => *d,
                DurationEvaluator::FromAttribute { default, .. } => *default,
            };
            if d < 0 {
                bail!("duration of {kind} must be >= 0, got {d}");
            }
        }
        Ok(())
    }

    /// Search budget, `None` when unbounded.
    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_secs > 0.0).then(|| Duration::from_secs_f64(self.time_limit_secs))
    }

    /// The default bundle with every override of `durations` applied.
    pub fn duration_evaluators(&self) -> DurationEvaluators {
        let mut dev = DurationEvaluators::new_bundle();
        for (kind, ev) in &self.durations {
            debug!(action = %kind, evaluator = ?ev, "duration override");
            dev.register(*kind, ev.clone());
        }
        dev
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{AttrValue, Infrastructure, Vm};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    pub(crate) fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_parameter_file() {
        let yaml = r#"
time_limit_secs: 2.5
optimize: false
max_horizon: 500
durations:
  boot_vm: 5
  migrate_vm: { attribute: migrate, default: 3 }
"#;
        let f = yaml_tempfile(yaml);
        let cfg = PlannerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.time_limit(), Some(Duration::from_millis(2500)));
        assert!(!cfg.optimize);
        assert_eq!(cfg.max_horizon, 500);
        assert_eq!(cfg.durations.len(), 2);

        let mut infra = Infrastructure::new();
        infra.attributes.put(Vm(1), "migrate", AttrValue::Int(20));
        let dev = cfg.duration_evaluators();
        assert_eq!(
            dev.evaluate(&infra, ActionKind::BootVm, Vm(1).into()).unwrap(),
            5
        );
        assert_eq!(
            dev.evaluate(&infra, ActionKind::MigrateVm, Vm(1).into()).unwrap(),
            20
        );
        assert_eq!(
            dev.evaluate(&infra, ActionKind::MigrateVm, Vm(2).into()).unwrap(),
            3
        );
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = PlannerConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg, PlannerConfig::default());
        assert_eq!(cfg.time_limit(), None);
        // untouched kinds keep the bundle
        assert!(cfg.duration_evaluators().is_registered(ActionKind::KillVm));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(PlannerConfig::from_yaml("time_limit_secs: -1").is_err());
        assert!(PlannerConfig::from_yaml("max_horizon: 0").is_err());
        assert!(PlannerConfig::from_yaml("durations:\n  boot_vm: -2\n").is_err());
    }

    #[test]
    fn unknown_keys_and_actions_are_rejected() {
        assert!(PlannerConfig::from_yaml("horizon: 10").is_err());
        assert!(PlannerConfig::from_yaml("durations:\n  teleport_vm: 1\n").is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = PlannerConfig::load_from_file(Path::new("/nonexistent/params.yaml"));
        assert!(result.is_err());
    }
}
