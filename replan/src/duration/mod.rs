/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Action duration estimates.
//!
//! Every transition asks the [`DurationEvaluators`] registry how long its
//! action takes for a given element.  An estimate is either a constant or
//! read from an element attribute with a constant fallback:
//!
//! ```yaml
//! durations:
//!   boot_vm: 5
//!   migrate_vm: { attribute: migrate, default: 3 }
//! ```
//!
//! A missing estimator is a configuration error surfaced at model
//! construction time, never a silent default.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Element, Infrastructure};
use crate::scheduler::SchedulerError;

// ── Action kinds ──────────────────────────────────────────────────────────────

/// Kind of action a duration is estimated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MigrateVm,
    BootVm,
    ShutdownVm,
    SuspendVm,
    ResumeVm,
    ForgeVm,
    KillVm,
    BootNode,
    ShutdownNode,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::MigrateVm,
        ActionKind::BootVm,
        ActionKind::ShutdownVm,
        ActionKind::SuspendVm,
        ActionKind::ResumeVm,
        ActionKind::ForgeVm,
        ActionKind::KillVm,
        ActionKind::BootNode,
        ActionKind::ShutdownNode,
    ];

    /// Attribute consulted by the default bundle for this action.
    pub fn default_attribute(self) -> &'static str {
        match self {
            ActionKind::MigrateVm => "migrate",
            ActionKind::BootVm | ActionKind::BootNode => "boot",
            ActionKind::ShutdownVm | ActionKind::ShutdownNode => "shutdown",
            ActionKind::SuspendVm => "suspend",
            ActionKind::ResumeVm => "resume",
            ActionKind::ForgeVm => "forge",
            ActionKind::KillVm => "kill",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::MigrateVm => "MigrateVM",
            ActionKind::BootVm => "BootVM",
            ActionKind::ShutdownVm => "ShutdownVM",
            ActionKind::SuspendVm => "SuspendVM",
            ActionKind::ResumeVm => "ResumeVM",
            ActionKind::ForgeVm => "ForgeVM",
            ActionKind::KillVm => "KillVM",
            ActionKind::BootNode => "BootNode",
            ActionKind::ShutdownNode => "ShutdownNode",
        };
        f.write_str(s)
    }
}

// ── Evaluators ────────────────────────────────────────────────────────────────

/// A single duration estimator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationEvaluator {
    /// Same duration for every element.
    Constant(i64),

    /// Integer attribute `attribute` of the element, or `default` when unset.
    FromAttribute { attribute: String, default: i64 },
}

impl DurationEvaluator {
    pub fn from_attribute(attribute: impl Into<String>, default: i64) -> Self {
        DurationEvaluator::FromAttribute {
            attribute: attribute.into(),
            default,
        }
    }

    pub fn evaluate(&self, infra: &Infrastructure, e: Element) -> i64 {
        match self {
            DurationEvaluator::Constant(d) => *d,
            DurationEvaluator::FromAttribute { attribute, default } => infra
                .attributes
                .get_int(e, attribute)
                .unwrap_or(*default),
        }
    }
}

/// Registry of one [`DurationEvaluator`] per [`ActionKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationEvaluators {
    evaluators: BTreeMap<ActionKind, DurationEvaluator>,
}

impl DurationEvaluators {
    /// An empty registry.  Any evaluation fails until estimators are
    /// registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default bundle: every action estimated from its optional element
    /// attribute (see [`ActionKind::default_attribute`]), falling back to 1.
    pub fn new_bundle() -> Self {
        let mut dev = Self::new();
        for kind in ActionKind::ALL {
            dev.register(
                kind,
                DurationEvaluator::from_attribute(kind.default_attribute(), 1),
            );
        }
        dev
    }

    /// Register `ev` for `kind`.
    ///
    /// Returns `false` if a previous evaluator for that action was replaced.
    pub fn register(&mut self, kind: ActionKind, ev: DurationEvaluator) -> bool {
        self.evaluators.insert(kind, ev).is_none()
    }

    /// Remove the evaluator for `kind`.  Returns `true` if one was registered.
    pub fn unregister(&mut self, kind: ActionKind) -> bool {
        self.evaluators.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.evaluators.contains_key(&kind)
    }

    pub fn get(&self, kind: ActionKind) -> Option<&DurationEvaluator> {
        self.evaluators.get(&kind)
    }

    /// Estimate the duration of `kind` applied to `e`.
    ///
    /// # Errors
    /// * [`SchedulerError::MissingDurationEvaluator`] – nothing registered.
    /// * [`SchedulerError::NegativeDuration`] – the estimator returned < 0.
    pub fn evaluate(
        &self,
        infra: &Infrastructure,
        kind: ActionKind,
        e: Element,
    ) -> Result<i64, SchedulerError> {
        let ev = self
            .evaluators
            .get(&kind)
            .ok_or_else(|| SchedulerError::MissingDurationEvaluator {
                action: kind,
                element: e.to_string(),
            })?;

        let d = ev.evaluate(infra, e);
        if d < 0 {
            return Err(SchedulerError::NegativeDuration {
                action: kind,
                element: e.to_string(),
                value: d,
            });
        }
        debug!(action = %kind, element = %e, duration = d, "duration estimated");
        Ok(d)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrValue, Node, Vm};

    #[test]
    fn bundle_covers_every_action_with_fallback_one() {
        let dev = DurationEvaluators::new_bundle();
        let infra = Infrastructure::new();
        for kind in ActionKind::ALL {
            assert!(dev.is_registered(kind));
            assert_eq!(dev.evaluate(&infra, kind, Vm(0).into()).unwrap(), 1);
        }
    }

    #[test]
    fn bundle_reads_the_element_attribute() {
        let dev = DurationEvaluators::new_bundle();
        let mut infra = Infrastructure::new();
        infra.attributes.put(Vm(1), "migrate", AttrValue::Int(20));
        infra.attributes.put(Node(0), "boot", AttrValue::Int(8));

        assert_eq!(
            dev.evaluate(&infra, ActionKind::MigrateVm, Vm(1).into()).unwrap(),
            20
        );
        assert_eq!(
            dev.evaluate(&infra, ActionKind::BootNode, Node(0).into()).unwrap(),
            8
        );
        // BootVm shares the `boot` key but is looked up on the VM
        assert_eq!(
            dev.evaluate(&infra, ActionKind::BootVm, Vm(1).into()).unwrap(),
            1
        );
    }

    #[test]
    fn missing_evaluator_is_an_error() {
        let dev = DurationEvaluators::new();
        let err = dev
            .evaluate(&Infrastructure::new(), ActionKind::BootVm, Vm(0).into())
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::MissingDurationEvaluator {
                action: ActionKind::BootVm,
                ..
            }
        ));
    }

    #[test]
    fn negative_estimate_is_rejected() {
        let mut dev = DurationEvaluators::new();
        dev.register(ActionKind::KillVm, DurationEvaluator::Constant(-3));
        let err = dev
            .evaluate(&Infrastructure::new(), ActionKind::KillVm, Vm(0).into())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NegativeDuration { value: -3, .. }));
    }

    #[test]
    fn register_reports_replacement_and_unregister_removes() {
        let mut dev = DurationEvaluators::new();
        assert!(dev.register(ActionKind::BootVm, DurationEvaluator::Constant(5)));
        assert!(!dev.register(ActionKind::BootVm, DurationEvaluator::Constant(6)));
        assert_eq!(dev.get(ActionKind::BootVm), Some(&DurationEvaluator::Constant(6)));
        assert!(dev.unregister(ActionKind::BootVm));
        assert!(!dev.unregister(ActionKind::BootVm));
        assert!(!dev.is_registered(ActionKind::BootVm));
    }

    #[test]
    fn evaluators_deserialize_from_yaml() {
        let yaml = "boot_vm: 5\nmigrate_vm: { attribute: migrate, default: 3 }\n";
        let map: BTreeMap<ActionKind, DurationEvaluator> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map[&ActionKind::BootVm], DurationEvaluator::Constant(5));
        assert_eq!(
            map[&ActionKind::MigrateVm],
            DurationEvaluator::from_attribute("migrate", 3)
        );
    }
}
