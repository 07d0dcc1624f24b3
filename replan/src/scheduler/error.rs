/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the reconfiguration planner.
//!
//! Three failure layers, three groups of variants:
//!
//! | Layer | Variants | Raised |
//! |---|---|---|
//! | Model construction | `MissingDurationEvaluator`, `NegativeDuration`, `MissingTemplate`, `NoVmTransition`, `NoNodeTransition`, `UnknownVm`, `UnknownNode`, `VmNotPlaced` | before any solving |
//! | Solving | `Infeasible`, `NoSolutionWithinBudget` | by the solve step |
//! | Materialization | `Materialization` | after a successful solve |
//!
//! Each transition reports its own decoding problem as a
//! [`MaterializeError`]; the problem aggregates them into
//! [`SchedulerError::Materialization`].
//!
//! `Infeasible` must not be retried; `NoSolutionWithinBudget` may succeed
//! with a larger time limit.

use std::fmt;

use thiserror::Error;

use crate::duration::ActionKind;
use crate::model::{Element, NodeState, VmState};
use crate::plan::ReconfigurationPlan;

// ── Materialization ───────────────────────────────────────────────────────────

/// Why a single transition could not be decoded into actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    /// The identifier pool has no room for the clone of a re-instantiated VM.
    #[error("no spare identifier to clone {0}")]
    NoCloneIdentifier(String),

    /// A solved hoster value does not designate a node.
    #[error("solved hoster {0} is not a node index")]
    UnknownHoster(i64),
}

/// One transition that could not be turned into actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializationFailure {
    pub element: Element,
    pub reason: String,
}

impl fmt::Display for MaterializationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.element, self.reason)
    }
}

fn join(failures: &[MaterializationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Top-level planner errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No duration estimator is registered for an action a transition needs.
    #[error("no duration evaluator registered for {action} (needed by {element})")]
    MissingDurationEvaluator { action: ActionKind, element: String },

    /// An estimator produced a negative duration.
    #[error("duration of {action} for {element} is negative ({value})")]
    NegativeDuration {
        action: ActionKind,
        element: String,
        value: i64,
    },

    /// A VM has to be forged but carries no `template` attribute.
    #[error("{vm} must be forged but has no 'template' attribute")]
    MissingTemplate { vm: String },

    /// The factory has no builder for the requested VM state change.
    #[error("no transition available for {vm}: {from} -> {to}")]
    NoVmTransition {
        vm: String,
        from: VmState,
        to: VmState,
    },

    /// The factory has no builder for a node in this state.
    #[error("no transition available for {node} in state {state}")]
    NoNodeTransition { node: String, state: NodeState },

    #[error("{0} is not part of the problem")]
    UnknownVm(String),

    #[error("{0} is not part of the problem")]
    UnknownNode(String),

    /// The transition needs the current host of a VM that is not placed.
    #[error("{0} has no current host")]
    VmNotPlaced(String),

    /// The search space was exhausted without a solution.
    #[error("no plan satisfies the constraints")]
    Infeasible,

    /// The time budget ran out before any solution was found.
    #[error("no solution found within {limit_secs:.3}s")]
    NoSolutionWithinBudget { limit_secs: f64 },

    /// Some transitions could not be materialized.  `partial` holds every
    /// action of the transitions that succeeded.
    #[error("{} transition(s) could not be materialized: {}", .failures.len(), join(.failures))]
    Materialization {
        failures: Vec<MaterializationFailure>,
        partial: ReconfigurationPlan,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vm;

    #[test]
    fn materialization_message_lists_every_failure() {
        let err = SchedulerError::Materialization {
            failures: vec![
                MaterializationFailure {
                    element: Vm(1).into(),
                    reason: "no spare identifier to clone".into(),
                },
                MaterializationFailure {
                    element: Vm(2).into(),
                    reason: "unknown destination".into(),
                },
            ],
            partial: ReconfigurationPlan::new(),
        };
        assert_eq!(
            err.to_string(),
            "2 transition(s) could not be materialized: \
             vm#1: no spare identifier to clone; vm#2: unknown destination"
        );
    }

    #[test]
    fn transition_errors_name_both_states() {
        let err = SchedulerError::NoVmTransition {
            vm: "vm#3".into(),
            from: VmState::Sleeping,
            to: VmState::Init,
        };
        assert_eq!(err.to_string(), "no transition available for vm#3: sleeping -> init");
    }
}
