/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Narrow capability handed to every transition constructor.
//!
//! A transition never sees the whole problem.  It gets a
//! [`TransitionContext`]: a variable factory and constraint sink (the
//! [`Csp`]), the duration registry, the node index, the horizon bounds and
//! the per-node running-VM counters.  Everything except the `Csp` is
//! read-only and already final when the first transition is built.

use std::collections::{BTreeMap, BTreeSet};

use crate::duration::{ActionKind, DurationEvaluators};
use crate::model::{Attributes, Element, Infrastructure, Node, Vm};
use crate::solver::{BoolVar, Constraint, Csp, IntVar};

use super::SchedulerError;

// ── Node index ────────────────────────────────────────────────────────────────

/// Dense `0..n` numbering of the nodes of a problem.
///
/// Online nodes come first, then offline nodes, each group ordered by
/// identifier.  A slice's hoster variable ranges over these indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIndex {
    nodes: Vec<Node>,
    index: BTreeMap<Node, usize>,
}

impl NodeIndex {
    pub fn from_infrastructure(infra: &Infrastructure) -> Self {
        let nodes: Vec<Node> = infra
            .mapping
            .online_nodes()
            .chain(infra.mapping.offline_nodes())
            .collect();
        let index = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        Self { nodes, index }
    }

    pub fn get(&self, n: Node) -> Option<usize> {
        self.index.get(&n).copied()
    }

    pub fn node(&self, idx: usize) -> Option<Node> {
        self.nodes.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.nodes
    }
}

// ── TransitionContext ─────────────────────────────────────────────────────────

pub struct TransitionContext<'a> {
    csp: &'a mut dyn Csp,
    infra: &'a Infrastructure,
    durations: &'a DurationEvaluators,
    nodes: &'a NodeIndex,
    unmanageable: &'a BTreeSet<Vm>,
    running: &'a [IntVar],
    start: IntVar,
    end: IntVar,
    max_horizon: i64,
}

impl<'a> TransitionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        csp: &'a mut dyn Csp,
        infra: &'a Infrastructure,
        durations: &'a DurationEvaluators,
        nodes: &'a NodeIndex,
        unmanageable: &'a BTreeSet<Vm>,
        running: &'a [IntVar],
        (start, end): (IntVar, IntVar),
        max_horizon: i64,
    ) -> Self {
        Self {
            csp,
            infra,
            durations,
            nodes,
            unmanageable,
            running,
            start,
            end,
            max_horizon,
        }
    }

    pub fn csp(&mut self) -> &mut (dyn Csp + 'a) {
        &mut *self.csp
    }

    pub fn post(&mut self, c: Constraint) {
        self.csp.post(c);
    }

    pub fn bool_var(&mut self, label: &str) -> BoolVar {
        self.csp.bool_var(label)
    }

    pub fn constant(&mut self, label: &str, value: i64) -> IntVar {
        self.csp.constant(label, value)
    }

    pub fn bool_constant(&mut self, label: &str, value: bool) -> BoolVar {
        self.csp.bool_constant(label, value)
    }

    /// Moment the reconfiguration starts (the constant 0).
    pub fn start(&self) -> IntVar {
        self.start
    }

    /// Moment the reconfiguration ends.
    pub fn end(&self) -> IntVar {
        self.end
    }

    pub fn max_horizon(&self) -> i64 {
        self.max_horizon
    }

    pub fn infra(&self) -> &'a Infrastructure {
        self.infra
    }

    pub fn attributes(&self) -> &'a Attributes {
        &self.infra.attributes
    }

    /// Estimated duration of `kind` applied to `e`.
    pub fn duration(&self, kind: ActionKind, e: impl Into<Element>) -> Result<i64, SchedulerError> {
        self.durations.evaluate(self.infra, kind, e.into())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self, n: Node) -> Result<usize, SchedulerError> {
        self.nodes
            .get(n)
            .ok_or_else(|| SchedulerError::UnknownNode(n.to_string()))
    }

    /// Index of the node currently hosting `vm` (running or sleeping).
    pub fn current_host(&self, vm: Vm) -> Result<usize, SchedulerError> {
        let n = self
            .infra
            .mapping
            .vm_location(vm)
            .ok_or_else(|| SchedulerError::VmNotPlaced(vm.to_string()))?;
        self.node_index(n)
    }

    pub fn is_manageable(&self, vm: Vm) -> bool {
        !self.unmanageable.contains(&vm)
    }

    /// Number of VMs whose demand slice is placed on node `idx`.
    pub fn running_vms(&self, idx: usize) -> Result<IntVar, SchedulerError> {
        self.running.get(idx).copied().ok_or_else(|| {
            SchedulerError::UnknownNode(format!("index {idx}"))
        })
    }

    /// Moment variable over `[0, max_horizon]`.
    pub fn make_unbounded(&mut self, label: &str) -> IntVar {
        self.csp.int_var(label, 0, self.max_horizon)
    }

    /// Hoster variable over every node index.
    pub fn make_host_variable(&mut self, label: &str) -> IntVar {
        let last = i64::try_from(self.nodes.len()).unwrap_or(i64::MAX) - 1;
        self.csp.int_var(label, 0, last)
    }

    /// Hoster variable fixed to the current host of `vm`.
    pub fn make_current_host(&mut self, vm: Vm, label: &str) -> Result<IntVar, SchedulerError> {
        let idx = self.current_host(vm)?;
        Ok(self.csp.constant(label, idx as i64))
    }
}
