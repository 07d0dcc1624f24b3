/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reconfiguration plans: timestamped actions produced by materialization.
//!
//! A [`ReconfigurationPlan`] keeps its actions sorted by `(start, end)`,
//! insertion order breaking ties, so consumers can serialise them for
//! execution without re-sorting.  Ordering between actions is carried by the
//! timestamps alone.
//!
//! [`PlanAssembly`] is the write side handed to transitions while decoding a
//! solution.  Actions of one transition are staged and only reach the plan
//! when the caller commits them, so a transition that fails half-way leaves
//! no trace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::duration::ActionKind;
use crate::model::{Node, Vm, VmIdPool};

// ── Actions ───────────────────────────────────────────────────────────────────

/// One timestamped action.  Times are in the planner's abstract time unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    BootVm {
        vm: Vm,
        node: Node,
        start: i64,
        end: i64,
        /// Set when the VM is a clone replacing `substitutes`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        substitutes: Option<Vm>,
    },
    ShutdownVm {
        vm: Vm,
        node: Node,
        start: i64,
        end: i64,
    },
    SuspendVm {
        vm: Vm,
        src: Node,
        dst: Node,
        start: i64,
        end: i64,
    },
    ResumeVm {
        vm: Vm,
        src: Node,
        dst: Node,
        start: i64,
        end: i64,
    },
    KillVm {
        vm: Vm,
        /// `None` when the VM was not placed.
        node: Option<Node>,
        start: i64,
        end: i64,
    },
    ForgeVm {
        vm: Vm,
        start: i64,
        end: i64,
    },
    MigrateVm {
        vm: Vm,
        src: Node,
        dst: Node,
        start: i64,
        end: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bandwidth: Option<i64>,
    },
    BootNode {
        node: Node,
        start: i64,
        end: i64,
    },
    ShutdownNode {
        node: Node,
        start: i64,
        end: i64,
    },
}

impl Action {
    pub fn start(&self) -> i64 {
        match self {
            Action::BootVm { start, .. }
            | Action::ShutdownVm { start, .. }
            | Action::SuspendVm { start, .. }
            | Action::ResumeVm { start, .. }
            | Action::KillVm { start, .. }
            | Action::ForgeVm { start, .. }
            | Action::MigrateVm { start, .. }
            | Action::BootNode { start, .. }
            | Action::ShutdownNode { start, .. } => *start,
        }
    }

    pub fn end(&self) -> i64 {
        match self {
            Action::BootVm { end, .. }
            | Action::ShutdownVm { end, .. }
            | Action::SuspendVm { end, .. }
            | Action::ResumeVm { end, .. }
            | Action::KillVm { end, .. }
            | Action::ForgeVm { end, .. }
            | Action::MigrateVm { end, .. }
            | Action::BootNode { end, .. }
            | Action::ShutdownNode { end, .. } => *end,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::BootVm { .. } => ActionKind::BootVm,
            Action::ShutdownVm { .. } => ActionKind::ShutdownVm,
            Action::SuspendVm { .. } => ActionKind::SuspendVm,
            Action::ResumeVm { .. } => ActionKind::ResumeVm,
            Action::KillVm { .. } => ActionKind::KillVm,
            Action::ForgeVm { .. } => ActionKind::ForgeVm,
            Action::MigrateVm { .. } => ActionKind::MigrateVm,
            Action::BootNode { .. } => ActionKind::BootNode,
            Action::ShutdownNode { .. } => ActionKind::ShutdownNode,
        }
    }

    /// VM the action applies to, if any.
    pub fn vm(&self) -> Option<Vm> {
        match self {
            Action::BootVm { vm, .. }
            | Action::ShutdownVm { vm, .. }
            | Action::SuspendVm { vm, .. }
            | Action::ResumeVm { vm, .. }
            | Action::KillVm { vm, .. }
            | Action::ForgeVm { vm, .. }
            | Action::MigrateVm { vm, .. } => Some(*vm),
            Action::BootNode { .. } | Action::ShutdownNode { .. } => None,
        }
    }

    pub fn duration(&self) -> i64 {
        self.end() - self.start()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.start())?;
        match self {
            Action::BootVm {
                vm,
                node,
                substitutes,
                ..
            } => {
                write!(f, "boot({vm}, on={node}")?;
                if let Some(orig) = substitutes {
                    write!(f, ", substitutes={orig}")?;
                }
                f.write_str(")")?;
            }
            Action::ShutdownVm { vm, node, .. } => write!(f, "shutdown({vm}, on={node})")?,
            Action::SuspendVm { vm, src, dst, .. } => {
                write!(f, "suspend({vm}, from={src}, to={dst})")?
            }
            Action::ResumeVm { vm, src, dst, .. } => {
                write!(f, "resume({vm}, from={src}, to={dst})")?
            }
            Action::KillVm { vm, node, .. } => match node {
                Some(n) => write!(f, "kill({vm}, on={n})")?,
                None => write!(f, "kill({vm})")?,
            },
            Action::ForgeVm { vm, .. } => write!(f, "forge({vm})")?,
            Action::MigrateVm {
                vm,
                src,
                dst,
                bandwidth,
                ..
            } => {
                write!(f, "migrate({vm}, {src} -> {dst}")?;
                if let Some(bw) = bandwidth {
                    write!(f, ", bw={bw}")?;
                }
                f.write_str(")")?;
            }
            Action::BootNode { node, .. } => write!(f, "bootNode({node})")?,
            Action::ShutdownNode { node, .. } => write!(f, "shutdownNode({node})")?,
        }
        write!(f, ":{}", self.end())
    }
}

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Ordered set of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigurationPlan {
    actions: Vec<Action>,
}

impl ReconfigurationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `a` after every action with a smaller-or-equal `(start, end)`.
    ///
    /// Returns `false` (and leaves the plan untouched) if an identical action
    /// is already present.
    pub fn add(&mut self, a: Action) -> bool {
        if self.actions.contains(&a) {
            return false;
        }
        let key = (a.start(), a.end());
        let at = self
            .actions
            .partition_point(|x| (x.start(), x.end()) <= key);
        self.actions.insert(at, a);
        true
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Completion time of the last action, 0 for an empty plan.
    pub fn duration(&self) -> i64 {
        self.actions.iter().map(Action::end).max().unwrap_or(0)
    }

    /// Actions touching `vm`, in plan order.
    pub fn actions_for(&self, vm: Vm) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(move |a| a.vm() == Some(vm))
    }
}

impl fmt::Display for ReconfigurationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.actions {
            writeln!(f, "{a}")?;
        }
        Ok(())
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Write side of plan construction during materialization.
#[derive(Debug)]
pub struct PlanAssembly<'a> {
    nodes: &'a [Node],
    clone_ids: VmIdPool,
    pending: Vec<Action>,
    plan: ReconfigurationPlan,
}

impl<'a> PlanAssembly<'a> {
    /// `nodes` maps a solved hoster index to its node.
    pub fn new(nodes: &'a [Node], clone_ids: VmIdPool) -> Self {
        Self {
            nodes,
            clone_ids,
            pending: Vec::new(),
            plan: ReconfigurationPlan::new(),
        }
    }

    /// Node behind a solved hoster index.
    pub fn node(&self, idx: i64) -> Option<Node> {
        usize::try_from(idx).ok().and_then(|i| self.nodes.get(i)).copied()
    }

    /// Fresh identifier for a clone of `vm`, `None` when the pool is empty.
    pub fn clone_vm(&mut self, _vm: Vm) -> Option<Vm> {
        self.clone_ids.allocate()
    }

    /// Stage an action for the transition being materialized.
    pub fn add(&mut self, a: Action) {
        self.pending.push(a);
    }

    /// Move staged actions into the plan.  Returns how many were new.
    pub fn commit(&mut self) -> usize {
        let mut added = 0;
        for a in self.pending.drain(..) {
            if self.plan.add(a) {
                added += 1;
            }
        }
        added
    }

    /// Drop staged actions.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    pub fn plan(&self) -> &ReconfigurationPlan {
        &self.plan
    }

    pub fn into_plan(self) -> ReconfigurationPlan {
        self.plan
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
