/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Builder registry: which transition applies to which state change.
//!
//! VM builders are indexed by destination state and declare the set of
//! source states they accept; node builders are indexed by source state.
//! When several VM builders match the same `(source, destination)` pair,
//! the one registered last is used, so [`TransitionFactory::add`] overrides
//! a default builder without removing it first.
//!
//! Default bundle:
//!
//! | Builder | Sources | Destination |
//! |---|---|---|
//! | `forgeVM` | Init | Ready |
//! | `stayAwayVM` | Ready | Ready |
//! | `shutdownVM` | Running | Ready |
//! | `bootVM` | Ready | Running |
//! | `resumeVM` | Sleeping | Running |
//! | `relocatable` | Running | Running |
//! | `suspendVM` | Running | Sleeping |
//! | `stayAwayVM` | Sleeping | Sleeping |
//! | `killVM` | Init, Ready, Running, Sleeping | Killed |
//! | `bootableNode` | Offline | – |
//! | `shutdownableNode` | Online | – |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{Node, NodeState, Vm, VmState};
use crate::scheduler::context::TransitionContext;
use crate::scheduler::SchedulerError;

use super::{
    BootVm, BootableNode, ForgeVm, KillVm, NodeTransition, RelocatableVm, ResumeVm, ShutdownVm,
    ShutdownableNode, StayAwayVm, SuspendVm, VmTransition,
};

pub type VmBuildFn = fn(&mut TransitionContext<'_>, Vm) -> Result<VmTransition, SchedulerError>;
pub type NodeBuildFn =
    fn(&mut TransitionContext<'_>, Node) -> Result<NodeTransition, SchedulerError>;

// ── Builders ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct VmTransitionBuilder {
    pub name: &'static str,
    pub sources: BTreeSet<VmState>,
    pub destination: VmState,
    pub build: VmBuildFn,
}

impl VmTransitionBuilder {
    pub fn new(
        name: &'static str,
        sources: impl IntoIterator<Item = VmState>,
        destination: VmState,
        build: VmBuildFn,
    ) -> Self {
        Self {
            name,
            sources: sources.into_iter().collect(),
            destination,
            build,
        }
    }

    pub fn accepts(&self, src: VmState) -> bool {
        self.sources.contains(&src)
    }
}

impl fmt::Debug for VmTransitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmTransitionBuilder")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("destination", &self.destination)
            .finish()
    }
}

#[derive(Clone)]
pub struct NodeTransitionBuilder {
    pub name: &'static str,
    pub source: NodeState,
    pub build: NodeBuildFn,
}

impl NodeTransitionBuilder {
    pub fn new(name: &'static str, source: NodeState, build: NodeBuildFn) -> Self {
        Self {
            name,
            source,
            build,
        }
    }
}

impl fmt::Debug for NodeTransitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTransitionBuilder")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TransitionFactory {
    vm_builders: BTreeMap<VmState, Vec<VmTransitionBuilder>>,
    node_builders: BTreeMap<NodeState, NodeTransitionBuilder>,
}

impl TransitionFactory {
    /// A factory without any builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The factory with every default builder registered.
    pub fn new_bundle() -> Self {
        use VmState::*;

        let mut f = Self::new();
        f.add(VmTransitionBuilder::new(ForgeVm::NAME, [Init], Ready, |c, v| {
            ForgeVm::new(c, v).map(VmTransition::Forge)
        }));
        f.add(VmTransitionBuilder::new(StayAwayVm::NAME, [Ready], Ready, |c, v| {
            StayAwayVm::new(c, v).map(VmTransition::StayAway)
        }));
        f.add(VmTransitionBuilder::new(ShutdownVm::NAME, [Running], Ready, |c, v| {
            ShutdownVm::new(c, v).map(VmTransition::Shutdown)
        }));
        f.add(VmTransitionBuilder::new(BootVm::NAME, [Ready], Running, |c, v| {
            BootVm::new(c, v).map(VmTransition::Boot)
        }));
        f.add(VmTransitionBuilder::new(ResumeVm::NAME, [Sleeping], Running, |c, v| {
            ResumeVm::new(c, v).map(VmTransition::Resume)
        }));
        f.add(VmTransitionBuilder::new(
            RelocatableVm::NAME,
            [Running],
            Running,
            |c, v| RelocatableVm::new(c, v).map(VmTransition::Relocatable),
        ));
        f.add(VmTransitionBuilder::new(SuspendVm::NAME, [Running], Sleeping, |c, v| {
            SuspendVm::new(c, v).map(VmTransition::Suspend)
        }));
        f.add(VmTransitionBuilder::new(StayAwayVm::NAME, [Sleeping], Sleeping, |c, v| {
            StayAwayVm::new(c, v).map(VmTransition::StayAway)
        }));
        f.add(VmTransitionBuilder::new(
            KillVm::NAME,
            [Init, Ready, Running, Sleeping],
            Killed,
            |c, v| KillVm::new(c, v).map(VmTransition::Kill),
        ));
        f.add_node(NodeTransitionBuilder::new(
            BootableNode::NAME,
            NodeState::Offline,
            |c, n| BootableNode::new(c, n).map(NodeTransition::Bootable),
        ));
        f.add_node(NodeTransitionBuilder::new(
            ShutdownableNode::NAME,
            NodeState::Online,
            |c, n| ShutdownableNode::new(c, n).map(NodeTransition::Shutdownable),
        ));
        f
    }

    /// Register a VM builder.  It takes precedence over every builder
    /// registered before it for the same state pairs.
    pub fn add(&mut self, b: VmTransitionBuilder) {
        self.vm_builders.entry(b.destination).or_default().push(b);
    }

    /// Register a node builder, replacing the one for the same source state.
    /// Returns the replaced builder.
    pub fn add_node(&mut self, b: NodeTransitionBuilder) -> Option<NodeTransitionBuilder> {
        self.node_builders.insert(b.source, b)
    }

    /// Remove every VM builder called `name` leading to `destination`.
    /// Returns `true` if something was removed.
    pub fn remove(&mut self, name: &str, destination: VmState) -> bool {
        let Some(list) = self.vm_builders.get_mut(&destination) else {
            return false;
        };
        let before = list.len();
        list.retain(|b| b.name != name);
        before != list.len()
    }

    /// Remove the node builder for `source`.
    pub fn remove_node(&mut self, source: NodeState) -> Option<NodeTransitionBuilder> {
        self.node_builders.remove(&source)
    }

    /// Every VM builder able to go from `src` to `dst`, in registration order.
    pub fn builders(&self, src: VmState, dst: VmState) -> Vec<&VmTransitionBuilder> {
        self.vm_builders
            .get(&dst)
            .map(|list| list.iter().filter(|b| b.accepts(src)).collect())
            .unwrap_or_default()
    }

    /// The VM builder used for `src → dst`: the last registered match.
    pub fn builder(&self, src: VmState, dst: VmState) -> Option<&VmTransitionBuilder> {
        self.vm_builders
            .get(&dst)?
            .iter()
            .rev()
            .find(|b| b.accepts(src))
    }

    /// The node builder for a node currently in `src`.
    pub fn node_builder(&self, src: NodeState) -> Option<&NodeTransitionBuilder> {
        self.node_builders.get(&src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_covers_the_state_machine() {
        use VmState::*;
        let f = TransitionFactory::new_bundle();
        let expected = [
            (Init, Ready, ForgeVm::NAME),
            (Ready, Ready, StayAwayVm::NAME),
            (Running, Ready, ShutdownVm::NAME),
            (Ready, Running, BootVm::NAME),
            (Sleeping, Running, ResumeVm::NAME),
            (Running, Running, RelocatableVm::NAME),
            (Running, Sleeping, SuspendVm::NAME),
            (Sleeping, Sleeping, StayAwayVm::NAME),
            (Init, Killed, KillVm::NAME),
            (Ready, Killed, KillVm::NAME),
            (Running, Killed, KillVm::NAME),
            (Sleeping, Killed, KillVm::NAME),
        ];
        for (src, dst, name) in expected {
            assert_eq!(f.builder(src, dst).map(|b| b.name), Some(name), "{src} -> {dst}");
        }
        assert!(f.builder(Sleeping, Ready).is_none());
        assert!(f.builder(Killed, Running).is_none());

        assert_eq!(
            f.node_builder(NodeState::Offline).map(|b| b.name),
            Some(BootableNode::NAME)
        );
        assert_eq!(
            f.node_builder(NodeState::Online).map(|b| b.name),
            Some(ShutdownableNode::NAME)
        );
    }

    #[test]
    fn later_builder_overrides_earlier_one() {
        let mut f = TransitionFactory::new_bundle();
        f.add(VmTransitionBuilder::new(
            "killFirst",
            [VmState::Ready],
            VmState::Running,
            |c, v| KillVm::new(c, v).map(VmTransition::Kill),
        ));
        assert_eq!(
            f.builder(VmState::Ready, VmState::Running).map(|b| b.name),
            Some("killFirst")
        );
        let names: Vec<_> = f
            .builders(VmState::Ready, VmState::Running)
            .iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec![BootVm::NAME, "killFirst"]);

        assert!(f.remove("killFirst", VmState::Running));
        assert!(!f.remove("killFirst", VmState::Running));
        assert_eq!(
            f.builder(VmState::Ready, VmState::Running).map(|b| b.name),
            Some(BootVm::NAME)
        );
    }

    #[test]
    fn node_builders_are_replaced_and_removed() {
        let mut f = TransitionFactory::new_bundle();
        let old = f.add_node(NodeTransitionBuilder::new(
            "alwaysBootable",
            NodeState::Online,
            |c, n| BootableNode::new(c, n).map(NodeTransition::Bootable),
        ));
        assert_eq!(old.map(|b| b.name), Some(ShutdownableNode::NAME));
        assert!(f.remove_node(NodeState::Online).is_some());
        assert!(f.node_builder(NodeState::Online).is_none());
    }

    #[test]
    fn empty_factory_has_nothing() {
        let f = TransitionFactory::new();
        assert!(f.builders(VmState::Ready, VmState::Running).is_empty());
        assert!(f.node_builder(NodeState::Online).is_none());
    }
}
