/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Transition models: the scheduled state change of one element.
//!
//! A transition allocates its decision variables and posts its structural
//! constraints into the shared model when it is built, then, once a solution
//! exists, decodes that solution into timestamped actions.
//!
//! # VM state machine
//!
//! ```text
//!            forge              boot / resume / relocatable
//!   Init ──────────► Ready ───────────────────────────► Running
//!                     ▲ │ ◄──────── shutdown ─────────── │ ▲
//!          stay away  └─┘                                │ │ resume
//!                                      suspend           ▼ │
//!                                  Sleeping ◄────────────┘ │
//!                                    └─┘ stay away ────────┘
//!   any of the above ──── kill ────► Killed
//! ```
//!
//! Nodes have two transitions: [`BootableNode`] (currently offline) and
//! [`ShutdownableNode`] (currently online).
//!
//! # Slices
//!
//! A VM occupies a node through *slices*.  The consuming slice (`cslice`)
//! covers the time the VM stays on its current host from the reconfiguration
//! start; the demand slice (`dslice`) covers the time it occupies its future
//! host until the reconfiguration end.  Either may be absent.

pub mod factory;
pub mod node;
pub mod relocatable;
pub mod vm;

pub use factory::{NodeTransitionBuilder, TransitionFactory, VmTransitionBuilder};
pub use node::{BootableNode, ShutdownableNode};
pub use relocatable::RelocatableVm;
pub use vm::{BootVm, ForgeVm, KillVm, ResumeVm, ShutdownVm, StayAwayVm, SuspendVm};

use crate::model::{Node, NodeState, Vm, VmState};
use crate::plan::PlanAssembly;
use crate::scheduler::context::TransitionContext;
use crate::scheduler::MaterializeError;
use crate::solver::{BoolVar, Cmp, Constraint, IntVar, Solution};

// ── Slices ────────────────────────────────────────────────────────────────────

/// Occupancy of one node by one VM over `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub vm: Vm,
    pub start: IntVar,
    pub end: IntVar,
    pub duration: IntVar,
    pub hoster: IntVar,
}

/// Builds a [`Slice`], creating whatever variable was not supplied.
///
/// | Missing | Default |
/// |---|---|
/// | `start` | reconfiguration start |
/// | `end` | reconfiguration end |
/// | `duration` | fresh variable with `end = start + duration` |
/// | `hoster` | fresh variable over every node index |
///
/// The slice always ends no later than the reconfiguration end.
#[derive(Debug, Clone)]
pub struct SliceBuilder {
    vm: Vm,
    label: String,
    start: Option<IntVar>,
    end: Option<IntVar>,
    duration: Option<IntVar>,
    hoster: Option<IntVar>,
}

impl SliceBuilder {
    pub fn new(vm: Vm, label: impl Into<String>) -> Self {
        Self {
            vm,
            label: label.into(),
            start: None,
            end: None,
            duration: None,
            hoster: None,
        }
    }

    pub fn start(mut self, v: IntVar) -> Self {
        self.start = Some(v);
        self
    }

    pub fn end(mut self, v: IntVar) -> Self {
        self.end = Some(v);
        self
    }

    pub fn duration(mut self, v: IntVar) -> Self {
        self.duration = Some(v);
        self
    }

    pub fn hoster(mut self, v: IntVar) -> Self {
        self.hoster = Some(v);
        self
    }

    pub fn build(self, ctx: &mut TransitionContext<'_>) -> Slice {
        let label = self.label;
        let hoster = match self.hoster {
            Some(h) => h,
            None => ctx.make_host_variable(&format!("{label}_hoster")),
        };
        let start = self.start.unwrap_or_else(|| ctx.start());
        let end = self.end.unwrap_or_else(|| ctx.end());
        let duration = match self.duration {
            Some(d) => d,
            None => {
                let (s_lo, s_hi) = ctx.csp().bounds(start);
                let (e_lo, e_hi) = ctx.csp().bounds(end);
                let d = ctx
                    .csp()
                    .int_var(&format!("{label}_duration"), (e_lo - s_hi).max(0), e_hi - s_lo);
                ctx.post(Constraint::task(start, d, end));
                d
            }
        };
        if end != ctx.end() {
            ctx.post(Constraint::rel(end, Cmp::Le, ctx.end()));
        }
        Slice {
            vm: self.vm,
            start,
            end,
            duration,
            hoster,
        }
    }
}

// ── Contracts ─────────────────────────────────────────────────────────────────

/// Shared contract of every transition.
pub trait Transition {
    fn start(&self) -> IntVar;
    fn end(&self) -> IntVar;
    fn duration(&self) -> IntVar;

    /// Final state: `true` = running (VM) or online (node).
    fn state(&self) -> BoolVar;

    /// Append the actions this transition stands for in `solution`.
    ///
    /// # Errors
    /// A [`MaterializeError`] when the solution cannot be decoded (for
    /// instance no identifier is left for a clone).  Actions already staged
    /// by the failing transition are discarded by the caller.
    fn materialize(
        &self,
        solution: &Solution,
        plan: &mut PlanAssembly<'_>,
    ) -> Result<(), MaterializeError>;
}

pub trait VmTransitionModel: Transition {
    fn vm(&self) -> Vm;
    fn cslice(&self) -> Option<&Slice>;
    fn dslice(&self) -> Option<&Slice>;

    /// `false` when the VM is outside operator control and only reasserted
    /// on its current host.
    fn is_managed(&self) -> bool {
        true
    }

    fn source_state(&self) -> VmState;
    fn future_state(&self) -> VmState;
}

pub trait NodeTransitionModel: Transition {
    fn node(&self) -> Node;

    /// Earliest moment the node may host a slice.
    fn hosting_start(&self) -> IntVar;

    /// Latest moment the node may host a slice.
    fn hosting_end(&self) -> IntVar;

    fn source_state(&self) -> NodeState;
}

/// Node behind a solved hoster variable.
pub(crate) fn hoster_node(
    solution: &Solution,
    plan: &PlanAssembly<'_>,
    hoster: IntVar,
) -> Result<Node, MaterializeError> {
    let idx = solution.int(hoster);
    plan.node(idx).ok_or(MaterializeError::UnknownHoster(idx))
}

// ── Tagged variants ───────────────────────────────────────────────────────────

/// Every kind of VM transition.
#[derive(Debug, Clone)]
pub enum VmTransition {
    Boot(BootVm),
    Shutdown(ShutdownVm),
    Suspend(SuspendVm),
    Resume(ResumeVm),
    Kill(KillVm),
    Forge(ForgeVm),
    StayAway(StayAwayVm),
    Relocatable(RelocatableVm),
}

impl VmTransition {
    pub fn as_model(&self) -> &dyn VmTransitionModel {
        match self {
            VmTransition::Boot(t) => t,
            VmTransition::Shutdown(t) => t,
            VmTransition::Suspend(t) => t,
            VmTransition::Resume(t) => t,
            VmTransition::Kill(t) => t,
            VmTransition::Forge(t) => t,
            VmTransition::StayAway(t) => t,
            VmTransition::Relocatable(t) => t,
        }
    }

    /// Short name of the transition kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VmTransition::Boot(_) => "bootVM",
            VmTransition::Shutdown(_) => "shutdownVM",
            VmTransition::Suspend(_) => "suspendVM",
            VmTransition::Resume(_) => "resumeVM",
            VmTransition::Kill(_) => "killVM",
            VmTransition::Forge(_) => "forgeVM",
            VmTransition::StayAway(_) => "stayAwayVM",
            VmTransition::Relocatable(_) => "relocatable",
        }
    }
}

impl Transition for VmTransition {
    fn start(&self) -> IntVar {
        self.as_model().start()
    }

    fn end(&self) -> IntVar {
        self.as_model().end()
    }

    fn duration(&self) -> IntVar {
        self.as_model().duration()
    }

    fn state(&self) -> BoolVar {
        self.as_model().state()
    }

    fn materialize(
        &self,
        solution: &Solution,
        plan: &mut PlanAssembly<'_>,
    ) -> Result<(), MaterializeError> {
        self.as_model().materialize(solution, plan)
    }
}

impl VmTransitionModel for VmTransition {
    fn vm(&self) -> Vm {
        self.as_model().vm()
    }

    fn cslice(&self) -> Option<&Slice> {
        self.as_model().cslice()
    }

    fn dslice(&self) -> Option<&Slice> {
        self.as_model().dslice()
    }

    fn is_managed(&self) -> bool {
        self.as_model().is_managed()
    }

    fn source_state(&self) -> VmState {
        self.as_model().source_state()
    }

    fn future_state(&self) -> VmState {
        self.as_model().future_state()
    }
}

/// Every kind of node transition.
#[derive(Debug, Clone)]
pub enum NodeTransition {
    Bootable(BootableNode),
    Shutdownable(ShutdownableNode),
}

impl NodeTransition {
    pub fn as_model(&self) -> &dyn NodeTransitionModel {
        match self {
            NodeTransition::Bootable(t) => t,
            NodeTransition::Shutdownable(t) => t,
        }
    }
}

impl Transition for NodeTransition {
    fn start(&self) -> IntVar {
        self.as_model().start()
    }

    fn end(&self) -> IntVar {
        self.as_model().end()
    }

    fn duration(&self) -> IntVar {
        self.as_model().duration()
    }

    fn state(&self) -> BoolVar {
        self.as_model().state()
    }

    fn materialize(
        &self,
        solution: &Solution,
        plan: &mut PlanAssembly<'_>,
    ) -> Result<(), MaterializeError> {
        self.as_model().materialize(solution, plan)
    }
}

impl NodeTransitionModel for NodeTransition {
    fn node(&self) -> Node {
        self.as_model().node()
    }

    fn hosting_start(&self) -> IntVar {
        self.as_model().hosting_start()
    }

    fn hosting_end(&self) -> IntVar {
        self.as_model().hosting_end()
    }

    fn source_state(&self) -> NodeState {
        self.as_model().source_state()
    }
}

// ── Test support ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Stand-alone harness to build one transition outside a full problem.

    use std::collections::BTreeSet;

    use crate::duration::DurationEvaluators;
    use crate::model::{Infrastructure, Vm};
    use crate::scheduler::context::{NodeIndex, TransitionContext};
    use crate::solver::{Csp, IntVar, Model};

    pub struct Harness {
        pub infra: Infrastructure,
        pub durations: DurationEvaluators,
        pub nodes: NodeIndex,
        pub unmanageable: BTreeSet<Vm>,
        pub model: Model,
        pub running: Vec<IntVar>,
        pub start: IntVar,
        pub end: IntVar,
    }

    impl Harness {
        pub fn new(infra: Infrastructure, durations: DurationEvaluators) -> Self {
            let nodes = NodeIndex::from_infrastructure(&infra);
            let mut model = Model::new();
            let start = model.constant("rp.start", 0);
            let end = model.int_var("rp.end", 0, 100);
            let running = (0..nodes.len())
                .map(|i| model.int_var(&format!("nbRunning({i})"), 0, 10))
                .collect();
            Self {
                infra,
                durations,
                nodes,
                unmanageable: BTreeSet::new(),
                model,
                running,
                start,
                end,
            }
        }

        pub fn ctx(&mut self) -> TransitionContext<'_> {
            TransitionContext::new(
                &mut self.model,
                &self.infra,
                &self.durations,
                &self.nodes,
                &self.unmanageable,
                &self.running,
                (self.start, self.end),
                100,
            )
        }
    }
}
