/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Single-action VM transitions.
//!
//! | Transition | From → To | cSlice | dSlice | state |
//! |---|---|---|---|---|
//! | [`BootVm`] | Ready → Running | – | `[start, rp.end)` on any node | true |
//! | [`ResumeVm`] | Sleeping → Running | – | `[start, rp.end)` on any node | true |
//! | [`ShutdownVm`] | Running → Ready | `[rp.start, end)` on current host | – | false |
//! | [`SuspendVm`] | Running → Sleeping | `[rp.start, end)` on current host | – | false |
//! | [`KillVm`] | any → Killed | `[rp.start, end)` if placed | – | false |
//! | [`ForgeVm`] | Init → Ready | – | – | false |
//! | [`StayAwayVm`] | Ready → Ready, Sleeping → Sleeping | – | – | false |
//!
//! The duration of each action is the fixed estimate of its
//! [`ActionKind`], so `end = start + d` is the only timing freedom.

use tracing::debug;

use crate::duration::ActionKind;
use crate::model::{Node, Vm, VmState};
use crate::plan::{Action, PlanAssembly};
use crate::scheduler::context::TransitionContext;
use crate::scheduler::{MaterializeError, SchedulerError};
use crate::solver::{BoolVar, Cmp, Constraint, IntVar, Solution};

use super::{hoster_node, Slice, SliceBuilder, Transition, VmTransitionModel};

/// Start, end and duration of one timed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timing {
    start: IntVar,
    end: IntVar,
    duration: IntVar,
}

impl Timing {
    /// `end = start + d`, `end <= rp.end`, `start` free.
    fn free(ctx: &mut TransitionContext<'_>, label: &str, d: i64) -> Self {
        let start = ctx.make_unbounded(&format!("{label}.start"));
        Self::from_start(ctx, label, start, d)
    }

    fn from_start(ctx: &mut TransitionContext<'_>, label: &str, start: IntVar, d: i64) -> Self {
        let duration = ctx.constant(&format!("{label}.duration"), d);
        let end = ctx.make_unbounded(&format!("{label}.end"));
        ctx.post(Constraint::task(start, duration, end));
        ctx.post(Constraint::rel(end, Cmp::Le, ctx.end()));
        Self {
            start,
            end,
            duration,
        }
    }

    fn values(&self, s: &Solution) -> (i64, i64) {
        (s.int(self.start), s.int(self.end))
    }
}

macro_rules! timed_transition {
    ($ty:ty) => {
        impl Transition for $ty {
            fn start(&self) -> IntVar {
                self.timing.start
            }

            fn end(&self) -> IntVar {
                self.timing.end
            }

            fn duration(&self) -> IntVar {
                self.timing.duration
            }

            fn state(&self) -> BoolVar {
                self.state
            }

            fn materialize(
                &self,
                solution: &Solution,
                plan: &mut PlanAssembly<'_>,
            ) -> Result<(), MaterializeError> {
                self.actions(solution, plan)
            }
        }
    };
}

// ── BootVM ────────────────────────────────────────────────────────────────────

/// Ready → Running.  The demand slice starts with the boot action.
#[derive(Debug, Clone)]
pub struct BootVm {
    vm: Vm,
    timing: Timing,
    dslice: Slice,
    state: BoolVar,
}

impl BootVm {
    pub const NAME: &'static str = "bootVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let d = ctx.duration(ActionKind::BootVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let timing = Timing::free(ctx, &label, d);
        let dslice = SliceBuilder::new(vm, format!("{label}.dSlice"))
            .start(timing.start)
            .build(ctx);
        let state = ctx.bool_constant(&format!("{label}.state"), true);
        debug!(vm = %vm, duration = d, "bootVM built");
        Ok(Self {
            vm,
            timing,
            dslice,
            state,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let node = hoster_node(s, plan, self.dslice.hoster)?;
        let (start, end) = self.timing.values(s);
        plan.add(Action::BootVm {
            vm: self.vm,
            node,
            start,
            end,
            substitutes: None,
        });
        Ok(())
    }
}

timed_transition!(BootVm);

impl VmTransitionModel for BootVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        None
    }

    fn dslice(&self) -> Option<&Slice> {
        Some(&self.dslice)
    }

    fn source_state(&self) -> VmState {
        VmState::Ready
    }

    fn future_state(&self) -> VmState {
        VmState::Running
    }
}

// ── ResumeVM ──────────────────────────────────────────────────────────────────

/// Sleeping → Running.  The VM may wake up on any node, including the one it
/// sleeps on.
#[derive(Debug, Clone)]
pub struct ResumeVm {
    vm: Vm,
    src: Node,
    timing: Timing,
    dslice: Slice,
    state: BoolVar,
}

impl ResumeVm {
    pub const NAME: &'static str = "resumeVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let src = ctx
            .infra()
            .mapping
            .vm_location(vm)
            .ok_or_else(|| SchedulerError::VmNotPlaced(vm.to_string()))?;
        let d = ctx.duration(ActionKind::ResumeVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let timing = Timing::free(ctx, &label, d);
        let dslice = SliceBuilder::new(vm, format!("{label}.dSlice"))
            .start(timing.start)
            .build(ctx);
        let state = ctx.bool_constant(&format!("{label}.state"), true);
        Ok(Self {
            vm,
            src,
            timing,
            dslice,
            state,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let dst = hoster_node(s, plan, self.dslice.hoster)?;
        let (start, end) = self.timing.values(s);
        plan.add(Action::ResumeVm {
            vm: self.vm,
            src: self.src,
            dst,
            start,
            end,
        });
        Ok(())
    }
}

timed_transition!(ResumeVm);

impl VmTransitionModel for ResumeVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        None
    }

    fn dslice(&self) -> Option<&Slice> {
        Some(&self.dslice)
    }

    fn source_state(&self) -> VmState {
        VmState::Sleeping
    }

    fn future_state(&self) -> VmState {
        VmState::Running
    }
}

// ── ShutdownVM / SuspendVM ────────────────────────────────────────────────────

/// Running VM leaving its host.  The consuming slice ends with the action.
fn departure(
    ctx: &mut TransitionContext<'_>,
    vm: Vm,
    label: &str,
    d: i64,
) -> Result<(Timing, Slice), SchedulerError> {
    let host = ctx.make_current_host(vm, &format!("{label}.host"))?;
    let timing = Timing::free(ctx, label, d);
    let cslice = SliceBuilder::new(vm, format!("{label}.cSlice"))
        .hoster(host)
        .end(timing.end)
        .build(ctx);
    Ok((timing, cslice))
}

/// Running → Ready.
#[derive(Debug, Clone)]
pub struct ShutdownVm {
    vm: Vm,
    timing: Timing,
    cslice: Slice,
    state: BoolVar,
}

impl ShutdownVm {
    pub const NAME: &'static str = "shutdownVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let d = ctx.duration(ActionKind::ShutdownVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let (timing, cslice) = departure(ctx, vm, &label, d)?;
        let state = ctx.bool_constant(&format!("{label}.state"), false);
        Ok(Self {
            vm,
            timing,
            cslice,
            state,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let node = hoster_node(s, plan, self.cslice.hoster)?;
        let (start, end) = self.timing.values(s);
        plan.add(Action::ShutdownVm {
            vm: self.vm,
            node,
            start,
            end,
        });
        Ok(())
    }
}

timed_transition!(ShutdownVm);

impl VmTransitionModel for ShutdownVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        Some(&self.cslice)
    }

    fn dslice(&self) -> Option<&Slice> {
        None
    }

    fn source_state(&self) -> VmState {
        VmState::Running
    }

    fn future_state(&self) -> VmState {
        VmState::Ready
    }
}

/// Running → Sleeping.  The VM is suspended where it runs.
#[derive(Debug, Clone)]
pub struct SuspendVm {
    vm: Vm,
    timing: Timing,
    cslice: Slice,
    state: BoolVar,
}

impl SuspendVm {
    pub const NAME: &'static str = "suspendVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let d = ctx.duration(ActionKind::SuspendVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let (timing, cslice) = departure(ctx, vm, &label, d)?;
        let state = ctx.bool_constant(&format!("{label}.state"), false);
        Ok(Self {
            vm,
            timing,
            cslice,
            state,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let node = hoster_node(s, plan, self.cslice.hoster)?;
        let (start, end) = self.timing.values(s);
        plan.add(Action::SuspendVm {
            vm: self.vm,
            src: node,
            dst: node,
            start,
            end,
        });
        Ok(())
    }
}

timed_transition!(SuspendVm);

impl VmTransitionModel for SuspendVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        Some(&self.cslice)
    }

    fn dslice(&self) -> Option<&Slice> {
        None
    }

    fn source_state(&self) -> VmState {
        VmState::Running
    }

    fn future_state(&self) -> VmState {
        VmState::Sleeping
    }
}

// ── KillVM ────────────────────────────────────────────────────────────────────

/// Any state → Killed.  Kills happen at the reconfiguration start.
#[derive(Debug, Clone)]
pub struct KillVm {
    vm: Vm,
    from: VmState,
    node: Option<Node>,
    timing: Timing,
    cslice: Option<Slice>,
    state: BoolVar,
}

impl KillVm {
    pub const NAME: &'static str = "killVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let from = ctx.infra().mapping.vm_state(vm);
        let node = ctx.infra().mapping.vm_location(vm);
        let d = ctx.duration(ActionKind::KillVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let start = ctx.start();
        let timing = Timing::from_start(ctx, &label, start, d);

        let cslice = match from {
            VmState::Running | VmState::Sleeping => {
                let host = ctx.make_current_host(vm, &format!("{label}.host"))?;
                Some(
                    SliceBuilder::new(vm, format!("{label}.cSlice"))
                        .hoster(host)
                        .end(timing.end)
                        .build(ctx),
                )
            }
            _ => None,
        };
        let state = ctx.bool_constant(&format!("{label}.state"), false);
        Ok(Self {
            vm,
            from,
            node,
            timing,
            cslice,
            state,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let (start, end) = self.timing.values(s);
        plan.add(Action::KillVm {
            vm: self.vm,
            node: self.node,
            start,
            end,
        });
        Ok(())
    }
}

timed_transition!(KillVm);

impl VmTransitionModel for KillVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        self.cslice.as_ref()
    }

    fn dslice(&self) -> Option<&Slice> {
        None
    }

    fn source_state(&self) -> VmState {
        self.from
    }

    fn future_state(&self) -> VmState {
        VmState::Killed
    }
}

// ── ForgeVM ───────────────────────────────────────────────────────────────────

/// Init → Ready: build the VM image from its `template` attribute.
#[derive(Debug, Clone)]
pub struct ForgeVm {
    vm: Vm,
    template: String,
    timing: Timing,
    state: BoolVar,
}

impl ForgeVm {
    pub const NAME: &'static str = "forgeVM";

    /// # Errors
    /// [`SchedulerError::MissingTemplate`] if the VM has no `template`
    /// attribute.
    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let template = match ctx.attributes().get(vm, "template") {
            Some(v) => v.to_string(),
            None => return Err(SchedulerError::MissingTemplate { vm: vm.to_string() }),
        };
        let d = ctx.duration(ActionKind::ForgeVm, vm)?;
        let label = format!("{}({vm})", Self::NAME);
        let timing = Timing::free(ctx, &label, d);
        let state = ctx.bool_constant(&format!("{label}.state"), false);
        Ok(Self {
            vm,
            template,
            timing,
            state,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        let (start, end) = self.timing.values(s);
        plan.add(Action::ForgeVm {
            vm: self.vm,
            start,
            end,
        });
        Ok(())
    }
}

timed_transition!(ForgeVm);

impl VmTransitionModel for ForgeVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        None
    }

    fn dslice(&self) -> Option<&Slice> {
        None
    }

    fn source_state(&self) -> VmState {
        VmState::Init
    }

    fn future_state(&self) -> VmState {
        VmState::Ready
    }
}

// ── StayAwayVM ────────────────────────────────────────────────────────────────

/// A VM that neither runs before nor after the reconfiguration.  Nothing
/// happens; every variable is the constant 0.
#[derive(Debug, Clone)]
pub struct StayAwayVm {
    vm: Vm,
    at: VmState,
    timing: Timing,
    state: BoolVar,
}

impl StayAwayVm {
    pub const NAME: &'static str = "stayAwayVM";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let at = ctx.infra().mapping.vm_state(vm);
        let label = format!("{}({vm})", Self::NAME);
        let zero = ctx.constant(&format!("{label}.zero"), 0);
        let state = ctx.bool_constant(&format!("{label}.state"), false);
        Ok(Self {
            vm,
            at,
            timing: Timing {
                start: zero,
                end: zero,
                duration: zero,
            },
            state,
        })
    }

    fn actions(&self, _: &Solution, _: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        Ok(())
    }
}

timed_transition!(StayAwayVm);

impl VmTransitionModel for StayAwayVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        None
    }

    fn dslice(&self) -> Option<&Slice> {
        None
    }

    fn source_state(&self) -> VmState {
        self.at
    }

    fn future_state(&self) -> VmState {
        self.at
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
