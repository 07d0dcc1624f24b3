/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Running → Running: stay, migrate live, or re-instantiate.
//!
//! # Model
//!
//! ```text
//!   cSlice (current host) ████████████████████┐ end
//!   dSlice (any host)              start ┌████████████████████ rp.end
//!                                        │◄── duration ──►│
//! ```
//!
//! The action runs from the demand slice start to the consuming slice end,
//! so the two slices overlap while the VM moves.  Variables and their
//! relations:
//!
//! | Relation | Meaning |
//! |---|---|
//! | `mig = stay ? 0 : migrate` | migration estimate, 0 when staying |
//! | `stay ⇔ dSlice.hoster = src` | staying means keeping the host |
//! | `stay ⇔ duration = 0 ⇔ mig = 0` | nothing happens when staying |
//! | `(¬reinst ∨ mig < r) ⇒ duration = mig`, otherwise `duration = r` | method selection |
//! | `reinst ⇔ duration = r` | the method is always derivable from the duration |
//! | `start ≥ reinst × forge` | the clone exists before it boots |
//!
//! `r`, the re-instantiation duration, is the forge estimate alone.
//! Re-instantiation is only available when the VM carries `clone = true`
//! and a `template` attribute.
//!
//! A VM that is not manageable is pinned to its current host: both slices
//! use a constant hoster and the transition has no choice variable.

use tracing::debug;

use crate::duration::ActionKind;
use crate::model::{Node, Vm, VmState};
use crate::plan::{Action, PlanAssembly};
use crate::scheduler::context::TransitionContext;
use crate::scheduler::{MaterializeError, SchedulerError};
use crate::solver::{BoolVar, Cmp, Constraint, Csp, IntVar, Rel, Solution};

use super::{hoster_node, Slice, SliceBuilder, Transition, VmTransitionModel};

#[derive(Debug, Clone)]
pub struct RelocatableVm {
    vm: Vm,
    src: Node,
    cslice: Slice,
    dslice: Slice,
    start: IntVar,
    end: IntVar,
    duration: IntVar,
    migration_duration: IntVar,
    state: BoolVar,
    stay: BoolVar,
    do_reinstantiate: BoolVar,
    bandwidth: Option<i64>,
    post_copy: bool,
    managed: bool,
    forge_duration: i64,
    boot_duration: i64,
}

impl RelocatableVm {
    pub const NAME: &'static str = "relocatable";

    pub fn new(ctx: &mut TransitionContext<'_>, vm: Vm) -> Result<Self, SchedulerError> {
        let src = ctx
            .infra()
            .mapping
            .vm_location(vm)
            .ok_or_else(|| SchedulerError::VmNotPlaced(vm.to_string()))?;
        let src_idx = ctx.node_index(src)?;

        if !ctx.is_manageable(vm) {
            return Self::pinned(ctx, vm, src);
        }

        let label = format!("{}({vm})", Self::NAME);

        let host = ctx.make_current_host(vm, &format!("{label}.cSlice_hoster"))?;
        let c_end = ctx.make_unbounded(&format!("{label}.cSlice_end"));
        let cslice = SliceBuilder::new(vm, format!("{label}.cSlice"))
            .hoster(host)
            .end(c_end)
            .build(ctx);
        let d_start = ctx.make_unbounded(&format!("{label}.dSlice_start"));
        let dslice = SliceBuilder::new(vm, format!("{label}.dSlice"))
            .start(d_start)
            .build(ctx);
        let start = dslice.start;
        let end = cslice.end;

        let migrate = ctx.duration(ActionKind::MigrateVm, vm)?;
        let boot_duration = ctx.duration(ActionKind::BootVm, vm)?;
        let forge_duration = ctx.duration(ActionKind::ForgeVm, vm)?;
        let reinstantiate = forge_duration;

        let (bandwidth, post_copy) = match &ctx.infra().network {
            Some(net) => (
                Some(net.bandwidth_for(vm)),
                ctx.attributes().get_bool(vm, "postCopy", false),
            ),
            None => (None, false),
        };

        let stay = ctx.bool_var(&format!("{label}.stay"));
        let migration_duration =
            ctx.csp()
                .int_var(&format!("migration({vm}).duration"), 0, migrate);
        ctx.post(Constraint::Times {
            lit: stay.is_false(),
            k: migrate,
            z: migration_duration,
        });

        let attrs = ctx.attributes();
        let can_clone = attrs.get_bool(vm, "clone", false) && attrs.is_set(vm, "template");

        let (duration, do_reinstantiate) = if can_clone {
            let reinst = ctx.bool_var(&format!("relocation_method({vm})"));
            let duration = ctx.csp().int_var(
                &format!("{label}.duration"),
                reinstantiate.min(0),
                migrate.max(reinstantiate),
            );
            Self::post_method_choice(
                ctx.csp(),
                &label,
                reinst,
                migration_duration,
                duration,
                reinstantiate,
            );

            // the clone must be forged before the demand slice starts
            let lead = ctx
                .csp()
                .int_var(&format!("{label}.forge_lead"), 0, forge_duration);
            ctx.post(Constraint::Times {
                lit: reinst.is_true(),
                k: forge_duration,
                z: lead,
            });
            ctx.post(Constraint::rel(start, Cmp::Ge, lead));
            (duration, reinst)
        } else {
            let reinst = ctx.bool_constant(&format!("relocation_method({vm})"), false);
            (migration_duration, reinst)
        };

        ctx.post(Constraint::Reify {
            b: stay,
            rel: Rel::constant(dslice.hoster, Cmp::Eq, src_idx as i64),
        });
        ctx.post(Constraint::Reify {
            b: stay,
            rel: Rel::constant(duration, Cmp::Eq, 0),
        });
        ctx.post(Constraint::Reify {
            b: stay,
            rel: Rel::constant(migration_duration, Cmp::Eq, 0),
        });
        ctx.post(Constraint::task(start, duration, end));

        let state = ctx.bool_constant(&format!("{label}.state"), true);
        debug!(
            vm = %vm,
            src = %src,
            migrate,
            reinstantiate,
            can_clone,
            "relocatable built"
        );

        Ok(Self {
            vm,
            src,
            cslice,
            dslice,
            start,
            end,
            duration,
            migration_duration,
            state,
            stay,
            do_reinstantiate,
            bandwidth,
            post_copy,
            managed: true,
            forge_duration,
            boot_duration,
        })
    }

    /// `(¬reinst ∨ mig < r) ⇒ duration = mig`, `else duration = r`, and
    /// `reinst ⇔ duration = r`.
    fn post_method_choice(
        csp: &mut dyn Csp,
        label: &str,
        reinst: BoolVar,
        mig: IntVar,
        duration: IntVar,
        r: i64,
    ) {
        let migrates = csp.reify(
            &format!("{label}.migrates"),
            Rel::constant(reinst.as_int(), Cmp::Eq, 0),
        );
        let faster = csp.reify(
            &format!("{label}.migration_faster"),
            Rel::constant(mig, Cmp::Lt, r),
        );
        let use_migration = csp.bool_var(&format!("{label}.use_migration"));
        csp.post(Constraint::Or {
            b: use_migration,
            of: vec![migrates, faster],
        });
        csp.post(Constraint::Implies {
            lit: use_migration.is_true(),
            rel: Rel::vars(duration, Cmp::Eq, mig),
        });
        csp.post(Constraint::Implies {
            lit: use_migration.is_false(),
            rel: Rel::constant(duration, Cmp::Eq, r),
        });
        csp.post(Constraint::Reify {
            b: reinst,
            rel: Rel::constant(duration, Cmp::Eq, r),
        });
    }

    fn pinned(ctx: &mut TransitionContext<'_>, vm: Vm, src: Node) -> Result<Self, SchedulerError> {
        let label = format!("stayRunningOn({vm})");
        let host = ctx.make_current_host(vm, &format!("{label}.host"))?;
        let c_end = ctx.make_unbounded(&format!("{label}.cSlice_end"));
        let cslice = SliceBuilder::new(vm, format!("{label}.cSlice"))
            .hoster(host)
            .end(c_end)
            .build(ctx);
        let dslice = SliceBuilder::new(vm, format!("{label}.dSlice"))
            .hoster(host)
            .start(c_end)
            .build(ctx);
        let duration = ctx.constant(&format!("{label}.duration"), 0);
        let stay = ctx.bool_constant(&format!("{label}.stay"), true);
        let do_reinstantiate = ctx.bool_constant(&format!("{label}.reinstantiate"), false);
        let state = ctx.bool_constant(&format!("{label}.state"), true);
        let start = ctx.start();
        debug!(vm = %vm, src = %src, "VM not manageable, pinned to its host");
        Ok(Self {
            vm,
            src,
            cslice,
            dslice,
            start,
            end: start,
            duration,
            migration_duration: duration,
            state,
            stay,
            do_reinstantiate,
            bandwidth: None,
            post_copy: false,
            managed: false,
            forge_duration: 0,
            boot_duration: 0,
        })
    }

    /// `true` when the VM keeps its host.
    pub fn is_staying(&self) -> BoolVar {
        self.stay
    }

    /// `true` = re-instantiation, `false` = live migration.
    pub fn relocation_method(&self) -> BoolVar {
        self.do_reinstantiate
    }

    pub fn migration_duration(&self) -> IntVar {
        self.migration_duration
    }

    /// Bandwidth from the network view, if one is attached.
    pub fn bandwidth(&self) -> Option<i64> {
        self.bandwidth
    }

    pub fn uses_post_copy(&self) -> bool {
        self.post_copy
    }

    pub fn source(&self) -> Node {
        self.src
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) -> Result<(), MaterializeError> {
        if s.int(self.cslice.hoster) == s.int(self.dslice.hoster) {
            return Ok(());
        }
        let dst = hoster_node(s, plan, self.dslice.hoster)?;

        if !s.bool(self.do_reinstantiate) {
            plan.add(Action::MigrateVm {
                vm: self.vm,
                src: self.src,
                dst,
                start: s.int(self.start),
                end: s.int(self.end),
                bandwidth: self.bandwidth,
            });
            return Ok(());
        }

        let clone = plan
            .clone_vm(self.vm)
            .ok_or_else(|| MaterializeError::NoCloneIdentifier(self.vm.to_string()))?;
        let forged = s.int(self.dslice.start);
        let booted = forged + self.boot_duration;
        plan.add(Action::ForgeVm {
            vm: clone,
            start: forged - self.forge_duration,
            end: forged,
        });
        plan.add(Action::BootVm {
            vm: clone,
            node: dst,
            start: forged,
            end: booted,
            substitutes: Some(self.vm),
        });
        plan.add(Action::ShutdownVm {
            vm: self.vm,
            node: self.src,
            start: booted,
            end: s.int(self.cslice.end),
        });
        Ok(())
    }
}

impl Transition for RelocatableVm {
    fn start(&self) -> IntVar {
        self.start
    }

    fn end(&self) -> IntVar {
        self.end
    }

    fn duration(&self) -> IntVar {
        self.duration
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

impl VmTransitionModel for RelocatableVm {
    fn vm(&self) -> Vm {
        self.vm
    }

    fn cslice(&self) -> Option<&Slice> {
        Some(&self.cslice)
    }

    fn dslice(&self) -> Option<&Slice> {
        Some(&self.dslice)
    }

    fn is_managed(&self) -> bool {
        self.managed
    }

    fn source_state(&self) -> VmState {
        VmState::Running
    }

    fn future_state(&self) -> VmState {
        VmState::Running
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
