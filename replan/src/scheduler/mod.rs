/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reconfiguration problem: from a snapshot and target states to a plan.
//!
//! [`ProblemBuilder`] turns an [`Infrastructure`] plus the requested
//! [`TargetStates`] into a [`ReconfigurationProblem`]: one constraint model
//! holding a transition per element.  Solving the problem and decoding the
//! solution gives a [`ReconfigurationPlan`].
//!
//! ```text
//! Infrastructure ─┐
//! TargetStates   ─┼─► ProblemBuilder::build ─► ReconfigurationProblem
//! PlannerConfig  ─┘                              │ find_solution
//!                                                ▼
//!                                             Solution ─► build_plan ─► ReconfigurationPlan
//! ```
//!
//! # Construction order
//!
//! | Step | What |
//! |---|---|
//! | 1 | horizon: `rp.start = 0`, `rp.end ∈ [0, max_horizon]` |
//! | 2 | one running-VM counter per node |
//! | 3 | one node transition per node, chosen by current state |
//! | 4 | one VM transition per VM, chosen by `(current, target)` state |
//! | 5 | counters = number of demand slices per node |
//! | 6 | every slice inside the hosting window of its hoster |
//! | 7 | requested node states |
//! | 8 | search hints: keep nodes in their state and VMs on their host |
//!
//! A VM without a requested state keeps its current one.  VMs that are not
//! in the mapping yet (state `Init`) take part only when a target state is
//! requested for them.

pub mod context;
pub mod error;

pub use error::{MaterializationFailure, MaterializeError, SchedulerError};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{PlannerConfig, DEFAULT_MAX_HORIZON};
use crate::duration::DurationEvaluators;
use crate::model::{Element, Infrastructure, Node, NodeState, Vm, VmState};
use crate::plan::{PlanAssembly, ReconfigurationPlan};
use crate::solver::{
    Cmp, Constraint, Csp, IntVar, Model, Solution, SolveOptions, SolveOutcome,
};
use crate::transition::{
    NodeTransition, NodeTransitionModel, Slice, Transition, TransitionFactory, VmTransition,
    VmTransitionModel,
};

use context::{NodeIndex, TransitionContext};

// ── Target states ─────────────────────────────────────────────────────────────

/// Requested final state per element.  Elements left out keep their current
/// state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetStates {
    pub vms: BTreeMap<Vm, VmState>,
    pub nodes: BTreeMap<Node, NodeState>,
}

impl TargetStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vm(mut self, vm: Vm, state: VmState) -> Self {
        self.vms.insert(vm, state);
        self
    }

    pub fn node(mut self, node: Node, state: NodeState) -> Self {
        self.nodes.insert(node, state);
        self
    }
}

// ── ProblemBuilder ────────────────────────────────────────────────────────────

/// Collects the inputs of a [`ReconfigurationProblem`].
///
/// Defaults: the duration and transition bundles, no target state, every VM
/// manageable, no time limit, horizon minimisation on.
pub struct ProblemBuilder<'a> {
    infra: &'a Infrastructure,
    durations: DurationEvaluators,
    factory: TransitionFactory,
    targets: TargetStates,
    unmanageable: BTreeSet<Vm>,
    time_limit: Option<Duration>,
    optimize: bool,
    max_horizon: i64,
}

impl<'a> ProblemBuilder<'a> {
    pub fn new(infra: &'a Infrastructure) -> Self {
        Self {
            infra,
            durations: DurationEvaluators::new_bundle(),
            factory: TransitionFactory::new_bundle(),
            targets: TargetStates::new(),
            unmanageable: BTreeSet::new(),
            time_limit: None,
            optimize: true,
            max_horizon: DEFAULT_MAX_HORIZON,
        }
    }

    /// Take durations, time limit, optimisation flag and horizon from `cfg`.
    pub fn with_config(mut self, cfg: &PlannerConfig) -> Self {
        self.durations = cfg.duration_evaluators();
        self.time_limit = cfg.time_limit();
        self.optimize = cfg.optimize;
        self.max_horizon = cfg.max_horizon;
        self
    }

    pub fn with_durations(mut self, durations: DurationEvaluators) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_factory(mut self, factory: TransitionFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_targets(mut self, targets: TargetStates) -> Self {
        self.targets = targets;
        self
    }

    /// VMs the planner must leave on their current host.
    pub fn with_unmanageable(mut self, vms: impl IntoIterator<Item = Vm>) -> Self {
        self.unmanageable = vms.into_iter().collect();
        self
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_max_horizon(mut self, max_horizon: i64) -> Self {
        self.max_horizon = max_horizon;
        self
    }

    /// Build the model.
    ///
    /// # Errors
    /// Any construction error of a transition (missing estimator, missing
    /// template, …), [`SchedulerError::NoNodeTransition`] /
    /// [`SchedulerError::NoVmTransition`] when the factory has no builder for
    /// an element, and [`SchedulerError::UnknownNode`] for a target state on
    /// a node outside the mapping.
    pub fn build(self) -> Result<ReconfigurationProblem<'a>, SchedulerError> {
        let Self {
            infra,
            durations,
            factory,
            targets,
            unmanageable,
            time_limit,
            optimize,
            max_horizon,
        } = self;

        let nodes = NodeIndex::from_infrastructure(infra);
        let mut vms = infra.mapping.all_vms();
        vms.extend(targets.vms.keys().copied());

        info!(
            nodes = nodes.len(),
            vms = vms.len(),
            max_horizon,
            "=== Building reconfiguration problem ==="
        );

        // ── Horizon and counters ──────────────────────────────────────────────
        let mut model = Model::new();
        let start = model.constant("rp.start", 0);
        let end = model.int_var("rp.end", 0, max_horizon);
        let capacity = i64::try_from(vms.len()).unwrap_or(i64::MAX);
        let running: Vec<IntVar> = nodes
            .as_slice()
            .iter()
            .map(|n| model.int_var(&format!("nbRunning({n})"), 0, capacity))
            .collect();

        // ── Transitions ───────────────────────────────────────────────────────
        let (node_transitions, vm_transitions) = {
            let mut ctx = TransitionContext::new(
                &mut model,
                infra,
                &durations,
                &nodes,
                &unmanageable,
                &running,
                (start, end),
                max_horizon,
            );
            let node_transitions = Self::node_transitions(&mut ctx, &factory, &nodes)?;
            let vm_transitions = Self::vm_transitions(&mut ctx, &factory, &targets, &vms)?;
            (node_transitions, vm_transitions)
        };

        let mut problem = ReconfigurationProblem {
            infra,
            nodes,
            model,
            start,
            end,
            running,
            node_transitions,
            vm_transitions,
            highest_vm: vms.last().copied(),
            time_limit,
            optimize,
            max_horizon,
        };

        problem.link_running_counts();
        problem.link_hosting_windows();
        problem.apply_node_targets(&targets.nodes)?;
        problem.add_hints();

        info!(
            variables = problem.model.var_count(),
            constraints = problem.model.constraint_count(),
            "Reconfiguration problem built"
        );
        Ok(problem)
    }

    fn node_transitions(
        ctx: &mut TransitionContext<'_>,
        factory: &TransitionFactory,
        nodes: &NodeIndex,
    ) -> Result<Vec<NodeTransition>, SchedulerError> {
        let mut out = Vec::with_capacity(nodes.len());
        for &n in nodes.as_slice() {
            let state = ctx
                .infra()
                .mapping
                .node_state(n)
                .ok_or_else(|| SchedulerError::UnknownNode(n.to_string()))?;
            let builder =
                factory
                    .node_builder(state)
                    .ok_or_else(|| SchedulerError::NoNodeTransition {
                        node: n.to_string(),
                        state,
                    })?;
            let t = (builder.build)(ctx, n)?;
            debug!(node = %n, state = %state, builder = builder.name, "node transition built");
            out.push(t);
        }
        Ok(out)
    }

    fn vm_transitions(
        ctx: &mut TransitionContext<'_>,
        factory: &TransitionFactory,
        targets: &TargetStates,
        vms: &BTreeSet<Vm>,
    ) -> Result<BTreeMap<Vm, VmTransition>, SchedulerError> {
        let mut out = BTreeMap::new();
        for &vm in vms {
            let src = ctx.infra().mapping.vm_state(vm);
            let dst = targets.vms.get(&vm).copied().unwrap_or(src);
            let builder =
                factory
                    .builder(src, dst)
                    .ok_or_else(|| SchedulerError::NoVmTransition {
                        vm: vm.to_string(),
                        from: src,
                        to: dst,
                    })?;
            let t = (builder.build)(ctx, vm)?;
            debug!(vm = %vm, from = %src, to = %dst, builder = builder.name, "VM transition built");
            out.insert(vm, t);
        }
        Ok(out)
    }
}

// ── ReconfigurationProblem ────────────────────────────────────────────────────

/// A built constraint model with one transition per element.
pub struct ReconfigurationProblem<'a> {
    infra: &'a Infrastructure,
    nodes: NodeIndex,
    model: Model,
    start: IntVar,
    end: IntVar,
    running: Vec<IntVar>,
    /// Aligned with `nodes`.
    node_transitions: Vec<NodeTransition>,
    vm_transitions: BTreeMap<Vm, VmTransition>,
    /// Clones never reuse this identifier or any below it.
    highest_vm: Option<Vm>,
    time_limit: Option<Duration>,
    optimize: bool,
    max_horizon: i64,
}

impl<'a> ReconfigurationProblem<'a> {
    pub fn builder(infra: &'a Infrastructure) -> ProblemBuilder<'a> {
        ProblemBuilder::new(infra)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn start(&self) -> IntVar {
        self.start
    }

    pub fn end(&self) -> IntVar {
        self.end
    }

    pub fn infra(&self) -> &'a Infrastructure {
        self.infra
    }

    pub fn nodes(&self) -> &NodeIndex {
        &self.nodes
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Extra constraints and hints go through here.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn post(&mut self, c: Constraint) {
        self.model.post(c);
    }

    /// Number of VMs running on `n` at the end of the reconfiguration.
    pub fn running_vms(&self, n: Node) -> Result<IntVar, SchedulerError> {
        let idx = self.node_index(n)?;
        Ok(self.running[idx])
    }

    pub fn vm_transition(&self, vm: Vm) -> Result<&VmTransition, SchedulerError> {
        self.vm_transitions
            .get(&vm)
            .ok_or_else(|| SchedulerError::UnknownVm(vm.to_string()))
    }

    pub fn node_transition(&self, n: Node) -> Result<&NodeTransition, SchedulerError> {
        let idx = self.node_index(n)?;
        Ok(&self.node_transitions[idx])
    }

    pub fn vm_transitions(&self) -> impl Iterator<Item = &VmTransition> {
        self.vm_transitions.values()
    }

    pub fn node_transitions(&self) -> &[NodeTransition] {
        &self.node_transitions
    }

    fn node_index(&self, n: Node) -> Result<usize, SchedulerError> {
        self.nodes
            .get(n)
            .ok_or_else(|| SchedulerError::UnknownNode(n.to_string()))
    }

    // ── Construction steps ────────────────────────────────────────────────────

    fn link_running_counts(&mut self) {
        let hosters: Vec<IntVar> = self
            .vm_transitions
            .values()
            .filter_map(|t| t.dslice())
            .map(|s| s.hoster)
            .collect();
        for (i, &count) in self.running.iter().enumerate() {
            self.model.post(Constraint::Count {
                vars: hosters.clone(),
                value: i as i64,
                count,
            });
        }
    }

    /// `slice.start >= hostingStart[hoster]` and `slice.end <= hostingEnd[hoster]`
    /// for every slice.
    fn link_hosting_windows(&mut self) {
        let starts: Vec<IntVar> = self
            .node_transitions
            .iter()
            .map(|t| t.hosting_start())
            .collect();
        let ends: Vec<IntVar> = self
            .node_transitions
            .iter()
            .map(|t| t.hosting_end())
            .collect();

        let slices: Vec<(String, Slice)> = self
            .vm_transitions
            .values()
            .flat_map(|t| {
                let label = format!("{}({})", t.kind(), t.vm());
                [
                    t.cslice().map(|s| (format!("{label}.cSlice"), *s)),
                    t.dslice().map(|s| (format!("{label}.dSlice"), *s)),
                ]
            })
            .flatten()
            .collect();

        for (label, s) in slices {
            let hs = self
                .model
                .int_var(&format!("{label}.hostingStart"), 0, self.max_horizon);
            self.model.post(Constraint::Element {
                y: hs,
                table: starts.clone(),
                index: s.hoster,
            });
            self.model.post(Constraint::rel(s.start, Cmp::Ge, hs));

            let he = self
                .model
                .int_var(&format!("{label}.hostingEnd"), 0, self.max_horizon);
            self.model.post(Constraint::Element {
                y: he,
                table: ends.clone(),
                index: s.hoster,
            });
            self.model.post(Constraint::rel(s.end, Cmp::Le, he));
        }
    }

    fn apply_node_targets(
        &mut self,
        targets: &BTreeMap<Node, NodeState>,
    ) -> Result<(), SchedulerError> {
        for (&n, &state) in targets {
            let idx = self.node_index(n)?;
            let online = self.node_transitions[idx].state();
            self.model.post(Constraint::rel_const(
                online.as_int(),
                Cmp::Eq,
                i64::from(state == NodeState::Online),
            ));
            debug!(node = %n, state = %state, "node state requested");
        }
        Ok(())
    }

    fn add_hints(&mut self) {
        for t in &self.node_transitions {
            self.model
                .prefer(t.state(), i64::from(t.source_state() == NodeState::Online));
        }
        for t in self.vm_transitions.values() {
            let VmTransition::Relocatable(r) = t else {
                continue;
            };
            if !r.is_managed() {
                continue;
            }
            self.model.prefer(r.is_staying(), 1);
            if let (Some(d), Some(idx)) = (r.dslice(), self.nodes.get(r.source())) {
                self.model.prefer(d.hoster, idx as i64);
            }
        }
    }

    // ── Solving ───────────────────────────────────────────────────────────────

    /// Run the search.
    ///
    /// # Errors
    /// * [`SchedulerError::Infeasible`] – no assignment satisfies the model.
    /// * [`SchedulerError::NoSolutionWithinBudget`] – the time limit expired
    ///   before any solution was found.
    pub fn find_solution(&self) -> Result<Solution, SchedulerError> {
        let opts = SolveOptions {
            time_limit: self.time_limit,
            minimize: self.optimize.then_some(self.end),
        };
        info!(
            variables = self.model.var_count(),
            constraints = self.model.constraint_count(),
            time_limit = ?self.time_limit,
            optimize = self.optimize,
            "Solving"
        );

        match self.model.solve(&opts) {
            SolveOutcome::Solved { solution, optimal } => {
                let end = solution.int(self.end);
                if self.optimize && !optimal {
                    warn!(end, "Time limit reached, plan may not be optimal");
                } else {
                    info!(end, optimal, "Solution found");
                }
                Ok(solution)
            }
            SolveOutcome::Infeasible => {
                warn!("No plan satisfies the constraints");
                Err(SchedulerError::Infeasible)
            }
            SolveOutcome::Unknown => {
                let limit_secs = self.time_limit.map_or(0.0, |d| d.as_secs_f64());
                warn!(limit_secs, "No solution within the time limit");
                Err(SchedulerError::NoSolutionWithinBudget { limit_secs })
            }
        }
    }

    /// Decode `solution` into a plan.
    ///
    /// Every transition is materialized on its own: a failing transition
    /// contributes no action and the others are kept.
    ///
    /// # Errors
    /// [`SchedulerError::Materialization`] listing every failed transition,
    /// with the plan made of the successful ones.
    pub fn build_plan(&self, solution: &Solution) -> Result<ReconfigurationPlan, SchedulerError> {
        let mut pool = self.infra.vm_id_pool();
        if let Some(vm) = self.highest_vm {
            pool.reserve(vm);
        }
        let mut asm = PlanAssembly::new(self.nodes.as_slice(), pool);
        let mut failures = Vec::new();

        for t in &self.node_transitions {
            stage(&mut asm, t, t.node().into(), solution, &mut failures);
        }
        for t in self.vm_transitions.values() {
            stage(&mut asm, t, t.vm().into(), solution, &mut failures);
        }

        let plan = asm.into_plan();
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                kept = plan.len(),
                "Some transitions could not be materialized"
            );
            return Err(SchedulerError::Materialization {
                failures,
                partial: plan,
            });
        }

        let horizon = solution.int(self.end);
        if plan.duration() > horizon {
            warn!(
                plan_duration = plan.duration(),
                horizon, "Plan outlasts the solved horizon"
            );
        }
        info!(
            actions = plan.len(),
            duration = plan.duration(),
            "=== Plan assembled ==="
        );
        Ok(plan)
    }

    /// [`find_solution`](Self::find_solution) then
    /// [`build_plan`](Self::build_plan).
    pub fn solve(&self) -> Result<ReconfigurationPlan, SchedulerError> {
        let solution = self.find_solution()?;
        self.build_plan(&solution)
    }
}

/// Materialize one transition and commit or discard what it staged.
fn stage(
    asm: &mut PlanAssembly<'_>,
    t: &dyn Transition,
    element: Element,
    solution: &Solution,
    failures: &mut Vec<MaterializationFailure>,
) {
    match t.materialize(solution, asm) {
        Ok(()) => {
            asm.commit();
        }
        Err(e) => {
            asm.discard();
            warn!(element = %element, error = %e, "Materialization failed");
            failures.push(MaterializationFailure {
                element,
                reason: e.to_string(),
            });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::{ActionKind, DurationEvaluator};
    use crate::model::AttrValue;
    use crate::plan::Action;

    fn durations(overrides: &[(ActionKind, i64)]) -> DurationEvaluators {
        let mut dev = DurationEvaluators::new_bundle();
        for &(kind, d) in overrides {
            dev.register(kind, DurationEvaluator::Constant(d));
        }
        dev
    }

    fn solved(p: &ReconfigurationProblem<'_>) -> (Solution, ReconfigurationPlan) {
        let s = p.find_solution().unwrap();
        let plan = p.build_plan(&s).unwrap();
        (s, plan)
    }

    /// Running VM 1 on node 0, node 1 online, cloning allowed.
    fn clonable() -> Infrastructure {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_online_node(Node(1));
        infra.mapping.add_running_vm(Vm(1), Node(0));
        infra.attributes.put(Vm(1), "clone", AttrValue::Bool(true));
        infra
            .attributes
            .put(Vm(1), "template", AttrValue::Str("tpl".into()));
        infra
    }

    fn relocation_durations() -> DurationEvaluators {
        durations(&[
            (ActionKind::MigrateVm, 20),
            (ActionKind::ForgeVm, 3),
            (ActionKind::BootVm, 2),
            (ActionKind::ShutdownVm, 1),
        ])
    }

    fn force_host(p: &mut ReconfigurationProblem<'_>, vm: Vm, n: Node) {
        let hoster = p.vm_transition(vm).unwrap().dslice().unwrap().hoster;
        let idx = p.nodes().get(n).unwrap() as i64;
        p.post(Constraint::rel_const(hoster, Cmp::Eq, idx));
    }

    // ── End-to-end scenarios ──────────────────────────────────────────────────

    #[test]
    fn single_boot_takes_its_estimate() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_ready_vm(Vm(1));

        let p = ProblemBuilder::new(&infra)
            .with_durations(durations(&[(ActionKind::BootVm, 5)]))
            .with_targets(TargetStates::new().vm(Vm(1), VmState::Running))
            .build()
            .unwrap();
        let (_, plan) = solved(&p);

        assert_eq!(plan.len(), 1);
        let a = &plan.actions()[0];
        assert_eq!(a.kind(), ActionKind::BootVm);
        assert_eq!(a.end() - a.start(), 5);
        assert_eq!(
            *a,
            Action::BootVm {
                vm: Vm(1),
                node: Node(0),
                start: 0,
                end: 5,
                substitutes: None
            }
        );
    }

    #[test]
    fn sequential_boots_add_up() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_online_node(Node(1));
        infra.mapping.add_ready_vm(Vm(1));
        infra.mapping.add_ready_vm(Vm(2));

        let mut p = ProblemBuilder::new(&infra)
            .with_durations(durations(&[(ActionKind::BootVm, 5)]))
            .with_targets(
                TargetStates::new()
                    .vm(Vm(1), VmState::Running)
                    .vm(Vm(2), VmState::Running),
            )
            .build()
            .unwrap();
        let first_end = p.vm_transition(Vm(1)).unwrap().end();
        let second_start = p.vm_transition(Vm(2)).unwrap().start();
        p.post(Constraint::rel(second_start, Cmp::Ge, first_end));

        let (s, plan) = solved(&p);
        assert_eq!(plan.duration(), 10);
        assert_eq!(s.int(p.end()), 10);
        let vms: Vec<_> = plan.iter().map(|a| a.vm()).collect();
        assert_eq!(vms, vec![Some(Vm(1)), Some(Vm(2))]);
        assert!(plan.actions().windows(2).all(|w| w[0].start() <= w[1].start()));
    }

    #[test]
    fn offline_node_boots_before_hosting() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_offline_node(Node(1));
        infra.mapping.add_ready_vm(Vm(1));

        let mut p = ProblemBuilder::new(&infra)
            .with_durations(durations(&[
                (ActionKind::BootNode, 5),
                (ActionKind::BootVm, 2),
            ]))
            .with_targets(TargetStates::new().vm(Vm(1), VmState::Running))
            .build()
            .unwrap();
        force_host(&mut p, Vm(1), Node(1));

        let (_, plan) = solved(&p);
        assert_eq!(
            plan.actions(),
            &[
                Action::BootNode {
                    node: Node(1),
                    start: 0,
                    end: 5
                },
                Action::BootVm {
                    vm: Vm(1),
                    node: Node(1),
                    start: 5,
                    end: 7,
                    substitutes: None
                },
            ]
        );
    }

    #[test]
    fn slow_migration_is_replaced_by_reinstantiation() {
        let infra = clonable();
        let mut p = ProblemBuilder::new(&infra)
            .with_durations(relocation_durations())
            .build()
            .unwrap();
        force_host(&mut p, Vm(1), Node(1));

        let (s, plan) = solved(&p);
        let VmTransition::Relocatable(r) = p.vm_transition(Vm(1)).unwrap() else {
            panic!("VM 1 should be relocatable");
        };
        assert!(s.bool(r.relocation_method()));
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.actions(),
            &[
                Action::ForgeVm {
                    vm: Vm(2),
                    start: 0,
                    end: 3
                },
                Action::BootVm {
                    vm: Vm(2),
                    node: Node(1),
                    start: 3,
                    end: 5,
                    substitutes: Some(Vm(1))
                },
                Action::ShutdownVm {
                    vm: Vm(1),
                    node: Node(0),
                    start: 5,
                    end: 6
                },
            ]
        );
    }

    // ── Properties of solved problems ─────────────────────────────────────────

    /// Mixed problem touching every default builder.
    fn mixed() -> (Infrastructure, TargetStates) {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_online_node(Node(1));
        infra.mapping.add_offline_node(Node(2));
        infra.mapping.add_running_vm(Vm(1), Node(0));
        infra.mapping.add_running_vm(Vm(2), Node(0));
        infra.mapping.add_sleeping_vm(Vm(3), Node(1));
        infra.mapping.add_ready_vm(Vm(4));
        infra.mapping.add_ready_vm(Vm(5));
        infra.mapping.add_running_vm(Vm(6), Node(1));
        infra
            .attributes
            .put(Vm(7), "template", AttrValue::Str("small".into()));

        let targets = TargetStates::new()
            .vm(Vm(2), VmState::Ready)
            .vm(Vm(3), VmState::Running)
            .vm(Vm(4), VmState::Running)
            .vm(Vm(5), VmState::Killed)
            .vm(Vm(6), VmState::Sleeping)
            .vm(Vm(7), VmState::Ready)
            .node(Node(0), NodeState::Offline);
        (infra, targets)
    }

    #[test]
    fn every_transition_fits_the_horizon() {
        let (infra, targets) = mixed();
        let p = ProblemBuilder::new(&infra)
            .with_targets(targets)
            .build()
            .unwrap();
        let (s, plan) = solved(&p);
        let horizon = s.int(p.end());

        let all: Vec<&dyn Transition> = p
            .vm_transitions()
            .map(|t| t as &dyn Transition)
            .chain(p.node_transitions().iter().map(|t| t as &dyn Transition))
            .collect();
        for t in all {
            let (start, end) = (s.int(t.start()), s.int(t.end()));
            assert_eq!(s.int(t.duration()), end - start);
            assert!(0 <= start && start <= end && end <= horizon);
        }
        assert!(plan.duration() <= horizon);
        assert!(p.model().is_satisfied_by(&s));
    }

    #[test]
    fn slices_stay_inside_hosting_windows() {
        let (infra, targets) = mixed();
        let p = ProblemBuilder::new(&infra)
            .with_targets(targets)
            .build()
            .unwrap();
        let (s, _) = solved(&p);

        for t in p.vm_transitions() {
            for slice in [t.cslice(), t.dslice()].into_iter().flatten() {
                let idx = s.int(slice.hoster) as usize;
                let node = &p.node_transitions()[idx];
                assert!(s.int(slice.start) >= s.int(node.hosting_start()), "{}", t.vm());
                assert!(s.int(slice.end) <= s.int(node.hosting_end()), "{}", t.vm());
            }
        }
    }

    #[test]
    fn node_shutdown_waits_for_departures() {
        let (infra, targets) = mixed();
        let p = ProblemBuilder::new(&infra)
            .with_targets(targets)
            .build()
            .unwrap();
        let (s, plan) = solved(&p);

        assert!(!s.bool(p.node_transition(Node(0)).unwrap().state()));
        let shutdown = plan
            .iter()
            .find(|a| matches!(a, Action::ShutdownNode { node: Node(0), .. }))
            .unwrap();
        for a in plan.iter().filter(|a| a.vm().is_some()) {
            let leaves_node0 = matches!(
                a,
                Action::MigrateVm { src: Node(0), .. } | Action::ShutdownVm { node: Node(0), .. }
            );
            if leaves_node0 {
                assert!(a.end() <= shutdown.start(), "{a}");
            }
        }
        assert_eq!(s.int(p.running_vms(Node(0)).unwrap()), 0);
    }

    #[test]
    fn idle_elements_are_left_alone() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_online_node(Node(1));
        infra.mapping.add_offline_node(Node(2));
        infra.mapping.add_running_vm(Vm(1), Node(1));
        infra.mapping.add_ready_vm(Vm(2));

        let p = ProblemBuilder::new(&infra).build().unwrap();
        let (s, plan) = solved(&p);
        assert!(plan.is_empty());
        assert_eq!(s.int(p.end()), 0);
    }

    #[test]
    fn materializing_twice_is_identical() {
        let infra = clonable();
        let mut p = ProblemBuilder::new(&infra)
            .with_durations(relocation_durations())
            .build()
            .unwrap();
        force_host(&mut p, Vm(1), Node(1));
        let s = p.find_solution().unwrap();
        assert_eq!(p.build_plan(&s).unwrap(), p.build_plan(&s).unwrap());
    }

    #[test]
    fn clones_skip_identifiers_of_forged_vms() {
        let mut infra = clonable();
        infra
            .attributes
            .put(Vm(2), "template", AttrValue::Str("tpl".into()));
        let mut p = ProblemBuilder::new(&infra)
            .with_durations(relocation_durations())
            .with_targets(TargetStates::new().vm(Vm(2), VmState::Ready))
            .build()
            .unwrap();
        force_host(&mut p, Vm(1), Node(1));

        let (_, plan) = solved(&p);
        let forged: Vec<_> = plan
            .iter()
            .filter(|a| a.kind() == ActionKind::ForgeVm)
            .map(|a| a.vm())
            .collect();
        assert!(forged.contains(&Some(Vm(2))));
        assert!(forged.contains(&Some(Vm(3))));
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn exhausted_identifier_pool_reports_the_vm() {
        let mut infra = clonable();
        infra.mapping.add_ready_vm(Vm(0));
        infra.vm_id_limit = Some(2);
        let mut p = ProblemBuilder::new(&infra)
            .with_durations(relocation_durations())
            .with_targets(TargetStates::new().vm(Vm(0), VmState::Running))
            .build()
            .unwrap();
        force_host(&mut p, Vm(1), Node(1));

        let s = p.find_solution().unwrap();
        match p.build_plan(&s) {
            Err(SchedulerError::Materialization { failures, partial }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].element, Element::Vm(Vm(1)));
                // the boot of VM 0 survives
                assert_eq!(partial.len(), 1);
                assert_eq!(partial.actions()[0].vm(), Some(Vm(0)));
            }
            other => panic!("expected a materialization failure, got {other:?}"),
        }
    }

    #[test]
    fn forging_without_template_fails_before_solving() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        let err = ProblemBuilder::new(&infra)
            .with_targets(TargetStates::new().vm(Vm(4), VmState::Ready))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::MissingTemplate { .. }));
    }

    #[test]
    fn missing_builders_are_errors() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_sleeping_vm(Vm(1), Node(0));

        let err = ProblemBuilder::new(&infra)
            .with_factory(TransitionFactory::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchedulerError::NoNodeTransition {
                state: NodeState::Online,
                ..
            }
        ));

        let err = ProblemBuilder::new(&infra)
            .with_targets(TargetStates::new().vm(Vm(1), VmState::Ready))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchedulerError::NoVmTransition {
                from: VmState::Sleeping,
                to: VmState::Ready,
                ..
            }
        ));
    }

    #[test]
    fn unknown_elements_are_rejected() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        let err = ProblemBuilder::new(&infra)
            .with_targets(TargetStates::new().node(Node(9), NodeState::Offline))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::UnknownNode(_)));

        let p = ProblemBuilder::new(&infra).build().unwrap();
        assert!(matches!(
            p.vm_transition(Vm(3)),
            Err(SchedulerError::UnknownVm(_))
        ));
    }

    #[test]
    fn conflicting_targets_are_infeasible() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_ready_vm(Vm(1));
        let p = ProblemBuilder::new(&infra)
            .with_targets(
                TargetStates::new()
                    .vm(Vm(1), VmState::Running)
                    .node(Node(0), NodeState::Offline),
            )
            .build()
            .unwrap();
        assert!(matches!(p.solve(), Err(SchedulerError::Infeasible)));
    }

    #[test]
    fn pinned_vm_keeps_its_node_online() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_online_node(Node(1));
        infra.mapping.add_running_vm(Vm(1), Node(0));

        let targets = TargetStates::new().node(Node(0), NodeState::Offline);
        let p = ProblemBuilder::new(&infra)
            .with_targets(targets.clone())
            .with_unmanageable([Vm(1)])
            .build()
            .unwrap();
        assert!(matches!(p.solve(), Err(SchedulerError::Infeasible)));

        // the same VM may leave when it is manageable
        let p = ProblemBuilder::new(&infra)
            .with_targets(targets)
            .build()
            .unwrap();
        let plan = p.solve().unwrap();
        assert!(plan.iter().any(|a| a.kind() == ActionKind::MigrateVm));
    }

    #[test]
    fn zero_budget_is_not_infeasibility() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_ready_vm(Vm(1));
        let p = ProblemBuilder::new(&infra)
            .with_targets(TargetStates::new().vm(Vm(1), VmState::Running))
            .with_time_limit(Some(Duration::ZERO))
            .build()
            .unwrap();
        assert!(matches!(
            p.find_solution(),
            Err(SchedulerError::NoSolutionWithinBudget { .. })
        ));
    }
}
