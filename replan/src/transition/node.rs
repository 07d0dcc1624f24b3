/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node transitions and their hosting windows.
//!
//! Both transitions share one two-state template.  `state` is a free
//! boolean (`true` = online at the end), and the node exposes a hosting
//! window `[hosting_start, hosting_end)` that VM slices placed on it must fit
//! in.
//!
//! | | BootableNode (offline now) | ShutdownableNode (online now) |
//! |---|---|---|
//! | `duration` | `online × boot` | `offline × shutdown` |
//! | `hosting_start` | `end` | `rp.start` |
//! | `hosting_end` | `[rp.start, rp.end][online]` | `[start, rp.end][online]` |
//! | action | `BootNode[start, end)` if online | `ShutdownNode[hosting_end, end)` if offline |
//!
//! An offline node hosts no running VM.  A node that does not change state
//! has its action anchored at the reconfiguration start.

use crate::duration::ActionKind;
use crate::model::{Node, NodeState};
use crate::plan::{Action, PlanAssembly};
use crate::scheduler::context::TransitionContext;
use crate::scheduler::{MaterializeError, SchedulerError};
use crate::solver::{BoolVar, Cmp, Constraint, IntVar, Lit, Rel, Solution};

use super::{NodeTransitionModel, Transition};

/// Variables shared by both node transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeVars {
    online: BoolVar,
    start: IntVar,
    end: IntVar,
    duration: IntVar,
}

impl NodeVars {
    /// `acting` is the literal under which the node changes state and the
    /// action takes `d`.
    fn build(
        ctx: &mut TransitionContext<'_>,
        node: Node,
        label: &str,
        d: i64,
        acting: impl Fn(BoolVar) -> Lit,
    ) -> Result<Self, SchedulerError> {
        let idx = ctx.node_index(node)?;
        let running = ctx.running_vms(idx)?;

        let online = ctx.bool_var(&format!("{label}.online"));
        ctx.post(Constraint::Implies {
            lit: online.is_false(),
            rel: Rel::constant(running, Cmp::Eq, 0),
        });

        let duration = ctx.csp().int_var(&format!("{label}.duration"), 0, d);
        let act = acting(online);
        ctx.post(Constraint::Times {
            lit: act,
            k: d,
            z: duration,
        });

        let start = ctx.make_unbounded(&format!("{label}.start"));
        let end = ctx.make_unbounded(&format!("{label}.end"));
        ctx.post(Constraint::rel(end, Cmp::Le, ctx.end()));
        ctx.post(Constraint::task(start, duration, end));

        // idle nodes act at the reconfiguration start
        let idle = Lit {
            var: act.var,
            positive: !act.positive,
        };
        ctx.post(Constraint::Implies {
            lit: idle,
            rel: Rel::constant(end, Cmp::Eq, 0),
        });

        Ok(Self {
            online,
            start,
            end,
            duration,
        })
    }
}

macro_rules! node_transition {
    ($ty:ty) => {
        impl Transition for $ty {
            fn start(&self) -> IntVar {
                self.vars.start
            }

            fn end(&self) -> IntVar {
                self.vars.end
            }

            fn duration(&self) -> IntVar {
                self.vars.duration
            }

            fn state(&self) -> BoolVar {
                self.vars.online
            }

            fn materialize(
                &self,
                solution: &Solution,
                plan: &mut PlanAssembly<'_>,
            ) -> Result<(), MaterializeError> {
                self.actions(solution, plan);
                Ok(())
            }
        }
    };
}

// ── BootableNode ──────────────────────────────────────────────────────────────

/// Offline → Online | Offline.
#[derive(Debug, Clone)]
pub struct BootableNode {
    node: Node,
    vars: NodeVars,
    hosting_end: IntVar,
}

impl BootableNode {
    pub const NAME: &'static str = "bootableNode";

    pub fn new(ctx: &mut TransitionContext<'_>, node: Node) -> Result<Self, SchedulerError> {
        let d = ctx.duration(ActionKind::BootNode, node)?;
        let label = format!("{}({node})", Self::NAME);
        let vars = NodeVars::build(ctx, node, &label, d, BoolVar::is_true)?;

        let hosting_end = ctx.make_unbounded(&format!("{label}.hostingEnd"));
        let table = vec![ctx.start(), ctx.end()];
        ctx.post(Constraint::Element {
            y: hosting_end,
            table,
            index: vars.online.as_int(),
        });
        Ok(Self {
            node,
            vars,
            hosting_end,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) {
        if s.bool(self.vars.online) {
            plan.add(Action::BootNode {
                node: self.node,
                start: s.int(self.vars.start),
                end: s.int(self.vars.end),
            });
        }
    }
}

node_transition!(BootableNode);

impl NodeTransitionModel for BootableNode {
    fn node(&self) -> Node {
        self.node
    }

    fn hosting_start(&self) -> IntVar {
        self.vars.end
    }

    fn hosting_end(&self) -> IntVar {
        self.hosting_end
    }

    fn source_state(&self) -> NodeState {
        NodeState::Offline
    }
}

// ── ShutdownableNode ──────────────────────────────────────────────────────────

/// Online → Online | Offline.  A node going offline stops hosting when its
/// shutdown starts, so every resident VM must have left by then.
#[derive(Debug, Clone)]
pub struct ShutdownableNode {
    node: Node,
    vars: NodeVars,
    hosting_start: IntVar,
    hosting_end: IntVar,
}

impl ShutdownableNode {
    pub const NAME: &'static str = "shutdownableNode";

    pub fn new(ctx: &mut TransitionContext<'_>, node: Node) -> Result<Self, SchedulerError> {
        let d = ctx.duration(ActionKind::ShutdownNode, node)?;
        let label = format!("{}({node})", Self::NAME);
        let vars = NodeVars::build(ctx, node, &label, d, BoolVar::is_false)?;

        let hosting_end = ctx.make_unbounded(&format!("{label}.hostingEnd"));
        let table = vec![vars.start, ctx.end()];
        ctx.post(Constraint::Element {
            y: hosting_end,
            table,
            index: vars.online.as_int(),
        });
        Ok(Self {
            node,
            vars,
            hosting_start: ctx.start(),
            hosting_end,
        })
    }

    fn actions(&self, s: &Solution, plan: &mut PlanAssembly<'_>) {
        if !s.bool(self.vars.online) {
            plan.add(Action::ShutdownNode {
                node: self.node,
                start: s.int(self.hosting_end),
                end: s.int(self.vars.end),
            });
        }
    }
}

node_transition!(ShutdownableNode);

impl NodeTransitionModel for ShutdownableNode {
    fn node(&self) -> Node {
        self.node
    }

    fn hosting_start(&self) -> IntVar {
        self.hosting_start
    }

    fn hosting_end(&self) -> IntVar {
        self.hosting_end
    }

    fn source_state(&self) -> NodeState {
        NodeState::Online
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::{DurationEvaluator, DurationEvaluators};
    use crate::model::Infrastructure;
    use crate::solver::{Csp, SolveOptions, SolveOutcome};
    use crate::transition::testing::Harness;

    fn harness(kind: ActionKind, d: i64) -> Harness {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_offline_node(Node(1));
        let mut dev = DurationEvaluators::new();
        dev.register(kind, DurationEvaluator::Constant(d));
        Harness::new(infra, dev)
    }

    fn solve(h: &Harness) -> Solution {
        match h.model.solve(&SolveOptions::default()) {
            SolveOutcome::Solved { solution, .. } => solution,
            other => panic!("expected a solution, got {other:?}"),
        }
    }

    fn actions(h: &Harness, t: &dyn Transition, s: &Solution) -> Vec<Action> {
        let mut asm = PlanAssembly::new(h.nodes.as_slice(), h.infra.vm_id_pool());
        t.materialize(s, &mut asm).unwrap();
        asm.commit();
        asm.into_plan().actions().to_vec()
    }

    fn fix(h: &mut Harness, b: BoolVar, value: bool) {
        h.model
            .post(Constraint::rel_const(b.as_int(), Cmp::Eq, i64::from(value)));
    }

    // ── BootableNode ──────────────────────────────────────────────────────────

    #[test]
    fn booting_takes_the_estimate_and_opens_hosting_at_the_end() {
        let mut h = harness(ActionKind::BootNode, 5);
        let t = BootableNode::new(&mut h.ctx(), Node(1)).unwrap();
        fix(&mut h, t.state(), true);

        let s = solve(&h);
        assert_eq!(s.int(t.duration()), 5);
        assert_eq!(s.int(t.end()) - s.int(t.start()), 5);
        assert_eq!(s.int(t.hosting_start()), s.int(t.end()));
        assert_eq!(s.int(t.hosting_end()), s.int(h.end));
        assert_eq!(
            actions(&h, &t, &s),
            vec![Action::BootNode {
                node: Node(1),
                start: 0,
                end: 5
            }]
        );
    }

    #[test]
    fn staying_offline_has_an_empty_window_and_no_action() {
        let mut h = harness(ActionKind::BootNode, 5);
        let t = BootableNode::new(&mut h.ctx(), Node(1)).unwrap();
        fix(&mut h, t.state(), false);

        let s = solve(&h);
        assert_eq!(s.int(t.duration()), 0);
        assert_eq!(s.int(t.start()), s.int(t.end()));
        assert_eq!(s.int(t.hosting_start()), s.int(t.hosting_end()));
        assert_eq!(s.int(h.running[1]), 0);
        assert!(actions(&h, &t, &s).is_empty());
    }

    #[test]
    fn offline_node_cannot_host_running_vms() {
        let mut h = harness(ActionKind::BootNode, 5);
        let t = BootableNode::new(&mut h.ctx(), Node(1)).unwrap();
        h.model.post(Constraint::rel_const(h.running[1], Cmp::Ge, 1));

        let s = solve(&h);
        assert!(s.bool(t.state()));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut h = harness(ActionKind::BootNode, 5);
        assert!(matches!(
            BootableNode::new(&mut h.ctx(), Node(7)),
            Err(SchedulerError::UnknownNode(_))
        ));
    }

    // ── ShutdownableNode ──────────────────────────────────────────────────────

    #[test]
    fn shutdown_closes_hosting_when_it_starts() {
        let mut h = harness(ActionKind::ShutdownNode, 20);
        let t = ShutdownableNode::new(&mut h.ctx(), Node(0)).unwrap();
        fix(&mut h, t.state(), false);
        // something keeps the node busy until 4
        h.model.post(Constraint::rel_const(t.start(), Cmp::Ge, 4));

        let s = solve(&h);
        assert_eq!(s.int(t.duration()), 20);
        assert_eq!(s.int(t.hosting_start()), 0);
        assert_eq!(s.int(t.hosting_end()), s.int(t.start()));
        assert_eq!(
            actions(&h, &t, &s),
            vec![Action::ShutdownNode {
                node: Node(0),
                start: 4,
                end: 24
            }]
        );
    }

    #[test]
    fn staying_online_hosts_until_the_end() {
        let mut h = harness(ActionKind::ShutdownNode, 20);
        let t = ShutdownableNode::new(&mut h.ctx(), Node(0)).unwrap();
        fix(&mut h, t.state(), true);

        let s = solve(&h);
        assert_eq!(s.int(t.duration()), 0);
        assert_eq!(s.int(t.hosting_end()), s.int(h.end));
        assert!(actions(&h, &t, &s).is_empty());
        assert_eq!(h.model.bounds(t.hosting_start()), (0, 0));
    }
}
