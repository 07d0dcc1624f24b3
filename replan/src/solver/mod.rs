/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Constraint-solver boundary.
//!
//! The transition layer only ever talks to a solver through the [`Csp`]
//! trait: allocate bounded integer / boolean variables, post declarative
//! [`Constraint`]s, read the pre-solve bounds of a variable.  Variables are
//! opaque handles into the solver's own store; nothing reads a "current
//! value" except through the immutable [`Solution`] returned by a solve.
//!
//! [`Model`] is the finite-domain engine shipped with the planner: bounds
//! propagation over interval domains, depth-first search, and optional
//! branch-and-bound minimisation of one variable.
//!
//! ```text
//! transition ──(Csp::int_var / Csp::post)──► Model ──(solve)──► SolveOutcome
//!                                                                 │
//!                       plan assembly ◄──(Solution::int / bool)───┘
//! ```

pub mod constraint;
pub mod engine;

pub use constraint::{Cmp, Constraint, Lit, Rel};
pub use engine::Model;

use std::fmt;
use std::time::Duration;

// ── Variable handles ──────────────────────────────────────────────────────────

/// Handle to a bounded integer decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVar(pub(crate) usize);

impl IntVar {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for IntVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle to a boolean decision variable (an integer variable over `{0, 1}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(pub(crate) IntVar);

impl BoolVar {
    pub fn as_int(self) -> IntVar {
        self.0
    }

    /// Literal that holds when this variable is `true`.
    pub fn is_true(self) -> Lit {
        Lit::pos(self)
    }

    /// Literal that holds when this variable is `false`.
    pub fn is_false(self) -> Lit {
        Lit::neg(self)
    }
}

impl From<BoolVar> for IntVar {
    fn from(b: BoolVar) -> Self {
        b.0
    }
}

// ── Csp contract ──────────────────────────────────────────────────────────────

/// Model-construction capability of a constraint solver.
///
/// Object safe: transitions receive it as `&mut dyn Csp`.
pub trait Csp {
    /// New integer variable over `[lb, ub]`.
    fn int_var(&mut self, name: &str, lb: i64, ub: i64) -> IntVar;

    /// New boolean variable.
    fn bool_var(&mut self, name: &str) -> BoolVar;

    /// Variable already instantiated to `value`.
    fn constant(&mut self, name: &str, value: i64) -> IntVar {
        self.int_var(name, value, value)
    }

    /// Boolean variable already instantiated to `value`.
    fn bool_constant(&mut self, name: &str, value: bool) -> BoolVar;

    /// Bounds of `v` as declared (before any search).
    fn bounds(&self, v: IntVar) -> (i64, i64);

    /// Append a constraint to the model.
    fn post(&mut self, c: Constraint);

    /// Fresh boolean `b` with `b ⇔ rel`.
    fn reify(&mut self, name: &str, rel: Rel) -> BoolVar {
        let b = self.bool_var(name);
        self.post(Constraint::Reify { b, rel });
        b
    }

    /// `true` if `v` is instantiated in its declared domain.
    fn is_fixed(&self, v: IntVar) -> bool {
        let (lo, hi) = self.bounds(v);
        lo == hi
    }
}

// ── Solving ───────────────────────────────────────────────────────────────────

/// Options for a single solve call.
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Wall-clock budget.  `None` = unbounded.
    pub time_limit: Option<Duration>,

    /// Variable to minimise.  `None` = stop at the first solution.
    pub minimize: Option<IntVar>,
}

/// Result of a solve call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// A consistent assignment.  `optimal` is `true` when the search proved
    /// no better value of the objective exists (always `true` without an
    /// objective).
    Solved { solution: Solution, optimal: bool },

    /// The search space was exhausted: no assignment satisfies the model.
    Infeasible,

    /// The budget ran out before any solution was found.  Retrying with more
    /// time may succeed.
    Unknown,
}

/// Immutable full assignment of every variable of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<i64>,
}

impl Solution {
    pub(crate) fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    /// Value of `v`.
    ///
    /// # Panics
    /// Panics if `v` does not belong to the model this solution came from.
    pub fn int(&self, v: IntVar) -> i64 {
        self.values[v.0]
    }

    pub fn bool(&self, b: BoolVar) -> bool {
        self.int(b.0) != 0
    }

    pub(crate) fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
