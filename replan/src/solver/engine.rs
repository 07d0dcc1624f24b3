/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Finite-domain engine behind the [`Csp`] trait.
//!
//! # Algorithm
//!
//! ```text
//! root ── propagate all ──► DFS node stack
//!                              │ pop
//!                              ▼
//!                     propagate watchers of touched vars
//!                              │
//!            conflict ◄────────┼────────► all fixed → check → solution
//!                              │
//!                  pick var (smallest domain, lowest index)
//!                  pick value (hint when inside, else lower bound)
//!                  push  x > v,  x < v,  x = v   (x = v explored first)
//! ```
//!
//! With an objective, every solution found restarts the search from the
//! root with `objective <= best - 1` until the space is exhausted (proved
//! optimal) or the deadline passes (best effort).

use std::collections::VecDeque;
use std::time::Instant;

use tracing::debug;

use super::constraint::{Cmp, Constraint, Rel};
use super::{BoolVar, Csp, IntVar, Solution, SolveOptions, SolveOutcome};

// ── Domains ───────────────────────────────────────────────────────────────────

/// Propagation failed: some domain became empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

/// Interval domains of every variable, plus the list of variables whose
/// bounds moved since the last drain.
#[derive(Debug, Clone)]
pub(crate) struct Domains {
    lo: Vec<i64>,
    hi: Vec<i64>,
    touched: Vec<usize>,
}

impl Domains {
    pub(crate) fn new(lo: Vec<i64>, hi: Vec<i64>) -> Self {
        Self {
            lo,
            hi,
            touched: Vec::new(),
        }
    }

    pub(crate) fn min(&self, v: IntVar) -> i64 {
        self.lo[v.0]
    }

    pub(crate) fn max(&self, v: IntVar) -> i64 {
        self.hi[v.0]
    }

    pub(crate) fn is_fixed(&self, v: IntVar) -> bool {
        self.lo[v.0] == self.hi[v.0]
    }

    pub(crate) fn contains(&self, v: IntVar, value: i64) -> bool {
        self.lo[v.0] <= value && value <= self.hi[v.0]
    }

    fn size(&self, i: usize) -> i64 {
        self.hi[i].saturating_sub(self.lo[i])
    }

    pub(crate) fn set_min(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        if value <= self.lo[v.0] {
            return Ok(false);
        }
        if value > self.hi[v.0] {
            return Err(Conflict);
        }
        self.lo[v.0] = value;
        self.touched.push(v.0);
        Ok(true)
    }

    pub(crate) fn set_max(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        if value >= self.hi[v.0] {
            return Ok(false);
        }
        if value < self.lo[v.0] {
            return Err(Conflict);
        }
        self.hi[v.0] = value;
        self.touched.push(v.0);
        Ok(true)
    }

    pub(crate) fn fix(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        let a = self.set_min(v, value)?;
        let b = self.set_max(v, value)?;
        Ok(a || b)
    }

    /// Remove `value` from the domain.  Only effective on a bound.
    pub(crate) fn remove(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        let (lo, hi) = (self.lo[v.0], self.hi[v.0]);
        if lo == value && hi == value {
            Err(Conflict)
        } else if lo == value {
            self.set_min(v, value + 1)
        } else if hi == value {
            self.set_max(v, value - 1)
        } else {
            Ok(false)
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// A constraint model: variables with their declared bounds, posted
/// constraints, and optional value hints for the search.
#[derive(Debug, Clone, Default)]
pub struct Model {
    names: Vec<String>,
    lo: Vec<i64>,
    hi: Vec<i64>,
    hints: Vec<Option<i64>>,
    constraints: Vec<Constraint>,
}

enum Search {
    Found(Vec<i64>),
    Exhausted,
    TimedOut,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the search to try `value` first when branching on `v`.
    pub fn prefer(&mut self, v: impl Into<IntVar>, value: i64) {
        let v = v.into();
        self.hints[v.0] = Some(value);
    }

    /// Label given to `v` at creation.
    pub fn name(&self, v: impl Into<IntVar>) -> &str {
        &self.names[v.into().0]
    }

    pub fn var_count(&self) -> usize {
        self.names.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// `true` if `solution` satisfies every declared bound and constraint.
    pub fn is_satisfied_by(&self, solution: &Solution) -> bool {
        let values = solution.values();
        values.len() == self.var_count()
            && values
                .iter()
                .enumerate()
                .all(|(i, x)| self.lo[i] <= *x && *x <= self.hi[i])
            && self.constraints.iter().all(|c| c.holds(values))
    }

    /// Search for a solution, optionally minimising `opts.minimize`.
    pub fn solve(&self, opts: &SolveOptions) -> SolveOutcome {
        let started = Instant::now();
        let deadline = opts.time_limit.map(|t| started + t);
        let watchers = self.watchers();

        let mut root = Domains::new(self.lo.clone(), self.hi.clone());
        let mut best: Option<Vec<i64>> = None;
        let mut rounds = 0u32;

        loop {
            rounds += 1;
            let outcome = self.dfs(root.clone(), &watchers, deadline);
            match outcome {
                Search::Found(values) => {
                    let Some(obj) = opts.minimize else {
                        debug!(vars = self.var_count(), elapsed = ?started.elapsed(), "solution found");
                        return SolveOutcome::Solved {
                            solution: Solution::new(values),
                            optimal: true,
                        };
                    };
                    let value = values[obj.0];
                    debug!(objective = value, round = rounds, "improved solution");
                    best = Some(values);
                    if root.set_max(obj, value - 1).is_err() {
                        return self.finish(best, true, started);
                    }
                }
                Search::Exhausted => return self.finish(best, true, started),
                Search::TimedOut => return self.finish(best, false, started),
            }
        }
    }

    fn finish(&self, best: Option<Vec<i64>>, complete: bool, started: Instant) -> SolveOutcome {
        debug!(complete, elapsed = ?started.elapsed(), "search finished");
        match (best, complete) {
            (Some(values), optimal) => SolveOutcome::Solved {
                solution: Solution::new(values),
                optimal,
            },
            (None, true) => SolveOutcome::Infeasible,
            (None, false) => SolveOutcome::Unknown,
        }
    }

    fn watchers(&self) -> Vec<Vec<usize>> {
        let mut w = vec![Vec::new(); self.var_count()];
        for (ci, c) in self.constraints.iter().enumerate() {
            for v in c.vars() {
                if w[v.0].last() != Some(&ci) {
                    w[v.0].push(ci);
                }
            }
        }
        w
    }

    /// Run propagators to a fixpoint.  With `all`, every constraint is
    /// scheduled; otherwise only the watchers of touched variables.
    fn propagate(
        &self,
        d: &mut Domains,
        watchers: &[Vec<usize>],
        all: bool,
    ) -> Result<(), Conflict> {
        let mut queued = vec![false; self.constraints.len()];
        let mut queue = VecDeque::new();

        fn schedule(ci: usize, queue: &mut VecDeque<usize>, queued: &mut [bool]) {
            if !queued[ci] {
                queued[ci] = true;
                queue.push_back(ci);
            }
        }

        if all {
            for ci in 0..self.constraints.len() {
                schedule(ci, &mut queue, &mut queued);
            }
        }
        for v in std::mem::take(&mut d.touched) {
            for &ci in &watchers[v] {
                schedule(ci, &mut queue, &mut queued);
            }
        }

        while let Some(ci) = queue.pop_front() {
            queued[ci] = false;
            self.constraints[ci].propagate(d)?;
            for v in std::mem::take(&mut d.touched) {
                for &cj in &watchers[v] {
                    schedule(cj, &mut queue, &mut queued);
                }
            }
        }
        Ok(())
    }

    fn dfs(&self, mut root: Domains, watchers: &[Vec<usize>], deadline: Option<Instant>) -> Search {
        if (0..root.lo.len()).any(|i| root.lo[i] > root.hi[i]) {
            return Search::Exhausted;
        }
        if self.propagate(&mut root, watchers, true).is_err() {
            return Search::Exhausted;
        }

        let mut stack = vec![root];
        let mut nodes = 0u64;

        while let Some(mut d) = stack.pop() {
            nodes += 1;
            if let Some(limit) = deadline {
                if Instant::now() >= limit {
                    debug!(nodes, "search deadline reached");
                    return Search::TimedOut;
                }
            }
            if self.propagate(&mut d, watchers, false).is_err() {
                continue;
            }

            let Some(var) = self.select(&d) else {
                if self.constraints.iter().all(|c| c.holds(&d.lo)) {
                    debug!(nodes, "assignment found");
                    return Search::Found(d.lo);
                }
                continue;
            };

            let x = IntVar(var);
            let value = match self.hints[var] {
                Some(h) if d.contains(x, h) => h,
                _ => d.min(x),
            };

            // pushed in reverse exploration order
            if value < d.max(x) {
                let mut above = d.clone();
                if above.set_min(x, value + 1).is_ok() {
                    stack.push(above);
                }
            }
            if value > d.min(x) {
                let mut below = d.clone();
                if below.set_max(x, value - 1).is_ok() {
                    stack.push(below);
                }
            }
            if d.fix(x, value).is_ok() {
                stack.push(d);
            }
        }
        debug!(nodes, "search space exhausted");
        Search::Exhausted
    }

    /// Unfixed variable with the smallest domain, lowest index first.
    fn select(&self, d: &Domains) -> Option<usize> {
        (0..d.lo.len())
            .filter(|&i| d.lo[i] < d.hi[i])
            .min_by_key(|&i| (d.size(i), i))
    }
}

impl Csp for Model {
    fn int_var(&mut self, name: &str, lb: i64, ub: i64) -> IntVar {
        let v = IntVar(self.names.len());
        self.names.push(name.to_string());
        self.lo.push(lb);
        self.hi.push(ub);
        self.hints.push(None);
        v
    }

    fn bool_var(&mut self, name: &str) -> BoolVar {
        BoolVar(self.int_var(name, 0, 1))
    }

    fn bool_constant(&mut self, name: &str, value: bool) -> BoolVar {
        let v = i64::from(value);
        BoolVar(self.int_var(name, v, v))
    }

    fn bounds(&self, v: IntVar) -> (i64, i64) {
        (self.lo[v.0], self.hi[v.0])
    }

    fn post(&mut self, c: Constraint) {
        // unary relations tighten the declared bounds directly
        if let Constraint::Rel(Rel { x, cmp, y: None, c: k }) = c {
            match cmp {
                Cmp::Eq => {
                    self.lo[x.0] = self.lo[x.0].max(k);
                    self.hi[x.0] = self.hi[x.0].min(k);
                    return;
                }
                Cmp::Le => {
                    self.hi[x.0] = self.hi[x.0].min(k);
                    return;
                }
                Cmp::Lt => {
                    self.hi[x.0] = self.hi[x.0].min(k - 1);
                    return;
                }
                Cmp::Ge => {
                    self.lo[x.0] = self.lo[x.0].max(k);
                    return;
                }
                Cmp::Gt => {
                    self.lo[x.0] = self.lo[x.0].max(k + 1);
                    return;
                }
                Cmp::Ne => {}
            }
        }
        self.constraints.push(c);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
