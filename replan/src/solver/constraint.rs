/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Declarative constraints and their bounds propagators.
//!
//! | Constraint | Meaning |
//! |---|---|
//! | `Rel` | `x ⋈ y + c` or `x ⋈ c` with `⋈ ∈ {=, ≠, <, ≤, >, ≥}` |
//! | `Implies` | `lit ⇒ rel` |
//! | `Reify` | `b ⇔ rel` |
//! | `Or` | `b ⇔ (b₁ ∨ … ∨ bₙ)` |
//! | `Times` | `z = k` if `lit` holds, `z = 0` otherwise |
//! | `Element` | `y = table[index]` |
//! | `Task` | `end = start + duration` |
//! | `Count` | `count = #{ i : vars[i] = value }` |
//!
//! Propagators only narrow interval bounds.  A hole in the middle of a
//! domain is never represented; search instantiates every variable, and a
//! full assignment is checked against [`Constraint::holds`].

use super::engine::{Conflict, Domains};
use super::{BoolVar, IntVar};

// ── Relations ─────────────────────────────────────────────────────────────────

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn negate(self) -> Cmp {
        match self {
            Cmp::Eq => Cmp::Ne,
            Cmp::Ne => Cmp::Eq,
            Cmp::Lt => Cmp::Ge,
            Cmp::Le => Cmp::Gt,
            Cmp::Gt => Cmp::Le,
            Cmp::Ge => Cmp::Lt,
        }
    }

    fn test(self, a: i64, b: i64) -> bool {
        match self {
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
        }
    }
}

/// Arithmetic relation `x ⋈ y + c` (or `x ⋈ c` when `y` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel {
    pub x: IntVar,
    pub cmp: Cmp,
    pub y: Option<IntVar>,
    pub c: i64,
}

impl Rel {
    /// `x ⋈ y`
    pub fn vars(x: IntVar, cmp: Cmp, y: IntVar) -> Self {
        Self::offset(x, cmp, y, 0)
    }

    /// `x ⋈ y + c`
    pub fn offset(x: IntVar, cmp: Cmp, y: IntVar, c: i64) -> Self {
        Rel {
            x,
            cmp,
            y: Some(y),
            c,
        }
    }

    /// `x ⋈ c`
    pub fn constant(x: IntVar, cmp: Cmp, c: i64) -> Self {
        Rel { x, cmp, y: None, c }
    }

    pub fn negate(self) -> Self {
        Rel {
            cmp: self.cmp.negate(),
            ..self
        }
    }

    fn rhs_bounds(&self, d: &Domains) -> (i64, i64) {
        match self.y {
            Some(y) => (d.min(y) + self.c, d.max(y) + self.c),
            None => (self.c, self.c),
        }
    }

    /// `Some(true)` if every remaining assignment satisfies the relation,
    /// `Some(false)` if none does, `None` otherwise.
    pub(crate) fn status(&self, d: &Domains) -> Option<bool> {
        let (xl, xh) = (d.min(self.x), d.max(self.x));
        let (rl, rh) = self.rhs_bounds(d);
        match self.cmp {
            Cmp::Eq => {
                if xl == xh && rl == rh {
                    Some(xl == rl)
                } else if xh < rl || xl > rh {
                    Some(false)
                } else {
                    None
                }
            }
            Cmp::Ne => self.negate().status(d).map(|s| !s),
            Cmp::Le => decide(xh <= rl, xl > rh),
            Cmp::Lt => decide(xh < rl, xl >= rh),
            Cmp::Ge => decide(xl >= rh, xh < rl),
            Cmp::Gt => decide(xl > rh, xh <= rl),
        }
    }

    /// Narrow the bounds of `x` (and `y`) so the relation can hold.
    pub(crate) fn propagate(&self, d: &mut Domains) -> Result<bool, Conflict> {
        let (rl, rh) = self.rhs_bounds(d);
        let mut changed = false;
        match self.cmp {
            Cmp::Eq => {
                changed |= d.set_min(self.x, rl)?;
                changed |= d.set_max(self.x, rh)?;
                if let Some(y) = self.y {
                    let (xl, xh) = (d.min(self.x), d.max(self.x));
                    changed |= d.set_min(y, xl - self.c)?;
                    changed |= d.set_max(y, xh - self.c)?;
                }
            }
            Cmp::Le | Cmp::Lt => {
                let strict = i64::from(self.cmp == Cmp::Lt);
                changed |= d.set_max(self.x, rh - strict)?;
                if let Some(y) = self.y {
                    changed |= d.set_min(y, d.min(self.x) - self.c + strict)?;
                }
            }
            Cmp::Ge | Cmp::Gt => {
                let strict = i64::from(self.cmp == Cmp::Gt);
                changed |= d.set_min(self.x, rl + strict)?;
                if let Some(y) = self.y {
                    changed |= d.set_max(y, d.max(self.x) - self.c - strict)?;
                }
            }
            Cmp::Ne => {
                if rl == rh {
                    changed |= d.remove(self.x, rl)?;
                }
                if let Some(y) = self.y {
                    if d.is_fixed(self.x) {
                        changed |= d.remove(y, d.min(self.x) - self.c)?;
                    }
                }
            }
        }
        Ok(changed)
    }

    pub(crate) fn holds(&self, values: &[i64]) -> bool {
        let rhs = self.y.map(|y| values[y.0]).unwrap_or(0) + self.c;
        self.cmp.test(values[self.x.0], rhs)
    }
}

fn decide(entailed: bool, disentailed: bool) -> Option<bool> {
    if entailed {
        Some(true)
    } else if disentailed {
        Some(false)
    } else {
        None
    }
}

// ── Literals ──────────────────────────────────────────────────────────────────

/// A boolean variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lit {
    pub var: BoolVar,
    pub positive: bool,
}

impl Lit {
    pub fn pos(var: BoolVar) -> Self {
        Lit {
            var,
            positive: true,
        }
    }

    pub fn neg(var: BoolVar) -> Self {
        Lit {
            var,
            positive: false,
        }
    }

    fn value_when_true(&self) -> i64 {
        i64::from(self.positive)
    }

    fn status(&self, d: &Domains) -> Option<bool> {
        let v = self.var.0;
        d.is_fixed(v)
            .then(|| d.min(v) == self.value_when_true())
    }

    fn set(&self, d: &mut Domains, truth: bool) -> Result<bool, Conflict> {
        let target = if truth {
            self.value_when_true()
        } else {
            1 - self.value_when_true()
        };
        d.fix(self.var.0, target)
    }

    fn holds(&self, values: &[i64]) -> bool {
        values[self.var.0.0] == self.value_when_true()
    }
}

// ── Constraints ───────────────────────────────────────────────────────────────

/// A constraint posted into a [`Csp`](super::Csp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Rel(Rel),

    /// `lit ⇒ rel`
    Implies { lit: Lit, rel: Rel },

    /// `b ⇔ rel`
    Reify { b: BoolVar, rel: Rel },

    /// `b ⇔ OR(of)`
    Or { b: BoolVar, of: Vec<BoolVar> },

    /// `z = lit ? k : 0`
    Times { lit: Lit, k: i64, z: IntVar },

    /// `y = table[index]`
    Element {
        y: IntVar,
        table: Vec<IntVar>,
        index: IntVar,
    },

    /// `end = start + duration`, with `duration >= 0`.
    Task {
        start: IntVar,
        duration: IntVar,
        end: IntVar,
    },

    /// `count = #{ v ∈ vars : v = value }`
    Count {
        vars: Vec<IntVar>,
        value: i64,
        count: IntVar,
    },
}

impl Constraint {
    pub fn rel(x: IntVar, cmp: Cmp, y: IntVar) -> Self {
        Constraint::Rel(Rel::vars(x, cmp, y))
    }

    pub fn rel_const(x: IntVar, cmp: Cmp, c: i64) -> Self {
        Constraint::Rel(Rel::constant(x, cmp, c))
    }

    pub fn task(start: IntVar, duration: IntVar, end: IntVar) -> Self {
        Constraint::Task {
            start,
            duration,
            end,
        }
    }

    /// Every variable the constraint reads.
    pub(crate) fn vars(&self) -> Vec<IntVar> {
        fn rel_vars(r: &Rel, out: &mut Vec<IntVar>) {
            out.push(r.x);
            out.extend(r.y);
        }
        let mut out = Vec::new();
        match self {
            Constraint::Rel(r) => rel_vars(r, &mut out),
            Constraint::Implies { lit, rel } => {
                out.push(lit.var.0);
                rel_vars(rel, &mut out);
            }
            Constraint::Reify { b, rel } => {
                out.push(b.0);
                rel_vars(rel, &mut out);
            }
            Constraint::Or { b, of } => {
                out.push(b.0);
                out.extend(of.iter().map(|x| x.0));
            }
            Constraint::Times { lit, z, .. } => out.extend([lit.var.0, *z]),
            Constraint::Element { y, table, index } => {
                out.push(*y);
                out.push(*index);
                out.extend(table.iter().copied());
            }
            Constraint::Task {
                start,
                duration,
                end,
            } => out.extend([*start, *duration, *end]),
            Constraint::Count { vars, count, .. } => {
                out.extend(vars.iter().copied());
                out.push(*count);
            }
        }
        out
    }

    /// Propagate once.  Returns whether any bound moved.
    pub(crate) fn propagate(&self, d: &mut Domains) -> Result<bool, Conflict> {
        match self {
            Constraint::Rel(r) => r.propagate(d),

            Constraint::Implies { lit, rel } => match lit.status(d) {
                Some(true) => rel.propagate(d),
                Some(false) => Ok(false),
                None => match rel.status(d) {
                    Some(false) => lit.set(d, false),
                    _ => Ok(false),
                },
            },

            Constraint::Reify { b, rel } => match Lit::pos(*b).status(d) {
                Some(true) => rel.propagate(d),
                Some(false) => rel.negate().propagate(d),
                None => match rel.status(d) {
                    Some(s) => Lit::pos(*b).set(d, s),
                    None => Ok(false),
                },
            },

            Constraint::Or { b, of } => propagate_or(*b, of, d),

            Constraint::Times { lit, k, z } => {
                let (lo, hi) = ((*k).min(0), (*k).max(0));
                let mut changed = d.set_min(*z, lo)?;
                changed |= d.set_max(*z, hi)?;
                match lit.status(d) {
                    Some(true) => changed |= d.fix(*z, *k)?,
                    Some(false) => changed |= d.fix(*z, 0)?,
                    None => {
                        if *k != 0 && !d.contains(*z, 0) {
                            changed |= lit.set(d, true)?;
                        } else if *k != 0 && !d.contains(*z, *k) {
                            changed |= lit.set(d, false)?;
                        }
                    }
                }
                Ok(changed)
            }

            Constraint::Element { y, table, index } => propagate_element(*y, table, *index, d),

            Constraint::Task {
                start,
                duration,
                end,
            } => {
                let mut changed = d.set_min(*duration, 0)?;
                changed |= d.set_min(*end, d.min(*start) + d.min(*duration))?;
                changed |= d.set_max(*end, d.max(*start) + d.max(*duration))?;
                changed |= d.set_min(*start, d.min(*end) - d.max(*duration))?;
                changed |= d.set_max(*start, d.max(*end) - d.min(*duration))?;
                changed |= d.set_min(*duration, d.min(*end) - d.max(*start))?;
                changed |= d.set_max(*duration, d.max(*end) - d.min(*start))?;
                Ok(changed)
            }

            Constraint::Count { vars, value, count } => propagate_count(vars, *value, *count, d),
        }
    }

    /// Check the constraint against a full assignment.
    pub(crate) fn holds(&self, v: &[i64]) -> bool {
        match self {
            Constraint::Rel(r) => r.holds(v),
            Constraint::Implies { lit, rel } => !lit.holds(v) || rel.holds(v),
            Constraint::Reify { b, rel } => Lit::pos(*b).holds(v) == rel.holds(v),
            Constraint::Or { b, of } => {
                Lit::pos(*b).holds(v) == of.iter().any(|x| Lit::pos(*x).holds(v))
            }
            Constraint::Times { lit, k, z } => {
                v[z.0] == if lit.holds(v) { *k } else { 0 }
            }
            Constraint::Element { y, table, index } => {
                let i = v[index.0];
                usize::try_from(i)
                    .ok()
                    .and_then(|i| table.get(i))
                    .map_or(false, |t| v[t.0] == v[y.0])
            }
            Constraint::Task {
                start,
                duration,
                end,
            } => v[duration.0] >= 0 && v[end.0] == v[start.0] + v[duration.0],
            Constraint::Count { vars, value, count } => {
                let n = vars.iter().filter(|x| v[x.0] == *value).count();
                i64::try_from(n).map_or(false, |n| n == v[count.0])
            }
        }
    }
}

fn propagate_or(b: BoolVar, of: &[BoolVar], d: &mut Domains) -> Result<bool, Conflict> {
    let any_true = of.iter().any(|x| Lit::pos(*x).status(d) == Some(true));
    let open: Vec<BoolVar> = of
        .iter()
        .copied()
        .filter(|x| Lit::pos(*x).status(d).is_none())
        .collect();

    if any_true {
        return Lit::pos(b).set(d, true);
    }
    if open.is_empty() {
        return Lit::pos(b).set(d, false);
    }
    match Lit::pos(b).status(d) {
        Some(false) => {
            let mut changed = false;
            for x in open {
                changed |= Lit::pos(x).set(d, false)?;
            }
            Ok(changed)
        }
        Some(true) if open.len() == 1 => Lit::pos(open[0]).set(d, true),
        _ => Ok(false),
    }
}

fn propagate_element(
    y: IntVar,
    table: &[IntVar],
    index: IntVar,
    d: &mut Domains,
) -> Result<bool, Conflict> {
    let last = i64::try_from(table.len()).map_err(|_| Conflict)? - 1;
    let mut changed = d.set_min(index, 0)?;
    changed |= d.set_max(index, last)?;

    let compatible = |d: &Domains, i: i64| {
        let t = table[i as usize];
        d.max(t) >= d.min(y) && d.min(t) <= d.max(y)
    };

    // shrink the index from both ends
    while d.min(index) <= d.max(index) && !compatible(d, d.min(index)) {
        changed |= d.set_min(index, d.min(index) + 1)?;
    }
    while d.max(index) >= d.min(index) && !compatible(d, d.max(index)) {
        changed |= d.set_max(index, d.max(index) - 1)?;
    }

    // y is within the hull of the remaining candidates
    let (mut lo, mut hi) = (i64::MAX, i64::MIN);
    for i in d.min(index)..=d.max(index) {
        if compatible(d, i) {
            let t = table[i as usize];
            lo = lo.min(d.min(t));
            hi = hi.max(d.max(t));
        }
    }
    if lo > hi {
        return Err(Conflict);
    }
    changed |= d.set_min(y, lo)?;
    changed |= d.set_max(y, hi)?;

    if d.is_fixed(index) {
        let t = table[d.min(index) as usize];
        changed |= Rel::vars(y, Cmp::Eq, t).propagate(d)?;
    }
    Ok(changed)
}

fn propagate_count(
    vars: &[IntVar],
    value: i64,
    count: IntVar,
    d: &mut Domains,
) -> Result<bool, Conflict> {
    let sure = vars
        .iter()
        .filter(|v| d.is_fixed(**v) && d.min(**v) == value)
        .count() as i64;
    let possible = vars.iter().filter(|v| d.contains(**v, value)).count() as i64;

    let mut changed = d.set_min(count, sure)?;
    changed |= d.set_max(count, possible)?;

    if d.max(count) == sure {
        for v in vars {
            if !d.is_fixed(*v) {
                changed |= d.remove(*v, value)?;
            }
        }
    } else if d.min(count) == possible {
        for v in vars {
            if d.contains(*v, value) {
                changed |= d.fix(*v, value)?;
            }
        }
    }
    Ok(changed)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn doms(bounds: &[(i64, i64)]) -> Domains {
        Domains::new(
            bounds.iter().map(|b| b.0).collect(),
            bounds.iter().map(|b| b.1).collect(),
        )
    }

    fn v(i: usize) -> IntVar {
        IntVar(i)
    }

    fn b(i: usize) -> BoolVar {
        BoolVar(IntVar(i))
    }

    #[test]
    fn le_with_offset_narrows_both_sides() {
        // x <= y + 2, x ∈ [5, 10], y ∈ [0, 6]
        let mut d = doms(&[(5, 10), (0, 6)]);
        Rel::offset(v(0), Cmp::Le, v(1), 2).propagate(&mut d).unwrap();
        assert_eq!((d.min(v(0)), d.max(v(0))), (5, 8));
        assert_eq!((d.min(v(1)), d.max(v(1))), (3, 6));
    }

    #[test]
    fn disjoint_equality_is_a_conflict() {
        let mut d = doms(&[(0, 3), (5, 9)]);
        assert!(Rel::vars(v(0), Cmp::Eq, v(1)).propagate(&mut d).is_err());
    }

    #[test]
    fn ne_trims_a_bound_only() {
        let mut d = doms(&[(2, 5)]);
        Rel::constant(v(0), Cmp::Ne, 2).propagate(&mut d).unwrap();
        assert_eq!(d.min(v(0)), 3);
        // a value in the middle is left for the search
        Rel::constant(v(0), Cmp::Ne, 4).propagate(&mut d).unwrap();
        assert_eq!((d.min(v(0)), d.max(v(0))), (3, 5));
    }

    #[test]
    fn reify_decides_the_boolean_once_entailed() {
        let mut d = doms(&[(0, 1), (7, 7)]);
        let c = Constraint::Reify {
            b: b(0),
            rel: Rel::constant(v(1), Cmp::Eq, 7),
        };
        c.propagate(&mut d).unwrap();
        assert_eq!(d.min(v(0)), 1);
    }

    #[test]
    fn implies_falsifies_the_literal_when_relation_is_impossible() {
        let mut d = doms(&[(0, 1), (3, 4)]);
        let c = Constraint::Implies {
            lit: Lit::pos(b(0)),
            rel: Rel::constant(v(1), Cmp::Eq, 0),
        };
        c.propagate(&mut d).unwrap();
        assert_eq!(d.max(v(0)), 0);
    }

    #[test]
    fn times_with_negative_literal() {
        // z = !b ? 5 : 0, b fixed to 0 → z = 5
        let mut d = doms(&[(0, 0), (0, 100)]);
        let c = Constraint::Times {
            lit: Lit::neg(b(0)),
            k: 5,
            z: v(1),
        };
        c.propagate(&mut d).unwrap();
        assert!(d.is_fixed(v(1)));
        assert_eq!(d.min(v(1)), 5);
    }

    #[test]
    fn element_with_fixed_index_links_both_variables() {
        // y = [t0, t1][i], i = 1, t1 ∈ [4, 9], y ∈ [0, 6]
        let mut d = doms(&[(0, 6), (0, 0), (4, 9), (1, 1)]);
        let c = Constraint::Element {
            y: v(0),
            table: vec![v(1), v(2)],
            index: v(3),
        };
        c.propagate(&mut d).unwrap();
        assert_eq!((d.min(v(0)), d.max(v(0))), (4, 6));
        assert_eq!((d.min(v(2)), d.max(v(2))), (4, 6));
    }

    #[test]
    fn element_prunes_incompatible_index() {
        // y ∈ [3, 3], table = [0, 3] → index = 1
        let mut d = doms(&[(3, 3), (0, 0), (3, 3), (0, 1)]);
        let c = Constraint::Element {
            y: v(0),
            table: vec![v(1), v(2)],
            index: v(3),
        };
        c.propagate(&mut d).unwrap();
        assert_eq!(d.min(v(3)), 1);
    }

    #[test]
    fn task_keeps_end_consistent() {
        let mut d = doms(&[(2, 10), (5, 5), (0, 9)]);
        Constraint::task(v(0), v(1), v(2)).propagate(&mut d).unwrap();
        assert_eq!((d.min(v(2)), d.max(v(2))), (7, 9));
        assert_eq!((d.min(v(0)), d.max(v(0))), (2, 4));
    }

    #[test]
    fn count_forces_remaining_vars_when_tight() {
        // two hosters in [0, 1], count of value 0 must be 0 → both = 1
        let mut d = doms(&[(0, 1), (0, 1), (0, 0)]);
        let c = Constraint::Count {
            vars: vec![v(0), v(1)],
            value: 0,
            count: v(2),
        };
        c.propagate(&mut d).unwrap();
        assert_eq!(d.min(v(0)), 1);
        assert_eq!(d.min(v(1)), 1);
    }

    #[test]
    fn or_propagates_both_ways() {
        let mut d = doms(&[(0, 1), (0, 0), (0, 1)]);
        let c = Constraint::Or {
            b: b(0),
            of: vec![b(1), b(2)],
        };
        // b forced true, only b2 open → b2 = 1
        d.fix(v(0), 1).unwrap();
        c.propagate(&mut d).unwrap();
        assert_eq!(d.min(v(2)), 1);
    }

    #[test]
    fn holds_checks_full_assignments() {
        let c = Constraint::Element {
            y: v(0),
            table: vec![v(1), v(2)],
            index: v(3),
        };
        assert!(c.holds(&[4, 0, 4, 1]));
        assert!(!c.holds(&[4, 0, 4, 0]));
        assert!(!c.holds(&[4, 0, 4, 2]));
    }
}
