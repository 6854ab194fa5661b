//! The Simple Temporal Network.
//!
//! Timepoints are opaque ids; the network stores a distance window
//! `v − u ∈ [lo, hi]` for every ordered pair, kept path-consistent by PC-2.
//! Bounds carry dedicated infinities instead of sentinel magnitudes so
//! propagation cannot overflow. Additions are atomic: a constraint that
//! would make the network inconsistent is reported and not committed.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::duration::Ticks;

/// One end of a distance window. `MinusInf` and `PlusInf` are proper
/// values, never approximated by large ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bound {
    MinusInf,
    Finite(Ticks),
    PlusInf,
}

impl Bound {
    /// Saturating addition. Mixed infinities cannot arise from non-empty
    /// windows; `MinusInf` dominates if they ever meet.
    pub fn add(self, other: Bound) -> Bound {
        use Bound::*;
        match (self, other) {
            (MinusInf, _) | (_, MinusInf) => MinusInf,
            (PlusInf, _) | (_, PlusInf) => PlusInf,
            (Finite(a), Finite(b)) => Finite(a.saturating_add(b)),
        }
    }

    pub fn neg(self) -> Bound {
        match self {
            Bound::MinusInf => Bound::PlusInf,
            Bound::PlusInf => Bound::MinusInf,
            Bound::Finite(t) => Bound::Finite(-t),
        }
    }

    pub fn finite(self) -> Option<Ticks> {
        match self {
            Bound::Finite(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::MinusInf => write!(f, "-inf"),
            Bound::PlusInf => write!(f, "+inf"),
            Bound::Finite(t) => write!(f, "{t}"),
        }
    }
}

/// An inclusive distance interval `[lo, hi]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("[{lo}, {hi}]")]
pub struct Window {
    pub lo: Bound,
    pub hi: Bound,
}

impl Window {
    pub fn new(lo: Bound, hi: Bound) -> Self {
        Window { lo, hi }
    }

    pub fn unbounded() -> Self {
        Window {
            lo: Bound::MinusInf,
            hi: Bound::PlusInf,
        }
    }

    /// Exactly `t`: `[t, t]`.
    pub fn exact(t: Ticks) -> Self {
        Window {
            lo: Bound::Finite(t),
            hi: Bound::Finite(t),
        }
    }

    /// `[t, +inf)`.
    pub fn at_least(t: Ticks) -> Self {
        Window {
            lo: Bound::Finite(t),
            hi: Bound::PlusInf,
        }
    }

    /// `(-inf, t]`.
    pub fn at_most(t: Ticks) -> Self {
        Window {
            lo: Bound::MinusInf,
            hi: Bound::Finite(t),
        }
    }

    /// `[lo, hi]`, both finite.
    pub fn between(lo: Ticks, hi: Ticks) -> Self {
        Window {
            lo: Bound::Finite(lo),
            hi: Bound::Finite(hi),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn intersect(&self, other: Window) -> Window {
        Window {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    /// The composition `d(i,k) + d(k,j)` used by path tightening.
    pub fn path_add(&self, other: Window) -> Window {
        Window {
            lo: self.lo.add(other.lo),
            hi: self.hi.add(other.hi),
        }
    }

    /// The window of the reverse pair: `u − v ∈ [-hi, -lo]`.
    pub fn inverse(&self) -> Window {
        Window {
            lo: self.hi.neg(),
            hi: self.lo.neg(),
        }
    }

    pub fn contains(&self, t: Ticks) -> bool {
        self.lo <= Bound::Finite(t) && Bound::Finite(t) <= self.hi
    }

    pub fn contains_zero(&self) -> bool {
        self.contains(0)
    }
}

/// An opaque timepoint variable.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("t{_0}")]
pub struct Timepoint(u32);

impl Timepoint {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum StnError {
    #[display("unknown timepoint {timepoint}")]
    UnknownTimepoint { timepoint: Timepoint },
    #[display(
        "empty bound on ({from}, {to}): existing {existing} does not meet {added}"
    )]
    EmptyBound {
        from: Timepoint,
        to: Timepoint,
        existing: Window,
        added: Window,
    },
    #[display("negative cycle tightening ({from}, {to}) via {via}")]
    NegativeCycle {
        from: Timepoint,
        to: Timepoint,
        via: Timepoint,
    },
}

/// Summary of one propagation pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Propagation {
    /// Number of windows tightened before the fixed point.
    pub tightened: usize,
}

/// A Simple Temporal Network over [Timepoint]s, with the implicit origin
/// [Stn::ORIGIN] representing the wall-clock zero.
#[derive(Clone, Serialize, Deserialize)]
pub struct Stn {
    n: usize,
    /// Row-major `n × n` window matrix; `bounds[u * n + v]` is `d(u, v)`.
    bounds: Vec<Window>,
}

impl Stn {
    /// The wall-clock origin. Always present.
    pub const ORIGIN: Timepoint = Timepoint(0);

    pub fn new() -> Self {
        Stn {
            n: 1,
            bounds: vec![Window::exact(0)],
        }
    }

    /// Number of timepoints, origin included.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn timepoints(&self) -> impl Iterator<Item = Timepoint> + '_ {
        (0..self.n as u32).map(Timepoint)
    }

    /// Allocates a fresh, unconstrained timepoint.
    ///
    /// Two timepoints made equal by a `[0, 0]` constraint keep their
    /// distinct ids; nothing ever aliases.
    pub fn add_timepoint(&mut self) -> Timepoint {
        let old_n = self.n;
        let new_n = old_n + 1;
        let mut bounds = vec![Window::unbounded(); new_n * new_n];
        for u in 0..old_n {
            for v in 0..old_n {
                bounds[u * new_n + v] = self.bounds[u * old_n + v];
            }
        }
        bounds[old_n * new_n + old_n] = Window::exact(0);
        self.n = new_n;
        self.bounds = bounds;
        Timepoint(old_n as u32)
    }

    fn check(&self, t: Timepoint) -> Result<(), StnError> {
        if t.index() < self.n {
            Ok(())
        } else {
            Err(StnError::UnknownTimepoint { timepoint: t })
        }
    }

    /// The current window on `v − u`.
    pub fn window(&self, u: Timepoint, v: Timepoint) -> Window {
        self.bounds[u.index() * self.n + v.index()]
    }

    /// Intersects `v − u ∈ window` into the network and propagates to a
    /// fixed point. On inconsistency nothing is committed.
    pub fn add_constraint(
        &mut self,
        u: Timepoint,
        v: Timepoint,
        window: Window,
    ) -> Result<Propagation, StnError> {
        self.check(u)?;
        self.check(v)?;

        let mut tentative = self.bounds.clone();
        let mut tightened = 0;
        for (from, to, added) in [(u, v, window), (v, u, window.inverse())] {
            let slot = &mut tentative[from.index() * self.n + to.index()];
            let existing = *slot;
            let next = existing.intersect(added);
            if next.is_empty() {
                return Err(StnError::EmptyBound {
                    from,
                    to,
                    existing,
                    added,
                });
            }
            if next != existing {
                *slot = next;
                tightened += 1;
            }
        }

        let propagated = path_consistency(&mut tentative, self.n).map_err(|(i, j, k)| {
            StnError::NegativeCycle {
                from: Timepoint(i as u32),
                to: Timepoint(j as u32),
                via: Timepoint(k as u32),
            }
        })?;

        self.bounds = tentative;
        Ok(Propagation {
            tightened: tightened + propagated.tightened,
        })
    }

    /// Runs path consistency to a fixed point.
    ///
    /// The network is already propagated after every successful
    /// [add_constraint][Stn::add_constraint]; this is the explicit form.
    pub fn solve(&mut self) -> Result<Propagation, StnError> {
        let mut bounds = std::mem::take(&mut self.bounds);
        let result = path_consistency(&mut bounds, self.n);
        self.bounds = bounds;
        result.map_err(|(i, j, k)| StnError::NegativeCycle {
            from: Timepoint(i as u32),
            to: Timepoint(j as u32),
            via: Timepoint(k as u32),
        })
    }

    /// True when every self-distance contains zero and no window is empty.
    pub fn consistent(&self) -> bool {
        for u in 0..self.n {
            if !self.bounds[u * self.n + u].contains_zero() {
                return false;
            }
            for v in 0..self.n {
                if self.bounds[u * self.n + v].is_empty() {
                    return false;
                }
            }
        }
        true
    }

    /// The earliest realisable tick of `t`, relative to the origin.
    pub fn earliest(&self, t: Timepoint) -> Bound {
        self.window(Self::ORIGIN, t).lo
    }

    /// The latest realisable tick of `t`, relative to the origin.
    pub fn latest(&self, t: Timepoint) -> Bound {
        self.window(Self::ORIGIN, t).hi
    }
}

impl Default for Stn {
    fn default() -> Self {
        Stn::new()
    }
}

impl fmt::Debug for Stn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stn({} timepoints)", self.n)?;
        for u in 0..self.n {
            for v in 0..self.n {
                let w = self.bounds[u * self.n + v];
                if u != v && w != Window::unbounded() {
                    writeln!(f, "  t{v} - t{u} in {w}")?;
                }
            }
        }
        Ok(())
    }
}

/// PC-2: tighten every `d(i,j)` by `d(i,k) + d(k,j)` until a stable pass.
///
/// Returns the offending `(i, j, k)` when a window empties (which includes
/// a self-distance losing zero).
fn path_consistency(bounds: &mut [Window], n: usize) -> Result<Propagation, (usize, usize, usize)> {
    let mut tightened = 0;
    loop {
        let mut changed = false;
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let through = bounds[i * n + k].path_add(bounds[k * n + j]);
                    let current = bounds[i * n + j];
                    let next = current.intersect(through);
                    if next != current {
                        if next.is_empty() {
                            return Err((i, j, k));
                        }
                        bounds[i * n + j] = next;
                        changed = true;
                        tightened += 1;
                    }
                }
            }
        }
        if !changed {
            return Ok(Propagation { tightened });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query() {
        let mut stn = Stn::new();
        let a = stn.add_timepoint();
        let b = stn.add_timepoint();
        stn.add_constraint(Stn::ORIGIN, a, Window::between(0, 10)).unwrap();
        stn.add_constraint(a, b, Window::between(2, 5)).unwrap();

        assert!(stn.consistent());
        assert_eq!(stn.earliest(b), Bound::Finite(2));
        assert_eq!(stn.latest(b), Bound::Finite(15));
        assert_eq!(stn.window(b, a).lo, Bound::Finite(-5));
    }

    #[test]
    fn inconsistent_addition_is_not_committed() {
        let mut stn = Stn::new();
        let a = stn.add_timepoint();
        let b = stn.add_timepoint();
        stn.add_constraint(a, b, Window::between(5, 10)).unwrap();
        let before = stn.window(a, b);

        let err = stn.add_constraint(b, a, Window::between(0, 2)).unwrap_err();
        assert!(matches!(
            err,
            StnError::EmptyBound { .. } | StnError::NegativeCycle { .. }
        ));
        assert_eq!(stn.window(a, b), before);
        assert!(stn.consistent());
    }

    #[test]
    fn negative_cycle_through_third_point() {
        let mut stn = Stn::new();
        let a = stn.add_timepoint();
        let b = stn.add_timepoint();
        let c = stn.add_timepoint();
        stn.add_constraint(a, b, Window::at_least(3)).unwrap();
        stn.add_constraint(b, c, Window::at_least(3)).unwrap();
        // a..c must span at least 6; capping it at 4 is a cycle.
        let err = stn.add_constraint(a, c, Window::at_most(4)).unwrap_err();
        assert!(matches!(
            err,
            StnError::NegativeCycle { .. } | StnError::EmptyBound { .. }
        ));
        assert!(stn.consistent());
    }

    #[test]
    fn equated_timepoints_keep_their_ids() {
        let mut stn = Stn::new();
        let a = stn.add_timepoint();
        let b = stn.add_timepoint();
        stn.add_constraint(a, b, Window::exact(0)).unwrap();
        stn.add_constraint(Stn::ORIGIN, a, Window::exact(7)).unwrap();

        assert_ne!(a, b);
        assert_eq!(stn.earliest(b), Bound::Finite(7));
        assert_eq!(stn.latest(b), Bound::Finite(7));
    }

    #[test]
    fn derived_bounds_respect_pair_windows() {
        let mut stn = Stn::new();
        let u = stn.add_timepoint();
        let v = stn.add_timepoint();
        stn.add_constraint(Stn::ORIGIN, u, Window::between(1, 4)).unwrap();
        stn.add_constraint(u, v, Window::between(10, 20)).unwrap();
        stn.solve().unwrap();

        let (Bound::Finite(ev), Bound::Finite(lu)) = (stn.earliest(v), stn.latest(u)) else {
            panic!("expected finite bounds");
        };
        let Bound::Finite(upper) = stn.window(u, v).hi else {
            panic!("expected finite upper");
        };
        assert!(ev - lu <= upper);
    }

    #[test]
    fn self_constraint_must_contain_zero() {
        let mut stn = Stn::new();
        let a = stn.add_timepoint();
        assert!(stn.add_constraint(a, a, Window::between(1, 2)).is_err());
        assert!(stn.add_constraint(a, a, Window::between(0, 0)).is_ok());
    }
}
