//! Allen's interval algebra, expressed as endpoint distance constraints.
//!
//! Each of the thirteen relations between intervals `X = [xs, xe]` and
//! `Y = [ys, ye]` maps to a conjunction of windows on endpoint pairs,
//! ready to post into the [Stn][crate::stn::Stn]. The mapping is
//! invertible; [AllenRelation::from_constraints] recovers the relation.

use crate::stn::{Timepoint, Window};
use enum_iterator::{Sequence, all};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// The thirteen qualitative relations between two intervals.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize, PartialOrd, Ord,
)]
pub enum AllenRelation {
    Before,
    Meets,
    Overlaps,
    FinishedBy,
    Contains,
    Starts,
    Equals,
    StartedBy,
    During,
    Finishes,
    OverlappedBy,
    MetBy,
    After,
}

/// One `to − from ∈ window` constraint on interval endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceConstraint {
    pub from: Timepoint,
    pub to: Timepoint,
    pub window: Window,
}

pub type ConstraintSet = SmallVec<DistanceConstraint, 4>;

fn distance(from: Timepoint, to: Timepoint, window: Window) -> DistanceConstraint {
    DistanceConstraint { from, to, window }
}

/// Converts `X relation Y` into distance constraints over the four
/// endpoints. Strict precedence is one tick or more.
pub fn relation_to_constraints(
    relation: AllenRelation,
    x_start: Timepoint,
    x_end: Timepoint,
    y_start: Timepoint,
    y_end: Timepoint,
) -> ConstraintSet {
    use AllenRelation::*;
    let after = Window::at_least(1);
    let zero = Window::exact(0);
    let mut out = ConstraintSet::new();
    match relation {
        Before => out.push(distance(x_end, y_start, after)),
        Meets => out.push(distance(x_end, y_start, zero)),
        Overlaps => {
            out.push(distance(x_start, y_start, after));
            out.push(distance(y_start, x_end, after));
            out.push(distance(x_end, y_end, after));
        }
        FinishedBy => {
            out.push(distance(x_start, y_start, after));
            out.push(distance(x_end, y_end, zero));
        }
        Contains => {
            out.push(distance(x_start, y_start, after));
            out.push(distance(y_end, x_end, after));
        }
        Starts => {
            out.push(distance(x_start, y_start, zero));
            out.push(distance(x_end, y_end, after));
        }
        Equals => {
            out.push(distance(x_start, y_start, zero));
            out.push(distance(x_end, y_end, zero));
        }
        StartedBy => {
            out.push(distance(x_start, y_start, zero));
            out.push(distance(y_end, x_end, after));
        }
        During => {
            out.push(distance(y_start, x_start, after));
            out.push(distance(x_end, y_end, after));
        }
        Finishes => {
            out.push(distance(y_start, x_start, after));
            out.push(distance(x_end, y_end, zero));
        }
        OverlappedBy => {
            out.push(distance(y_start, x_start, after));
            out.push(distance(x_start, y_end, after));
            out.push(distance(y_end, x_end, after));
        }
        MetBy => out.push(distance(y_end, x_start, zero)),
        After => out.push(distance(y_end, x_start, after)),
    }
    out
}

impl AllenRelation {
    pub fn name(self) -> &'static str {
        use AllenRelation::*;
        match self {
            Before => "before",
            Meets => "meets",
            Overlaps => "overlaps",
            FinishedBy => "finished-by",
            Contains => "contains",
            Starts => "starts",
            Equals => "equals",
            StartedBy => "started-by",
            During => "during",
            Finishes => "finishes",
            OverlappedBy => "overlapped-by",
            MetBy => "met-by",
            After => "after",
        }
    }

    /// The converse relation, `Y relation X`.
    pub fn converse(self) -> AllenRelation {
        use AllenRelation::*;
        match self {
            Before => After,
            Meets => MetBy,
            Overlaps => OverlappedBy,
            FinishedBy => Finishes,
            Contains => During,
            Starts => StartedBy,
            Equals => Equals,
            StartedBy => Starts,
            During => Contains,
            Finishes => FinishedBy,
            OverlappedBy => Overlaps,
            MetBy => Meets,
            After => Before,
        }
    }

    /// Recovers the relation whose constraint set over the same endpoints
    /// equals `constraints`, comparing as unordered conjunctions.
    pub fn from_constraints(
        constraints: &[DistanceConstraint],
        x_start: Timepoint,
        x_end: Timepoint,
        y_start: Timepoint,
        y_end: Timepoint,
    ) -> Option<AllenRelation> {
        all::<AllenRelation>().find(|relation| {
            let generated = relation_to_constraints(*relation, x_start, x_end, y_start, y_end);
            generated.len() == constraints.len()
                && generated.iter().all(|c| constraints.contains(c))
        })
    }
}

impl fmt::Display for AllenRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AllenRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<AllenRelation>()
            .find(|r| r.name() == s)
            .ok_or_else(|| format!("unknown Allen relation {s:?}"))
    }
}

/// A named occupancy of the timeline: two timepoints with `start ≤ end`.
///
/// Created when a durative action is expanded; it lives and dies with the
/// plan that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: IntervalId,
    pub start: Timepoint,
    pub end: Timepoint,
    pub label: String,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    derive_more::Display,
)]
#[display("i{_0}")]
pub struct IntervalId(u32);

impl IntervalId {
    pub(crate) fn new(raw: u32) -> Self {
        IntervalId(raw)
    }
}
