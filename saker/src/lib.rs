//! # Saker
//!
//! A hybrid hierarchical task network planner with interleaved temporal
//! constraint solving.
//!
//! Saker turns a declarative goal (a set of desired facts, optionally
//! under deadlines) into an ordered sequence of primitive actions that
//! achieves it against a mutable world state. Three pieces cooperate:
//!
//! - a depth-first **HTN search** that decomposes tasks and goals through
//!   user-supplied methods, backtracking over alternative decompositions;
//! - a **Simple Temporal Network** that tracks interval endpoints and
//!   pairwise distance bounds, kept consistent by path-consistency
//!   propagation as actions are expanded, so temporal infeasibility
//!   prunes branches during the search rather than after it;
//! - a relational **fact store** of `(predicate, subject, value)` triples
//!   that methods query and primitive actions rewrite.
//!
//! The planner is a value machine: states, networks, and entity
//! allocations are cloned at every choice point, so backtracking never
//! undoes anything in place, and concurrent planning calls share nothing
//! but the immutable [Domain].
//!
//! ## Quick-start
//!
//! Declare a domain, then hand [plan] (or [run], which also executes) an
//! initial state and a todo list:
//!
//! ```
//! use saker::{Domain, PlanOptions, State, Todo, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let domain = Domain::builder("switches")
//!     .action("flip", |state, args| {
//!         let switch = args[0].as_str().ok_or_else(|| saker::anyhow!("expected a name"))?;
//!         let on = state.get("on", switch).and_then(|v| v.as_bool()).unwrap_or(false);
//!         let mut next = state.clone();
//!         next.set("on", switch, !on);
//!         Ok(next)
//!     })
//!     .unigoal_method("on", "toggle_once", |_state, subject, _value| {
//!         Ok(vec![Todo::action("flip", [subject])])
//!     })
//!     .build()?;
//!
//! let mut state = State::new();
//! state.set("on", "lamp", false);
//!
//! let plan = saker::plan(
//!     &domain,
//!     state,
//!     vec![Todo::unigoal("on", "lamp", true)],
//!     &PlanOptions::default(),
//! )?;
//!
//! assert_eq!(plan.primitives().len(), 1);
//! assert_eq!(plan.final_state.get("on", "lamp"), Some(&Value::Bool(true)));
//! # Ok(())
//! # }
//! ```
//!
//! Actions and methods are plain closures over `(&State, args)` returning
//! [`Result`]: return an error to mark the action inapplicable or the
//! method not relevant, and the search tries the next alternative. Goal
//! methods are verified after the fact: a method that claims success
//! without making its goal true is treated as having failed.
//!
//! ## Time
//!
//! Give an action a [DurationSpec] (fixed, `[min, max]`, or conditional
//! on the state) and the search allocates start/end timepoints for it in
//! the [Stn], chains it after the previous durative action, and posts any
//! extra [ConstraintSpec]s such as deadlines. Durations come from
//! calendar literals (`"PT1H30M"`), whole-second ticks, or
//! [hifitime::Duration] values.
//!
//! ## Execution
//!
//! [run_tree] walks the finished tree's action leaves in DFS order,
//! applying each to the running state. A failing action triggers
//! re-planning of the untraversed remainder from the current state, under
//! a replan budget. Cancellation is cooperative, between actions only.

pub mod domain;
pub mod duration;
pub mod error;
pub mod exec;
pub mod interval;
pub mod optimize;
pub mod search;
pub mod state;
pub mod stn;
mod trace;
pub mod tree;

pub use crate::domain::{
    Action, ActionFn, ActionMeta, ConstraintSpec, Domain, DomainBuilder, DomainError, EndpointRef,
    Entity, EntityRegistry, EntityRequirement, EntityType, MultigoalMethod, MultigoalMethodFn,
    TaskMethod, TaskMethodFn, Todo, UnigoalMethod, UnigoalMethodFn,
};
pub use crate::duration::{
    DurationError, DurationSpec, Ticks, duration_to_ticks, format_duration, parse_duration,
    ticks_to_duration,
};
pub use crate::error::PlanError;
pub use crate::exec::{Execution, run, run_tree};
pub use crate::interval::{
    AllenRelation, ConstraintSet, DistanceConstraint, Interval, IntervalId,
    relation_to_constraints,
};
pub use crate::optimize::DependencySplitter;
pub use crate::search::{Plan, PlanOptions, PlanStats, plan};
pub use crate::state::{Fact, Goal, Multigoal, Pattern, State, Value};
pub use crate::stn::{Bound, Propagation, Stn, StnError, Timepoint, Window};
pub use crate::tree::{Node, NodeId, NodeKind, SolutionTree};

pub use anyhow::{Context, Error, Result, anyhow, bail};
