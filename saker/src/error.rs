//! The planner's failure taxonomy.
//!
//! Every condition the planner can hit is one of these values; nothing in
//! the core panics for covered conditions. During search, recoverable
//! errors are absorbed by the innermost enclosing method iterator, which
//! tries its next method; fatal errors surface immediately.

use crate::stn::StnError;
use derive_more::{Display, Error};

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum PlanError {
    /// Domain lookup failed for a primitive name.
    #[display("unknown action {name:?}")]
    UnknownAction { name: String },

    /// A task or goal has no method catalogue at all.
    #[display("no methods registered for {what}")]
    UnknownMethod { what: String },

    /// Every registered method for the head was tried and failed.
    #[display("all methods exhausted for {head}")]
    NoApplicableMethod { head: String },

    /// The action function rejected the current state.
    #[display("action {action:?} not applicable: {detail}")]
    ActionPreconditionUnmet { action: String, detail: String },

    /// A method reported success but its goal does not hold afterwards.
    #[display("method {method:?} finished but {goal} does not hold")]
    VerificationFailed { method: String, goal: String },

    #[display("decomposition exceeded max_depth {max_depth}")]
    DepthExceeded { max_depth: u32 },

    #[display("wall-clock planning budget exhausted")]
    TimeBudgetExceeded,

    /// Posting the action's temporal constraints made the network
    /// inconsistent.
    #[display("temporal constraints of {action:?} rejected: {source}")]
    StnInconsistent { action: String, source: StnError },

    #[display("replan budget exhausted after {replans} replans")]
    ReplanBudgetExceeded { replans: u32 },

    /// The caller aborted execution between two primitive actions.
    #[display("execution cancelled")]
    Cancelled,
}

impl PlanError {
    /// Fatal errors are never absorbed by a method iterator; they abort
    /// the whole planning or execution call.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlanError::DepthExceeded { .. }
                | PlanError::TimeBudgetExceeded
                | PlanError::UnknownAction { .. }
                | PlanError::ReplanBudgetExceeded { .. }
                | PlanError::Cancelled
        )
    }
}
