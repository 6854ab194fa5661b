//! Structured diagnostic events, gated on the `verbose` option.
//!
//! Level 0 emits nothing. Level 1 reports the call parameters, the
//! answer, and every search event named in the interface contract; levels
//! 2 and 3 add recursion and intermediate detail. Everything goes through
//! `tracing` under the `saker` target.

use crate::error::PlanError;
use crate::state::State;
use crate::stn::StnError;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Diag {
    verbose: u8,
}

impl Diag {
    pub(crate) fn new(verbose: u8) -> Self {
        Diag { verbose }
    }

    fn on(&self, level: u8) -> bool {
        self.verbose >= level
    }

    pub(crate) fn plan_started(&self, domain: &str, todos: usize) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "plan_started", domain, todos);
        }
    }

    pub(crate) fn plan_finished(&self, primitives: usize) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "plan_finished", primitives);
        }
    }

    pub(crate) fn plan_failed(&self, error: &PlanError) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "plan_failed", error = %error);
        }
    }

    pub(crate) fn method_tried(&self, depth: u32, method: &str, head: &str) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "method_tried", depth, method, head);
        }
    }

    pub(crate) fn method_succeeded(&self, depth: u32, method: &str, head: &str) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "method_succeeded", depth, method, head);
        }
    }

    pub(crate) fn method_failed(&self, depth: u32, method: &str, head: &str, error: &PlanError) {
        if self.on(1) {
            tracing::debug!(
                target: "saker",
                event = "method_failed", depth, method, head, error = %error,
            );
        }
    }

    pub(crate) fn method_not_applicable(&self, depth: u32, method: &str, head: &str, detail: &str) {
        if self.on(2) {
            tracing::trace!(
                target: "saker",
                event = "method_not_applicable", depth, method, head, detail,
            );
        }
    }

    pub(crate) fn backtrack(&self, depth: u32, head: &str) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "backtrack", depth, head);
        }
    }

    pub(crate) fn stn_tightened(&self, action: &str, tightened: usize) {
        if self.on(1) && tightened > 0 {
            tracing::debug!(target: "saker", event = "stn_tightened", action, tightened);
        }
    }

    pub(crate) fn stn_inconsistent(&self, action: &str, error: &StnError) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "stn_inconsistent", action, error = %error);
        }
    }

    pub(crate) fn action_applied(&self, name: &str, state: &State) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "action_applied", action = name);
        }
        if self.on(3) {
            tracing::trace!(target: "saker", event = "state_projected", action = name, state = %state);
        }
    }

    pub(crate) fn agenda(&self, depth: u32, head: &str, remaining: usize) {
        if self.on(2) {
            tracing::trace!(target: "saker", event = "visiting", depth, head, remaining);
        }
    }

    pub(crate) fn replanning(&self, replans: u32, residual: usize) {
        if self.on(1) {
            tracing::debug!(target: "saker", event = "replanning", replans, residual);
        }
    }
}
