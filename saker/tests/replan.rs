mod util;

use saker::{PlanError, PlanOptions, State, Todo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use util::*;

/// `a` sits on `c` instead of `b`, unlike what the planner assumed.
fn drifted_state() -> State {
    State::from_triples([
        saker::Fact::new("pos", "a", "c"),
        saker::Fact::new("pos", "b", "table"),
        saker::Fact::new("pos", "c", "table"),
        saker::Fact::new("clear", "a", true),
        saker::Fact::new("clear", "b", true),
        saker::Fact::new("clear", "c", false),
        saker::Fact::new("holding", "hand", false),
    ])
}

#[test]
fn execution_replans_a_goal_after_drift() -> Result<(), PlanError> {
    let domain = blocks_domain();
    let opts = PlanOptions::default();
    let planned = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::unigoal("pos", "a", "table")],
        &opts,
    )?;
    assert_eq!(
        primitive_names(&planned),
        vec![prim("unstack", &["a", "b"]), prim("putdown", &["a"])]
    );

    // The world moved underneath the plan: unstack(a, b) cannot apply,
    // but the originating goal can be re-achieved from where `a` is now.
    let execution = saker::run_tree(&domain, drifted_state(), planned.tree, &opts)?;
    assert_eq!(execution.replans, 1);
    assert!(
        execution
            .final_state
            .matches("pos", "a", &saker::Value::from("table"))
    );
    Ok(())
}

#[test]
fn replanning_a_satisfied_goal_finishes_immediately() -> Result<(), PlanError> {
    let domain = blocks_domain();
    let opts = PlanOptions::default();
    let planned = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::unigoal("pos", "a", "table")],
        &opts,
    )?;

    // `a` is already down; the first primitive fails and the residual
    // goal turns out to be satisfied.
    let mut settled = initial_state();
    settled.set("pos", "a", "table");
    settled.set("clear", "b", true);
    let execution = saker::run_tree(&domain, settled.clone(), planned.tree, &opts)?;
    assert_eq!(execution.replans, 1);
    assert_eq!(execution.final_state, settled);
    Ok(())
}

#[test]
fn a_zero_replan_budget_fails_fast() {
    let domain = blocks_domain();
    let opts = PlanOptions::default().with_replan_budget(0);
    let planned = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::unigoal("pos", "a", "table")],
        &PlanOptions::default(),
    )
    .expect("planning from the expected state succeeds");

    let error = saker::run_tree(&domain, drifted_state(), planned.tree, &opts).unwrap_err();
    assert_eq!(error, PlanError::ReplanBudgetExceeded { replans: 0 });
}

#[test]
fn an_action_sourced_residual_surfaces_its_own_failure() {
    let domain = blocks_domain();
    let opts = PlanOptions::default();
    let planned = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::action("unstack", ["a", "b"])],
        &opts,
    )
    .expect("planning from the expected state succeeds");

    // A bare action has no goal to fall back on: re-planning it from the
    // drifted state hits the same precondition.
    let mut settled = initial_state();
    settled.set("pos", "a", "table");
    settled.set("clear", "b", true);
    let error = saker::run_tree(&domain, settled, planned.tree, &opts).unwrap_err();
    assert!(matches!(error, PlanError::ActionPreconditionUnmet { .. }));
}

#[test]
fn cancellation_happens_between_actions() {
    let domain = blocks_domain();
    let cancel = Arc::new(AtomicBool::new(true));
    let opts = PlanOptions::default().with_cancel(cancel.clone());
    let planned = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::action("pickup", ["c"])],
        &PlanOptions::default(),
    )
    .expect("planning succeeds");

    let error = saker::run_tree(&domain, initial_state(), planned.tree, &opts).unwrap_err();
    assert_eq!(error, PlanError::Cancelled);

    cancel.store(false, Ordering::Relaxed);
    let rerun = saker::plan(
        &domain,
        initial_state(),
        vec![Todo::action("pickup", ["c"])],
        &PlanOptions::default(),
    )
    .expect("planning succeeds");
    assert!(saker::run_tree(&domain, initial_state(), rerun.tree, &opts).is_ok());
}
