mod util;

use saker::{PlanError, PlanOptions, Todo, Value};
use util::*;

#[test]
fn simple_pickup() -> Result<(), PlanError> {
    let plan = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::action("pickup", ["c"])],
        &PlanOptions::default(),
    )?;

    assert_eq!(primitive_names(&plan), vec![prim("pickup", &["c"])]);
    let state = &plan.final_state;
    assert_eq!(state.get("clear", "c"), Some(&Value::Bool(false)));
    assert_eq!(state.get("pos", "c"), Some(&Value::from("hand")));
    assert_eq!(state.get("holding", "hand"), Some(&Value::from("c")));
    Ok(())
}

#[test]
fn unreachable_pickup() {
    let error = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::action("pickup", ["a"])],
        &PlanOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(
        error,
        PlanError::ActionPreconditionUnmet { ref action, .. } if action == "pickup"
    ));
}

#[test]
fn take_task_dispatches_on_position() -> Result<(), PlanError> {
    let plan = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::task("take", ["a"])],
        &PlanOptions::default(),
    )?;

    assert_eq!(primitive_names(&plan), vec![prim("unstack", &["a", "b"])]);
    Ok(())
}

#[test]
fn sussman_anomaly() -> Result<(), PlanError> {
    let goal = saker::Multigoal::new("sussman")
        .with_goal("pos", "a", "b")
        .with_goal("pos", "b", "c");
    let plan = saker::plan(
        &blocks_domain(),
        sussman_state(),
        vec![Todo::multigoal(goal)],
        &PlanOptions::default(),
    )?;

    assert_eq!(
        primitive_names(&plan),
        vec![
            prim("unstack", &["c", "a"]),
            prim("putdown", &["c"]),
            prim("pickup", &["b"]),
            prim("stack", &["b", "c"]),
            prim("pickup", &["a"]),
            prim("stack", &["a", "b"]),
        ]
    );
    Ok(())
}

#[test]
fn inverted_stack() -> Result<(), PlanError> {
    let goal = saker::Multigoal::new("invert")
        .with_goal("pos", "c", "b")
        .with_goal("pos", "b", "a")
        .with_goal("pos", "a", "table");
    let plan = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::multigoal(goal)],
        &PlanOptions::default(),
    )?;

    assert_eq!(
        primitive_names(&plan),
        vec![
            prim("unstack", &["a", "b"]),
            prim("putdown", &["a"]),
            prim("pickup", &["b"]),
            prim("stack", &["b", "a"]),
            prim("pickup", &["c"]),
            prim("stack", &["c", "b"]),
        ]
    );
    Ok(())
}

#[test]
fn parallel_rearrange() -> Result<(), PlanError> {
    let goal = saker::Multigoal::new("swap_towers")
        .with_goal("pos", "b", "c")
        .with_goal("pos", "a", "d");
    let plan = saker::plan(
        &blocks_domain(),
        parallel_state(),
        vec![Todo::multigoal(goal)],
        &PlanOptions::default(),
    )?;

    assert_eq!(
        primitive_names(&plan),
        vec![
            prim("unstack", &["a", "c"]),
            prim("putdown", &["a"]),
            prim("unstack", &["b", "d"]),
            prim("stack", &["b", "c"]),
            prim("pickup", &["a"]),
            prim("stack", &["a", "d"]),
        ]
    );
    Ok(())
}

#[test]
fn executing_a_plan_achieves_every_goal() -> Result<(), PlanError> {
    let goal = saker::Multigoal::new("sussman")
        .with_goal("pos", "a", "b")
        .with_goal("pos", "b", "c");
    let execution = saker::run(
        &blocks_domain(),
        sussman_state(),
        vec![Todo::multigoal(goal.clone())],
        &PlanOptions::default(),
    )?;

    assert!(goal.satisfied_in(&execution.final_state));
    assert_eq!(execution.replans, 0);
    Ok(())
}

#[test]
fn planning_is_deterministic() -> Result<(), PlanError> {
    let goal = || {
        saker::Multigoal::new("invert")
            .with_goal("pos", "c", "b")
            .with_goal("pos", "b", "a")
            .with_goal("pos", "a", "table")
    };
    let first = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::multigoal(goal())],
        &PlanOptions::default(),
    )?;
    let second = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::multigoal(goal())],
        &PlanOptions::default(),
    )?;

    assert_eq!(first.primitives(), second.primitives());
    assert_eq!(first.tree.to_string(), second.tree.to_string());
    assert_eq!(first.final_state, second.final_state);
    Ok(())
}
