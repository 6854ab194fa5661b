//! A timed blocks-world domain: one gripper, one-second moves.

use saker::{
    ActionMeta, Domain, DurationSpec, EntityRequirement, State, Todo, Value, anyhow, bail,
};

fn arg<'a>(args: &'a [Value], index: usize) -> saker::Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("expected a name in argument {index}"))
}

fn is_clear(state: &State, block: &str) -> bool {
    state.matches("clear", block, &Value::Bool(true))
}

fn hand_empty(state: &State) -> bool {
    state.matches("holding", "hand", &Value::Bool(false))
}

fn pickup(state: &State, args: &[Value]) -> saker::Result<State> {
    let block = arg(args, 0)?;
    if !state.matches("pos", block, &Value::from("table")) {
        bail!("{block} is not on the table");
    }
    if !is_clear(state, block) {
        bail!("{block} is not clear");
    }
    if !hand_empty(state) {
        bail!("the hand is full");
    }
    let mut next = state.clone();
    next.set("pos", block, "hand");
    next.set("clear", block, false);
    next.set("holding", "hand", block);
    Ok(next)
}

fn unstack(state: &State, args: &[Value]) -> saker::Result<State> {
    let block = arg(args, 0)?;
    let below = arg(args, 1)?;
    if below == "table" {
        bail!("use pickup to take {block} off the table");
    }
    if !state.matches("pos", block, &Value::from(below)) {
        bail!("{block} is not on {below}");
    }
    if !is_clear(state, block) {
        bail!("{block} is not clear");
    }
    if !hand_empty(state) {
        bail!("the hand is full");
    }
    let mut next = state.clone();
    next.set("pos", block, "hand");
    next.set("clear", block, false);
    next.set("clear", below, true);
    next.set("holding", "hand", block);
    Ok(next)
}

fn putdown(state: &State, args: &[Value]) -> saker::Result<State> {
    let block = arg(args, 0)?;
    if !state.matches("pos", block, &Value::from("hand")) {
        bail!("{block} is not being held");
    }
    let mut next = state.clone();
    next.set("pos", block, "table");
    next.set("clear", block, true);
    next.set("holding", "hand", false);
    Ok(next)
}

fn stack(state: &State, args: &[Value]) -> saker::Result<State> {
    let block = arg(args, 0)?;
    let target = arg(args, 1)?;
    if !state.matches("holding", "hand", &Value::from(block)) {
        bail!("{block} is not being held");
    }
    if !is_clear(state, target) {
        bail!("{target} is not clear");
    }
    let mut next = state.clone();
    next.set("pos", block, target);
    next.set("clear", block, true);
    next.set("clear", target, false);
    next.set("holding", "hand", false);
    Ok(next)
}

fn take_method(state: &State, args: &[Value]) -> saker::Result<Vec<Todo>> {
    let block = arg(args, 0)?;
    if !is_clear(state, block) {
        bail!("{block} is covered");
    }
    match state.get("pos", block).and_then(Value::as_str) {
        Some("table") => Ok(vec![Todo::action("pickup", [block])]),
        Some(below) => Ok(vec![Todo::action("unstack", [block, below])]),
        None => bail!("{block} is nowhere"),
    }
}

fn put_method(state: &State, args: &[Value]) -> saker::Result<Vec<Todo>> {
    let block = arg(args, 0)?;
    let target = arg(args, 1)?;
    if !state.matches("holding", "hand", &Value::from(block)) {
        bail!("{block} is not in the hand");
    }
    if target == "table" {
        Ok(vec![Todo::action("putdown", [block])])
    } else {
        Ok(vec![Todo::action("stack", [block, target])])
    }
}

fn move_goal_method(state: &State, subject: &str, value: &Value) -> saker::Result<Vec<Todo>> {
    let target = value
        .as_str()
        .ok_or_else(|| anyhow!("positions are names"))?;
    if !is_clear(state, subject) {
        bail!("{subject} is covered");
    }
    if target != "table" && !is_clear(state, target) {
        bail!("{target} is covered");
    }
    Ok(vec![
        Todo::task("take", [subject]),
        Todo::task("put", [subject, target]),
    ])
}

pub fn blocks_domain() -> saker::Result<Domain> {
    let one_second = DurationSpec::parse("PT1S")?;
    let meta = || {
        ActionMeta::default()
            .duration(one_second.clone())
            .requires(EntityRequirement::kind("gripper").with_capability("grip"))
    };
    let domain = Domain::builder("blocks_world")
        .entity_type("gripper", ["grip"])
        .entity("hand", "gripper")
        .action_with("pickup", pickup, meta())
        .action_with("unstack", unstack, meta())
        .action_with("putdown", putdown, meta())
        .action_with("stack", stack, meta())
        .task_method("take", "take_from_somewhere", take_method)
        .task_method("put", "put_somewhere", put_method)
        .unigoal_method("pos", "move_via_hand", move_goal_method)
        .build()?;
    Ok(domain)
}

/// The Sussman anomaly: `c` on `a`, `a` and `b` on the table.
pub fn sussman_state() -> State {
    State::from_triples([
        saker::Fact::new("pos", "c", "a"),
        saker::Fact::new("pos", "a", "table"),
        saker::Fact::new("pos", "b", "table"),
        saker::Fact::new("clear", "c", true),
        saker::Fact::new("clear", "a", false),
        saker::Fact::new("clear", "b", true),
        saker::Fact::new("holding", "hand", false),
    ])
}
