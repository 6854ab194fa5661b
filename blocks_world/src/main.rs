//! Plans and executes the Sussman anomaly with the timed blocks domain,
//! printing the chosen primitives, their schedule, and the final state.

use saker::{Bound, Multigoal, PlanOptions, Todo};

mod domain;

fn main() -> saker::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .init();

    let blocks = domain::blocks_domain()?;
    let state = domain::sussman_state();
    let goal = Multigoal::new("sussman")
        .with_goal("pos", "a", "b")
        .with_goal("pos", "b", "c");

    let opts = PlanOptions::default().with_verbose(1);
    let plan = saker::plan(&blocks, state.clone(), vec![Todo::multigoal(goal)], &opts)?;

    println!("plan for the Sussman anomaly:");
    for (index, (name, args)) in plan.primitives().iter().enumerate() {
        let interval = &plan.intervals[index];
        let ((start, _), (end, _)) = plan.schedule_of(interval);
        let (Bound::Finite(start), Bound::Finite(end)) = (start, end) else {
            unreachable!("chained one-second actions have finite bounds");
        };
        let args = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!("  t{start}..t{end}  {name}({args})");
    }
    println!(
        "search: {} nodes, {} methods tried, {} backtracks",
        plan.stats.nodes_expanded, plan.stats.methods_tried, plan.stats.backtracks
    );

    let execution = saker::run_tree(&blocks, state, plan.tree, &opts)?;
    println!("final state after execution:");
    print!("{}", execution.final_state);
    Ok(())
}
