mod util;

use saker::{PlanOptions, Todo};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use util::*;

/// Counts every event the planner emits under the `saker` target.
#[derive(Clone, Default)]
struct CountingSubscriber {
    events: Arc<AtomicUsize>,
}

impl tracing::Subscriber for CountingSubscriber {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        metadata.target() == "saker"
    }

    fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

    fn event(&self, _: &tracing::Event<'_>) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    fn enter(&self, _: &tracing::span::Id) {}

    fn exit(&self, _: &tracing::span::Id) {}
}

fn count_events(verbose: u8) -> usize {
    let subscriber = CountingSubscriber::default();
    let events = subscriber.events.clone();
    tracing::subscriber::with_default(subscriber, || {
        let goal = saker::Multigoal::new("sussman")
            .with_goal("pos", "a", "b")
            .with_goal("pos", "b", "c");
        saker::run(
            &blocks_domain(),
            sussman_state(),
            vec![Todo::multigoal(goal)],
            &PlanOptions::default().with_verbose(verbose),
        )
        .expect("the scenario is solvable");
    });
    events.load(Ordering::Relaxed)
}

#[test]
fn verbose_zero_emits_nothing() {
    assert_eq!(count_events(0), 0);
}

#[test]
fn verbose_one_reports_the_search() {
    let at_one = count_events(1);
    assert!(at_one > 0, "expected events at verbose >= 1");
    let at_three = count_events(3);
    assert!(at_three >= at_one, "higher verbosity only adds detail");
}

#[test]
fn a_formatted_subscriber_accepts_planner_events() {
    // Smoke check that the events render through a real subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
    let plan = saker::plan(
        &blocks_domain(),
        initial_state(),
        vec![Todo::task("take", ["a"])],
        &PlanOptions::default().with_verbose(2),
    )
    .expect("the task is solvable");
    assert_eq!(primitive_names(&plan), vec![prim("unstack", &["a", "b"])]);
}
