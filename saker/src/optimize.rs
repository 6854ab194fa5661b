//! Goal-ordering for multigoals with a "displace then place" structure.
//!
//! [DependencySplitter] adapts the Gupta–Nau blocks-world ordering: each
//! round it classifies every subject, prefers a move that reaches a final
//! position, otherwise displaces something to the table, and re-offers the
//! remaining multigoal. It is installed as the last multigoal method by
//! default and generalises to any domain with the same pattern by naming
//! the position predicate, the clear predicate, and the table value.

use crate::domain::{MultigoalMethod, Todo};
use crate::state::{Multigoal, State, Value};
use anyhow::{Result, bail};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
enum SubjectStatus {
    /// Already where it belongs, all the way down.
    Done,
    /// Something is stacked on it; it cannot move this round.
    Inaccessible,
    /// Belongs on the table, or needs displacing out of the way.
    MoveToTable,
    /// Its target is done and clear; move it home now.
    MoveToBlock,
    /// Its target is not ready yet.
    Waiting,
}

/// The default goal-ordering multigoal method.
#[derive(Clone, Debug)]
pub struct DependencySplitter {
    /// Predicate recording where a subject sits.
    pub position: String,
    /// Predicate recording whether a subject has a free top.
    pub clear: String,
    /// The position value meaning "out of everyone's way".
    pub table: Value,
}

impl Default for DependencySplitter {
    fn default() -> Self {
        DependencySplitter {
            position: "pos".to_owned(),
            clear: "clear".to_owned(),
            table: Value::from("table"),
        }
    }
}

impl DependencySplitter {
    pub fn new(
        position: impl Into<String>,
        clear: impl Into<String>,
        table: impl Into<Value>,
    ) -> Self {
        DependencySplitter {
            position: position.into(),
            clear: clear.into(),
            table: table.into(),
        }
    }

    /// Wraps the splitter as a registrable multigoal method.
    pub fn into_method(self) -> MultigoalMethod {
        MultigoalMethod::new("displace_then_place", move |state, goals| {
            self.split(state, goals)
        })
    }

    /// Emits `[next goal, remaining multigoal]`, or an empty list once
    /// everything holds.
    pub fn split(&self, state: &State, goals: &Multigoal) -> Result<Vec<Todo>> {
        let subjects = self.subjects(state, goals);

        for subject in &subjects {
            if self.status(subject, state, goals) == SubjectStatus::MoveToBlock {
                let target = goals
                    .goal_for(&self.position, subject)
                    .expect("move-to-block implies a position goal")
                    .clone();
                return Ok(vec![
                    Todo::unigoal(self.position.clone(), subject.clone(), target),
                    Todo::Multigoal(goals.clone()),
                ]);
            }
        }

        for subject in &subjects {
            let displace = match self.status(subject, state, goals) {
                SubjectStatus::MoveToTable => true,
                // A waiting subject off the table is in somebody's way.
                SubjectStatus::Waiting => {
                    state.get(&self.position, subject) != Some(&self.table)
                }
                _ => false,
            };
            if displace {
                return Ok(vec![
                    Todo::unigoal(self.position.clone(), subject.clone(), self.table.clone()),
                    Todo::Multigoal(goals.clone()),
                ]);
            }
        }

        // Goals outside the position predicate are handed over one at a
        // time, in declaration order.
        if let Some(other) = goals
            .unsatisfied_in(state)
            .into_iter()
            .find(|g| g.predicate != self.position)
        {
            return Ok(vec![Todo::Unigoal(other), Todo::Multigoal(goals.clone())]);
        }

        if goals.satisfied_in(state) {
            Ok(vec![])
        } else {
            bail!("no subject can move toward the remaining goals");
        }
    }

    /// Everything that might need to move: subjects of the clear and
    /// position predicates plus goal subjects, in sorted order.
    fn subjects(&self, state: &State, goals: &Multigoal) -> Vec<String> {
        let mut subjects = BTreeSet::new();
        for s in state.subjects_with_pred(&self.clear) {
            subjects.insert(s.to_owned());
        }
        for s in state.subjects_with_pred(&self.position) {
            subjects.insert(s.to_owned());
        }
        for g in goals.goals() {
            if g.predicate == self.position {
                subjects.insert(g.subject.clone());
            }
        }
        subjects.into_iter().collect()
    }

    fn status(&self, subject: &str, state: &State, goals: &Multigoal) -> SubjectStatus {
        let mut visited = BTreeSet::new();
        if self.is_done(subject, state, goals, &mut visited) {
            return SubjectStatus::Done;
        }
        if state.get(&self.clear, subject) != Some(&Value::Bool(true)) {
            return SubjectStatus::Inaccessible;
        }
        match goals.goal_for(&self.position, subject) {
            None => SubjectStatus::MoveToTable,
            Some(target) if *target == self.table => SubjectStatus::MoveToTable,
            Some(Value::Text(target)) => {
                let mut visited = BTreeSet::new();
                if self.is_done(target, state, goals, &mut visited)
                    && state.matches(&self.clear, target, &Value::Bool(true))
                {
                    SubjectStatus::MoveToBlock
                } else {
                    SubjectStatus::Waiting
                }
            }
            Some(_) => SubjectStatus::Waiting,
        }
    }

    /// A subject is done when it is at its goal (or has none) and so is
    /// everything beneath it.
    fn is_done(
        &self,
        subject: &str,
        state: &State,
        goals: &Multigoal,
        visited: &mut BTreeSet<String>,
    ) -> bool {
        if Value::from(subject) == self.table {
            return true;
        }
        if !visited.insert(subject.to_owned()) {
            // A support cycle can only come from a malformed state.
            return false;
        }
        if let Some(goal) = goals.goal_for(&self.position, subject) {
            if state.get(&self.position, subject) != Some(goal) {
                return false;
            }
        }
        match state.get(&self.position, subject) {
            None => true,
            Some(v) if *v == self.table => true,
            Some(Value::Text(below)) => {
                let below = below.clone();
                self.is_done(&below, state, goals, visited)
            }
            Some(_) => false,
        }
    }
}
