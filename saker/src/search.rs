//! Depth-first HTN decomposition with interleaved temporal solving.
//!
//! The search walks an agenda of todos, expanding composites through
//! their method catalogues in declaration order. Every method attempt
//! works on its own clone of the projection (state, temporal network,
//! entity allocations), so backtracking is nothing more than dropping the
//! clone and rolling the tree back to a journal mark. Durative actions
//! allocate fresh timepoints and post their windows as they are expanded;
//! a constraint the network rejects fails the branch like any other
//! precondition.

use crate::domain::{Action, Domain, EndpointRef, EntityRequirement, Todo};
use crate::error::PlanError;
use crate::interval::{Interval, IntervalId};
use crate::state::{Goal, Multigoal, State, Value};
use crate::stn::{Bound, Stn, Timepoint, Window};
use crate::trace::Diag;
use crate::tree::{NodeId, NodeKind, SolutionTree};
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Knobs for one planning or execution call.
#[derive(Clone, Debug)]
pub struct PlanOptions {
    /// Deepest decomposition level; root todos sit at depth 1.
    pub max_depth: u32,
    /// 0 is silent; 1 reports events; 2 and 3 add recursion detail.
    pub verbose: u8,
    /// How many times execution may re-plan before giving up.
    pub replan_budget: u32,
    /// Wall-clock budget for a planning call.
    pub time_budget: Option<Duration>,
    /// Checked between primitive executions; set to abort cooperatively.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            max_depth: 20,
            verbose: 0,
            replan_budget: 5,
            time_budget: None,
            cancel: None,
        }
    }
}

impl PlanOptions {
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_replan_budget(mut self, replan_budget: u32) -> Self {
        self.replan_budget = replan_budget;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Counters describing how hard the search worked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub nodes_expanded: usize,
    pub methods_tried: usize,
    pub backtracks: usize,
    pub stn_tightenings: usize,
    pub elapsed: Duration,
}

/// A successful planning result: the solution tree, the state it
/// projects to, and the temporal schedule it was checked against.
#[derive(Clone, Debug)]
pub struct Plan {
    pub tree: SolutionTree,
    pub final_state: State,
    pub stn: Stn,
    pub intervals: Vec<Interval>,
    pub stats: PlanStats,
}

impl Plan {
    /// The primitive sequence in canonical (DFS) order.
    pub fn primitives(&self) -> Vec<(String, Vec<Value>)> {
        self.tree.primitives()
    }

    /// The realised bounds of an interval's endpoints after solving:
    /// `((earliest start, latest start), (earliest end, latest end))`.
    pub fn schedule_of(&self, interval: &Interval) -> ((Bound, Bound), (Bound, Bound)) {
        (
            (self.stn.earliest(interval.start), self.stn.latest(interval.start)),
            (self.stn.earliest(interval.end), self.stn.latest(interval.end)),
        )
    }
}

/// Builds a plan achieving `todos` from `state`, or explains why not.
pub fn plan(
    domain: &Domain,
    state: State,
    todos: Vec<Todo>,
    opts: &PlanOptions,
) -> Result<Plan, PlanError> {
    let mut search = Search::new(domain, opts);
    search.diag.plan_started(&domain.name, todos.len());

    let root = search.tree.root();
    let agenda: Vec<AgendaItem> = todos
        .into_iter()
        .map(|todo| AgendaItem::Todo {
            todo,
            parent: root,
            depth: 1,
        })
        .collect();
    let projection = Projection {
        state,
        stn: Stn::new(),
        alloc: BTreeMap::new(),
        last_end: None,
    };

    match search.seek(projection, &agenda) {
        Ok(mut projection) => {
            projection
                .stn
                .solve()
                .expect("a committed network stays consistent");
            let mut stats = search.stats;
            stats.elapsed = search.started.elapsed();
            let plan = Plan {
                tree: search.tree,
                final_state: projection.state,
                stn: projection.stn,
                intervals: search.intervals,
                stats,
            };
            search.diag.plan_finished(plan.tree.iter_primitives_dfs().len());
            Ok(plan)
        }
        Err(error) => {
            search.diag.plan_failed(&error);
            Err(error)
        }
    }
}

/// The value threaded through decomposition: everything a branch may
/// change and a backtrack must undo.
#[derive(Clone)]
struct Projection {
    state: State,
    stn: Stn,
    alloc: BTreeMap<String, Allocation>,
    /// End of the most recent durative primitive, for sequencing.
    last_end: Option<Timepoint>,
}

#[derive(Clone, Debug)]
struct Allocation {
    node: NodeId,
    end: Option<Timepoint>,
}

#[derive(Clone, Debug)]
enum AgendaItem {
    Todo {
        todo: Todo,
        parent: NodeId,
        depth: u32,
    },
    /// Re-check a goal after its method's subtree projected.
    VerifyGoal {
        goal: Goal,
        method: String,
        depth: u32,
    },
    VerifyMultigoal {
        goals: Multigoal,
        method: String,
        depth: u32,
    },
}

struct Search<'d> {
    domain: &'d Domain,
    opts: PlanOptions,
    diag: Diag,
    started: Instant,
    deadline: Option<Instant>,
    /// `(method id, head ⊕ state digest)` pairs on the current path.
    blacklist: HashSet<(String, u64)>,
    /// Every node appended so far, for mark/rollback.
    journal: Vec<NodeId>,
    tree: SolutionTree,
    intervals: Vec<Interval>,
    interval_counter: u32,
    stats: PlanStats,
}

impl<'d> Search<'d> {
    fn new(domain: &'d Domain, opts: &PlanOptions) -> Self {
        let started = Instant::now();
        Search {
            domain,
            opts: opts.clone(),
            diag: Diag::new(opts.verbose),
            started,
            deadline: opts.time_budget.map(|budget| started + budget),
            blacklist: HashSet::new(),
            journal: Vec::new(),
            tree: SolutionTree::new(),
            intervals: Vec::new(),
            interval_counter: 0,
            stats: PlanStats::default(),
        }
    }

    fn seek(
        &mut self,
        projection: Projection,
        agenda: &[AgendaItem],
    ) -> Result<Projection, PlanError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PlanError::TimeBudgetExceeded);
            }
        }

        let Some((head, rest)) = agenda.split_first() else {
            return Ok(projection);
        };

        match head {
            AgendaItem::VerifyGoal { goal, method, depth } => {
                if projection.state.satisfies(goal) {
                    self.seek(projection, rest)
                } else {
                    let error = PlanError::VerificationFailed {
                        method: method.clone(),
                        goal: goal.to_string(),
                    };
                    self.diag
                        .method_failed(*depth, method, &goal.to_string(), &error);
                    Err(error)
                }
            }
            AgendaItem::VerifyMultigoal { goals, method, depth } => {
                match goals
                    .goals()
                    .iter()
                    .find(|g| !g.satisfied_in(&projection.state))
                {
                    None => self.seek(projection, rest),
                    Some(unmet) => {
                        let error = PlanError::VerificationFailed {
                            method: method.clone(),
                            goal: unmet.to_string(),
                        };
                        self.diag
                            .method_failed(*depth, method, &goals.to_string(), &error);
                        Err(error)
                    }
                }
            }
            AgendaItem::Todo { todo, parent, depth } => {
                self.diag.agenda(*depth, &todo.to_string(), rest.len());
                match todo {
                    Todo::Action { name, args } => {
                        self.expand_action(projection, name, args, *parent, *depth, rest)
                    }
                    Todo::Task { name, args } => {
                        self.expand_task(projection, name, args, *parent, *depth, rest)
                    }
                    Todo::Unigoal(goal) => {
                        self.expand_unigoal(projection, goal, *parent, *depth, rest)
                    }
                    Todo::Multigoal(goals) => {
                        self.expand_multigoal(projection, goals, *parent, *depth, rest)
                    }
                }
            }
        }
    }

    fn expand_action(
        &mut self,
        mut projection: Projection,
        name: &str,
        args: &[Value],
        parent: NodeId,
        depth: u32,
        rest: &[AgendaItem],
    ) -> Result<Projection, PlanError> {
        if depth > self.opts.max_depth {
            return Err(PlanError::DepthExceeded {
                max_depth: self.opts.max_depth,
            });
        }
        let action = self
            .domain
            .get_action(name)
            .ok_or_else(|| PlanError::UnknownAction {
                name: name.to_owned(),
            })?
            .clone();

        // Timepoints and the sequencing chain come first: entity
        // availability is argued against the new start, and the chain is
        // what proves earlier claims finished.
        let endpoints = if action.duration.is_some() || !action.constraints.is_empty() {
            let start = projection.stn.add_timepoint();
            let end = projection.stn.add_timepoint();
            Some((start, end))
        } else {
            None
        };
        self.post_sequencing(&mut projection, &action, endpoints)?;

        let resources = self.allocate_entities(&projection, &action, endpoints)?;
        self.post_duration(&mut projection, &action, endpoints, &resources)?;

        let pre_digest = projection.state.digest();
        let next_state = action
            .apply(&projection.state, args)
            .map_err(|e| PlanError::ActionPreconditionUnmet {
                action: name.to_owned(),
                detail: format!("{e:#}"),
            })?;
        let post_digest = next_state.digest();

        let node = self.tree.append_child(
            parent,
            NodeKind::Action {
                name: name.to_owned(),
                args: args.to_vec(),
                pre_digest,
                post_digest,
                start: endpoints.map(|(s, _)| s),
                end: endpoints.map(|(_, e)| e),
            },
        );
        self.journal.push(node);
        for id in resources {
            projection.alloc.insert(
                id,
                Allocation {
                    node,
                    end: endpoints.map(|(_, e)| e),
                },
            );
        }
        if let Some((start, end)) = endpoints {
            let id = IntervalId::new(self.interval_counter);
            self.interval_counter += 1;
            self.intervals.push(Interval {
                id,
                start,
                end,
                label: name.to_owned(),
            });
            projection.last_end = Some(end);
        }

        self.stats.nodes_expanded += 1;
        self.diag.action_applied(name, &next_state);
        projection.state = next_state;
        self.seek(projection, rest)
    }

    /// Claims one entity per requirement, re-using entities whose prior
    /// claim provably ends before this action starts.
    fn allocate_entities(
        &self,
        projection: &Projection,
        action: &Action,
        endpoints: Option<(Timepoint, Timepoint)>,
    ) -> Result<Vec<String>, PlanError> {
        let registry = self.domain.entities();
        let mut claimed = Vec::new();
        for requirement in &action.requires {
            let entity = registry
                .entities_of(&requirement.kind)
                .filter(|e| match &requirement.capability {
                    Some(cap) => registry.kind_has_capability(&e.kind, cap),
                    None => true,
                })
                .find(|e| {
                    if claimed.contains(&e.id) {
                        return false;
                    }
                    match projection.alloc.get(&e.id) {
                        None => true,
                        Some(allocation) => {
                            self.claim_ended(projection, allocation, endpoints.map(|(s, _)| s))
                        }
                    }
                });
            match entity {
                Some(entity) => claimed.push(entity.id.clone()),
                None => {
                    return Err(self.no_entity(action, requirement));
                }
            }
        }
        Ok(claimed)
    }

    fn no_entity(&self, action: &Action, requirement: &EntityRequirement) -> PlanError {
        PlanError::ActionPreconditionUnmet {
            action: action.name.clone(),
            detail: match &requirement.capability {
                Some(cap) => format!(
                    "no schedulable entity of type {:?} with capability {cap:?}",
                    requirement.kind
                ),
                None => format!("no schedulable entity of type {:?}", requirement.kind),
            },
        }
    }

    /// An existing claim releases its entity when the network proves it
    /// ends no later than the new start. Claims without intervals are
    /// sequenced by the DFS order itself.
    fn claim_ended(
        &self,
        projection: &Projection,
        allocation: &Allocation,
        new_start: Option<Timepoint>,
    ) -> bool {
        match (allocation.end, new_start) {
            (Some(end), Some(start)) => {
                projection.stn.window(end, start).lo >= Bound::Finite(0)
            }
            _ => true,
        }
    }

    /// Posts the structural constraints of a fresh interval: it lies
    /// after the origin, runs forward, and follows the previous durative
    /// primitive in the canonical linearisation.
    fn post_sequencing(
        &mut self,
        projection: &mut Projection,
        action: &Action,
        endpoints: Option<(Timepoint, Timepoint)>,
    ) -> Result<(), PlanError> {
        let Some((start, end)) = endpoints else {
            return Ok(());
        };
        let mut posted = vec![
            (start, end, Window::at_least(0)),
            (Stn::ORIGIN, start, Window::at_least(0)),
        ];
        if let Some(previous_end) = projection.last_end {
            posted.push((previous_end, start, Window::at_least(0)));
        }
        self.post_all(projection, action, posted)
    }

    /// Posts the resolved duration window and the action's declared
    /// constraints. Runs after entity allocation so conditional durations
    /// can see their resources.
    fn post_duration(
        &mut self,
        projection: &mut Projection,
        action: &Action,
        endpoints: Option<(Timepoint, Timepoint)>,
        resources: &[String],
    ) -> Result<(), PlanError> {
        let Some((start, end)) = endpoints else {
            return Ok(());
        };
        let mut posted = Vec::new();
        if let Some(spec) = &action.duration {
            let (min, max) = spec.resolve(&projection.state, resources).map_err(|e| {
                PlanError::ActionPreconditionUnmet {
                    action: action.name.clone(),
                    detail: e.to_string(),
                }
            })?;
            posted.push((start, end, Window::between(min, max)));
        }
        for constraint in &action.constraints {
            let resolve = |endpoint: EndpointRef| match endpoint {
                EndpointRef::Origin => Stn::ORIGIN,
                EndpointRef::Start => start,
                EndpointRef::End => end,
            };
            posted.push((
                resolve(constraint.from),
                resolve(constraint.to),
                constraint.window,
            ));
        }
        self.post_all(projection, action, posted)
    }

    fn post_all(
        &mut self,
        projection: &mut Projection,
        action: &Action,
        posted: Vec<(Timepoint, Timepoint, Window)>,
    ) -> Result<(), PlanError> {
        for (from, to, window) in posted {
            match projection.stn.add_constraint(from, to, window) {
                Ok(propagation) => {
                    self.stats.stn_tightenings += propagation.tightened;
                    self.diag.stn_tightened(&action.name, propagation.tightened);
                }
                Err(source) => {
                    self.diag.stn_inconsistent(&action.name, &source);
                    return Err(PlanError::StnInconsistent {
                        action: action.name.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn expand_task(
        &mut self,
        projection: Projection,
        name: &str,
        args: &[Value],
        parent: NodeId,
        depth: u32,
        rest: &[AgendaItem],
    ) -> Result<Projection, PlanError> {
        if depth > self.opts.max_depth {
            return Err(PlanError::DepthExceeded {
                max_depth: self.opts.max_depth,
            });
        }
        let methods = self
            .domain
            .methods_for_task(name)
            .ok_or_else(|| PlanError::UnknownMethod {
                what: format!("task {name:?}"),
            })?
            .to_vec();

        let head = Todo::Task {
            name: name.to_owned(),
            args: args.to_vec(),
        }
        .to_string();
        let key = self.blacklist_key(&head, &projection.state);

        for method in methods {
            let pair = (method.id.clone(), key);
            if self.blacklist.contains(&pair) {
                continue;
            }
            self.stats.methods_tried += 1;
            self.diag.method_tried(depth, &method.id, &head);

            let subtodos = match method.expand(&projection.state, args) {
                Ok(subtodos) => subtodos,
                Err(e) => {
                    self.diag
                        .method_not_applicable(depth, &method.id, &head, &format!("{e:#}"));
                    continue;
                }
            };

            let mark = self.mark();
            self.blacklist.insert(pair.clone());
            let node = self.tree.append_child(
                parent,
                NodeKind::Task {
                    name: name.to_owned(),
                    args: args.to_vec(),
                },
            );
            self.journal.push(node);
            {
                let node = self.tree.node_mut(node);
                node.method = Some(method.id.clone());
                node.expanded = true;
            }

            let mut candidate = Vec::with_capacity(subtodos.len() + rest.len());
            candidate.extend(subtodos.into_iter().map(|todo| AgendaItem::Todo {
                todo,
                parent: node,
                depth: depth + 1,
            }));
            candidate.extend(rest.iter().cloned());

            match self.seek(projection.clone(), candidate.as_slice()) {
                Ok(result) => {
                    self.blacklist.remove(&pair);
                    self.diag.method_succeeded(depth, &method.id, &head);
                    return Ok(result);
                }
                Err(error) if error.is_fatal() => {
                    self.blacklist.remove(&pair);
                    return Err(error);
                }
                Err(error) => {
                    self.diag.method_failed(depth, &method.id, &head, &error);
                    self.diag.backtrack(depth, &head);
                    self.stats.backtracks += 1;
                    self.rollback(mark);
                    self.blacklist.remove(&pair);
                }
            }
        }

        Err(PlanError::NoApplicableMethod { head })
    }

    fn expand_unigoal(
        &mut self,
        projection: Projection,
        goal: &Goal,
        parent: NodeId,
        depth: u32,
        rest: &[AgendaItem],
    ) -> Result<Projection, PlanError> {
        if goal.satisfied_in(&projection.state) {
            return self.seek(projection, rest);
        }
        if depth > self.opts.max_depth {
            return Err(PlanError::DepthExceeded {
                max_depth: self.opts.max_depth,
            });
        }
        let methods = self
            .domain
            .methods_for_goal(&goal.predicate)
            .ok_or_else(|| PlanError::UnknownMethod {
                what: format!("goal predicate {:?}", goal.predicate),
            })?
            .to_vec();

        let head = goal.to_string();
        let key = self.blacklist_key(&head, &projection.state);

        for method in methods {
            let pair = (method.id.clone(), key);
            if self.blacklist.contains(&pair) {
                continue;
            }
            self.stats.methods_tried += 1;
            self.diag.method_tried(depth, &method.id, &head);

            let subtodos = match method.expand(&projection.state, &goal.subject, &goal.value) {
                Ok(subtodos) => subtodos,
                Err(e) => {
                    self.diag
                        .method_not_applicable(depth, &method.id, &head, &format!("{e:#}"));
                    continue;
                }
            };

            let mark = self.mark();
            self.blacklist.insert(pair.clone());
            let node = self
                .tree
                .append_child(parent, NodeKind::Unigoal(goal.clone()));
            self.journal.push(node);
            {
                let node = self.tree.node_mut(node);
                node.method = Some(method.id.clone());
                node.expanded = true;
            }

            let mut candidate = Vec::with_capacity(subtodos.len() + rest.len() + 1);
            candidate.extend(subtodos.into_iter().map(|todo| AgendaItem::Todo {
                todo,
                parent: node,
                depth: depth + 1,
            }));
            candidate.push(AgendaItem::VerifyGoal {
                goal: goal.clone(),
                method: method.id.clone(),
                depth,
            });
            candidate.extend(rest.iter().cloned());

            match self.seek(projection.clone(), candidate.as_slice()) {
                Ok(result) => {
                    self.blacklist.remove(&pair);
                    self.diag.method_succeeded(depth, &method.id, &head);
                    return Ok(result);
                }
                Err(error) if error.is_fatal() => {
                    self.blacklist.remove(&pair);
                    return Err(error);
                }
                Err(error) => {
                    self.diag.method_failed(depth, &method.id, &head, &error);
                    self.diag.backtrack(depth, &head);
                    self.stats.backtracks += 1;
                    self.rollback(mark);
                    self.blacklist.remove(&pair);
                }
            }
        }

        Err(PlanError::NoApplicableMethod { head })
    }

    fn expand_multigoal(
        &mut self,
        projection: Projection,
        goals: &Multigoal,
        parent: NodeId,
        depth: u32,
        rest: &[AgendaItem],
    ) -> Result<Projection, PlanError> {
        if goals.satisfied_in(&projection.state) {
            return self.seek(projection, rest);
        }
        if depth > self.opts.max_depth {
            return Err(PlanError::DepthExceeded {
                max_depth: self.opts.max_depth,
            });
        }
        let methods = self.domain.multigoal_methods().to_vec();
        if methods.is_empty() {
            return Err(PlanError::UnknownMethod {
                what: format!("multigoal {goals}"),
            });
        }

        let head = goals.to_string();
        let key = self.blacklist_key(&head, &projection.state);

        for method in methods {
            let pair = (method.id.clone(), key);
            if self.blacklist.contains(&pair) {
                continue;
            }
            self.stats.methods_tried += 1;
            self.diag.method_tried(depth, &method.id, &head);

            let subtodos = match method.expand(&projection.state, goals) {
                Ok(subtodos) => subtodos,
                Err(e) => {
                    self.diag
                        .method_not_applicable(depth, &method.id, &head, &format!("{e:#}"));
                    continue;
                }
            };

            let mark = self.mark();
            self.blacklist.insert(pair.clone());
            let node = self
                .tree
                .append_child(parent, NodeKind::Multigoal(goals.clone()));
            self.journal.push(node);
            {
                let node = self.tree.node_mut(node);
                node.method = Some(method.id.clone());
                node.expanded = true;
            }

            let mut candidate = Vec::with_capacity(subtodos.len() + rest.len() + 1);
            candidate.extend(subtodos.into_iter().map(|todo| AgendaItem::Todo {
                todo,
                parent: node,
                depth: depth + 1,
            }));
            candidate.push(AgendaItem::VerifyMultigoal {
                goals: goals.clone(),
                method: method.id.clone(),
                depth,
            });
            candidate.extend(rest.iter().cloned());

            match self.seek(projection.clone(), candidate.as_slice()) {
                Ok(result) => {
                    self.blacklist.remove(&pair);
                    self.diag.method_succeeded(depth, &method.id, &head);
                    return Ok(result);
                }
                Err(error) if error.is_fatal() => {
                    self.blacklist.remove(&pair);
                    return Err(error);
                }
                Err(error) => {
                    self.diag.method_failed(depth, &method.id, &head, &error);
                    self.diag.backtrack(depth, &head);
                    self.stats.backtracks += 1;
                    self.rollback(mark);
                    self.blacklist.remove(&pair);
                }
            }
        }

        Err(PlanError::NoApplicableMethod { head })
    }

    fn blacklist_key(&self, head: &str, state: &State) -> u64 {
        let mut hasher =
            RandomState::with_seeds(0xb1ac_0001, 0xb1ac_0002, 0xb1ac_0003, 0xb1ac_0004)
                .build_hasher();
        head.hash(&mut hasher);
        state.digest().hash(&mut hasher);
        hasher.finish()
    }

    fn mark(&self) -> (usize, usize) {
        (self.journal.len(), self.intervals.len())
    }

    /// Undoes every node and interval recorded since `mark`. Children are
    /// always journalled after their parents, so reverse order removes
    /// leaves first.
    fn rollback(&mut self, mark: (usize, usize)) {
        let (nodes, intervals) = mark;
        while self.journal.len() > nodes {
            let id = self.journal.pop().expect("journal is non-empty");
            self.tree.remove_node(id);
        }
        self.intervals.truncate(intervals);
    }
}
