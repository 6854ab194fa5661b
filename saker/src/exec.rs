//! The re-entrant executor.
//!
//! Walks the solution tree's primitives in canonical DFS order, applying
//! each action function to the running state value. When an action fails
//! (or its outcome diverges from the digests recorded at planning time),
//! the untraversed remainder of the tree is translated back into todos,
//! re-planned from the current state, and spliced in, up to the replan
//! budget. The only suspension point is between two primitives, where a
//! cooperative cancel flag is honoured.

use crate::domain::{Domain, Todo};
use crate::error::PlanError;
use crate::search::{PlanOptions, plan};
use crate::state::State;
use crate::trace::Diag;
use crate::tree::{NodeId, NodeKind, SolutionTree};
use std::sync::atomic::Ordering;

/// The outcome of running a plan to completion.
#[derive(Clone, Debug)]
pub struct Execution {
    pub tree: SolutionTree,
    pub final_state: State,
    /// How many times execution had to re-plan.
    pub replans: u32,
}

/// Plans `todos` and immediately executes the result.
pub fn run(
    domain: &Domain,
    state: State,
    todos: Vec<Todo>,
    opts: &PlanOptions,
) -> Result<Execution, PlanError> {
    let planned = plan(domain, state.clone(), todos, opts)?;
    run_tree(domain, state, planned.tree, opts)
}

/// Executes a prepared solution tree against `state`.
pub fn run_tree(
    domain: &Domain,
    state: State,
    tree: SolutionTree,
    opts: &PlanOptions,
) -> Result<Execution, PlanError> {
    let diag = Diag::new(opts.verbose);
    let mut tree = tree;
    let mut state = state;
    let mut executed = 0usize;
    let mut replans = 0u32;

    loop {
        let leaves = tree.iter_primitives_dfs();
        if executed >= leaves.len() {
            break;
        }
        if let Some(cancel) = &opts.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(PlanError::Cancelled);
            }
        }

        let leaf = leaves[executed];
        let (name, args, pre_digest, post_digest) = match &tree.node(leaf).kind {
            NodeKind::Action {
                name,
                args,
                pre_digest,
                post_digest,
                ..
            } => (name.clone(), args.clone(), *pre_digest, *post_digest),
            _ => unreachable!("iter_primitives_dfs only yields actions"),
        };
        let action = domain
            .get_action(&name)
            .ok_or_else(|| PlanError::UnknownAction { name: name.clone() })?;

        let next = match action.apply(&state, &args) {
            Ok(next) => {
                // If we are on the planned trajectory, the projected
                // digest must match; a divergence is a failure even
                // though the action itself did not complain.
                if state.digest() == pre_digest && next.digest() != post_digest {
                    None
                } else {
                    Some(next)
                }
            }
            Err(_) => None,
        };

        match next {
            Some(next) => {
                diag.action_applied(&name, &next);
                state = next;
                tree.node_mut(leaf).executed = true;
                executed += 1;
            }
            None => {
                if replans == opts.replan_budget {
                    return Err(PlanError::ReplanBudgetExceeded { replans });
                }
                replans += 1;

                let residual = residual_todos(&tree);
                diag.replanning(replans, residual.len());
                let stumps = unexecuted_subtrees(&tree);
                for stump in stumps {
                    tree.remove_subtree(stump);
                }
                let replanned = plan(domain, state.clone(), residual, opts)?;
                let new_root = replanned.tree.root();
                for child in replanned.tree.node(new_root).children.clone() {
                    tree.graft(tree.root(), &replanned.tree, child);
                }
            }
        }
    }

    Ok(Execution {
        tree,
        final_state: state,
        replans,
    })
}

/// The untraversed remainder, translated back to its originating todos:
/// the sources of the maximal subtrees containing no executed primitive,
/// in DFS order.
fn residual_todos(tree: &SolutionTree) -> Vec<Todo> {
    unexecuted_subtrees(tree)
        .into_iter()
        .filter_map(|id| tree.node(id).source_todo())
        .collect()
}

/// Roots of the maximal subtrees with no executed primitive, in DFS
/// order. Together they cover every unexecuted leaf.
fn unexecuted_subtrees(tree: &SolutionTree) -> Vec<NodeId> {
    fn any_executed(tree: &SolutionTree, id: NodeId) -> bool {
        let node = tree.node(id);
        if node.is_action() {
            return node.executed;
        }
        node.children.iter().any(|c| any_executed(tree, *c))
    }

    fn collect(tree: &SolutionTree, id: NodeId, out: &mut Vec<NodeId>) {
        for child in &tree.node(id).children {
            if any_executed(tree, *child) {
                collect(tree, *child, out);
            } else {
                out.push(*child);
            }
        }
    }

    let mut out = Vec::new();
    collect(tree, tree.root(), &mut out);
    out
}
