//! The solution tree: an ordered rose tree of planning nodes.
//!
//! Nodes are owned by value in a slab arena; parent and child links are
//! plain indices, so there are no reference cycles and dropping the tree
//! drops every node. The DFS order of the action leaves is the plan's
//! canonical linearisation.

use crate::domain::Todo;
use crate::state::{Goal, Multigoal, Value};
use crate::stn::Timepoint;
use slab::Slab;
use std::fmt;

/// Index of a node in its [SolutionTree]'s arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("n{_0}")]
pub struct NodeId(usize);

/// What a node stands for.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Wraps the caller's todo list.
    Root,
    Task {
        name: String,
        args: Vec<Value>,
    },
    Unigoal(Goal),
    Multigoal(Multigoal),
    /// A primitive leaf. Digests of the projected states on both sides
    /// make execution-time failure detection deterministic.
    Action {
        name: String,
        args: Vec<Value>,
        pre_digest: u64,
        post_digest: u64,
        start: Option<Timepoint>,
        end: Option<Timepoint>,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// The method that produced this node's children, for composite nodes.
    pub method: Option<String>,
    /// Whether a method has successfully expanded this node.
    pub expanded: bool,
    /// Whether the executor has applied this node (action leaves only).
    pub executed: bool,
}

impl Node {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Node {
            kind,
            parent,
            children: Vec::new(),
            method: None,
            expanded: false,
            executed: false,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, NodeKind::Action { .. })
    }

    /// The todo this node originated from, for residual re-planning.
    pub fn source_todo(&self) -> Option<Todo> {
        match &self.kind {
            NodeKind::Root => None,
            NodeKind::Task { name, args } => Some(Todo::Task {
                name: name.clone(),
                args: args.clone(),
            }),
            NodeKind::Unigoal(goal) => Some(Todo::Unigoal(goal.clone())),
            NodeKind::Multigoal(goals) => Some(Todo::Multigoal(goals.clone())),
            NodeKind::Action { name, args, .. } => Some(Todo::Action {
                name: name.clone(),
                args: args.clone(),
            }),
        }
    }
}

/// An arena-backed rose tree with a fixed root.
#[derive(Clone, Debug)]
pub struct SolutionTree {
    arena: Slab<Node>,
    root: NodeId,
}

impl SolutionTree {
    pub fn new() -> Self {
        let mut arena = Slab::new();
        let root = NodeId(arena.insert(Node::new(NodeKind::Root, None)));
        SolutionTree { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id.0)
    }

    /// Borrows a node. Panics on a stale id; ids are only minted by this
    /// tree and invalidated by subtree removal.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id.0)
    }

    /// Appends a new node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        debug_assert!(self.contains(parent));
        let id = NodeId(self.arena.insert(Node::new(kind, Some(parent))));
        self.arena[parent.0].children.push(id);
        id
    }

    /// Removes a single leaf-of-construction node: detaches it from its
    /// parent and frees it. Children must already be gone.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        debug_assert!(self.arena[id.0].children.is_empty());
        if let Some(parent) = self.arena[id.0].parent {
            self.arena[parent.0].children.retain(|c| *c != id);
        }
        self.arena.remove(id.0);
    }

    /// Removes `id` and every descendant. The root cannot be removed.
    pub fn remove_subtree(&mut self, id: NodeId) {
        assert_ne!(id, self.root, "the root node is fixed");
        if let Some(parent) = self.arena[id.0].parent {
            self.arena[parent.0].children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = self.arena.remove(next.0);
            stack.extend(node.children);
        }
    }

    /// Deep-copies the subtree of `other` rooted at `other_node` as the
    /// last child of `parent`, returning the new subtree root's id.
    pub fn graft(&mut self, parent: NodeId, other: &SolutionTree, other_node: NodeId) -> NodeId {
        let copied = other.node(other_node);
        let id = self.append_child(parent, copied.kind.clone());
        {
            let node = self.node_mut(id);
            node.method = copied.method.clone();
            node.expanded = copied.expanded;
            node.executed = copied.executed;
        }
        for child in copied.children.clone() {
            self.graft(id, other, child);
        }
        id
    }

    /// Replaces the subtree at `id` with a copy of the subtree of `other`
    /// rooted at `other_node`, keeping the child position.
    pub fn replace_subtree(
        &mut self,
        id: NodeId,
        other: &SolutionTree,
        other_node: NodeId,
    ) -> NodeId {
        assert_ne!(id, self.root, "the root node is fixed");
        let parent = self.node(id).parent.expect("non-root node has a parent");
        let position = self
            .node(parent)
            .children
            .iter()
            .position(|c| *c == id)
            .expect("child is linked from its parent");
        let new_id = self.graft(parent, other, other_node);
        // Slot the copy where the old subtree was, then drop the old one.
        let children = &mut self.node_mut(parent).children;
        let moved = children.pop().expect("graft appended a child");
        children.insert(position, moved);
        self.remove_subtree(id);
        new_id
    }

    /// All node ids in depth-first preorder.
    pub fn dfs(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self.arena[id.0];
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// Action leaves in depth-first order: the canonical linearisation.
    pub fn iter_primitives_dfs(&self) -> Vec<NodeId> {
        self.dfs()
            .into_iter()
            .filter(|id| self.node(*id).is_action())
            .collect()
    }

    /// The primitive sequence as `(name, args)` pairs, for display and
    /// assertions.
    pub fn primitives(&self) -> Vec<(String, Vec<Value>)> {
        self.iter_primitives_dfs()
            .into_iter()
            .map(|id| match &self.node(id).kind {
                NodeKind::Action { name, args, .. } => (name.clone(), args.clone()),
                _ => unreachable!("iter_primitives_dfs only yields actions"),
            })
            .collect()
    }
}

impl Default for SolutionTree {
    fn default() -> Self {
        SolutionTree::new()
    }
}

impl fmt::Display for SolutionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn visit(
            tree: &SolutionTree,
            id: NodeId,
            depth: usize,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            let node = tree.node(id);
            let indent = "  ".repeat(depth);
            match node.source_todo() {
                None => writeln!(f, "{indent}root")?,
                Some(todo) => match &node.method {
                    Some(method) => writeln!(f, "{indent}{todo} via {method}")?,
                    None => writeln!(f, "{indent}{todo}")?,
                },
            }
            for child in &node.children {
                visit(tree, *child, depth + 1, f)?;
            }
            Ok(())
        }
        visit(self, self.root, 0, f)
    }
}
