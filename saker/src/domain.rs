//! The planning domain: action and method catalogues, the entity
//! registry, and per-action temporal specs.
//!
//! A [Domain] is declared once through [DomainBuilder] with explicit
//! string names (nothing is inferred from function values) and is
//! read-only for the lifetime of every planning call that borrows it.
//! Method order is declaration order; the search tries methods in that
//! order and backtracks through them.

use crate::duration::{DurationError, DurationSpec};
use crate::optimize::DependencySplitter;
use crate::state::{Goal, Multigoal, State, Value};
use crate::stn::Window;
use anyhow::Result;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A unit of work for the planner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Todo {
    /// A primitive, resolved against the action catalogue.
    Action { name: String, args: Vec<Value> },
    /// A composite, resolved against the task-method catalogue.
    Task { name: String, args: Vec<Value> },
    /// Make one triple hold.
    Unigoal(Goal),
    /// Make a set of triples hold jointly.
    Multigoal(Multigoal),
}

impl Todo {
    pub fn action(
        name: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        Todo::Action {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn task(
        name: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        Todo::Task {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unigoal(
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Todo::Unigoal(Goal::new(predicate, subject, value))
    }

    pub fn multigoal(goals: Multigoal) -> Self {
        Todo::Multigoal(goals)
    }
}

impl fmt::Display for Todo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Todo::Action { name, args } | Todo::Task { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Todo::Unigoal(goal) => write!(f, "{goal}"),
            Todo::Multigoal(goals) => write!(f, "{goals}"),
        }
    }
}

/// Applies a primitive to the state, returning the successor state.
/// Pure with respect to the core: no ambient reads or writes.
pub type ActionFn = Arc<dyn Fn(&State, &[Value]) -> Result<State> + Send + Sync>;

/// Decomposes a task into subordinate todos, or fails.
pub type TaskMethodFn = Arc<dyn Fn(&State, &[Value]) -> Result<Vec<Todo>> + Send + Sync>;

/// Decomposes a `(predicate, subject, value)` goal into todos, or fails.
pub type UnigoalMethodFn = Arc<dyn Fn(&State, &str, &Value) -> Result<Vec<Todo>> + Send + Sync>;

/// Chooses how to attack a multigoal, or fails.
pub type MultigoalMethodFn = Arc<dyn Fn(&State, &Multigoal) -> Result<Vec<Todo>> + Send + Sync>;

/// Where an extra per-action constraint anchors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointRef {
    /// The wall-clock zero.
    Origin,
    Start,
    End,
}

/// A `to − from ∈ window` constraint posted against the action's own
/// interval when it is expanded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub from: EndpointRef,
    pub to: EndpointRef,
    pub window: Window,
}

impl ConstraintSpec {
    pub fn new(from: EndpointRef, to: EndpointRef, window: Window) -> Self {
        ConstraintSpec { from, to, window }
    }

    /// The action must be over within `ticks` of the wall-clock zero.
    pub fn deadline(ticks: crate::duration::Ticks) -> Self {
        ConstraintSpec {
            from: EndpointRef::Origin,
            to: EndpointRef::End,
            window: Window::between(0, ticks),
        }
    }

    /// The action may not begin before `ticks` past the wall-clock zero.
    pub fn earliest_start(ticks: crate::duration::Ticks) -> Self {
        ConstraintSpec {
            from: EndpointRef::Origin,
            to: EndpointRef::Start,
            window: Window::at_least(ticks),
        }
    }
}

/// An entity kind and what it can do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub capabilities: Vec<String>,
}

/// A concrete entity available to the planner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: String,
}

/// An action's claim on an entity of some kind, optionally narrowed to a
/// capability of that kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRequirement {
    pub kind: String,
    pub capability: Option<String>,
}

impl EntityRequirement {
    pub fn kind(kind: impl Into<String>) -> Self {
        EntityRequirement {
            kind: kind.into(),
            capability: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }
}

/// Declared entity types and entities, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistry {
    types: Vec<EntityType>,
    entities: Vec<Entity>,
}

impl EntityRegistry {
    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entities_of(&self, kind: &str) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    /// Whether `kind` offers `capability`.
    pub fn kind_has_capability(&self, kind: &str, capability: &str) -> bool {
        self.entity_type(kind)
            .is_some_and(|t| t.capabilities.iter().any(|c| c == capability))
    }
}

/// A registered primitive.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    func: ActionFn,
    pub duration: Option<DurationSpec>,
    pub requires: Vec<EntityRequirement>,
    pub constraints: Vec<ConstraintSpec>,
}

impl Action {
    pub fn apply(&self, state: &State, args: &[Value]) -> Result<State> {
        (self.func)(state, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("duration", &self.duration)
            .field("requires", &self.requires)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

/// Registration metadata for an action beyond its function.
#[derive(Clone, Debug, Default)]
pub struct ActionMeta {
    pub duration: Option<DurationSpec>,
    pub requires: Vec<EntityRequirement>,
    pub constraints: Vec<ConstraintSpec>,
}

impl ActionMeta {
    pub fn duration(mut self, spec: DurationSpec) -> Self {
        self.duration = Some(spec);
        self
    }

    pub fn requires(mut self, requirement: EntityRequirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// One way of decomposing a task.
#[derive(Clone)]
pub struct TaskMethod {
    pub id: String,
    func: TaskMethodFn,
}

impl TaskMethod {
    pub fn expand(&self, state: &State, args: &[Value]) -> Result<Vec<Todo>> {
        (self.func)(state, args)
    }
}

impl fmt::Debug for TaskMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskMethod({})", self.id)
    }
}

/// One way of achieving a goal on a given predicate.
#[derive(Clone)]
pub struct UnigoalMethod {
    pub id: String,
    func: UnigoalMethodFn,
}

impl UnigoalMethod {
    pub fn expand(&self, state: &State, subject: &str, value: &Value) -> Result<Vec<Todo>> {
        (self.func)(state, subject, value)
    }
}

impl fmt::Debug for UnigoalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnigoalMethod({})", self.id)
    }
}

/// One way of attacking a multigoal.
#[derive(Clone)]
pub struct MultigoalMethod {
    pub id: String,
    func: MultigoalMethodFn,
}

impl MultigoalMethod {
    pub fn new(
        id: impl Into<String>,
        func: impl Fn(&State, &Multigoal) -> Result<Vec<Todo>> + Send + Sync + 'static,
    ) -> Self {
        MultigoalMethod {
            id: id.into(),
            func: Arc::new(func),
        }
    }

    pub fn expand(&self, state: &State, goals: &Multigoal) -> Result<Vec<Todo>> {
        (self.func)(state, goals)
    }
}

impl fmt::Debug for MultigoalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultigoalMethod({})", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum DomainError {
    #[display("duplicate action {name:?}")]
    DuplicateAction { name: String },
    #[display("duplicate entity {id:?}")]
    DuplicateEntity { id: String },
    #[display("action {action:?} has an invalid duration: {source}")]
    InvalidDuration {
        action: String,
        source: DurationError,
    },
    #[display("action {action:?} requires undeclared entity type {kind:?}")]
    UnknownEntityType { action: String, kind: String },
    #[display("action {action:?} requires capability {capability:?} that type {kind:?} lacks")]
    MissingCapability {
        action: String,
        kind: String,
        capability: String,
    },
    #[display("action {action:?} declares an empty constraint window {window}")]
    EmptyConstraint { action: String, window: Window },
}

/// The complete, validated planning domain. Read-only at planning time;
/// concurrent planning calls share it freely.
#[derive(Clone, Debug)]
pub struct Domain {
    pub name: String,
    actions: HashMap<String, Action>,
    task_methods: HashMap<String, Vec<TaskMethod>>,
    unigoal_methods: HashMap<String, Vec<UnigoalMethod>>,
    multigoal_methods: Vec<MultigoalMethod>,
    entities: EntityRegistry,
}

impl Domain {
    pub fn builder(name: impl Into<String>) -> DomainBuilder {
        DomainBuilder::new(name)
    }

    pub fn get_action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Task methods in declaration order, if the task is known.
    pub fn methods_for_task(&self, name: &str) -> Option<&[TaskMethod]> {
        self.task_methods.get(name).map(Vec::as_slice)
    }

    /// Unigoal methods for a predicate in declaration order, if any.
    pub fn methods_for_goal(&self, predicate: &str) -> Option<&[UnigoalMethod]> {
        self.unigoal_methods.get(predicate).map(Vec::as_slice)
    }

    pub fn multigoal_methods(&self) -> &[MultigoalMethod] {
        &self.multigoal_methods
    }

    pub fn duration_of(&self, name: &str) -> Option<&DurationSpec> {
        self.actions.get(name).and_then(|a| a.duration.as_ref())
    }

    pub fn constraints_of(&self, name: &str) -> &[ConstraintSpec] {
        self.actions
            .get(name)
            .map(|a| a.constraints.as_slice())
            .unwrap_or(&[])
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }
}

/// Declarative, explicitly-named registration for a [Domain].
pub struct DomainBuilder {
    name: String,
    actions: Vec<Action>,
    task_methods: Vec<(String, TaskMethod)>,
    unigoal_methods: Vec<(String, UnigoalMethod)>,
    multigoal_methods: Vec<MultigoalMethod>,
    entities: EntityRegistry,
    default_splitter: bool,
}

impl DomainBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DomainBuilder {
            name: name.into(),
            actions: Vec::new(),
            task_methods: Vec::new(),
            unigoal_methods: Vec::new(),
            multigoal_methods: Vec::new(),
            entities: EntityRegistry::default(),
            default_splitter: true,
        }
    }

    /// Registers a primitive with no metadata.
    pub fn action(
        self,
        name: impl Into<String>,
        func: impl Fn(&State, &[Value]) -> Result<State> + Send + Sync + 'static,
    ) -> Self {
        self.action_with(name, func, ActionMeta::default())
    }

    /// Registers a primitive with duration, entity, and constraint
    /// metadata.
    pub fn action_with(
        mut self,
        name: impl Into<String>,
        func: impl Fn(&State, &[Value]) -> Result<State> + Send + Sync + 'static,
        meta: ActionMeta,
    ) -> Self {
        self.actions.push(Action {
            name: name.into(),
            func: Arc::new(func),
            duration: meta.duration,
            requires: meta.requires,
            constraints: meta.constraints,
        });
        self
    }

    /// Registers a task method. Methods for the same task are tried in
    /// registration order.
    pub fn task_method(
        mut self,
        task: impl Into<String>,
        id: impl Into<String>,
        func: impl Fn(&State, &[Value]) -> Result<Vec<Todo>> + Send + Sync + 'static,
    ) -> Self {
        self.task_methods.push((
            task.into(),
            TaskMethod {
                id: id.into(),
                func: Arc::new(func),
            },
        ));
        self
    }

    /// Registers a unigoal method for a predicate. Methods for the same
    /// predicate are tried in registration order.
    pub fn unigoal_method(
        mut self,
        predicate: impl Into<String>,
        id: impl Into<String>,
        func: impl Fn(&State, &str, &Value) -> Result<Vec<Todo>> + Send + Sync + 'static,
    ) -> Self {
        self.unigoal_methods.push((
            predicate.into(),
            UnigoalMethod {
                id: id.into(),
                func: Arc::new(func),
            },
        ));
        self
    }

    /// Registers a multigoal method ahead of the default splitter.
    pub fn multigoal_method(
        mut self,
        id: impl Into<String>,
        func: impl Fn(&State, &Multigoal) -> Result<Vec<Todo>> + Send + Sync + 'static,
    ) -> Self {
        self.multigoal_methods.push(MultigoalMethod::new(id, func));
        self
    }

    /// Declares an entity type and its capabilities.
    pub fn entity_type(
        mut self,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entities.types.push(EntityType {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declares a concrete entity of a declared type.
    pub fn entity(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.entities.entities.push(Entity {
            id: id.into(),
            kind: kind.into(),
        });
        self
    }

    /// Suppresses the default goal-ordering multigoal method.
    pub fn without_default_multigoal_method(mut self) -> Self {
        self.default_splitter = false;
        self
    }

    /// Validates the declarations and produces the immutable [Domain].
    pub fn build(self) -> Result<Domain, DomainError> {
        let mut actions = HashMap::new();
        for action in self.actions {
            if let Some(spec) = &action.duration {
                spec.validate().map_err(|source| DomainError::InvalidDuration {
                    action: action.name.clone(),
                    source,
                })?;
            }
            for requirement in &action.requires {
                let Some(entity_type) = self.entities.entity_type(&requirement.kind) else {
                    return Err(DomainError::UnknownEntityType {
                        action: action.name.clone(),
                        kind: requirement.kind.clone(),
                    });
                };
                if let Some(capability) = &requirement.capability {
                    if !entity_type.capabilities.iter().any(|c| c == capability) {
                        return Err(DomainError::MissingCapability {
                            action: action.name.clone(),
                            kind: requirement.kind.clone(),
                            capability: capability.clone(),
                        });
                    }
                }
            }
            for constraint in &action.constraints {
                if constraint.window.is_empty() {
                    return Err(DomainError::EmptyConstraint {
                        action: action.name.clone(),
                        window: constraint.window,
                    });
                }
            }
            let name = action.name.clone();
            if actions.insert(name.clone(), action).is_some() {
                return Err(DomainError::DuplicateAction { name });
            }
        }

        let mut seen_entities = std::collections::HashSet::new();
        for entity in &self.entities.entities {
            if !seen_entities.insert(entity.id.clone()) {
                return Err(DomainError::DuplicateEntity {
                    id: entity.id.clone(),
                });
            }
        }

        let mut task_methods: HashMap<String, Vec<TaskMethod>> = HashMap::new();
        for (task, method) in self.task_methods {
            task_methods.entry(task).or_default().push(method);
        }
        let mut unigoal_methods: HashMap<String, Vec<UnigoalMethod>> = HashMap::new();
        for (predicate, method) in self.unigoal_methods {
            unigoal_methods.entry(predicate).or_default().push(method);
        }

        let mut multigoal_methods = self.multigoal_methods;
        if self.default_splitter {
            multigoal_methods.push(DependencySplitter::default().into_method());
        }

        Ok(Domain {
            name: self.name,
            actions,
            task_methods,
            unigoal_methods,
            multigoal_methods,
            entities: self.entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_duplicate_actions() {
        let result = Domain::builder("d")
            .action("noop", |state, _| Ok(state.clone()))
            .action("noop", |state, _| Ok(state.clone()))
            .build();
        assert!(matches!(result, Err(DomainError::DuplicateAction { .. })));
    }

    #[test]
    fn builder_rejects_bad_duration() {
        let result = Domain::builder("d")
            .action_with(
                "noop",
                |state, _| Ok(state.clone()),
                ActionMeta::default().duration(DurationSpec::variable(9, 3)),
            )
            .build();
        assert!(matches!(result, Err(DomainError::InvalidDuration { .. })));
    }

    #[test]
    fn builder_checks_entity_requirements() {
        let missing_type = Domain::builder("d")
            .action_with(
                "grab",
                |state, _| Ok(state.clone()),
                ActionMeta::default().requires(EntityRequirement::kind("arm")),
            )
            .build();
        assert!(matches!(
            missing_type,
            Err(DomainError::UnknownEntityType { .. })
        ));

        let missing_capability = Domain::builder("d")
            .entity_type("arm", ["reach"])
            .action_with(
                "grab",
                |state, _| Ok(state.clone()),
                ActionMeta::default()
                    .requires(EntityRequirement::kind("arm").with_capability("grip")),
            )
            .build();
        assert!(matches!(
            missing_capability,
            Err(DomainError::MissingCapability { .. })
        ));
    }

    #[test]
    fn method_order_is_declaration_order() {
        let domain = Domain::builder("d")
            .task_method("travel", "walk", |_, _| Ok(vec![]))
            .task_method("travel", "drive", |_, _| Ok(vec![]))
            .build()
            .unwrap();
        let ids: Vec<_> = domain
            .methods_for_task("travel")
            .unwrap()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["walk", "drive"]);
    }

    #[test]
    fn default_splitter_is_installed_last() {
        let domain = Domain::builder("d")
            .multigoal_method("mine", |_, _| Ok(vec![]))
            .build()
            .unwrap();
        let ids: Vec<_> = domain
            .multigoal_methods()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["mine", "displace_then_place"]);

        let bare = Domain::builder("d")
            .without_default_multigoal_method()
            .build()
            .unwrap();
        assert!(bare.multigoal_methods().is_empty());
    }
}
