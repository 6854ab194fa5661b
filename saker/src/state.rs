//! The relational fact store that serves as the planner's world model.
//!
//! A [State] is a set of `(predicate, subject) -> value` triples. Methods
//! query it, actions produce new copies of it, and the search clones it
//! freely at every backtrack point. The backing map is copy-on-write, so
//! those clones share structure, and it is key-ordered, so every
//! enumeration (and therefore every plan) is deterministic.

use ahash::RandomState;
use derive_more::Deref;
use immutable_chunkmap::map::MapM;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

/// A fact value. Arbitrary but totally comparable, so states can be
/// diffed, hashed, and enumerated in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Present-with-nil, distinct from an absent key.
    Nil,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f.0),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A single `(predicate, subject, value)` triple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub subject: String,
    pub value: Value,
}

impl Fact {
    pub fn new(
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Fact {
            predicate: predicate.into(),
            subject: subject.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.predicate, self.subject, self.value)
    }
}

/// A single-triple goal: make `(predicate, subject)` hold `value`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Goal {
    pub predicate: String,
    pub subject: String,
    pub value: Value,
}

impl Goal {
    pub fn new(
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Goal {
            predicate: predicate.into(),
            subject: subject.into(),
            value: value.into(),
        }
    }

    pub fn satisfied_in(&self, state: &State) -> bool {
        state.matches(&self.predicate, &self.subject, &self.value)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.predicate, self.subject, self.value)
    }
}

/// A set of unigoals to be achieved jointly.
///
/// Goals are kept in insertion order with at most one value per
/// `(predicate, subject)` pair, mirroring the state invariant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
pub struct Multigoal {
    pub label: String,
    #[deref]
    goals: Vec<Goal>,
}

impl Multigoal {
    pub fn new(label: impl Into<String>) -> Self {
        Multigoal {
            label: label.into(),
            goals: Vec::new(),
        }
    }

    /// Adds a goal, replacing any previous goal on the same
    /// `(predicate, subject)`.
    pub fn set_goal(
        &mut self,
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let goal = Goal::new(predicate, subject, value);
        if let Some(existing) = self
            .goals
            .iter_mut()
            .find(|g| g.predicate == goal.predicate && g.subject == goal.subject)
        {
            *existing = goal;
        } else {
            self.goals.push(goal);
        }
    }

    pub fn with_goal(
        mut self,
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_goal(predicate, subject, value);
        self
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// The goal value for `(predicate, subject)`, if one is registered.
    pub fn goal_for(&self, predicate: &str, subject: &str) -> Option<&Value> {
        self.goals
            .iter()
            .find(|g| g.predicate == predicate && g.subject == subject)
            .map(|g| &g.value)
    }

    pub fn satisfied_in(&self, state: &State) -> bool {
        self.goals.iter().all(|g| g.satisfied_in(state))
    }

    pub fn unsatisfied_in(&self, state: &State) -> Vec<Goal> {
        self.goals
            .iter()
            .filter(|g| !g.satisfied_in(state))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Multigoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.label)?;
        for (i, g) in self.goals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{g}")?;
        }
        write!(f, "}}")
    }
}

/// A wildcard-capable query over the triple store. `None` in any position
/// matches everything.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Pattern {
    pub predicate: Option<String>,
    pub subject: Option<String>,
    pub value: Option<Value>,
}

impl Pattern {
    pub fn any() -> Self {
        Pattern::default()
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn matches(&self, fact: &Fact) -> bool {
        self.predicate.as_deref().is_none_or(|p| p == fact.predicate)
            && self.subject.as_deref().is_none_or(|s| s == fact.subject)
            && self.value.as_ref().is_none_or(|v| *v == fact.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    predicate: String,
    subject: String,
}

/// The world model: a mapping from `(predicate, subject)` to [Value].
///
/// Pure value semantics. All mutating operations go through `&mut self`
/// and observable effects are confined to this value; cloning is cheap
/// because the backing map shares structure.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Fact>", into = "Vec<Fact>")]
pub struct State {
    facts: MapM<Key, Value>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.len() == 0
    }

    /// Sets `(predicate, subject)` to `value`, replacing any previous value.
    pub fn set(
        &mut self,
        predicate: impl Into<String>,
        subject: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let key = Key {
            predicate: predicate.into(),
            subject: subject.into(),
        };
        self.facts = self.facts.insert(key, value.into()).0;
    }

    pub fn get(&self, predicate: &str, subject: &str) -> Option<&Value> {
        let key = Key {
            predicate: predicate.to_owned(),
            subject: subject.to_owned(),
        };
        self.facts.get(&key)
    }

    pub fn has(&self, predicate: &str, subject: &str) -> bool {
        self.get(predicate, subject).is_some()
    }

    pub fn remove(&mut self, predicate: &str, subject: &str) -> Option<Value> {
        let key = Key {
            predicate: predicate.to_owned(),
            subject: subject.to_owned(),
        };
        let (facts, old) = self.facts.remove(&key);
        self.facts = facts;
        old
    }

    /// True when `(predicate, subject)` currently holds exactly `value`.
    pub fn matches(&self, predicate: &str, subject: &str, value: &Value) -> bool {
        self.get(predicate, subject) == Some(value)
    }

    pub fn satisfies(&self, goal: &Goal) -> bool {
        goal.satisfied_in(self)
    }

    /// Subjects for which `predicate` holds exactly `value`, in key order.
    pub fn subjects_with(&self, predicate: &str, value: &Value) -> Vec<&str> {
        (&self.facts)
            .into_iter()
            .filter(|(k, v)| k.predicate == predicate && *v == value)
            .map(|(k, _)| k.subject.as_str())
            .collect()
    }

    /// All subjects for which `predicate` holds any value, in key order.
    pub fn subjects_with_pred(&self, predicate: &str) -> Vec<&str> {
        (&self.facts)
            .into_iter()
            .filter(|(k, _)| k.predicate == predicate)
            .map(|(k, _)| k.subject.as_str())
            .collect()
    }

    pub fn triples(&self) -> Vec<Fact> {
        (&self.facts)
            .into_iter()
            .map(|(k, v)| Fact {
                predicate: k.predicate.clone(),
                subject: k.subject.clone(),
                value: v.clone(),
            })
            .collect()
    }

    pub fn from_triples(triples: impl IntoIterator<Item = Fact>) -> Self {
        let mut state = State::new();
        for fact in triples {
            state.set(fact.predicate, fact.subject, fact.value);
        }
        state
    }

    /// Merges `other` into a new state; `other` wins on conflicting keys.
    pub fn merge(&self, other: &State) -> State {
        let mut merged = self.clone();
        for (k, v) in &other.facts {
            merged.facts = merged.facts.insert(k.clone(), v.clone()).0;
        }
        merged
    }

    /// Facts matching `pattern`, in key order.
    pub fn query(&self, pattern: &Pattern) -> Vec<Fact> {
        self.triples()
            .into_iter()
            .filter(|fact| pattern.matches(fact))
            .collect()
    }

    /// A stable digest of the full fact set.
    ///
    /// Seeds are pinned so the digest is reproducible across runs; action
    /// leaves record these for deterministic failure detection.
    pub fn digest(&self) -> u64 {
        let mut hasher =
            RandomState::with_seeds(0x5a4e_11a7_e001, 0x5a4e_11a7_e002, 0x5a4e_11a7_e003, 0x5a4e_11a7_e004)
                .build_hasher();
        for (k, v) in &self.facts {
            k.predicate.hash(&mut hasher);
            k.subject.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && (&self.facts)
                .into_iter()
                .zip(&other.facts)
                .all(|(a, b)| a == b)
    }
}

impl Eq for State {}

impl From<Vec<Fact>> for State {
    fn from(triples: Vec<Fact>) -> Self {
        State::from_triples(triples)
    }
}

impl From<State> for Vec<Fact> {
    fn from(state: State) -> Self {
        state.triples()
    }
}

impl FromIterator<Fact> for State {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        State::from_triples(iter)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.triples()).finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fact in self.triples() {
            writeln!(f, "{fact}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> State {
        let mut s = State::new();
        s.set("pos", "a", "b");
        s.set("pos", "b", "table");
        s.set("clear", "a", true);
        s.set("clear", "b", false);
        s
    }

    #[test]
    fn get_reflects_most_recent_write() {
        let mut s = sample();
        assert_eq!(s.get("pos", "a"), Some(&Value::from("b")));
        s.set("pos", "a", "table");
        assert_eq!(s.get("pos", "a"), Some(&Value::from("table")));
        s.remove("pos", "a");
        assert_eq!(s.get("pos", "a"), None);
        assert!(!s.has("pos", "a"));
    }

    #[test]
    fn absent_is_distinct_from_nil() {
        let mut s = State::new();
        s.set("holding", "hand", Value::Nil);
        assert_eq!(s.get("holding", "hand"), Some(&Value::Nil));
        assert_eq!(s.get("holding", "other"), None);
    }

    #[test]
    fn merge_is_right_biased() {
        let mut left = sample();
        left.set("extra", "x", 1);
        let mut right = State::new();
        right.set("pos", "a", "c");
        let merged = left.merge(&right);
        assert_eq!(merged.get("pos", "a"), Some(&Value::from("c")));
        assert_eq!(merged.get("extra", "x"), Some(&Value::from(1)));
        assert_eq!(merged.get("pos", "b"), Some(&Value::from("table")));
    }

    #[test]
    fn query_wildcards() {
        let s = sample();
        assert_eq!(s.query(&Pattern::any()).len(), 4);
        assert_eq!(s.query(&Pattern::any().predicate("pos")).len(), 2);
        assert_eq!(s.query(&Pattern::any().subject("a")).len(), 2);
        let on_table = s.query(&Pattern::any().predicate("pos").value("table"));
        assert_eq!(on_table, vec![Fact::new("pos", "b", "table")]);
    }

    #[test]
    fn subject_enumeration_is_ordered() {
        let mut s = State::new();
        s.set("pos", "c", "table");
        s.set("pos", "a", "table");
        s.set("pos", "b", "hand");
        assert_eq!(s.subjects_with_pred("pos"), vec!["a", "b", "c"]);
        assert_eq!(
            s.subjects_with("pos", &Value::from("table")),
            vec!["a", "c"]
        );
    }

    #[test]
    fn triple_round_trip() {
        let s = sample();
        let back = State::from_triples(s.triples());
        assert_eq!(s, back);
        assert_eq!(s.digest(), back.digest());
    }

    #[test]
    fn digest_tracks_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.digest(), b.digest());
        b.set("clear", "b", true);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn multigoal_replaces_same_key() {
        let mut mg = Multigoal::new("g");
        mg.set_goal("pos", "a", "b");
        mg.set_goal("pos", "a", "c");
        assert_eq!(mg.goals().len(), 1);
        assert_eq!(mg.goal_for("pos", "a"), Some(&Value::from("c")));
    }
}
