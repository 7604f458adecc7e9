//! Fact sets: unordered, deduplicated collections of facts.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::fact::{Fact, FactIdentity};

/// An unordered collection of facts, deduplicated by identity.
///
/// Insertion order is kept for presentation only; comparisons through
/// [`FactSet::set_eq`] ignore it. When two facts share an identity the first
/// one wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Fact>", into = "Vec<Fact>")]
pub struct FactSet {
    facts: Vec<Fact>,
}

impl FactSet {
    /// Create an empty fact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact. Returns false if a fact with the same identity exists.
    pub fn insert(&mut self, fact: Fact) -> bool {
        let identity = fact.identity();
        if self.facts.iter().any(|f| f.identity() == identity) {
            return false;
        }
        self.facts.push(fact);
        true
    }

    /// Number of facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Iterate over the facts in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.facts.iter()
    }

    /// The facts as a slice, in insertion order.
    pub fn as_slice(&self) -> &[Fact] {
        &self.facts
    }

    /// Whether a fact with equal content is present.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    /// The fact sharing `fact`'s identity, if any.
    pub fn get(&self, fact: &Fact) -> Option<&Fact> {
        let identity = fact.identity();
        self.facts.iter().find(|f| f.identity() == identity)
    }

    /// Order-insensitive content equality.
    pub fn set_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.facts.iter().all(|f| other.contains(f))
    }

    /// Facts present here but without an equal-content fact in `other`.
    pub fn difference(&self, other: &Self) -> Vec<Fact> {
        let theirs: HashSet<&Fact> = other.facts.iter().collect();
        self.facts
            .iter()
            .filter(|f| !theirs.contains(f))
            .cloned()
            .collect()
    }

    /// Index the facts by identity.
    pub fn by_identity(&self) -> HashMap<FactIdentity, &Fact> {
        self.facts.iter().map(|f| (f.identity(), f)).collect()
    }

    /// Consume the set, returning the facts in insertion order.
    pub fn into_vec(self) -> Vec<Fact> {
        self.facts
    }
}

impl PartialEq for FactSet {
    fn eq(&self, other: &Self) -> bool {
        self.set_eq(other)
    }
}

impl Eq for FactSet {}

impl FromIterator<Fact> for FactSet {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        Self {
            facts: iter.into_iter().unique_by(Fact::identity).collect(),
        }
    }
}

impl From<Vec<Fact>> for FactSet {
    fn from(facts: Vec<Fact>) -> Self {
        facts.into_iter().collect()
    }
}

impl From<FactSet> for Vec<Fact> {
    fn from(set: FactSet) -> Self {
        set.facts
    }
}

impl Extend<Fact> for FactSet {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        for fact in iter {
            self.insert(fact);
        }
    }
}

impl IntoIterator for FactSet {
    type Item = Fact;
    type IntoIter = std::vec::IntoIter<Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.into_iter()
    }
}

impl<'a> IntoIterator for &'a FactSet {
    type Item = &'a Fact;
    type IntoIter = std::slice::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.iter()
    }
}
