//! Port capability model
//!
//! A port is described by a set of `(subject, predicate, object)` facts.
//! The predicate says whether the step `uses` or `provides` the data named
//! by the object. Two ports can be connected when one provides an object
//! that the other uses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Conventional subject for port triples
pub const PORT_SUBJECT: &str = "http://physiomeproject.org/workflow/1.0/rdf-schema#port";

/// Conventional namespaced `uses` predicate
pub const USES: &str = "http://physiomeproject.org/workflow/1.0/rdf-schema#uses";

/// Conventional namespaced `provides` predicate
pub const PROVIDES: &str = "http://physiomeproject.org/workflow/1.0/rdf-schema#provides";

/// A single capability fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// A `provides` fact for the given data type, using the port subject
    pub fn provides(object: impl Into<String>) -> Self {
        Self::new(PORT_SUBJECT, PROVIDES, object)
    }

    /// A `uses` fact for the given data type, using the port subject
    pub fn uses(object: impl Into<String>) -> Self {
        Self::new(PORT_SUBJECT, USES, object)
    }

    /// Polarity of this fact, if its predicate is one we understand
    pub fn polarity(&self) -> Option<Polarity> {
        Polarity::of(&self.predicate)
    }
}

/// Direction of data flow through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Uses,
    Provides,
}

impl Polarity {
    /// Classify a predicate by suffix, so namespaced and bare forms agree
    pub fn of(predicate: &str) -> Option<Self> {
        if predicate.ends_with("provides") {
            Some(Self::Provides)
        } else if predicate.ends_with("uses") {
            Some(Self::Uses)
        } else {
            None
        }
    }
}

/// A connection point on a step
///
/// Triples live in an append-only arena; the three indexes map a key to
/// positions in that arena.
#[derive(Debug, Clone, Default)]
pub struct Port {
    triples: Vec<Triple>,
    by_subject: HashMap<String, Vec<usize>>,
    by_predicate: HashMap<String, Vec<usize>>,
    by_object: HashMap<String, Vec<usize>>,
}

impl Port {
    /// Create an empty port
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a port seeded with one triple
    pub fn with_triple(triple: Triple) -> Self {
        let mut port = Self::new();
        port.add(triple);
        port
    }

    /// Port that provides `object`
    pub fn provides(object: impl Into<String>) -> Self {
        Self::with_triple(Triple::provides(object))
    }

    /// Port that uses `object`
    pub fn uses(object: impl Into<String>) -> Self {
        Self::with_triple(Triple::uses(object))
    }

    /// Record a fact in all three indexes
    pub fn add_triple(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) {
        self.add(Triple::new(subject, predicate, object));
    }

    /// Record an already-built triple
    pub fn add(&mut self, triple: Triple) {
        let position = self.triples.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(position);
        self.by_predicate
            .entry(triple.predicate.clone())
            .or_default()
            .push(position);
        self.by_object
            .entry(triple.object.clone())
            .or_default()
            .push(position);
        self.triples.push(triple);
    }

    /// All triples, in insertion order
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn triples_for_subject(&self, subject: &str) -> Vec<&Triple> {
        self.lookup(&self.by_subject, subject)
    }

    pub fn triples_for_predicate(&self, predicate: &str) -> Vec<&Triple> {
        self.lookup(&self.by_predicate, predicate)
    }

    pub fn triples_for_object(&self, object: &str) -> Vec<&Triple> {
        self.lookup(&self.by_object, object)
    }

    fn lookup<'a>(&'a self, index: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&'a Triple> {
        index
            .get(key)
            .map(|positions| positions.iter().map(|&i| &self.triples[i]).collect())
            .unwrap_or_default()
    }

    /// Objects this port carries with the given polarity
    pub fn objects(&self, polarity: Polarity) -> impl Iterator<Item = &str> + '_ {
        self.triples
            .iter()
            .filter(move |t| t.polarity() == Some(polarity))
            .map(|t| t.object.as_str())
    }

    /// Whether any triple on this port has the given polarity
    pub fn has_polarity(&self, polarity: Polarity) -> bool {
        self.objects(polarity).next().is_some()
    }

    /// Check whether this port (provider side) can feed `other` (consumer side)
    ///
    /// Directional: call with the providing port as `self`.
    pub fn can_connect(&self, other: &Port) -> bool {
        self.objects(Polarity::Provides)
            .any(|provided| other.objects(Polarity::Uses).any(|used| used == provided))
    }

    /// Compatibility when the caller does not know which side provides
    pub fn compatible_either_way(&self, other: &Port) -> bool {
        self.can_connect(other) || other.can_connect(self)
    }
}
