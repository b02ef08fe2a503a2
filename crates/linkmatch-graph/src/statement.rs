use serde::{Deserialize, Serialize};
use std::fmt;

use crate::term::Term;

/// A statement position, used to pick one of the graph's three indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Subject,
    Predicate,
    Object,
}

impl Position {
    pub const ALL: [Position; 3] = [Position::Subject, Position::Predicate, Position::Object];
}

/// One subject–predicate–object fact, optionally tagged with the document it
/// came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// Provenance: the source document (or graph) this statement was read from.
    pub why: Option<Term>,
}

impl Statement {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            why: None,
        }
    }

    pub fn with_why(mut self, why: Term) -> Self {
        self.why = Some(why);
        self
    }

    pub fn term(&self, position: Position) -> &Term {
        match position {
            Position::Subject => &self.subject,
            Position::Predicate => &self.predicate,
            Position::Object => &self.object,
        }
    }

    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}
