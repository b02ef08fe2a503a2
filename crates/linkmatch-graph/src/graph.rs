//! Indexed statement store.
//!
//! The store keeps statements in insertion order plus one index per position
//! (subject, predicate, object), keyed by the *canonical* form of a term
//! (collections are canonicalized element by element). Terms
//! that have been found to denote the same thing are merged with
//! [`Graph::equate`]; the loser gets an entry in the redirection table and its
//! index buckets move under the survivor's key.
//!
//! Invariants:
//! - indices only grow; a slice handed out earlier is never invalidated by
//!   later additions (callers that clone a bucket keep a valid snapshot);
//! - a redirection always points from a canonical term to another canonical
//!   term at the time it is recorded, so the redirection table is acyclic and
//!   [`Graph::canonical`] terminates;
//! - `generation` increases on every mutation.

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;

use crate::statement::{Position, Statement};
use crate::term::Term;

/// A graph shared between a running search and whatever appends fetched data.
pub type SharedGraph = Arc<RwLock<Graph>>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("cannot merge variable {0}: only data terms can be equated")]
    VariableMerge(Term),
}

#[derive(Debug, Default)]
pub struct Graph {
    statements: Vec<Arc<Statement>>,
    seen: AHashSet<Arc<Statement>>,
    subject_index: AHashMap<Term, Vec<Arc<Statement>>>,
    predicate_index: AHashMap<Term, Vec<Arc<Statement>>>,
    object_index: AHashMap<Term, Vec<Arc<Statement>>>,
    /// `term -> representative` for merged terms.
    redirections: AHashMap<Term, Term>,
    generation: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All statements in insertion order.
    pub fn statements(&self) -> &[Arc<Statement>] {
        &self.statements
    }

    pub fn redirection_count(&self) -> usize {
        self.redirections.len()
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Append a statement. Returns `false` if an identical statement is
    /// already present.
    pub fn add(&mut self, statement: Statement) -> bool {
        if self.seen.contains(&statement) {
            return false;
        }
        let statement = Arc::new(statement);
        for position in Position::ALL {
            let key = self.index_key(statement.term(position)).into_owned();
            self.index_mut(position)
                .entry(key)
                .or_default()
                .push(Arc::clone(&statement));
        }
        self.seen.insert(Arc::clone(&statement));
        self.statements.push(statement);
        self.generation += 1;
        true
    }

    /// Convenience for `add(Statement::new(s, p, o))`.
    pub fn add_triple(&mut self, subject: Term, predicate: Term, object: Term) -> bool {
        self.add(Statement::new(subject, predicate, object))
    }

    /// Record that `a` and `b` denote the same thing. Returns the surviving
    /// canonical term.
    pub fn equate(&mut self, a: &Term, b: &Term) -> Result<Term, GraphError> {
        let ca = self.index_key(a).into_owned();
        let cb = self.index_key(b).into_owned();
        for t in [&ca, &cb] {
            if matches!(t, Term::Variable(_)) {
                return Err(GraphError::VariableMerge(t.clone()));
            }
        }
        if ca == cb {
            return Ok(ca);
        }

        let (keep, lose) = if (ca.canonical_rank(), &ca) <= (cb.canonical_rank(), &cb) {
            (ca, cb)
        } else {
            (cb, ca)
        };

        tracing::debug!(keep = %keep, lose = %lose, "equating terms");

        for position in Position::ALL {
            let index = self.index_mut(position);
            if let Some(moved) = index.remove(&lose) {
                index.entry(keep.clone()).or_default().extend(moved);
            }
        }
        self.redirections.insert(lose, keep.clone());
        self.rekey_collections();
        self.generation += 1;
        Ok(keep)
    }

    /// Move collection buckets whose elements were just merged under their
    /// new key.
    fn rekey_collections(&mut self) {
        for position in Position::ALL {
            let stale: Vec<(Term, Term)> = self
                .index(position)
                .keys()
                .filter(|key| matches!(key, Term::Collection(_)))
                .filter_map(|key| match self.index_key(key) {
                    Cow::Owned(fresh) if &fresh != key => Some((key.clone(), fresh)),
                    _ => None,
                })
                .collect();
            let index = self.index_mut(position);
            for (old, fresh) in stale {
                if let Some(moved) = index.remove(&old) {
                    index.entry(fresh).or_default().extend(moved);
                }
            }
        }
    }

    fn index_mut(&mut self, position: Position) -> &mut AHashMap<Term, Vec<Arc<Statement>>> {
        match position {
            Position::Subject => &mut self.subject_index,
            Position::Predicate => &mut self.predicate_index,
            Position::Object => &mut self.object_index,
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    fn index(&self, position: Position) -> &AHashMap<Term, Vec<Arc<Statement>>> {
        match position {
            Position::Subject => &self.subject_index,
            Position::Predicate => &self.predicate_index,
            Position::Object => &self.object_index,
        }
    }

    /// Follow the redirection table to a fixed point.
    pub fn canonical<'a>(&'a self, mut term: &'a Term) -> &'a Term {
        while let Some(next) = self.redirections.get(term) {
            term = next;
        }
        term
    }

    /// Owned variant of [`Graph::canonical`].
    pub fn canonicalize(&self, term: &Term) -> Term {
        self.canonical(term).clone()
    }

    /// The key `term` is indexed under: its canonical form, with collections
    /// rebuilt from their elements' keys first.
    pub fn index_key<'a>(&'a self, term: &'a Term) -> Cow<'a, Term> {
        match term {
            Term::Collection(items) => {
                let rebuilt = Term::Collection(
                    items.iter().map(|item| self.index_key(item).into_owned()).collect(),
                );
                Cow::Owned(self.canonicalize(&rebuilt))
            }
            _ => Cow::Borrowed(self.canonical(term)),
        }
    }

    /// Structural equality after redirection. Collections compare
    /// element-wise.
    pub fn same_term(&self, a: &Term, b: &Term) -> bool {
        match (a, b) {
            (Term::Collection(xs), Term::Collection(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.same_term(x, y))
            }
            _ => self.canonical(a) == self.canonical(b),
        }
    }

    /// Statements whose `position` holds (the canonical form of) `term`.
    pub fn index_for(&self, position: Position, term: &Term) -> &[Arc<Statement>] {
        self.index(position)
            .get(self.index_key(term).as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All statements matching the given positions; `None` is a wildcard.
    pub fn statements_matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        why: Option<&Term>,
    ) -> Vec<Arc<Statement>> {
        let wanted = [
            (Position::Subject, subject),
            (Position::Predicate, predicate),
            (Position::Object, object),
        ];

        let mut smallest: Option<&[Arc<Statement>]> = None;
        for (position, term) in wanted {
            let Some(term) = term else {
                continue;
            };
            let bucket = self.index_for(position, term);
            if smallest.map_or(true, |s| bucket.len() < s.len()) {
                smallest = Some(bucket);
            }
        }
        let candidates = smallest.unwrap_or(&self.statements);

        candidates
            .iter()
            .filter(|st| {
                wanted.iter().all(|(position, term)| {
                    term.map_or(true, |t| self.same_term(st.term(*position), t))
                })
            })
            .filter(|st| match why {
                Some(w) => st.why.as_ref().map_or(false, |sw| self.same_term(sw, w)),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn holds(&self, subject: &Term, predicate: &Term, object: &Term) -> bool {
        !self
            .statements_matching(Some(subject), Some(predicate), Some(object), None)
            .is_empty()
    }
}

impl Extend<Statement> for Graph {
    fn extend<I: IntoIterator<Item = Statement>>(&mut self, iter: I) {
        for statement in iter {
            self.add(statement);
        }
    }
}

impl FromIterator<Statement> for Graph {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> Self {
        let mut graph = Graph::new();
        graph.extend(iter);
        graph
    }
}
