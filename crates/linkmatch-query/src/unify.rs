//! Unification: find every extension of a binding set under which a pattern
//! term equals a data term.
//!
//! Simple terms produce zero or one alternative. Collections unify
//! element-wise, and the alternatives of each element multiply out, which is
//! the only place a single statement pair can yield more than one result.
//!
//! The left-hand side is always the pattern term and the right-hand side the
//! data term; data-side blank nodes are plain values.

use linkmatch_graph::{Graph, Statement, Term};

use crate::bindings::Bindings;
use crate::error::QueryError;

pub fn unify_term(
    this: &Term,
    other: &Term,
    bindings: &Bindings,
    graph: &Graph,
) -> Result<Vec<Bindings>, QueryError> {
    if let Some(actual) = bindings.get(this) {
        // Already bound on this path: the value must agree, never rebind.
        return Ok(if graph.same_term(actual, other) {
            vec![bindings.clone()]
        } else {
            Vec::new()
        });
    }

    match (this, other) {
        (Term::Variable(_) | Term::BlankNode(_), _) => {
            Ok(vec![bindings.bind(this.clone(), other.clone())])
        }
        (Term::Collection(xs), Term::Collection(ys)) => unify_contents(xs, ys, bindings, graph),
        (Term::Collection(_), _) => Err(QueryError::ShapeMismatch {
            collection: this.clone(),
            other: other.clone(),
        }),
        (Term::Symbol(_) | Term::Literal(_), _) => Ok(if graph.same_term(this, other) {
            vec![bindings.clone()]
        } else {
            Vec::new()
        }),
    }
}

/// Unify two term lists position by position.
pub fn unify_contents(
    these: &[Term],
    others: &[Term],
    bindings: &Bindings,
    graph: &Graph,
) -> Result<Vec<Bindings>, QueryError> {
    if these.len() != others.len() {
        return Ok(Vec::new());
    }
    let pairs: Vec<(&Term, &Term)> = these.iter().zip(others).collect();
    unify_pairs(&pairs, bindings, graph)
}

/// Unify a pattern triple against a stored statement. Provenance is ignored.
pub fn unify_statement(
    pattern: &Statement,
    statement: &Statement,
    bindings: &Bindings,
    graph: &Graph,
) -> Result<Vec<Bindings>, QueryError> {
    let pairs = [
        (&pattern.subject, &statement.subject),
        (&pattern.predicate, &statement.predicate),
        (&pattern.object, &statement.object),
    ];
    unify_pairs(&pairs, bindings, graph)
}

fn unify_pairs(
    pairs: &[(&Term, &Term)],
    bindings: &Bindings,
    graph: &Graph,
) -> Result<Vec<Bindings>, QueryError> {
    let Some(((head_this, head_other), rest)) = pairs.split_first() else {
        return Ok(vec![bindings.clone()]);
    };

    let heads = unify_term(head_this, head_other, bindings, graph)?;
    let mut out = Vec::new();
    for extended in &heads {
        out.extend(unify_pairs(rest, extended, graph)?);
    }
    Ok(out)
}
