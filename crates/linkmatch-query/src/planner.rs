//! One-step selectivity planning.
//!
//! Before every join step the remaining pattern triples are re-estimated
//! against the *current* bindings and the *current* store, and the easiest
//! one is matched next:
//!
//! 1. fewest free positions first (triples anchored on known terms prune the
//!    search earliest);
//! 2. then the smallest candidate list;
//! 3. then pattern order.
//!
//! This is a greedy heuristic, not a global join order. It is recomputed per
//! step because both bindings and (after a fetch) the store change between
//! steps.
//!
//! A triple whose bound position has no statements yet is not fatal on its
//! own: the document that supplies them may still be fetched once another
//! triple binds the term that links to it. Only a selected triple with no
//! candidates ends the path.

use linkmatch_graph::{Graph, Position, Statement};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::bindings::Bindings;

/// Selectivity estimate for one pattern triple.
#[derive(Debug, Clone, Copy)]
pub struct PreparedTriple<'g> {
    /// Positions still holding an unbound variable.
    pub free_vars: usize,
    /// Narrowest index over the bound positions (or the whole store). Empty
    /// when a bound position has no statements at all.
    pub candidates: &'g [Arc<Statement>],
}

/// The triple to match next and where to look for it.
#[derive(Debug, Clone, Copy)]
pub struct Plan<'g> {
    /// Index of the selected triple in the slice handed to [`plan`].
    pub selected: usize,
    pub free_vars: usize,
    pub candidates: &'g [Arc<Statement>],
}

/// Estimate one triple under `bindings`.
pub fn prepare<'g>(graph: &'g Graph, triple: &Statement, bindings: &Bindings) -> PreparedTriple<'g> {
    let mut free_vars = 0;
    let mut narrowest: Option<&'g [Arc<Statement>]> = None;

    for position in Position::ALL {
        let term = triple.term(position);
        if bindings.has_unbound(term) {
            free_vars += 1;
            continue;
        }
        let bound = bindings.substitute(term);
        let index = graph.index_for(position, &bound);
        if narrowest.map_or(true, |n| index.len() < n.len()) {
            narrowest = Some(index);
        }
    }

    PreparedTriple {
        free_vars,
        candidates: narrowest.unwrap_or_else(|| graph.statements()),
    }
}

/// Negative when `a` is the easier query.
pub fn easiest_query(a: &PreparedTriple<'_>, b: &PreparedTriple<'_>) -> Ordering {
    a.free_vars
        .cmp(&b.free_vars)
        .then(a.candidates.len().cmp(&b.candidates.len()))
}

/// Prepare every remaining triple and pick the easiest. Returns `None` if
/// `remaining` is empty or the easiest triple has no candidates.
pub fn plan<'g>(graph: &'g Graph, remaining: &[&Statement], bindings: &Bindings) -> Option<Plan<'g>> {
    let (selected, best) = remaining
        .iter()
        .map(|triple| prepare(graph, triple, bindings))
        .enumerate()
        .min_by(|(_, a), (_, b)| easiest_query(a, b))?;

    if best.candidates.is_empty() {
        return None;
    }
    Some(Plan {
        selected,
        free_vars: best.free_vars,
        candidates: best.candidates,
    })
}
