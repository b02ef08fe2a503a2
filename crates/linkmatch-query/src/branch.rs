//! Branches and junctions.
//!
//! A branch is where a sub-search reports its matches. Every piece of
//! outstanding work (a recursive step, a continuation parked on a fetch, a
//! junction waiting for its children) holds a [`BranchHandle`] clone. The
//! branch completes when the last clone is dropped, so it completes exactly
//! once and never before its work is finished.
//!
//! - The **mandatory** branch is the root: it hands matches straight to the
//!   caller and calls the caller's done callback on completion.
//! - An **optional** branch buffers its matches. On completion it stands in
//!   an empty binding set if it found nothing, then reports to its junction.
//! - A **junction** joins the optional branches spawned for one pattern's
//!   OPTIONAL clauses. Once all of them are complete it reports the cross
//!   product, each combination unioned with the trunk bindings, to the
//!   branch that was active when the trunk matched.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::bindings::Bindings;
use crate::error::QueryError;
use crate::search::{SearchState, SearchSummary};

pub(crate) type MatchCallback = Box<dyn FnMut(&Bindings)>;
pub(crate) type DoneCallback = Box<dyn FnOnce(Result<SearchSummary, QueryError>)>;

enum BranchKind {
    Mandatory {
        on_match: RefCell<MatchCallback>,
        /// Matches reported while `on_match` is running (a callback that
        /// drives the fetcher can resume the search re-entrantly).
        queue: RefCell<VecDeque<Bindings>>,
        on_done: RefCell<Option<DoneCallback>>,
    },
    Optional {
        junction: Rc<Junction>,
        slot: usize,
        results: RefCell<Vec<Bindings>>,
    },
}

struct Branch {
    state: Rc<SearchState>,
    kind: BranchKind,
}

#[derive(Clone)]
pub(crate) struct BranchHandle(Rc<Branch>);

impl BranchHandle {
    pub(crate) fn mandatory(
        state: Rc<SearchState>,
        on_match: MatchCallback,
        on_done: DoneCallback,
    ) -> Self {
        BranchHandle(Rc::new(Branch {
            state,
            kind: BranchKind::Mandatory {
                on_match: RefCell::new(on_match),
                queue: RefCell::new(VecDeque::new()),
                on_done: RefCell::new(Some(on_done)),
            },
        }))
    }

    fn optional(state: Rc<SearchState>, junction: Rc<Junction>, slot: usize) -> Self {
        BranchHandle(Rc::new(Branch {
            state,
            kind: BranchKind::Optional {
                junction,
                slot,
                results: RefCell::new(Vec::new()),
            },
        }))
    }

    pub(crate) fn report_match(&self, bindings: Bindings) {
        let state = &self.0.state;
        if state.token.is_cancelled() {
            return;
        }
        match &self.0.kind {
            BranchKind::Optional { results, .. } => results.borrow_mut().push(bindings),
            BranchKind::Mandatory {
                on_match, queue, ..
            } => {
                let count = state.matches.get() + 1;
                state.matches.set(count);
                tracing::debug!(matches = count, bindings = %bindings, "match");
                queue.borrow_mut().push_back(bindings);

                if state.max_matches.is_some_and(|max| count >= max) {
                    tracing::debug!(matches = count, "match limit reached; cancelling");
                    state.truncated.set(true);
                    state.token.cancel();
                }

                // Whoever holds the callback drains the queue.
                let Ok(mut callback) = on_match.try_borrow_mut() else {
                    return;
                };
                loop {
                    let next = queue.borrow_mut().pop_front();
                    match next {
                        Some(b) => (*callback)(&b),
                        None => break,
                    }
                }
            }
        }
    }

    /// Spawn `count` optional branches that join into `self` through one
    /// junction over `trunk`.
    pub(crate) fn split(&self, trunk: Bindings, count: usize) -> Vec<BranchHandle> {
        let junction = Rc::new(Junction {
            trunk,
            parent: self.clone(),
            slots: RefCell::new(vec![None; count]),
        });
        (0..count)
            .map(|slot| BranchHandle::optional(Rc::clone(&self.0.state), Rc::clone(&junction), slot))
            .collect()
    }
}

impl Drop for Branch {
    fn drop(&mut self) {
        match &self.kind {
            BranchKind::Mandatory { on_done, .. } => {
                let Some(on_done) = on_done.borrow_mut().take() else {
                    return;
                };
                let state = &self.state;
                state.finished.set(true);
                let error = state.error.borrow_mut().take();
                match error {
                    Some(err) => {
                        tracing::info!(error = %err, "search failed");
                        on_done(Err(err));
                    }
                    None => {
                        let summary = state.summary();
                        tracing::info!(
                            matches = summary.matches,
                            fetches = summary.fetches,
                            truncated = summary.truncated,
                            cancelled = summary.cancelled,
                            "search finished"
                        );
                        on_done(Ok(summary));
                    }
                }
            }
            BranchKind::Optional {
                junction,
                slot,
                results,
            } => {
                let mut results = results.take();
                if results.is_empty() {
                    results.push(Bindings::new());
                }
                junction.child_done(*slot, results);
            }
        }
    }
}

/// Waits for the optional branches of one OPTIONAL clause list.
struct Junction {
    trunk: Bindings,
    parent: BranchHandle,
    slots: RefCell<Vec<Option<Vec<Bindings>>>>,
}

impl Junction {
    fn child_done(&self, slot: usize, results: Vec<Bindings>) {
        let all = {
            let mut slots = self.slots.borrow_mut();
            slots[slot] = Some(results);
            if slots.iter().any(Option::is_none) {
                return;
            }
            slots.iter_mut().filter_map(Option::take).collect::<Vec<_>>()
        };

        // First branch outermost, then within-branch order.
        let mut combos = vec![self.trunk.clone()];
        for results in &all {
            combos = combos
                .iter()
                .flat_map(|combo| results.iter().map(move |r| combo.union(r)))
                .collect();
        }
        tracing::debug!(
            branches = all.len(),
            combinations = combos.len(),
            "junction complete"
        );
        for combo in combos {
            self.parent.report_match(combo);
        }
    }
}
