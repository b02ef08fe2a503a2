//! Fetch-aware backtracking search.
//!
//! A search is a tree of synchronous steps. Each step:
//!
//! 0. returns at once if the search was cancelled;
//! 1. if a fetcher is attached, looks for a variable bound on this path whose
//!    document has not been requested yet (or is still in flight on behalf
//!    of this search) and, if it finds one, parks itself on that fetch;
//! 2. reports a match when no triples remain (spawning optional branches if
//!    the pattern has any);
//! 3. otherwise plans the easiest remaining triple, unifies it with every
//!    candidate statement, filters by constraints, and recurses.
//!
//! The graph read lock is held only while one step plans and unifies, never
//! across a callback or a fetcher call, so fetched data can be appended
//! between a suspension and its resumption. Completion is tracked by the
//! branch handles each step owns (see [`crate::branch`]).

use ahash::AHashSet;
use im::OrdSet;
use linkmatch_graph::{SharedGraph, Statement};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tokio::sync::{mpsc, oneshot};

use crate::bindings::Bindings;
use crate::branch::BranchHandle;
use crate::config::SearchConfig;
use crate::constraint::{constraints_satisfied, Constraints};
use crate::error::QueryError;
use crate::fetch::{FetchState, ResourceFetcher};
use crate::pattern::Pattern;
use crate::planner;
use crate::unify::unify_statement;

// ============================================================================
// Public types
// ============================================================================

/// What the done callback receives when a search completes without error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    /// Matches delivered to the match callback.
    pub matches: usize,
    /// Fetches this search requested.
    pub fetches: usize,
    /// Stopped early by `max_matches`.
    pub truncated: bool,
    /// Stopped early by [`SearchHandle::cancel`].
    pub cancelled: bool,
}

/// Shared stop flag for every step of one search.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Returned by [`QueryEngine::search`]; lets the caller observe and stop a
/// search that is parked on fetches.
#[derive(Clone)]
pub struct SearchHandle {
    state: Rc<SearchState>,
}

impl SearchHandle {
    /// Stop the search. Parked steps are discarded when their fetch
    /// resolves; the done callback still fires exactly once.
    pub fn cancel(&self) {
        tracing::debug!("search cancelled by caller");
        self.state.user_cancelled.set(true);
        self.state.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.token.is_cancelled()
    }

    /// True once the done callback has fired.
    pub fn is_finished(&self) -> bool {
        self.state.finished.get()
    }

    /// Matches delivered so far.
    pub fn matches(&self) -> usize {
        self.state.matches.get()
    }

    pub fn token(&self) -> CancellationToken {
        self.state.token.clone()
    }
}

/// Message-passing view of a search: see [`QueryEngine::search_channel`].
pub struct SearchReceiver {
    pub matches: mpsc::UnboundedReceiver<Bindings>,
    pub done: oneshot::Receiver<Result<SearchSummary, QueryError>>,
    pub handle: SearchHandle,
}

// ============================================================================
// Per-search state
// ============================================================================

pub(crate) struct SearchState {
    pub(crate) token: CancellationToken,
    pub(crate) user_cancelled: Cell<bool>,
    /// First malformed-pattern error; the search stops when it is set.
    pub(crate) error: RefCell<Option<QueryError>>,
    pub(crate) matches: Cell<usize>,
    pub(crate) fetches: Cell<usize>,
    /// Documents this search asked the fetcher for.
    pub(crate) requested: RefCell<AHashSet<String>>,
    pub(crate) truncated: Cell<bool>,
    pub(crate) finished: Cell<bool>,
    pub(crate) max_matches: Option<usize>,
}

impl SearchState {
    pub(crate) fn new(max_matches: Option<usize>) -> Self {
        Self {
            token: CancellationToken::new(),
            user_cancelled: Cell::new(false),
            error: RefCell::new(None),
            matches: Cell::new(0),
            fetches: Cell::new(0),
            requested: RefCell::new(AHashSet::new()),
            truncated: Cell::new(false),
            finished: Cell::new(false),
            max_matches,
        }
    }

    pub(crate) fn summary(&self) -> SearchSummary {
        SearchSummary {
            matches: self.matches.get(),
            fetches: self.fetches.get(),
            truncated: self.truncated.get(),
            cancelled: self.user_cancelled.get(),
        }
    }
}

/// One pattern level with its inherited constraints resolved.
struct Scope {
    triples: Vec<Statement>,
    initial: Bindings,
    /// Enclosing constraints overlaid with this pattern's own.
    constraints: Constraints,
    optionals: Vec<Rc<Scope>>,
}

impl Scope {
    fn build(pattern: &Pattern, inherited: &Constraints) -> Rc<Scope> {
        let mut constraints = inherited.clone();
        for (var, c) in pattern.constraints() {
            constraints.insert(var.clone(), c.clone());
        }
        let optionals = pattern
            .optionals()
            .iter()
            .map(|sub| Scope::build(sub, &constraints))
            .collect();
        Rc::new(Scope {
            triples: pattern.statements().to_vec(),
            initial: pattern.initial_bindings().clone(),
            constraints,
            optionals,
        })
    }
}

/// The state a step owns. Moving a frame into a fetch continuation moves its
/// branch handle with it, which keeps the branch open until it resumes.
struct Frame {
    scope: Rc<Scope>,
    /// Indices into `scope.triples` still to match.
    remaining: Vec<usize>,
    bindings: Bindings,
    branch: BranchHandle,
    /// Documents already waited for on this path.
    awaited: OrdSet<String>,
    depth: usize,
}

struct SearchContext {
    graph: SharedGraph,
    /// Weak: parked continuations live inside the fetcher and hold the
    /// context.
    fetcher: Option<Weak<dyn ResourceFetcher>>,
    config: SearchConfig,
    state: Rc<SearchState>,
}

// ============================================================================
// Engine
// ============================================================================

/// Runs patterns against a shared graph, optionally pulling in missing
/// documents through a [`ResourceFetcher`].
pub struct QueryEngine {
    graph: SharedGraph,
    fetcher: Option<Rc<dyn ResourceFetcher>>,
    config: SearchConfig,
}

impl QueryEngine {
    pub fn new(graph: SharedGraph) -> Self {
        Self {
            graph,
            fetcher: None,
            config: SearchConfig::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Rc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a search. `on_match` is called once per match, `on_done` exactly
    /// once afterwards. Runs synchronously until the search either finishes
    /// or parks every remaining path on a fetch.
    ///
    /// Malformed patterns that can be detected up front are rejected here,
    /// before any callback fires.
    pub fn search<M, D>(
        &self,
        pattern: &Pattern,
        on_match: M,
        on_done: D,
    ) -> Result<SearchHandle, QueryError>
    where
        M: FnMut(&Bindings) + 'static,
        D: FnOnce(Result<SearchSummary, QueryError>) + 'static,
    {
        pattern.validate()?;

        let state = Rc::new(SearchState::new(self.config.max_matches));
        let handle = SearchHandle {
            state: Rc::clone(&state),
        };
        let ctx = Rc::new(SearchContext {
            graph: self.graph.clone(),
            fetcher: self.fetcher.as_ref().map(Rc::downgrade),
            config: self.config.clone(),
            state: Rc::clone(&state),
        });
        let scope = Scope::build(pattern, &Constraints::new());
        let root = BranchHandle::mandatory(state, Box::new(on_match), Box::new(on_done));

        tracing::debug!(
            triples = scope.triples.len(),
            optionals = scope.optionals.len(),
            "search started"
        );
        let initial = scope.initial.clone();
        start_scope(&ctx, scope, initial, root, OrdSet::new(), 0);
        Ok(handle)
    }

    /// Run a search to completion and collect its matches. If the search has
    /// to wait for a fetch it is cancelled and `QueryError::Suspended` is
    /// returned.
    pub fn search_sync(&self, pattern: &Pattern) -> Result<Vec<Bindings>, QueryError> {
        let found: Rc<RefCell<Vec<Bindings>>> = Rc::default();
        let outcome: Rc<RefCell<Option<Result<SearchSummary, QueryError>>>> = Rc::default();

        let sink = Rc::clone(&found);
        let slot = Rc::clone(&outcome);
        let handle = self.search(
            pattern,
            move |b| sink.borrow_mut().push(b.clone()),
            move |result| *slot.borrow_mut() = Some(result),
        )?;

        let result = outcome.borrow_mut().take();
        match result {
            Some(Ok(_)) => Ok(std::mem::take(&mut *found.borrow_mut())),
            Some(Err(err)) => Err(err),
            None => {
                handle.cancel();
                Err(QueryError::Suspended {
                    matches: handle.matches(),
                })
            }
        }
    }

    /// Start a search whose matches and completion arrive over channels.
    /// Matches already found synchronously are waiting in the receiver when
    /// this returns.
    pub fn search_channel(&self, pattern: &Pattern) -> Result<SearchReceiver, QueryError> {
        let (match_tx, matches) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();

        let handle = self.search(
            pattern,
            move |b| {
                if match_tx.send(b.clone()).is_err() {
                    tracing::trace!("match receiver dropped");
                }
            },
            move |result| {
                if done_tx.send(result).is_err() {
                    tracing::trace!("done receiver dropped");
                }
            },
        )?;
        Ok(SearchReceiver {
            matches,
            done,
            handle,
        })
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Enter a pattern level from `bindings`. Bindings that already violate the
/// level's constraints end the path.
fn start_scope(
    ctx: &Rc<SearchContext>,
    scope: Rc<Scope>,
    bindings: Bindings,
    branch: BranchHandle,
    awaited: OrdSet<String>,
    depth: usize,
) {
    if !constraints_satisfied(&bindings, &scope.constraints) {
        tracing::trace!(depth, "initial bindings rejected by constraints");
        return;
    }
    let remaining = (0..scope.triples.len()).collect();
    step(
        ctx,
        Frame {
            scope,
            remaining,
            bindings,
            branch,
            awaited,
            depth,
        },
    );
}

fn step(ctx: &Rc<SearchContext>, frame: Frame) {
    if ctx.state.token.is_cancelled() {
        return;
    }
    tracing::trace!(
        depth = frame.depth,
        remaining = frame.remaining.len(),
        bindings = %frame.bindings,
        "step"
    );

    if let Some(resource) = ctx.next_fetch(&frame) {
        suspend(ctx, frame, resource);
        return;
    }

    if frame.remaining.is_empty() {
        exhausted(ctx, frame);
        return;
    }

    let (selected, children) = match ctx.expand(&frame) {
        Ok(Some(expansion)) => expansion,
        Ok(None) => {
            tracing::trace!(depth = frame.depth, "no candidates; pruned");
            return;
        }
        Err(err) => {
            ctx.fail(err);
            return;
        }
    };

    let mut remaining = frame.remaining.clone();
    remaining.remove(selected);
    for bindings in children {
        if ctx.state.token.is_cancelled() {
            return;
        }
        step(
            ctx,
            Frame {
                scope: Rc::clone(&frame.scope),
                remaining: remaining.clone(),
                bindings,
                branch: frame.branch.clone(),
                awaited: frame.awaited.clone(),
                depth: frame.depth + 1,
            },
        );
    }
}

/// Park `frame` until `resource` is resolved.
fn suspend(ctx: &Rc<SearchContext>, mut frame: Frame, resource: String) {
    let Some(fetcher) = ctx.fetcher() else {
        return;
    };
    if fetcher.state(&resource) == FetchState::Unrequested {
        fetcher.request(&resource);
        ctx.state.fetches.set(ctx.state.fetches.get() + 1);
        ctx.state.requested.borrow_mut().insert(resource.clone());
    }
    tracing::debug!(resource = %resource, depth = frame.depth, "waiting for fetch");

    frame.awaited.insert(resource.clone());
    let resume_ctx = Rc::clone(ctx);
    fetcher.on_available(
        &resource,
        Box::new(move |outcome| {
            if let Some(reason) = &outcome.error {
                tracing::warn!(
                    resource = %outcome.resource,
                    reason = %reason,
                    "fetch failed; continuing with the data already loaded"
                );
            }
            step(&resume_ctx, frame);
        }),
    );
}

/// No triples left: report, or fan out into the optional clauses.
fn exhausted(ctx: &Rc<SearchContext>, frame: Frame) {
    let Frame {
        scope,
        bindings,
        branch,
        awaited,
        depth,
        ..
    } = frame;

    if scope.optionals.is_empty() {
        branch.report_match(bindings);
        return;
    }

    let children = branch.split(bindings.clone(), scope.optionals.len());
    drop(branch);
    for (sub, child) in scope.optionals.iter().zip(children) {
        // Trunk values win over a clause's own initial bindings.
        let start = sub.initial.union(&bindings);
        start_scope(ctx, Rc::clone(sub), start, child, awaited.clone(), depth + 1);
    }
}

impl SearchContext {
    fn fetcher(&self) -> Option<Rc<dyn ResourceFetcher>> {
        self.fetcher.as_ref().and_then(Weak::upgrade)
    }

    /// The first document, in triple order, that a variable bound on this
    /// path points into and that still needs waiting for: never requested,
    /// or requested by this search and not delivered yet. Documents another
    /// search is loading are not waited for; matching uses what is stored.
    fn next_fetch(&self, frame: &Frame) -> Option<String> {
        if !self.config.follow_links {
            return None;
        }
        let fetcher = self.fetcher()?;
        for &index in &frame.remaining {
            let triple = &frame.scope.triples[index];
            let mut terms = vec![&triple.subject, &triple.object];
            if self.config.fetch_predicates {
                terms.push(&triple.predicate);
            }
            for term in terms {
                let Some(resource) = frame.bindings.get(term).and_then(|t| t.resource_id()) else {
                    continue;
                };
                if frame.awaited.contains(resource) {
                    continue;
                }
                let wait = match fetcher.state(resource) {
                    FetchState::Unrequested => true,
                    FetchState::Requested => self.state.requested.borrow().contains(resource),
                    FetchState::Fetched | FetchState::Failed(_) => false,
                };
                if wait {
                    return Some(resource.to_owned());
                }
            }
        }
        None
    }

    /// Plan and unify under the read lock. Returns the position (in
    /// `frame.remaining`) of the matched triple and the surviving extended
    /// bindings, or `None` if the path is dead.
    fn expand(&self, frame: &Frame) -> Result<Option<(usize, Vec<Bindings>)>, QueryError> {
        let graph = self.graph.read();
        let triples: Vec<&Statement> = frame
            .remaining
            .iter()
            .map(|&i| &frame.scope.triples[i])
            .collect();
        let Some(plan) = planner::plan(&graph, &triples, &frame.bindings) else {
            return Ok(None);
        };
        let triple = triples[plan.selected];
        tracing::trace!(
            triple = %triple,
            free = plan.free_vars,
            candidates = plan.candidates.len(),
            "planned"
        );

        let mut children = Vec::new();
        for candidate in plan.candidates {
            for extended in unify_statement(triple, candidate, &frame.bindings, &graph)? {
                if constraints_satisfied(&extended, &frame.scope.constraints) {
                    children.push(extended);
                }
            }
        }
        Ok(Some((plan.selected, children)))
    }

    /// Record the first error and stop the search.
    fn fail(&self, err: QueryError) {
        tracing::debug!(error = %err, "malformed pattern; stopping search");
        let mut slot = self.state.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.state.token.cancel();
    }
}

