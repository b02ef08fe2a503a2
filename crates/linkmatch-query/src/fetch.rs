//! Resource fetch service.
//!
//! The search never talks to a network. It only needs to know whether the
//! document a bound term lives in has been loaded, and to be called back when
//! it has. [`ResourceFetcher`] is that seam; [`MemoryFetcher`] is a
//! deterministic implementation over an in-memory "web" of documents, used by
//! the test suites and by embedders that preload data.

use ahash::AHashMap;
use linkmatch_graph::{document_part, SharedGraph, Statement, Term};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;

// ============================================================================
// Service interface
// ============================================================================

/// Lifecycle of one resource (document) id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchState {
    Unrequested,
    Requested,
    Fetched,
    Failed(String),
}

impl FetchState {
    /// Fetched or failed: waiting on it any longer is pointless.
    pub fn is_resolved(&self) -> bool {
        matches!(self, FetchState::Fetched | FetchState::Failed(_))
    }
}

/// What a callback registered with [`ResourceFetcher::on_available`] is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub resource: String,
    /// `None` on success, the failure reason otherwise.
    pub error: Option<String>,
    /// New statements the fetch added to the store.
    pub statements_added: usize,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub type FetchCallback = Box<dyn FnOnce(&FetchOutcome)>;

/// The fetch layer as seen by the search.
///
/// Implementations are single-threaded (`&self` with interior mutability):
/// callbacks run on the thread that delivers the fetch.
pub trait ResourceFetcher {
    fn state(&self, resource: &str) -> FetchState;

    /// Start fetching `resource`. Requesting something already requested or
    /// resolved is a no-op.
    fn request(&self, resource: &str);

    /// Run `callback` once `resource` is resolved. Fires immediately if it
    /// already is. Every registration fires.
    fn on_available(&self, resource: &str, callback: FetchCallback);
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Default)]
struct FetcherInner {
    /// Documents that exist, by id.
    web: AHashMap<String, Vec<Statement>>,
    /// Documents that fail to load, with the reason.
    broken: AHashMap<String, String>,
    states: AHashMap<String, FetchState>,
    outcomes: AHashMap<String, FetchOutcome>,
    queue: VecDeque<String>,
    waiters: AHashMap<String, Vec<FetchCallback>>,
    /// Every id that went on the queue, in order (refreshes included).
    log: Vec<String>,
}

/// A fetcher whose "network" is a map of document id to statements. Requests
/// only queue; nothing is loaded until [`MemoryFetcher::deliver_next`] or
/// [`MemoryFetcher::run_pending`] is called, which makes suspension and
/// resumption fully deterministic.
pub struct MemoryFetcher {
    graph: SharedGraph,
    inner: RefCell<FetcherInner>,
}

impl MemoryFetcher {
    pub fn new(graph: SharedGraph) -> Self {
        Self {
            graph,
            inner: RefCell::new(FetcherInner::default()),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Make `document` available with the given contents. Any fragment in
    /// the id is ignored.
    pub fn publish(&self, document: &str, statements: impl IntoIterator<Item = Statement>) {
        let id = document_part(document).to_owned();
        let mut inner = self.inner.borrow_mut();
        inner.broken.remove(&id);
        inner.web.insert(id, statements.into_iter().collect());
    }

    /// Make `document` fail to load with `reason`.
    pub fn fail_with(&self, document: &str, reason: impl Into<String>) {
        let id = document_part(document).to_owned();
        let mut inner = self.inner.borrow_mut();
        inner.web.remove(&id);
        inner.broken.insert(id, reason.into());
    }

    /// Requests queued but not yet delivered.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Every document id queued so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.inner.borrow().log.clone()
    }

    /// Force a re-fetch of `document`, even if it was already loaded or
    /// failed. A fetch already in flight is left alone.
    pub fn refresh(&self, document: &str) {
        let id = document_part(document).to_owned();
        let mut inner = self.inner.borrow_mut();
        if inner.states.get(&id) == Some(&FetchState::Requested) {
            return;
        }
        tracing::debug!(resource = %id, "refresh requested");
        inner.outcomes.remove(&id);
        inner.states.insert(id.clone(), FetchState::Requested);
        inner.queue.push_back(id.clone());
        inner.log.push(id);
    }

    /// Resolve the oldest queued request: load its statements (tagged with
    /// the document as provenance), mark it fetched or failed, and fire its
    /// callbacks. Returns `None` when nothing is queued.
    pub fn deliver_next(&self) -> Option<FetchOutcome> {
        let (id, contents) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.queue.pop_front()?;
            let contents = match inner.broken.get(&id) {
                Some(reason) => Err(reason.clone()),
                None => inner
                    .web
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| "not found".to_owned()),
            };
            (id, contents)
        };

        let outcome = match contents {
            Ok(statements) => {
                let why = Term::sym(id.clone());
                let mut graph = self.graph.write();
                let mut added = 0;
                for statement in statements {
                    if graph.add(statement.with_why(why.clone())) {
                        added += 1;
                    }
                }
                FetchOutcome {
                    resource: id.clone(),
                    error: None,
                    statements_added: added,
                }
            }
            Err(reason) => FetchOutcome {
                resource: id.clone(),
                error: Some(reason),
                statements_added: 0,
            },
        };
        tracing::debug!(
            resource = %id,
            added = outcome.statements_added,
            failed = outcome.error.is_some(),
            "fetch delivered"
        );

        let waiters = {
            let mut inner = self.inner.borrow_mut();
            let state = match &outcome.error {
                Some(reason) => FetchState::Failed(reason.clone()),
                None => FetchState::Fetched,
            };
            inner.states.insert(id.clone(), state);
            inner.outcomes.insert(id.clone(), outcome.clone());
            inner.waiters.remove(&id).unwrap_or_default()
        };
        for callback in waiters {
            callback(&outcome);
        }
        Some(outcome)
    }

    /// Deliver until the queue is empty, including requests made by the
    /// callbacks themselves. Returns how many deliveries were made.
    pub fn run_pending(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_next().is_some() {
            delivered += 1;
        }
        delivered
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn state(&self, resource: &str) -> FetchState {
        self.inner
            .borrow()
            .states
            .get(document_part(resource))
            .cloned()
            .unwrap_or(FetchState::Unrequested)
    }

    fn request(&self, resource: &str) {
        let id = document_part(resource).to_owned();
        let mut inner = self.inner.borrow_mut();
        if inner.states.contains_key(&id) {
            return;
        }
        tracing::debug!(resource = %id, "fetch requested");
        inner.states.insert(id.clone(), FetchState::Requested);
        inner.queue.push_back(id.clone());
        inner.log.push(id);
    }

    fn on_available(&self, resource: &str, callback: FetchCallback) {
        let id = document_part(resource);
        let ready = {
            let mut inner = self.inner.borrow_mut();
            match inner.outcomes.get(id) {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    inner.waiters.entry(id.to_owned()).or_default().push(callback);
                    return;
                }
            }
        };
        if let Some(outcome) = ready {
            callback(&outcome);
        }
    }
}
