//! Linkmatch query engine.
//!
//! Enumerates every way a pattern (triples with variables, optional
//! clauses, constraints) can be satisfied against a [`linkmatch_graph::Graph`],
//! including data that has to be fetched first.
//!
//! ```text
//!   Pattern ──► QueryEngine::search
//!                  │
//!                  ├── planner   (pick the most selective triple)
//!                  ├── unify     (extend bindings per candidate statement)
//!                  ├── constraint
//!                  ├── fetch     (park on unloaded documents, resume later)
//!                  └── branch    (root / optional branches, junctions)
//!                  │
//!                  ▼
//!            on_match(&Bindings) ... on_done(Result<SearchSummary, _>)
//! ```
//!
//! Everything runs on the caller's thread. A search only yields when it waits
//! for a fetch; it resumes inside whatever delivers that fetch (for
//! [`MemoryFetcher`], `deliver_next` / `run_pending`).

pub mod bindings;
mod branch;
pub mod config;
pub mod constraint;
pub mod error;
pub mod fetch;
pub mod pattern;
pub mod planner;
pub mod search;
pub mod unify;

pub use bindings::Bindings;
pub use config::SearchConfig;
pub use constraint::{constraints_satisfied, Constraint, Constraints};
pub use error::{ConfigError, QueryError};
pub use fetch::{FetchCallback, FetchOutcome, FetchState, MemoryFetcher, ResourceFetcher};
pub use pattern::Pattern;
pub use search::{
    CancellationToken, QueryEngine, SearchHandle, SearchReceiver, SearchSummary,
};
pub use unify::{unify_contents, unify_statement, unify_term};
