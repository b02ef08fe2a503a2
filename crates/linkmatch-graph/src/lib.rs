//! Linkmatch graph layer: terms, statements and the indexed triple store.
//!
//! ```text
//!   Term ──► Statement ──► Graph ──► SharedGraph (Arc<RwLock<Graph>>)
//!                           │
//!                           ├── subject / predicate / object indices
//!                           └── redirection table (merged terms)
//! ```
//!
//! The query engine (`linkmatch-query`) reads the store through
//! [`Graph::index_for`] and [`Graph::canonical`]; the fetch layer appends to it
//! while a search is suspended. Nothing here knows about variables beyond
//! [`Term::is_variable`].

pub mod graph;
pub mod statement;
pub mod term;

pub use graph::{Graph, GraphError, SharedGraph};
pub use statement::{Position, Statement};
pub use term::{document_part, Literal, Term};
