use linkmatch_graph::Term;
use std::path::PathBuf;

/// Errors a search reports to its caller.
///
/// Failing to match is never an error: empty indices, failed unification and
/// rejected constraints silently prune a path. Only malformed patterns (and
/// the synchronous API's "still waiting on the network") surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("cannot unify collection {collection} with non-collection {other}")]
    ShapeMismatch { collection: Term, other: Term },

    #[error("constraint on {0}, which never occurs in the pattern")]
    UnboundConstraint(Term),

    #[error("constraint key {0} is not a variable")]
    ConstraintOnConstant(Term),

    #[error("optional clauses #{first} and #{second} both bind {variable}")]
    OverlappingOptionals {
        variable: Term,
        first: usize,
        second: usize,
    },

    #[error("search suspended on a resource fetch after {matches} match(es)")]
    Suspended { matches: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
