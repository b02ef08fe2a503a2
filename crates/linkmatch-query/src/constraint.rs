//! Value constraints: per-variable boolean tests applied right after a
//! candidate statement has been unified.

use linkmatch_graph::Term;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bindings::Bindings;

/// Variable -> test. A variable without an entry is unconstrained.
pub type Constraints = BTreeMap<Term, Constraint>;

#[derive(Clone)]
pub struct Constraint {
    name: String,
    test: Arc<dyn Fn(&Term) -> bool + Send + Sync>,
}

impl Constraint {
    pub fn new(name: impl Into<String>, test: impl Fn(&Term) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self, term: &Term) -> bool {
        (self.test)(term)
    }

    pub fn one_of(allowed: impl IntoIterator<Item = Term>) -> Self {
        let allowed: Vec<Term> = allowed.into_iter().collect();
        let name = format!("one_of({})", allowed.len());
        Self::new(name, move |t| allowed.contains(t))
    }

    pub fn not_equal(excluded: Term) -> Self {
        let name = format!("!= {excluded}");
        Self::new(name, move |t| *t != excluded)
    }

    pub fn is_literal() -> Self {
        Self::new("is_literal", |t| matches!(t, Term::Literal(_)))
    }

    pub fn is_symbol() -> Self {
        Self::new("is_symbol", |t| matches!(t, Term::Symbol(_)))
    }

    /// Literal whose lexical form matches `re`. Non-literals fail.
    pub fn literal_matches(re: Regex) -> Self {
        let name = format!("matches /{}/", re.as_str());
        Self::new(name, move |t| match t {
            Term::Literal(lit) => re.is_match(&lit.lexical),
            _ => false,
        })
    }

    pub fn negate(self) -> Self {
        let name = format!("not({})", self.name);
        let inner = self.test;
        Self::new(name, move |t| !inner(t))
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint").field("name", &self.name).finish()
    }
}

/// Every constrained variable that is bound must pass its test.
pub fn constraints_satisfied(bindings: &Bindings, constraints: &Constraints) -> bool {
    constraints.iter().all(|(var, constraint)| match bindings.get(var) {
        Some(value) => constraint.test(value),
        None => true,
    })
}
