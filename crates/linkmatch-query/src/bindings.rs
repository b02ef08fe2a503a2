//! Binding sets.
//!
//! A binding set is persistent: extending one returns a new set that shares
//! structure with its parent, so the many candidate unifications that fan out
//! from one search step never observe each other's bindings.

use im::OrdMap;
use linkmatch_graph::Term;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    map: OrdMap<Term, Term>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: &Term) -> Option<&Term> {
        self.map.get(var)
    }

    /// Look up a named variable (`?name`).
    pub fn get_var(&self, name: &str) -> Option<&Term> {
        self.map.get(&Term::var(name))
    }

    pub fn contains(&self, var: &Term) -> bool {
        self.map.contains_key(var)
    }

    /// A new binding set with `var -> value` added. `self` is untouched.
    pub fn bind(&self, var: Term, value: Term) -> Bindings {
        Bindings {
            map: self.map.update(var, value),
        }
    }

    /// The bound value of `term` if it is a bound variable, else `term`.
    pub fn resolve<'a>(&'a self, term: &'a Term) -> &'a Term {
        self.map.get(term).unwrap_or(term)
    }

    /// Replace every bound variable in `term`, including inside collections.
    pub fn substitute(&self, term: &Term) -> Term {
        match term {
            Term::Collection(items) => {
                Term::Collection(items.iter().map(|t| self.substitute(t)).collect())
            }
            other => self.resolve(other).clone(),
        }
    }

    /// True when `term` still mentions a variable with no binding.
    pub fn has_unbound(&self, term: &Term) -> bool {
        match term {
            Term::Variable(_) | Term::BlankNode(_) => !self.contains(term),
            Term::Collection(items) => items.iter().any(|t| self.has_unbound(t)),
            Term::Symbol(_) | Term::Literal(_) => false,
        }
    }

    /// Union of two binding sets; on a shared key `other` wins.
    pub fn union(&self, other: &Bindings) -> Bindings {
        let mut map = self.map.clone();
        for (k, v) in other.map.iter() {
            map.insert(k.clone(), v.clone());
        }
        Bindings { map }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Term, &Term)> {
        self.map.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Term> {
        self.map.keys()
    }

    /// A plain ordered snapshot, handy for comparisons in tests and logs.
    pub fn to_btree(&self) -> BTreeMap<Term, Term> {
        self.map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(Term, Term)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Term, Term)>>(iter: I) -> Self {
        Bindings {
            map: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k} -> {v}")?;
        }
        write!(f, "}}")
    }
}
