//! Term model: the closed set of values a statement position can hold.
//!
//! Matching only cares about two properties of a term:
//!
//! - **variable-ness**: `Variable` and `BlankNode` stand for "something"
//!   (a blank node in a pattern is an existential variable, never a constant);
//! - **atomicity**: everything except `Collection` compares as a whole, while a
//!   collection unifies element-wise.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const XSD_STRING_IRI: &str = "http://www.w3.org/2001/XMLSchema#string";

/// A literal value with optional datatype IRI and language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// A named query variable (`?x`).
    Variable(String),
    /// A blank node (`_:b0`). Behaves as a variable when it occurs in a pattern.
    BlankNode(String),
    /// An IRI reference.
    Symbol(String),
    Literal(Literal),
    /// An ordered list of terms (`( a b c )`).
    Collection(Vec<Term>),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    pub fn sym(iri: impl Into<String>) -> Self {
        Term::Symbol(iri.into())
    }

    pub fn lit(lexical: impl Into<String>) -> Self {
        Term::Literal(Literal::plain(lexical))
    }

    pub fn list(items: impl IntoIterator<Item = Term>) -> Self {
        Term::Collection(items.into_iter().collect())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_) | Term::BlankNode(_))
    }

    /// Everything except a collection is atomic.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Term::Collection(_))
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Symbol(iri) => Some(iri),
            _ => None,
        }
    }

    /// The id of the document this term can be looked up in: the IRI without
    /// its `#fragment`. Only symbols name fetchable resources.
    pub fn resource_id(&self) -> Option<&str> {
        self.as_iri().map(document_part)
    }

    /// All variables (and blank nodes) occurring in this term, including
    /// inside collections.
    pub fn variables(&self) -> BTreeSet<Term> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    pub(crate) fn collect_variables(&self, out: &mut BTreeSet<Term>) {
        match self {
            Term::Variable(_) | Term::BlankNode(_) => {
                out.insert(self.clone());
            }
            Term::Collection(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            Term::Symbol(_) | Term::Literal(_) => {}
        }
    }

    /// Preference order when two terms are merged: the lower rank survives
    /// as the canonical representative.
    pub(crate) fn canonical_rank(&self) -> u8 {
        match self {
            Term::Symbol(_) => 0,
            Term::Literal(_) => 1,
            Term::Collection(_) => 2,
            Term::BlankNode(_) => 3,
            Term::Variable(_) => 4,
        }
    }
}

/// Strip the fragment from an IRI.
pub fn document_part(iri: &str) -> &str {
    match iri.find('#') {
        Some(idx) => &iri[..idx],
        None => iri,
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "?{name}"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Symbol(iri) => write!(f, "<{iri}>"),
            Term::Literal(lit) => {
                write!(f, "{:?}", lit.lexical)?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")?;
                } else if let Some(dt) = &lit.datatype {
                    if dt != XSD_STRING_IRI {
                        write!(f, "^^<{dt}>")?;
                    }
                }
                Ok(())
            }
            Term::Collection(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_nodes_are_variables_but_not_symbols() {
        assert!(Term::var("x").is_variable());
        assert!(Term::blank("b0").is_variable());
        assert!(!Term::sym("http://a.example/").is_variable());
        assert!(!Term::lit("1").is_variable());
        assert!(!Term::list([Term::var("x")]).is_variable());
    }

    #[test]
    fn only_collections_are_compound() {
        assert!(Term::sym("http://a.example/").is_atomic());
        assert!(Term::blank("b").is_atomic());
        assert!(!Term::list(Vec::new()).is_atomic());
    }

    #[test]
    fn resource_id_drops_fragment() {
        let t = Term::sym("http://people.example/alice#me");
        assert_eq!(t.resource_id(), Some("http://people.example/alice"));
        assert_eq!(Term::lit("x").resource_id(), None);
        assert_eq!(document_part("http://a.example/doc"), "http://a.example/doc");
    }

    #[test]
    fn variables_reach_into_collections() {
        let t = Term::list([
            Term::var("a"),
            Term::sym("http://a.example/"),
            Term::list([Term::blank("b")]),
        ]);
        let vars: Vec<Term> = t.variables().into_iter().collect();
        assert_eq!(vars, vec![Term::var("a"), Term::blank("b")]);
    }

    #[test]
    fn display_is_n3_like() {
        assert_eq!(Term::var("x").to_string(), "?x");
        assert_eq!(Term::sym("http://a/").to_string(), "<http://a/>");
        assert_eq!(
            Term::Literal(Literal::lang("chat", "fr")).to_string(),
            "\"chat\"@fr"
        );
        assert_eq!(
            Term::list([Term::lit("1"), Term::blank("b")]).to_string(),
            "(\"1\" _:b)"
        );
    }
}
