//! Query patterns.
//!
//! A pattern is a list of triples that may mention variables, plus:
//! - optional sub-patterns, tried only once the mandatory part has matched;
//! - constraints on variables;
//! - initial bindings (variables fixed before the search starts).

use linkmatch_graph::{Statement, Term};
use std::collections::BTreeSet;

use crate::bindings::Bindings;
use crate::constraint::{Constraint, Constraints};
use crate::error::QueryError;

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    statements: Vec<Statement>,
    optional: Vec<Pattern>,
    constraints: Constraints,
    initial_bindings: Bindings,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn triple(mut self, subject: Term, predicate: Term, object: Term) -> Self {
        self.add_triple(subject, predicate, object);
        self
    }

    pub fn optional(mut self, sub: Pattern) -> Self {
        self.add_optional(sub);
        self
    }

    pub fn constrain(mut self, var: Term, constraint: Constraint) -> Self {
        self.add_constraint(var, constraint);
        self
    }

    pub fn bind(mut self, var: Term, value: Term) -> Self {
        self.initial_bindings = self.initial_bindings.bind(var, value);
        self
    }

    pub fn add(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn add_triple(&mut self, subject: Term, predicate: Term, object: Term) {
        self.add(Statement::new(subject, predicate, object));
    }

    pub fn add_optional(&mut self, sub: Pattern) {
        self.optional.push(sub);
    }

    pub fn add_constraint(&mut self, var: Term, constraint: Constraint) {
        self.constraints.insert(var, constraint);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn optionals(&self) -> &[Pattern] {
        &self.optional
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn initial_bindings(&self) -> &Bindings {
        &self.initial_bindings
    }

    /// Variables of this pattern's own triples (not its optionals).
    pub fn variables(&self) -> BTreeSet<Term> {
        self.statements
            .iter()
            .flat_map(|st| st.terms().into_iter().flat_map(Term::variables))
            .collect()
    }

    /// Variables anywhere in this pattern, optionals included.
    pub fn all_variables(&self) -> BTreeSet<Term> {
        let mut vars = self.variables();
        vars.extend(self.initial_bindings.variables().cloned());
        for sub in &self.optional {
            vars.extend(sub.all_variables());
        }
        vars
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Reject patterns the search cannot evaluate meaningfully:
    /// - a constraint keyed by a non-variable, or by a variable that occurs
    ///   nowhere in the pattern tree (or its enclosing patterns);
    /// - two optional clauses of one pattern that can bind the same variable
    ///   when the trunk has not already bound it.
    pub fn validate(&self) -> Result<(), QueryError> {
        self.validate_in(&BTreeSet::new())
    }

    fn validate_in(&self, outer: &BTreeSet<Term>) -> Result<(), QueryError> {
        let mut trunk: BTreeSet<Term> = outer.clone();
        trunk.extend(self.variables());
        trunk.extend(self.initial_bindings.variables().cloned());

        let everywhere: BTreeSet<Term> = trunk.union(&self.all_variables()).cloned().collect();
        for var in self.constraints.keys() {
            if !var.is_variable() {
                return Err(QueryError::ConstraintOnConstant(var.clone()));
            }
            if !everywhere.contains(var) {
                return Err(QueryError::UnboundConstraint(var.clone()));
            }
        }

        let branch_vars: Vec<BTreeSet<Term>> = self
            .optional
            .iter()
            .map(|sub| sub.all_variables().difference(&trunk).cloned().collect())
            .collect();
        for (first, a) in branch_vars.iter().enumerate() {
            for (offset, b) in branch_vars[first + 1..].iter().enumerate() {
                if let Some(variable) = a.intersection(b).next() {
                    return Err(QueryError::OverlappingOptionals {
                        variable: variable.clone(),
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
        }

        for sub in &self.optional {
            sub.validate_in(&trunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(name: &str) -> Term {
        Term::sym(format!("http://example.org/{name}"))
    }

    #[test]
    fn constraint_on_missing_variable_is_rejected() {
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("y"))
            .constrain(Term::var("z"), Constraint::is_literal());
        assert_eq!(p.validate(), Err(QueryError::UnboundConstraint(Term::var("z"))));
    }

    #[test]
    fn constraint_on_constant_is_rejected() {
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("y"))
            .constrain(s("p"), Constraint::is_literal());
        assert_eq!(p.validate(), Err(QueryError::ConstraintOnConstant(s("p"))));
    }

    #[test]
    fn constraint_may_target_an_optional_or_initial_variable() {
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("y"))
            .optional(Pattern::new().triple(Term::var("x"), s("label"), Term::var("label")))
            .constrain(Term::var("label"), Constraint::is_literal());
        assert!(p.validate().is_ok());

        let p = Pattern::new()
            .bind(Term::var("who"), s("alice"))
            .constrain(Term::var("who"), Constraint::is_symbol());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn optionals_sharing_a_new_variable_are_rejected() {
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("y"))
            .optional(Pattern::new().triple(Term::var("x"), s("a"), Term::var("z")))
            .optional(Pattern::new().triple(Term::var("y"), s("b"), Term::var("z")));
        assert_eq!(
            p.validate(),
            Err(QueryError::OverlappingOptionals {
                variable: Term::var("z"),
                first: 0,
                second: 1,
            })
        );
    }

    #[test]
    fn optionals_may_share_trunk_variables() {
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("y"))
            .optional(Pattern::new().triple(Term::var("x"), s("a"), Term::var("a")))
            .optional(Pattern::new().triple(Term::var("x"), s("b"), Term::var("b")));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn nested_optionals_are_checked_against_their_own_trunk() {
        let inner = Pattern::new()
            .triple(Term::var("a"), s("q"), Term::var("n"))
            .optional(Pattern::new().triple(Term::var("n"), s("r"), Term::var("m")))
            .optional(Pattern::new().triple(Term::var("n"), s("t"), Term::var("m")));
        let p = Pattern::new()
            .triple(Term::var("x"), s("p"), Term::var("a"))
            .optional(inner);
        assert!(matches!(
            p.validate(),
            Err(QueryError::OverlappingOptionals { .. })
        ));
    }

    #[test]
    fn variables_include_blank_nodes_and_collection_members() {
        let p = Pattern::new().triple(
            Term::blank("b"),
            s("p"),
            Term::list([Term::var("x"), s("c")]),
        );
        let vars: Vec<Term> = p.variables().into_iter().collect();
        assert_eq!(vars, vec![Term::var("x"), Term::blank("b")]);
    }
}
