use linkmatch_graph::{Graph, Statement, Term};
use linkmatch_query::{
    Bindings, Constraint, Pattern, QueryEngine, QueryError, SearchConfig, SearchSummary,
};
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Helpers
// ============================================================================

fn s(name: &str) -> Term {
    Term::sym(format!("http://example.org/{name}"))
}

fn v(name: &str) -> Term {
    Term::var(name)
}

fn knows_graph() -> Graph {
    let mut g = Graph::new();
    g.add_triple(s("A"), s("knows"), s("B"));
    g.add_triple(s("B"), s("knows"), s("C"));
    g.add_triple(s("A"), s("knows"), s("C"));
    g
}

#[derive(Debug, PartialEq)]
enum Event {
    Match(Bindings),
    Done(Result<SearchSummary, QueryError>),
}

/// Run a search and record every callback in order.
fn record(engine: &QueryEngine, pattern: &Pattern) -> Result<Vec<Event>, QueryError> {
    let events: Rc<RefCell<Vec<Event>>> = Rc::default();
    let on_match = Rc::clone(&events);
    let on_done = Rc::clone(&events);
    engine.search(
        pattern,
        move |b| on_match.borrow_mut().push(Event::Match(b.clone())),
        move |r| on_done.borrow_mut().push(Event::Done(r)),
    )?;
    let out = events.take();
    Ok(out)
}

fn matches(events: &[Event]) -> Vec<Bindings> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Match(b) => Some(b.clone()),
            Event::Done(_) => None,
        })
        .collect()
}

fn assert_done_once_and_last(events: &[Event]) {
    let dones = events.iter().filter(|e| matches!(e, Event::Done(_))).count();
    assert_eq!(dones, 1, "done must fire exactly once: {events:?}");
    assert!(matches!(events.last(), Some(Event::Done(_))), "done must fire last");
}

fn binding(pairs: &[(&str, Term)]) -> Bindings {
    pairs.iter().map(|(k, t)| (v(k), t.clone())).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn two_hop_knows_chain_has_a_single_match() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .triple(v("x"), s("knows"), v("y"))
        .triple(v("y"), s("knows"), v("z"));

    let events = record(&engine, &pattern)?;
    assert_done_once_and_last(&events);
    assert_eq!(
        matches(&events),
        vec![binding(&[("x", s("A")), ("y", s("B")), ("z", s("C"))])]
    );

    // An optional that never matches leaves the result unchanged.
    let pattern = pattern.optional(Pattern::new().triple(v("z"), s("knows"), v("x")));
    let events = record(&engine, &pattern)?;
    assert_done_once_and_last(&events);
    assert_eq!(
        matches(&events),
        vec![binding(&[("x", s("A")), ("y", s("B")), ("z", s("C"))])]
    );
    Ok(())
}

#[test]
fn unknown_subject_matches_nothing_but_still_completes() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new().triple(s("NonExistentSubject"), s("knows"), v("x"));

    let events = record(&engine, &pattern)?;
    assert_eq!(
        events,
        vec![Event::Done(Ok(SearchSummary::default()))]
    );
    Ok(())
}

#[test]
fn empty_pattern_matches_once_with_no_bindings() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let found = engine.search_sync(&Pattern::new())?;
    assert_eq!(found, vec![Bindings::new()]);
    Ok(())
}

#[test]
fn ground_triples_still_go_through_matching() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());

    let present = Pattern::new().triple(s("A"), s("knows"), s("B"));
    assert_eq!(engine.search_sync(&present)?, vec![Bindings::new()]);

    let absent = Pattern::new().triple(s("C"), s("knows"), s("A"));
    assert!(engine.search_sync(&absent)?.is_empty());
    Ok(())
}

#[test]
fn always_false_constraint_removes_every_match() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .triple(v("x"), s("knows"), v("y"))
        .constrain(v("y"), Constraint::new("never", |_| false));

    let events = record(&engine, &pattern)?;
    assert_done_once_and_last(&events);
    assert!(matches(&events).is_empty());
    Ok(())
}

#[test]
fn constraints_filter_individual_bindings() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .triple(s("A"), s("knows"), v("y"))
        .constrain(v("y"), Constraint::not_equal(s("B")));
    assert_eq!(
        engine.search_sync(&pattern)?,
        vec![binding(&[("y", s("C"))])]
    );
    Ok(())
}

#[test]
fn literal_constraints_use_regexes() -> anyhow::Result<()> {
    let mut g = Graph::new();
    g.add_triple(s("A"), s("age"), Term::lit("42"));
    g.add_triple(s("B"), s("age"), Term::lit("unknown"));
    let engine = QueryEngine::new(g.into_shared());

    let pattern = Pattern::new()
        .triple(v("who"), s("age"), v("age"))
        .constrain(v("age"), Constraint::literal_matches(Regex::new(r"^\d+$")?));
    assert_eq!(
        engine.search_sync(&pattern)?,
        vec![binding(&[("who", s("A")), ("age", Term::lit("42"))])]
    );
    Ok(())
}

#[test]
fn initial_bindings_seed_the_search() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .bind(v("x"), s("A"))
        .triple(v("x"), s("knows"), v("y"));
    let found = engine.search_sync(&pattern)?;
    assert_eq!(
        found,
        vec![
            binding(&[("x", s("A")), ("y", s("B"))]),
            binding(&[("x", s("A")), ("y", s("C"))]),
        ]
    );

    // Seed values are checked against constraints before anything runs.
    let rejected = pattern.constrain(v("x"), Constraint::not_equal(s("A")));
    assert!(engine.search_sync(&rejected)?.is_empty());
    Ok(())
}

#[test]
fn repeated_variable_requires_equal_positions() -> anyhow::Result<()> {
    let mut g = knows_graph();
    g.add_triple(s("D"), s("knows"), s("D"));
    let engine = QueryEngine::new(g.into_shared());
    let pattern = Pattern::new().triple(v("x"), s("knows"), v("x"));
    assert_eq!(engine.search_sync(&pattern)?, vec![binding(&[("x", s("D"))])]);
    Ok(())
}

#[test]
fn pattern_blank_nodes_act_as_variables() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .triple(Term::blank("someone"), s("knows"), s("C"))
        .triple(Term::blank("someone"), s("knows"), s("B"));
    let found = engine.search_sync(&pattern)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get(&Term::blank("someone")), Some(&s("A")));
    Ok(())
}

#[test]
fn data_blank_nodes_are_plain_values() -> anyhow::Result<()> {
    let mut g = Graph::new();
    g.add_triple(Term::blank("n1"), s("name"), Term::lit("anon"));
    g.add_triple(Term::blank("n1"), s("knows"), s("A"));
    let engine = QueryEngine::new(g.into_shared());
    let pattern = Pattern::new()
        .triple(v("p"), s("name"), v("n"))
        .triple(v("p"), s("knows"), v("q"));
    assert_eq!(
        engine.search_sync(&pattern)?,
        vec![binding(&[
            ("p", Term::blank("n1")),
            ("n", Term::lit("anon")),
            ("q", s("A")),
        ])]
    );
    Ok(())
}

#[test]
fn merged_terms_match_through_redirection() -> anyhow::Result<()> {
    let mut g = Graph::new();
    g.add_triple(s("A"), s("knows"), s("bob"));
    g.add_triple(s("robert"), s("name"), Term::lit("Bob"));
    let engine = QueryEngine::new(g.into_shared());
    let pattern = Pattern::new()
        .triple(s("A"), s("knows"), v("friend"))
        .triple(v("friend"), s("name"), v("name"));

    assert!(engine.search_sync(&pattern)?.is_empty());

    engine.graph().write().equate(&s("bob"), &s("robert"))?;
    let found = engine.search_sync(&pattern)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_var("name"), Some(&Term::lit("Bob")));
    Ok(())
}

#[test]
fn collections_unify_element_wise() -> anyhow::Result<()> {
    let mut g = Graph::new();
    g.add_triple(s("route"), s("stops"), Term::list([s("X"), s("Y"), s("Z")]));
    g.add_triple(s("short"), s("stops"), Term::list([s("X")]));
    let engine = QueryEngine::new(g.into_shared());

    let pattern = Pattern::new().triple(
        v("r"),
        s("stops"),
        Term::list([v("first"), s("Y"), v("last")]),
    );
    assert_eq!(
        engine.search_sync(&pattern)?,
        vec![binding(&[
            ("r", s("route")),
            ("first", s("X")),
            ("last", s("Z")),
        ])]
    );
    Ok(())
}

#[test]
fn collections_are_found_after_an_element_is_merged() -> anyhow::Result<()> {
    let mut g = Graph::new();
    g.add_triple(s("route"), s("stops"), Term::list([s("X"), Term::blank("mid")]));
    let engine = QueryEngine::new(g.into_shared());
    let pattern = Pattern::new().triple(v("r"), s("stops"), Term::list([s("X"), s("Y")]));
    assert!(engine.search_sync(&pattern)?.is_empty());

    engine.graph().write().equate(&Term::blank("mid"), &s("Y"))?;
    assert_eq!(
        engine.search_sync(&pattern)?,
        vec![binding(&[("r", s("route"))])]
    );
    Ok(())
}

#[test]
fn collection_against_atom_fails_the_search() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new().triple(s("A"), s("knows"), Term::list([v("x")]));

    let events = record(&engine, &pattern)?;
    assert_done_once_and_last(&events);
    assert!(matches(&events).is_empty());
    assert!(matches!(
        events.last(),
        Some(Event::Done(Err(QueryError::ShapeMismatch { .. })))
    ));
    assert!(matches!(
        engine.search_sync(&pattern),
        Err(QueryError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn malformed_patterns_are_rejected_before_any_callback() {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new()
        .triple(v("x"), s("knows"), v("y"))
        .constrain(v("typo"), Constraint::is_symbol());

    let fired = Rc::new(RefCell::new(0));
    let (m, d) = (Rc::clone(&fired), Rc::clone(&fired));
    let result = engine.search(
        &pattern,
        move |_| *m.borrow_mut() += 1,
        move |_| *d.borrow_mut() += 1,
    );
    assert!(matches!(result, Err(QueryError::UnboundConstraint(_))));
    assert_eq!(*fired.borrow(), 0);
}

#[test]
fn max_matches_truncates_the_search() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared())
        .with_config(SearchConfig::default().with_max_matches(2));
    let pattern = Pattern::new().triple(v("x"), s("knows"), v("y"));

    let events = record(&engine, &pattern)?;
    assert_done_once_and_last(&events);
    assert_eq!(matches(&events).len(), 2);
    assert!(matches!(
        events.last(),
        Some(Event::Done(Ok(SearchSummary {
            matches: 2,
            truncated: true,
            cancelled: false,
            ..
        })))
    ));
    Ok(())
}

#[test]
fn matches_follow_candidate_index_order() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new().triple(v("x"), s("knows"), v("y"));
    let found: Vec<(Term, Term)> = engine
        .search_sync(&pattern)?
        .into_iter()
        .map(|b| (b.get_var("x").cloned().unwrap(), b.get_var("y").cloned().unwrap()))
        .collect();
    assert_eq!(
        found,
        vec![(s("A"), s("B")), (s("B"), s("C")), (s("A"), s("C"))]
    );
    Ok(())
}

#[test]
fn searches_see_statements_added_between_runs() -> anyhow::Result<()> {
    let engine = QueryEngine::new(knows_graph().into_shared());
    let pattern = Pattern::new().triple(s("C"), s("knows"), v("y"));
    assert!(engine.search_sync(&pattern)?.is_empty());

    engine
        .graph()
        .write()
        .add(Statement::new(s("C"), s("knows"), s("A")));
    assert_eq!(engine.search_sync(&pattern)?, vec![binding(&[("y", s("A"))])]);
    Ok(())
}
