mod common;

use common::*;
use vellum_content::{compile, ContentError, ProviderConfig, SearchScope, ValidationError};
use vellum_model::{ComparisonOp, Constraint, StandardName};

fn seed(provider: &vellum_content::ContentProvider) {
    let session = session();
    let root = root(provider, &session);
    let b = root
        .add(&name("a"), &[])
        .unwrap()
        .add(&name("b"), &[])
        .unwrap();
    for (parent, local, value) in [(&b, "one", "x"), (&b, "two", "y"), (&root, "three", "x")] {
        parent
            .add(&ex(local), &[doc_class()])
            .unwrap()
            .put(&title(), value)
            .unwrap();
    }
    provider.persist(&session).unwrap();
}

fn title_is_x() -> Constraint {
    Constraint::and([Constraint::class(doc_class()), Constraint::eq(title(), "x")])
}

#[test]
fn scoped_search_compiles_to_class_predicate_and_descendant() {
    let repository = repository();
    let provider = provider(&repository);
    let query = compile(&provider, &title_is_x(), Some("/a/b")).unwrap();
    assert_eq!(
        query.to_string(),
        "SELECT * FROM [ex:doc] AS content \
         WHERE (content.[ex:title] = 'x') AND (ISDESCENDANTNODE(content, [/a/b]))"
    );
}

#[test]
fn compiling_twice_gives_the_same_query() {
    let repository = repository();
    let provider = provider(&repository);
    let tree = Constraint::or([
        Constraint::compare(title(), ComparisonOp::Like, "x%"),
        Constraint::class(doc_class()),
        Constraint::compare(ex("rank"), ComparisonOp::Gte, 3),
        Constraint::negate(Constraint::exists(ex("hidden"))),
    ]);
    let first = compile(&provider, &tree, Some("a")).unwrap();
    let second = compile(&provider, &tree, Some("a")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn search_returns_matching_nodes_in_scope() {
    let repository = repository();
    let provider = provider(&repository);
    seed(&provider);
    let session = session();

    let everywhere = provider.search(&session, &title_is_x(), None).unwrap();
    assert_eq!(everywhere.len(), 2);

    let scoped: Vec<String> = provider
        .search(&session, &title_is_x(), Some("a/b"))
        .unwrap()
        .map(|node| node.path().to_string())
        .collect();
    assert_eq!(scoped, vec!["/a/b/ex:one".to_string()]);

    let all_docs = provider
        .search(&session, &Constraint::and([Constraint::class(doc_class())]), None)
        .unwrap();
    assert_eq!(all_docs.len(), 3);
}

#[test]
fn results_are_pulled_one_at_a_time() {
    let repository = repository();
    let provider = provider(&repository);
    seed(&provider);
    let session = session();

    let mut results = provider
        .search(&session, &Constraint::class(doc_class()), None)
        .unwrap();
    assert_eq!(results.len(), 3);
    let first = results.next().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(first.path(), "/a/b/ex:one");
    assert_eq!(first.get(&title()).unwrap().unwrap().as_str(), Some("x"));
}

#[test]
fn versioning_flags_are_searchable() {
    let repository = repository();
    let provider = provider(&repository);
    seed(&provider);
    let session = session();
    provider.freeze(&session, "a/b/ex:two").unwrap();

    let checked_in = Constraint::and([
        Constraint::class(doc_class()),
        Constraint::exists(StandardName::CheckedIn.qname()),
    ]);
    let hits: Vec<String> = provider
        .search(&session, &checked_in, None)
        .unwrap()
        .map(|node| node.path().to_string())
        .collect();
    assert_eq!(hits, vec!["/a/b/ex:two".to_string()]);
}

#[test]
fn admin_scope_searches_committed_state() {
    let repository = repository();
    let provider = start(
        &repository,
        ProviderConfig::new("/main").with_search_scope(SearchScope::Admin),
    );
    seed(&provider);
    let session = session();
    let hits = provider.search(&session, &title_is_x(), None).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn malformed_trees_are_validation_errors() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();

    let no_class = Constraint::and([Constraint::eq(title(), "x")]);
    assert!(matches!(
        provider.search(&session, &no_class, None),
        Err(ContentError::Validation(ValidationError::MissingContentClass))
    ));

    let two = Constraint::and([Constraint::classes([doc_class(), nt("file")])]);
    let err = provider.search(&session, &two, None).unwrap_err();
    assert_eq!(err.to_string(), "multiple content classes unsupported");

    let wire = r#"{"Comparison":{"property":"{urn:example}title","op":"between","value":1}}"#;
    assert!(Constraint::from_json(wire).is_err());
}

fn search_paths(provider: &vellum_content::ContentProvider, tree: &Constraint) -> Vec<String> {
    provider
        .search(&session(), tree, None)
        .unwrap()
        .map(|node| node.path().to_string())
        .collect()
}

#[test]
fn date_shaped_text_matches_over_the_wire() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    root(&provider, &session)
        .add(&ex("dated"), &[doc_class()])
        .unwrap()
        .put(&title(), "2024-01-01T00:00:00Z")
        .unwrap();
    provider.persist(&session).unwrap();

    let wire = r#"{"Filter":{"combinator":"AND","children":[
        {"ContentClass":{"classes":["{urn:example}doc"]}},
        {"Comparison":{"property":"{urn:example}title","op":"eq","value":"2024-01-01T00:00:00Z"}}
    ]}}"#;
    let tree = Constraint::from_json(wire).unwrap();
    assert_eq!(search_paths(&provider, &tree), vec!["/ex:dated".to_string()]);

    let before = r#"{"Filter":{"combinator":"AND","children":[
        {"ContentClass":{"classes":["{urn:example}doc"]}},
        {"Comparison":{"property":"{urn:example}title","op":"lt","value":"2023-12-31T00:00:00Z"}}
    ]}}"#;
    assert!(search_paths(&provider, &Constraint::from_json(before).unwrap()).is_empty());
}

#[test]
fn like_wildcards_span_lines() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    root(&provider, &session)
        .add(&ex("poem"), &[doc_class()])
        .unwrap()
        .put(&title(), "line one\nline two")
        .unwrap();
    provider.persist(&session).unwrap();

    let starts = Constraint::and([
        Constraint::class(doc_class()),
        Constraint::compare(title(), ComparisonOp::Like, "line%"),
    ]);
    assert_eq!(search_paths(&provider, &starts), vec!["/ex:poem".to_string()]);

    let across = Constraint::and([
        Constraint::class(doc_class()),
        Constraint::compare(title(), ComparisonOp::Like, "%one_line%"),
    ]);
    assert_eq!(search_paths(&provider, &across), vec!["/ex:poem".to_string()]);
}
