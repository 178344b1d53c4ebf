//! Example search and indexing scenarios, end to end.
//!
//! Each test drives the `NoteSearch` facade over a temporary vault root and
//! index, the same way the daemon does.

use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;
use tantivy::collector::Count;

use e2e_tests::{request, request_json, TestHarness};
use notes_indexing::ReindexState;
use notes_search::{extract_tags, prefilter_trigram, QueryPlanner};
use notes_types::SearchTerm;

/// Tags are extracted from the body, lowercased and deduplicated.
#[test]
fn test_tags_extracted_lowercase_deduped() {
    let harness = TestHarness::new();
    let content = "# Title\nHello #world and #World";

    assert_eq!(extract_tags(content), vec!["world"]);
    assert!(harness.search.index_markdown("notes/a.md", content));

    let doc = harness.search.document("notes/a.md").unwrap().unwrap();
    assert_eq!(doc.tags, vec!["world".to_string()]);
    assert_eq!(doc.name, "a.md");

    let hits = harness.paths(&request(SearchTerm::tag("WORLD")));
    assert_eq!(hits, vec!["notes/a.md"]);
}

/// A phrase only matches exact adjacency.
#[test]
fn test_phrase_requires_adjacency() {
    let harness = TestHarness::new();
    harness.search.index_markdown("a.md", "say hello world now");
    harness.search.index_markdown("b.md", "hello there world");

    let phrase = request_json(r#"{"terms": [{"type": "phrase", "value": "hello world"}]}"#);
    assert_eq!(harness.paths(&phrase), vec!["a.md"]);

    let words = request(SearchTerm::word("hello world"));
    assert_eq!(harness.sorted_paths(&words), vec!["a.md", "b.md"]);
}

/// A multi-line anchored regex gets a trigram prefilter and matches only at
/// line start.
#[test]
fn test_regex_with_trigram_prefilter() {
    let harness = TestHarness::new();
    harness.write_note("user_1/a.md", "intro text\nfunction foo\n");
    harness.write_note("user_1/b.md", "my func call\n");
    harness.write_note("user_1/c.md", "nothing relevant here\n");
    assert_eq!(harness.reindex().indexed, 3);

    let terms = vec![SearchTerm::regex("^func [A-Za-z]+", Some("m"))];
    assert_eq!(prefilter_trigram("^func [A-Za-z]+", true).as_deref(), Some("fun"));

    let index = harness.search.index_handle();
    let searcher = index.searcher();
    let with_prefilter = QueryPlanner::new(index).unwrap().build(&terms, false);
    let without = QueryPlanner::new(index)
        .unwrap()
        .with_trigram_prefilter(false)
        .build(&terms, false);
    assert_eq!(searcher.search(with_prefilter.query.as_ref(), &Count).unwrap(), 2);
    assert_eq!(searcher.search(without.query.as_ref(), &Count).unwrap(), 3);

    let regex = request_json(
        r#"{"terms": [{"type": "regex", "value": "^func [A-Za-z]+", "flags": "m"}]}"#,
    );
    let response = harness.search.search(&regex).unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.paths(), vec!["user_1/a.md"]);
}

/// A deleted document stops matching and leaves the count.
#[test]
fn test_delete_then_search() {
    let harness = TestHarness::new();
    harness.search.index_markdown("a.md", "zebra crossing");
    harness.search.index_markdown("b.md", "plain road");

    let zebra = request(SearchTerm::word("zebra"));
    assert_eq!(harness.paths(&zebra), vec!["a.md"]);
    let before = harness.search.stats().unwrap().doc_count;

    assert!(harness.search.remove("a.md"));

    let response = harness.search.search(&zebra).unwrap();
    assert_eq!(response.total, 0);
    assert!(response.hits.is_empty());
    assert_eq!(harness.search.stats().unwrap().doc_count, before - 1);
}

/// An unchanged file is skipped and a new one indexed.
#[test]
fn test_reindex_skips_unchanged_file() {
    let harness = TestHarness::new();
    let old_content = "written an hour ago";
    harness.write_note("user_7/old.md", old_content);
    harness.touch("user_7/old.md", SystemTime::now() - Duration::from_secs(3600));
    assert!(harness.search.index_markdown("user_7/old.md", old_content));

    harness.write_note("user_7/new.md", "brand new");

    let summary = harness.reindex();
    assert_eq!(summary.state, ReindexState::Done);
    assert_eq!(
        (summary.indexed, summary.skipped, summary.errors),
        (1, 1, 0)
    );
    assert_eq!(harness.search.num_docs(), 2);
}
