//! Index and search properties checked across the whole stack.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use e2e_tests::{request, TestHarness};
use notes_indexing::{ReindexLock, ReindexState, DEFAULT_LOCK_STALE_AFTER, LOCK_FILE_NAME};
use notes_types::{DocumentRecord, SearchRequest, SearchResponse, SearchTerm};

#[test]
fn test_upsert_is_idempotent() {
    let harness = TestHarness::new();
    let record = DocumentRecord::new("user_1/a.md", "repeatable content").with_tags(["x"]);

    assert!(harness.search.index(&record));
    let first = harness.search.search(&request(SearchTerm::word("repeatable"))).unwrap();
    assert!(harness.search.index(&record));
    let second = harness.search.search(&request(SearchTerm::word("repeatable"))).unwrap();

    assert_eq!(harness.search.num_docs(), 1);
    assert_eq!(first.hits, second.hits);
    assert_eq!(second.total, 1);
}

#[test]
fn test_one_document_per_path() {
    let harness = TestHarness::new();
    harness.search.index_markdown("user_1/a.md", "first draft");
    harness.search.index_markdown("user_1/a.md", "second version");

    assert_eq!(harness.search.num_docs(), 1);
    assert!(harness.paths(&request(SearchTerm::word("draft"))).is_empty());
    assert_eq!(
        harness.paths(&request(SearchTerm::word("version"))),
        vec!["user_1/a.md"]
    );
}

#[test]
fn test_tags_and_props_round_trip() {
    let harness = TestHarness::new();
    let mut props = BTreeMap::new();
    props.insert("status".to_string(), "in=progress".to_string());
    props.insert("owner".to_string(), "ana, bo".to_string());

    harness.search.index(
        &DocumentRecord::new("user_1/a.md", "body")
            .with_tags(["Rust", "rust", "Search"])
            .with_props(props.clone()),
    );

    let doc = harness.search.document("user_1/a.md").unwrap().unwrap();
    assert_eq!(doc.tags, vec!["rust".to_string(), "search".to_string()]);
    assert_eq!(doc.props, props);
    assert_eq!(
        harness.paths(&request(SearchTerm::tag("RUST"))),
        vec!["user_1/a.md"]
    );
}

#[test]
fn test_prefilter_does_not_change_results() {
    let harness = TestHarness::new();
    let corpus = [
        ("user_1/a.md", "function foo\nfunc bar\n"),
        ("user_1/b.md", "my func call\nfoo then bar\n"),
        ("user_1/c.md", "Hello   World\ncolour and color\n"),
        ("user_1/d.md", "readme.md lists files\nabc\n"),
        ("user_1/e.md", "FUNCTION SHOUTING\nxyz\n"),
        ("user_1/f.md", "nothing to see\n"),
        ("user_1/g.md", "\u{17F}tation report\n\u{212A}elvin scale\n"),
        ("user_1/h.md", "station log\nkelvin\n"),
    ];
    for (path, content) in corpus {
        harness.write_note(path, content);
    }
    harness.reindex();

    let patterns = [
        ("^func", Some("m")),
        ("^func", None),
        ("func", Some("i")),
        ("foo.*bar", None),
        (r"hello\s+world", Some("i")),
        ("abc|xyz", None),
        ("colou?r", None),
        (r"\.md", None),
        ("FUNCTION", None),
        ("sta", None),
        ("station", Some("i")),
        ("kelvin", None),
        ("Kelvin scale", None),
    ];
    let store = harness.search.store().as_ref();
    let with_prefilter = harness.searcher(true);
    let without_prefilter = harness.searcher(false);

    for (pattern, flags) in patterns {
        for case_sensitive in [false, true] {
            let req = request(SearchTerm::regex(pattern, flags)).with_case_sensitive(case_sensitive);
            let expected = sorted_paths(&without_prefilter.search(&req, store).unwrap());
            let actual = sorted_paths(&with_prefilter.search(&req, store).unwrap());
            assert_eq!(
                actual, expected,
                "pattern {pattern:?} flags {flags:?} case_sensitive {case_sensitive}"
            );
        }
    }
}

#[test]
fn test_case_insensitive_regex_finds_long_s_spelling() {
    let harness = TestHarness::new();
    harness.write_note("user_1/a.md", "\u{17F}tation report\n");
    harness.write_note("user_1/b.md", "station log\n");
    harness.reindex();

    let response = harness.search.search(&request(SearchTerm::regex("sta", None))).unwrap();
    assert_eq!(sorted_paths(&response), vec!["user_1/a.md", "user_1/b.md"]);

    let strict = request(SearchTerm::regex("sta", None)).with_case_sensitive(true);
    assert_eq!(sorted_paths(&harness.search.search(&strict).unwrap()), vec!["user_1/b.md"]);
}

fn sorted_paths(response: &SearchResponse) -> Vec<String> {
    let mut paths: Vec<String> = response.hits.iter().map(|h| h.path.clone()).collect();
    paths.sort();
    paths
}

#[test]
fn test_pagination_is_consistent() {
    let harness = TestHarness::new();
    for i in 0..7 {
        let body = "paged ".repeat(i + 1);
        harness.search.index_markdown(&format!("user_1/{i}.md"), &body);
    }

    let term = SearchTerm::word("paged");
    let full = harness.search.search(&request(term.clone())).unwrap();
    assert_eq!(full.total, 7);

    let mut stitched = Vec::new();
    for offset in (0..7).step_by(3) {
        let page = harness
            .search
            .search(&request(term.clone()).with_limit(3).with_offset(offset))
            .unwrap();
        assert_eq!(page.total, 7);
        stitched.extend(page.hits);
    }
    assert_eq!(stitched, full.hits);

    let past_end = harness
        .search
        .search(&request(term).with_offset(50))
        .unwrap();
    assert!(past_end.hits.is_empty());
    assert_eq!(past_end.total, 7);
}

#[test]
fn test_path_restriction() {
    let harness = TestHarness::new();
    harness.search.index_markdown("user_1/a.md", "shared word alpha");
    harness.search.index_markdown("user_1/b.md", "shared word beta");
    harness.search.index_markdown("user_2/c.md", "shared word gamma");

    let open = harness.search.search(&request(SearchTerm::word("shared"))).unwrap();
    let restricted = harness
        .search
        .search(&request(SearchTerm::word("shared")).restrict_to(["user_1/b.md", "user_2/c.md"]))
        .unwrap();

    assert_eq!(restricted.total, 2);
    for hit in &restricted.hits {
        let unrestricted = open.hits.iter().find(|h| h.path == hit.path).unwrap();
        assert_eq!(hit.score, unrestricted.score);
    }

    let none_allowed = harness
        .search
        .search(&request(SearchTerm::word("shared")).restrict_to(["user_9/missing.md"]))
        .unwrap();
    assert_eq!(none_allowed.total, 0);
}

#[test]
fn test_line_term_matches_within_one_line() {
    let harness = TestHarness::new();
    harness.write_note("user_1/same.md", "alpha beta\n");
    harness.write_note("user_1/split.md", "alpha\nbeta\n");
    harness.reindex();

    let both = request(SearchTerm::word("alpha beta"));
    assert_eq!(harness.sorted_paths(&both), vec!["user_1/same.md", "user_1/split.md"]);

    let line = request(SearchTerm::line(SearchTerm::word("alpha beta")));
    assert_eq!(harness.paths(&line), vec!["user_1/same.md"]);
}

#[test]
fn test_terms_are_anded() {
    let harness = TestHarness::new();
    harness.write_note("user_1/a.md", "release notes #work\nfunction ship\n");
    harness.write_note("user_1/b.md", "release party #fun\n");
    harness.reindex();

    let req = SearchRequest::new(vec![
        SearchTerm::word("release"),
        SearchTerm::tag("work"),
        SearchTerm::regex("^function", Some("m")),
    ]);
    assert_eq!(harness.paths(&req), vec!["user_1/a.md"]);
}

#[test]
fn test_incremental_reindex_skips_everything_unchanged() {
    let harness = TestHarness::new();
    for i in 0..5 {
        harness.write_note(&format!("user_3/n{i}.md"), &format!("note number {i}"));
    }

    let first = harness.reindex();
    assert_eq!(first.indexed, 5);
    let version = harness.search.stats().unwrap().version;

    let second = harness.reindex();
    assert_eq!((second.indexed, second.skipped, second.errors), (0, 5, 0));
    assert_eq!(harness.search.stats().unwrap().version, version);
}

#[test]
fn test_reindex_prunes_deleted_notes() {
    let harness = TestHarness::new();
    harness.write_note("user_1/keep.md", "keep me");
    harness.write_note("user_1/gone.md", "remove me");
    harness.reindex();

    harness.remove_note("user_1/gone.md");
    let summary = harness.reindex();

    assert_eq!(summary.removed, 1);
    assert!(harness.search.document("user_1/gone.md").unwrap().is_none());
    assert_eq!(harness.search.num_docs(), 1);
}

#[test]
fn test_reindex_skipped_while_locked() {
    let harness = TestHarness::new();
    harness.write_note("user_1/a.md", "locked out");

    let lock_path = harness.index_dir().join(LOCK_FILE_NAME);
    let held = ReindexLock::try_acquire(&lock_path, DEFAULT_LOCK_STALE_AFTER)
        .unwrap()
        .unwrap();

    let summary = harness.reindex();
    assert_eq!(summary.state, ReindexState::Skipped);
    assert_eq!(harness.search.num_docs(), 0);

    drop(held);
    assert_eq!(harness.reindex().indexed, 1);
}

#[test]
fn test_cancelled_reindex_leaves_index_usable() {
    let harness = TestHarness::new();
    harness.write_note("user_1/a.md", "never indexed");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = harness.search.reindex_all(&cancel).unwrap();

    assert_eq!(summary.state, ReindexState::Cancelled);
    assert_eq!(summary.indexed, 0);
    assert!(harness.search.index_markdown("user_1/b.md", "writer still free"));
    assert_eq!(harness.search.num_docs(), 1);
}
