//! End-to-end test infrastructure for notes search.
//!
//! Provides a [`TestHarness`] with a temporary vault root and index, wired
//! together through the same [`NoteSearch`] facade the daemon uses.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use notes_indexing::{NoteSearch, ReindexSummary};
use notes_search::NoteSearcher;
use notes_types::{SearchRequest, SearchTerm, Settings};

/// Temp vaults plus an index, opened through [`NoteSearch`].
pub struct TestHarness {
    pub search: NoteSearch,
    pub settings: Settings,
    pub vaults_root: PathBuf,
    /// Keeps temp dir alive for the lifetime of the harness; dropped last
    pub _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let vaults_root = temp_dir.path().join("vaults");
        fs::create_dir_all(&vaults_root).expect("Failed to create vaults root");

        let mut settings = Settings::default();
        settings.vaults_root = vaults_root.display().to_string();
        settings.index_dir = temp_dir.path().join("index").display().to_string();
        let search = NoteSearch::from_settings(&settings).expect("Failed to open search index");

        Self {
            search,
            settings,
            vaults_root,
            _temp_dir: temp_dir,
        }
    }

    /// Write a note at a vault-relative path such as `user_1/a.md`.
    pub fn write_note(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.vaults_root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create note directory");
        }
        fs::write(&path, content).expect("Failed to write note");
        path
    }

    /// Set the modification time of a note.
    pub fn touch(&self, rel: &str, mtime: SystemTime) {
        let file = fs::File::options()
            .write(true)
            .open(self.vaults_root.join(rel))
            .expect("Failed to open note");
        file.set_modified(mtime).expect("Failed to set mtime");
    }

    pub fn remove_note(&self, rel: &str) {
        fs::remove_file(self.vaults_root.join(rel)).expect("Failed to remove note");
    }

    pub fn index_dir(&self) -> PathBuf {
        self.settings.expanded_index_dir()
    }

    pub fn reindex(&self) -> ReindexSummary {
        self.search
            .reindex_all(&CancellationToken::new())
            .expect("Reindex failed")
    }

    /// Paths of every hit for `request`.
    pub fn paths(&self, request: &SearchRequest) -> Vec<String> {
        self.search
            .search(request)
            .expect("Search failed")
            .hits
            .into_iter()
            .map(|hit| hit.path)
            .collect()
    }

    /// Same as [`paths`](Self::paths) but sorted, for set comparisons.
    pub fn sorted_paths(&self, request: &SearchRequest) -> Vec<String> {
        let mut paths = self.paths(request);
        paths.sort();
        paths
    }

    /// A searcher over the same index with the trigram prefilter toggled.
    pub fn searcher(&self, trigram_prefilter: bool) -> NoteSearcher {
        NoteSearcher::new(self.search.index_handle())
            .expect("Failed to create searcher")
            .with_trigram_prefilter(trigram_prefilter)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// One-term request.
pub fn request(term: SearchTerm) -> SearchRequest {
    SearchRequest::new(vec![term])
}

/// Parse a request from its JSON wire shape.
pub fn request_json(json: &str) -> SearchRequest {
    serde_json::from_str(json).expect("Invalid request JSON")
}
