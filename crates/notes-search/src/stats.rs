//! Index statistics.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::SearchError;
use crate::index::SearchIndex;

/// Basic index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub doc_count: u64,
    /// Opstamp of the last commit
    pub version: u64,
    pub index_dir: String,
}

/// Statistics plus on-disk measurements.
///
/// A failing measurement leaves its field empty and is described in
/// `detailed_error`; the remaining fields are still filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedIndexStats {
    pub doc_count: u64,
    pub version: Option<u64>,
    pub index_dir: String,
    pub index_size_mb: Option<f64>,
    pub segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_error: Option<String>,
}

impl SearchIndex {
    pub fn stats(&self) -> Result<IndexStats, SearchError> {
        Ok(IndexStats {
            doc_count: self.searcher().num_docs(),
            version: self.index().load_metas()?.opstamp,
            index_dir: self.path().display().to_string(),
        })
    }

    pub fn detailed_stats(&self) -> DetailedIndexStats {
        let mut errors = Vec::new();

        let version = match self.index().load_metas() {
            Ok(metas) => Some(metas.opstamp),
            Err(e) => {
                errors.push(format!("version: {e}"));
                None
            }
        };

        let index_size_mb = match directory_size_bytes(self.path()) {
            Ok(bytes) => Some(bytes as f64 / (1024.0 * 1024.0)),
            Err(e) => {
                errors.push(format!("size: {e}"));
                None
            }
        };

        let segments = match self.index().searchable_segment_ids() {
            Ok(ids) => Some(ids.len()),
            Err(e) => {
                errors.push(format!("segments: {e}"));
                None
            }
        };

        let detailed_error = if errors.is_empty() {
            None
        } else {
            let joined = errors.join("; ");
            warn!(error = %joined, "Partial index statistics");
            Some(joined)
        };

        DetailedIndexStats {
            doc_count: self.searcher().num_docs(),
            version,
            index_dir: self.path().display().to_string(),
            index_size_mb,
            segments,
            detailed_error,
        }
    }
}

/// Total size of the regular files under `dir`. Symlinks are not followed
/// and not counted.
pub fn directory_size_bytes(dir: &Path) -> Result<u64, walkdir::Error> {
    let mut total = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndexConfig;
    use crate::indexer::SearchIndexer;
    use notes_types::DocumentRecord;
    use tempfile::TempDir;

    #[test]
    fn test_stats_track_commits() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path())).unwrap();
        let indexer = SearchIndexer::new(&index).unwrap();

        let empty = index.stats().unwrap();
        assert_eq!(empty.doc_count, 0);

        let opstamp = indexer.upsert(&DocumentRecord::new("a.md", "hello")).unwrap();
        let stats = index.stats().unwrap();
        assert_eq!(stats.doc_count, 1);
        assert_eq!(stats.version, opstamp);
        assert_eq!(stats.index_dir, temp_dir.path().display().to_string());
    }

    #[test]
    fn test_detailed_stats() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path())).unwrap();
        let indexer = SearchIndexer::new(&index).unwrap();
        indexer.upsert(&DocumentRecord::new("a.md", "hello")).unwrap();

        let detailed = index.detailed_stats();
        assert_eq!(detailed.doc_count, 1);
        assert_eq!(detailed.segments, Some(1));
        assert!(detailed.index_size_mb.unwrap() > 0.0);
        assert!(detailed.detailed_error.is_none());

        let json = serde_json::to_value(&detailed).unwrap();
        assert!(json.get("detailed_error").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_size_skips_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("sub/b.bin"), vec![0u8; 50]).unwrap();
        std::fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big.bin"), temp_dir.path().join("link")).unwrap();

        assert_eq!(directory_size_bytes(temp_dir.path()).unwrap(), 150);
    }

    #[test]
    fn test_directory_size_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(directory_size_bytes(&temp_dir.path().join("missing")).is_err());
    }
}
