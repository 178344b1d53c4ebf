//! Search request and response types.
//!
//! These serialize to the JSON shapes the HTTP layer exchanges with clients:
//! `{"type": "word", "value": "..."}`, `{"type": "line", "sub": {...}}`.

use serde::{Deserialize, Serialize};

use crate::error::NotesError;

/// Smallest accepted `limit`.
pub const MIN_LIMIT: usize = 1;

/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 1000;

/// Default `limit` when a request omits it.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest accepted `offset`
pub const MAX_OFFSET: usize = 100_000;

/// One search term. Terms in a request are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchTerm {
    /// Query-string words over content and name
    Word {
        #[serde(default)]
        value: String,
    },
    /// Exact adjacent word sequence in content
    Phrase {
        #[serde(default)]
        value: String,
    },
    /// Regular expression over content; flags `i` and `m`
    Regex {
        #[serde(default)]
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<String>,
    },
    /// Sub-term that must be satisfied within a single line
    Line {
        #[serde(default)]
        sub: Option<Box<SearchTerm>>,
    },
    /// Document carries the tag
    Tag {
        #[serde(default)]
        value: String,
    },
    /// Any other `type`; contributes nothing
    #[serde(other)]
    Unknown,
}

impl SearchTerm {
    pub fn word(value: impl Into<String>) -> Self {
        SearchTerm::Word {
            value: value.into(),
        }
    }

    pub fn phrase(value: impl Into<String>) -> Self {
        SearchTerm::Phrase {
            value: value.into(),
        }
    }

    pub fn regex(value: impl Into<String>, flags: Option<&str>) -> Self {
        SearchTerm::Regex {
            value: value.into(),
            flags: flags.map(str::to_string),
        }
    }

    pub fn line(sub: SearchTerm) -> Self {
        SearchTerm::Line {
            sub: Some(Box::new(sub)),
        }
    }

    pub fn tag(value: impl Into<String>) -> Self {
        SearchTerm::Tag {
            value: value.into(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchTerm::Word { .. } => "word",
            SearchTerm::Phrase { .. } => "phrase",
            SearchTerm::Regex { .. } => "regex",
            SearchTerm::Line { .. } => "line",
            SearchTerm::Tag { .. } => "tag",
            SearchTerm::Unknown => "unknown",
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// A full search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub terms: Vec<SearchTerm>,

    /// Allow-list of paths; `None` searches everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_paths: Option<Vec<String>>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,

    #[serde(default, rename = "caseSensitive")]
    pub case_sensitive: bool,
}

impl SearchRequest {
    pub fn new(terms: Vec<SearchTerm>) -> Self {
        Self {
            terms,
            restrict_paths: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            case_sensitive: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn restrict_to<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restrict_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Check `limit` against `MIN_LIMIT..=max_limit` and `offset` against
    /// [`MAX_OFFSET`].
    pub fn validate(&self, max_limit: usize) -> Result<(), NotesError> {
        let max_limit = max_limit.min(MAX_LIMIT);
        if !(MIN_LIMIT..=max_limit).contains(&self.limit) {
            return Err(NotesError::InvalidInput(format!(
                "limit must be within {}..={}, got {}",
                MIN_LIMIT, max_limit, self.limit
            )));
        }
        if self.offset > MAX_OFFSET {
            return Err(NotesError::InvalidInput(format!(
                "offset must be at most {}, got {}",
                MAX_OFFSET, self.offset
            )));
        }
        Ok(())
    }
}

/// A ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f32,
}

/// Search results for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Size of the full match set before pagination
    pub total: usize,
    pub elapsed_ms: f64,
}

impl SearchResponse {
    pub fn paths(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.path.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_json_shapes() {
        let term: SearchTerm =
            serde_json::from_str(r#"{"type": "regex", "value": "^func", "flags": "m"}"#).unwrap();
        assert_eq!(term, SearchTerm::regex("^func", Some("m")));

        let term: SearchTerm = serde_json::from_str(
            r#"{"type": "line", "sub": {"type": "phrase", "value": "hello world"}}"#,
        )
        .unwrap();
        assert_eq!(term, SearchTerm::line(SearchTerm::phrase("hello world")));

        let json = serde_json::to_value(SearchTerm::word("rust")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "word", "value": "rust"}));
    }

    #[test]
    fn test_unknown_term_type() {
        let term: SearchTerm =
            serde_json::from_str(r#"{"type": "fuzzy", "value": "x", "distance": 2}"#).unwrap();
        assert_eq!(term, SearchTerm::Unknown);
        assert_eq!(term.kind(), "unknown");
    }

    #[test]
    fn test_missing_value_defaults_to_empty() {
        let term: SearchTerm = serde_json::from_str(r#"{"type": "word"}"#).unwrap();
        assert_eq!(term, SearchTerm::word(""));

        let term: SearchTerm = serde_json::from_str(r#"{"type": "line"}"#).unwrap();
        assert_eq!(term, SearchTerm::Line { sub: None });
    }

    #[test]
    fn test_request_defaults() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"terms": [{"type": "word", "value": "a"}]}"#).unwrap();
        assert_eq!(req.limit, 100);
        assert_eq!(req.offset, 0);
        assert!(!req.case_sensitive);
        assert!(req.restrict_paths.is_none());

        let req: SearchRequest = serde_json::from_str(
            r#"{"terms": [], "caseSensitive": true, "restrict_paths": ["a.md"], "limit": 5}"#,
        )
        .unwrap();
        assert!(req.case_sensitive);
        assert_eq!(req.restrict_paths, Some(vec!["a.md".to_string()]));
        assert_eq!(req.limit, 5);
    }

    #[test]
    fn test_validate_limits() {
        let req = SearchRequest::new(vec![]);
        assert!(req.validate(1000).is_ok());
        assert!(req.clone().with_limit(0).validate(1000).is_err());
        assert!(req.clone().with_limit(1001).validate(1000).is_err());
        assert!(req.clone().with_limit(1000).validate(1000).is_ok());
        assert!(req.with_limit(200).validate(150).is_err());
    }

    #[test]
    fn test_validate_offset() {
        let req = SearchRequest::new(vec![SearchTerm::word("hello")]).with_limit(10);
        assert!(req.clone().with_offset(MAX_OFFSET).validate(1000).is_ok());

        let err = req.clone().with_offset(MAX_OFFSET + 1).validate(1000).unwrap_err();
        assert!(matches!(err, NotesError::InvalidInput(msg) if msg.contains("offset")));
        assert!(req.with_offset(usize::MAX - 5).validate(1000).is_err());
    }
}
