//! Document records and the metadata extracted from markdown.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A markdown heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1..=6, the number of leading `#`
    pub level: u8,
    /// Heading text with inline markup removed
    pub text: String,
    /// 1-based line number
    pub line: usize,
}

/// A checkbox list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub done: bool,
    pub text: String,
    /// 1-based line number
    pub line: usize,
}

/// Everything the extractor pulls out of a markdown document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    /// Lowercase, deduplicated, first-seen order
    pub tags: Vec<String>,
    /// Frontmatter scalars rendered as text
    pub props: BTreeMap<String, String>,
    pub headings: Vec<Heading>,
    /// Wikilink targets, always ending in `.md`
    pub links: Vec<String>,
    pub tasks: Vec<Task>,
    /// Block ids without the leading `^`
    pub blocks: Vec<String>,
}

/// One indexed unit, keyed by `path`.
///
/// `content` is indexed but never stored; it is carried here only so the
/// indexer can analyze it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    pub name: String,
    pub tags: Vec<String>,
    pub props: BTreeMap<String, String>,
    pub content: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

impl DocumentRecord {
    /// Create a record with a derived name, the current time as mtime, and
    /// no tags or props.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            name: display_name(&path),
            size: content.len() as u64,
            path,
            tags: Vec::new(),
            props: BTreeMap::new(),
            content,
            mtime: index_precision(Utc::now()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_props(mut self, props: BTreeMap<String, String>) -> Self {
        self.props = props;
        self
    }

    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = index_precision(mtime);
        self
    }
}

/// Last path segment, used as the display name.
pub fn display_name(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Truncate a timestamp to the microsecond precision the index stores.
///
/// Every mtime that is written or compared goes through here so a value read
/// back from the index compares equal to the one that was written.
pub fn index_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
