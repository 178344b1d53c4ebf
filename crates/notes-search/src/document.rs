//! Document mapping between [`DocumentRecord`] and Tantivy documents.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tantivy::schema::Value;
use tantivy::{doc, TantivyDocument};
use tracing::warn;

use notes_types::{display_name, index_precision, DocumentRecord};

use crate::markdown;
use crate::schema::SearchSchema;

/// Stored fields of an indexed document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub path: String,
    pub name: String,
    pub tags: Vec<String>,
    pub props: BTreeMap<String, String>,
    pub mtime: Option<DateTime<Utc>>,
    pub size: u64,
}

/// Build a record from raw markdown, deriving name, tags and props.
pub fn record_from_markdown(path: &str, content: &str, mtime: DateTime<Utc>) -> DocumentRecord {
    let meta = markdown::extract(content);
    DocumentRecord::new(path, content)
        .with_tags(meta.tags)
        .with_props(meta.props)
        .with_mtime(mtime)
}

/// Convert a record to a Tantivy document.
///
/// Content is fed to both the stemmed `content` field and the `trigrams`
/// field; tags and props become one value each.
pub fn record_to_doc(schema: &SearchSchema, record: &DocumentRecord) -> TantivyDocument {
    let mtime = tantivy::DateTime::from_timestamp_micros(index_precision(record.mtime).timestamp_micros());

    let mut doc = doc!(
        schema.path => record.path.clone(),
        schema.name => record.name.clone(),
        schema.content => record.content.clone(),
        schema.trigrams => record.content.clone(),
        schema.mtime => mtime,
        schema.size => record.size
    );

    let mut seen = HashSet::new();
    for tag in &record.tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && seen.insert(tag.clone()) {
            doc.add_text(schema.tags, tag);
        }
    }
    for (key, value) in &record.props {
        // Stored as `key=value` and split on the first '='
        if key.contains('=') {
            warn!(path = %record.path, key = %key, "Skipping property whose key contains '='");
            continue;
        }
        doc.add_text(schema.props, format!("{key}={value}"));
    }

    doc
}

/// Read stored fields back.
pub fn doc_to_indexed(schema: &SearchSchema, doc: &TantivyDocument) -> IndexedDocument {
    let path = doc
        .get_first(schema.path)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let name = doc
        .get_first(schema.name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| display_name(&path));

    let tags = doc
        .get_all(schema.tags)
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    // Split on the first '=' so values may contain '=' and ','
    let props = doc
        .get_all(schema.props)
        .filter_map(|v| v.as_str())
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mtime = doc
        .get_first(schema.mtime)
        .and_then(|v| v.as_datetime())
        .and_then(|dt| DateTime::from_timestamp_micros(dt.into_timestamp_micros()));

    let size = doc
        .get_first(schema.size)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    IndexedDocument {
        path,
        name,
        tags,
        props,
        mtime,
        size,
    }
}

/// Tag as stored and queried: no leading `#`, lowercase.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}
