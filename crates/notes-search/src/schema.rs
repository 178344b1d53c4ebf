//! Tantivy schema for markdown notes.
//!
//! | field    | analysis                      | stored |
//! |----------|-------------------------------|--------|
//! | path     | raw, unique key               | yes    |
//! | name     | default tokenizer, boosted    | yes    |
//! | tags     | keyword, one value per tag    | yes    |
//! | props    | keyword, one `key=value` each | yes    |
//! | content  | en_stem with positions        | no     |
//! | trigrams | 3-grams, lowercased           | no     |
//! | mtime    | date, microseconds            | yes    |
//! | size     | u64                           | yes    |

use tantivy::schema::{
    DateOptions, DateTimePrecision, Field, IndexRecordOption, Schema, TextFieldIndexing,
    TextOptions, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, RawTokenizer, TextAnalyzer};
use tantivy::Index;

use crate::SearchError;

/// Analyzer for `tags` and `props`: whole value, lowercased.
pub const KEYWORD_TOKENIZER: &str = "keyword";

/// Analyzer for `trigrams`.
pub const TRIGRAM_TOKENIZER: &str = "trigram";

/// Built-in English stemming analyzer used for `content`.
pub const CONTENT_TOKENIZER: &str = "en_stem";

/// Relative weight of `name` matches against `content` matches.
pub const NAME_BOOST: f32 = 2.0;

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct SearchSchema {
    schema: Schema,
    pub path: Field,
    pub name: Field,
    pub tags: Field,
    pub props: Field,
    pub content: Field,
    pub trigrams: Field,
    pub mtime: Field,
    pub size: Field,
}

impl SearchSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a SearchSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {name} field")))
        };

        Ok(Self {
            path: field("path")?,
            name: field("name")?,
            tags: field("tags")?,
            props: field("props")?,
            content: field("content")?,
            trigrams: field("trigrams")?,
            mtime: field("mtime")?,
            size: field("size")?,
            schema,
        })
    }
}

fn keyword_options(record: IndexRecordOption) -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(KEYWORD_TOKENIZER)
                .set_index_option(record),
        )
        .set_stored()
}

/// Build the notes schema.
pub fn build_notes_schema() -> SearchSchema {
    let mut schema_builder = Schema::builder();

    let path = schema_builder.add_text_field("path", STRING | STORED);
    let name = schema_builder.add_text_field("name", TEXT | STORED);

    // Multi-valued: one value per tag / per property
    let tags = schema_builder.add_text_field("tags", keyword_options(IndexRecordOption::WithFreqs));
    let props = schema_builder.add_text_field("props", keyword_options(IndexRecordOption::Basic));

    let content = schema_builder.add_text_field(
        "content",
        TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CONTENT_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        ),
    );

    let trigrams = schema_builder.add_text_field(
        "trigrams",
        TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TRIGRAM_TOKENIZER)
                .set_index_option(IndexRecordOption::Basic),
        ),
    );

    let mtime = schema_builder.add_date_field(
        "mtime",
        DateOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast()
            .set_precision(DateTimePrecision::Microseconds),
    );

    let size = schema_builder.add_u64_field("size", INDEXED | STORED | FAST);

    let schema = schema_builder.build();

    SearchSchema {
        schema,
        path,
        name,
        tags,
        props,
        content,
        trigrams,
        mtime,
        size,
    }
}

/// Register the custom analyzers on an index.
///
/// Tokenizers are not persisted with the index, so this must run on every
/// open as well as on create.
pub fn register_tokenizers(index: &Index) -> Result<(), SearchError> {
    let trigram = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false)?)
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TRIGRAM_TOKENIZER, trigram);

    let keyword = TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(KEYWORD_TOKENIZER, keyword);

    Ok(())
}
