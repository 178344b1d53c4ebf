//! Search execution using BM25 scoring.
//!
//! Runs a [`QueryPlan`] against a point-in-time searcher, applies the path
//! filter and content verifiers, and paginates by over-fetching.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{DocAddress, IndexReader, Searcher, TantivyDocument, Term};
use tracing::{debug, info, warn};

use notes_types::{DocumentStore, SearchHit, SearchRequest, SearchResponse, MAX_LIMIT};

use crate::document::{doc_to_indexed, IndexedDocument};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::planner::{QueryPlan, QueryPlanner};
use crate::schema::SearchSchema;

/// Executes search requests against the shared reader.
pub struct NoteSearcher {
    reader: IndexReader,
    schema: SearchSchema,
    planner: QueryPlanner,
}

impl NoteSearcher {
    /// Create a new searcher from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        Ok(Self {
            reader: index.reader().clone(),
            schema: index.schema().clone(),
            planner: QueryPlanner::new(index)?,
        })
    }

    /// Enable or disable the regex trigram prefilter.
    pub fn with_trigram_prefilter(mut self, enabled: bool) -> Self {
        self.planner = self.planner.with_trigram_prefilter(enabled);
        self
    }

    /// Number of documents visible to new searchers.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Run a search.
    ///
    /// `store` supplies document content for plans with verifiers; it is not
    /// touched otherwise. `total` counts every match before pagination.
    pub fn search(
        &self,
        request: &SearchRequest,
        store: &dyn DocumentStore,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        request.validate(MAX_LIMIT)?;

        let plan = self.planner.build(&request.terms, request.case_sensitive);
        let query = self.restrict(plan.query.box_clone(), request.restrict_paths.as_deref());

        let searcher = self.reader.searcher();
        let result = if plan.needs_content() {
            self.search_verified(&searcher, query.as_ref(), &plan, request, store)
        } else {
            self.search_ranked(&searcher, query.as_ref(), request)
        };
        let (hits, total) = result.map_err(|e| match e {
            SearchError::Tantivy(inner) => SearchError::SearchFailed(inner.to_string()),
            other => other,
        })?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            terms = request.terms.len(),
            skipped_terms = plan.skipped,
            hits = hits.len(),
            total,
            elapsed_ms,
            "Search complete"
        );

        Ok(SearchResponse {
            hits,
            total,
            elapsed_ms,
        })
    }

    /// AND a zero-score OR-of-paths filter onto `query`.
    fn restrict(&self, query: Box<dyn Query>, paths: Option<&[String]>) -> Box<dyn Query> {
        let paths = match paths {
            Some(paths) if !paths.is_empty() => paths,
            _ => return query,
        };

        let allowed: Vec<Box<dyn Query>> = paths
            .iter()
            .map(|path| {
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.path, path),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>
            })
            .collect();
        let filter = ConstScoreQuery::new(Box::new(BooleanQuery::union(allowed)), 0.0);

        Box::new(BooleanQuery::intersection(vec![query, Box::new(filter)]))
    }

    fn search_ranked(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        request: &SearchRequest,
    ) -> Result<(Vec<SearchHit>, usize), SearchError> {
        // Never ask for more slots than there are documents
        let window = request
            .offset
            .saturating_add(request.limit)
            .min(searcher.num_docs() as usize)
            .max(1);
        let (top_docs, total) = searcher.search(query, &(TopDocs::with_limit(window), Count))?;

        let mut hits = Vec::with_capacity(request.limit);
        for (score, address) in top_docs.into_iter().skip(request.offset) {
            hits.push(SearchHit {
                path: self.path_of(searcher, address)?,
                score,
            });
        }
        Ok((hits, total))
    }

    /// Rank every candidate, keep the ones whose content verifies.
    fn search_verified(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        plan: &QueryPlan,
        request: &SearchRequest,
        store: &dyn DocumentStore,
    ) -> Result<(Vec<SearchHit>, usize), SearchError> {
        let candidates = searcher.search(query, &Count)?;
        if candidates == 0 {
            return Ok((Vec::new(), 0));
        }

        let top_docs = searcher.search(query, &TopDocs::with_limit(candidates))?;
        debug!(candidates, "Verifying candidates against content");

        let mut verified = Vec::new();
        for (score, address) in top_docs {
            let path = self.path_of(searcher, address)?;
            let content = match store.read(&path) {
                Ok(file) => file.content,
                Err(e) => {
                    warn!(path = %path, error = %e, "Cannot read candidate, skipping");
                    continue;
                }
            };
            if plan.verify(&content) {
                verified.push(SearchHit { path, score });
            }
        }

        let total = verified.len();
        let hits = verified
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Ok((hits, total))
    }

    fn path_of(&self, searcher: &Searcher, address: DocAddress) -> Result<String, SearchError> {
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(doc
            .get_first(self.schema.path)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string())
    }

    /// Stored fields of the document at `path`, if indexed.
    pub fn document(&self, path: &str) -> Result<Option<IndexedDocument>, SearchError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.path, path),
            IndexRecordOption::Basic,
        );

        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top_docs.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(Some(doc_to_indexed(&self.schema, &doc)))
            }
            None => Ok(None),
        }
    }

    /// `(path, mtime)` of every indexed document.
    pub fn snapshot(&self) -> Result<HashMap<String, DateTime<Utc>>, SearchError> {
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;

        let mut snapshot = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            let indexed = doc_to_indexed(&self.schema, &doc);
            if let Some(mtime) = indexed.mtime {
                snapshot.insert(indexed.path, mtime);
            }
        }

        debug!(documents = snapshot.len(), "Took index snapshot");
        Ok(snapshot)
    }
}
