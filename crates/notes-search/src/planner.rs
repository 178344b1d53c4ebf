//! Query planning.
//!
//! Compiles a list of [`SearchTerm`]s into one conjunctive Tantivy query plus
//! the content verifiers the index alone cannot decide (regular expressions
//! and single-line constraints).

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use tantivy::query::{
    AllQuery, BooleanQuery, ConstScoreQuery, PhraseQuery, Query, QueryParser, TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::Term;
use tracing::{debug, warn};

use notes_types::SearchTerm;

use crate::document::normalize_tag;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::markdown;
use crate::schema::{SearchSchema, NAME_BOOST};

/// Characters that end a literal regex prefix.
const REGEX_META: &str = ".*+?[]{}()|^$";

/// Minimum literal prefix length for a trigram prefilter.
const TRIGRAM_LEN: usize = 3;

/// ASCII letters whose case-insensitive regex class has a non-ASCII member.
const FOLDS_BEYOND_ASCII: [char; 2] = ['k', 's'];

/// Query-string operators that are not words.
const QUERY_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// Something a single line must satisfy.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    /// Every analyzed token appears in the line
    Words(Vec<String>),
    /// Analyzed tokens appear adjacent and in order
    Phrase(Vec<String>),
    /// The expression matches within the line
    Regex(Regex),
    /// The line carries the tag
    Tag(String),
}

impl LineMatcher {
    fn matches(&self, line: &str, analyzer: &mut TextAnalyzer) -> bool {
        match self {
            LineMatcher::Words(tokens) => {
                let present: HashSet<String> = analyze(analyzer, line).into_iter().collect();
                tokens.iter().all(|token| present.contains(token))
            }
            LineMatcher::Phrase(tokens) => analyze(analyzer, line)
                .windows(tokens.len())
                .any(|window| window == tokens.as_slice()),
            LineMatcher::Regex(re) => re.is_match(line),
            LineMatcher::Tag(tag) => markdown::extract_tags(line).contains(tag),
        }
    }
}

/// Check applied to a candidate's content after the index query.
#[derive(Debug, Clone)]
pub enum Verifier {
    /// Regex over the whole content
    Content(Regex),
    /// Some single line satisfies the matcher
    Line(LineMatcher),
}

/// A compiled search.
pub struct QueryPlan {
    /// Conjunction of all index clauses; `AllQuery` when there are none
    pub query: Box<dyn Query>,
    /// Content checks every hit must also pass
    pub verifiers: Vec<Verifier>,
    /// Terms that contributed nothing (unknown, empty or invalid)
    pub skipped: usize,
    analyzer: TextAnalyzer,
}

impl QueryPlan {
    /// Whether hits must be checked against document content.
    pub fn needs_content(&self) -> bool {
        !self.verifiers.is_empty()
    }

    /// Run every verifier against `content`.
    pub fn verify(&self, content: &str) -> bool {
        let mut analyzer = self.analyzer.clone();
        self.verifiers.iter().all(|verifier| match verifier {
            Verifier::Content(re) => re.is_match(content),
            Verifier::Line(matcher) => content
                .lines()
                .any(|line| matcher.matches(line, &mut analyzer)),
        })
    }
}

/// A term compiled to its index clause and the matcher used when it is
/// scoped to a single line.
struct CompiledTerm {
    clause: Option<Box<dyn Query>>,
    matcher: LineMatcher,
}

/// Builds [`QueryPlan`]s against one index.
#[derive(Clone)]
pub struct QueryPlanner {
    schema: SearchSchema,
    parser: QueryParser,
    analyzer: TextAnalyzer,
    trigram_prefilter: bool,
}

impl QueryPlanner {
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let schema = index.schema().clone();

        let mut parser = QueryParser::for_index(index.index(), vec![schema.content, schema.name]);
        parser.set_conjunction_by_default();
        parser.set_field_boost(schema.name, NAME_BOOST);

        let analyzer = index.index().tokenizer_for_field(schema.content)?;

        Ok(Self {
            schema,
            parser,
            analyzer,
            trigram_prefilter: true,
        })
    }

    /// Enable or disable the trigram prefilter for regex terms.
    pub fn with_trigram_prefilter(mut self, enabled: bool) -> Self {
        self.trigram_prefilter = enabled;
        self
    }

    /// Compile `terms` into a single conjunctive plan.
    ///
    /// Never fails: a term that cannot be compiled is logged and skipped.
    pub fn build(&self, terms: &[SearchTerm], case_sensitive: bool) -> QueryPlan {
        let mut clauses: Vec<Box<dyn Query>> = Vec::new();
        let mut verifiers = Vec::new();
        let mut skipped = 0;

        for term in terms {
            let planned = match term {
                SearchTerm::Line { sub: Some(sub) } => self
                    .compile(innermost(sub), case_sensitive)
                    .map(|c| (c.clause, Some(Verifier::Line(c.matcher)))),
                SearchTerm::Line { sub: None } => None,
                other => self.compile(other, case_sensitive).map(|c| {
                    let verifier = match c.matcher {
                        LineMatcher::Regex(re) => Some(Verifier::Content(re)),
                        _ => None,
                    };
                    (c.clause, verifier)
                }),
            };

            match planned {
                Some((clause, verifier)) => {
                    clauses.extend(clause);
                    verifiers.extend(verifier);
                }
                None => {
                    debug!(kind = term.kind(), "Term contributes no clause");
                    skipped += 1;
                }
            }
        }

        let query: Box<dyn Query> = match clauses.len() {
            0 => Box::new(AllQuery),
            1 => clauses.swap_remove(0),
            _ => Box::new(BooleanQuery::intersection(clauses)),
        };

        QueryPlan {
            query,
            verifiers,
            skipped,
            analyzer: self.analyzer.clone(),
        }
    }

    fn compile(&self, term: &SearchTerm, case_sensitive: bool) -> Option<CompiledTerm> {
        match term {
            SearchTerm::Word { value } => self.compile_word(value),
            SearchTerm::Phrase { value } => self.compile_phrase(value),
            SearchTerm::Regex { value, flags } => {
                self.compile_regex(value, flags.as_deref().unwrap_or(""), case_sensitive)
            }
            SearchTerm::Tag { value } => self.compile_tag(value),
            SearchTerm::Line { .. } | SearchTerm::Unknown => None,
        }
    }

    fn compile_word(&self, value: &str) -> Option<CompiledTerm> {
        if value.trim().is_empty() {
            return None;
        }

        let clause = match self.parser.parse_query(value) {
            Ok(query) => query,
            Err(e) => {
                warn!(query = value, error = %e, "Unparseable word query, parsing leniently");
                let (query, _errors) = self.parser.parse_query_lenient(value);
                query
            }
        };

        let words: Vec<&str> = value
            .split_whitespace()
            .filter(|w| !QUERY_OPERATORS.contains(w))
            .collect();
        let tokens = analyze(&mut self.analyzer.clone(), &words.join(" "));

        Some(CompiledTerm {
            clause: Some(clause),
            matcher: LineMatcher::Words(tokens),
        })
    }

    fn compile_phrase(&self, value: &str) -> Option<CompiledTerm> {
        let tokens = analyze(&mut self.analyzer.clone(), value);

        let clause: Box<dyn Query> = match tokens.as_slice() {
            [] => return None,
            [single] => Box::new(TermQuery::new(
                Term::from_field_text(self.schema.content, single),
                IndexRecordOption::WithFreqs,
            )),
            _ => Box::new(PhraseQuery::new(
                tokens
                    .iter()
                    .map(|t| Term::from_field_text(self.schema.content, t))
                    .collect(),
            )),
        };

        Some(CompiledTerm {
            clause: Some(clause),
            matcher: LineMatcher::Phrase(tokens),
        })
    }

    fn compile_regex(&self, pattern: &str, flags: &str, case_sensitive: bool) -> Option<CompiledTerm> {
        if pattern.is_empty() {
            return None;
        }

        let re_case_insensitive = flags.contains('i') || !case_sensitive;
        let re = match RegexBuilder::new(pattern)
            .case_insensitive(re_case_insensitive)
            .multi_line(flags.contains('m'))
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                warn!(pattern, error = %e, "Invalid regex, term dropped");
                return None;
            }
        };

        let clause = if self.trigram_prefilter {
            prefilter_trigram(pattern, re_case_insensitive).map(|gram| {
                debug!(pattern, trigram = %gram, "Adding trigram prefilter");
                let term = TermQuery::new(
                    Term::from_field_text(self.schema.trigrams, &gram),
                    IndexRecordOption::Basic,
                );
                // Zero score so the prefilter never changes ranking
                Box::new(ConstScoreQuery::new(Box::new(term), 0.0)) as Box<dyn Query>
            })
        } else {
            None
        };

        Some(CompiledTerm {
            clause,
            matcher: LineMatcher::Regex(re),
        })
    }

    fn compile_tag(&self, value: &str) -> Option<CompiledTerm> {
        let tag = normalize_tag(value);
        if tag.is_empty() {
            return None;
        }

        let clause = TermQuery::new(
            Term::from_field_text(self.schema.tags, &tag),
            IndexRecordOption::WithFreqs,
        );

        Some(CompiledTerm {
            clause: Some(Box::new(clause)),
            matcher: LineMatcher::Tag(tag),
        })
    }
}

/// A line of a line is still a line.
fn innermost(term: &SearchTerm) -> &SearchTerm {
    match term {
        SearchTerm::Line { sub: Some(sub) } => innermost(sub),
        other => other,
    }
}

fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut stream = analyzer.token_stream(text);
    stream.process(&mut |token| tokens.push(token.text.clone()));
    tokens
}

/// Literal characters every match of `pattern` must start with.
///
/// A leading `^` anchor is skipped. Scanning stops at the first
/// metacharacter, at an escaped letter or digit (`\d`, `\b`, ...), or before
/// a literal that a `?`, `*` or `{` quantifier makes optional. Patterns with
/// alternation have no usable prefix.
pub fn extract_regex_prefix(pattern: &str) -> String {
    if pattern.contains('|') {
        return String::new();
    }

    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let mut prefix = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        let literal = match c {
            '\\' => match chars.next() {
                Some(escaped) if !escaped.is_alphanumeric() => escaped,
                _ => break,
            },
            c if REGEX_META.contains(c) => break,
            c => c,
        };

        if matches!(chars.peek(), Some('?' | '*' | '{')) {
            break;
        }
        prefix.push(literal);
    }

    prefix
}

/// The lowercased trigram to prefilter on: the first ASCII window of the
/// literal prefix that the trigram analyzer indexes the same way the regex
/// matches it.
///
/// Case-insensitive regexes fold `s` with `ſ` (U+017F) and `k` with `K`
/// (U+212A), which the analyzer does not lowercase to ASCII, so under
/// `case_insensitive` windows holding either letter are passed over.
pub fn prefilter_trigram(pattern: &str, case_insensitive: bool) -> Option<String> {
    let prefix: Vec<char> = extract_regex_prefix(pattern).chars().collect();

    prefix
        .windows(TRIGRAM_LEN)
        .find(|window| window.iter().all(|&c| indexed_as_matched(c, case_insensitive)))
        .map(|window| window.iter().collect::<String>().to_ascii_lowercase())
}

fn indexed_as_matched(c: char, case_insensitive: bool) -> bool {
    c.is_ascii() && !(case_insensitive && FOLDS_BEYOND_ASCII.contains(&c.to_ascii_lowercase()))
}
