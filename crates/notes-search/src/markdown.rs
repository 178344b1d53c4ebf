//! Markdown metadata extraction.
//!
//! [`extract`] never fails. A part that cannot be parsed (in practice only
//! the YAML frontmatter) comes back empty and a warning is logged.
//!
//! Fenced code blocks never contribute metadata. Inline code spans hide
//! tags, links and block ids but stay part of heading and task text.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_yaml::Value as YamlValue;
use tracing::warn;

use notes_types::{Heading, NoteMetadata, Task};

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static pattern compiles")
}

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(?:\r?\n|\z)"));
static TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"#([A-Za-z0-9_/\-]+)"));
static WIKILINK: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[\[([^\]|]+)(?:\|[^\]]+)?\]\]"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?m)^(#{1,6})[ \t]+(.+?)[ \t]*\r?$"));
static TASK: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?m)^[ \t]*[-*][ \t]+\[([ xX])\][ \t]+(.+?)[ \t]*\r?$"));
static BLOCK_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?m)\^([A-Za-z0-9\-]+)[ \t]*\r?$"));
static FENCE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^ {0,3}(`{3,}|~{3,})"));

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| pattern(r"\*{1,2}([^*]+)\*{1,2}"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| pattern(r"`([^`]+)`"));
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[([^\]]+)\]\([^)]+\)"));

/// Extract tags, frontmatter props, headings, wikilinks, tasks and block ids.
pub fn extract(content: &str) -> NoteMetadata {
    let (yaml, body_start) = split_frontmatter(content);
    let lines = LineIndex::new(content);
    let prose = blank_fences(&content[body_start..]);
    let text = blank_inline_code(&prose);

    NoteMetadata {
        tags: tags_in(&text),
        props: yaml.map(parse_props).unwrap_or_default(),
        headings: extract_headings(&prose, body_start, &lines),
        links: extract_links(&text),
        tasks: extract_tasks(&prose, body_start, &lines),
        blocks: extract_blocks(&text),
    }
}

/// Replace every byte but newlines with a space, keeping offsets valid.
fn blank(text: &str) -> String {
    text.bytes()
        .map(|b| if b == b'\n' { '\n' } else { ' ' })
        .collect()
}

/// `body` with fenced code blocks, fence lines included, blanked out. An
/// unclosed fence runs to the end of the body.
fn blank_fences(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut open: Option<&str> = None;

    for line in body.split_inclusive('\n') {
        let fence = FENCE.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str());
        let in_code = match (open, fence) {
            (None, Some(marker)) => {
                open = Some(marker);
                true
            }
            (Some(opening), Some(marker))
                if marker.as_bytes()[0] == opening.as_bytes()[0] && marker.len() >= opening.len() =>
            {
                open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        };

        if in_code {
            out.push_str(&blank(line));
        } else {
            out.push_str(line);
        }
    }
    out
}

fn blank_inline_code(text: &str) -> String {
    INLINE_CODE
        .replace_all(text, |caps: &regex::Captures<'_>| blank(&caps[0]))
        .into_owned()
}

/// Returns the raw YAML between the delimiters (if any) and the byte offset
/// where the body starts.
fn split_frontmatter(content: &str) -> (Option<&str>, usize) {
    match FRONTMATTER.captures(content) {
        Some(caps) => {
            let yaml = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (Some(yaml), end)
        }
        None => (None, 0),
    }
}

/// Hashtags outside code, lowercased, first occurrence wins.
pub fn extract_tags(body: &str) -> Vec<String> {
    tags_in(&blank_inline_code(&blank_fences(body)))
}

fn tags_in(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    TAG.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn parse_props(yaml: &str) -> BTreeMap<String, String> {
    if yaml.trim().is_empty() {
        return BTreeMap::new();
    }

    let value: YamlValue = match serde_yaml::from_str(yaml) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to parse frontmatter YAML");
            return BTreeMap::new();
        }
    };

    let YamlValue::Mapping(mapping) = value else {
        return BTreeMap::new();
    };

    mapping
        .into_iter()
        .filter_map(|(key, value)| Some((scalar_text(key)?, prop_text(value)?)))
        .collect()
}

fn scalar_text(value: YamlValue) -> Option<String> {
    match value {
        YamlValue::Null => None,
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::String(s) => Some(normalize_datetime(&s).unwrap_or(s)),
        YamlValue::Tagged(tagged) => scalar_text(tagged.value),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => None,
    }
}

/// Scalars as text, sequences of scalars joined with `, `, nulls and nested
/// mappings dropped.
fn prop_text(value: YamlValue) -> Option<String> {
    match value {
        YamlValue::Sequence(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(scalar_text).collect();
            Some(parts.join(", "))
        }
        YamlValue::Tagged(tagged) => prop_text(tagged.value),
        other => scalar_text(other),
    }
}

/// Render date-like strings in ISO-8601; `None` when `s` is not a date.
fn normalize_datetime(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() < 10 || !s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string());
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
    }
    None
}

fn extract_headings(body: &str, offset: usize, lines: &LineIndex) -> Vec<Heading> {
    HEADING
        .captures_iter(body)
        .filter_map(|caps| {
            let marks = caps.get(1)?;
            let text = caps.get(2)?;
            Some(Heading {
                level: marks.as_str().len() as u8,
                text: strip_inline_markup(text.as_str()),
                line: lines.line_of(offset + marks.start()),
            })
        })
        .collect()
}

fn strip_inline_markup(text: &str) -> String {
    let text = EMPHASIS.replace_all(text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = INLINE_LINK.replace_all(&text, "$1");
    text.trim().to_string()
}

fn extract_links(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WIKILINK
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let target = m.as_str().trim();
            if target.ends_with(".md") {
                target.to_string()
            } else {
                format!("{target}.md")
            }
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

fn extract_tasks(body: &str, offset: usize, lines: &LineIndex) -> Vec<Task> {
    TASK.captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let mark = caps.get(1)?;
            let text = caps.get(2)?;
            Some(Task {
                done: mark.as_str().eq_ignore_ascii_case("x"),
                text: text.as_str().to_string(),
                line: lines.line_of(offset + whole.start()),
            })
        })
        .collect()
}

fn extract_blocks(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    BLOCK_ID
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Byte offset to 1-based line number lookup.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self {
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tags_are_case_folded() {
        let meta = extract("# Title\nHello #world and #World");
        assert_eq!(meta.tags, vec!["world"]);
    }

    #[test]
    fn test_tags_keep_first_seen_order() {
        let meta = extract("#beta then #alpha/nested and #Beta again #x-y_z");
        assert_eq!(meta.tags, vec!["beta", "alpha/nested", "x-y_z"]);
    }

    #[test]
    fn test_tags_in_frontmatter_are_ignored() {
        let content = "---\ntitle: \"#notatag\"\ntags: [a]\n---\nBody #real\n";
        let meta = extract(content);
        assert_eq!(meta.tags, vec!["real"]);
        assert_eq!(meta.props["title"], "#notatag");
        assert_eq!(meta.props["tags"], "a");
    }

    #[test]
    fn test_frontmatter_scalars() {
        let content = "---\nstatus: draft\ncount: 3\npublished: true\nempty: null\naliases:\n  - one\n  - two\nnested:\n  a: 1\n---\ntext";
        let meta = extract(content);
        assert_eq!(meta.props["status"], "draft");
        assert_eq!(meta.props["count"], "3");
        assert_eq!(meta.props["published"], "true");
        assert_eq!(meta.props["aliases"], "one, two");
        assert!(!meta.props.contains_key("empty"));
        assert!(!meta.props.contains_key("nested"));
    }

    #[test]
    fn test_frontmatter_dates_normalized() {
        let content = "---\ncreated: 2024-01-15 10:30:00\nday: 2024-02-01\nzoned: 2024-03-01T08:00:00.5+02:00\n---\n";
        let meta = extract(content);
        assert_eq!(meta.props["created"], "2024-01-15T10:30:00");
        assert_eq!(meta.props["day"], "2024-02-01");
        assert_eq!(meta.props["zoned"], "2024-03-01T08:00:00.500+02:00");
    }

    #[test]
    fn test_malformed_frontmatter_degrades() {
        let content = "---\nkey: [unclosed\n---\n## Still parsed\n#tag";
        let meta = extract(content);
        assert!(meta.props.is_empty());
        assert_eq!(meta.tags, vec!["tag"]);
        assert_eq!(meta.headings.len(), 1);
        assert_eq!(meta.headings[0].line, 4);
    }

    #[test]
    fn test_non_mapping_frontmatter() {
        let meta = extract("---\n- a\n- b\n---\nbody");
        assert!(meta.props.is_empty());

        let meta = extract("---\njust text\n---\nbody");
        assert!(meta.props.is_empty());
    }

    #[test]
    fn test_empty_frontmatter_block() {
        let meta = extract("---\n---\n# Heading\n");
        assert!(meta.props.is_empty());
        assert_eq!(meta.headings[0].line, 3);
    }

    #[test]
    fn test_unterminated_frontmatter_is_body() {
        let meta = extract("---\ntitle: x\n# Heading #tag\n");
        assert!(meta.props.is_empty());
        assert_eq!(meta.tags, vec!["tag"]);
    }

    #[test]
    fn test_headings() {
        let content = "# Top\n\ntext\n### **Bold** and `code` with [link](http://x.y)\n####### not a heading\n#nospace";
        let meta = extract(content);
        assert_eq!(
            meta.headings,
            vec![
                Heading {
                    level: 1,
                    text: "Top".into(),
                    line: 1
                },
                Heading {
                    level: 3,
                    text: "Bold and code with link".into(),
                    line: 4
                },
            ]
        );
    }

    #[test]
    fn test_crlf_headings() {
        let meta = extract("# One\r\n## Two  \r\n");
        assert_eq!(meta.headings[0].text, "One");
        assert_eq!(meta.headings[1].text, "Two");
        assert_eq!(meta.headings[1].line, 2);
    }

    #[test]
    fn test_wikilinks() {
        let meta = extract("See [[Other Note]] and [[folder/page.md|alias]] and [[Other Note|again]]");
        assert_eq!(meta.links, vec!["Other Note.md", "folder/page.md"]);
    }

    #[test]
    fn test_tasks() {
        let content = "intro\n- [ ] open item\n  * [x] done item\n- [X] shouted\n-[ ] malformed\n";
        let meta = extract(content);
        assert_eq!(meta.tasks.len(), 3);
        assert_eq!(
            meta.tasks[0],
            Task {
                done: false,
                text: "open item".into(),
                line: 2
            }
        );
        assert!(meta.tasks[1].done);
        assert_eq!(meta.tasks[1].line, 3);
        assert!(meta.tasks[2].done);
    }

    #[test]
    fn test_block_ids() {
        let content = "para one ^abc-1\npara two ^abc-1\nmid ^notend text\nthree ^xyz  \n";
        let meta = extract(content);
        assert_eq!(meta.blocks, vec!["abc-1", "xyz"]);
    }

    #[test]
    fn test_code_does_not_produce_metadata() {
        let content = "Intro #real\n```c\n#include <stdio.h>\n# not a heading\n- [ ] not a task\n[[NotALink]]\n```\nUse `#define` and `[[Fake]]` here ^ok\n~~~\n#tilde\n~~~\n## After `code`\n- [ ] run `make #all`\n";
        let meta = extract(content);

        assert_eq!(meta.tags, vec!["real"]);
        assert!(meta.links.is_empty());
        assert_eq!(meta.blocks, vec!["ok"]);
        assert_eq!(
            meta.headings,
            vec![Heading {
                level: 2,
                text: "After code".into(),
                line: 12
            }]
        );
        assert_eq!(meta.tasks.len(), 1);
        assert_eq!(meta.tasks[0].text, "run `make #all`");
        assert_eq!(meta.tasks[0].line, 13);
    }

    #[test]
    fn test_fence_needs_matching_marker_to_close() {
        let content = "````\n```\n#inside\n````\n#outside\n```\nnever closed #lost\n";
        assert_eq!(extract(content).tags, vec!["outside"]);
        assert_eq!(extract_tags("see `#code` and #tag"), vec!["tag"]);
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a\nb\n\nc");
        assert_eq!(lines.line_of(0), 1);
        assert_eq!(lines.line_of(2), 2);
        assert_eq!(lines.line_of(4), 3);
        assert_eq!(lines.line_of(5), 4);
    }

    proptest! {
        #[test]
        fn prop_extract_never_panics(content in "\\PC{0,400}") {
            let _ = extract(&content);
        }

        #[test]
        fn prop_tags_are_unique_and_lowercase(words in prop::collection::vec("[A-Za-z]{1,6}", 0..20)) {
            let content: String = words.iter().map(|w| format!("#{w} ")).collect();
            let tags = extract(&content).tags;
            let unique: HashSet<_> = tags.iter().collect();
            prop_assert_eq!(unique.len(), tags.len());
            prop_assert!(tags.iter().all(|t| t.chars().all(|c| !c.is_uppercase())));
        }
    }
}
