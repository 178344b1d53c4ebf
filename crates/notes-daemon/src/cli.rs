//! CLI argument parsing for the notes search daemon.
//!
//! Global flags override every other configuration source.

use clap::{Args, Parser, Subcommand};

use notes_types::{SearchRequest, SearchTerm};

/// Full-text search over markdown note vaults
#[derive(Parser, Debug)]
#[command(name = "notes-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/notes-search/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the index directory
    #[arg(long, global = true)]
    pub index_dir: Option<String>,

    /// Override the vaults root directory
    #[arg(long, global = true)]
    pub vaults_root: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduled reindex until Ctrl+C
    Serve {
        /// Reindex every vault at startup even if the index has documents
        #[arg(long)]
        reindex_on_startup: bool,
    },

    /// Search the index
    Search(SearchArgs),

    /// Index one note, e.g. `user_1/notes/todo.md`
    Index {
        /// Vault-relative path
        path: String,
    },

    /// Remove one note from the index
    Remove {
        /// Vault-relative path
        path: String,
    },

    /// Move an indexed note to a new path, reading content from the new path
    Rename { old_path: String, new_path: String },

    /// Incrementally reindex every vault
    Reindex,

    /// Show index statistics as JSON
    Stats {
        /// Include size on disk and segment count
        #[arg(long)]
        detailed: bool,
    },

    /// Merge index segments
    Optimize,

    /// Delete every document from the index
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Query flags for `search`.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Query words (AND by default; quotes, OR and NOT are understood)
    pub query: Vec<String>,

    /// Treat the query words as one exact phrase
    #[arg(long)]
    pub phrase: bool,

    /// Regular expression matched against note content
    #[arg(long)]
    pub regex: Option<String>,

    /// Regex flags: `i` (case-insensitive), `m` (multi-line)
    #[arg(long, requires = "regex")]
    pub flags: Option<String>,

    /// Require the text terms to match within a single line
    #[arg(long)]
    pub line: bool,

    /// Tag the note must carry (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Only consider these paths (repeatable)
    #[arg(long = "path")]
    pub paths: Vec<String>,

    /// Page size (default from config)
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Make regex terms case-sensitive
    #[arg(long)]
    pub case_sensitive: bool,

    /// Print the raw response as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    /// Build the request; `default_limit` applies when `--limit` is absent.
    pub fn to_request(&self, default_limit: usize) -> SearchRequest {
        let mut terms = Vec::new();

        let text = self.query.join(" ");
        if !text.trim().is_empty() {
            let term = if self.phrase {
                SearchTerm::phrase(text)
            } else {
                SearchTerm::word(text)
            };
            terms.push(self.scoped(term));
        }
        if let Some(pattern) = &self.regex {
            terms.push(self.scoped(SearchTerm::regex(pattern.clone(), self.flags.as_deref())));
        }
        terms.extend(self.tags.iter().map(SearchTerm::tag));

        let mut request = SearchRequest::new(terms)
            .with_limit(self.limit.unwrap_or(default_limit))
            .with_offset(self.offset)
            .with_case_sensitive(self.case_sensitive);
        if !self.paths.is_empty() {
            request = request.restrict_to(self.paths.iter());
        }
        request
    }

    fn scoped(&self, term: SearchTerm) -> SearchTerm {
        if self.line {
            SearchTerm::line(term)
        } else {
            term
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_args(argv: &[&str]) -> SearchArgs {
        let mut full = vec!["notes-daemon", "search"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Search(args) => args,
            other => panic!("Expected Search command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_serve() {
        let cli = Cli::parse_from(["notes-daemon", "serve", "--reindex-on-startup"]);
        match cli.command {
            Commands::Serve { reindex_on_startup } => assert!(reindex_on_startup),
            other => panic!("Expected Serve command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_overrides() {
        let cli = Cli::parse_from([
            "notes-daemon",
            "reindex",
            "--config",
            "/etc/notes.toml",
            "--log-level",
            "debug",
            "--index-dir",
            "/var/lib/notes/index",
            "--vaults-root",
            "/srv/vaults",
        ]);
        assert!(matches!(cli.command, Commands::Reindex));
        assert_eq!(cli.config.as_deref(), Some("/etc/notes.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.index_dir.as_deref(), Some("/var/lib/notes/index"));
        assert_eq!(cli.vaults_root.as_deref(), Some("/srv/vaults"));
    }

    #[test]
    fn test_cli_rename_and_stats() {
        let cli = Cli::parse_from(["notes-daemon", "rename", "user_1/a.md", "user_1/b.md"]);
        match cli.command {
            Commands::Rename { old_path, new_path } => {
                assert_eq!(old_path, "user_1/a.md");
                assert_eq!(new_path, "user_1/b.md");
            }
            other => panic!("Expected Rename command, got {other:?}"),
        }

        let cli = Cli::parse_from(["notes-daemon", "stats", "--detailed"]);
        assert!(matches!(cli.command, Commands::Stats { detailed: true }));
    }

    #[test]
    fn test_cli_clear_requires_flag_value() {
        let cli = Cli::parse_from(["notes-daemon", "clear"]);
        assert!(matches!(cli.command, Commands::Clear { yes: false }));
    }

    #[test]
    fn test_flags_require_regex() {
        let result = Cli::try_parse_from(["notes-daemon", "search", "x", "--flags", "i"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_search_words_become_one_word_term() {
        let request = search_args(&["quick", "brown"]).to_request(100);
        assert_eq!(request.terms, vec![SearchTerm::word("quick brown")]);
        assert_eq!(request.limit, 100);
        assert_eq!(request.offset, 0);
        assert!(request.restrict_paths.is_none());
    }

    #[test]
    fn test_search_full_request() {
        let request = search_args(&[
            "hello",
            "world",
            "--phrase",
            "--line",
            "--regex",
            "^fun",
            "--flags",
            "m",
            "--tag",
            "Work",
            "--path",
            "user_1/a.md",
            "--limit",
            "5",
            "--offset",
            "10",
            "--case-sensitive",
        ])
        .to_request(100);

        assert_eq!(
            request.terms,
            vec![
                SearchTerm::line(SearchTerm::phrase("hello world")),
                SearchTerm::line(SearchTerm::regex("^fun", Some("m"))),
                SearchTerm::tag("Work"),
            ]
        );
        assert_eq!(request.limit, 5);
        assert_eq!(request.offset, 10);
        assert!(request.case_sensitive);
        assert_eq!(request.restrict_paths, Some(vec!["user_1/a.md".to_string()]));
    }

    #[test]
    fn test_search_without_terms() {
        let request = search_args(&["--path", "user_1/a.md"]).to_request(20);
        assert!(request.terms.is_empty());
        assert_eq!(request.limit, 20);
    }
}
