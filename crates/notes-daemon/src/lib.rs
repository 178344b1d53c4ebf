//! Notes daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: serve, search and maintenance commands

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, SearchArgs};
pub use commands::{format_response, init_logging, load_settings, open_search};
