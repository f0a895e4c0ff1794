//! Command-line surface, grounded on `paketkoll`'s `cli.rs` split of a
//! `clap::Parser` struct plus its `ValueEnum`s into their own module.
//!
//! Flag spelling follows clap's idiomatic double-dash long-option
//! convention rather than `original_source/cmd/gomtree/main.go`'s
//! single-dash Go `flag`-package style; names and behaviour are otherwise
//! unchanged (see DESIGN.md).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "rmtree", version, about, long_about = None)]
pub struct Cli {
    /// Create a manifest from `--path` (or `--tar`) instead of validating
    /// against `--file`.
    #[arg(short = 'c', long = "create")]
    pub create: bool,

    /// Spec manifest to validate against.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub spec_file: Option<PathBuf>,

    /// Root directory to walk (default `.`).
    #[arg(short = 'p', long = "path", default_value = ".")]
    pub root: PathBuf,

    /// Replace the default keyword set (comma- or space-separated).
    #[arg(short = 'k', long = "keywords", value_name = "LIST")]
    pub keywords: Option<String>,

    /// Add keywords to the active set (comma- or space-separated).
    #[arg(short = 'K', long = "add-keywords", value_name = "LIST")]
    pub add_keywords: Option<String>,

    /// Read a tar archive instead of walking a filesystem tree (`-` for
    /// stdin).
    #[arg(short = 'T', long = "tar", value_name = "PATH")]
    pub tar: Option<String>,

    /// Restrict the active keyword set to BSD-compatible keywords.
    #[arg(long = "bsd-keywords")]
    pub bsd_keywords: bool,

    /// Print every registered keyword and exit.
    #[arg(long = "list-keywords")]
    pub list_keywords: bool,

    /// Print the sorted keyword union used by a parsed manifest and exit.
    #[arg(long = "list-used", value_name = "PATH")]
    pub list_used: Option<PathBuf>,

    /// Result rendering format.
    #[arg(long = "result-format", value_enum, default_value_t = ResultFormat::Bsd)]
    pub result_format: ResultFormat,

    /// Raise log verbosity (equivalent to `DEBUG=1`).
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResultFormat {
    /// One BSD-`mtree`-style line per discrepancy.
    Bsd,
    /// The full [`mtree_check::CheckResult`] as JSON.
    Json,
    /// Just the affected path, one per line.
    Path,
}

impl std::fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultFormat::Bsd => write!(f, "bsd"),
            ResultFormat::Json => write!(f, "json"),
            ResultFormat::Path => write!(f, "path"),
        }
    }
}
