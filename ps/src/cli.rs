//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// promptstore - prompt template registry and resolver
#[derive(Parser)]
#[command(name = "pst", about = "Manage, validate, and fill prompt templates", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load templates from a directory and report the outcome
    Load {
        /// Directory to scan (defaults to the configured template dir)
        dir: Option<PathBuf>,

        /// Do not descend into subdirectories
        #[arg(long)]
        flat: bool,
    },

    /// List registered templates
    List {
        /// Restrict to a category (includes its subtree)
        #[arg(short = 'C', long)]
        category: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one template in full
    Show {
        /// Template id
        id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate definition files without registering them
    Validate {
        /// Files or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Fill a template and print the result
    Fill {
        /// Template id
        id: String,

        /// Parameter values as name=value pairs; values may be JSON
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Response language for the fill context
        #[arg(long)]
        language: Option<String>,

        /// Audience for the fill context
        #[arg(long)]
        audience: Option<String>,

        /// Parse the output as JSON and pretty-print it
        #[arg(long)]
        structured: bool,
    },

    /// List the category tree
    Categories,

    /// Suggest templates for keywords
    Suggest {
        /// Keywords describing the task
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Restrict to a category subtree
        #[arg(short = 'C', long)]
        category: Option<String>,

        /// Maximum suggestions to print
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },

    /// Export templates to a bundle file
    Export {
        /// Bundle path (.yml, .yaml, or .json)
        output: PathBuf,

        /// Template ids to export (everything when omitted)
        ids: Vec<String>,

        /// Also pull in each template's dependency closure
        #[arg(long)]
        with_deps: bool,
    },

    /// Import templates from a bundle file
    Import {
        /// Bundle path (.yml, .yaml, or .json)
        input: PathBuf,

        /// Conflict policy: reject, overwrite, or rename
        #[arg(long, default_value = "reject")]
        on_conflict: ConflictArg,
    },

    /// Remove a template
    Remove {
        /// Template id
        id: String,

        /// Remove even if other templates depend on it
        #[arg(long)]
        force: bool,
    },
}

/// Output format for list and show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Conflict policy argument for `import`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictArg {
    #[default]
    Reject,
    Overwrite,
    Rename,
}

impl std::str::FromStr for ConflictArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            "rename" => Ok(Self::Rename),
            _ => Err(format!("Unknown policy: {}. Use: reject, overwrite, or rename", s)),
        }
    }
}

impl From<ConflictArg> for crate::exchange::ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Reject => Self::Reject,
            ConflictArg::Overwrite => Self::Overwrite,
            ConflictArg::Rename => Self::Rename,
        }
    }
}

/// Parse a `name=value` pair; the value is JSON when it parses as JSON,
/// otherwise a plain string
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("Empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
