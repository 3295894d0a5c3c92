use clap::{Parser, Subcommand};

use crate::models::bug::Priority;
use crate::models::generation::{OptimizeFor, TaskKind};

#[derive(Parser)]
#[command(
    name = "repo-sight",
    version,
    about = "Repository intelligence: pattern-aware analysis, file ranking, bug triage, code and test generation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Never call the model; every enrichment step uses its fallback
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a repository (structure, patterns, dependencies, search index)
    Analyze {
        /// Repository directory
        repository: String,

        /// Ignore any cached analysis
        #[arg(long)]
        refresh: bool,
    },

    /// Rank repository files by relevance to a query
    Rank {
        /// Repository directory
        repository: String,

        /// Free-text query
        query: String,

        /// Maximum number of files (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Triage a bug report
    Bug {
        /// Repository directory
        repository: String,

        /// Bug description
        description: String,

        /// Reproduction step (repeatable)
        #[arg(long = "step")]
        steps: Vec<String>,

        /// low, medium, high or critical
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },

    /// Generate a validated change set from a description
    Generate {
        /// Repository directory
        repository: String,

        /// What to build
        description: String,

        /// Short title (default: first line of the description)
        #[arg(long)]
        title: Option<String>,

        /// feature, enhancement, bug_fix, refactor, component or api
        #[arg(long, default_value = "feature")]
        kind: TaskKind,

        /// Skip exemplar lookup and the auto-fix pass
        #[arg(long)]
        no_follow_patterns: bool,

        /// readability, performance or maintainability
        #[arg(long)]
        optimize_for: Option<OptimizeFor>,

        /// Stream model output to stderr while generating
        #[arg(long)]
        stream: bool,
    },

    /// Generate tests for a change set
    Tests {
        /// Repository directory
        repository: String,

        /// JSON file holding the change set (files_to_create / files_to_modify)
        #[arg(long)]
        implementation: std::path::PathBuf,
    },

    /// Full flow for a requirement with the pull-request quality gate
    Develop {
        /// Repository directory
        repository: String,

        /// Requirement or bug description
        requirement: String,

        /// feature, enhancement, bug_fix, refactor, component or api
        #[arg(long, default_value = "feature")]
        kind: TaskKind,

        /// Also generate tests
        #[arg(long)]
        tests: bool,

        /// Gate threshold in [0, 1] (default: generation.quality_threshold)
        #[arg(long)]
        threshold: Option<f64>,

        /// readability, performance or maintainability
        #[arg(long)]
        optimize_for: Option<OptimizeFor>,
    },

    /// Check configuration, credentials and cache directory
    Doctor,

    /// NDJSON streaming session (stdin → stdout)
    Session,

    /// Start MCP (Model Context Protocol) server over stdio
    Mcp,

    /// Generate default configuration file
    Init {
        /// Path to write the configuration file (default: ~/.config/repo-sight/config.toml)
        #[arg(short, long)]
        path: Option<std::path::PathBuf>,
    },
}
