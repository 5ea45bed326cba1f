use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Schema-driven XML validation and record extraction
#[derive(Parser, Debug, Clone)]
#[command(name = "schema-stream")]
#[command(about = "Validate XML documents against XSD schemas and stream typed records out of them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report format
    #[arg(long = "format", value_enum, global = true)]
    pub output_format: Option<OutputFormat>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate one document or every document under a directory
    Validate(ValidateArgs),
    /// Validate a document and extract the elements of the requested types
    Parse(ParseArgs),
    /// Print the type-to-tag index of a schema set
    Index(IndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Schema file; repeat to build a schema set
    #[arg(short = 's', long = "schema", required = true, action = clap::ArgAction::Append)]
    pub schemas: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Directory or file to validate
    pub path: PathBuf,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// File extensions to process (comma-separated)
    #[arg(short = 'e', long = "extensions")]
    pub extensions: Option<String>,

    /// Number of files validated at once
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Show progress while validating
    #[arg(long = "progress")]
    pub progress: bool,

    /// Stop starting new files after the first failing one
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Deepest directory level to descend into
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    /// Follow symbolic links while discovering files
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Only count per-item errors instead of listing them
    #[arg(long = "no-error-list")]
    pub no_error_list: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Document to parse
    pub file: PathBuf,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Schema type to extract as records; repeatable
    #[arg(short = 'r', long = "record", required = true, action = clap::ArgAction::Append)]
    pub records: Vec<String>,

    /// Schema type to track as the current header
    #[arg(long = "header")]
    pub header: Option<String>,

    /// Print every extracted record
    #[arg(long = "show-records")]
    pub show_records: bool,

    /// Only count per-item errors instead of listing them
    #[arg(long = "no-error-list")]
    pub no_error_list: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Only show this type
    #[arg(long = "type")]
    pub type_name: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn schema_paths(&self) -> &[PathBuf] {
        match &self.command {
            Command::Validate(args) => &args.schema.schemas,
            Command::Parse(args) => &args.schema.schemas,
            Command::Index(args) => &args.schema.schemas,
        }
    }

    /// Check arguments that clap cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        for schema in self.schema_paths() {
            if !schema.is_file() {
                return Err(format!("Schema file does not exist: {}", schema.display()));
            }
        }
        match &self.command {
            Command::Validate(args) => {
                if !args.path.exists() {
                    return Err(format!("Path does not exist: {}", args.path.display()));
                }
                if args.threads == Some(0) {
                    return Err("Number of threads must be greater than 0".to_string());
                }
            }
            Command::Parse(args) => {
                if !args.file.is_file() {
                    return Err(format!("File does not exist: {}", args.file.display()));
                }
            }
            Command::Index(_) => {}
        }
        Ok(())
    }
}

impl ValidateArgs {
    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}
