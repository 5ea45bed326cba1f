use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Cli, Command, OutputFormat, VerbosityLevel};
use crate::dispatcher::DEFAULT_CONCURRENCY_MULTIPLIER;
use crate::engine::EngineConfig;
use crate::validator::BatchConfig;

const ENV_PREFIX: &str = "SCHEMA_STREAM_";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
    pub files: FileConfig,
}

/// Parse engine tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Concurrent observer invocations per core, per event kind
    pub concurrency_multiplier: usize,
    /// Upper bound on waiting for observers after reading, in milliseconds
    pub drain_timeout_ms: Option<u64>,
    /// List per-item errors in results
    pub report_errors: bool,
}

/// Batch validation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of files validated at once
    pub threads: Option<usize>,
    /// Stop starting new files after the first failing one
    pub fail_fast: bool,
    /// Show progress indicators
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
    /// Errors only
    pub quiet: bool,
}

/// File selection for batch validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub extensions: Vec<String>,
    /// Include patterns (glob syntax)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    pub exclude_patterns: Vec<String>,
    /// Deepest directory level entered below the root (None = unlimited)
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency_multiplier: DEFAULT_CONCURRENCY_MULTIPLIER,
            drain_timeout_ms: None,
            report_errors: true,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            max_depth: None,
            follow_symlinks: false,
        }
    }
}

impl Config {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.output.quiet {
            VerbosityLevel::Quiet
        } else if self.output.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Loads and merges configuration
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::merge_configs(config, Self::load_from_file(config_path).await?);
        } else if let Some(found) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a TOML or JSON file
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Look in the working directory, then in the user configuration directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "schema-stream.toml",
            "schema-stream.json",
            ".schema-stream.toml",
            ".schema-stream.json",
        ];

        let mut search_dirs = vec![PathBuf::new()];
        if let Some(config_dir) = dirs::config_dir() {
            search_dirs.push(config_dir.join("schema-stream"));
        }

        for dir in &search_dirs {
            for name in &config_names {
                let path = dir.join(name);
                if path.is_file() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply `SCHEMA_STREAM_*` overrides from `env`
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(multiplier) = parse_env(env, "CONCURRENCY_MULTIPLIER")? {
            config.engine.concurrency_multiplier = multiplier;
        }
        if let Some(timeout) = parse_env(env, "DRAIN_TIMEOUT_MS")? {
            config.engine.drain_timeout_ms = Some(timeout);
        }
        if let Some(report_errors) = parse_env(env, "REPORT_ERRORS")? {
            config.engine.report_errors = report_errors;
        }

        if let Some(threads) = parse_env(env, "THREADS")? {
            config.validation.threads = Some(threads);
        }
        if let Some(fail_fast) = parse_env(env, "FAIL_FAST")? {
            config.validation.fail_fast = fail_fast;
        }

        if let Some(verbose) = parse_env(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = parse_env(env, "QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get(&format!("{}FORMAT", ENV_PREFIX)) {
            config.output.format = <OutputFormat as ValueEnum>::from_str(&format, true).map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid {}FORMAT value: {}",
                    ENV_PREFIX, format
                ))
            })?;
        }

        if let Some(extensions) = env.get(&format!("{}EXTENSIONS", ENV_PREFIX)) {
            config.files.extensions = split_list(&extensions);
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        match &cli.command {
            Command::Validate(args) => {
                if args.threads.is_some() {
                    config.validation.threads = args.threads;
                }
                config.validation.fail_fast |= args.fail_fast;
                config.validation.show_progress |= args.progress;
                config.engine.report_errors &= !args.no_error_list;

                if let Some(extensions) = args.get_extensions() {
                    config.files.extensions = extensions;
                }
                if !args.include_patterns.is_empty() {
                    config.files.include_patterns = args.include_patterns.clone();
                }
                if !args.exclude_patterns.is_empty() {
                    config.files.exclude_patterns = args.exclude_patterns.clone();
                }
                if args.max_depth.is_some() {
                    config.files.max_depth = args.max_depth;
                }
                config.files.follow_symlinks |= args.follow_symlinks;
            }
            Command::Parse(args) => {
                config.engine.report_errors &= !args.no_error_list;
            }
            Command::Index(_) => {}
        }

        config
    }

    /// Merge two configurations (second takes precedence for set values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.engine = override_config.engine;

        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }
        base.validation.fail_fast = override_config.validation.fail_fast;
        base.validation.show_progress = override_config.validation.show_progress;

        base.output = override_config.output;

        if !override_config.files.extensions.is_empty() {
            base.files.extensions = override_config.files.extensions;
        }
        if !override_config.files.include_patterns.is_empty() {
            base.files.include_patterns = override_config.files.include_patterns;
        }
        if !override_config.files.exclude_patterns.is_empty() {
            base.files.exclude_patterns = override_config.files.exclude_patterns;
        }
        if override_config.files.max_depth.is_some() {
            base.files.max_depth = override_config.files.max_depth;
        }
        base.files.follow_symlinks = override_config.files.follow_symlinks;

        base
    }

    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if !(1..=64).contains(&config.engine.concurrency_multiplier) {
            return Err(ConfigError::Validation(
                "Concurrency multiplier must be between 1 and 64".to_string(),
            ));
        }
        if config.engine.drain_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "Drain timeout must be greater than 0".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }
        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        Ok(())
    }

    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn engine_config(config: &Config) -> EngineConfig {
        EngineConfig {
            concurrency_multiplier: config.engine.concurrency_multiplier,
            drain_timeout: config.engine.drain_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn batch_config(config: &Config) -> BatchConfig {
        BatchConfig {
            max_concurrent_validations: Self::get_thread_count(config),
            fail_fast: config.validation.fail_fast,
            report_errors: config.engine.report_errors,
        }
    }
}

fn parse_env<T: FromStr>(env: &impl EnvProvider, key: &str) -> Result<Option<T>> {
    let name = format!("{}{}", ENV_PREFIX, key);
    env.get(&name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", name, value)))
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
