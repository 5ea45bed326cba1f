use std::path::Path;

use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::ErrorCause;
use crate::events::{Severity, ValidationError};

/// Writes diagnostics to stderr at a configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
    show_error_codes: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
            show_error_codes: false,
        }
    }

    pub fn with_options(
        verbosity: VerbosityLevel,
        show_timestamps: bool,
        show_error_codes: bool,
    ) -> Self {
        Self {
            verbosity,
            show_timestamps,
            show_error_codes,
        }
    }

    /// Report an error raised during a run
    pub fn report_validation_error(&self, error: &ValidationError) {
        if let Some(formatted) = self.format_validation_error(error) {
            eprintln!("{}", formatted);
        }
    }

    /// Text for a run error, or `None` when the verbosity hides it
    pub fn format_validation_error(&self, error: &ValidationError) -> Option<String> {
        match self.verbosity {
            VerbosityLevel::Quiet => is_critical(error).then(|| format!("ERROR: {}", error)),
            VerbosityLevel::Normal => Some(self.format_error_normal(error)),
            VerbosityLevel::Verbose => Some(self.format_error_verbose(error)),
            VerbosityLevel::Debug => {
                let mut output = self.format_error_verbose(error);
                output.push_str(&format!("\nDebug Info: {:?}", error.cause()));
                output.push_str(&error_chain(error.cause()));
                Some(output)
            }
        }
    }

    /// Report an error that stopped a command
    pub fn report_error(&self, error: &(dyn std::error::Error + 'static)) {
        eprintln!("{}", self.format_error(error));
    }

    /// `Error: outer: cause: ...`, with debug details at debug verbosity
    pub fn format_error(&self, error: &(dyn std::error::Error + 'static)) -> String {
        let mut output = format!("Error: {}", error);
        let mut current = error;
        while let Some(source) = current.source() {
            output.push_str(&format!(": {}", source));
            current = source;
        }
        if self.verbosity >= VerbosityLevel::Debug {
            output.push_str(&format!("\nDebug Info: {:?}", error));
            output.push_str(&error_chain(error));
        }
        output
    }

    pub fn report_config_error(&self, error: &ConfigError) {
        let formatted = match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!("Configuration Error: {}\n{}", error, config_help(error))
            }
            VerbosityLevel::Debug => format!(
                "Configuration Error: {}\nDebug: {:?}\n{}",
                error,
                error,
                config_help(error)
            ),
        };
        eprintln!("{}", formatted);
    }

    /// Report progress for long-running operations
    pub fn report_progress(&self, current: usize, total: usize, current_file: Option<&Path>) {
        if self.verbosity == VerbosityLevel::Quiet || total == 0 {
            return;
        }

        let percentage = (current as f64 / total as f64 * 100.0) as u32;
        match current_file {
            Some(file) if self.verbosity >= VerbosityLevel::Verbose => eprint!(
                "\rProgress: {}/{} ({}%) - Processing: {}",
                current,
                total,
                percentage,
                file.display()
            ),
            _ => eprint!("\rProgress: {}/{} ({}%)", current, total, percentage),
        }

        if current == total {
            eprintln!();
        }
    }

    fn format_error_normal(&self, error: &ValidationError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };
        let label = match error.severity() {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        format!("{}{}: {}", timestamp, label, error)
    }

    fn format_error_verbose(&self, error: &ValidationError) -> String {
        let mut output = self.format_error_normal(error);

        match error.cause() {
            ErrorCause::SchemaValidation(diagnostic) => {
                if self.show_error_codes {
                    output.push_str(&format!(
                        "\nlibxml2 domain {} code {}",
                        diagnostic.domain, diagnostic.code
                    ));
                }
            }
            ErrorCause::Deserialization { type_name, .. } => {
                output.push_str(&format!(
                    "\nSuggestion: Check that the decoder for {} matches the schema type",
                    type_name
                ));
            }
            ErrorCause::AmbiguousMapping(_) => {
                output.push_str("\nSuggestion: Request the enclosing type instead");
            }
            ErrorCause::UnresolvedType { .. } => {
                output.push_str(
                    "\nSuggestion: Use `schema-stream index` to list the types of the schema set",
                );
            }
            ErrorCause::UnrecoverableRead(_) => {
                output.push_str("\nSuggestion: Check that the document is well-formed XML");
            }
            _ => {}
        }

        output
    }
}

/// Errors that are shown even in quiet mode
fn is_critical(error: &ValidationError) -> bool {
    error.is_terminal() && !matches!(error.cause(), ErrorCause::Cancelled)
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut output = String::from("\nError Chain:");
    let mut current = error;
    let mut level = 0;
    while let Some(source) = current.source() {
        level += 1;
        output.push_str(&format!("\n  {}: {}", level, source));
        current = source;
    }
    output
}

fn config_help(error: &ConfigError) -> String {
    match error {
        ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
        ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
            "Check the configuration file syntax (TOML/JSON format expected)".to_string()
        }
        ConfigError::UnsupportedFormat(_) => {
            "Use a .toml or .json configuration file".to_string()
        }
        ConfigError::Environment(_) => {
            "Fix or unset the SCHEMA_STREAM_* environment variable".to_string()
        }
        ConfigError::Validation(_) => {
            "Resolve conflicting values between file, environment, and CLI".to_string()
        }
    }
}
