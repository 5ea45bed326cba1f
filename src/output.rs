//! Result formatting for the command line
//!
//! Every report renders in one of three formats: human-readable text with
//! optional ANSI colors, JSON, or a one-line summary.

use std::time::Duration;

use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::events::{Severity, ValidationError, ValidationFinishedResult};
use crate::schema::SchemaTagIndex;
use crate::validator::{BatchSummary, FileReport, FileStatus};

pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

/// Serializable view of one run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub document: &'a str,
    pub valid: bool,
    pub cancelled: bool,
    pub elapsed_ms: u128,
    pub error_count: u64,
    pub parsed_node_count: u64,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub severity: Severity,
    pub terminal: bool,
    pub line: Option<u32>,
    pub message: String,
}

impl From<&ValidationError> for ErrorEntry {
    fn from(error: &ValidationError) -> Self {
        Self {
            severity: error.severity(),
            terminal: error.is_terminal(),
            line: error.line(),
            message: error.message(),
        }
    }
}

impl<'a> RunReport<'a> {
    pub fn new(document: &'a str, result: &ValidationFinishedResult) -> Self {
        Self {
            document,
            valid: result.is_valid(),
            cancelled: result.was_cancelled(),
            elapsed_ms: result.elapsed.as_millis(),
            error_count: result.error_count,
            parsed_node_count: result.parsed_node_count,
            errors: result.errors.iter().map(ErrorEntry::from).collect(),
        }
    }
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// Report for a single parse or validation run
    pub fn format_run(&self, document: &str, result: &ValidationFinishedResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&RunReport::new(document, result)),
            OutputFormat::Summary => format!(
                "{}: {} error(s), {} record(s) in {}\n",
                document,
                result.error_count,
                result.parsed_node_count,
                format_duration(result.elapsed)
            ),
            OutputFormat::Human => self.format_run_human(document, result),
        }
    }

    fn format_run_human(&self, document: &str, result: &ValidationFinishedResult) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            if !result.is_valid() {
                output.push_str(&format!("{}: {} error(s)\n", document, result.error_count));
            }
            return output;
        }

        let status = if result.was_cancelled() {
            self.colorize("- CANCELLED", "36")
        } else if result.is_valid() {
            self.colorize("✓ VALID", "32")
        } else if result.terminal_error().is_some() {
            self.colorize("⚠ ERROR", "33")
        } else {
            self.colorize("✗ INVALID", "31")
        };
        output.push_str(&format!(
            "{}  {} ({})\n",
            status,
            document,
            format_duration(result.elapsed)
        ));
        output.push_str(&format!("  Records: {}\n", result.parsed_node_count));
        output.push_str(&format!("  Errors: {}\n", result.error_count));

        for error in &result.errors {
            output.push_str(&format!("    {}\n", error));
        }
        let hidden = (result.error_count as usize).saturating_sub(result.errors.len());
        if hidden > 0 && self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!("    ({} error(s) counted but not listed)\n", hidden));
        }

        output
    }

    /// Report for a batch of files
    pub fn format_batch(&self, summary: &BatchSummary) -> String {
        match self.format {
            OutputFormat::Json => to_json(summary),
            OutputFormat::Summary => format!(
                "{} file(s): {} valid, {} invalid, {} error(s), {} skipped in {}\n",
                summary.total_files,
                summary.valid_files,
                summary.invalid_files,
                summary.error_files,
                summary.skipped_files,
                format_duration(summary.total_duration)
            ),
            OutputFormat::Human => self.format_batch_human(summary),
        }
    }

    fn format_batch_human(&self, summary: &BatchSummary) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            if summary.has_errors() {
                output.push_str(&format!(
                    "Errors: {} Invalid: {}\n",
                    summary.error_files, summary.invalid_files
                ));
            }
            return output;
        }

        for report in &summary.file_reports {
            if self.verbosity >= VerbosityLevel::Verbose || !report.status.is_valid() {
                output.push_str(&self.format_file_report(report));
                output.push('\n');
            }
        }

        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total files: {}\n", summary.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            summary.valid_files
        ));
        for (label, count, color) in [
            ("Invalid:", summary.invalid_files, "31"),
            ("Errors:", summary.error_files, "33"),
            ("Skipped:", summary.skipped_files, "36"),
        ] {
            if count > 0 {
                output.push_str(&format!("  {} {}\n", self.colorize(label, color), count));
            }
        }
        output.push_str(&format!("  Success rate: {:.1}%\n", summary.success_rate()));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(summary.total_duration)
        ));
        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!(
                "  Average per file: {}\n",
                format_duration(summary.average_duration)
            ));
        }

        output
    }

    pub fn format_file_report(&self, report: &FileReport) -> String {
        let path_display = report.path.display();
        let duration_str = format_duration(report.duration);

        match &report.status {
            FileStatus::Valid => format!(
                "{}  {} ({})",
                self.colorize("✓ VALID", "32"),
                path_display,
                duration_str
            ),
            FileStatus::Invalid { error_count } => {
                let mut output = format!(
                    "{}  {} ({}) - {} error{}",
                    self.colorize("✗ INVALID", "31"),
                    path_display,
                    duration_str,
                    error_count,
                    if *error_count == 1 { "" } else { "s" }
                );
                if self.verbosity >= VerbosityLevel::Verbose {
                    for detail in &report.error_details {
                        output.push_str(&format!("\n    {}", detail));
                    }
                }
                output
            }
            FileStatus::Error { message } => format!(
                "{}  {} ({}) - {}",
                self.colorize("⚠ ERROR", "33"),
                path_display,
                duration_str,
                message
            ),
            FileStatus::Skipped { reason } => format!(
                "{}  {} - {}",
                self.colorize("- SKIPPED", "36"),
                path_display,
                reason
            ),
        }
    }

    /// Type-to-tag index, optionally limited to one type
    pub fn format_index(&self, index: &SchemaTagIndex, only: Option<&str>) -> String {
        let entries: Vec<_> = index
            .iter()
            .filter(|(type_name, _)| only.is_none_or(|wanted| wanted == *type_name))
            .collect();

        match self.format {
            OutputFormat::Json => {
                let map: std::collections::BTreeMap<_, _> = entries.into_iter().collect();
                to_json(&map)
            }
            OutputFormat::Summary => format!("{} type(s)\n", entries.len()),
            OutputFormat::Human => {
                let mut output = String::new();
                for (type_name, tags) in entries {
                    let shared: Vec<&str> = tags
                        .iter()
                        .filter(|tag| index.types_claiming(tag).count() > 1)
                        .map(String::as_str)
                        .collect();
                    output.push_str(&format!(
                        "{}: {}",
                        type_name,
                        tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
                    ));
                    if !shared.is_empty() {
                        output.push_str(&format!(
                            " {}",
                            self.colorize(&format!("(shared: {})", shared.join(", ")), "33")
                        ));
                    }
                    output.push('\n');
                }
                output
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(mut json) => {
            json.push('\n');
            json
        }
        Err(e) => format!("{{\"error\": \"{}\"}}\n", e),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
