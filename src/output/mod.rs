//! Output formatting and display system
//!
//! Renders a finished run as per-iteration rows plus aggregate tables, in
//! colored or plain text, and persists the report as JSON.

mod colored;
mod formatter;
mod report;

pub use self::colored::{ColorScheme, ColoredFormatter, LatencyLevel};
pub use formatter::{
    format_latency, format_percentage, Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter,
    RowData, TableFormat,
};
pub use report::{ReportDocument, ReportMetadata, ReportWriter, REPORT_FILE_NAME};

use crate::{engine::RunReport, error::Result, models::Config};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(config: &Config) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color: config.enable_color,
            verbose_mode: config.verbose,
            table_borders: true,
            threshold_ms: config.threshold_ms as f64,
        };

        if config.enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }
}

/// Main output coordinator that handles all result display
pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self { formatter }
    }

    /// Render the complete report
    pub fn display_report(&self, report: &RunReport, metadata: &ReportMetadata) -> Result<String> {
        let sections = [
            self.formatter.format_header("Roam Timing Results")?,
            self.formatter.format_metadata(metadata)?,
            self.formatter.format_attempts(&report.attempts)?,
            self.formatter.format_aggregates(&report.summary)?,
            self.formatter.format_analysis(&report.summary)?,
            self.formatter.format_run_summary(report)?,
            self.verdict_line(report)?,
        ];

        Ok(sections.join("\n\n"))
    }

    /// Render the report as pretty JSON
    pub fn display_json(&self, report: &RunReport, metadata: &ReportMetadata) -> Result<String> {
        let document = ReportDocument {
            metadata: metadata.clone(),
            report: report.clone(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn format_warning(&self, warning: &str) -> Result<String> {
        self.formatter.format_warning(warning)
    }

    fn verdict_line(&self, report: &RunReport) -> Result<String> {
        let totals = &report.summary.totals;
        if report.all_passed() {
            self.formatter
                .format_success(&format!("All {} roam attempts passed", totals.attempted))
        } else if totals.attempted == 0 {
            self.formatter.format_error("No roam attempts were completed")
        } else {
            self.formatter.format_error(&format!(
                "{} of {} roam attempts failed ({} pass rate)",
                totals.failed,
                totals.attempted,
                format_percentage(report.pass_rate())
            ))
        }
    }
}
