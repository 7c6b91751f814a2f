//! Core formatting traits and implementations
//!
//! This module defines the output formatting interface and provides
//! a plain text implementation with table formatting capabilities.

use super::report::ReportMetadata;
use crate::{
    engine::RunReport,
    error::{AppError, Result},
    models::RoamAttempt,
    stats::{AggregateCounters, LatencyStats, RunSummary},
};
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format the run parameters
    fn format_metadata(&self, metadata: &ReportMetadata) -> Result<String>;

    /// Format one row per attempt
    fn format_attempts(&self, attempts: &[RoamAttempt]) -> Result<String>;

    /// Format per-station and per-BSSID counters
    fn format_aggregates(&self, summary: &RunSummary) -> Result<String>;

    /// Format failure reasons and the latency distribution
    fn format_analysis(&self, summary: &RunSummary) -> Result<String>;

    /// Format totals, aborted iterations and removed stations
    fn format_run_summary(&self, report: &RunReport) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Enable verbose mode with detailed information
    pub verbose_mode: bool,
    /// Show table borders
    pub table_borders: bool,
    /// Pass threshold, used to grade latencies
    pub threshold_ms: f64,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
            threshold_ms: crate::defaults::DEFAULT_THRESHOLD.as_secs_f64() * 1000.0,
        }
    }
}

/// Table formatting configuration
#[derive(Debug, Clone)]
pub struct TableFormat {
    pub columns: Vec<Column>,
    pub show_borders: bool,
    pub show_header: bool,
}

impl TableFormat {
    pub fn new(columns: Vec<Column>, show_borders: bool) -> Self {
        Self {
            columns,
            show_borders,
            show_header: true,
        }
    }
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub alignment: Alignment,
    pub min_width: usize,
    pub max_width: usize,
}

impl Column {
    pub fn left(header: &str) -> Self {
        Self {
            header: header.to_string(),
            alignment: Alignment::Left,
            min_width: 0,
            max_width: 48,
        }
    }

    pub fn right(header: &str) -> Self {
        Self {
            alignment: Alignment::Right,
            ..Self::left(header)
        }
    }
}

/// Text alignment options
#[derive(Debug, Clone)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

/// Row data for table formatting
pub type RowData = Vec<String>;

/// Columns of the per-attempt table
pub(crate) fn attempt_columns() -> Vec<Column> {
    vec![
        Column::right("Iter"),
        Column::left("Pair"),
        Column::left("Station"),
        Column::left("Before"),
        Column::left("After"),
        Column::right("Latency"),
        Column::right("Signal"),
        Column::left("Verdict"),
    ]
}

pub(crate) fn attempt_row(attempt: &RoamAttempt, latency: String) -> RowData {
    vec![
        attempt.iteration.to_string(),
        attempt.pair.to_string(),
        attempt.station.to_string(),
        attempt.bssid_before.to_string(),
        if attempt.roamed { attempt.bssid_after.to_string() } else { "-".to_string() },
        latency,
        attempt.signal_dbm.map(|s| format!("{} dBm", s)).unwrap_or_else(|| "-".to_string()),
        attempt.verdict.to_string(),
    ]
}

pub(crate) fn counter_columns(key: &str) -> Vec<Column> {
    vec![
        Column::left(key),
        Column::right("Attempted"),
        Column::right("Passed"),
        Column::right("Failed"),
        Column::right("Pass Rate"),
    ]
}

pub(crate) fn counter_row(key: String, counters: &AggregateCounters) -> RowData {
    vec![
        key,
        counters.attempted.to_string(),
        counters.succeeded.to_string(),
        counters.failed.to_string(),
        format_percentage(counters.pass_rate()),
    ]
}

/// Format a roam latency in milliseconds
pub fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        None => "-".to_string(),
        Some(ms) if (0.0..1.0).contains(&ms) => format!("{:.0}µs", ms * 1000.0),
        Some(ms) if ms.abs() < 1000.0 => format!("{:.1}ms", ms),
        Some(ms) => format!("{:.2}s", ms / 1000.0),
    }
}

/// Format percentage with appropriate precision
pub fn format_percentage(percentage: f64) -> String {
    if percentage >= 99.95 {
        "100.0%".to_string()
    } else if percentage < 0.05 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", percentage)
    }
}

pub(crate) fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::io(format!("Failed to format output: {}", e))
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    /// Create a new plain formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    /// Create a table with the given format and data
    pub(crate) fn create_table(&self, format: &TableFormat, rows: &[RowData]) -> String {
        if rows.is_empty() {
            return String::new();
        }

        let column_widths = self.calculate_column_widths(format, rows);

        let mut output = String::new();

        if format.show_header && !format.columns.is_empty() {
            if format.show_borders {
                output.push_str(&self.create_horizontal_border(&column_widths));
                output.push('\n');
            }

            let headers: Vec<String> = format.columns.iter().map(|c| c.header.clone()).collect();
            output.push_str(&self.create_row(&headers, &column_widths, format));
            output.push('\n');

            if format.show_borders {
                output.push_str(&self.create_horizontal_border(&column_widths));
                output.push('\n');
            }
        }

        for row in rows {
            output.push_str(&self.create_row(row, &column_widths, format));
            output.push('\n');
        }

        if format.show_borders {
            output.push_str(&self.create_horizontal_border(&column_widths));
        }

        output
    }

    pub(crate) fn calculate_column_widths(&self, format: &TableFormat, rows: &[RowData]) -> Vec<usize> {
        let num_columns = format
            .columns
            .len()
            .max(rows.iter().map(|r| r.len()).max().unwrap_or(0));

        (0..num_columns)
            .map(|col_idx| {
                let column = format.columns.get(col_idx);
                let mut width = column.map(|c| c.min_width.max(c.header.chars().count())).unwrap_or(0);

                for row in rows {
                    if let Some(cell) = row.get(col_idx) {
                        width = width.max(cell.chars().count());
                    }
                }

                match column {
                    Some(c) => width.min(c.max_width),
                    None => width,
                }
            })
            .collect()
    }

    fn create_row(&self, data: &[String], widths: &[usize], format: &TableFormat) -> String {
        let mut row = String::new();

        if format.show_borders {
            row.push('|');
        }

        for (idx, (cell, &width)) in data.iter().zip(widths.iter()).enumerate() {
            let alignment = format.columns.get(idx).map(|c| &c.alignment).unwrap_or(&Alignment::Left);
            let padded_cell = align_text(cell, width, alignment);

            if format.show_borders {
                row.push(' ');
            }
            row.push_str(&padded_cell);
            if format.show_borders {
                row.push_str(" |");
            } else {
                row.push_str("  ");
            }
        }

        row.trim_end().to_string()
    }

    fn create_horizontal_border(&self, widths: &[usize]) -> String {
        let mut border = String::new();

        if !widths.is_empty() {
            border.push('+');
            for &width in widths {
                border.push_str(&"-".repeat(width + 2));
                border.push('+');
            }
        }

        border
    }

    fn table(&self, columns: Vec<Column>, rows: &[RowData]) -> String {
        self.create_table(&TableFormat::new(columns, self.options.table_borders), rows)
    }
}

/// Align text within specified width
pub(crate) fn align_text(text: &str, width: usize, alignment: &Alignment) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.chars().take(width).collect();
    }

    let padding = width - len;
    match alignment {
        Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
        Alignment::Right => format!("{}{}", " ".repeat(padding), text),
        Alignment::Center => {
            let left_pad = padding / 2;
            let right_pad = padding - left_pad;
            format!("{}{}{}", " ".repeat(left_pad), text, " ".repeat(right_pad))
        }
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.chars().count() + 4);

        writeln!(output, "{}", border).map_err(fmt_err)?;
        writeln!(output, "  {}  ", title).map_err(fmt_err)?;
        write!(output, "{}", border).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_metadata(&self, metadata: &ReportMetadata) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "Run Parameters:").map_err(fmt_err)?;
        writeln!(output, "---------------").map_err(fmt_err)?;
        writeln!(output, "Manager:          {}", metadata.manager_url).map_err(fmt_err)?;
        for (i, (group, bssid)) in metadata.groups.iter().zip(&metadata.bssids).enumerate() {
            writeln!(output, "Group g{}:         {} -> {}", i, group, bssid).map_err(fmt_err)?;
        }
        writeln!(output, "Stations:         {}", metadata.stations.join(", ")).map_err(fmt_err)?;
        match (&metadata.eap_method, &metadata.identity) {
            (Some(method), Some(identity)) => {
                writeln!(output, "Security:         {} ({} as {})", metadata.security, method, identity).map_err(fmt_err)?
            }
            _ => writeln!(output, "Security:         {}", metadata.security).map_err(fmt_err)?,
        }
        writeln!(
            output,
            "Roam:             {}{}",
            metadata.roam_method,
            if metadata.fast_transition { " with 802.11r" } else { "" }
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "Ramp:             step {} / max {} deci-dB, {}s per step",
            metadata.step, metadata.max_attenuation, metadata.wait_time_seconds
        )
        .map_err(fmt_err)?;
        write!(output, "Threshold:        {}ms", metadata.threshold_ms).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_attempts(&self, attempts: &[RoamAttempt]) -> Result<String> {
        if attempts.is_empty() {
            return Ok("No roam attempts recorded.".to_string());
        }

        let rows: Vec<RowData> = attempts
            .iter()
            .map(|a| attempt_row(a, format_latency(a.latency_ms)))
            .collect();

        let mut output = String::new();
        writeln!(output, "Roam Attempts:").map_err(fmt_err)?;
        write!(output, "{}", self.table(attempt_columns(), &rows)).map_err(fmt_err)?;

        if self.options.verbose_mode {
            for attempt in attempts.iter().filter(|a| a.capture_file.is_some()) {
                if let Some(ref file) = attempt.capture_file {
                    write!(output, "\n  iteration {} {}: {}", attempt.iteration, attempt.station, file.display())
                        .map_err(fmt_err)?;
                }
            }
        }

        Ok(output)
    }

    fn format_aggregates(&self, summary: &RunSummary) -> Result<String> {
        let station_rows: Vec<RowData> = summary
            .by_station
            .iter()
            .map(|(station, counters)| counter_row(station.to_string(), counters))
            .collect();
        let bssid_rows: Vec<RowData> = summary
            .by_bssid
            .iter()
            .map(|(bssid, counters)| counter_row(bssid.to_string(), counters))
            .collect();

        let mut output = String::new();
        writeln!(output, "By Station:").map_err(fmt_err)?;
        writeln!(output, "{}", self.table(counter_columns("Station"), &station_rows)).map_err(fmt_err)?;
        writeln!(output).map_err(fmt_err)?;
        writeln!(output, "By Landing BSSID:").map_err(fmt_err)?;
        write!(output, "{}", self.table(counter_columns("BSSID"), &bssid_rows)).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_analysis(&self, summary: &RunSummary) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "Latency (passing roams):").map_err(fmt_err)?;
        match summary.latency {
            Some(ref stats) => write_latency_stats(&mut output, stats, |_, text| text)?,
            None => writeln!(output, "  no passing roams").map_err(fmt_err)?,
        }

        if !summary.failure_reasons.is_empty() {
            writeln!(output).map_err(fmt_err)?;
            writeln!(output, "Failure Reasons:").map_err(fmt_err)?;
            let mut reasons: Vec<_> = summary.failure_reasons.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                writeln!(output, "  {:>4}  {}", count, reason).map_err(fmt_err)?;
            }
        }

        Ok(output.trim_end().to_string())
    }

    fn format_run_summary(&self, report: &RunReport) -> Result<String> {
        let mut output = String::new();
        let totals = &report.summary.totals;

        writeln!(output, "Run Summary:").map_err(fmt_err)?;
        writeln!(output, "------------").map_err(fmt_err)?;
        writeln!(
            output,
            "Iterations:       {}/{}",
            report.iterations_completed, report.iterations_requested
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "Attempts:         {} ({} passed, {} failed)",
            totals.attempted, totals.succeeded, totals.failed
        )
        .map_err(fmt_err)?;
        writeln!(output, "Pass Rate:        {}", format_percentage(report.pass_rate())).map_err(fmt_err)?;
        writeln!(
            output,
            "Duration:         {}s",
            (report.finished_at - report.started_at).num_seconds()
        )
        .map_err(fmt_err)?;

        for (iteration, reason) in &report.aborted_iterations {
            writeln!(output, "Aborted:          iteration {}: {}", iteration, reason).map_err(fmt_err)?;
        }
        for station in &report.removed_stations {
            writeln!(output, "Removed:          {}", station).map_err(fmt_err)?;
        }
        if report.cancelled {
            writeln!(output, "Run cancelled before all iterations completed").map_err(fmt_err)?;
        }

        Ok(output.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}

/// Write the latency distribution, letting the caller decorate values
pub(crate) fn write_latency_stats<F>(output: &mut String, stats: &LatencyStats, decorate: F) -> Result<()>
where
    F: Fn(f64, String) -> String,
{
    let value = |ms: f64| decorate(ms, format_latency(Some(ms)));
    writeln!(
        output,
        "  min {}  avg {}  max {}",
        value(stats.min_ms),
        value(stats.avg_ms),
        value(stats.max_ms)
    )
    .map_err(fmt_err)?;
    writeln!(
        output,
        "  p50 {}  p95 {}  stddev {}  ({} samples)",
        value(stats.p50_ms),
        value(stats.p95_ms),
        format_latency(Some(stats.std_dev_ms)),
        stats.count
    )
    .map_err(fmt_err)?;
    Ok(())
}
