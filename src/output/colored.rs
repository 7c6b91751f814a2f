//! Colored formatter implementation with terminal color support
//!
//! Uses ANSI colors and Unicode symbols; cells are padded before they are
//! colored so table columns stay aligned.

use super::formatter::{
    align_text, attempt_columns, attempt_row, counter_columns, counter_row, fmt_err, format_latency,
    format_percentage, write_latency_stats, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData,
    TableFormat,
};
use super::report::ReportMetadata;
use crate::{
    engine::RunReport,
    error::Result,
    models::{RoamAttempt, Verdict},
    stats::RunSummary,
};
use colored::*;
use std::fmt::Write as _;

/// Latency grade relative to the pass threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyLevel {
    /// Under half the threshold
    Fast,
    Acceptable,
    /// At or over the threshold
    Slow,
}

impl LatencyLevel {
    pub fn classify(latency_ms: f64, threshold_ms: f64) -> Self {
        if latency_ms < threshold_ms / 2.0 {
            Self::Fast
        } else if latency_ms < threshold_ms {
            Self::Acceptable
        } else {
            Self::Slow
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Fast => Color::Green,
            Self::Acceptable => Color::Yellow,
            Self::Slow => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    /// Create a new colored formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        let plain_formatter = PlainFormatter::new(options.clone());
        Self {
            plain_formatter,
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn rate_color(&self, percentage: f64) -> Color {
        if percentage >= 95.0 {
            self.color_scheme.success
        } else if percentage >= 80.0 {
            self.color_scheme.warning
        } else {
            self.color_scheme.error
        }
    }

    fn create_section_header(&self, title: &str, icon: &str) -> String {
        if self.options.enable_color {
            format!("{} {}", icon, title.bold().color(self.color_scheme.header))
        } else {
            format!("{} {}", icon, title)
        }
    }

    /// Pass-rate bar, e.g. `[████░░░░]`
    fn create_pass_bar(&self, percentage: f64, width: usize) -> String {
        let filled = ((percentage.clamp(0.0, 100.0) * width as f64 / 100.0) as usize).min(width);
        let empty = width - filled;

        if !self.options.enable_color {
            return format!("[{}{}]", "=".repeat(filled), " ".repeat(empty));
        }

        format!(
            "[{}{}]",
            "█".repeat(filled).color(self.rate_color(percentage)),
            "░".repeat(empty).color(Color::BrightBlack)
        )
    }

    /// Render a table; `paint` may color a padded cell by row and column
    fn create_colored_table<F>(&self, columns: Vec<Column>, rows: &[RowData], paint: F) -> String
    where
        F: Fn(usize, usize, String) -> String,
    {
        let format = TableFormat::new(columns, false);
        let widths = self.plain_formatter.calculate_column_widths(&format, rows);
        let rule = "─".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1));

        let mut output = String::new();

        let header: Vec<String> = format
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, &w)| align_text(&c.header, w, &c.alignment))
            .collect();
        output.push_str(&self.bold(header.join("  ").trim_end()).to_string());
        output.push('\n');
        output.push_str(&self.colorize(&rule, self.color_scheme.border).to_string());

        for (row_idx, row) in rows.iter().enumerate() {
            output.push('\n');
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(col_idx, (cell, &w))| {
                    let padded = align_text(cell, w, &format.columns[col_idx].alignment);
                    paint(row_idx, col_idx, padded)
                })
                .collect();
            output.push_str(cells.join("  ").trim_end());
        }

        output
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();

        let decorated_title = format!("📡 {}", title);
        let border = "═".repeat(decorated_title.chars().count() + 5);

        writeln!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_err)?;
        let title = if self.options.enable_color {
            decorated_title.bold().color(self.color_scheme.header)
        } else {
            decorated_title.normal()
        };
        writeln!(output, "  {}  ", title).map_err(fmt_err)?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_metadata(&self, metadata: &ReportMetadata) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "{}", self.create_section_header("Run Parameters", "⚙️ ")).map_err(fmt_err)?;
        writeln!(output, "   Manager:    {}", self.colorize(&metadata.manager_url, self.color_scheme.info))
            .map_err(fmt_err)?;
        for (i, (group, bssid)) in metadata.groups.iter().zip(&metadata.bssids).enumerate() {
            writeln!(
                output,
                "   Group g{}:   {} {} {}",
                i,
                group,
                self.colorize("→", self.color_scheme.muted),
                self.colorize(bssid, self.color_scheme.info)
            )
            .map_err(fmt_err)?;
        }
        writeln!(output, "   Stations:   {}", metadata.stations.join(", ")).map_err(fmt_err)?;
        let security = match (&metadata.eap_method, &metadata.identity) {
            (Some(method), Some(identity)) => format!("{} ({} as {})", metadata.security, method, identity),
            _ => metadata.security.clone(),
        };
        writeln!(output, "   Security:   {}", security).map_err(fmt_err)?;
        writeln!(
            output,
            "   Roam:       {}{}",
            metadata.roam_method,
            if metadata.fast_transition { " with 802.11r" } else { "" }
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "   Ramp:       step {} / max {} deci-dB, {}s per step",
            metadata.step, metadata.max_attenuation, metadata.wait_time_seconds
        )
        .map_err(fmt_err)?;
        write!(
            output,
            "   Threshold:  {}",
            self.bold(&format!("{}ms", metadata.threshold_ms))
        )
        .map_err(fmt_err)?;

        Ok(output)
    }

    fn format_attempts(&self, attempts: &[RoamAttempt]) -> Result<String> {
        if attempts.is_empty() {
            return Ok(self.colorize("No roam attempts recorded.", self.color_scheme.muted).to_string());
        }

        let rows: Vec<RowData> = attempts
            .iter()
            .map(|a| attempt_row(a, format_latency(a.latency_ms)))
            .collect();

        let table = self.create_colored_table(attempt_columns(), &rows, |row, col, cell| {
            let attempt = &attempts[row];
            match col {
                5 => match attempt.latency_ms {
                    Some(ms) => self
                        .colorize(&cell, LatencyLevel::classify(ms, self.options.threshold_ms).color())
                        .to_string(),
                    None => self.colorize(&cell, self.color_scheme.muted).to_string(),
                },
                7 => match attempt.verdict {
                    Verdict::Pass => self.colorize(&cell, self.color_scheme.success).to_string(),
                    Verdict::Fail(_) => self.colorize(&cell, self.color_scheme.error).to_string(),
                },
                _ => cell,
            }
        });

        let mut output = String::new();
        writeln!(output, "{}", self.create_section_header("Roam Attempts", "📶")).map_err(fmt_err)?;
        write!(output, "{}", table).map_err(fmt_err)?;

        if self.options.verbose_mode {
            for attempt in attempts {
                if let Some(ref file) = attempt.capture_file {
                    write!(
                        output,
                        "\n   {} iteration {} {}: {}",
                        self.colorize("pcap", self.color_scheme.muted),
                        attempt.iteration,
                        attempt.station,
                        file.display()
                    )
                    .map_err(fmt_err)?;
                }
            }
        }

        Ok(output)
    }

    fn format_aggregates(&self, summary: &RunSummary) -> Result<String> {
        let station_rates: Vec<f64> = summary.by_station.values().map(|c| c.pass_rate()).collect();
        let station_rows: Vec<RowData> = summary
            .by_station
            .iter()
            .map(|(station, counters)| counter_row(station.to_string(), counters))
            .collect();
        let bssid_rates: Vec<f64> = summary.by_bssid.values().map(|c| c.pass_rate()).collect();
        let bssid_rows: Vec<RowData> = summary
            .by_bssid
            .iter()
            .map(|(bssid, counters)| counter_row(bssid.to_string(), counters))
            .collect();

        let paint = |rates: &[f64], row: usize, col: usize, cell: String| -> String {
            if col == 4 {
                format!("{} {}", self.colorize(&cell, self.rate_color(rates[row])), self.create_pass_bar(rates[row], 10))
            } else {
                cell
            }
        };

        let mut output = String::new();
        writeln!(output, "{}", self.create_section_header("By Station", "📊")).map_err(fmt_err)?;
        writeln!(
            output,
            "{}",
            self.create_colored_table(counter_columns("Station"), &station_rows, |r, c, cell| paint(
                &station_rates,
                r,
                c,
                cell
            ))
        )
        .map_err(fmt_err)?;
        writeln!(output).map_err(fmt_err)?;
        writeln!(output, "{}", self.create_section_header("By Landing BSSID", "📊")).map_err(fmt_err)?;
        write!(
            output,
            "{}",
            self.create_colored_table(counter_columns("BSSID"), &bssid_rows, |r, c, cell| paint(
                &bssid_rates,
                r,
                c,
                cell
            ))
        )
        .map_err(fmt_err)?;

        Ok(output)
    }

    fn format_analysis(&self, summary: &RunSummary) -> Result<String> {
        let mut output = String::new();

        writeln!(output, "{}", self.create_section_header("Latency (passing roams)", "⏱️ ")).map_err(fmt_err)?;
        match summary.latency {
            Some(ref stats) => {
                let threshold = self.options.threshold_ms;
                write_latency_stats(&mut output, stats, |ms, text| {
                    self.colorize(&text, LatencyLevel::classify(ms, threshold).color()).to_string()
                })?;
            }
            None => writeln!(output, "  {}", self.colorize("no passing roams", self.color_scheme.muted))
                .map_err(fmt_err)?,
        }

        if !summary.failure_reasons.is_empty() {
            writeln!(output).map_err(fmt_err)?;
            writeln!(output, "{}", self.create_section_header("Failure Reasons", "❌")).map_err(fmt_err)?;
            let mut reasons: Vec<_> = summary.failure_reasons.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                writeln!(
                    output,
                    "  {:>4}  {}",
                    self.bold(&count.to_string()),
                    self.colorize(reason, self.color_scheme.error)
                )
                .map_err(fmt_err)?;
            }
        }

        Ok(output.trim_end().to_string())
    }

    fn format_run_summary(&self, report: &RunReport) -> Result<String> {
        let mut output = String::new();
        let totals = &report.summary.totals;
        let rate = report.pass_rate();

        writeln!(output, "{}", self.create_section_header("Run Summary", "🧾")).map_err(fmt_err)?;
        writeln!(
            output,
            "   Iterations: {}/{}",
            report.iterations_completed, report.iterations_requested
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "   Attempts:   {} ({} passed, {} failed)",
            totals.attempted,
            self.colorize(&totals.succeeded.to_string(), self.color_scheme.success),
            self.colorize(&totals.failed.to_string(), self.color_scheme.error)
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "   Pass Rate:  {} {}",
            self.colorize(&format_percentage(rate), self.rate_color(rate)),
            self.create_pass_bar(rate, 20)
        )
        .map_err(fmt_err)?;
        writeln!(
            output,
            "   Duration:   {}s",
            (report.finished_at - report.started_at).num_seconds()
        )
        .map_err(fmt_err)?;

        for (iteration, reason) in &report.aborted_iterations {
            writeln!(
                output,
                "   {}",
                self.colorize(&format!("Iteration {} aborted: {}", iteration, reason), self.color_scheme.warning)
            )
            .map_err(fmt_err)?;
        }
        for station in &report.removed_stations {
            writeln!(
                output,
                "   {}",
                self.colorize(&format!("Station {} removed during the run", station), self.color_scheme.warning)
            )
            .map_err(fmt_err)?;
        }
        if report.cancelled {
            writeln!(
                output,
                "   {}",
                self.colorize("Run cancelled before all iterations completed", self.color_scheme.warning)
            )
            .map_err(fmt_err)?;
        }

        Ok(output.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("❌ {}", self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("⚠️  {}", self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("✅ {}", self.colorize(message, self.color_scheme.success)))
    }
}
