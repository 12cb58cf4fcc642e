//! Benchmark reporting.
//!
//! Renders results as Markdown summaries, detailed per-case reports,
//! baseline comparisons and ASCII histograms, and exports them as JSON,
//! CSV, HTML or Markdown through a [`ReportSink`].

use crate::error::ExecutionError;
use crate::result::{BenchmarkResult, CPU_METRIC, DURATION_METRIC, MEMORY_METRIC, MetricStats};
use chrono::{DateTime, SecondsFormat, Utc};
use perfscope_core::{
    LocalFs, ReportConfig, ReportSink, SharedClock, StorageError, SystemClock, ValidationError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

const HISTOGRAM_MAX_BUCKETS: usize = 20;
const HISTOGRAM_BAR_WIDTH: f64 = 40.0;

const CSV_HEADER: &str = "Name,Type,Level,Status,Duration (ms),Operations/sec,Min (ms),Max (ms),Mean (ms),Median (ms),StdDev (ms),P95 (ms),P99 (ms),Timestamp";

const HTML_STYLE: &str = r#"body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; max-width: 1100px; margin: 0 auto; padding: 24px; color: #24292f; line-height: 1.5; }
h1, h2, h3, h4 { border-bottom: 1px solid #d0d7de; padding-bottom: 4px; }
table { border-collapse: collapse; margin: 12px 0; }
th, td { border: 1px solid #d0d7de; padding: 6px 12px; text-align: left; }
th { background: #f6f8fa; }
pre { background: #f6f8fa; padding: 12px; overflow-x: auto; }
hr { border: 0; border-top: 2px solid #d0d7de; margin: 24px 0; }"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
    Md,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::Json, Self::Csv, Self::Html, Self::Md];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Md => "md",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "html" | "htm" => Ok(Self::Html),
            "md" | "markdown" => Ok(Self::Md),
            other => Err(ValidationError::invalid(
                "export format",
                format!("'{other}' is not one of json, csv, html, md"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Improved,
    Regressed,
    Unchanged,
}

impl ChangeDirection {
    fn label(&self) -> &'static str {
        match self {
            Self::Improved => "🔼 improved",
            Self::Regressed => "🔽 regressed",
            Self::Unchanged => "⏺ unchanged",
        }
    }
}

/// Change of one statistic between a baseline and a current run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub baseline: f64,
    pub current: f64,
    pub diff: f64,
    /// Relative to the baseline; 0 when the baseline is 0.
    pub percent: f64,
    pub direction: ChangeDirection,
}

impl Delta {
    /// Throughput style: higher is better.
    pub fn higher_is_better(baseline: f64, current: f64) -> Self {
        Self::compute(baseline, current, 1.0)
    }

    /// Latency style: lower is better.
    pub fn lower_is_better(baseline: f64, current: f64) -> Self {
        Self::compute(baseline, current, -1.0)
    }

    fn compute(baseline: f64, current: f64, polarity: f64) -> Self {
        let diff = current - baseline;
        let percent = if baseline == 0.0 {
            0.0
        } else {
            diff / baseline * 100.0
        };
        let direction = match (diff * polarity).partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Greater) => ChangeDirection::Improved,
            Some(std::cmp::Ordering::Less) => ChangeDirection::Regressed,
            _ => ChangeDirection::Unchanged,
        };

        Self {
            baseline,
            current,
            diff,
            percent,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseComparison {
    pub name: String,
    pub ops_per_second: Delta,
    /// Present when both runs measured durations.
    pub p95_ms: Option<Delta>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub cases: Vec<CaseComparison>,
    pub only_in_baseline: Vec<String>,
    pub only_in_current: Vec<String>,
}

/// Match two result sets by case name.
pub fn compare(baseline: &[BenchmarkResult], current: &[BenchmarkResult]) -> ComparisonSummary {
    let by_name: BTreeMap<&str, &BenchmarkResult> =
        baseline.iter().map(|result| (result.name(), result)).collect();

    let mut summary = ComparisonSummary::default();
    for result in current {
        let Some(base) = by_name.get(result.name()) else {
            summary.only_in_current.push(result.name().to_string());
            continue;
        };

        let p95_ms = base
            .duration_stats()
            .zip(result.duration_stats())
            .map(|(b, c)| Delta::lower_is_better(b.p95, c.p95));
        summary.cases.push(CaseComparison {
            name: result.name().to_string(),
            ops_per_second: Delta::higher_is_better(base.ops_per_second, result.ops_per_second),
            p95_ms,
        });
    }

    let current_names: Vec<&str> = current.iter().map(BenchmarkResult::name).collect();
    summary.only_in_baseline = baseline
        .iter()
        .map(BenchmarkResult::name)
        .filter(|name| !current_names.contains(name))
        .map(str::to_string)
        .collect();
    summary
}

/// ASCII histogram of `values`, bucketed into `min(20, ceil(sqrt(n)))` buckets.
/// Empty input renders nothing.
pub fn histogram(values: &[f64]) -> String {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return String::new();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let bucket_count = if range > 0.0 {
        ((finite.len() as f64).sqrt().ceil() as usize).clamp(1, HISTOGRAM_MAX_BUCKETS)
    } else {
        // Identical values have no width to split.
        1
    };
    let bucket_size = range / bucket_count as f64;

    let mut counts = vec![0usize; bucket_count];
    for value in &finite {
        let index = if bucket_size > 0.0 {
            (((value - min) / bucket_size).floor() as usize).min(bucket_count - 1)
        } else {
            0
        };
        counts[index] += 1;
    }
    let peak = counts.iter().copied().max().unwrap_or(1).max(1);

    let mut out = String::from("Histogram:\n");
    for (i, count) in counts.iter().enumerate() {
        let start = min + bucket_size * i as f64;
        let end = if i + 1 == bucket_count {
            max
        } else {
            start + bucket_size
        };
        let width = (*count as f64 / peak as f64 * HISTOGRAM_BAR_WIDTH).round() as usize;
        out.push_str(&format!(
            "{start:.2}-{end:.2} | {} ({count})\n",
            "█".repeat(width)
        ));
    }
    out
}

pub struct BenchmarkReporter {
    output_dir: PathBuf,
    sink: Arc<dyn ReportSink>,
    clock: SharedClock,
}

impl BenchmarkReporter {
    pub fn new(output_dir: impl Into<PathBuf>, sink: Arc<dyn ReportSink>, clock: SharedClock) -> Self {
        Self {
            output_dir: output_dir.into(),
            sink,
            clock,
        }
    }

    /// `./reports/benchmark` on the local filesystem.
    pub fn with_defaults() -> Self {
        Self::from_config(&ReportConfig::default(), Arc::new(LocalFs), SystemClock::shared())
    }

    pub fn from_config(config: &ReportConfig, sink: Arc<dyn ReportSink>, clock: SharedClock) -> Self {
        Self::new(config.output_dir.clone(), sink, clock)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn generate_summary(&self, results: &[BenchmarkResult]) -> String {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;

        let mut md = String::new();
        md.push_str("# Benchmark Summary\n\n");
        md.push_str(&format!("Generated: {}\n\n", self.generated_at()));
        md.push_str(&format!("- **Total:** {}\n", results.len()));
        md.push_str(&format!("- **Passed:** {passed}\n"));
        md.push_str(&format!("- **Failed:** {failed}\n\n"));

        md.push_str("| Name | Type | Level | Status | Duration (ms) | Ops/sec | P95 (ms) |\n");
        md.push_str("|------|------|-------|--------|---------------|---------|----------|\n");
        for result in results {
            let p95 = result
                .duration_stats()
                .map_or_else(|| "N/A".to_string(), |stats| format!("{:.2}", stats.p95));
            md.push_str(&format!(
                "| {} | {} | {} | {} | {:.2} | {:.2} | {} |\n",
                md_cell(result.name()),
                result.config.kind,
                result.config.level,
                status(result.passed),
                result.duration_ms,
                result.ops_per_second,
                p95
            ));
        }

        let failures: Vec<&BenchmarkResult> = results.iter().filter(|r| !r.passed).collect();
        if !failures.is_empty() {
            md.push_str("\n## Failures\n\n");
            for result in failures {
                md.push_str(&format!("### {}\n\n", result.name()));
                if let Some(error) = &result.error {
                    push_error(&mut md, error);
                }
                let failed_checks: Vec<_> = result.failed_checks().collect();
                if !failed_checks.is_empty() {
                    md.push_str("**Failed thresholds:**\n\n");
                    for (metric, check) in failed_checks {
                        md.push_str(&format!("- {metric} {} (failed)\n", check.comparison));
                    }
                    md.push('\n');
                }
                if result.error.is_none() && result.thresholds_passed() {
                    md.push_str("Rejected by the case validator.\n\n");
                }
            }
        }
        md
    }

    pub fn generate_detailed_report(&self, results: &[BenchmarkResult]) -> String {
        let mut md = String::new();
        md.push_str("# Benchmark Detailed Report\n\n");
        md.push_str(&format!("Generated: {}\n\n", self.generated_at()));

        for result in results {
            let config = &result.config;
            md.push_str(&format!("## {}\n\n", result.name()));
            md.push_str(&format!("- **Type:** {}\n", config.kind));
            md.push_str(&format!("- **Level:** {}\n", config.level));
            md.push_str(&format!("- **Status:** {}\n", status(result.passed)));
            md.push_str(&format!(
                "- **Description:** {}\n",
                config.description.as_deref().unwrap_or("N/A")
            ));
            let tags = if config.tags.is_empty() {
                "N/A".to_string()
            } else {
                config.tags.join(", ")
            };
            md.push_str(&format!("- **Tags:** {tags}\n"));
            md.push_str(&format!("- **Run ID:** {}\n\n", result.run_id));

            md.push_str("### Execution\n\n");
            md.push_str(&format!("- **Duration:** {:.2} ms\n", result.duration_ms));
            md.push_str(&format!("- **Iterations:** {}\n", result.iterations));
            md.push_str(&format!("- **Operations:** {}\n", result.operations));
            md.push_str(&format!("- **Ops/sec:** {:.2}\n", result.ops_per_second));
            md.push_str(&format!("- **Started:** {}\n\n", iso_millis(result.timestamp_ms)));

            let env = &result.context.environment;
            md.push_str("### Environment\n\n");
            md.push_str(&format!("- **Runtime:** {}\n", env.runtime_version));
            md.push_str(&format!("- **Platform:** {} ({})\n", env.platform, env.arch));
            md.push_str(&format!(
                "- **CPU:** {} ({} cores, {} MHz)\n",
                env.cpu_info.model, env.cpu_info.cores, env.cpu_info.speed_mhz
            ));
            md.push_str(&format!(
                "- **Memory:** {} MB total, {} MB free\n\n",
                env.memory_info.total_mb, env.memory_info.free_mb
            ));

            if !result.metrics.is_empty() {
                md.push_str("### Metrics\n\n");
                for (name, stats) in &result.metrics {
                    push_metric(&mut md, name, stats);
                }
            }

            if let Some(validation) = &result.threshold_validation {
                md.push_str("### Thresholds\n\n");
                for (metric, checks) in validation {
                    for check in checks {
                        let icon = if check.passed { "✅" } else { "❌" };
                        md.push_str(&format!("- {icon} {metric} {}\n", check.comparison));
                    }
                }
                md.push('\n');
            }

            if let Some(error) = &result.error {
                md.push_str("### Error\n\n");
                push_error(&mut md, error);
            }

            md.push_str("---\n\n");
        }
        md
    }

    pub fn generate_comparison_report(
        &self,
        baseline: &[BenchmarkResult],
        current: &[BenchmarkResult],
    ) -> String {
        let comparison = compare(baseline, current);

        let mut md = String::new();
        md.push_str("# Benchmark Comparison\n\n");
        md.push_str(&format!("Generated: {}\n\n", self.generated_at()));
        md.push_str("| Name | Metric | Baseline | Current | Change | Change % |\n");
        md.push_str("|------|--------|----------|---------|--------|----------|\n");
        for case in &comparison.cases {
            push_delta_row(&mut md, &case.name, "ops/sec", &case.ops_per_second);
            if let Some(p95) = &case.p95_ms {
                push_delta_row(&mut md, &case.name, "p95 (ms)", p95);
            }
        }

        if !comparison.only_in_baseline.is_empty() {
            md.push_str("\n## Only in baseline\n\n");
            for name in &comparison.only_in_baseline {
                md.push_str(&format!("- {name}\n"));
            }
        }
        if !comparison.only_in_current.is_empty() {
            md.push_str("\n## Only in current\n\n");
            for name in &comparison.only_in_current {
                md.push_str(&format!("- {name}\n"));
            }
        }
        md
    }

    /// Render `results` in `format` without writing anything.
    pub fn render(&self, results: &[BenchmarkResult], format: ExportFormat) -> Result<String, StorageError> {
        Ok(match format {
            ExportFormat::Json => serde_json::to_string_pretty(results)?,
            ExportFormat::Csv => to_csv(results),
            ExportFormat::Html => to_html(&self.generate_detailed_report(results)),
            ExportFormat::Md => self.generate_detailed_report(results),
        })
    }

    /// Write `results` to `benchmark-report-<timestamp>.<ext>` in the output directory.
    pub fn export(&self, results: &[BenchmarkResult], format: ExportFormat) -> Result<PathBuf, StorageError> {
        let contents = self.render(results, format)?;
        let file_name = format!("benchmark-report-{}.{}", self.file_timestamp(), format.extension());
        let path = self.write(&file_name, contents.as_bytes())?;
        info!(path = %path.display(), %format, results = results.len(), "Benchmark report exported");
        Ok(path)
    }

    /// Log a one-case summary and persist the result as JSON.
    pub fn report(&self, result: &BenchmarkResult) -> Result<PathBuf, StorageError> {
        let summary = self.generate_summary(std::slice::from_ref(result));
        info!(case = %result.name(), passed = result.passed, "\n{summary}");

        let contents = serde_json::to_string_pretty(result)?;
        let file_name = format!(
            "{}-{}.json",
            file_safe(result.name()),
            self.file_timestamp()
        );
        self.write(&file_name, contents.as_bytes())
    }

    /// Log a summary of every result and persist them together as JSON.
    pub fn report_many(&self, results: &[BenchmarkResult]) -> Result<PathBuf, StorageError> {
        let summary = self.generate_summary(results);
        info!(results = results.len(), "\n{summary}");
        self.export(results, ExportFormat::Json)
    }

    fn write(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, StorageError> {
        self.sink.create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);
        self.sink.write_file(&path, contents)?;
        Ok(path)
    }

    fn generated_at(&self) -> String {
        self.clock.now_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn file_timestamp(&self) -> String {
        self.generated_at().replace([':', '.'], "-")
    }
}

impl fmt::Debug for BenchmarkReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkReporter")
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

fn status(passed: bool) -> &'static str {
    if passed { "✅ PASS" } else { "❌ FAIL" }
}

fn unit_for(metric: &str) -> &'static str {
    match metric {
        DURATION_METRIC => "ms",
        CPU_METRIC => "%",
        MEMORY_METRIC => "MB",
        _ if metric.ends_with("_ms") => "ms",
        _ => "",
    }
}

fn push_metric(md: &mut String, name: &str, stats: &MetricStats) {
    let unit = unit_for(name);
    if unit.is_empty() {
        md.push_str(&format!("#### {name}\n\n"));
    } else {
        md.push_str(&format!("#### {name} ({unit})\n\n"));
    }
    md.push_str(&format!("- **Min:** {:.2}\n", stats.min));
    md.push_str(&format!("- **Max:** {:.2}\n", stats.max));
    md.push_str(&format!("- **Mean:** {:.2}\n", stats.mean));
    md.push_str(&format!("- **Median:** {:.2}\n", stats.median));
    md.push_str(&format!("- **StdDev:** {:.2}\n", stats.std_dev));
    md.push_str(&format!("- **P95:** {:.2}\n", stats.p95));
    md.push_str(&format!("- **P99:** {:.2}\n\n", stats.p99));

    let chart = histogram(&stats.values);
    if !chart.is_empty() {
        md.push_str("```\n");
        md.push_str(&chart);
        md.push_str("```\n\n");
    }
}

fn push_error(md: &mut String, error: &ExecutionError) {
    md.push_str(&format!("**Error during {}:** {}\n\n", error.phase, error.message));
    if let Some(stack) = &error.stack {
        md.push_str("```\n");
        md.push_str(stack);
        md.push_str("\n```\n\n");
    }
}

fn push_delta_row(md: &mut String, name: &str, metric: &str, delta: &Delta) {
    md.push_str(&format!(
        "| {} | {metric} | {:.2} | {:.2} | {:+.2} | {} {:+.2}% |\n",
        md_cell(name),
        delta.baseline,
        delta.current,
        delta.diff,
        delta.direction.label(),
        delta.percent
    ));
}

fn md_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn iso_millis(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn to_csv(results: &[BenchmarkResult]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for result in results {
        let stats = result.duration_stats();
        let stat = |pick: fn(&MetricStats) -> f64| {
            stats.map_or_else(String::new, |s| format!("{:.2}", pick(s)))
        };
        let row = [
            csv_field(result.name()),
            result.config.kind.to_string(),
            result.config.level.to_string(),
            if result.passed { "PASS" } else { "FAIL" }.to_string(),
            format!("{:.2}", result.duration_ms),
            format!("{:.2}", result.ops_per_second),
            stat(|s| s.min),
            stat(|s| s.max),
            stat(|s| s.mean),
            stat(|s| s.median),
            stat(|s| s.std_dev),
            stat(|s| s.p95),
            stat(|s| s.p99),
            iso_millis(result.timestamp_ms),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

/// Quote fields containing commas, quotes or newlines, doubling inner quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_html(markdown: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Benchmark Report</title>\n<style>\n");
    html.push_str(HTML_STYLE);
    html.push_str("\n</style>\n</head>\n<body>\n");
    html.push_str(&markdown_to_html(markdown));
    html.push_str("</body>\n</html>\n");
    html
}

/// Converts the subset of Markdown the reports emit: headings, lists,
/// tables, fenced code, rules, bold and paragraphs.
fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut in_code = false;
    let mut in_list = false;
    let mut in_table = false;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            if in_code {
                html.push_str("</code></pre>\n");
            } else {
                close_blocks(&mut html, &mut in_list, &mut in_table);
                html.push_str("<pre><code>");
            }
            in_code = !in_code;
            continue;
        }
        if in_code {
            html.push_str(&html_escape::encode_text(line));
            html.push('\n');
            continue;
        }

        if trimmed.starts_with('|') {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
            if trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ')) {
                continue;
            }
            let cells: Vec<&str> = trimmed
                .trim_matches('|')
                .split(" | ")
                .map(str::trim)
                .collect();
            let tag = if in_table { "td" } else { "th" };
            if !in_table {
                html.push_str("<table>\n");
                in_table = true;
            }
            html.push_str("<tr>");
            for cell in cells {
                html.push_str(&format!("<{tag}>{}</{tag}>", inline(&cell.replace("\\|", "|"))));
            }
            html.push_str("</tr>\n");
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if in_table {
                html.push_str("</table>\n");
                in_table = false;
            }
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            html.push_str(&format!("<li>{}</li>\n", inline(item)));
            continue;
        }

        close_blocks(&mut html, &mut in_list, &mut in_table);
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "---" {
            html.push_str("<hr>\n");
            continue;
        }

        let level = trimmed.chars().take_while(|c| *c == '#').count();
        match trimmed[level..].strip_prefix(' ') {
            Some(text) if (1..=4).contains(&level) => {
                html.push_str(&format!("<h{level}>{}</h{level}>\n", inline(text)));
            }
            _ => html.push_str(&format!("<p>{}</p>\n", inline(trimmed))),
        }
    }

    if in_code {
        html.push_str("</code></pre>\n");
    }
    close_blocks(&mut html, &mut in_list, &mut in_table);
    html
}

fn close_blocks(html: &mut String, in_list: &mut bool, in_table: &mut bool) {
    if *in_list {
        html.push_str("</ul>\n");
        *in_list = false;
    }
    if *in_table {
        html.push_str("</table>\n");
        *in_table = false;
    }
}

/// Escape text and turn balanced `**` pairs into `<strong>`.
fn inline(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    let parts: Vec<&str> = escaped.split("**").collect();
    let balanced = parts.len() % 2 == 1;

    let mut out = String::with_capacity(escaped.len());
    for (i, part) in parts.iter().enumerate() {
        let is_bold = i % 2 == 1;
        if is_bold && (balanced || i + 1 < parts.len()) {
            out.push_str("<strong>");
            out.push_str(part);
            out.push_str("</strong>");
        } else {
            if is_bold {
                out.push_str("**");
            }
            out.push_str(part);
        }
    }
    out
}
