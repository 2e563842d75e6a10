//! Table formatting for measurement listings
//!
//! Commands build [`TableRow`]s of typed [`CellValue`]s and hand them to a
//! [`TableFormatter`], which renders TSV (colored on a terminal), CSV or
//! Markdown.

use console::style;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{escape_csv, truncate_str};
use crate::cli::OutputFormat;
use crate::core::record::RecordState;
use crate::core::status::{DisplayStatus, StatusKind};
use crate::entities::definition::EvaluationKind;

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Measurement slug (cyan)
    Slug(String),
    /// Plain text, truncated in TSV
    Text(String),
    /// Evaluation kind
    Kind(EvaluationKind),
    /// Status colored by kind
    Status(DisplayStatus),
    /// Record lifecycle state
    State(RecordState),
    /// Optional float with precision ("-" when absent)
    Float(Option<f64>, usize),
    Empty,
}

impl CellValue {
    /// Format for TSV output (with colors if terminal)
    pub fn format_tsv(&self, width: usize) -> String {
        match self {
            CellValue::Slug(slug) => {
                format!("{:<width$}", style(truncate_str(slug, width)).cyan(), width = width)
            }
            CellValue::Text(s) => {
                format!("{:<width$}", truncate_str(s, width.saturating_sub(2)), width = width)
            }
            CellValue::Kind(kind) => format!("{:<width$}", kind.as_str(), width = width),
            CellValue::Status(status) => {
                let text = truncate_str(&status.text, width);
                let styled = match status.kind {
                    StatusKind::Action => style(text).red().bold(),
                    StatusKind::AtTolerance => style(text).yellow(),
                    StatusKind::WithinTolerance => style(text).green(),
                    StatusKind::Done => style(text).cyan(),
                    StatusKind::NoTolerance => style(text).white(),
                    StatusKind::NotDone => style(text).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::State(state) => {
                let s = state.to_string();
                let styled = match state {
                    RecordState::Active => style(s).white(),
                    RecordState::Skipped => style(s).yellow(),
                    RecordState::Hidden => style(s).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::Float(value, precision) => match value {
                Some(v) => format!("{:>width$.prec$}", v, width = width, prec = precision),
                None => format!("{:>width$}", "-", width = width),
            },
            CellValue::Empty => format!("{:<width$}", "-", width = width),
        }
    }

    /// Format for CSV output (RFC 4180, no colors)
    pub fn format_csv(&self) -> String {
        match self {
            CellValue::Float(None, _) | CellValue::Empty => String::new(),
            other => escape_csv(&other.raw()),
        }
    }

    /// Format for Markdown output (escaped pipes)
    pub fn format_md(&self) -> String {
        let raw = match self {
            CellValue::Status(status) if status.kind == StatusKind::Action => {
                format!("**{}**", status.text)
            }
            CellValue::Float(None, _) | CellValue::Empty => "-".to_string(),
            other => other.raw(),
        };
        raw.replace('|', "\\|")
    }

    /// Raw string value
    pub fn raw(&self) -> String {
        match self {
            CellValue::Slug(s) | CellValue::Text(s) => s.clone(),
            CellValue::Kind(kind) => kind.as_str().to_string(),
            CellValue::Status(status) => status.text.clone(),
            CellValue::State(state) => state.to_string(),
            CellValue::Float(value, precision) => value
                .map(|v| format!("{:.prec$}", v, prec = precision))
                .unwrap_or_default(),
            CellValue::Empty => String::new(),
        }
    }

    /// Display width of the content (for column sizing)
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Float(None, _) | CellValue::Empty => 1,
            other => other.raw().chars().count(),
        }
    }
}

/// Column definition with header label and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: &'static str,
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, width: usize) -> Self {
        Self { key, header, width }
    }
}

/// A row of cell values
#[derive(Debug, Clone, Default)]
pub struct TableRow {
    pub cells: Vec<(&'static str, CellValue)>,
}

impl TableRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(mut self, key: &'static str, value: CellValue) -> Self {
        self.cells.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Renders rows in one of the tabular formats
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef]) -> Self {
        Self { columns }
    }

    /// Render `rows`; non-tabular formats fall back to TSV
    pub fn render(&self, rows: &[TableRow], format: OutputFormat) -> String {
        match format {
            OutputFormat::Csv => self.render_csv(rows),
            OutputFormat::Md => self.render_md(rows),
            _ => self.render_tsv(rows),
        }
    }

    /// Column widths sized to content, capped at each column's width
    fn widths(&self, rows: &[TableRow]) -> Vec<usize> {
        self.columns
            .iter()
            .map(|col| {
                let content = rows
                    .iter()
                    .filter_map(|r| r.get(col.key))
                    .map(CellValue::display_width)
                    .max()
                    .unwrap_or(0);
                col.header.len().max(content + 2).min(col.width)
            })
            .collect()
    }

    fn render_tsv(&self, rows: &[TableRow]) -> String {
        let widths = self.widths(rows);
        let mut out = String::new();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<width$}", style(col.header).bold(), width = *w))
            .collect();
        out.push_str(header.join(" ").trim_end());
        out.push('\n');
        out.push_str(&"-".repeat(widths.iter().sum::<usize>() + widths.len().saturating_sub(1)));
        out.push('\n');

        for row in rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .zip(&widths)
                .map(|(col, w)| {
                    row.get(col.key)
                        .unwrap_or(&CellValue::Empty)
                        .format_tsv(*w)
                })
                .collect();
            out.push_str(cells.join(" ").trim_end());
            out.push('\n');
        }
        out
    }

    fn render_csv(&self, rows: &[TableRow]) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self.columns.iter().map(|c| c.key).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|col| row.get(col.key).map(CellValue::format_csv).unwrap_or_default())
                .collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    fn render_md(&self, rows: &[TableRow]) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.header.to_string()));
        for row in rows {
            builder.push_record(self.columns.iter().map(|col| {
                row.get(col.key)
                    .map(CellValue::format_md)
                    .unwrap_or_else(|| "-".to_string())
            }));
        }
        let mut out = builder.build().with(Style::markdown()).to_string();
        out.push('\n');
        out
    }
}
