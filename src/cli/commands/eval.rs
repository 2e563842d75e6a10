//! `qcheck eval` - evaluate a session file
//!
//! Loads definitions, persisted values and metadata from a session file,
//! applies the command line edits as one turn, settles composite
//! recomputation against the composite results stored in the file and
//! prints every measurement's status.

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::helpers::{format_value, parse_assignment};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::composite::ReplayService;
use crate::core::config::Config;
use crate::core::record::UploadState;
use crate::core::set::{
    CategoryFilter, MeasurementSet, SessionContext, SessionEvent, SessionListener,
    SessionSettings, SubmissionEntry,
};
use crate::core::status::StatusKind;
use crate::core::upload::LocalUploadService;
use crate::entities::value::MeasurementValue;
use crate::yaml::load_session;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Session file to evaluate
    pub session: PathBuf,

    /// Enter a value (SLUG=VALUE, repeatable)
    #[arg(long = "set", value_name = "SLUG=VALUE")]
    pub set: Vec<String>,

    /// Skip a measurement (repeatable)
    #[arg(long = "skip", value_name = "SLUG")]
    pub skip: Vec<String>,

    /// Un-skip a measurement (repeatable)
    #[arg(long = "unskip", value_name = "SLUG")]
    pub unskip: Vec<String>,

    /// Comment on a measurement (SLUG=TEXT, repeatable)
    #[arg(long = "comment", value_name = "SLUG=TEXT")]
    pub comment: Vec<String>,

    /// Attach a file to an upload measurement (SLUG=PATH, relative to the session file)
    #[arg(long = "attach", value_name = "SLUG=PATH")]
    pub attach: Vec<String>,

    /// Only perform these categories (comma separated, or "all")
    #[arg(long, short = 'c')]
    pub categories: Option<String>,

    /// Show only pass/fail
    #[arg(long)]
    pub pass_fail_only: bool,

    /// Exit with an error when any measurement is at action level
    #[arg(long)]
    pub fail_on_action: bool,

    /// Print the submission payload instead of statuses
    #[arg(long)]
    pub submission: bool,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("slug", "SLUG", 20),
    ColumnDef::new("name", "NAME", 28),
    ColumnDef::new("category", "CATEGORY", 14),
    ColumnDef::new("kind", "TYPE", 11),
    ColumnDef::new("value", "VALUE", 16),
    ColumnDef::new("status", "STATUS", 24),
    ColumnDef::new("state", "STATE", 8),
];

/// One measurement in structured output
#[derive(Debug, Serialize)]
struct EvalRow {
    slug: String,
    name: String,
    category: String,
    kind: String,
    value: Option<MeasurementValue>,
    status: StatusKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<f64>,
    state: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
}

#[derive(Debug, Serialize)]
struct EvalReport {
    has_failing: bool,
    submission_enabled: bool,
    missing_comments: Vec<String>,
    measurements: Vec<EvalRow>,
}

/// Logs aggregate updates
struct LogListener;

impl SessionListener for LogListener {
    fn qa_updated(&mut self, has_failing: bool) {
        debug!(has_failing, "aggregate status updated");
    }

    fn submission_changed(&mut self, enabled: bool) {
        debug!(enabled, "submission gate changed");
    }
}

pub fn run(args: EvalArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let session = load_session(&args.session)?;

    let mut settings = SessionSettings::from_config(&config, &session.options);
    if args.pass_fail_only {
        settings.pass_fail_only = true;
    }
    let context = SessionContext {
        session_id: session.session_id.clone(),
        meta: session.meta.clone(),
        settings,
    };

    let mut set = MeasurementSet::initialize(
        session.measurements,
        session.values,
        context,
        Box::new(LogListener),
    )
    .into_diagnostic()?;

    set.dispatch_turn(build_events(&args)?).into_diagnostic()?;

    let base_dir = args
        .session
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut uploads = LocalUploadService::new(&base_dir);
    for raw in &args.attach {
        let (slug, file) = parse_assignment(raw)?;
        let path = base_dir.join(&file);
        let bytes = std::fs::read(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot read attachment {}", path.display()))?;
        set.upload_with(&slug, &file, bytes, &mut uploads)
            .into_diagnostic()?;
        if let Some(UploadState::Failed { error }) = set.get(&slug).map(|r| r.upload_state()) {
            if !global.quiet {
                eprintln!("{} upload for {} failed: {}", style("!").yellow(), style(&slug).cyan(), error);
            }
        }
    }

    let mut composites = ReplayService::new(session.composite_results);
    set.settle_with(&mut composites);

    let format = global
        .format
        .resolve(config.default_format.as_deref(), OutputFormat::Tsv);

    if args.submission {
        print_submission(&set.submission(), format)?;
    } else {
        print_statuses(&set, format, global.quiet)?;
    }

    if args.fail_on_action && set.has_failing() {
        return Err(miette::miette!(
            "{} measurement(s) at action level",
            set.summary().action
        ));
    }
    Ok(())
}

/// Command line edits as the events of one turn
fn build_events(args: &EvalArgs) -> Result<Vec<SessionEvent>> {
    let mut events = Vec::new();
    for raw in &args.set {
        let (slug, raw) = parse_assignment(raw)?;
        events.push(SessionEvent::Input { slug, raw });
    }
    for raw in &args.comment {
        let (slug, text) = parse_assignment(raw)?;
        events.push(SessionEvent::Comment { slug, text });
    }
    for slug in &args.skip {
        events.push(SessionEvent::Skip {
            slug: slug.clone(),
            skipped: true,
        });
    }
    for slug in &args.unskip {
        events.push(SessionEvent::Skip {
            slug: slug.clone(),
            skipped: false,
        });
    }
    if let Some(categories) = &args.categories {
        let filter = categories
            .parse::<CategoryFilter>()
            .unwrap_or_default();
        events.push(SessionEvent::Filter(filter));
    }
    Ok(events)
}

fn print_statuses(set: &MeasurementSet, format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let report = EvalReport {
                has_failing: set.has_failing(),
                submission_enabled: set.submission_enabled(),
                missing_comments: set.missing_comments().iter().map(|s| s.to_string()).collect(),
                measurements: set
                    .records()
                    .iter()
                    .map(|record| {
                        let status = record.current_status();
                        let shown = set.display_status(record);
                        EvalRow {
                            slug: record.slug().to_string(),
                            name: record.definition().name.clone(),
                            category: record.definition().category.clone(),
                            kind: record.kind().to_string(),
                            value: record.value().cloned(),
                            status: shown.kind,
                            message: shown.text,
                            diff: status.diff,
                            state: record.state().to_string(),
                            comment: record.comment().to_string(),
                        }
                    })
                    .collect(),
            };
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                print!("{}", serde_yml::to_string(&report).into_diagnostic()?);
            }
        }
        _ => {
            let rows: Vec<TableRow> = set
                .records()
                .iter()
                .map(|record| {
                    let definition = record.definition();
                    TableRow::new()
                        .cell("slug", CellValue::Slug(record.slug().to_string()))
                        .cell("name", CellValue::Text(definition.name.clone()))
                        .cell("category", CellValue::Text(definition.category.clone()))
                        .cell("kind", CellValue::Kind(record.kind()))
                        .cell("value", CellValue::Text(format_value(record.value())))
                        .cell("status", CellValue::Status(set.display_status(record)))
                        .cell("state", CellValue::State(record.state()))
                })
                .collect();
            print!("{}", TableFormatter::new(COLUMNS).render(&rows, format));

            if !quiet && format == OutputFormat::Tsv {
                print_summary(set);
            }
        }
    }
    Ok(())
}

fn print_summary(set: &MeasurementSet) {
    let summary = set.summary();
    println!();
    println!(
        "{} measurement(s): {} ok, {} tolerance, {} action, {} not done",
        style(summary.total).cyan(),
        style(summary.ok + summary.done + summary.no_tol).green(),
        style(summary.tolerance).yellow(),
        style(summary.action).red(),
        style(summary.not_done).dim()
    );

    let missing = set.missing_comments();
    if !missing.is_empty() {
        println!(
            "{} skipped without comment: {}",
            style("!").yellow(),
            missing.join(", ")
        );
    }

    if set.has_failing() {
        println!("{} Session has failing measurements", style("✗").red().bold());
    } else {
        println!("{} No failing measurements", style("✓").green());
    }
}

fn print_submission(entries: &[SubmissionEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(entries).into_diagnostic()?),
        _ => println!("{}", serde_json::to_string_pretty(entries).into_diagnostic()?),
    }
    Ok(())
}
