//! `qcheck check` - classify a single value

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::record::coerce_input;
use crate::core::rule::ToleranceRule;
use crate::core::status::{Status, StatusKind};
use crate::entities::definition::EvaluationKind;
use crate::entities::tolerance::{split_choices, Reference, Tolerance, ToleranceMode};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Value to classify
    #[arg(allow_negative_numbers = true)]
    pub value: String,

    /// Measurement type (boolean, simple, multchoice, ...)
    #[arg(long, short = 't', default_value = "simple")]
    pub kind: EvaluationKind,

    /// Reference value (for boolean: 1 = yes, 0 = no)
    #[arg(long, short = 'r', allow_negative_numbers = true)]
    pub reference: Option<f64>,

    /// Tolerance mode
    #[arg(long, short = 'm', default_value = "absolute")]
    pub mode: ToleranceMode,

    /// Action low bound
    #[arg(long, allow_negative_numbers = true)]
    pub al: Option<f64>,

    /// Tolerance low bound
    #[arg(long, allow_negative_numbers = true)]
    pub tl: Option<f64>,

    /// Tolerance high bound
    #[arg(long, allow_negative_numbers = true)]
    pub th: Option<f64>,

    /// Action high bound
    #[arg(long, allow_negative_numbers = true)]
    pub ah: Option<f64>,

    /// Passing choices (comma separated)
    #[arg(long = "pass")]
    pub pass_choices: Option<String>,

    /// Tolerance choices (comma separated)
    #[arg(long = "tol-choices")]
    pub tol_choices: Option<String>,

    /// Show only pass/fail
    #[arg(long)]
    pub pass_fail_only: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    kind: EvaluationKind,
    status: StatusKind,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<f64>,
}

pub fn run(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let labels = config.labels();
    let pass_fail_only = args.pass_fail_only || config.pass_fail_only.unwrap_or(false);

    let rule = build_rule(&args);
    let status = match coerce_input(args.kind, &args.value) {
        Some(value) => rule.classify_with(&value, &labels),
        None => Status::not_done(&labels),
    };
    let shown = status.display(pass_fail_only, &labels);

    let output = CheckOutput {
        kind: args.kind,
        status: shown.kind,
        message: &shown.text,
        diff: status.diff,
    };

    match global
        .format
        .resolve(config.default_format.as_deref(), OutputFormat::Tsv)
    {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?)
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&output).into_diagnostic()?),
        _ => {
            let styled = match shown.kind {
                StatusKind::Action => style(&shown.text).red().bold(),
                StatusKind::AtTolerance => style(&shown.text).yellow(),
                StatusKind::WithinTolerance => style(&shown.text).green(),
                _ => style(&shown.text).dim(),
            };
            println!("{}", styled);
        }
    }
    Ok(())
}

fn build_rule(args: &CheckArgs) -> ToleranceRule {
    let reference = args.reference.map(|value| match args.kind {
        EvaluationKind::Boolean => Reference::boolean(value != 0.0),
        _ => Reference::numerical(value),
    });

    let tolerance = if args.kind.is_choice() {
        let pass = args
            .pass_choices
            .as_deref()
            .map(split_choices)
            .unwrap_or_default();
        let tol = args
            .tol_choices
            .as_deref()
            .map(split_choices)
            .unwrap_or_default();
        Some(Tolerance::choices(pass.as_slice(), tol.as_slice()))
    } else if [args.al, args.tl, args.th, args.ah].iter().any(Option::is_some) {
        Some(Tolerance::numeric(args.mode, args.al, args.tl, args.th, args.ah))
    } else {
        None
    };

    ToleranceRule::new(args.kind, reference, tolerance)
}
