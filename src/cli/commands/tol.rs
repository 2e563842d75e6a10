//! `qcheck tol` - inspect a tolerance definition

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::entities::tolerance::{split_choices, Tolerance, ToleranceLimits, ToleranceMode};

#[derive(Args, Debug)]
pub struct TolArgs {
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

    /// Reference value to compute absolute limits for
    #[arg(long, short = 'r', allow_negative_numbers = true)]
    pub reference: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TolOutput {
    tolerance: Tolerance,
    display: String,
    problems: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limits: Option<ToleranceLimits>,
}

pub fn run(args: TolArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let tolerance = build_tolerance(&args);
    let problems: Vec<String> = tolerance.validate().iter().map(|e| e.to_string()).collect();
    let limits = args
        .reference
        .filter(|_| !tolerance.is_choice())
        .map(|r| tolerance.limits_for(r));

    let output = TolOutput {
        display: tolerance.to_string(),
        tolerance,
        problems,
        limits,
    };

    match global
        .format
        .resolve(config.default_format.as_deref(), OutputFormat::Tsv)
    {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?)
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&output).into_diagnostic()?),
        _ => print_human(&output, args.reference),
    }

    if !output.problems.is_empty() {
        return Err(miette::miette!(
            "tolerance has {} problem(s)",
            output.problems.len()
        ));
    }
    Ok(())
}

fn build_tolerance(args: &TolArgs) -> Tolerance {
    let has_choices = args.pass_choices.is_some() || args.tol_choices.is_some();
    if args.mode == ToleranceMode::MultipleChoice || (has_choices && no_bounds(args)) {
        let pass = args.pass_choices.as_deref().map(split_choices).unwrap_or_default();
        let tol = args.tol_choices.as_deref().map(split_choices).unwrap_or_default();
        let mut tolerance = Tolerance::choices(pass.as_slice(), tol.as_slice());
        // keep any bounds given so validation can report them
        tolerance.act_low = args.al;
        tolerance.tol_low = args.tl;
        tolerance.tol_high = args.th;
        tolerance.act_high = args.ah;
        return tolerance;
    }

    let mut tolerance = Tolerance::numeric(args.mode, args.al, args.tl, args.th, args.ah);
    tolerance.pass_choices = args.pass_choices.as_deref().map(split_choices).unwrap_or_default();
    tolerance.tol_choices = args.tol_choices.as_deref().map(split_choices).unwrap_or_default();
    tolerance
}

fn no_bounds(args: &TolArgs) -> bool {
    [args.al, args.tl, args.th, args.ah].iter().all(Option::is_none)
}

fn print_human(output: &TolOutput, reference: Option<f64>) {
    println!("{}", style(&output.display).bold());

    if let (Some(reference), Some(limits)) = (reference, output.limits) {
        println!();
        println!("Limits around {}:", style(reference).cyan());
        let rows = [
            ("action low", limits.act_low),
            ("tolerance low", limits.tol_low),
            ("tolerance high", limits.tol_high),
            ("action high", limits.act_high),
        ];
        for (label, value) in rows {
            let shown = value.map_or("--".to_string(), |v| format!("{:.3}", v));
            println!("  {:<16}{}", label, shown);
        }
    }

    if output.problems.is_empty() {
        println!("{} tolerance is valid", style("✓").green());
    } else {
        for problem in &output.problems {
            println!("{} {}", style("✗").red(), problem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TolArgs {
        TolArgs {
            mode: ToleranceMode::Absolute,
            al: None,
            tl: None,
            th: None,
            ah: None,
            pass_choices: None,
            tol_choices: None,
            reference: None,
        }
    }

    #[test]
    fn test_numeric_tolerance() {
        let mut a = args();
        a.al = Some(-2.0);
        a.ah = Some(2.0);
        let tol = build_tolerance(&a);
        assert!(!tol.is_choice());
        assert!(tol.validate().is_empty());
    }

    #[test]
    fn test_choices_without_bounds_become_choice_tolerance() {
        let mut a = args();
        a.pass_choices = Some("A,B".to_string());
        let tol = build_tolerance(&a);
        assert!(tol.is_choice());
        assert_eq!(tol.pass_choices, vec!["A", "B"]);
    }

    #[test]
    fn test_mixed_definition_is_invalid() {
        let mut a = args();
        a.mode = ToleranceMode::MultipleChoice;
        a.pass_choices = Some("A".to_string());
        a.tl = Some(-1.0);
        assert!(!build_tolerance(&a).validate().is_empty());
    }
}
