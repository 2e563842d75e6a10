//! `qcheck validate` command - check session files for definition problems

use console::style;
use miette::Result;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::cli::GlobalOpts;
use crate::entities::definition::EvaluationKind;
use crate::entities::session::SessionFile;
use crate::yaml::load_session;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Session files to validate
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Strict mode - warnings become errors
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
}

/// One problem found in a session file
#[derive(Debug, Clone, PartialEq)]
struct Finding {
    severity: Severity,
    slug: Option<String>,
    message: String,
}

impl Finding {
    fn error(slug: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            slug: Some(slug.to_string()),
            message: message.into(),
        }
    }

    fn warning(slug: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            slug: Some(slug.to_string()),
            message: message.into(),
        }
    }
}

/// Validation statistics
#[derive(Default)]
struct ValidationStats {
    files_checked: usize,
    files_passed: usize,
    files_failed: usize,
    total_errors: usize,
    total_warnings: usize,
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let mut stats = ValidationStats::default();

    if !global.quiet {
        println!(
            "{} Validating {} file(s)...\n",
            style("→").blue(),
            args.paths.len()
        );
    }

    for path in &args.paths {
        stats.files_checked += 1;

        let session = match load_session(path) {
            Ok(session) => session,
            Err(e) => {
                stats.files_failed += 1;
                stats.total_errors += 1;
                println!("{} {}", style("✗").red(), path.display());
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };

        let findings = check_session(&session);
        let errors = findings
            .iter()
            .filter(|f| f.severity == Severity::Error || args.strict)
            .count();
        let warnings = findings.len() - errors;
        stats.total_errors += errors;
        stats.total_warnings += warnings;

        if errors > 0 {
            stats.files_failed += 1;
            println!("{} {}", style("✗").red(), path.display());
        } else {
            stats.files_passed += 1;
            if warnings > 0 {
                println!("{} {}", style("!").yellow(), path.display());
            } else if !global.quiet {
                println!("{} {}", style("✓").green(), path.display());
            }
        }

        for finding in &findings {
            let marker = match finding.severity {
                Severity::Error => style("error").red(),
                Severity::Warning if args.strict => style("error").red(),
                Severity::Warning => style("warning").yellow(),
            };
            match &finding.slug {
                Some(slug) => println!("    {} {}: {}", marker, style(slug).cyan(), finding.message),
                None => println!("    {} {}", marker, finding.message),
            }
        }
    }

    if !global.quiet {
        println!();
        println!("{}", style("─".repeat(60)).dim());
        println!("{}", style("Validation Summary").bold());
        println!("{}", style("─".repeat(60)).dim());
        println!("  Files checked:  {}", style(stats.files_checked).cyan());
        println!("  Files passed:   {}", style(stats.files_passed).green());
        println!("  Files failed:   {}", style(stats.files_failed).red());
        println!("  Total errors:   {}", style(stats.total_errors).red());
        if stats.total_warnings > 0 {
            println!("  Total warnings: {}", style(stats.total_warnings).yellow());
        }
        println!();
    }

    if stats.files_failed > 0 {
        Err(miette::miette!(
            "Validation failed: {} file(s) have errors",
            stats.files_failed
        ))
    } else {
        if !global.quiet {
            println!("{} All files passed validation!", style("✓").green().bold());
        }
        Ok(())
    }
}

/// Check a parsed session for problems the engine would silently tolerate
fn check_session(session: &SessionFile) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut slugs = HashSet::new();
    let mut ids = HashSet::new();

    for def in &session.measurements {
        let slug = def.slug.as_str();
        if !slugs.insert(slug) {
            findings.push(Finding::error(slug, "duplicate slug"));
        }
        if !ids.insert(def.id) {
            findings.push(Finding::error(slug, format!("duplicate id {}", def.id)));
        }

        if let Some(tolerance) = &def.tolerance {
            for problem in tolerance.validate() {
                findings.push(Finding::error(slug, problem.to_string()));
            }
            if def.kind.is_choice() && !tolerance.is_choice() {
                findings.push(Finding::error(
                    slug,
                    format!("{} measurement has a {} tolerance", def.kind, tolerance.mode),
                ));
            }
            if def.kind.is_numeric() && tolerance.is_choice() {
                findings.push(Finding::warning(
                    slug,
                    "numeric measurement has a multiple choice tolerance and is never judged",
                ));
            }
            if def.kind.is_numeric() && def.reference.is_none() {
                findings.push(Finding::warning(slug, "tolerance set but no reference"));
            }
        }

        if def.kind == EvaluationKind::Constant && def.constant_value.is_none() {
            findings.push(Finding::warning(slug, "constant measurement without a constant value"));
        }
    }

    for slug in session.values.keys() {
        if !slugs.contains(slug.as_str()) {
            findings.push(Finding::warning(slug, "value for unknown measurement"));
        }
    }

    for slug in session.composite_results.keys() {
        let composite = session
            .measurements
            .iter()
            .any(|d| d.slug == *slug && d.kind.is_composite());
        if !composite {
            findings.push(Finding::warning(
                slug,
                "composite result for a measurement that is not composite",
            ));
        }
    }

    findings
}
