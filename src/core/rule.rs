//! Tolerance rules - pure classification of a value for one measurement
//!
//! A [`ToleranceRule`] bundles the evaluation kind, reference and tolerance
//! of a measurement definition. It is immutable and shared between every
//! record evaluating that definition.
//!
//! Numeric classification tests the action band first, then the tolerance
//! band. A difference sitting on a bound (within [`EPSILON`]) belongs to the
//! worse region: on an action bound is `Action`, on a tolerance bound is
//! `AtTolerance`.

use tracing::warn;

use crate::core::status::{Status, StatusKind, StatusLabels};
use crate::entities::definition::{EvaluationKind, MeasurementDefinition};
use crate::entities::tolerance::{Reference, Tolerance, ToleranceMode};
use crate::entities::value::MeasurementValue;

/// Absolute slack used for floating point comparisons
pub const EPSILON: f64 = 1e-10;

/// Compare two floats, absorbing round-off
pub fn almost_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

/// Classifier for one measurement definition
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceRule {
    kind: EvaluationKind,
    reference: Option<Reference>,
    tolerance: Option<Tolerance>,
}

impl ToleranceRule {
    pub fn new(
        kind: EvaluationKind,
        reference: Option<Reference>,
        tolerance: Option<Tolerance>,
    ) -> Self {
        Self {
            kind,
            reference,
            tolerance,
        }
    }

    pub fn from_definition(definition: &MeasurementDefinition) -> Self {
        Self::new(
            definition.kind,
            definition.reference,
            definition.tolerance.clone(),
        )
    }

    pub fn kind(&self) -> EvaluationKind {
        self.kind
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn tolerance(&self) -> Option<&Tolerance> {
        self.tolerance.as_ref()
    }

    /// Classify `value` with the default labels
    pub fn classify(&self, value: &MeasurementValue) -> Status {
        self.classify_with(value, &StatusLabels::default())
    }

    /// Classify `value`
    ///
    /// A value whose shape does not fit the evaluation kind is reported as
    /// not done rather than as an error.
    pub fn classify_with(&self, value: &MeasurementValue, labels: &StatusLabels) -> Status {
        match (self.kind, value) {
            (EvaluationKind::Boolean, MeasurementValue::Number(v)) => {
                self.classify_boolean(*v, labels)
            }
            (kind, MeasurementValue::Number(v)) if kind.is_numeric() => {
                self.classify_numeric(*v, labels)
            }
            (kind, MeasurementValue::Text(s)) if kind.is_choice() => {
                self.classify_choice(s, labels)
            }
            (EvaluationKind::Upload, MeasurementValue::Upload(_)) => Status::done(labels),
            (kind, other) => {
                warn!(kind = %kind, value = %other, "value does not match measurement kind");
                Status::not_done(labels)
            }
        }
    }

    fn classify_boolean(&self, value: f64, labels: &StatusLabels) -> Status {
        let Some(reference) = self.reference else {
            return Status::no_tolerance(labels);
        };

        if almost_equal(value, reference.value) {
            Status::new(StatusKind::WithinTolerance, Some(0.0), labels.ok.clone())
        } else {
            Status::new(StatusKind::Action, Some(1.0), labels.action.clone())
        }
    }

    fn classify_choice(&self, value: &str, labels: &StatusLabels) -> Status {
        if value.is_empty() {
            return Status::not_done(labels);
        }

        let tolerance = match &self.tolerance {
            Some(t) if !t.pass_choices.is_empty() => t,
            _ => return Status::no_tolerance(labels),
        };

        let kind = if tolerance.pass_choices.iter().any(|c| c == value) {
            StatusKind::WithinTolerance
        } else if tolerance.tol_choices.iter().any(|c| c == value) {
            StatusKind::AtTolerance
        } else {
            StatusKind::Action
        };

        Status::plain(kind, labels)
    }

    fn classify_numeric(&self, value: f64, labels: &StatusLabels) -> Status {
        let (reference, tolerance) = match (&self.reference, &self.tolerance) {
            (Some(r), Some(t)) if !t.is_choice() => (r, t),
            _ => return Status::no_tolerance(labels),
        };

        let diff = match tolerance.mode {
            ToleranceMode::Percent => {
                if reference.value == 0.0 {
                    return Status::new(
                        StatusKind::Action,
                        None,
                        format!("{} (Zero ref with % diff tol)", labels.action),
                    );
                }
                100.0 * (value - reference.value) / reference.value
            }
            _ => value - reference.value,
        };

        let b = tolerance.bounds();

        let on_action_border = almost_equal(b.act_low, diff) || almost_equal(b.act_high, diff);
        let on_tolerance_border = almost_equal(b.tol_low, diff) || almost_equal(b.tol_high, diff);

        let inside_action = b.act_low <= diff && diff <= b.act_high;
        let inside_tolerance = b.tol_low < diff && diff < b.tol_high;

        let kind = if !inside_action || on_action_border {
            StatusKind::Action
        } else if !inside_tolerance || on_tolerance_border {
            StatusKind::AtTolerance
        } else {
            StatusKind::WithinTolerance
        };

        let message = format!(
            "{} {}",
            labels.label(kind),
            format_diff(diff, tolerance.mode)
        );
        Status::new(kind, Some(diff), message)
    }
}

/// Parenthesised difference: one decimal and `%` in percent mode, two decimals otherwise
pub fn format_diff(diff: f64, mode: ToleranceMode) -> String {
    // avoid rendering "-0.00"
    let diff = if diff == 0.0 { 0.0 } else { diff };
    match mode {
        ToleranceMode::Percent => format!("({:.1}%)", diff),
        _ => format!("({:.2})", diff),
    }
}
