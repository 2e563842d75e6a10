//! Measurement status values and their display labels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification outcome for a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    #[serde(rename = "not_done")]
    NotDone,
    #[serde(rename = "no_tol")]
    NoTolerance,
    #[serde(rename = "ok")]
    WithinTolerance,
    #[serde(rename = "tolerance")]
    AtTolerance,
    #[serde(rename = "action")]
    Action,
    #[serde(rename = "done")]
    Done,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::NotDone => "not_done",
            StatusKind::NoTolerance => "no_tol",
            StatusKind::WithinTolerance => "ok",
            StatusKind::AtTolerance => "tolerance",
            StatusKind::Action => "action",
            StatusKind::Done => "done",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display text for each status, overridable from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLabels {
    pub not_done: String,
    pub done: String,
    pub ok: String,
    pub tolerance: String,
    pub action: String,
    pub no_tol: String,
    pub fail: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            not_done: "Not Done".to_string(),
            done: "Done".to_string(),
            ok: "OK".to_string(),
            tolerance: "Tolerance".to_string(),
            action: "Action".to_string(),
            no_tol: "No Tol Set".to_string(),
            fail: "Fail".to_string(),
        }
    }
}

impl StatusLabels {
    pub fn label(&self, kind: StatusKind) -> &str {
        match kind {
            StatusKind::NotDone => &self.not_done,
            StatusKind::NoTolerance => &self.no_tol,
            StatusKind::WithinTolerance => &self.ok,
            StatusKind::AtTolerance => &self.tolerance,
            StatusKind::Action => &self.action,
            StatusKind::Done => &self.done,
        }
    }
}

/// Result of classifying a value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub kind: StatusKind,

    /// Signed difference from the reference (numeric and boolean kinds)
    pub diff: Option<f64>,

    pub message: String,
}

impl Status {
    pub fn new(kind: StatusKind, diff: Option<f64>, message: impl Into<String>) -> Self {
        Self {
            kind,
            diff,
            message: message.into(),
        }
    }

    /// Status carrying only the label for `kind`
    pub fn plain(kind: StatusKind, labels: &StatusLabels) -> Self {
        Self::new(kind, None, labels.label(kind))
    }

    pub fn not_done(labels: &StatusLabels) -> Self {
        Self::plain(StatusKind::NotDone, labels)
    }

    pub fn no_tolerance(labels: &StatusLabels) -> Self {
        Self::plain(StatusKind::NoTolerance, labels)
    }

    pub fn done(labels: &StatusLabels) -> Self {
        Self::plain(StatusKind::Done, labels)
    }

    pub fn is_failing(&self) -> bool {
        self.kind == StatusKind::Action
    }

    /// Presentation of this status, optionally narrowed to pass/fail
    ///
    /// Never alters the status itself; aggregation always works on the
    /// unnarrowed kind.
    pub fn display(&self, pass_fail_only: bool, labels: &StatusLabels) -> DisplayStatus {
        if !pass_fail_only {
            return DisplayStatus {
                kind: self.kind,
                text: self.message.clone(),
            };
        }

        match self.kind {
            StatusKind::Action => DisplayStatus {
                kind: StatusKind::Action,
                text: labels.fail.clone(),
            },
            StatusKind::AtTolerance | StatusKind::NoTolerance => DisplayStatus {
                kind: StatusKind::WithinTolerance,
                text: labels.ok.clone(),
            },
            kind => DisplayStatus {
                kind,
                text: labels.ok.clone(),
            },
        }
    }
}

/// Status as shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayStatus {
    pub kind: StatusKind,
    pub text: String,
}
