//! Measurement definitions - what is measured and how it is judged

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::tolerance::{Reference, Tolerance};

/// Evaluation kind of a measurement, selecting its classification algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationKind {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "constant")]
    Constant,
    #[serde(rename = "composite")]
    Composite,
    #[serde(rename = "multchoice")]
    MultipleChoice,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "scomposite")]
    StringComposite,
    #[serde(rename = "upload")]
    Upload,
}

impl EvaluationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationKind::Boolean => "boolean",
            EvaluationKind::Simple => "simple",
            EvaluationKind::Constant => "constant",
            EvaluationKind::Composite => "composite",
            EvaluationKind::MultipleChoice => "multchoice",
            EvaluationKind::String => "string",
            EvaluationKind::StringComposite => "scomposite",
            EvaluationKind::Upload => "upload",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            EvaluationKind::Simple | EvaluationKind::Constant | EvaluationKind::Composite
        )
    }

    /// Kinds judged against pass/tolerance choice lists
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            EvaluationKind::MultipleChoice | EvaluationKind::String | EvaluationKind::StringComposite
        )
    }

    /// Kinds whose value is derived by the composite service
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            EvaluationKind::Composite | EvaluationKind::StringComposite
        )
    }

    /// Kinds the operator cannot type into
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            EvaluationKind::Composite | EvaluationKind::Constant | EvaluationKind::StringComposite
        )
    }

    /// Kinds whose value is dropped when the operator skips them
    pub fn clears_on_skip(&self) -> bool {
        matches!(self, EvaluationKind::Boolean | EvaluationKind::Upload)
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EvaluationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => Ok(EvaluationKind::Boolean),
            "simple" | "numerical" => Ok(EvaluationKind::Simple),
            "constant" => Ok(EvaluationKind::Constant),
            "composite" => Ok(EvaluationKind::Composite),
            "multchoice" | "multiple_choice" | "mc" => Ok(EvaluationKind::MultipleChoice),
            "string" => Ok(EvaluationKind::String),
            "scomposite" | "string_composite" => Ok(EvaluationKind::StringComposite),
            "upload" => Ok(EvaluationKind::Upload),
            _ => Err(format!(
                "Invalid measurement kind: {}. Use boolean, simple, constant, composite, multchoice, string, scomposite or upload",
                s
            )),
        }
    }
}

/// Static description of one measurement in a test list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDefinition {
    /// Numeric identifier, sent to the composite service
    pub id: u64,

    /// Unique key within a session
    pub slug: String,

    /// Display name
    pub name: String,

    /// Category identifier used by the category filter
    pub category: String,

    /// Evaluation kind
    #[serde(rename = "type")]
    pub kind: EvaluationKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Tolerance>,

    /// Selectable choices (multiple choice only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,

    /// Fixed value for constant measurements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_value: Option<f64>,

    /// Skipping does not require a comment even when the session asks for one
    #[serde(default)]
    pub skip_without_comment: bool,

    /// Show uploaded images inline
    #[serde(default)]
    pub display_image: bool,

    /// Start skipped when there is no persisted value
    #[serde(default)]
    pub default_skip: bool,
}

impl MeasurementDefinition {
    pub fn new(
        id: u64,
        slug: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        kind: EvaluationKind,
    ) -> Self {
        Self {
            id,
            slug: slug.into(),
            name: name.into(),
            category: category.into(),
            kind,
            reference: None,
            tolerance: None,
            choices: Vec::new(),
            constant_value: None,
            skip_without_comment: false,
            display_image: false,
            default_skip: false,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_constant(mut self, value: f64) -> Self {
        self.constant_value = Some(value);
        self
    }
}
