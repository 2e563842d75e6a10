//! Reference values and tolerance bands

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sentinel used for a missing bound
pub const UNBOUNDED: f64 = 1e99;

/// How a tolerance band is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToleranceMode {
    /// Bounds are absolute differences from the reference
    #[serde(rename = "absolute")]
    Absolute,
    /// Bounds are percent differences from the reference
    #[serde(rename = "percent")]
    Percent,
    /// Pass/tolerance choice lists instead of numeric bounds
    #[serde(rename = "multchoice")]
    MultipleChoice,
}

impl Default for ToleranceMode {
    fn default() -> Self {
        ToleranceMode::Absolute
    }
}

impl fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToleranceMode::Absolute => write!(f, "absolute"),
            ToleranceMode::Percent => write!(f, "percent"),
            ToleranceMode::MultipleChoice => write!(f, "multchoice"),
        }
    }
}

impl FromStr for ToleranceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "absolute" | "abs" => Ok(ToleranceMode::Absolute),
            "percent" | "pct" | "%" => Ok(ToleranceMode::Percent),
            "multchoice" | "multiple_choice" | "mc" => Ok(ToleranceMode::MultipleChoice),
            _ => Err(format!(
                "Invalid tolerance mode: {}. Use absolute, percent or multchoice",
                s
            )),
        }
    }
}

/// Reference type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Numerical,
    /// Yes/No reference stored as 1/0
    Boolean,
}

impl Default for ReferenceKind {
    fn default() -> Self {
        ReferenceKind::Numerical
    }
}

/// Target value a measurement is compared against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type", default)]
    pub kind: ReferenceKind,

    pub value: f64,
}

impl Reference {
    pub fn numerical(value: f64) -> Self {
        Self {
            kind: ReferenceKind::Numerical,
            value,
        }
    }

    pub fn boolean(expected: bool) -> Self {
        Self {
            kind: ReferenceKind::Boolean,
            value: if expected { 1.0 } else { 0.0 },
        }
    }

    /// Human readable reference value
    pub fn value_display(&self) -> String {
        match self.kind {
            ReferenceKind::Boolean if self.value == 1.0 => "Yes".to_string(),
            ReferenceKind::Boolean => "No".to_string(),
            ReferenceKind::Numerical => format!("{}", self.value),
        }
    }
}

/// Problems with a tolerance definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToleranceError {
    #[error("value set for tolerance or action but type is multiple choice")]
    BoundsOnChoiceTolerance,

    #[error("a multiple choice tolerance needs at least one passing choice")]
    MissingPassChoices,

    #[error("pass or tolerance choices set but type is not multiple choice")]
    ChoicesOnNumericTolerance,

    #[error("at least one tolerance or action level must be set")]
    NoBounds,

    #[error("{lower} ({lower_value}) is greater than {upper} ({upper_value})")]
    Misordered {
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    },
}

/// Tolerance band for one measurement
///
/// Numeric modes use the four bounds, multiple choice uses the two choice
/// lists. On the wire the choice lists may arrive as comma separated strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(rename = "type")]
    pub mode: ToleranceMode,

    #[serde(default)]
    pub act_low: Option<f64>,

    #[serde(default)]
    pub tol_low: Option<f64>,

    #[serde(default)]
    pub tol_high: Option<f64>,

    #[serde(default)]
    pub act_high: Option<f64>,

    #[serde(
        rename = "mc_pass_choices",
        default,
        deserialize_with = "choice_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub pass_choices: Vec<String>,

    #[serde(
        rename = "mc_tol_choices",
        default,
        deserialize_with = "choice_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tol_choices: Vec<String>,
}

/// Numeric bounds with missing values replaced by `±UNBOUNDED`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub act_low: f64,
    pub tol_low: f64,
    pub tol_high: f64,
    pub act_high: f64,
}

/// Absolute limits a tolerance implies for a given reference value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ToleranceLimits {
    pub act_low: Option<f64>,
    pub tol_low: Option<f64>,
    pub tol_high: Option<f64>,
    pub act_high: Option<f64>,
}

impl Tolerance {
    /// Create a numeric tolerance
    pub fn numeric(
        mode: ToleranceMode,
        act_low: Option<f64>,
        tol_low: Option<f64>,
        tol_high: Option<f64>,
        act_high: Option<f64>,
    ) -> Self {
        Self {
            mode,
            act_low,
            tol_low,
            tol_high,
            act_high,
            ..Default::default()
        }
    }

    /// Create a multiple choice tolerance
    pub fn choices<S: AsRef<str>>(pass: &[S], tolerance: &[S]) -> Self {
        Self {
            mode: ToleranceMode::MultipleChoice,
            pass_choices: pass.iter().map(|s| s.as_ref().to_string()).collect(),
            tol_choices: tolerance.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn is_choice(&self) -> bool {
        self.mode == ToleranceMode::MultipleChoice
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            act_low: self.act_low.unwrap_or(-UNBOUNDED),
            tol_low: self.tol_low.unwrap_or(-UNBOUNDED),
            tol_high: self.tol_high.unwrap_or(UNBOUNDED),
            act_high: self.act_high.unwrap_or(UNBOUNDED),
        }
    }

    fn has_any_bound(&self) -> bool {
        self.act_low.is_some()
            || self.tol_low.is_some()
            || self.tol_high.is_some()
            || self.act_high.is_some()
    }

    /// Check the tolerance for definition errors, returning every problem found
    pub fn validate(&self) -> Vec<ToleranceError> {
        let mut errors = Vec::new();

        if self.is_choice() {
            if self.has_any_bound() {
                errors.push(ToleranceError::BoundsOnChoiceTolerance);
            }
            if self.pass_choices.is_empty() {
                errors.push(ToleranceError::MissingPassChoices);
            }
            return errors;
        }

        if !self.pass_choices.is_empty() || !self.tol_choices.is_empty() {
            errors.push(ToleranceError::ChoicesOnNumericTolerance);
        }
        if !self.has_any_bound() {
            errors.push(ToleranceError::NoBounds);
        }

        // Action bands must enclose tolerance bands
        let ordered = [
            ("act_low", self.act_low),
            ("tol_low", self.tol_low),
            ("tol_high", self.tol_high),
            ("act_high", self.act_high),
        ];
        let present: Vec<(&'static str, f64)> = ordered
            .iter()
            .filter_map(|(name, v)| v.map(|v| (*name, v)))
            .collect();
        for pair in present.windows(2) {
            let (lower, lower_value) = pair[0];
            let (upper, upper_value) = pair[1];
            if lower_value > upper_value {
                errors.push(ToleranceError::Misordered {
                    lower,
                    lower_value,
                    upper,
                    upper_value,
                });
            }
        }

        errors
    }

    /// Absolute limits this tolerance implies around `reference`
    pub fn limits_for(&self, reference: f64) -> ToleranceLimits {
        let apply = |bound: Option<f64>| -> Option<f64> {
            bound.and_then(|b| match self.mode {
                ToleranceMode::Absolute => Some(reference + b),
                ToleranceMode::Percent => Some(reference * (1.0 + b / 100.0)),
                ToleranceMode::MultipleChoice => None,
            })
        };

        ToleranceLimits {
            act_low: apply(self.act_low),
            tol_low: apply(self.tol_low),
            tol_high: apply(self.tol_high),
            act_high: apply(self.act_high),
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vals = [self.act_low, self.tol_low, self.tol_high, self.act_high];
        match self.mode {
            ToleranceMode::Absolute => {
                let v: Vec<String> = vals
                    .iter()
                    .map(|v| v.map_or("--".to_string(), |v| format!("{:.3}", v)))
                    .collect();
                write!(f, "Absolute({})", v.join(", "))
            }
            ToleranceMode::Percent => {
                let v: Vec<String> = vals
                    .iter()
                    .map(|v| v.map_or("--".to_string(), |v| format!("{:.2}%", v)))
                    .collect();
                write!(f, "Percent({})", v.join(", "))
            }
            ToleranceMode::MultipleChoice => write!(
                f,
                "M.C.(OK={}, Tolerance={})",
                self.pass_choices.join(":"),
                self.tol_choices.join(":")
            ),
        }
    }
}

/// Split a comma separated choice list, trimming entries and dropping blanks
pub fn split_choices(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChoiceList {
    Joined(String),
    Items(Vec<String>),
}

fn choice_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<ChoiceList>::deserialize(deserializer)?;
    Ok(match raw {
        None => Vec::new(),
        Some(ChoiceList::Joined(s)) => split_choices(&s),
        Some(ChoiceList::Items(items)) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}
