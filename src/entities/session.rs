//! Session documents - one test list being performed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::composite::CompositeResult;
use crate::entities::definition::MeasurementDefinition;
use crate::entities::value::{Attachment, MeasurementValue};

/// Metadata describing the session, sent along with every service call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Name of the test list being performed
    #[serde(default)]
    pub test_list_name: String,

    /// Unit the measurements are taken on
    #[serde(default)]
    pub unit_number: Option<i64>,

    /// Day within a test list cycle
    #[serde(default)]
    pub cycle_day: Option<i64>,

    #[serde(default)]
    pub work_started: Option<DateTime<Utc>>,

    #[serde(default)]
    pub work_completed: Option<DateTime<Utc>>,

    /// Operator performing the session
    #[serde(default)]
    pub username: String,
}

/// Persisted state used to seed a measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialValue {
    #[serde(default)]
    pub value: Option<MeasurementValue>,

    /// Files attached in an earlier visit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_attached: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl InitialValue {
    pub fn with_value(value: impl Into<MeasurementValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }
}

/// Per-session presentation settings that override the user configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_fail_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_comment_on_skip: Option<bool>,
}

/// A session file as read by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub meta: SessionMeta,

    #[serde(default)]
    pub options: SessionOptions,

    /// Measurement definitions in display order
    pub measurements: Vec<MeasurementDefinition>,

    /// Persisted values keyed by slug
    #[serde(default)]
    pub values: BTreeMap<String, InitialValue>,

    /// Canned composite service results keyed by slug
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub composite_results: BTreeMap<String, CompositeResult>,
}
