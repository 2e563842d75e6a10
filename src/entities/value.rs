//! Measurement values and attachment descriptors

use serde::{Deserialize, Serialize};

/// A file attached to a measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Identifier assigned by the upload service
    pub attachment_id: String,

    /// Original file name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Where the stored file can be fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Whether the file should be shown inline as an image
    #[serde(default)]
    pub is_image: bool,
}

impl Attachment {
    pub fn new(attachment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            name: name.into(),
            url: None,
            is_image: false,
        }
    }
}

/// Value produced by the upload service for a file-upload measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadValue {
    /// Attachment holding the uploaded file
    pub attachment_id: String,

    /// Result of server-side processing of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Link to the stored file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// The confirmed attachment for the upload itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    /// Extra files the processing step attached on the user's behalf
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_attached: Vec<Attachment>,
}

/// Current value of a measurement
///
/// Numbers carry boolean (0/1) and numeric kinds, text carries the choice
/// and string kinds, uploads carry file-upload kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Number(f64),
    Text(String),
    Upload(UploadValue),
}

impl MeasurementValue {
    pub fn as_upload(&self) -> Option<&UploadValue> {
        match self {
            MeasurementValue::Upload(u) => Some(u),
            _ => None,
        }
    }
}

impl From<f64> for MeasurementValue {
    fn from(value: f64) -> Self {
        MeasurementValue::Number(value)
    }
}

impl From<&str> for MeasurementValue {
    fn from(value: &str) -> Self {
        MeasurementValue::Text(value.to_string())
    }
}

impl From<String> for MeasurementValue {
    fn from(value: String) -> Self {
        MeasurementValue::Text(value)
    }
}

impl std::fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementValue::Number(n) => write!(f, "{}", n),
            MeasurementValue::Text(s) => write!(f, "{}", s),
            MeasurementValue::Upload(u) => match &u.attachment {
                Some(att) if !att.name.is_empty() => write!(f, "{}", att.name),
                _ => write!(f, "attachment {}", u.attachment_id),
            },
        }
    }
}
