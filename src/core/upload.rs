//! File upload interface for upload-kind measurements

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::composite::{ServiceError, SessionSnapshot};
use crate::entities::value::{Attachment, MeasurementValue, UploadValue};

/// A file submitted for one measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRequest {
    /// Slug of the receiving measurement
    pub slug: String,

    /// Definition id of the receiving measurement
    pub measurement_id: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub file_name: String,

    #[serde(skip)]
    pub bytes: Vec<u8>,

    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

/// Upload service reply
///
/// A non-empty `errors` list means the upload was rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub attachment_id: Option<String>,

    /// Processing result returned by the server, if any
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub attachment: Option<Attachment>,

    #[serde(default)]
    pub user_attached: Vec<Attachment>,
}

impl UploadResponse {
    pub fn is_rejected(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Value to store on the record for an accepted upload
    pub fn to_value(&self) -> Option<MeasurementValue> {
        if self.is_rejected() {
            return None;
        }
        let attachment_id = self
            .attachment_id
            .clone()
            .or_else(|| self.attachment.as_ref().map(|a| a.attachment_id.clone()))?;

        Some(MeasurementValue::Upload(UploadValue {
            attachment_id,
            result: self.result.clone(),
            url: self.url.clone(),
            attachment: self.attachment.clone(),
            user_attached: self.user_attached.clone(),
        }))
    }
}

/// A file upload backend
pub trait UploadService {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadResponse, ServiceError>;
}

/// Upload service that accepts files by reference to their local path
///
/// Nothing is transferred; the attachment points at `root/<file_name>` and
/// the upload is rejected when that file does not exist.
#[derive(Debug, Clone)]
pub struct LocalUploadService {
    root: PathBuf,
}

impl LocalUploadService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_image(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .as_deref(),
            Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "svg")
        )
    }
}

impl UploadService for LocalUploadService {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadResponse, ServiceError> {
        let path = self.root.join(&request.file_name);
        if !path.is_file() {
            return Ok(UploadResponse {
                errors: vec![format!("file not found: {}", path.display())],
                ..Default::default()
            });
        }

        let url = path.display().to_string();
        let attachment = Attachment {
            attachment_id: request.file_name.clone(),
            name: request.file_name.clone(),
            url: Some(url.clone()),
            is_image: Self::is_image(&path),
        };

        Ok(UploadResponse {
            errors: Vec::new(),
            attachment_id: Some(attachment.attachment_id.clone()),
            result: None,
            url: Some(url),
            attachment: Some(attachment),
            user_attached: Vec::new(),
        })
    }
}
