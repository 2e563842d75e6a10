//! Measurement records - the mutable state of one measurement in a session
//!
//! A record moves between three states:
//!
//! - **Active**: visible, not skipped
//! - **Skipped**: visible, skipped; boolean and upload values are cleared
//! - **Hidden**: filtered out by category; skipped, value preserved so it
//!   can be restored, but submitted as absent
//!
//! Records never notify anyone themselves. Methods that should trigger a
//! composite recomputation return `true` and the owning
//! [`MeasurementSet`](crate::core::set::MeasurementSet) reacts to that.

use std::sync::Arc;
use tracing::debug;

use crate::core::rule::ToleranceRule;
use crate::core::status::{Status, StatusLabels};
use crate::entities::definition::{EvaluationKind, MeasurementDefinition};
use crate::entities::session::InitialValue;
use crate::entities::value::{Attachment, MeasurementValue};

/// Comment placed on records hidden by the category filter
pub const NOT_PERFORMED: &str = "Category not performed";

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Active,
    Skipped,
    Hidden,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Active => write!(f, "active"),
            RecordState::Skipped => write!(f, "skipped"),
            RecordState::Hidden => write!(f, "hidden"),
        }
    }
}

/// Progress of the last file upload for a record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Succeeded { url: Option<String> },
    Failed { error: String },
    ServerError,
}

/// Mutable state for one measurement in a session
#[derive(Debug, Clone)]
pub struct MeasurementRecord {
    definition: Arc<MeasurementDefinition>,
    rule: Arc<ToleranceRule>,
    labels: Arc<StatusLabels>,
    value: Option<MeasurementValue>,
    skipped: bool,
    visible: bool,
    status: Status,
    attachments: Vec<Attachment>,
    comment: String,
    upload_state: UploadState,
}

impl MeasurementRecord {
    /// Seed a record from its definition and any persisted state
    pub fn new(
        definition: Arc<MeasurementDefinition>,
        rule: Arc<ToleranceRule>,
        labels: Arc<StatusLabels>,
        initial: InitialValue,
    ) -> Self {
        let kind = definition.kind;
        let value = initial
            .value
            .and_then(|v| coerce_value(kind, v))
            .or_else(|| definition.constant_value.map(MeasurementValue::Number));
        let skipped = value.is_none() && definition.default_skip;
        let status = Status::not_done(&labels);

        let mut record = Self {
            definition,
            rule,
            labels,
            value: None,
            skipped,
            visible: true,
            status,
            attachments: Vec::new(),
            comment: initial.comment.unwrap_or_default(),
            upload_state: UploadState::Idle,
        };
        record.set_value(value, &initial.user_attached);
        record
    }

    pub fn definition(&self) -> &MeasurementDefinition {
        &self.definition
    }

    pub fn slug(&self) -> &str {
        &self.definition.slug
    }

    pub fn kind(&self) -> EvaluationKind {
        self.definition.kind
    }

    pub fn rule(&self) -> &ToleranceRule {
        &self.rule
    }

    /// Current value, including one preserved while hidden
    pub fn value(&self) -> Option<&MeasurementValue> {
        self.value.as_ref()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn state(&self) -> RecordState {
        if !self.visible {
            RecordState::Hidden
        } else if self.skipped {
            RecordState::Skipped
        } else {
            RecordState::Active
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn upload_state(&self) -> &UploadState {
        &self.upload_state
    }

    /// Status as shown in listings
    ///
    /// Hidden records show as not done. Aggregation uses
    /// [`classified_status`](Self::classified_status) instead.
    pub fn current_status(&self) -> Status {
        if self.visible {
            self.status.clone()
        } else {
            Status::not_done(&self.labels)
        }
    }

    /// Status last computed from the stored value, ignoring visibility
    pub fn classified_status(&self) -> &Status {
        &self.status
    }

    /// At action level, whether or not the record is hidden
    pub fn is_failing(&self) -> bool {
        self.status.is_failing()
    }

    /// Value to submit; hidden records submit nothing
    pub fn submission_value(&self) -> Option<&MeasurementValue> {
        if self.visible {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// Whether the operator still owes a comment for skipping this record
    pub fn needs_comment(&self, comment_on_skip: bool) -> bool {
        self.visible
            && self.skipped
            && comment_on_skip
            && !self.definition.skip_without_comment
            && self.comment.trim().is_empty()
    }

    /// Store a value and reclassify
    ///
    /// The value is coerced to the record's kind; values that cannot be
    /// coerced are stored as null. Attachment descriptors from an upload
    /// value and `user_attached` replace the attachment list when any are
    /// given.
    pub fn set_value(&mut self, value: Option<MeasurementValue>, user_attached: &[Attachment]) {
        let kind = self.kind();
        let value = value.and_then(|v| coerce_value(kind, v));

        let mut incoming: Vec<Attachment> = Vec::new();
        if let Some(upload) = value.as_ref().and_then(MeasurementValue::as_upload) {
            incoming.extend(upload.attachment.iter().cloned());
            incoming.extend(upload.user_attached.iter().cloned());
        }
        incoming.extend(user_attached.iter().cloned());
        if !incoming.is_empty() {
            self.attachments = dedup_attachments(incoming);
        }

        self.value = value;
        self.update_status();
    }

    /// Take raw operator input
    ///
    /// Returns `true` when the value changed in a way dependents should see.
    /// Entering a value un-skips the record.
    pub fn update_from_input(&mut self, raw: &str) -> bool {
        if self.kind() == EvaluationKind::Upload {
            debug!(slug = self.slug(), "upload values arrive through the upload service");
            return false;
        }

        self.value = coerce_input(self.kind(), raw);
        self.update_status();

        // hidden records stay skipped until shown
        if self.visible {
            self.skipped = false;
        }
        true
    }

    /// Toggle the skip flag
    ///
    /// Skipping clears boolean and upload values. Returns `true` when the
    /// change should trigger recomputation (i.e. when skipping). Hidden
    /// records ignore the toggle.
    pub fn set_skipped(&mut self, skipped: bool) -> bool {
        if !self.visible {
            debug!(slug = self.slug(), "ignoring skip toggle on hidden measurement");
            return false;
        }
        self.skipped = skipped;
        if !skipped {
            return false;
        }

        if self.kind().clears_on_skip() {
            self.set_value(None, &[]);
        }
        true
    }

    /// Filter the record out, keeping its value for a later `show`
    pub fn hide(&mut self) {
        self.visible = false;
        self.skipped = true;
        self.update_status();
        self.comment = NOT_PERFORMED.to_string();
    }

    /// Undo `hide`
    pub fn show(&mut self) {
        self.visible = true;
        self.skipped = false;
        self.comment = self.comment.replace(NOT_PERFORMED, "");
        if self.kind() == EvaluationKind::Boolean {
            let value = self.value.take();
            self.set_value(value, &[]);
        }
    }

    pub(crate) fn begin_upload(&mut self) {
        self.upload_state = UploadState::Uploading;
    }

    pub(crate) fn upload_failed(&mut self, state: UploadState) {
        self.set_value(None, &[]);
        self.upload_state = state;
    }

    pub(crate) fn upload_succeeded(&mut self, value: MeasurementValue, url: Option<String>) {
        self.set_value(Some(value), &[]);
        self.upload_state = UploadState::Succeeded { url };
    }

    fn update_status(&mut self) {
        self.status = match &self.value {
            None => Status::not_done(&self.labels),
            Some(v) => self.rule.classify_with(v, &self.labels),
        };
    }
}

/// Coerce a value to the shape a kind expects, or `None` if it cannot be
pub fn coerce_value(kind: EvaluationKind, value: MeasurementValue) -> Option<MeasurementValue> {
    match (kind, value) {
        (EvaluationKind::Upload, v @ MeasurementValue::Upload(_)) => Some(v),
        (EvaluationKind::Upload, _) => None,
        (k, MeasurementValue::Text(s)) if k.is_choice() => Some(MeasurementValue::Text(s)),
        (k, MeasurementValue::Number(n)) if k.is_choice() => {
            Some(MeasurementValue::Text(n.to_string()))
        }
        (EvaluationKind::Boolean, MeasurementValue::Text(s)) => parse_boolean(&s),
        (_, MeasurementValue::Number(n)) if n.is_finite() => Some(MeasurementValue::Number(n)),
        (_, MeasurementValue::Text(s)) => parse_numeric(&s).map(MeasurementValue::Number),
        _ => None,
    }
}

/// Interpret raw operator input for a kind
pub fn coerce_input(kind: EvaluationKind, raw: &str) -> Option<MeasurementValue> {
    match kind {
        EvaluationKind::Boolean => parse_boolean(raw),
        EvaluationKind::MultipleChoice => {
            let choice = raw.trim();
            if choice.is_empty() {
                None
            } else {
                Some(MeasurementValue::Text(choice.to_string()))
            }
        }
        EvaluationKind::String | EvaluationKind::StringComposite => {
            Some(MeasurementValue::Text(raw.to_string()))
        }
        EvaluationKind::Upload => None,
        _ => parse_numeric(raw).map(MeasurementValue::Number),
    }
}

/// Parse a numeric entry
///
/// Whitespace is ignored. Entries with more than one decimal point, or that
/// do not parse to a finite number, are treated as no value.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || cleaned.matches('.').count() > 1 {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_boolean(raw: &str) -> Option<MeasurementValue> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "yes" | "y" | "true" => Some(MeasurementValue::Number(1.0)),
        "0" | "no" | "n" | "false" => Some(MeasurementValue::Number(0.0)),
        _ => None,
    }
}

fn dedup_attachments(attachments: Vec<Attachment>) -> Vec<Attachment> {
    let mut seen = std::collections::HashSet::new();
    attachments
        .into_iter()
        .filter(|a| seen.insert(a.attachment_id.clone()))
        .collect()
}
