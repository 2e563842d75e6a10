//! Measurement sets - every record of one session
//!
//! [`MeasurementSet`] owns the records, indexes them by slug, drives
//! composite recomputation and keeps the aggregate "has failing" state.
//!
//! All mutation happens synchronously. Composite requests are queued in an
//! outbox; callers drain it with [`MeasurementSet::take_requests`], deliver
//! the requests to a service and report back through
//! [`MeasurementSet::complete_composite`]. Observers register a
//! [`SessionListener`] at construction.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::composite::{
    CompositeEvaluator, CompositeRequest, CompositeResponse, CompositeService, RequestToken,
    ServiceError, SessionSnapshot, Settlement,
};
use crate::core::config::Config;
use crate::core::record::{MeasurementRecord, RecordState, UploadState};
use crate::core::rule::ToleranceRule;
use crate::core::status::{DisplayStatus, StatusKind, StatusLabels};
use crate::core::upload::{UploadRequest, UploadResponse, UploadService};
use crate::entities::definition::{EvaluationKind, MeasurementDefinition};
use crate::entities::session::{InitialValue, SessionMeta, SessionOptions};
use crate::entities::value::MeasurementValue;

/// Errors from session operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown measurement '{0}'")]
    UnknownMeasurement(String),

    #[error("duplicate measurement slug '{0}'")]
    DuplicateSlug(String),

    #[error("measurement '{slug}' is {kind} and cannot be edited directly")]
    ReadOnly { slug: String, kind: EvaluationKind },

    #[error("measurement '{slug}' takes a file upload, not a typed value")]
    UploadOnly { slug: String },

    #[error("measurement '{slug}' is {kind}, not an upload")]
    NotUpload { slug: String, kind: EvaluationKind },
}

/// Which categories are shown
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl CategoryFilter {
    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryFilter::Only(categories.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(selected) => selected.contains(category),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = Infallible;

    /// `all` (or nothing) selects everything, otherwise a comma separated list
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(CategoryFilter::All);
        }
        Ok(CategoryFilter::only(
            s.split(',').map(str::trim).filter(|c| !c.is_empty()),
        ))
    }
}

/// One user action within a turn
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Input { slug: String, raw: String },
    Skip { slug: String, skipped: bool },
    Comment { slug: String, text: String },
    Filter(CategoryFilter),
}

/// Observer of aggregate session state
pub trait SessionListener {
    /// Aggregate status was refreshed
    fn qa_updated(&mut self, _has_failing: bool) {}

    /// Submission was blocked or unblocked by composite recomputation
    fn submission_changed(&mut self, _enabled: bool) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl SessionListener for NullListener {}

/// Presentation and validation settings for a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    pub pass_fail_only: bool,
    pub require_comment_on_skip: bool,
    pub labels: StatusLabels,
}

impl SessionSettings {
    /// Settings from user configuration, overridden by the session's own options
    pub fn from_config(config: &Config, options: &SessionOptions) -> Self {
        Self {
            pass_fail_only: options
                .pass_fail_only
                .or(config.pass_fail_only)
                .unwrap_or(false),
            require_comment_on_skip: options
                .require_comment_on_skip
                .or(config.require_comment_on_skip)
                .unwrap_or(false),
            labels: config.labels(),
        }
    }
}

/// Everything about a session besides its measurements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub meta: SessionMeta,
    pub settings: SessionSettings,
}

/// Per-measurement submission data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    pub slug: String,
    pub value: Option<MeasurementValue>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// Count of records per status and state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub not_done: usize,
    pub no_tol: usize,
    pub ok: usize,
    pub tolerance: usize,
    pub action: usize,
    pub done: usize,
    pub skipped: usize,
    pub hidden: usize,
}

/// All records of one session
pub struct MeasurementSet {
    records: Vec<MeasurementRecord>,
    index: HashMap<String, usize>,
    evaluator: CompositeEvaluator,
    outbox: Vec<CompositeRequest>,
    context: SessionContext,
    labels: Arc<StatusLabels>,
    listener: Box<dyn SessionListener>,
    gate_open: bool,
}

impl MeasurementSet {
    /// Build one record per definition and issue the first composite request
    pub fn initialize(
        definitions: Vec<MeasurementDefinition>,
        mut initial: BTreeMap<String, InitialValue>,
        context: SessionContext,
        listener: Box<dyn SessionListener>,
    ) -> Result<Self, SessionError> {
        let labels = Arc::new(context.settings.labels.clone());
        let mut records = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());
        let mut composite_ids = Vec::new();

        for definition in definitions {
            if index.contains_key(&definition.slug) {
                return Err(SessionError::DuplicateSlug(definition.slug));
            }
            if definition.kind.is_composite() {
                composite_ids.push(definition.id);
            }
            let rule = Arc::new(ToleranceRule::from_definition(&definition));
            let seed = initial.remove(&definition.slug).unwrap_or_default();
            index.insert(definition.slug.clone(), records.len());
            records.push(MeasurementRecord::new(
                Arc::new(definition),
                rule,
                Arc::clone(&labels),
                seed,
            ));
        }

        for slug in initial.keys() {
            warn!(slug = %slug, "ignoring value for unknown measurement");
        }

        let mut set = Self {
            records,
            index,
            evaluator: CompositeEvaluator::new(composite_ids),
            outbox: Vec::new(),
            context,
            labels,
            listener,
            gate_open: true,
        };
        set.finish_turn(true);
        Ok(set)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.context.settings
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn get(&self, slug: &str) -> Option<&MeasurementRecord> {
        self.index.get(slug).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take raw operator input for one measurement
    pub fn update_from_input(&mut self, slug: &str, raw: &str) -> Result<(), SessionError> {
        let changed = self.apply_input(slug, raw)?;
        self.finish_turn(changed);
        Ok(())
    }

    /// Skip or un-skip one measurement
    pub fn set_skipped(&mut self, slug: &str, skipped: bool) -> Result<(), SessionError> {
        let changed = self.apply_skip(slug, skipped)?;
        self.finish_turn(changed);
        Ok(())
    }

    pub fn set_comment(&mut self, slug: &str, text: &str) -> Result<(), SessionError> {
        let i = self.position(slug)?;
        self.records[i].set_comment(text);
        Ok(())
    }

    /// Show records in selected categories and hide the rest
    pub fn apply_category_filter(&mut self, filter: &CategoryFilter) {
        self.apply_filter(filter);
        self.finish_turn(false);
    }

    /// Apply every event of one turn, then notify once
    ///
    /// Events apply in a fixed order regardless of how they are listed:
    /// inputs and comments, then skip toggles, then category filters. Slugs
    /// are checked up front so a bad event leaves the set untouched.
    pub fn dispatch_turn<I>(&mut self, events: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = SessionEvent>,
    {
        let events: Vec<SessionEvent> = events.into_iter().collect();
        for event in &events {
            match event {
                SessionEvent::Input { slug, .. } => {
                    self.check_input(slug)?;
                }
                SessionEvent::Skip { slug, .. } | SessionEvent::Comment { slug, .. } => {
                    self.position(slug)?;
                }
                SessionEvent::Filter(_) => {}
            }
        }

        let mut inputs = Vec::new();
        let mut skips = Vec::new();
        let mut filters = Vec::new();
        for event in events {
            match event {
                SessionEvent::Input { .. } | SessionEvent::Comment { .. } => inputs.push(event),
                SessionEvent::Skip { .. } => skips.push(event),
                SessionEvent::Filter(filter) => filters.push(filter),
            }
        }

        let mut changed = false;
        for event in inputs {
            match event {
                SessionEvent::Input { slug, raw } => changed |= self.apply_input(&slug, &raw)?,
                SessionEvent::Comment { slug, text } => self.set_comment(&slug, &text)?,
                _ => {}
            }
        }
        for event in skips {
            if let SessionEvent::Skip { slug, skipped } = event {
                changed |= self.apply_skip(&slug, skipped)?;
            }
        }
        for filter in &filters {
            self.apply_filter(filter);
        }

        self.finish_turn(changed);
        Ok(())
    }

    /// Current values, references, tolerances and metadata
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            meta: self.context.meta.clone(),
            ..Default::default()
        };
        for record in &self.records {
            let slug = record.slug().to_string();
            let definition = record.definition();
            snapshot
                .values
                .insert(slug.clone(), record.value().cloned());
            snapshot.refs.insert(slug.clone(), definition.reference);
            snapshot.tols.insert(slug, definition.tolerance.clone());
        }
        snapshot
    }

    /// Drain composite requests issued since the last call, oldest first
    pub fn take_requests(&mut self) -> Vec<CompositeRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Report the outcome of a composite request
    ///
    /// Results only land when `token` is the latest issued request. They are
    /// written to composite records that are not skipped at this moment.
    pub fn complete_composite(
        &mut self,
        token: RequestToken,
        outcome: Result<CompositeResponse, ServiceError>,
    ) -> Settlement {
        let settlement = self.evaluator.settle(token, outcome);
        match &settlement {
            Settlement::Stale => return settlement,
            Settlement::Apply(response) => self.write_back(response),
            Settlement::Failed(_) => {}
        }
        self.notify_gate();
        self.notify_aggregate();
        settlement
    }

    /// Deliver every queued request to `service`, in issue order
    ///
    /// Returns the number of responses whose results were applied.
    pub fn settle_with(&mut self, service: &mut dyn CompositeService) -> usize {
        let mut applied = 0;
        for request in self.take_requests() {
            let outcome = service.calculate(&request);
            if let Settlement::Apply(_) = self.complete_composite(request.token, outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Start an upload for `slug`
    pub fn begin_upload(
        &mut self,
        slug: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadRequest, SessionError> {
        let i = self.position(slug)?;
        let record = &self.records[i];
        if record.kind() != EvaluationKind::Upload {
            return Err(SessionError::NotUpload {
                slug: slug.to_string(),
                kind: record.kind(),
            });
        }
        let measurement_id = record.definition().id;
        self.records[i].begin_upload();

        Ok(UploadRequest {
            slug: slug.to_string(),
            measurement_id,
            session_id: self.context.session_id.clone(),
            file_name: file_name.to_string(),
            bytes,
            snapshot: self.snapshot(),
        })
    }

    /// Apply an upload outcome to `slug`
    pub fn complete_upload(
        &mut self,
        slug: &str,
        outcome: Result<UploadResponse, ServiceError>,
    ) -> Result<(), SessionError> {
        let i = self.position(slug)?;
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(slug, error = %err, "upload failed");
                self.records[i].upload_failed(UploadState::ServerError);
                self.finish_turn(false);
                return Ok(());
            }
        };

        if let Some(error) = response.errors.first() {
            warn!(slug, error = %error, "upload rejected");
            self.records[i].upload_failed(UploadState::Failed {
                error: error.clone(),
            });
            self.finish_turn(false);
            return Ok(());
        }

        match response.to_value() {
            Some(value) => {
                self.records[i].upload_succeeded(value, response.url.clone());
                self.finish_turn(true);
            }
            None => {
                warn!(slug, "upload response carried no attachment id");
                self.records[i].upload_failed(UploadState::ServerError);
                self.finish_turn(false);
            }
        }
        Ok(())
    }

    /// Upload a file through `service` in one step
    pub fn upload_with(
        &mut self,
        slug: &str,
        file_name: &str,
        bytes: Vec<u8>,
        service: &mut dyn UploadService,
    ) -> Result<(), SessionError> {
        let request = self.begin_upload(slug, file_name, bytes)?;
        let outcome = service.upload(&request);
        self.complete_upload(slug, outcome)
    }

    /// True if any record is at action level, hidden ones included
    pub fn has_failing(&self) -> bool {
        self.records.iter().any(MeasurementRecord::is_failing)
    }

    /// False while a composite recomputation is outstanding
    pub fn submission_enabled(&self) -> bool {
        self.evaluator.submission_enabled()
    }

    pub fn submission(&self) -> Vec<SubmissionEntry> {
        self.records
            .iter()
            .map(|record| SubmissionEntry {
                slug: record.slug().to_string(),
                value: record.submission_value().cloned(),
                skipped: record.is_skipped(),
                comment: record.comment().to_string(),
                attachments: record
                    .attachments()
                    .iter()
                    .map(|a| a.attachment_id.clone())
                    .collect(),
            })
            .collect()
    }

    /// True if the operator has typed anything that would be lost
    pub fn has_entered_values(&self) -> bool {
        self.records
            .iter()
            .any(|r| !r.kind().is_read_only() && r.value().is_some())
    }

    /// Slugs of skipped records still waiting for a comment
    pub fn missing_comments(&self) -> Vec<&str> {
        let required = self.context.settings.require_comment_on_skip;
        self.records
            .iter()
            .filter(|r| r.needs_comment(required))
            .map(MeasurementRecord::slug)
            .collect()
    }

    /// Status of a record as it should be shown
    pub fn display_status(&self, record: &MeasurementRecord) -> DisplayStatus {
        record
            .current_status()
            .display(self.context.settings.pass_fail_only, &self.labels)
    }

    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.state() {
                RecordState::Hidden => summary.hidden += 1,
                RecordState::Skipped => summary.skipped += 1,
                RecordState::Active => {}
            }
            match record.classified_status().kind {
                StatusKind::NotDone => summary.not_done += 1,
                StatusKind::NoTolerance => summary.no_tol += 1,
                StatusKind::WithinTolerance => summary.ok += 1,
                StatusKind::AtTolerance => summary.tolerance += 1,
                StatusKind::Action => summary.action += 1,
                StatusKind::Done => summary.done += 1,
            }
        }
        summary
    }

    fn position(&self, slug: &str) -> Result<usize, SessionError> {
        self.index
            .get(slug)
            .copied()
            .ok_or_else(|| SessionError::UnknownMeasurement(slug.to_string()))
    }

    fn check_input(&self, slug: &str) -> Result<usize, SessionError> {
        let i = self.position(slug)?;
        let kind = self.records[i].kind();
        if kind == EvaluationKind::Upload {
            return Err(SessionError::UploadOnly {
                slug: slug.to_string(),
            });
        }
        if kind.is_read_only() {
            return Err(SessionError::ReadOnly {
                slug: slug.to_string(),
                kind,
            });
        }
        Ok(i)
    }

    fn apply_input(&mut self, slug: &str, raw: &str) -> Result<bool, SessionError> {
        let i = self.check_input(slug)?;
        Ok(self.records[i].update_from_input(raw))
    }

    fn apply_skip(&mut self, slug: &str, skipped: bool) -> Result<bool, SessionError> {
        let i = self.position(slug)?;
        Ok(self.records[i].set_skipped(skipped))
    }

    fn apply_filter(&mut self, filter: &CategoryFilter) {
        let mut hidden = 0;
        for record in &mut self.records {
            let included = filter.includes(&record.definition().category);
            if included && !record.is_visible() {
                record.show();
            } else if !included {
                record.hide();
                hidden += 1;
            }
        }
        info!(hidden, total = self.records.len(), "category filter applied");
    }

    fn write_back(&mut self, response: &CompositeResponse) {
        if !response.success {
            debug!("composite service reported failure; nothing written");
            return;
        }
        for (slug, result) in &response.results {
            let Some(&i) = self.index.get(slug) else {
                debug!(slug = %slug, "composite result for unknown measurement");
                continue;
            };
            let record = &mut self.records[i];
            if !record.kind().is_composite() {
                debug!(slug = %slug, "ignoring composite result for non-composite measurement");
                continue;
            }
            if record.is_skipped() {
                continue;
            }
            record.set_value(result.value.clone(), &result.user_attached);
        }
    }

    /// Close out a turn: recompute composites if values changed, then notify
    fn finish_turn(&mut self, values_changed: bool) {
        if values_changed {
            if let Some(request) = self.evaluator.issue(self.snapshot()) {
                self.outbox.push(request);
            }
            self.notify_gate();
        }
        self.notify_aggregate();
    }

    fn notify_gate(&mut self) {
        let enabled = self.evaluator.submission_enabled();
        if enabled != self.gate_open {
            self.gate_open = enabled;
            self.listener.submission_changed(enabled);
        }
    }

    fn notify_aggregate(&mut self) {
        let failing = self.has_failing();
        self.listener.qa_updated(failing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composite::{CompositeResult, ReplayService};
    use crate::core::upload::LocalUploadService;
    use crate::entities::tolerance::{Reference, Tolerance, ToleranceMode};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Notice {
        Qa(bool),
        Gate(bool),
    }

    #[derive(Default, Clone)]
    struct Recorder(Rc<RefCell<Vec<Notice>>>);

    impl Recorder {
        fn take(&self) -> Vec<Notice> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl SessionListener for Recorder {
        fn qa_updated(&mut self, has_failing: bool) {
            self.0.borrow_mut().push(Notice::Qa(has_failing));
        }

        fn submission_changed(&mut self, enabled: bool) {
            self.0.borrow_mut().push(Notice::Gate(enabled));
        }
    }

    fn absolute() -> Tolerance {
        Tolerance::numeric(
            ToleranceMode::Absolute,
            Some(-2.0),
            Some(-1.0),
            Some(1.0),
            Some(2.0),
        )
    }

    fn definitions() -> Vec<MeasurementDefinition> {
        vec![
            MeasurementDefinition::new(1, "output", "Output", "dose", EvaluationKind::Simple)
                .with_reference(Reference::numerical(10.0))
                .with_tolerance(absolute()),
            MeasurementDefinition::new(2, "interlock", "Interlock", "safety", EvaluationKind::Boolean)
                .with_reference(Reference::boolean(true)),
            MeasurementDefinition::new(3, "ratio", "Ratio", "dose", EvaluationKind::Composite)
                .with_reference(Reference::numerical(1.0))
                .with_tolerance(absolute()),
            MeasurementDefinition::new(4, "scan", "Scan", "imaging", EvaluationKind::Upload),
        ]
    }

    fn build(initial: BTreeMap<String, InitialValue>) -> (MeasurementSet, Recorder) {
        let recorder = Recorder::default();
        let set = MeasurementSet::initialize(
            definitions(),
            initial,
            SessionContext::default(),
            Box::new(recorder.clone()),
        )
        .unwrap();
        (set, recorder)
    }

    fn composite_response(value: f64) -> CompositeResponse {
        let mut results = BTreeMap::new();
        results.insert(
            "ratio".to_string(),
            CompositeResult {
                value: Some(MeasurementValue::Number(value)),
                user_attached: Vec::new(),
            },
        );
        CompositeResponse {
            success: true,
            results,
        }
    }

    fn value_of(set: &MeasurementSet, slug: &str) -> Option<MeasurementValue> {
        set.get(slug).and_then(|r| r.value().cloned())
    }

    #[test]
    fn test_initialize_issues_composite_request() {
        let (mut set, recorder) = build(BTreeMap::new());
        assert_eq!(set.len(), 4);
        assert!(!set.submission_enabled());
        assert_eq!(
            recorder.take(),
            vec![Notice::Gate(false), Notice::Qa(false)]
        );

        let requests = set.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].composite_ids, vec![3]);
        assert!(set.take_requests().is_empty());
    }

    #[test]
    fn test_no_composites_no_requests() {
        let defs = vec![MeasurementDefinition::new(
            1,
            "flag",
            "Flag",
            "safety",
            EvaluationKind::Boolean,
        )];
        let mut set = MeasurementSet::initialize(
            defs,
            BTreeMap::new(),
            SessionContext::default(),
            Box::new(NullListener),
        )
        .unwrap();
        set.update_from_input("flag", "yes").unwrap();
        assert!(set.take_requests().is_empty());
        assert!(set.submission_enabled());
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let mut defs = definitions();
        defs.push(MeasurementDefinition::new(9, "output", "Again", "dose", EvaluationKind::Simple));
        let err = MeasurementSet::initialize(
            defs,
            BTreeMap::new(),
            SessionContext::default(),
            Box::new(NullListener),
        )
        .err();
        assert_eq!(err, Some(SessionError::DuplicateSlug("output".to_string())));
    }

    #[test]
    fn test_input_updates_aggregate() {
        let (mut set, recorder) = build(BTreeMap::new());
        recorder.take();

        set.update_from_input("output", "13").unwrap();
        assert!(set.has_failing());
        assert_eq!(recorder.take(), vec![Notice::Qa(true)]);

        set.update_from_input("output", "10.2").unwrap();
        assert!(!set.has_failing());
    }

    #[test]
    fn test_read_only_and_upload_inputs_rejected() {
        let (mut set, _) = build(BTreeMap::new());
        assert!(matches!(
            set.update_from_input("ratio", "1"),
            Err(SessionError::ReadOnly { .. })
        ));
        assert!(matches!(
            set.update_from_input("scan", "x"),
            Err(SessionError::UploadOnly { .. })
        ));
        assert_eq!(
            set.update_from_input("nope", "1"),
            Err(SessionError::UnknownMeasurement("nope".to_string()))
        );
    }

    #[test]
    fn test_composite_race_latest_wins() {
        let (mut set, _) = build(BTreeMap::new());
        set.take_requests();

        set.update_from_input("output", "9").unwrap();
        set.update_from_input("output", "11").unwrap();
        let requests = set.take_requests();
        assert_eq!(requests.len(), 2);
        let (a, b) = (&requests[0], &requests[1]);
        assert_eq!(
            a.snapshot.values["output"],
            Some(MeasurementValue::Number(9.0))
        );

        // B answers first, then the slow A
        assert!(matches!(
            set.complete_composite(b.token, Ok(composite_response(1.1))),
            Settlement::Apply(_)
        ));
        assert_eq!(
            set.complete_composite(a.token, Ok(composite_response(0.9))),
            Settlement::Stale
        );
        assert_eq!(value_of(&set, "ratio"), Some(MeasurementValue::Number(1.1)));
        assert!(set.submission_enabled());
    }

    #[test]
    fn test_composite_skipped_record_untouched() {
        let (mut set, _) = build(BTreeMap::new());
        set.take_requests();
        set.set_skipped("ratio", true).unwrap();
        let request = set.take_requests().pop().unwrap();
        set.complete_composite(request.token, Ok(composite_response(4.0)));
        assert_eq!(value_of(&set, "ratio"), None);
    }

    #[test]
    fn test_composite_failure_keeps_values() {
        let (mut set, recorder) = build(BTreeMap::new());
        let first = set.take_requests().pop().unwrap();
        set.complete_composite(first.token, Ok(composite_response(1.0)));

        set.update_from_input("output", "10").unwrap();
        let request = set.take_requests().pop().unwrap();
        recorder.take();

        let outcome = set.complete_composite(
            request.token,
            Err(ServiceError::Transport("timeout".to_string())),
        );
        assert!(matches!(outcome, Settlement::Failed(_)));
        assert_eq!(value_of(&set, "ratio"), Some(MeasurementValue::Number(1.0)));
        assert!(set.submission_enabled());
        assert_eq!(recorder.take(), vec![Notice::Gate(true), Notice::Qa(false)]);
    }

    #[test]
    fn test_unsuccessful_response_writes_nothing() {
        let (mut set, _) = build(BTreeMap::new());
        let request = set.take_requests().pop().unwrap();
        let mut response = composite_response(3.0);
        response.success = false;
        set.complete_composite(request.token, Ok(response));
        assert_eq!(value_of(&set, "ratio"), None);
        assert!(set.submission_enabled());
    }

    #[test]
    fn test_settle_with_replay_service() {
        let mut results = BTreeMap::new();
        results.insert(
            "ratio".to_string(),
            CompositeResult {
                value: Some(MeasurementValue::Number(3.0)),
                user_attached: Vec::new(),
            },
        );
        // output is not composite; its canned value must be ignored
        results.insert(
            "output".to_string(),
            CompositeResult {
                value: Some(MeasurementValue::Number(99.0)),
                user_attached: Vec::new(),
            },
        );
        let mut service = ReplayService::new(results);

        let (mut set, _) = build(BTreeMap::new());
        set.update_from_input("output", "10").unwrap();
        assert_eq!(set.settle_with(&mut service), 1);
        assert_eq!(service.calls(), 2);
        assert_eq!(value_of(&set, "ratio"), Some(MeasurementValue::Number(3.0)));
        assert_eq!(value_of(&set, "output"), Some(MeasurementValue::Number(10.0)));
        assert!(set.has_failing());
    }

    #[test]
    fn test_category_filter_hides_and_restores() {
        let mut initial = BTreeMap::new();
        initial.insert("interlock".to_string(), InitialValue::with_value(0.0));
        let (mut set, recorder) = build(initial);
        assert!(set.has_failing());
        recorder.take();

        set.apply_category_filter(&CategoryFilter::only(["dose"]));
        let interlock = set.get("interlock").unwrap();
        assert_eq!(interlock.state(), RecordState::Hidden);
        assert_eq!(interlock.value(), Some(&MeasurementValue::Number(0.0)));
        assert!(set.has_failing());
        assert_eq!(recorder.take(), vec![Notice::Qa(true)]);

        let submitted = set.submission();
        let entry = submitted.iter().find(|e| e.slug == "interlock").unwrap();
        assert_eq!(entry.value, None);
        assert!(entry.skipped);

        set.apply_category_filter(&CategoryFilter::All);
        assert_eq!(set.get("interlock").unwrap().state(), RecordState::Active);
        assert!(set.has_failing());
    }

    #[test]
    fn test_hidden_action_still_fails_session() {
        let (mut set, recorder) = build(BTreeMap::new());
        set.update_from_input("output", "13").unwrap();
        recorder.take();

        set.apply_category_filter(&CategoryFilter::only(["safety"]));
        let output = set.get("output").unwrap();
        assert_eq!(output.state(), RecordState::Hidden);
        assert_eq!(output.current_status().kind, StatusKind::NotDone);
        assert_eq!(output.classified_status().kind, StatusKind::Action);
        assert!(set.has_failing());
        assert_eq!(set.summary().action, 1);
        assert_eq!(recorder.take(), vec![Notice::Qa(true)]);
    }

    #[test]
    fn test_edits_on_hidden_record_keep_it_skipped() {
        let (mut set, _) = build(BTreeMap::new());
        set.apply_category_filter(&CategoryFilter::only(["safety"]));

        set.update_from_input("output", "13").unwrap();
        set.set_skipped("output", false).unwrap();

        let output = set.get("output").unwrap();
        assert_eq!(output.state(), RecordState::Hidden);
        assert!(output.is_skipped());
        let submitted = set.submission();
        let entry = submitted.iter().find(|e| e.slug == "output").unwrap();
        assert!(entry.skipped);
        assert_eq!(entry.value, None);

        set.apply_category_filter(&CategoryFilter::All);
        assert_eq!(set.get("output").unwrap().state(), RecordState::Active);
        assert_eq!(value_of(&set, "output"), Some(MeasurementValue::Number(13.0)));
    }

    #[test]
    fn test_filter_keeps_user_skip_on_visible_records() {
        let (mut set, _) = build(BTreeMap::new());
        set.set_skipped("output", true).unwrap();
        set.apply_category_filter(&CategoryFilter::All);
        assert_eq!(set.get("output").unwrap().state(), RecordState::Skipped);
    }

    #[test]
    fn test_dispatch_turn_skip_before_filter() {
        let (mut set, recorder) = build(BTreeMap::new());
        set.take_requests();
        recorder.take();

        set.dispatch_turn(vec![
            SessionEvent::Filter(CategoryFilter::only(["dose"])),
            SessionEvent::Skip {
                slug: "interlock".to_string(),
                skipped: false,
            },
            SessionEvent::Skip {
                slug: "output".to_string(),
                skipped: true,
            },
            SessionEvent::Input {
                slug: "output".to_string(),
                raw: "12".to_string(),
            },
        ])
        .unwrap();

        // filter ran last, so the interlock stays hidden
        assert_eq!(set.get("interlock").unwrap().state(), RecordState::Hidden);
        // input ran before the skip
        assert_eq!(set.get("output").unwrap().state(), RecordState::Skipped);
        assert_eq!(value_of(&set, "output"), Some(MeasurementValue::Number(12.0)));

        assert_eq!(set.take_requests().len(), 1);
        let notices = recorder.take();
        assert_eq!(
            notices.iter().filter(|n| matches!(n, Notice::Qa(_))).count(),
            1
        );
    }

    #[test]
    fn test_dispatch_turn_bad_slug_changes_nothing() {
        let (mut set, _) = build(BTreeMap::new());
        let result = set.dispatch_turn(vec![
            SessionEvent::Input {
                slug: "output".to_string(),
                raw: "12".to_string(),
            },
            SessionEvent::Skip {
                slug: "missing".to_string(),
                skipped: true,
            },
        ]);
        assert!(result.is_err());
        assert_eq!(value_of(&set, "output"), None);
    }

    #[test]
    fn test_comments_and_entered_values() {
        let defs = definitions();
        let context = SessionContext {
            settings: SessionSettings {
                require_comment_on_skip: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut set =
            MeasurementSet::initialize(defs, BTreeMap::new(), context, Box::new(NullListener))
                .unwrap();
        assert!(!set.has_entered_values());

        set.set_skipped("output", true).unwrap();
        assert_eq!(set.missing_comments(), vec!["output"]);
        set.set_comment("output", "chamber unavailable").unwrap();
        assert!(set.missing_comments().is_empty());

        set.update_from_input("interlock", "1").unwrap();
        assert!(set.has_entered_values());
    }

    #[test]
    fn test_pass_fail_display() {
        let context = SessionContext {
            settings: SessionSettings {
                pass_fail_only: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut set = MeasurementSet::initialize(
            definitions(),
            BTreeMap::new(),
            context,
            Box::new(NullListener),
        )
        .unwrap();
        set.update_from_input("output", "11").unwrap();
        let record = set.get("output").unwrap();
        let shown = set.display_status(record);
        assert_eq!(shown.kind, StatusKind::WithinTolerance);
        assert_eq!(shown.text, "OK");
        assert_eq!(record.current_status().kind, StatusKind::AtTolerance);
    }

    #[test]
    fn test_upload_flow() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("scan.png"), b"img").unwrap();
        let mut service = LocalUploadService::new(tmp.path());

        let (mut set, _) = build(BTreeMap::new());
        set.take_requests();

        set.upload_with("scan", "scan.png", Vec::new(), &mut service)
            .unwrap();
        let record = set.get("scan").unwrap();
        assert!(matches!(record.upload_state(), UploadState::Succeeded { .. }));
        assert_eq!(record.current_status().kind, StatusKind::Done);
        assert_eq!(set.take_requests().len(), 1);

        set.upload_with("scan", "gone.png", Vec::new(), &mut service)
            .unwrap();
        let record = set.get("scan").unwrap();
        assert!(matches!(record.upload_state(), UploadState::Failed { .. }));
        assert_eq!(record.value(), None);
        assert!(set.take_requests().is_empty());

        set.begin_upload("scan", "x.png", Vec::new()).unwrap();
        set.complete_upload("scan", Err(ServiceError::Transport("reset".to_string())))
            .unwrap();
        assert_eq!(
            set.get("scan").unwrap().upload_state(),
            &UploadState::ServerError
        );

        assert!(matches!(
            set.begin_upload("output", "x.png", Vec::new()),
            Err(SessionError::NotUpload { .. })
        ));
    }

    #[test]
    fn test_summary_counts() {
        let mut initial = BTreeMap::new();
        initial.insert("output".to_string(), InitialValue::with_value(10.0));
        let (mut set, _) = build(initial);
        set.set_skipped("interlock", true).unwrap();
        let summary = set.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.not_done, 3);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_category_filter_parse() {
        assert_eq!("all".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!("".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        let filter: CategoryFilter = "dose, safety,".parse().unwrap();
        assert!(filter.includes("safety"));
        assert!(!filter.includes("imaging"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            pass_fail_only: Some(true),
            require_comment_on_skip: Some(true),
            ..Default::default()
        };
        let options = SessionOptions {
            pass_fail_only: Some(false),
            require_comment_on_skip: None,
        };
        let settings = SessionSettings::from_config(&config, &options);
        assert!(!settings.pass_fail_only);
        assert!(settings.require_comment_on_skip);
    }
}
