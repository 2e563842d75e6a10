//! Core module - the evaluation engine
//!
//! - [`rule`] classifies a single value against a reference and tolerance
//! - [`record`] holds the mutable state of one measurement
//! - [`composite`] tracks derived-value requests so only the latest lands
//! - [`set`] owns a session's records and the aggregate state

pub mod composite;
pub mod config;
pub mod record;
pub mod rule;
pub mod set;
pub mod status;
pub mod upload;

pub use composite::{
    CompositeEvaluator, CompositeRequest, CompositeResponse, CompositeResult, CompositeService,
    ReplayService, RequestToken, ServiceError, SessionSnapshot, Settlement,
};
pub use config::Config;
pub use record::{MeasurementRecord, RecordState, UploadState};
pub use rule::ToleranceRule;
pub use set::{
    CategoryFilter, MeasurementSet, NullListener, SessionContext, SessionError, SessionEvent,
    SessionListener, SessionSettings, StatusSummary, SubmissionEntry,
};
pub use status::{DisplayStatus, Status, StatusKind, StatusLabels};
pub use upload::{LocalUploadService, UploadRequest, UploadResponse, UploadService};
