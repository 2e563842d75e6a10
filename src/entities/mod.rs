//! Entity type definitions
//!
//! The data a QA session is built from:
//!
//! - [`MeasurementDefinition`] - what is measured, its kind and category
//! - [`Reference`] / [`Tolerance`] - the target value and acceptance band
//! - [`MeasurementValue`] - an entered, derived or uploaded value
//! - [`SessionFile`] - definitions, persisted values and session metadata

pub mod definition;
pub mod session;
pub mod tolerance;
pub mod value;

pub use definition::{EvaluationKind, MeasurementDefinition};
pub use session::{InitialValue, SessionFile, SessionMeta, SessionOptions};
pub use tolerance::{Reference, ReferenceKind, Tolerance, ToleranceError, ToleranceMode};
pub use value::{Attachment, MeasurementValue, UploadValue};
