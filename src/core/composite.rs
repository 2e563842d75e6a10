//! Composite recomputation
//!
//! Composite measurements are derived by an external calculation service
//! from the current values of the whole session. The engine never performs
//! the call itself: [`CompositeEvaluator::issue`] captures a request tagged
//! with a [`RequestToken`], the caller delivers it to a [`CompositeService`]
//! whenever and however it likes, and hands the outcome back to
//! [`CompositeEvaluator::settle`].
//!
//! Only the most recently issued request may change records. Responses for
//! superseded tokens settle as [`Settlement::Stale`] no matter in which order
//! they arrive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::entities::session::SessionMeta;
use crate::entities::tolerance::{Reference, Tolerance};
use crate::entities::value::{Attachment, MeasurementValue};

/// Identity of one issued composite request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Point-in-time view of a session, captured in one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current value of every measurement by slug
    #[serde(rename = "qavalues")]
    pub values: BTreeMap<String, Option<MeasurementValue>>,

    pub meta: SessionMeta,

    pub refs: BTreeMap<String, Option<Reference>>,

    pub tols: BTreeMap<String, Option<Tolerance>>,
}

/// Payload sent to the composite calculation service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeRequest {
    #[serde(skip)]
    pub token: RequestToken,

    /// Definition ids of the measurements to compute
    pub composite_ids: Vec<u64>,

    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

/// Computed value for one composite measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    #[serde(default)]
    pub value: Option<MeasurementValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_attached: Vec<Attachment>,
}

/// Response from the composite calculation service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeResponse {
    pub success: bool,

    #[serde(default)]
    pub results: BTreeMap<String, CompositeResult>,
}

/// Failure talking to an external service
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A composite calculation backend
pub trait CompositeService {
    fn calculate(&mut self, request: &CompositeRequest) -> Result<CompositeResponse, ServiceError>;
}

/// Service that answers every request with a fixed set of results
///
/// Used for offline evaluation of session files that carry precomputed
/// composite values, and in tests.
#[derive(Debug, Clone, Default)]
pub struct ReplayService {
    results: BTreeMap<String, CompositeResult>,
    failure: Option<ServiceError>,
    calls: usize,
}

impl ReplayService {
    pub fn new(results: BTreeMap<String, CompositeResult>) -> Self {
        Self {
            results,
            failure: None,
            calls: 0,
        }
    }

    /// Service whose every call fails with `error`
    pub fn failing(error: ServiceError) -> Self {
        Self {
            results: BTreeMap::new(),
            failure: Some(error),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl CompositeService for ReplayService {
    fn calculate(&mut self, request: &CompositeRequest) -> Result<CompositeResponse, ServiceError> {
        self.calls += 1;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        // answer only for slugs the session actually has
        let results = self
            .results
            .iter()
            .filter(|(slug, _)| request.snapshot.values.contains_key(*slug))
            .map(|(slug, result)| (slug.clone(), result.clone()))
            .collect();

        Ok(CompositeResponse {
            success: true,
            results,
        })
    }
}

/// What a settled response means for the session
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Latest response; write its results back
    Apply(CompositeResponse),

    /// Latest request failed; leave records untouched
    Failed(ServiceError),

    /// Superseded or unknown token; discard
    Stale,
}

/// Tracks issued composite requests and decides which response wins
#[derive(Debug, Clone)]
pub struct CompositeEvaluator {
    composite_ids: Vec<u64>,
    issued: u64,
    latest: Option<RequestToken>,
    outstanding: bool,
}

impl CompositeEvaluator {
    pub fn new(composite_ids: Vec<u64>) -> Self {
        Self {
            composite_ids,
            issued: 0,
            latest: None,
            outstanding: false,
        }
    }

    pub fn has_composites(&self) -> bool {
        !self.composite_ids.is_empty()
    }

    pub fn composite_ids(&self) -> &[u64] {
        &self.composite_ids
    }

    /// Capture a new request, superseding any outstanding one
    ///
    /// Returns `None` when there is nothing to compute.
    pub fn issue(&mut self, snapshot: SessionSnapshot) -> Option<CompositeRequest> {
        if !self.has_composites() {
            return None;
        }

        self.issued += 1;
        let token = RequestToken(self.issued);
        if self.outstanding {
            debug!(%token, "superseding outstanding composite request");
        }
        self.latest = Some(token);
        self.outstanding = true;
        debug!(%token, count = self.composite_ids.len(), "composite request issued");

        Some(CompositeRequest {
            token,
            composite_ids: self.composite_ids.clone(),
            snapshot,
        })
    }

    /// Resolve the outcome of a request
    pub fn settle(
        &mut self,
        token: RequestToken,
        outcome: Result<CompositeResponse, ServiceError>,
    ) -> Settlement {
        if self.latest != Some(token) || !self.outstanding {
            debug!(%token, latest = ?self.latest, "discarding stale composite response");
            return Settlement::Stale;
        }

        self.outstanding = false;
        match outcome {
            Ok(response) => Settlement::Apply(response),
            Err(err) => {
                warn!(%token, error = %err, "composite calculation failed");
                Settlement::Failed(err)
            }
        }
    }

    pub fn latest(&self) -> Option<RequestToken> {
        self.latest
    }

    /// Whether the session may be submitted
    pub fn submission_enabled(&self) -> bool {
        !self.outstanding
    }
}
