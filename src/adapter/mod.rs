//! Metrics adapter capability
//!
//! The evaluation core depends on a single small capability: given a query
//! template and a window label, return the metrics observed over that
//! window. Two implementations satisfy the contract: a Prometheus adapter
//! for production and a fixture-backed synthetic adapter for deterministic
//! scenario tests.
//!
//! # Contract
//!
//! - Every literal `{{window}}` in the query template is substituted with
//!   the window label before dispatch.
//! - The adapter returns one scalar per call, duplicated into both `good`
//!   and `total`; the evaluator calls once per role (good template, total
//!   template) and composes the pair itself.
//! - `data_timestamp` is the freshest contributing sample, or `None` when
//!   no samples exist.

pub mod prometheus;
pub mod synthetic;

pub use prometheus::{PrometheusAdapter, PrometheusConfig};
pub use synthetic::{MetricFixture, SyntheticAdapter, WindowData};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Metrics observed over a single window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMetrics {
    /// Window label, e.g. `5m`
    pub window: String,
    pub good: f64,
    pub total: f64,
    /// Freshest contributing sample, for staleness checks
    pub data_timestamp: Option<DateTime<Utc>>,
}

/// Errors surfaced by metrics adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network-level failure talking to the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success HTTP status
    #[error("http status {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Backend answered 200 but the payload was unusable
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The shared deadline elapsed before a slot or a response arrived
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// All attempts exhausted; wraps the last failure
    #[error("query failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AdapterError>,
    },

    /// Synthetic adapter: no fixture registered under that name
    #[error("fixture not found: {0}")]
    FixtureNotFound(String),

    /// Synthetic adapter: fixture has no data for the window
    #[error("window not found in fixture: {0}")]
    WindowNotFound(String),
}

/// Capability for fetching windowed metrics
///
/// Implementations must be safe to share across evaluation tasks.
#[async_trait]
pub trait MetricsAdapter: Send + Sync {
    async fn query_window(&self, query: &str, window: &str)
        -> Result<WindowMetrics, AdapterError>;
}

/// Replace every literal `{{window}}` placeholder with the window label
pub(crate) fn substitute_window(query: &str, window: &str) -> String {
    query.replace("{{window}}", window)
}
