//! Fixture-backed metrics adapter
//!
//! Deterministic stand-in for the Prometheus adapter. Fixtures map a name
//! to per-window `(good, total, timestamp)` tuples; queries are either
//! `fixture:<name>` or the bare fixture name. Scenario tests drive the
//! whole evaluation pipeline through this adapter.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{AdapterError, MetricsAdapter, WindowMetrics};

/// On-disk fixture format: `{"windows": {"5m": {"good": .., "total": ..}}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricFixture {
    #[serde(default)]
    pub windows: HashMap<String, WindowData>,
}

/// Metrics for one window of a fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowData {
    pub good: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_timestamp: Option<DateTime<Utc>>,
}

/// Deterministic fixture-backed adapter
#[derive(Debug, Default)]
pub struct SyntheticAdapter {
    fixtures: RwLock<HashMap<String, MetricFixture>>,
}

impl SyntheticAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture directly
    pub fn set_fixture(&self, name: impl Into<String>, fixture: MetricFixture) {
        self.fixtures.write().insert(name.into(), fixture);
    }

    /// Load a fixture from a JSON file
    pub fn load_fixture(
        &self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<(), AdapterError> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|err| AdapterError::BadResponse(format!("failed to read fixture: {err}")))?;
        let fixture: MetricFixture = serde_json::from_str(&data)
            .map_err(|err| AdapterError::BadResponse(format!("failed to parse fixture: {err}")))?;
        self.set_fixture(name, fixture);
        Ok(())
    }

    fn fixture_name(query: &str) -> &str {
        query.strip_prefix("fixture:").unwrap_or(query)
    }
}

#[async_trait]
impl MetricsAdapter for SyntheticAdapter {
    async fn query_window(
        &self,
        query: &str,
        window: &str,
    ) -> Result<WindowMetrics, AdapterError> {
        let name = Self::fixture_name(query);

        let fixtures = self.fixtures.read();
        let fixture = fixtures
            .get(name)
            .ok_or_else(|| AdapterError::FixtureNotFound(name.to_string()))?;
        let data = fixture
            .windows
            .get(window)
            .ok_or_else(|| AdapterError::WindowNotFound(window.to_string()))?;

        Ok(WindowMetrics {
            window: window.to_string(),
            good: data.good,
            total: data.total,
            data_timestamp: data.data_timestamp,
        })
    }
}
