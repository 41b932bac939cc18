//! SLO evaluation
//!
//! For one SLO and one instant, the evaluator collects every window the
//! spec references, fetches good/total metrics through the adapter, runs
//! the SLI and burn-rate math and assembles an [`EvaluationResult`] for the
//! policy engine.

pub mod sli;

pub use sli::{compute_budget_remaining, compute_burn_rate, compute_sli, SliResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::{AdapterError, MetricsAdapter, WindowMetrics};
use crate::slo::{parse_duration, Slo};

/// Burn rate computed for one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRateResult {
    pub window: String,
    pub burn_rate: f64,
    pub sli: f64,
    pub error_rate: f64,
}

/// Complete evaluation of one SLO at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub slo_id: String,
    /// SLI over the compliance window
    pub sli: SliResult,
    /// Keyed by window label; covers the compliance window and every
    /// window referenced by a burn rule.
    pub burn_rates: HashMap<String, BurnRateResult>,
    /// Remaining error budget over the compliance window, in [0, 1]
    pub budget_remaining: f64,
    /// True iff any required window had zero traffic
    pub insufficient_data: bool,
    /// True iff any required window's data is older than the staleness limit
    pub is_stale: bool,
    pub timestamp: DateTime<Utc>,
}

/// Evaluator failures abort the tick; the previous cache entry survives
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("query {role} metrics (window={window}): {source}")]
    Query {
        window: String,
        role: &'static str,
        #[source]
        source: AdapterError,
    },

    #[error("missing metrics for compliance window {0:?}")]
    MissingComplianceWindow(String),
}

/// Evaluates SLOs against a metrics adapter
pub struct Evaluator {
    adapter: Arc<dyn MetricsAdapter>,
}

impl Evaluator {
    pub fn new(adapter: Arc<dyn MetricsAdapter>) -> Self {
        Self { adapter }
    }

    /// Evaluate one SLO at `now`
    pub async fn evaluate(&self, slo: &Slo, now: DateTime<Utc>) -> Result<EvaluationResult, EvalError> {
        let windows = collect_windows(slo);

        // Staleness only applies when the spec configures a limit; a limit
        // that fails to parse was already rejected at admission.
        let staleness_limit: Option<Duration> = if slo.spec.gating.staleness_limit.is_empty() {
            None
        } else {
            parse_duration(&slo.spec.gating.staleness_limit).ok()
        };

        let mut is_stale = false;
        let mut window_metrics: HashMap<String, WindowMetrics> = HashMap::with_capacity(windows.len());

        for window in &windows {
            let good = self
                .adapter
                .query_window(&slo.spec.sli.good.prometheus_query, window)
                .await
                .map_err(|source| EvalError::Query {
                    window: window.clone(),
                    role: "good",
                    source,
                })?;

            let total = self
                .adapter
                .query_window(&slo.spec.sli.total.prometheus_query, window)
                .await
                .map_err(|source| EvalError::Query {
                    window: window.clone(),
                    role: "total",
                    source,
                })?;

            // Prefer the newest timestamp of the two roles so one missing
            // or older series does not mark the window stale on its own.
            let chosen_ts = match (good.data_timestamp, total.data_timestamp) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (ts, None) | (None, ts) => ts,
            };

            if let (Some(limit), Some(ts)) = (staleness_limit, chosen_ts) {
                let age = now.signed_duration_since(ts).to_std().unwrap_or_default();
                if age > limit {
                    is_stale = true;
                }
            }

            window_metrics.insert(
                window.clone(),
                WindowMetrics {
                    window: window.clone(),
                    good: good.good,
                    total: total.total,
                    data_timestamp: chosen_ts,
                },
            );
        }

        let compliance = window_metrics
            .get(&slo.spec.compliance_window)
            .ok_or_else(|| EvalError::MissingComplianceWindow(slo.spec.compliance_window.clone()))?;

        let compliance_sli = compute_sli(compliance.good, compliance.total);

        let mut insufficient_data = false;
        let mut burn_rates = HashMap::with_capacity(window_metrics.len());
        for (window, metrics) in &window_metrics {
            let sli_result = compute_sli(metrics.good, metrics.total);
            if sli_result.insufficient_data {
                insufficient_data = true;
            }

            burn_rates.insert(
                window.clone(),
                BurnRateResult {
                    window: window.clone(),
                    burn_rate: compute_burn_rate(sli_result.error_rate, slo.spec.objective),
                    sli: sli_result.value,
                    error_rate: sli_result.error_rate,
                },
            );
        }

        let budget_remaining =
            compute_budget_remaining(compliance_sli.error_rate, slo.spec.objective);

        Ok(EvaluationResult {
            slo_id: slo.metadata.id.clone(),
            sli: compliance_sli,
            burn_rates,
            budget_remaining,
            insufficient_data,
            is_stale,
            timestamp: now,
        })
    }
}

/// The unique windows an evaluation must cover: the compliance window plus
/// both windows of every burn rule.
fn collect_windows(slo: &Slo) -> Vec<String> {
    let mut windows = vec![slo.spec.compliance_window.clone()];
    for rule in &slo.spec.burn_policy.rules {
        for window in [&rule.short_window, &rule.long_window] {
            if !windows.contains(window) {
                windows.push(window.clone());
            }
        }
    }
    windows
}
