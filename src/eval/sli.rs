//! SLI, burn-rate and budget math

use serde::{Deserialize, Serialize};

/// Computed SLI for one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliResult {
    /// `good / total`, in [0, 1]
    pub value: f64,
    /// `max(0, 1 - value)`, in [0, 1]
    pub error_rate: f64,
    /// True iff the window saw no traffic at all
    pub insufficient_data: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// Compute the SLI from good and total counters
///
/// `good` is clamped to `total`; a window with `total == 0` yields the
/// insufficient-data result rather than an error.
pub fn compute_sli(good: f64, total: f64) -> SliResult {
    if total == 0.0 {
        return SliResult {
            value: 0.0,
            error_rate: 0.0,
            insufficient_data: true,
            reason: "no traffic (total=0)".to_string(),
        };
    }

    let good = good.min(total);
    let value = good / total;
    let error_rate = (1.0 - value).max(0.0);

    SliResult {
        value,
        error_rate,
        insufficient_data: false,
        reason: String::new(),
    }
}

/// `burn_rate = error_rate / (1 - objective)`
///
/// A non-positive error budget yields 0.
pub fn compute_burn_rate(error_rate: f64, objective: f64) -> f64 {
    let error_budget = 1.0 - objective;
    if error_budget <= 0.0 {
        return 0.0;
    }
    error_rate / error_budget
}

/// Remaining error budget over the compliance window, clamped to [0, 1]
pub fn compute_budget_remaining(error_rate: f64, objective: f64) -> f64 {
    let error_budget = 1.0 - objective;
    if error_budget <= 0.0 {
        return 0.0;
    }
    let consumed = error_rate.max(0.0) / error_budget;
    (1.0 - consumed).clamp(0.0, 1.0)
}
