//! SLO document model
//!
//! Typed representation of the `aegis.dev/v1` SLO contract, plus the
//! loader and validator that gate admission. Specs are immutable after
//! admission; a reload replaces the admitted set wholesale.

pub mod duration;
pub mod loader;
pub mod validator;

pub use duration::{format_duration, parse_duration, InvalidDuration};
pub use loader::load_from_directory;
pub use validator::Validator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected document envelope values
pub const API_VERSION: &str = "aegis.dev/v1";
pub const KIND: &str = "SLO";

/// A parsed SLO definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slo {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: SloSpec,
}

/// SLO identity and ownership
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The SLO specification body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloSpec {
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub objective: f64,
    #[serde(default)]
    pub compliance_window: String,
    #[serde(default)]
    pub evaluation_interval: String,
    #[serde(default)]
    pub sli: Sli,
    #[serde(default)]
    pub burn_policy: BurnPolicy,
    #[serde(default)]
    pub gating: Gating,
}

/// Service Level Indicator definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sli {
    /// `ratio` or `latency_threshold`
    #[serde(default, rename = "type")]
    pub sli_type: String,
    /// Latency cutoff for `latency_threshold` SLIs; embedded in the
    /// backend query, not interpreted by the evaluation core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_ms: Option<i64>,
    #[serde(default)]
    pub good: QueryRef,
    #[serde(default)]
    pub total: QueryRef,
}

/// A query template routed to the metrics adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRef {
    #[serde(default)]
    pub prometheus_query: String,
}

/// Ordered burn-rate rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnPolicy {
    #[serde(default)]
    pub rules: Vec<BurnRule>,
}

/// A single multi-window burn-rate rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_window: String,
    #[serde(default)]
    pub long_window: String,
    #[serde(default)]
    pub threshold: f64,
    /// `ALLOW`, `WARN` or `BLOCK`
    #[serde(default)]
    pub action: String,
}

/// Gating configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gating {
    /// Advisory; recorded but not enforced beyond the insufficient-data flag.
    #[serde(default)]
    pub min_data_points: i64,
    #[serde(default)]
    pub staleness_limit: String,
}

/// An SLO paired with the file it was loaded from
#[derive(Debug, Clone)]
pub struct SloWithFile {
    pub slo: Slo,
    pub file: String,
}

/// A validation failure tied to a file and a dotted field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub file: String,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        file: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.file, self.message)
        } else {
            write!(f, "{}: {}: {}", self.file, self.path, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slo_deserializes_from_camel_case_yaml() {
        let doc = r#"
apiVersion: aegis.dev/v1
kind: SLO
metadata:
  id: checkout-availability
  service: checkout
  owner: payments-team
spec:
  environment: production
  objective: 0.999
  complianceWindow: 30d
  evaluationInterval: 1m
  sli:
    type: ratio
    good:
      prometheusQuery: sum(rate(http_requests_total{code!~"5.."}[{{window}}]))
    total:
      prometheusQuery: sum(rate(http_requests_total[{{window}}]))
  burnPolicy:
    rules:
      - name: fast-burn
        shortWindow: 5m
        longWindow: 1h
        threshold: 14
        action: BLOCK
  gating:
    minDataPoints: 100
    stalenessLimit: 10m
"#;

        let slo: Slo = serde_yaml::from_str(doc).unwrap();
        assert_eq!(slo.api_version, API_VERSION);
        assert_eq!(slo.kind, KIND);
        assert_eq!(slo.metadata.id, "checkout-availability");
        assert_eq!(slo.metadata.owner.as_deref(), Some("payments-team"));
        assert_eq!(slo.spec.objective, 0.999);
        assert_eq!(slo.spec.compliance_window, "30d");
        assert_eq!(slo.spec.sli.sli_type, "ratio");
        assert_eq!(slo.spec.burn_policy.rules.len(), 1);
        assert_eq!(slo.spec.burn_policy.rules[0].action, "BLOCK");
        assert_eq!(slo.spec.gating.staleness_limit, "10m");
    }

    #[test]
    fn missing_fields_default_instead_of_failing_parse() {
        // Structural validation reports missing fields with paths; the
        // parse itself must therefore tolerate sparse documents.
        let slo: Slo = serde_yaml::from_str("metadata:\n  id: partial\n").unwrap();
        assert_eq!(slo.metadata.id, "partial");
        assert_eq!(slo.spec.objective, 0.0);
        assert!(slo.spec.burn_policy.rules.is_empty());
    }

    #[test]
    fn validation_error_display_includes_path_when_present() {
        let with_path = ValidationError::new("a.yaml", "spec.objective", "out of range");
        assert_eq!(with_path.to_string(), "a.yaml: spec.objective: out of range");

        let without_path = ValidationError::new("a.yaml", "", "unparseable");
        assert_eq!(without_path.to_string(), "a.yaml: unparseable");
    }
}
