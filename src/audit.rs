//! Audit sink contract
//!
//! The scheduler fans every admitted definition and every evaluation to a
//! sink through this write-only interface. All calls are best-effort:
//! failures are logged by the caller and never affect the decision cache.
//! Durable persistence lives behind this boundary and out of this crate.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::eval::EvaluationResult;
use crate::policy::GateResult;
use crate::slo::Slo;

/// Sink failure; callers log and continue
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit sink failure: {0}")]
    Other(String),
}

/// Write-only audit contract
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Called once per admitted SLO at startup
    async fn store_slo_definition(&self, slo: &Slo) -> Result<(), AuditError>;

    /// Append-only record of one evaluation tick
    async fn store_evaluation(
        &self,
        eval_result: &EvaluationResult,
        gate_result: &GateResult,
    ) -> Result<(), AuditError>;

    /// Upsert of the latest state for one SLO
    async fn update_latest_state(
        &self,
        slo_id: &str,
        eval_result: &EvaluationResult,
        gate_result: &GateResult,
    ) -> Result<(), AuditError>;
}

/// One audited evaluation
#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub eval_result: EvaluationResult,
    pub gate_result: GateResult,
}

#[derive(Debug, Default)]
struct MemoryAuditState {
    definitions: Vec<Slo>,
    evaluations: Vec<EvaluationRecord>,
    latest: HashMap<String, EvaluationRecord>,
}

/// In-memory sink for tests and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    state: Mutex<MemoryAuditState>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(&self) -> Vec<Slo> {
        self.state.lock().definitions.clone()
    }

    pub fn evaluations(&self) -> Vec<EvaluationRecord> {
        self.state.lock().evaluations.clone()
    }

    pub fn latest_state(&self, slo_id: &str) -> Option<EvaluationRecord> {
        self.state.lock().latest.get(slo_id).cloned()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn store_slo_definition(&self, slo: &Slo) -> Result<(), AuditError> {
        self.state.lock().definitions.push(slo.clone());
        Ok(())
    }

    async fn store_evaluation(
        &self,
        eval_result: &EvaluationResult,
        gate_result: &GateResult,
    ) -> Result<(), AuditError> {
        self.state.lock().evaluations.push(EvaluationRecord {
            eval_result: eval_result.clone(),
            gate_result: gate_result.clone(),
        });
        Ok(())
    }

    async fn update_latest_state(
        &self,
        slo_id: &str,
        eval_result: &EvaluationResult,
        gate_result: &GateResult,
    ) -> Result<(), AuditError> {
        self.state.lock().latest.insert(
            slo_id.to_string(),
            EvaluationRecord {
                eval_result: eval_result.clone(),
                gate_result: gate_result.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Decision;
    use chrono::Utc;

    fn record(slo_id: &str, decision: Decision) -> (EvaluationResult, GateResult) {
        (
            EvaluationResult {
                slo_id: slo_id.to_string(),
                sli: Default::default(),
                burn_rates: HashMap::new(),
                budget_remaining: 1.0,
                insufficient_data: false,
                is_stale: false,
                timestamp: Utc::now(),
            },
            GateResult {
                decision,
                rule_results: Vec::new(),
                reasons: Vec::new(),
                is_stale: false,
                has_no_traffic: false,
            },
        )
    }

    #[tokio::test]
    async fn evaluations_append_and_latest_upserts() {
        let sink = MemoryAuditSink::new();

        let (eval1, gate1) = record("a", Decision::Allow);
        let (eval2, gate2) = record("a", Decision::Block);

        sink.store_evaluation(&eval1, &gate1).await.unwrap();
        sink.store_evaluation(&eval2, &gate2).await.unwrap();
        sink.update_latest_state("a", &eval1, &gate1).await.unwrap();
        sink.update_latest_state("a", &eval2, &gate2).await.unwrap();

        assert_eq!(sink.evaluations().len(), 2);
        let latest = sink.latest_state("a").unwrap();
        assert_eq!(latest.gate_result.decision, Decision::Block);
    }

    #[tokio::test]
    async fn definitions_accumulate() {
        let sink = MemoryAuditSink::new();
        let slo = Slo::default();
        sink.store_slo_definition(&slo).await.unwrap();
        sink.store_slo_definition(&slo).await.unwrap();
        assert_eq!(sink.definitions().len(), 2);
    }
}
