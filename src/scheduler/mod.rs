//! Evaluation scheduler
//!
//! Owns admission and the periodic evaluation loops. `load_slos` runs the
//! loader and validator and rejects the whole set on any error. `start`
//! spawns one cooperative task per admitted SLO; each task evaluates
//! immediately, then on every `evaluationInterval` tick runs the evaluator
//! and policy engine, writes the cache entry and fans the result to the
//! audit sink. Evaluation errors leave the previous cache entry in place.

pub mod cache;

pub use cache::{EvaluationState, StateCache};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::AuditSink;
use crate::eval::Evaluator;
use crate::policy::Engine;
use crate::slo::{
    load_from_directory, parse_duration, InvalidDuration, Slo, SloWithFile, ValidationError,
    Validator,
};

/// Scheduler lifecycle and admission errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("SLO validation failed: {} error(s)", .errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("no SLOs found in {0}")]
    NoSlosFound(String),

    #[error("scheduler already running")]
    AlreadyRunning,

    #[error("no SLOs loaded")]
    NotLoaded,

    #[error("SLO not found: {0}")]
    SloNotFound(String),

    #[error("invalid evaluation interval: {0}")]
    InvalidInterval(#[from] InvalidDuration),
}

/// Pieces shared with every evaluation task
struct EvalPipeline {
    evaluator: Arc<Evaluator>,
    policy_engine: Arc<Engine>,
    cache: Arc<StateCache>,
    audit: Mutex<Option<Arc<dyn AuditSink>>>,
}

impl EvalPipeline {
    /// One evaluation tick: evaluate, decide, cache, fan out
    async fn evaluate_once(&self, slo: &Slo, ttl: Duration) {
        let now = Utc::now();

        let eval_result = match self.evaluator.evaluate(slo, now).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    slo_id = %slo.metadata.id,
                    error = %err,
                    "evaluation failed, previous cache entry retained"
                );
                return;
            }
        };

        let gate_result = self.policy_engine.evaluate(slo, &eval_result);

        info!(
            slo_id = %slo.metadata.id,
            decision = %gate_result.decision,
            sli = eval_result.sli.value,
            "evaluated SLO"
        );

        self.cache.set(
            slo.metadata.id.clone(),
            EvaluationState {
                eval_result: eval_result.clone(),
                gate_result: gate_result.clone(),
                updated_at: now,
                ttl,
            },
        );

        let audit = self.audit.lock().clone();
        if let Some(audit) = audit {
            if let Err(err) = audit.store_evaluation(&eval_result, &gate_result).await {
                warn!(slo_id = %slo.metadata.id, error = %err, "failed to store evaluation");
            }
            if let Err(err) = audit
                .update_latest_state(&slo.metadata.id, &eval_result, &gate_result)
                .await
            {
                warn!(slo_id = %slo.metadata.id, error = %err, "failed to update latest state");
            }
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    slos: Vec<SloWithFile>,
    running: bool,
    cancel: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

/// Manages periodic SLO evaluations
pub struct Scheduler {
    pipeline: Arc<EvalPipeline>,
    slo_directory: PathBuf,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        evaluator: Arc<Evaluator>,
        policy_engine: Arc<Engine>,
        slo_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline: Arc::new(EvalPipeline {
                evaluator,
                policy_engine,
                cache: Arc::new(StateCache::new()),
                audit: Mutex::new(None),
            }),
            slo_directory: slo_directory.into(),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Attach an audit sink; evaluations fan out to it best-effort
    pub fn set_audit_sink(&self, sink: Arc<dyn AuditSink>) {
        *self.pipeline.audit.lock() = Some(sink);
    }

    /// Load and admit the SLO set from the configured directory
    ///
    /// Admission is all-or-nothing: any load or validation error rejects
    /// the whole set and the scheduler must not start.
    pub async fn load_slos(&self) -> Result<(), SchedulerError> {
        let (slos, mut errors) = load_from_directory(&self.slo_directory);

        let validator = Validator::new();
        for slo_with_file in &slos {
            errors.extend(validator.validate_structure(&slo_with_file.file, &slo_with_file.slo));
        }
        errors.extend(validator.validate_set(&slos));

        if !errors.is_empty() {
            return Err(SchedulerError::ValidationFailed { errors });
        }
        if slos.is_empty() {
            return Err(SchedulerError::NoSlosFound(
                self.slo_directory.display().to_string(),
            ));
        }

        let count = slos.len();
        self.state.lock().slos = slos.clone();

        let audit = self.pipeline.audit.lock().clone();
        if let Some(audit) = audit {
            for slo_with_file in &slos {
                if let Err(err) = audit.store_slo_definition(&slo_with_file.slo).await {
                    warn!(
                        slo_id = %slo_with_file.slo.metadata.id,
                        error = %err,
                        "failed to store SLO definition"
                    );
                }
            }
        }

        info!(count, "loaded SLOs");
        Ok(())
    }

    /// Spawn one evaluation task per admitted SLO; fails when already
    /// running or nothing is loaded.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.running {
            return Err(SchedulerError::AlreadyRunning);
        }
        if state.slos.is_empty() {
            return Err(SchedulerError::NotLoaded);
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(state.slos.len());
        for slo_with_file in &state.slos {
            handles.push(tokio::spawn(evaluate_loop(
                self.pipeline.clone(),
                slo_with_file.slo.clone(),
                cancel.clone(),
            )));
        }

        info!(count = handles.len(), "started scheduler");
        state.cancel = Some(cancel);
        state.handles = handles;
        state.running = true;
        Ok(())
    }

    /// Cancel every task and wait for them to return
    pub async fn stop(&self) {
        let handles = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            state.running = false;
            std::mem::take(&mut state.handles)
        };

        let _ = join_all(handles).await;
        info!("scheduler stopped");
    }

    /// Run one off-cycle evaluation for the named SLO
    ///
    /// Shares the cache with the tick loop; per-key writes are atomic and
    /// the last writer wins.
    pub async fn evaluate_now(&self, slo_id: &str) -> Result<(), SchedulerError> {
        let slo = {
            let state = self.state.lock();
            state
                .slos
                .iter()
                .find(|s| s.slo.metadata.id == slo_id)
                .map(|s| s.slo.clone())
        }
        .ok_or_else(|| SchedulerError::SloNotFound(slo_id.to_string()))?;

        let interval = parse_duration(&slo.spec.evaluation_interval)?;
        self.pipeline.evaluate_once(&slo, interval).await;
        Ok(())
    }

    /// Snapshot of the admitted SLO set
    pub fn slos(&self) -> Vec<SloWithFile> {
        self.state.lock().slos.clone()
    }

    /// Find one admitted SLO by id
    pub fn get_slo(&self, slo_id: &str) -> Option<SloWithFile> {
        self.state
            .lock()
            .slos
            .iter()
            .find(|s| s.slo.metadata.id == slo_id)
            .cloned()
    }

    pub fn cache(&self) -> Arc<StateCache> {
        self.pipeline.cache.clone()
    }

    /// Ready iff the admitted set is non-empty and at least one evaluation
    /// has landed in the cache.
    pub fn is_ready(&self) -> bool {
        !self.state.lock().slos.is_empty() && !self.pipeline.cache.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn set_slos_for_test(&self, slos: Vec<SloWithFile>) {
        self.state.lock().slos = slos;
    }
}

/// Periodic evaluation loop for a single SLO
async fn evaluate_loop(pipeline: Arc<EvalPipeline>, slo: Slo, cancel: CancellationToken) {
    // Admission verified the interval; a task still refuses to run with a
    // broken one rather than panic.
    let interval = match parse_duration(&slo.spec.evaluation_interval) {
        Ok(d) => d,
        Err(err) => {
            error!(slo_id = %slo.metadata.id, error = %err, "invalid evaluation interval");
            return;
        }
    };

    pipeline.evaluate_once(&slo, interval).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; the initial evaluation already ran
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => pipeline.evaluate_once(&slo, interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MetricFixture, SyntheticAdapter, WindowData};
    use crate::audit::MemoryAuditSink;
    use crate::policy::Decision;
    use crate::slo::{BurnPolicy, BurnRule, Metadata, QueryRef, Sli, SloSpec};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_slo(id: &str) -> Slo {
        Slo {
            api_version: crate::slo::API_VERSION.to_string(),
            kind: crate::slo::KIND.to_string(),
            metadata: Metadata {
                id: id.to_string(),
                service: "checkout".to_string(),
                owner: None,
                description: None,
            },
            spec: SloSpec {
                environment: "production".to_string(),
                objective: 0.999,
                compliance_window: "30d".to_string(),
                evaluation_interval: "1s".to_string(),
                sli: Sli {
                    sli_type: "ratio".to_string(),
                    threshold_ms: None,
                    good: QueryRef {
                        prometheus_query: "checkout".to_string(),
                    },
                    total: QueryRef {
                        prometheus_query: "checkout".to_string(),
                    },
                },
                burn_policy: BurnPolicy {
                    rules: vec![BurnRule {
                        name: "fast-burn".to_string(),
                        short_window: "5m".to_string(),
                        long_window: "1h".to_string(),
                        threshold: 14.0,
                        action: "BLOCK".to_string(),
                    }],
                },
                gating: Default::default(),
            },
        }
    }

    fn healthy_adapter() -> Arc<SyntheticAdapter> {
        let adapter = Arc::new(SyntheticAdapter::new());
        let mut windows = HashMap::new();
        for window in ["30d", "5m", "1h"] {
            windows.insert(
                window.to_string(),
                WindowData {
                    good: 99_950.0,
                    total: 100_000.0,
                    data_timestamp: None,
                },
            );
        }
        adapter.set_fixture("checkout", MetricFixture { windows });
        adapter
    }

    fn scheduler_with(adapter: Arc<SyntheticAdapter>, dir: &std::path::Path) -> Scheduler {
        Scheduler::new(
            Arc::new(Evaluator::new(adapter)),
            Arc::new(Engine::new()),
            dir,
        )
    }

    async fn wait_for_cache(scheduler: &Scheduler, id: &str) -> Arc<EvaluationState> {
        for _ in 0..100 {
            if let Some(state) = scheduler.cache().get(id) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache entry for {id} never appeared");
    }

    #[tokio::test]
    async fn start_evaluates_immediately_and_stop_joins() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        scheduler.set_slos_for_test(vec![SloWithFile {
            slo: test_slo("checkout-availability"),
            file: "checkout.yaml".to_string(),
        }]);

        scheduler.start().unwrap();
        let state = wait_for_cache(&scheduler, "checkout-availability").await;
        assert_eq!(state.gate_result.decision, Decision::Allow);
        assert_eq!(state.ttl, Duration::from_secs(1));
        assert!(scheduler.is_ready());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn second_start_fails() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        scheduler.set_slos_for_test(vec![SloWithFile {
            slo: test_slo("a"),
            file: "a.yaml".to_string(),
        }]);

        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::AlreadyRunning)
        ));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_without_load_fails() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        assert!(matches!(scheduler.start(), Err(SchedulerError::NotLoaded)));
    }

    #[tokio::test]
    async fn evaluate_now_writes_the_cache_off_cycle() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        scheduler.set_slos_for_test(vec![SloWithFile {
            slo: test_slo("a"),
            file: "a.yaml".to_string(),
        }]);

        scheduler.evaluate_now("a").await.unwrap();
        assert!(scheduler.cache().get("a").is_some());

        assert!(matches!(
            scheduler.evaluate_now("missing").await,
            Err(SchedulerError::SloNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_evaluation_retains_previous_entry() {
        let dir = TempDir::new().unwrap();
        let adapter = healthy_adapter();
        let scheduler = scheduler_with(adapter.clone(), dir.path());
        scheduler.set_slos_for_test(vec![SloWithFile {
            slo: test_slo("a"),
            file: "a.yaml".to_string(),
        }]);

        scheduler.evaluate_now("a").await.unwrap();
        let before = scheduler.cache().get("a").unwrap();

        // Break the fixture: the next evaluation fails and must not touch
        // the cached entry.
        adapter.set_fixture("checkout", MetricFixture::default());
        scheduler.evaluate_now("a").await.unwrap();

        let after = scheduler.cache().get("a").unwrap();
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[tokio::test]
    async fn audit_sink_receives_definitions_and_evaluations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("checkout.yaml"),
            serde_yaml::to_string(&test_slo("checkout-availability")).unwrap(),
        )
        .unwrap();

        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        let sink = Arc::new(MemoryAuditSink::new());
        scheduler.set_audit_sink(sink.clone());

        scheduler.load_slos().await.unwrap();
        assert_eq!(sink.definitions().len(), 1);

        scheduler.evaluate_now("checkout-availability").await.unwrap();
        assert_eq!(sink.evaluations().len(), 1);
        assert!(sink.latest_state("checkout-availability").is_some());
    }

    #[tokio::test]
    async fn admission_rejects_on_any_validation_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("good.yaml"),
            serde_yaml::to_string(&test_slo("good")).unwrap(),
        )
        .unwrap();

        let mut bad = test_slo("bad");
        bad.spec.objective = 1.5;
        std::fs::write(
            dir.path().join("bad.yaml"),
            serde_yaml::to_string(&bad).unwrap(),
        )
        .unwrap();

        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        let err = scheduler.load_slos().await.unwrap_err();
        match err {
            SchedulerError::ValidationFailed { errors } => {
                assert!(!errors.is_empty());
            }
            other => panic!("expected validation failure, got {other}"),
        }

        // Nothing admitted: the scheduler refuses to start.
        assert!(matches!(scheduler.start(), Err(SchedulerError::NotLoaded)));
    }

    #[tokio::test]
    async fn empty_directory_is_not_admissible() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_with(healthy_adapter(), dir.path());
        assert!(matches!(
            scheduler.load_slos().await,
            Err(SchedulerError::NoSlosFound(_))
        ));
    }
}
