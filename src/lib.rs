//! AegisSLO
//!
//! A control-plane service that continuously evaluates Service Level
//! Objectives against time-series metrics, computes multi-window
//! error-budget burn rates, and serves deterministic deployment-gate
//! decisions (`ALLOW` / `WARN` / `BLOCK`) to CI/CD callers.
//!
//! ## Architecture
//!
//! 1. **SLO model** (`slo/`): typed YAML documents, the loader that
//!    discovers them, and the two-pass validator that gates admission.
//!
//! 2. **Metrics adapters** (`adapter/`): the `MetricsAdapter` capability
//!    with a Prometheus implementation for production and a synthetic
//!    fixture adapter for deterministic tests.
//!
//! 3. **Evaluation** (`eval/`): windowed SLI, burn-rate and budget math
//!    plus the evaluator that assembles per-tick results.
//!
//! 4. **Policy** (`policy/`): gating modifiers and multi-window burn rules
//!    aggregated into a gate decision, `BLOCK` absorbing.
//!
//! 5. **Scheduler** (`scheduler/`): one cooperative task per admitted SLO
//!    feeding a thread-safe decision cache and the audit sink.
//!
//! 6. **API** (`api/`): the axum surface CI/CD callers poll.
//!
//! 7. **Client** (`client/`): a typed client for remote callers of the
//!    decision API.
//!
//! Decisions are a pure function of the admitted spec and the metrics the
//! adapter returns; an adapter outage ages cache entries instead of
//! synthesizing a BLOCK.

pub mod adapter;
pub mod api;
pub mod audit;
pub mod client;
pub mod config;
pub mod eval;
pub mod policy;
pub mod scheduler;
pub mod slo;

pub use adapter::{MetricsAdapter, PrometheusAdapter, PrometheusConfig, SyntheticAdapter};
pub use client::AegisClient;
pub use audit::{AuditSink, MemoryAuditSink};
pub use config::{AdapterKind, ServerConfig};
pub use eval::{EvaluationResult, Evaluator};
pub use policy::{Decision, Engine, GateResult};
pub use scheduler::{Scheduler, StateCache};
pub use slo::{Slo, Validator};
