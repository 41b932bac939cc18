//! HTTP decision API
//!
//! Read-side surface over the scheduler and its cache. Callers poll
//! `/v1/gate/decision` from CI/CD; everything is served from cached
//! evaluation state except an explicit `forceFresh` request.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scheduler::Scheduler;

/// Shared state behind every handler
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Build the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(ready))
        .route("/v1/slo", get(list_slos))
        .route("/v1/slo/:id", get(get_slo))
        .route("/v1/state/:service/:env", get(get_state))
        .route("/v1/gate/decision", post(gate_decision))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let slos_loaded = state.scheduler.slos().len();
    let cache_size = state.scheduler.cache().len();
    let ready = state.scheduler.is_ready();

    let mut reasons = Vec::new();
    if slos_loaded == 0 {
        reasons.push("no SLOs loaded".to_string());
    }
    if cache_size == 0 {
        reasons.push("no evaluations cached yet".to_string());
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            slos_loaded,
            reasons,
        }),
    )
}

async fn list_slos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let slos = state
        .scheduler
        .slos()
        .into_iter()
        .map(|s| SloSummary {
            id: s.slo.metadata.id,
            service: s.slo.metadata.service,
            environment: s.slo.spec.environment,
            objective: s.slo.spec.objective,
        })
        .collect();

    Json(SloListResponse { slos })
}

async fn get_slo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    match state.scheduler.get_slo(&id) {
        Some(slo_with_file) => Ok(Json(slo_with_file.slo)),
        None => Err(not_found(format!("SLO not found: {id}"))),
    }
}

async fn get_state(
    State(state): State<Arc<AppState>>,
    Path((service, env)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let cache = state.scheduler.cache();

    let mut matching = Vec::new();
    let mut decisions = HashMap::new();
    let mut last_updated: Option<DateTime<Utc>> = None;

    for slo_with_file in state.scheduler.slos() {
        let slo = &slo_with_file.slo;
        if slo.metadata.service != service || slo.spec.environment != env {
            continue;
        }

        let id = slo.metadata.id.clone();
        if let Some(entry) = cache.get(&id) {
            decisions.insert(id.clone(), entry.gate_result.decision.to_string());
            last_updated = Some(match last_updated {
                Some(prev) => prev.max(entry.updated_at),
                None => entry.updated_at,
            });
        }
        matching.push(id);
    }

    if matching.is_empty() {
        return Err(not_found(format!(
            "no SLOs found for service={service}, env={env}"
        )));
    }

    Ok(Json(StateResponse {
        service,
        environment: env,
        slos: matching,
        decisions,
        last_updated,
    }))
}

async fn gate_decision(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecisionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if request.slo_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "sloID required".to_string(),
            }),
        ));
    }

    if request.force_fresh {
        if let Err(err) = state.scheduler.evaluate_now(&request.slo_id).await {
            warn!(slo_id = %request.slo_id, error = %err, "forced evaluation failed");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("evaluation failed: {err}"),
                }),
            ));
        }
    }

    let entry = state
        .scheduler
        .cache()
        .get(&request.slo_id)
        .ok_or_else(|| not_found(format!("no evaluation found for SLO: {}", request.slo_id)))?;

    let burn_rates = entry
        .eval_result
        .burn_rates
        .iter()
        .map(|(window, br)| {
            (
                window.clone(),
                BurnRateInfo {
                    burn_rate: br.burn_rate,
                },
            )
        })
        .collect();

    Ok(Json(DecisionResponse {
        decision: entry.gate_result.decision.to_string(),
        slo_id: entry.eval_result.slo_id.clone(),
        timestamp: entry.eval_result.timestamp,
        ttl: entry.ttl.as_secs(),
        sli: SliInfo {
            value: entry.eval_result.sli.value,
            error_rate: entry.eval_result.sli.error_rate,
            budget_remaining: entry.eval_result.budget_remaining,
        },
        reasons: entry.gate_result.reasons.clone(),
        burn_rates,
        is_stale: entry.gate_result.is_stale,
        has_no_traffic: entry.gate_result.has_no_traffic,
    }))
}

fn not_found(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message }))
}

/// Gate decision request body
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    #[serde(rename = "sloID")]
    pub slo_id: String,
    #[serde(default, rename = "forceFresh")]
    pub force_fresh: bool,
}

/// Gate decision payload served to CI/CD callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub decision: String,
    #[serde(rename = "sloID")]
    pub slo_id: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds; callers compare `timestamp + ttl` against now to detect
    /// aging entries during adapter outages.
    pub ttl: u64,
    pub sli: SliInfo,
    pub reasons: Vec<String>,
    pub burn_rates: HashMap<String, BurnRateInfo>,
    pub is_stale: bool,
    pub has_no_traffic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliInfo {
    pub value: f64,
    pub error_rate: f64,
    pub budget_remaining: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRateInfo {
    pub burn_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloListResponse {
    pub slos: Vec<SloSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloSummary {
    pub id: String,
    pub service: String,
    pub environment: String,
    pub objective: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub service: String,
    pub environment: String,
    pub slos: Vec<String>,
    pub decisions: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    pub slos_loaded: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
