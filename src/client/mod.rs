//! Client for the AegisSLO decision API
//!
//! Used by CI/CD callers and other services to poll gate decisions
//! remotely. `WARN` is operator-defined; safety-critical callers treat it
//! as blocking via [`GateCheck::is_passing`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::{DecisionResponse, ReadyResponse, SloListResponse};
use crate::policy::Decision;
use crate::slo::Slo;

/// Client-side failures talking to an AegisSLO server
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

/// Outcome of a gate check, decoded for callers
#[derive(Debug, Clone)]
pub struct GateCheck {
    pub decision: Decision,
    pub response: DecisionResponse,
}

impl GateCheck {
    /// Whether a deployment may proceed
    ///
    /// `ALLOW` always passes and `BLOCK` never does; `WARN` passes unless
    /// the caller opts into strict mode.
    pub fn is_passing(&self, strict: bool) -> bool {
        match self.decision {
            Decision::Allow => true,
            Decision::Warn => !strict,
            Decision::Block => false,
        }
    }
}

/// AegisSLO API client
pub struct AegisClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl AegisClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Readiness of the server (admitted set + warm cache)
    pub async fn ready(&self) -> Result<ReadyResponse, ClientError> {
        let url = format!("{}/readyz", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        // readyz answers 503 with the same body when not ready.
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// List admitted SLOs
    pub async fn list_slos(&self) -> Result<SloListResponse, ClientError> {
        self.get_json(&format!("{}/v1/slo", self.base_url)).await
    }

    /// Fetch one admitted SLO spec
    pub async fn get_slo(&self, slo_id: &str) -> Result<Slo, ClientError> {
        self.get_json(&format!("{}/v1/slo/{slo_id}", self.base_url))
            .await
    }

    /// Request a gate decision for an SLO
    pub async fn gate_decision(
        &self,
        slo_id: &str,
        force_fresh: bool,
    ) -> Result<GateCheck, ClientError> {
        let url = format!("{}/v1/gate/decision", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({"sloID": slo_id, "forceFresh": force_fresh}))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server { status, message });
        }

        let decision_response: DecisionResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        let decision = decision_response
            .decision
            .parse::<Decision>()
            .map_err(ClientError::Parse)?;

        Ok(GateCheck {
            decision,
            response: decision_response,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}
