//! Prometheus metrics adapter
//!
//! Executes instant queries against `GET {url}/api/v1/query`. Outbound
//! concurrency across all evaluation tasks is capped by a counting
//! semaphore; slot acquisition and every request attempt share one
//! deadline. Transport failures, non-2xx statuses and `status != success`
//! payloads are retried up to `retry_count` additional attempts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;

use super::{substitute_window, AdapterError, MetricsAdapter, WindowMetrics};

/// Prometheus adapter configuration
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL of the Prometheus server
    pub url: String,
    /// Shared deadline for slot acquisition and each request attempt
    pub timeout: Duration,
    /// Cap on in-flight outbound queries across all tasks
    pub max_concurrency: usize,
    /// Additional attempts after the first failure
    pub retry_count: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl PrometheusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
            max_concurrency: 10,
            retry_count: 1,
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_retries(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }
}

/// Instant-query adapter over the Prometheus HTTP API
pub struct PrometheusAdapter {
    config: PrometheusConfig,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl PrometheusAdapter {
    pub fn new(config: PrometheusConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AdapterError::Transport(format!("failed to build client: {err}")))?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));

        Ok(Self {
            config,
            client,
            semaphore,
        })
    }

    async fn execute_query(&self, query: &str) -> Result<QueryResponse, AdapterError> {
        let url = format!("{}/api/v1/query", self.config.url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(AdapterError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|err| AdapterError::BadResponse(format!("parse response: {err}")))?;

        if parsed.status != "success" {
            return Err(AdapterError::BadResponse(format!(
                "prometheus error: {}",
                parsed.error
            )));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl MetricsAdapter for PrometheusAdapter {
    async fn query_window(
        &self,
        query: &str,
        window: &str,
    ) -> Result<WindowMetrics, AdapterError> {
        let instant_query = substitute_window(query, window);
        let deadline = tokio::time::Instant::now() + self.config.timeout;

        // The slot and every attempt below share this deadline.
        let _permit = tokio::time::timeout_at(deadline, self.semaphore.acquire())
            .await
            .map_err(|_| AdapterError::Timeout(self.config.timeout))?
            .map_err(|_| AdapterError::Transport("semaphore closed".to_string()))?;

        let mut last_err = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match tokio::time::timeout_at(deadline, self.execute_query(&instant_query)).await {
                Ok(Ok(response)) => {
                    let value = extract_scalar_value(&response);
                    let timestamp = extract_timestamp(&response);
                    return Ok(WindowMetrics {
                        window: window.to_string(),
                        good: value,
                        // Instant queries yield one scalar; the evaluator
                        // queries each role separately and composes.
                        total: value,
                        data_timestamp: timestamp,
                    });
                }
                Ok(Err(err)) => last_err = Some(err),
                Err(_) => last_err = Some(AdapterError::Timeout(self.config.timeout)),
            }
        }

        Err(AdapterError::RetriesExhausted {
            attempts: self.config.retry_count + 1,
            source: Box::new(
                last_err.unwrap_or_else(|| AdapterError::Transport("no attempts made".to_string())),
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: QueryData,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default, rename = "resultType")]
    #[allow(dead_code)]
    result_type: String,
    #[serde(default)]
    result: Vec<VectorResult>,
}

#[derive(Debug, Deserialize)]
struct VectorResult {
    #[serde(default)]
    #[allow(dead_code)]
    metric: HashMap<String, String>,
    /// `[unix_seconds, string-encoded float]`
    value: (f64, String),
}

/// Sum the sample values across all vector results
fn extract_scalar_value(response: &QueryResponse) -> f64 {
    response
        .data
        .result
        .iter()
        .map(|r| r.value.1.parse::<f64>().unwrap_or(0.0))
        .sum()
}

/// Freshest sample timestamp across all vector results
fn extract_timestamp(response: &QueryResponse) -> Option<DateTime<Utc>> {
    response
        .data
        .result
        .iter()
        .filter_map(|r| DateTime::<Utc>::from_timestamp(r.value.0 as i64, 0))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    async fn serve_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn vector_response(samples: &[(f64, &str)]) -> serde_json::Value {
        let result: Vec<_> = samples
            .iter()
            .map(|(ts, value)| json!({"metric": {"job": "test"}, "value": [ts, value]}))
            .collect();
        json!({"status": "success", "data": {"resultType": "vector", "result": result}})
    }

    #[tokio::test]
    async fn query_substitutes_window_and_parses_response() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params["query"], "rate(requests[5m])");
                Json(vector_response(&[(1_700_000_000.0, "100.5")]))
            }),
        );
        let url = serve_mock(router).await;

        let adapter = PrometheusAdapter::new(PrometheusConfig::new(url)).unwrap();
        let metrics = adapter
            .query_window("rate(requests[{{window}}])", "5m")
            .await
            .unwrap();

        assert_eq!(metrics.window, "5m");
        assert_eq!(metrics.good, 100.5);
        assert_eq!(metrics.total, 100.5);
        assert!(metrics.data_timestamp.is_some());
    }

    #[tokio::test]
    async fn multiple_series_are_summed_and_newest_timestamp_wins() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async {
                Json(vector_response(&[
                    (1_700_000_000.0, "10"),
                    (1_700_000_100.0, "20"),
                    (1_700_000_050.0, "30"),
                ]))
            }),
        );
        let url = serve_mock(router).await;

        let adapter = PrometheusAdapter::new(PrometheusConfig::new(url)).unwrap();
        let metrics = adapter.query_window("metric", "1h").await.unwrap();

        assert_eq!(metrics.good, 60.0);
        assert_eq!(
            metrics.data_timestamp,
            DateTime::<Utc>::from_timestamp(1_700_000_100, 0)
        );
    }

    #[tokio::test]
    async fn empty_result_set_is_zero_not_error() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async { Json(vector_response(&[])) }),
        );
        let url = serve_mock(router).await;

        let adapter = PrometheusAdapter::new(PrometheusConfig::new(url)).unwrap();
        let metrics = adapter.query_window("missing_metric", "5m").await.unwrap();

        assert_eq!(metrics.good, 0.0);
        assert_eq!(metrics.total, 0.0);
        assert!(metrics.data_timestamp.is_none());
    }

    #[tokio::test]
    async fn retries_once_after_server_error() {
        let attempts = Arc::new(AtomicI32::new(0));
        let counter = attempts.clone();
        let router = Router::new().route(
            "/api/v1/query",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    } else {
                        Json(vector_response(&[(1_700_000_000.0, "42")])).into_response()
                    }
                }
            }),
        );
        let url = serve_mock(router).await;

        let config = PrometheusConfig::new(url).with_retries(1, Duration::from_millis(10));
        let adapter = PrometheusAdapter::new(config).unwrap();

        let metrics = adapter.query_window("metric", "5m").await.unwrap();
        assert_eq!(metrics.good, 42.0);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_success_status_field_is_an_error() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async { Json(json!({"status": "error", "error": "invalid query"})) }),
        );
        let url = serve_mock(router).await;

        let config = PrometheusConfig::new(url).with_retries(1, Duration::from_millis(1));
        let adapter = PrometheusAdapter::new(config).unwrap();

        let err = adapter.query_window("bad", "5m").await.unwrap_err();
        assert!(err.to_string().contains("invalid query"));
        assert!(matches!(
            err,
            AdapterError::RetriesExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn slow_backend_hits_the_deadline() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Json(vector_response(&[]))
            }),
        );
        let url = serve_mock(router).await;

        let config = PrometheusConfig::new(url)
            .with_timeout(Duration::from_millis(50))
            .with_retries(0, Duration::from_millis(1));
        let adapter = PrometheusAdapter::new(config).unwrap();

        assert!(adapter.query_window("metric", "5m").await.is_err());
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_max_concurrency() {
        let concurrent = Arc::new(AtomicI32::new(0));
        let peak = Arc::new(AtomicI32::new(0));

        let concurrent_handle = concurrent.clone();
        let peak_handle = peak.clone();
        let router = Router::new().route(
            "/api/v1/query",
            get(move || {
                let concurrent = concurrent_handle.clone();
                let peak = peak_handle.clone();
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Json(vector_response(&[(1_700_000_000.0, "1")]))
                }
            }),
        );
        let url = serve_mock(router).await;

        let config = PrometheusConfig::new(url)
            .with_max_concurrency(3)
            .with_timeout(Duration::from_secs(5));
        let adapter = Arc::new(PrometheusAdapter::new(config).unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                adapter.query_window(&format!("metric_{i}"), "5m").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeded cap",
            peak.load(Ordering::SeqCst)
        );
    }
}
