//! Server configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

/// Which metrics backend the evaluator talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    Prometheus,
    Synthetic,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Prometheus => f.write_str("prometheus"),
            AdapterKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// Invalid server configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port: {0}")]
    InvalidPort(u32),

    #[error("SLO directory is required")]
    MissingSloDirectory,

    #[error("Prometheus URL required when adapter is 'prometheus'")]
    MissingPrometheusUrl,
}

/// Process configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub slo_directory: PathBuf,
    pub adapter: AdapterKind,
    pub prometheus_url: Option<String>,
    /// Directory of JSON metric fixtures for the synthetic adapter
    pub fixtures_dir: Option<PathBuf>,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            slo_directory: PathBuf::new(),
            adapter: AdapterKind::Synthetic,
            prometheus_url: None,
            fixtures_dir: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port as u32));
        }
        if self.slo_directory.as_os_str().is_empty() {
            return Err(ConfigError::MissingSloDirectory);
        }
        if self.adapter == AdapterKind::Prometheus
            && self.prometheus_url.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::MissingPrometheusUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig {
            slo_directory: PathBuf::from("slos"),
            ..Default::default()
        }
    }

    #[test]
    fn default_with_directory_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn missing_slo_directory_is_rejected() {
        let config = ServerConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSloDirectory)
        ));
    }

    #[test]
    fn prometheus_adapter_requires_a_url() {
        let mut config = valid();
        config.adapter = AdapterKind::Prometheus;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPrometheusUrl)
        ));

        config.prometheus_url = Some("http://prometheus:9090".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = valid();
        config.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));
    }
}
