// src/config/models.rs
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use super::duration::parse_duration;

/// Consecutive health-probe failures after which a backend is evicted from
/// the pool. Fixed rather than configurable; tests construct pools with
/// smaller thresholds directly.
pub const REMOVE_AFTER: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Listen address. Accepts the bare `":8080"` form as well as
    /// `"host:port"`.
    pub port: String,
    /// Health-probe tick period as a duration string, e.g. `"2s"`.
    pub health_check_interval: String,
    /// Backend addresses seeding the pool at startup, in order.
    pub servers: Vec<String>,
    /// Selection strategy name: `round-robin`, `random`, or
    /// `least-connections`.
    pub lb_algo: String,
    /// Per-request attempt bound for the dispatcher.
    pub max_retries: u32,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Config {
    pub fn health_check_interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.health_check_interval)
            .with_context(|| format!("invalid healthCheckInterval {:?}", self.health_check_interval))?;
        Ok(interval)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = self.port.trim();
        let candidate = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };
        candidate
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.port))
    }

    pub fn validate(&self) -> Result<()> {
        let interval = self.health_check_interval()?;
        ensure!(
            interval > Duration::ZERO,
            "healthCheckInterval must be positive"
        );
        self.listen_addr()?;
        ensure!(self.max_retries >= 1, "maxRetries must be at least 1");
        for server in &self.servers {
            Url::parse(server).with_context(|| format!("invalid server address {server:?}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "port": ":8080",
            "healthCheckInterval": "2s",
            "servers": ["http://localhost:5001", "http://localhost:5002"],
            "lbAlgo": "round-robin",
            "maxRetries": 3
        }"#
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.port, ":8080");
        assert_eq!(config.health_check_interval, "2s");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.lb_algo, "round-robin");
        assert_eq!(config.max_retries, 3);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn listen_addr_accepts_bare_port_form() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        let addr = config.listen_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn listen_addr_accepts_full_form() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.port = "127.0.0.1:9000".to_string();
        let addr = config.listen_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn validate_accepts_sample() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_interval() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.health_check_interval = "soon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unparsable_server() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.servers.push("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn metrics_section_is_optional_with_overrides() {
        let json = r#"{
            "port": ":8080",
            "healthCheckInterval": "2s",
            "servers": [],
            "lbAlgo": "random",
            "maxRetries": 1,
            "metrics": { "enabled": true, "port": 9100 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
        assert_eq!(config.metrics.path, "/metrics");
    }
}
