//! Provider health checks
//!
//! Sends one unauthenticated GET to each provider's probe endpoint and
//! classifies the outcome by status and latency. Any HTTP answer below 500,
//! including 401/403, proves the API is up.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::HealthConfig;
use crate::database::Database;
use crate::error::AppError;
use crate::provider::ProviderTag;
use crate::transport::{ReqwestTransport, Resource, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Operational,
    Degraded,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Operational => "operational",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current health of one provider. Stored one per provider, overwritten on
/// each check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub provider: ProviderTag,
    pub status: HealthStatus,
    /// Milliseconds until the probe settled
    pub response_time: u64,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HealthCheckService {
    transport: Arc<dyn Transport>,
    config: HealthConfig,
}

impl HealthCheckService {
    /// Probes through the shared HTTP client.
    pub fn new(config: HealthConfig) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()), config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: HealthConfig) -> Self {
        Self { transport, config }
    }

    /// Probe one provider. Never fails; problems become the result's status.
    pub async fn check(&self, provider: ProviderTag) -> HealthCheckResult {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let Some(endpoint) = self.config.endpoint_for(provider) else {
            return HealthCheckResult {
                provider,
                status: HealthStatus::Unreachable,
                response_time: 0,
                timestamp,
                error: Some(format!("No health endpoint for provider '{provider}'")),
            };
        };

        let start = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let outcome =
            tokio::time::timeout(timeout, self.transport.fetch(Resource::Url(endpoint))).await;
        let response_time = start.elapsed().as_millis() as u64;

        let (status, error) = match outcome {
            Err(_) => (
                HealthStatus::Unreachable,
                Some(format!("Timed out after {}s", self.config.timeout_secs)),
            ),
            Ok(Err(e)) => (HealthStatus::Unreachable, Some(e.to_string())),
            Ok(Ok(response)) if response.status().is_server_error() => (
                HealthStatus::Degraded,
                Some(format!("HTTP {}", response.status().as_u16())),
            ),
            Ok(Ok(_)) if response_time > self.config.degraded_threshold_ms => (
                HealthStatus::Degraded,
                Some(format!("Slow response ({response_time} ms)")),
            ),
            Ok(Ok(_)) => (HealthStatus::Operational, None),
        };

        log::debug!("[HealthCheck] {provider}: {status} in {response_time}ms");
        HealthCheckResult {
            provider,
            status,
            response_time,
            timestamp,
            error,
        }
    }

    /// Probe every known provider concurrently and store each result.
    pub async fn check_all(&self, db: &Database) -> Result<Vec<HealthCheckResult>, AppError> {
        let checks = ProviderTag::known().map(|provider| self.check(provider));
        let results = futures::future::join_all(checks).await;

        for result in &results {
            db.save_health_check_result(result)?;
        }
        log::info!("[HealthCheck] Checked {} providers", results.len());
        Ok(results)
    }
}
