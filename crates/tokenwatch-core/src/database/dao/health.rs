//! Health-check result access (`health_<provider>` keys, one per provider)

use crate::database::{Database, HEALTH_KEY_PREFIX};
use crate::error::AppError;
use crate::provider::ProviderTag;
use crate::services::health_check::HealthCheckResult;

fn health_key(provider: ProviderTag) -> String {
    format!("{HEALTH_KEY_PREFIX}{provider}")
}

impl Database {
    /// Store the current result for a provider, replacing the previous one.
    pub fn save_health_check_result(&self, result: &HealthCheckResult) -> Result<(), AppError> {
        self.kv_set(&health_key(result.provider), result)
    }

    /// Latest result per provider, most recently checked first
    pub fn get_all_health_check_results(&self) -> Result<Vec<HealthCheckResult>, AppError> {
        let mut results: Vec<HealthCheckResult> = self.kv_scan_prefix(HEALTH_KEY_PREFIX)?;
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(results)
    }

    pub fn get_health_check_result(
        &self,
        provider: ProviderTag,
    ) -> Result<Option<HealthCheckResult>, AppError> {
        self.kv_get(&health_key(provider))
    }
}
