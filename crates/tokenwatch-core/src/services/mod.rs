pub mod health_check;
pub mod usage_stats;

pub use health_check::{HealthCheckResult, HealthCheckService, HealthStatus};
pub use usage_stats::{DailyStats, ModelStats, ProviderStats, UsageSummary};
