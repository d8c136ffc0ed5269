//! Tokenwatch core
//!
//! Captures token usage from calls to AI provider APIs (OpenAI, Anthropic,
//! Google, xAI, DeepSeek) without changing what the caller sees, stores the
//! resulting records locally and aggregates them for reporting.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenwatch_core::{
//!     install, CapturingTransport, Database, ReqwestTransport, Transport, UsageNotifier,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(Database::init()?);
//! install(db, UsageNotifier::default());
//!
//! let transport = CapturingTransport::new(ReqwestTransport::new());
//! let response = transport
//!     .fetch("https://api.openai.com/v1/models".into())
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod format;
pub mod hash;
pub mod http_client;
pub mod interceptor;
pub mod notify;
pub mod provider;
pub mod services;
pub mod transport;
pub mod usage;

pub use config::{AppConfig, HealthConfig};
pub use database::{Database, UsageSink};
pub use error::AppError;
pub use hash::{compute_sha256, HashManifest};
pub use interceptor::{
    install, installed, is_installed, CaptureContext, CapturingEventRequest, CapturingTransport,
};
pub use notify::{UsageNotifier, USAGE_RECORD_ADDED};
pub use provider::{classify, ProviderTag};
pub use services::{
    DailyStats, HealthCheckResult, HealthCheckService, HealthStatus, ModelStats, ProviderStats,
    UsageSummary,
};
pub use transport::{
    EventRequest, HttpRequest, HttpResponse, LoadEvent, ReqwestEventRequest, ReqwestTransport,
    Resource, Transport, TransportError,
};
pub use usage::{
    extract_model, extract_usage, CostBreakdown, CostCalculator, CostConfig, ModelPricing,
    TokenUsage, UsageRecord,
};
