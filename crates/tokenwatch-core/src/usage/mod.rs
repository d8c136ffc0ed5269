//! Usage tracking: response parsing, record building and cost calculation

pub mod calculator;
pub mod parser;
pub mod record;

pub use calculator::{CostBreakdown, CostCalculator, CostConfig, ModelPricing};
pub use parser::{extract_model, extract_usage, parse_body, ProviderResponse, TokenUsage};
pub use record::{generate_record_id, UsageRecord};
