//! Usage records created from captured provider responses

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::parser::{ProviderResponse, TokenUsage};
use crate::provider::ProviderTag;

const ID_SUFFIX_LEN: usize = 9;

/// One captured AI API call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: String,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    pub provider: ProviderTag,
    pub model: String,
    pub request_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
    /// The requested URL, unmodified
    pub endpoint: String,
    pub status_code: u16,
}

impl UsageRecord {
    pub fn new(
        provider: ProviderTag,
        model: impl Into<String>,
        usage: &TokenUsage,
        endpoint: impl Into<String>,
        status_code: u16,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            id: generate_record_id(timestamp),
            timestamp,
            provider,
            model: model.into(),
            request_tokens: usage.input_tokens,
            response_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            endpoint: endpoint.into(),
            status_code,
        }
    }

    /// Build a record from a parsed response body.
    ///
    /// Returns `None` when the body carries no usable token count, so
    /// zero-token calls never become records.
    pub fn from_response(
        provider: ProviderTag,
        endpoint: &str,
        status_code: u16,
        body: &Value,
    ) -> Option<Self> {
        let decoded = ProviderResponse::decode(provider, body);
        let usage = decoded.usage();
        if usage.total_tokens == 0 {
            return None;
        }
        Some(Self::new(
            provider,
            decoded.model(),
            &usage,
            endpoint,
            status_code,
        ))
    }
}

/// `<millis>_<random suffix>`. Unique in practice, not guaranteed.
pub fn generate_record_id(timestamp_ms: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{timestamp_ms}_{}", &random[..ID_SUFFIX_LEN])
}
