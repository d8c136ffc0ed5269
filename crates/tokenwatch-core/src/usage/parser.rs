//! Response Parser - extract token usage and model from provider response bodies
//!
//! Supported response shapes:
//! - OpenAI-compatible chat completions (OpenAI, xAI, DeepSeek)
//! - Anthropic Messages API
//! - Gemini `generateContent`
//!
//! Decoding is best-effort: a missing or malformed field becomes `0` or
//! `"unknown"`, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ProviderTag;

pub const UNKNOWN_MODEL: &str = "unknown";

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A provider response body decoded into one of the known shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// `usage.prompt_tokens` / `completion_tokens` / `total_tokens`
    OpenAiCompatible { model: String, usage: TokenUsage },
    /// `usage.input_tokens` / `output_tokens`, no provider total
    Anthropic { model: String, usage: TokenUsage },
    /// `usageMetadata.*TokenCount`, model in `modelVersion`
    Gemini { model: String, usage: TokenUsage },
    Unrecognized,
}

impl ProviderResponse {
    pub fn decode(provider: ProviderTag, body: &Value) -> Self {
        match provider {
            ProviderTag::OpenAi | ProviderTag::Xai | ProviderTag::DeepSeek => {
                Self::OpenAiCompatible {
                    model: model_field(body, "model"),
                    usage: TokenUsage::from_openai_response(body),
                }
            }
            ProviderTag::Anthropic => Self::Anthropic {
                model: model_field(body, "model"),
                usage: TokenUsage::from_anthropic_response(body),
            },
            ProviderTag::Google => Self::Gemini {
                model: model_field(body, "modelVersion"),
                usage: TokenUsage::from_gemini_response(body),
            },
            ProviderTag::Unknown => Self::Unrecognized,
        }
    }

    pub fn usage(&self) -> TokenUsage {
        match self {
            Self::OpenAiCompatible { usage, .. }
            | Self::Anthropic { usage, .. }
            | Self::Gemini { usage, .. } => *usage,
            Self::Unrecognized => TokenUsage::default(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAiCompatible { model, .. }
            | Self::Anthropic { model, .. }
            | Self::Gemini { model, .. } => model,
            Self::Unrecognized => UNKNOWN_MODEL,
        }
    }
}

impl TokenUsage {
    /// OpenAI chat completion format (also used by xAI and DeepSeek)
    pub fn from_openai_response(body: &Value) -> Self {
        let usage = body.get("usage");
        Self {
            input_tokens: count(usage, "prompt_tokens"),
            output_tokens: count(usage, "completion_tokens"),
            total_tokens: count(usage, "total_tokens"),
        }
    }

    /// Anthropic Messages API; the total is computed since the API omits it
    pub fn from_anthropic_response(body: &Value) -> Self {
        let usage = body.get("usage");
        let input_tokens = count(usage, "input_tokens");
        let output_tokens = count(usage, "output_tokens");
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Gemini `generateContent`
    pub fn from_gemini_response(body: &Value) -> Self {
        let usage = body.get("usageMetadata");
        Self {
            input_tokens: count(usage, "promptTokenCount"),
            output_tokens: count(usage, "candidatesTokenCount"),
            total_tokens: count(usage, "totalTokenCount"),
        }
    }
}

/// Extract the token usage triple for `provider` from a parsed body.
pub fn extract_usage(provider: ProviderTag, body: &Value) -> TokenUsage {
    ProviderResponse::decode(provider, body).usage()
}

/// Extract the provider-reported model name, or `"unknown"`.
pub fn extract_model(provider: ProviderTag, body: &Value) -> String {
    ProviderResponse::decode(provider, body).model().to_string()
}

/// Parse a raw response body as JSON. Invalid JSON yields `None`.
pub fn parse_body(bytes: &[u8]) -> Option<Value> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("[UsageParser] Response body is not JSON: {e}");
            None
        }
    }
}

fn count(container: Option<&Value>, field: &str) -> u64 {
    let Some(value) = container.and_then(|c| c.get(field)) else {
        return 0;
    };
    if let Some(n) = value.as_u64() {
        return n;
    }
    // Some gateways emit counts as floats (`12.0`)
    match value.as_f64() {
        Some(f) if f.is_finite() && f > 0.0 => f as u64,
        _ => 0,
    }
}

fn model_field(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string()
}
