//! AI provider tags and URL classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider an outbound call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Anthropic,
    Google,
    Xai,
    DeepSeek,
    Unknown,
}

/// Host substrings checked in order; first match wins.
const PROVIDER_HOSTS: &[(&str, ProviderTag)] = &[
    ("api.openai.com", ProviderTag::OpenAi),
    ("api.anthropic.com", ProviderTag::Anthropic),
    ("generativelanguage.googleapis.com", ProviderTag::Google),
    ("api.x.ai", ProviderTag::Xai),
    ("api.deepseek.com", ProviderTag::DeepSeek),
];

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "openai",
            ProviderTag::Anthropic => "anthropic",
            ProviderTag::Google => "google",
            ProviderTag::Xai => "xai",
            ProviderTag::DeepSeek => "deepseek",
            ProviderTag::Unknown => "unknown",
        }
    }

    /// The five real providers, in classification order.
    pub fn known() -> impl Iterator<Item = ProviderTag> {
        PROVIDER_HOSTS.iter().map(|(_, tag)| *tag)
    }

    pub fn is_known(&self) -> bool {
        *self != ProviderTag::Unknown
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderTag::OpenAi),
            "anthropic" => Ok(ProviderTag::Anthropic),
            "google" => Ok(ProviderTag::Google),
            "xai" => Ok(ProviderTag::Xai),
            "deepseek" => Ok(ProviderTag::DeepSeek),
            "unknown" => Ok(ProviderTag::Unknown),
            other => Err(format!(
                "unknown provider '{other}' (expected openai, anthropic, google, xai, deepseek)"
            )),
        }
    }
}

/// Classify a request URL by case-insensitive substring match.
pub fn classify(url: &str) -> ProviderTag {
    let lower = url.to_ascii_lowercase();
    PROVIDER_HOSTS
        .iter()
        .find(|(host, _)| lower.contains(host))
        .map(|(_, tag)| *tag)
        .unwrap_or(ProviderTag::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_hosts() {
        assert_eq!(
            classify("https://api.openai.com/v1/chat/completions"),
            ProviderTag::OpenAi
        );
        assert_eq!(
            classify("https://api.anthropic.com/v1/messages"),
            ProviderTag::Anthropic
        );
        assert_eq!(
            classify("https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"),
            ProviderTag::Google
        );
        assert_eq!(classify("https://api.x.ai/v1/chat/completions"), ProviderTag::Xai);
        assert_eq!(
            classify("https://api.deepseek.com/chat/completions"),
            ProviderTag::DeepSeek
        );
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(
            classify("HTTPS://API.OpenAI.COM/v1/models"),
            ProviderTag::OpenAi
        );
        assert_eq!(classify("https://Api.X.Ai/v1"), ProviderTag::Xai);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("https://example.com/api"), ProviderTag::Unknown);
        assert_eq!(classify(""), ProviderTag::Unknown);
        assert_eq!(classify("https://openai.com/blog"), ProviderTag::Unknown);
    }

    #[test]
    fn test_substring_anywhere_matches() {
        // Proxies that embed the upstream host in the path still classify.
        assert_eq!(
            classify("http://localhost:8080/forward/api.anthropic.com/v1/messages"),
            ProviderTag::Anthropic
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&ProviderTag::OpenAi).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&ProviderTag::DeepSeek).unwrap(),
            "\"deepseek\""
        );
        let tag: ProviderTag = serde_json::from_str("\"xai\"").unwrap();
        assert_eq!(tag, ProviderTag::Xai);
    }

    #[test]
    fn test_from_str_roundtrips_as_str() {
        for tag in ProviderTag::known() {
            assert_eq!(tag.as_str().parse::<ProviderTag>().unwrap(), tag);
        }
        assert_eq!("OpenAI".parse::<ProviderTag>().unwrap(), ProviderTag::OpenAi);
        assert!("mistral".parse::<ProviderTag>().is_err());
    }

    #[test]
    fn test_known_excludes_unknown() {
        let known: Vec<_> = ProviderTag::known().collect();
        assert_eq!(known.len(), 5);
        assert!(!known.contains(&ProviderTag::Unknown));
    }
}
