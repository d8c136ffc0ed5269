//! Cost calculation from per-model price tables

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::UsageRecord;
use crate::provider::ProviderTag;

const TOKENS_PER_UNIT: i64 = 1_000_000;

/// USD price per one million tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: Decimal,
    pub output: Decimal,
}

impl ModelPricing {
    pub fn new(input: Decimal, output: Decimal) -> Self {
        Self { input, output }
    }
}

/// Price tables keyed by provider, then by model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostConfig {
    pub providers: BTreeMap<ProviderTag, BTreeMap<String, ModelPricing>>,
}

impl Default for CostConfig {
    fn default() -> Self {
        fn table(entries: &[(&str, ModelPricing)]) -> BTreeMap<String, ModelPricing> {
            entries
                .iter()
                .map(|(model, pricing)| (model.to_string(), *pricing))
                .collect()
        }
        let usd = |units: i64, scale: u32| Decimal::new(units, scale);

        let mut providers = BTreeMap::new();
        providers.insert(
            ProviderTag::OpenAi,
            table(&[
                ("gpt-4", ModelPricing::new(usd(30, 0), usd(60, 0))),
                ("gpt-4-turbo", ModelPricing::new(usd(10, 0), usd(30, 0))),
                ("gpt-3.5-turbo", ModelPricing::new(usd(5, 1), usd(15, 1))),
            ]),
        );
        providers.insert(
            ProviderTag::Anthropic,
            table(&[
                ("claude-3-opus", ModelPricing::new(usd(15, 0), usd(75, 0))),
                ("claude-3-sonnet", ModelPricing::new(usd(3, 0), usd(15, 0))),
                ("claude-3-haiku", ModelPricing::new(usd(25, 2), usd(125, 2))),
            ]),
        );
        providers.insert(
            ProviderTag::Google,
            table(&[
                ("gemini-pro", ModelPricing::new(usd(5, 1), usd(15, 1))),
                ("gemini-ultra", ModelPricing::new(usd(10, 0), usd(30, 0))),
            ]),
        );
        providers.insert(
            ProviderTag::Xai,
            table(&[("grok-1", ModelPricing::new(usd(5, 0), usd(15, 0)))]),
        );
        providers.insert(
            ProviderTag::DeepSeek,
            table(&[("deepseek-chat", ModelPricing::new(usd(14, 2), usd(28, 2)))]),
        );
        Self { providers }
    }
}

impl CostConfig {
    /// Look up pricing for a reported model name.
    ///
    /// Exact match first, then the longest configured name that prefixes
    /// the reported one (`gpt-4-0613` prices as `gpt-4`).
    pub fn pricing_for(&self, provider: ProviderTag, model: &str) -> Option<&ModelPricing> {
        let models = self.providers.get(&provider)?;
        if let Some(pricing) = models.get(model) {
            return Some(pricing);
        }
        models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, pricing)| pricing)
    }
}

/// Cost of one record, USD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
}

pub struct CostCalculator<'a> {
    config: &'a CostConfig,
}

impl<'a> CostCalculator<'a> {
    pub fn new(config: &'a CostConfig) -> Self {
        Self { config }
    }

    /// `None` when the model has no configured price.
    pub fn calculate(&self, record: &UsageRecord) -> Option<CostBreakdown> {
        let pricing = self.config.pricing_for(record.provider, &record.model)?;
        let per_unit = Decimal::from(TOKENS_PER_UNIT);
        let input_cost = Decimal::from(record.request_tokens) * pricing.input / per_unit;
        let output_cost = Decimal::from(record.response_tokens) * pricing.output / per_unit;
        Some(CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        })
    }

    /// Sum of all priced records; unpriced records contribute nothing.
    pub fn total(&self, records: &[UsageRecord]) -> Decimal {
        records
            .iter()
            .filter_map(|r| self.calculate(r))
            .map(|c| c.total_cost)
            .sum()
    }
}
