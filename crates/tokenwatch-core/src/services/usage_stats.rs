//! Usage statistics
//!
//! Aggregations over captured usage records for the dashboard views.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::Database;
use crate::error::AppError;
use crate::provider::ProviderTag;
use crate::usage::{CostCalculator, CostConfig, UsageRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
    /// Share of records with a 2xx status, 0.0 when there are none
    pub success_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: ProviderTag,
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
    pub success_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub provider: ProviderTag,
    pub model: String,
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
    pub avg_cost_per_request: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    /// UTC date, `YYYY-MM-DD`
    pub date: String,
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
}

/// Running totals shared by the per-key aggregations.
#[derive(Default)]
struct Bucket {
    requests: u64,
    successes: u64,
    tokens: u64,
    cost: Decimal,
}

impl Bucket {
    fn add(&mut self, record: &UsageRecord, calculator: &CostCalculator<'_>) {
        self.requests += 1;
        if is_success(record) {
            self.successes += 1;
        }
        self.tokens = self.tokens.saturating_add(record.total_tokens);
        if let Some(cost) = calculator.calculate(record) {
            self.cost += cost.total_cost;
        }
    }

    fn success_rate(&self) -> f32 {
        success_rate(self.successes, self.requests)
    }
}

fn is_success(record: &UsageRecord) -> bool {
    (200..300).contains(&record.status_code)
}

fn success_rate(successes: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        successes as f32 / total as f32
    }
}

// Counts come straight from provider JSON and may be arbitrarily large.
fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

pub fn summarize(records: &[UsageRecord], costs: &CostConfig) -> UsageSummary {
    let calculator = CostCalculator::new(costs);
    let successes = records.iter().filter(|r| is_success(r)).count() as u64;

    UsageSummary {
        total_requests: records.len() as u64,
        total_input_tokens: saturating_sum(records.iter().map(|r| r.request_tokens)),
        total_output_tokens: saturating_sum(records.iter().map(|r| r.response_tokens)),
        total_tokens: saturating_sum(records.iter().map(|r| r.total_tokens)),
        total_cost: calculator.total(records),
        success_rate: success_rate(successes, records.len() as u64),
    }
}

/// Per-provider totals, heaviest token users first.
pub fn provider_stats(records: &[UsageRecord], costs: &CostConfig) -> Vec<ProviderStats> {
    let calculator = CostCalculator::new(costs);
    let mut buckets: BTreeMap<ProviderTag, Bucket> = BTreeMap::new();
    for record in records {
        buckets
            .entry(record.provider)
            .or_default()
            .add(record, &calculator);
    }

    let mut stats: Vec<ProviderStats> = buckets
        .into_iter()
        .map(|(provider, bucket)| ProviderStats {
            provider,
            request_count: bucket.requests,
            total_tokens: bucket.tokens,
            total_cost: bucket.cost,
            success_rate: bucket.success_rate(),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.total_tokens
            .cmp(&a.total_tokens)
            .then(a.provider.cmp(&b.provider))
    });
    stats
}

/// Per (provider, model) totals, heaviest token users first.
pub fn model_stats(records: &[UsageRecord], costs: &CostConfig) -> Vec<ModelStats> {
    let calculator = CostCalculator::new(costs);
    let mut buckets: BTreeMap<(ProviderTag, &str), Bucket> = BTreeMap::new();
    for record in records {
        buckets
            .entry((record.provider, record.model.as_str()))
            .or_default()
            .add(record, &calculator);
    }

    let mut stats: Vec<ModelStats> = buckets
        .into_iter()
        .map(|((provider, model), bucket)| ModelStats {
            provider,
            model: model.to_string(),
            request_count: bucket.requests,
            total_tokens: bucket.tokens,
            total_cost: bucket.cost,
            avg_cost_per_request: bucket.cost / Decimal::from(bucket.requests),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.total_tokens
            .cmp(&a.total_tokens)
            .then_with(|| a.provider.cmp(&b.provider))
            .then_with(|| a.model.cmp(&b.model))
    });
    stats
}

/// Per UTC day totals, most recent day first.
pub fn daily_stats(records: &[UsageRecord], costs: &CostConfig) -> Vec<DailyStats> {
    let calculator = CostCalculator::new(costs);
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    for record in records {
        let Some(date) = utc_date(record.timestamp) else {
            log::warn!(
                "[UsageStats] Record {} has out-of-range timestamp {}",
                record.id,
                record.timestamp
            );
            continue;
        };
        buckets.entry(date).or_default().add(record, &calculator);
    }

    buckets
        .into_iter()
        .rev()
        .map(|(date, bucket)| DailyStats {
            date,
            request_count: bucket.requests,
            total_tokens: bucket.tokens,
            total_cost: bucket.cost,
        })
        .collect()
}

fn utc_date(timestamp_ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

impl Database {
    /// Records captured within the optional inclusive bounds (epoch millis).
    fn usage_records_between(
        &self,
        start_date: Option<i64>,
        end_date: Option<i64>,
    ) -> Result<Vec<UsageRecord>, AppError> {
        self.get_usage_records_by_date_range(
            start_date.unwrap_or(i64::MIN),
            end_date.unwrap_or(i64::MAX),
        )
    }

    pub fn get_usage_summary(
        &self,
        start_date: Option<i64>,
        end_date: Option<i64>,
    ) -> Result<UsageSummary, AppError> {
        let records = self.usage_records_between(start_date, end_date)?;
        Ok(summarize(&records, &self.get_cost_config()?))
    }

    pub fn get_provider_stats(
        &self,
        start_date: Option<i64>,
        end_date: Option<i64>,
    ) -> Result<Vec<ProviderStats>, AppError> {
        let records = self.usage_records_between(start_date, end_date)?;
        Ok(provider_stats(&records, &self.get_cost_config()?))
    }

    pub fn get_model_stats(
        &self,
        start_date: Option<i64>,
        end_date: Option<i64>,
    ) -> Result<Vec<ModelStats>, AppError> {
        let records = self.usage_records_between(start_date, end_date)?;
        Ok(model_stats(&records, &self.get_cost_config()?))
    }

    pub fn get_daily_stats(
        &self,
        start_date: Option<i64>,
        end_date: Option<i64>,
    ) -> Result<Vec<DailyStats>, AppError> {
        let records = self.usage_records_between(start_date, end_date)?;
        Ok(daily_stats(&records, &self.get_cost_config()?))
    }
}
