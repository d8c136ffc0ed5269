//! Usage record access (`usage_<id>` keys, append-only)

use crate::database::{Database, USAGE_KEY_PREFIX};
use crate::error::AppError;
use crate::provider::ProviderTag;
use crate::usage::UsageRecord;

fn usage_key(id: &str) -> String {
    format!("{USAGE_KEY_PREFIX}{id}")
}

impl Database {
    pub fn save_usage_record(&self, record: &UsageRecord) -> Result<(), AppError> {
        self.kv_set(&usage_key(&record.id), record)
    }

    /// All usage records, newest first
    pub fn get_all_usage_records(&self) -> Result<Vec<UsageRecord>, AppError> {
        let mut records: Vec<UsageRecord> = self.kv_scan_prefix(USAGE_KEY_PREFIX)?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Records with `start <= timestamp <= end` (epoch millis)
    pub fn get_usage_records_by_date_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<UsageRecord>, AppError> {
        let mut records = self.get_all_usage_records()?;
        records.retain(|r| r.timestamp >= start && r.timestamp <= end);
        Ok(records)
    }

    pub fn get_usage_records_by_provider(
        &self,
        provider: ProviderTag,
    ) -> Result<Vec<UsageRecord>, AppError> {
        let mut records = self.get_all_usage_records()?;
        records.retain(|r| r.provider == provider);
        Ok(records)
    }

    /// Remove every usage record, leaving health results and cost config.
    pub fn clear_all_usage_records(&self) -> Result<usize, AppError> {
        let removed = self.kv_delete_prefix(USAGE_KEY_PREFIX)?;
        log::info!("[Database] Cleared {removed} usage records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::TokenUsage;

    fn record(id: &str, timestamp: i64, provider: ProviderTag) -> UsageRecord {
        let mut r = UsageRecord::new(
            provider,
            "m",
            &TokenUsage {
                input_tokens: 1,
                output_tokens: 2,
                total_tokens: 3,
            },
            "https://example.invalid",
            200,
        );
        r.id = id.to_string();
        r.timestamp = timestamp;
        r
    }

    #[test]
    fn test_records_accumulate_by_id() {
        let db = Database::memory().unwrap();
        db.save_usage_record(&record("1_a", 100, ProviderTag::OpenAi)).unwrap();
        db.save_usage_record(&record("2_b", 300, ProviderTag::Anthropic)).unwrap();
        db.save_usage_record(&record("3_c", 200, ProviderTag::OpenAi)).unwrap();

        let all = db.get_all_usage_records().unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2_b", "3_c", "1_a"]);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let db = Database::memory().unwrap();
        for (i, ts) in [100, 200, 300].iter().enumerate() {
            db.save_usage_record(&record(&format!("{i}"), *ts, ProviderTag::Google))
                .unwrap();
        }
        let hits = db.get_usage_records_by_date_range(200, 300).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(db.get_usage_records_by_date_range(301, 400).unwrap().is_empty());
    }

    #[test]
    fn test_filter_by_provider() {
        let db = Database::memory().unwrap();
        db.save_usage_record(&record("a", 1, ProviderTag::Xai)).unwrap();
        db.save_usage_record(&record("b", 2, ProviderTag::DeepSeek)).unwrap();
        let xai = db.get_usage_records_by_provider(ProviderTag::Xai).unwrap();
        assert_eq!(xai.len(), 1);
        assert_eq!(xai[0].id, "a");
    }

    #[test]
    fn test_clear_only_touches_usage_keys() {
        let db = Database::memory().unwrap();
        db.save_usage_record(&record("a", 1, ProviderTag::OpenAi)).unwrap();
        db.save_usage_record(&record("b", 2, ProviderTag::OpenAi)).unwrap();
        db.get_cost_config().unwrap();

        assert_eq!(db.clear_all_usage_records().unwrap(), 2);
        assert!(db.get_all_usage_records().unwrap().is_empty());
        assert!(db.kv_get::<serde_json::Value>(crate::database::COST_CONFIG_KEY)
            .unwrap()
            .is_some());
    }
}
