//! Cost table access (single `cost_config` key)

use crate::database::{Database, COST_CONFIG_KEY};
use crate::error::AppError;
use crate::usage::CostConfig;

impl Database {
    pub fn save_cost_config(&self, config: &CostConfig) -> Result<(), AppError> {
        self.kv_set(COST_CONFIG_KEY, config)
    }

    /// Stored cost table; the defaults are written on first read.
    pub fn get_cost_config(&self) -> Result<CostConfig, AppError> {
        if let Some(config) = self.kv_get(COST_CONFIG_KEY)? {
            return Ok(config);
        }
        let config = CostConfig::default();
        self.save_cost_config(&config)?;
        Ok(config)
    }
}
