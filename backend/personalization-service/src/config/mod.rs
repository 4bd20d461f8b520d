use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Service configuration.
///
/// Loaded from environment variables (and `.env`) via the `config` crate.
/// Nested keys use `__` as separator, e.g. `EVOLUTION_INTERVAL_SECS=60`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service_name: String,

    // Session identity (generated at startup when absent)
    pub user_id: Option<String>,

    // Local Persistent Store (in-memory when no Redis URL is set)
    pub redis_url: Option<String>,
    pub store_key_prefix: String,

    // Backend Data Service (sync disabled when no URL is set)
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub behavior_table: String,
    pub model_bucket: String,
    pub model_folder: String,
    pub model_file_name: String,

    // Scheduler
    pub evolution_interval_secs: u64,
    pub training_interval_secs: u64,

    // Behavior retention
    pub retention_days: i64,
    pub max_searches: usize,

    // Recommendation blending
    pub recommendation_limit: usize,
    pub heuristic_weight: f32,
    pub model_weight: f32,

    // Resource probing
    pub cpu_probe_iterations: u64,
    pub cpu_probe_reference_ms: f64,
    pub storage_quota_bytes: u64,

    // Optional catalog file loaded by the binary at startup
    pub catalog_path: Option<String>,

    // Observability
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "personalization-service".to_string(),
            user_id: None,
            redis_url: None,
            store_key_prefix: "personalization".to_string(),
            backend_url: None,
            backend_api_key: None,
            behavior_table: "user_behavior".to_string(),
            model_bucket: "Model".to_string(),
            model_folder: "my-models".to_string(),
            model_file_name: "model.json".to_string(),
            evolution_interval_secs: 300,
            training_interval_secs: 86_400,
            retention_days: 30,
            max_searches: 100,
            recommendation_limit: 5,
            heuristic_weight: 0.7,
            model_weight: 0.3,
            cpu_probe_iterations: 1_000_000,
            cpu_probe_reference_ms: 100.0,
            storage_quota_bytes: 5 * 1024 * 1024,
            catalog_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("service_name", "personalization-service")?
            .set_default("store_key_prefix", "personalization")?
            .set_default("behavior_table", "user_behavior")?
            .set_default("model_bucket", "Model")?
            .set_default("model_folder", "my-models")?
            .set_default("model_file_name", "model.json")?
            .set_default("evolution_interval_secs", 300)? // 5 minutes
            .set_default("training_interval_secs", 86_400)? // 24 hours
            .set_default("retention_days", 30)?
            .set_default("max_searches", 100)?
            .set_default("recommendation_limit", 5)?
            .set_default("heuristic_weight", 0.7)?
            .set_default("model_weight", 0.3)?
            .set_default("cpu_probe_iterations", 1_000_000)?
            .set_default("cpu_probe_reference_ms", 100.0)?
            .set_default("storage_quota_bytes", 5 * 1024 * 1024)?
            .set_default("log_level", "info")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.evolution_interval_secs == 0 || self.training_interval_secs == 0 {
            return Err(anyhow!("Scheduler intervals must be greater than 0"));
        }

        if self.retention_days <= 0 {
            return Err(anyhow!("Retention must be at least one day"));
        }

        if self.max_searches == 0 {
            return Err(anyhow!("Max searches must be greater than 0"));
        }

        if self.recommendation_limit == 0 {
            return Err(anyhow!("Recommendation limit must be greater than 0"));
        }

        let weights = [self.heuristic_weight, self.model_weight];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(anyhow!("Blend weights must be within [0, 1]"));
        }

        if (self.heuristic_weight + self.model_weight - 1.0).abs() > 1e-3 {
            return Err(anyhow!("Blend weights must sum to 1"));
        }

        if self.cpu_probe_iterations == 0 || self.cpu_probe_reference_ms <= 0.0 {
            return Err(anyhow!("CPU probe settings must be positive"));
        }

        if self.storage_quota_bytes == 0 {
            return Err(anyhow!("Storage quota must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_blend_weights() {
        let mut config = Config {
            heuristic_weight: 0.9,
            model_weight: 0.3,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.heuristic_weight = 1.5;
        config.model_weight = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = Config {
            evolution_interval_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
