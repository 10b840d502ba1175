//! Layered configuration: defaults, then `Trackserver.toml`, then
//! `TRACKSERVER_`-prefixed environment variables.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8086,
        }
    }
}

/// Score bands assigning the difficulty tier from the first assessment.
/// Scores below `silver_min` are Bronze, `gold_min` and up are Gold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBands {
    pub silver_min: u8,
    pub gold_min: u8,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            silver_min: 70,
            gold_min: 86,
        }
    }
}

/// Tunables of the progression engine. One passing ratio per check kind,
/// configured rather than hard-coded, replaces the historical mix of
/// absolute-count and percentage thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub lesson_pass_ratio: f64,
    pub assessment_pass_ratio: f64,
    pub tier_bands: TierBands,
    /// Expert sessions required for the Two→Three transition.
    pub expert_session_quota: u32,
    /// Bounded optimistic-concurrency retries in the progress adapter.
    pub merge_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lesson_pass_ratio: 0.70,
            assessment_pass_ratio: 0.70,
            tier_bands: TierBands::default(),
            expert_session_quota: 3,
            merge_retry_limit: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_limit: u32,
    pub cache_ttl_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8087".to_string(),
            timeout_secs: 20,
            retry_limit: 2,
            cache_ttl_secs: 900,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("Trackserver.toml"))
            .merge(Env::prefixed("TRACKSERVER_").split("__"))
            .extract()
    }
}
