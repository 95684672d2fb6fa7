//! Configuration schema for the cache core.

pub mod schema;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

pub use schema::parse_duration;

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

fn default_min_age_days() -> u32 {
    30
}

fn default_variety_depth() -> u32 {
    1
}

fn default_max_text_length() -> usize {
    4096
}

fn default_threshold() -> u32 {
    85
}

fn default_scorer() -> String {
    "ratio".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_fillers_voice_id() -> String {
    "default".to_string()
}

fn default_eviction_interval() -> String {
    "1h".to_string()
}

/// Root configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheVoiceConfig {
    pub cache: CacheConfig,
    pub fuzzy: FuzzyConfig,
    pub normalize: NormalizeConfig,
    pub providers: ProvidersConfig,
    pub fillers: FillersConfig,
    pub server: ServerConfig,
}

impl Default for CacheVoiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fuzzy: FuzzyConfig::default(),
            normalize: NormalizeConfig::default(),
            providers: ProvidersConfig::default(),
            fillers: FillersConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl CacheVoiceConfig {
    /// Load configuration from a TOML file on disk.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_min_age_days")]
    pub min_age_days: u32,
    #[serde(default = "default_variety_depth")]
    pub variety_depth: u32,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Evictor tick period, parsed with [`parse_duration`] (e.g. "1h", "30m").
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            min_age_days: default_min_age_days(),
            variety_depth: default_variety_depth(),
            max_text_length: default_max_text_length(),
            enabled: true,
            eviction_interval: default_eviction_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default = "default_scorer")]
    pub scorer: String,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            scorer: default_scorer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_true")]
    pub strip_punctuation: bool,
    #[serde(default = "default_true")]
    pub collapse_whitespace: bool,
    #[serde(default = "default_true")]
    pub replace_numbers: bool,
    #[serde(default = "default_true")]
    pub strip_minimax: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_punctuation: true,
            collapse_whitespace: true,
            replace_numbers: true,
            strip_minimax: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_voice: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub timeout_s: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub fallback_chain: Vec<String>,
    pub configs: HashMap<String, ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            fallback_chain: Vec::new(),
            configs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FillersConfig {
    pub auto_generate_on_startup: bool,
    #[serde(default = "default_fillers_voice_id")]
    pub voice_id: String,
}

impl Default for FillersConfig {
    fn default() -> Self {
        Self {
            auto_generate_on_startup: false,
            voice_id: default_fillers_voice_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
        }
    }
}
