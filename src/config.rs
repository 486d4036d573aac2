//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXRANK_CONFIG` (environment variable)
//! 2. `~/.config/mboxrank/config.toml` (Linux)
//!    `~/Library/Application Support/mboxrank/config.toml` (macOS)
//!    `%APPDATA%\mboxrank\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consolidate::DomainTables;
use crate::engine::accumulator::{SpillLimits, DEFAULT_MAX_DOMAINS, DEFAULT_MAX_SENDERS};
use crate::engine::batch::{BatchOptions, DEFAULT_READ_CHUNK_SIZE};
use crate::engine::EngineOptions;
use crate::error::{RankError, Result};
use crate::model::personal::PersonalProviders;
use crate::source::planner::DEFAULT_BATCH_SIZE;
use crate::store::DEFAULT_SPILL_SUB_BATCH;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Engine tuning.
    pub engine: EngineConfig,
    /// Domain classification tables.
    pub domains: DomainsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for the overflow store and logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal batch size in bytes (default: 52428800 = 50 MiB).
    pub batch_size: u64,
    /// Read size inside a batch (default: 1048576 = 1 MiB).
    pub read_chunk_size: usize,
    /// Spill once more distinct domains than this are held in memory.
    pub max_domains: usize,
    /// Spill once more distinct senders than this are held in memory.
    pub max_senders: usize,
    /// Domains written per overflow store transaction.
    pub spill_sub_batch: usize,
    /// Cut batches at message boundaries.
    pub align_batches: bool,
    /// WHATWG encoding label of the source, e.g. "utf-8" or "windows-1252".
    pub source_encoding: String,
}

/// Additions to the built-in domain tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainsConfig {
    /// Extra consumer mail providers.
    pub extra_personal: Vec<String>,
    /// Extra country TLDs with second-level registrations.
    pub extra_two_part_tlds: Vec<String>,
    /// Extra second-level labels under those TLDs.
    pub extra_second_levels: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_domains: DEFAULT_MAX_DOMAINS,
            max_senders: DEFAULT_MAX_SENDERS,
            spill_sub_batch: DEFAULT_SPILL_SUB_BATCH,
            align_batches: true,
            source_encoding: "utf-8".to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate the tuning values and turn them into engine options.
    pub fn to_options(&self, personal: PersonalProviders) -> Result<EngineOptions> {
        let positive = [
            ("batch_size", self.batch_size == 0),
            ("read_chunk_size", self.read_chunk_size == 0),
            ("max_domains", self.max_domains == 0),
            ("max_senders", self.max_senders == 0),
            ("spill_sub_batch", self.spill_sub_batch == 0),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, zero)| *zero) {
            return Err(RankError::InvalidConfig(format!(
                "engine.{name} must be greater than zero"
            )));
        }

        let encoding = encoding_rs::Encoding::for_label(self.source_encoding.trim().as_bytes())
            .ok_or_else(|| {
                RankError::InvalidConfig(format!(
                    "engine.source_encoding: unknown encoding '{}'",
                    self.source_encoding
                ))
            })?;

        Ok(EngineOptions {
            batch_size: self.batch_size,
            align_batches: self.align_batches,
            batch: BatchOptions {
                read_chunk_size: self.read_chunk_size,
                encoding,
            },
            limits: SpillLimits {
                max_domains: self.max_domains,
                max_senders: self.max_senders,
            },
            spill_sub_batch: self.spill_sub_batch,
            personal,
        })
    }
}

impl DomainsConfig {
    pub fn personal_providers(&self) -> PersonalProviders {
        PersonalProviders::with_extra(&self.extra_personal)
    }

    pub fn domain_tables(&self) -> DomainTables {
        DomainTables::with_extra(&self.extra_two_part_tlds, &self.extra_second_levels)
    }
}

impl Config {
    /// Engine options with the configured personal providers.
    pub fn engine_options(&self) -> Result<EngineOptions> {
        self.engine.to_options(self.domains.personal_providers())
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXRANK_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mboxrank").join("config.toml"))
}

/// Return the cache directory for the overflow store and logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxrank")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mboxrank.log")
}
