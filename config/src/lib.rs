//! Dece Configuration
//!
//! Shared configuration crate for the shielded ledger components.
//!
//! Handles loading configuration from:
//! 1. DECE_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.dece/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".dece";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./dece-db";

const DEFAULT_MAX_Z_OUT_LENGTH: usize = 500;
const DEFAULT_MAX_CONTRACT_OUT_COUNT: usize = 256;
const DEFAULT_LOWEST_FEE_RATE: u32 = 2500;
const DEFAULT_HIGHEST_FEE_RATE: u32 = 7500;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Proof verification pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Worker threads, defaults to the number of available CPUs
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Consensus bounds on transaction shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum outputs of both families in one transaction, counting the
    /// fee, a command payment and a package create
    #[serde(default = "default_max_z_out_length")]
    pub max_z_out_length: usize,
    /// External transfers to one pseudo-address per block before alarming
    #[serde(default = "default_max_contract_out_count")]
    pub max_contract_out_count: usize,
    /// Pool fee rate bounds, in basis points of 10000
    #[serde(default = "default_lowest_fee_rate")]
    pub lowest_fee_rate: u32,
    #[serde(default = "default_highest_fee_rate")]
    pub highest_fee_rate: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_z_out_length: DEFAULT_MAX_Z_OUT_LENGTH,
            max_contract_out_count: DEFAULT_MAX_CONTRACT_OUT_COUNT,
            lowest_fee_rate: DEFAULT_LOWEST_FEE_RATE,
            highest_fee_rate: DEFAULT_HIGHEST_FEE_RATE,
        }
    }
}

fn default_max_z_out_length() -> usize {
    DEFAULT_MAX_Z_OUT_LENGTH
}
fn default_max_contract_out_count() -> usize {
    DEFAULT_MAX_CONTRACT_OUT_COUNT
}
fn default_lowest_fee_rate() -> u32 {
    DEFAULT_LOWEST_FEE_RATE
}
fn default_highest_fee_rate() -> u32 {
    DEFAULT_HIGHEST_FEE_RATE
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl DeceConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("DECE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("DECE_CONFIG points at missing file: {}", path.display());
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("DECE_DB_PATH", &mut self.database.path);
        env_parse("DECE_VERIFY_THREADS", &mut self.verifier.threads);
        if self.verifier.threads == 0 {
            self.verifier.threads = 1;
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
