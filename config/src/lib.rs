//! Shroud Configuration
//!
//! Shared configuration crate for the ledger core and its tooling.
//!
//! Handles loading configuration from:
//! 1. SHROUD_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shroud/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./shroud-db";
const DEFAULT_TREE_DEPTH: u32 = 29;
const DEFAULT_UPGRADE_HEIGHT: u64 = 0;
const DEFAULT_PROVER_WORKERS: usize = 4;
const DEFAULT_PROVER_MAX_IDLE_SETS: usize = 2;

/// Leaf indices live in `[2^depth, 2^(depth+1))`, which must fit a u64.
pub const MAX_TREE_DEPTH: u32 = 62;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub ledger: LedgerTomlConfig,
    #[serde(default)]
    pub prover: ProverTomlConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Ledger protocol parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTomlConfig {
    /// Depth of both commitment trees
    #[serde(default = "default_tree_depth")]
    pub tree_depth: u32,
    /// First block height that accepts generation-1 records
    #[serde(default = "default_upgrade_height")]
    pub upgrade_height: u64,
}

impl Default for LedgerTomlConfig {
    fn default() -> Self {
        Self {
            tree_depth: DEFAULT_TREE_DEPTH,
            upgrade_height: DEFAULT_UPGRADE_HEIGHT,
        }
    }
}

fn default_tree_depth() -> u32 {
    DEFAULT_TREE_DEPTH
}

fn default_upgrade_height() -> u64 {
    DEFAULT_UPGRADE_HEIGHT
}

/// Proof backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProverModeToml {
    #[default]
    Mock,
}

/// Proof worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverTomlConfig {
    #[serde(default)]
    pub mode: ProverModeToml,
    /// Threads per checked-out worker set
    #[serde(default = "default_prover_workers")]
    pub workers: usize,
    /// Worker sets kept alive between batches; extra sets are torn down
    #[serde(default = "default_prover_max_idle_sets")]
    pub max_idle_sets: usize,
}

impl Default for ProverTomlConfig {
    fn default() -> Self {
        Self {
            mode: ProverModeToml::Mock,
            workers: DEFAULT_PROVER_WORKERS,
            max_idle_sets: DEFAULT_PROVER_MAX_IDLE_SETS,
        }
    }
}

fn default_prover_workers() -> usize {
    DEFAULT_PROVER_WORKERS
}

fn default_prover_max_idle_sets() -> usize {
    DEFAULT_PROVER_MAX_IDLE_SETS
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
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

impl ShroudConfig {
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
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("SHROUD_DB_PATH", &mut self.database.path);
        env_parse("SHROUD_TREE_DEPTH", &mut self.ledger.tree_depth);
        env_parse("SHROUD_UPGRADE_HEIGHT", &mut self.ledger.upgrade_height);
        env_parse("SHROUD_PROVER_WORKERS", &mut self.prover.workers);
        env_parse("SHROUD_PROVER_MAX_IDLE_SETS", &mut self.prover.max_idle_sets);

        if let Ok(v) = env::var("SHROUD_PROVER_MODE") {
            if !v.eq_ignore_ascii_case("mock") {
                log::warn!("Unknown prover mode {}, falling back to mock", v);
            }
            self.prover.mode = ProverModeToml::Mock;
        }
    }

    /// Reject parameter combinations the ledger cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ledger.tree_depth == 0 || self.ledger.tree_depth > MAX_TREE_DEPTH {
            bail!(
                "tree_depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH,
                self.ledger.tree_depth
            );
        }
        if self.prover.workers == 0 {
            bail!("prover.workers must be at least 1");
        }
        Ok(())
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

// ============================================================================
// Tests
// ============================================================================
