//! Configuration loading.
//!
//! Grounded on `core-new/src/config/app_config.rs` (`AppConfig::load_from` /
//! `default_with_dir` / `save`), adapted to TOML (per spec §6) and a
//! discriminated-union `VaultConfig` the way the teacher's domain types use
//! tagged enums for backend kind (e.g. `domain/volume.rs::VolumeType`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BtError, Result};

const CONFIG_ENV: &str = "BT_CONFIG";
const BASE_DIR_ENV: &str = "BT_BASE_DIR";

/// Top-level configuration, parsed once at process start from
/// `~/.config/bt.toml` (or `$BT_CONFIG`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UUID identifying this machine's metadata namespace in every vault.
    pub host_id: Uuid,
    /// Root of `data/`, `staging/`, `queue/`, `log/`, `bt.lock` (§6).
    pub base_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub ignore_list: Vec<String>,
    #[serde(rename = "vault", default)]
    pub vaults: Vec<VaultConfig>,
}

fn default_log_dir() -> PathBuf {
    default_base_dir().join("log")
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("data")
        .join("bt")
}

/// One configured vault backend (§4.1, §9 "discriminated union").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VaultConfig {
    Fs { root: PathBuf },
    S3 {
        bucket: String,
        #[serde(default)]
        content_prefix: Option<String>,
        #[serde(default)]
        metadata_bucket: Option<String>,
        #[serde(default)]
        metadata_prefix: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl Config {
    fn config_path() -> PathBuf {
        if let Ok(p) = env::var(CONFIG_ENV) {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bt.toml")
    }

    /// Loads from the default (or `$BT_CONFIG`-overridden) path, then applies
    /// `$BT_BASE_DIR` on top, matching §6's documented precedence.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        if let Ok(base_dir) = env::var(BASE_DIR_ENV) {
            config.base_dir = PathBuf::from(base_dir);
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading config");
        let raw = fs::read_to_string(path).map_err(|e| {
            BtError::ConfigInvalid(format!("reading {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            BtError::ConfigInvalid(format!("parsing {}: {e}", path.display()))
        })
    }

    /// `bt config init`: writes a fresh default config with a newly
    /// generated `host_id`. Never overwrites an existing file.
    pub fn init_default() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            warn!(path = %path.display(), "config already exists, not overwriting");
            return Self::load_from(&path);
        }
        let config = Self::default();
        config.save(&path)?;
        info!(path = %path.display(), host_id = %config.host_id, "wrote default config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| BtError::ConfigInvalid(format!("serializing config: {e}")))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.base_dir.join("data").join("metadata.db")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.base_dir.clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = default_base_dir();
        Self {
            host_id: Uuid::new_v4(),
            log_dir: base_dir.join("log"),
            base_dir,
            ignore_list: Vec::new(),
            vaults: Vec::new(),
        }
    }
}
