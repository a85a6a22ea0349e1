//! Generator configuration.
//!
//! Loaded from a `dynamic_asset_gen.toml` file. Every key is optional; a
//! missing file means all defaults. Unknown keys are rejected to catch typos
//! early.
//!
//! ```toml
//! cache_assets = false            # cache generated textures on disk
//! cache_data = false              # cache generated tag files on disk
//! cache_dir = ".dynamic-asset-cache"
//! encoding = "argb"               # layout of integer color literals
//!
//! [processing]
//! max_processes = 4               # omit for auto = CPU cores
//! ```
//!
//! Caching is off by default: every run regenerates everything. The asset and
//! data caches live in separate subdirectories of `cache_dir`.

use crate::cache::ResourceCache;
use crate::color::ColorEncoding;
use crate::types::PackType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "dynamic_asset_gen.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Cache generated textures between runs.
    pub cache_assets: bool,
    /// Cache generated tag files between runs.
    pub cache_data: bool,
    /// Root of the on-disk caches.
    pub cache_dir: String,
    /// Ambient encoding of integer color literals.
    pub encoding: ColorEncoding,
    pub processing: ProcessingConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cache_assets: false,
            cache_data: false,
            cache_dir: ".dynamic-asset-cache".to_string(),
            encoding: ColorEncoding::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.cache_assets || self.cache_data) && self.cache_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cache_dir must not be empty when caching is enabled".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn caching_enabled(&self, pack_type: PackType) -> bool {
        match pack_type {
            PackType::Assets => self.cache_assets,
            PackType::Data => self.cache_data,
        }
    }

    /// `<cache_dir>/assets` or `<cache_dir>/data`.
    pub fn cache_root(&self, pack_type: PackType) -> PathBuf {
        Path::new(&self.cache_dir).join(pack_type.directory())
    }

    /// Open the cache for `pack_type`, or a disabled one.
    pub fn open_cache(&self, pack_type: PackType) -> ResourceCache {
        if self.caching_enabled(pack_type) {
            ResourceCache::open(self.cache_root(pack_type), true)
        } else {
            ResourceCache::disabled()
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel generation workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse and validate config text.
pub fn parse_config(text: &str) -> Result<GeneratorConfig, ConfigError> {
    let config: GeneratorConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to defaults when the file does not
/// exist.
pub fn load_config(path: &Path) -> Result<GeneratorConfig, ConfigError> {
    if !path.exists() {
        return Ok(GeneratorConfig::default());
    }
    parse_config(&fs::read_to_string(path)?)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Dynamic Asset Generator Configuration
# =====================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Caching
# ---------------------------------------------------------------------------
# Keep generated textures on disk and reuse them while their inputs are
# unchanged. Off means every run regenerates everything.
cache_assets = false

# Same for generated tag files.
cache_data = false

# Cache root. Textures go to <cache_dir>/assets, tags to <cache_dir>/data.
cache_dir = ".dynamic-asset-cache"

# ---------------------------------------------------------------------------
# Sources
# ---------------------------------------------------------------------------
# Channel layout of integer color literals in "color" nodes that do not set
# their own: "argb", "rgb" (alpha forced opaque), "abgr" or "bgr".
encoding = "argb"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel generation workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
