//! Streaming tuning configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! page_size_bytes = 262144
//! max_cache_bytes = 67108864
//! idle_ttl_ms = 1800000
//! authority = "smbvfs.smbmedia"
//! max_whole_file_bytes = 67108864
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::page_cache::{DEFAULT_MAX_CACHE_BYTES, DEFAULT_PAGE_SIZE};
use crate::ticket::DEFAULT_IDLE_TTL_MS;
use crate::uri::DEFAULT_AUTHORITY;

/// Default cap on files loaded whole into memory: 64 MiB.
pub const DEFAULT_MAX_WHOLE_FILE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub page_size_bytes: usize,
    pub max_cache_bytes: usize,
    pub idle_ttl_ms: u64,
    pub authority: String,
    /// Largest file the whole-file path will buffer.
    pub max_whole_file_bytes: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: DEFAULT_PAGE_SIZE,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            idle_ttl_ms: DEFAULT_IDLE_TTL_MS,
            authority: DEFAULT_AUTHORITY.to_string(),
            max_whole_file_bytes: DEFAULT_MAX_WHOLE_FILE_BYTES,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size_bytes == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.max_cache_bytes < self.page_size_bytes {
            return Err(ConfigError::CacheBudgetTooSmall {
                max_bytes: self.max_cache_bytes,
                page_size: self.page_size_bytes,
            });
        }
        if self.idle_ttl_ms == 0 {
            return Err(ConfigError::ZeroIdleTtl);
        }
        if self.authority.trim().is_empty() {
            return Err(ConfigError::InvalidAuthority(self.authority.clone()));
        }
        Ok(())
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
