// SPDX-License-Identifier: GPL-3.0-only

//! Engine and tool configuration loaded from TOML

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use storage_types::pretty_to_bytes;

use crate::copy::engine::DEFAULT_CHUNK_BYTES;
use crate::error::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on bytes per chunk, e.g. `"4 MB"`; a bare number is bytes
    pub chunk_size: String,
    pub lvm_command: String,
    pub blkid_command: String,
    /// Flush targets to stable storage once the copy finishes
    pub sync_on_close: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: "4 MB".to_string(),
            lvm_command: "lvm".to_string(),
            blkid_command: "blkid".to_string(),
            sync_on_close: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            SysError::Config(format!("cannot read {}: {}", path.display(), error))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|error| SysError::Config(format!("{}: {}", path.display(), error)))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|error| SysError::Config(error.to_string()))?;
        config.chunk_bytes()?;
        Ok(config)
    }

    /// Chunk size in bytes; at least one byte. The engine rounds it to the
    /// sector sizes of each copy.
    pub fn chunk_bytes(&self) -> Result<usize> {
        let bytes = pretty_to_bytes(&self.chunk_size).map_err(|error| {
            SysError::Config(format!("chunk_size {:?}: {}", self.chunk_size, error))
        })?;
        if bytes == 0 {
            return Err(SysError::Config("chunk_size must not be zero".to_string()));
        }
        Ok(usize::try_from(bytes).unwrap_or(DEFAULT_CHUNK_BYTES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = EngineConfig::from_toml_str("lvm_command = \"/usr/sbin/lvm\"").unwrap();
        assert_eq!(config.lvm_command, "/usr/sbin/lvm");
        assert_eq!(config.blkid_command, "blkid");
        assert!(config.sync_on_close);
        assert_eq!(config.chunk_bytes().unwrap(), DEFAULT_CHUNK_BYTES);
    }

    #[test]
    fn chunk_size_accepts_units_and_bare_bytes() {
        let config = EngineConfig::from_toml_str("chunk_size = \"512 KB\"").unwrap();
        assert_eq!(config.chunk_bytes().unwrap(), 512 * 1024);

        let config = EngineConfig::from_toml_str("chunk_size = \"65536\"").unwrap();
        assert_eq!(config.chunk_bytes().unwrap(), 65536);
    }

    #[test]
    fn invalid_chunk_size_is_a_config_error() {
        for raw in ["chunk_size = \"0\"", "chunk_size = \"lots\"", "chunk_size = 4"] {
            assert!(matches!(
                EngineConfig::from_toml_str(raw),
                Err(SysError::Config(_))
            ));
        }
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = EngineConfig::load(Path::new("/nonexistent/partcopy.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/partcopy.toml"));
    }
}
