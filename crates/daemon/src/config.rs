use std::path::{Path, PathBuf};

use serde::Deserialize;
use serialgate_common::IdentityScheme;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/serialgate/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub grants_file: PathBuf,
    pub audit_log: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            grants_file: PathBuf::from("/var/lib/serialgate/grants.json"),
            audit_log: PathBuf::from("/var/log/serialgate/audit.log"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Overrides the build target's identity scheme.
    pub scheme: Option<IdentityScheme>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
}

impl DaemonConfig {
    pub fn identity_scheme(&self) -> IdentityScheme {
        self.identity.scheme.unwrap_or_else(IdentityScheme::native)
    }
}

/// Load the daemon config. A missing file means defaults.
pub fn load_config(path: &Path) -> Result<DaemonConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DaemonConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
        assert_eq!(cfg.identity_scheme(), IdentityScheme::native());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ngrants_file = \"/tmp/grants.json\"\n\n[identity]\nscheme = \"vendor-product-serial-driver\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.grants_file, PathBuf::from("/tmp/grants.json"));
        assert_eq!(cfg.storage.audit_log, StorageConfig::default().audit_log);
        assert_eq!(cfg.identity_scheme(), IdentityScheme::VendorProductSerialDriver);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[identity]\nscheme = \"bluetooth\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
