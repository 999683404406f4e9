//! Server configuration.
//!
//! Loaded from a TOML file, e.g.:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [storage]
//! data_dir = "/var/lib/emitrace"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level server configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    pub storage: StorageSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Listen address for the HTTP server.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Directory holding all persistent data.
    pub data_dir: String,
}

impl ServerConfig {
    /// Resolve a context name to a config path. A name containing `/`
    /// or `.` is used as a path directly; otherwise it resolves to
    /// `/etc/emitrace/<name>.toml`.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(format!("/etc/emitrace/{}.toml", name_or_path))
        }
    }

    /// Load and parse the config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        if config.storage.data_dir.is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            ServerConfig::resolve_path("prod"),
            PathBuf::from("/etc/emitrace/prod.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./local.toml"),
            PathBuf::from("./local.toml")
        );
    }

    #[test]
    fn test_load() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[server]\nlisten = \"127.0.0.1:9090\"\n\n[storage]\ndata_dir = \"/tmp/emitrace\"\n",
        )
        .unwrap();
        let config = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9090");
        assert_eq!(config.storage.data_dir, "/tmp/emitrace");
    }

    #[test]
    fn test_listen_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[storage]\ndata_dir = \"/tmp/emitrace\"\n").unwrap();
        let config = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
    }
}
