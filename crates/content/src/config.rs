use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read provider config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse provider config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid mount path {0:?}")]
    InvalidMountPath(String),
}

/// Which backing session runs searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// The content session's own read session.
    #[default]
    Session,
    /// The provider's admin session.
    Admin,
}

/// Settings of a content provider.
/// 內容提供者設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub mount_path: String,
    #[serde(default)]
    pub search_scope: SearchScope,
    #[serde(default = "default_true")]
    pub node_caching: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            search_scope: SearchScope::default(),
            node_caching: true,
        }
    }

    pub fn with_search_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    /// Trims the mount path to `/segment[/segment...]` form.
    pub fn sanitize(&mut self) {
        let segments: Vec<&str> = self
            .mount_path
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        self.mount_path = format!("/{}", segments.join("/"));
    }

    /// Workspace served by this provider: the last mount path segment.
    pub fn workspace(&self) -> Result<&str, ConfigError> {
        match self.mount_path.rsplit('/').next() {
            Some(last) if !last.is_empty() => Ok(last),
            _ => Err(ConfigError::InvalidMountPath(self.mount_path.clone())),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: ProviderConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_fill_missing_fields() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("provider.json");
        fs::write(&path, r#"{ "mount_path": "//content/main/ " }"#).unwrap();

        let config = ProviderConfig::load(&path).unwrap();
        assert_eq!(config.mount_path, "/content/main");
        assert_eq!(config.workspace().unwrap(), "main");
        assert_eq!(config.search_scope, SearchScope::Session);
        assert!(config.node_caching);
    }

    #[test]
    fn root_mount_has_no_workspace() {
        let mut config = ProviderConfig::new("/");
        config.sanitize();
        assert!(matches!(
            config.workspace(),
            Err(ConfigError::InvalidMountPath(_))
        ));
    }

    #[test]
    fn read_and_parse_errors_carry_the_path() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            ProviderConfig::load(&missing),
            Err(ConfigError::Read { path, .. }) if path == missing
        ));

        let broken = tmp.path().join("broken.json");
        fs::write(&broken, r#"{ "mount_path": "/x", "search_scope": "global" }"#).unwrap();
        assert!(matches!(
            ProviderConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
