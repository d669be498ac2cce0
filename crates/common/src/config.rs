//! Tool configuration

use crate::command::ContainerRuntime;
use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default OpenVPN server image
pub const DEFAULT_IMAGE: &str = "kylemanna/openvpn";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "ovpnkit.toml";

/// Where ovpnkit keeps instance state and which image it runs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Container runtime; detected when unset
    pub runtime: Option<ContainerRuntime>,

    /// OpenVPN server image
    pub image: String,

    /// Parent of the per-instance data directories
    pub data_root: PathBuf,

    /// Parent of the per-instance client configuration directories
    pub client_root: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            image: DEFAULT_IMAGE.to_string(),
            data_root: PathBuf::from("./container-data"),
            client_root: PathBuf::from("./client-configurations"),
        }
    }
}

impl ToolConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ToolConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, ToolConfig::default());
        assert_eq!(config.image, "kylemanna/openvpn");
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "runtime = \"podman\"\ndata_root = \"/srv/ovpn\"\n").unwrap();

        let config = ToolConfig::load(&path).unwrap();
        assert_eq!(config.runtime, Some(ContainerRuntime::Podman));
        assert_eq!(config.data_root, PathBuf::from("/srv/ovpn"));
        assert_eq!(config.image, DEFAULT_IMAGE);
        assert_eq!(config.client_root, PathBuf::from("./client-configurations"));
    }

    #[test]
    fn test_bad_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "runtime = \"lxc\"").unwrap();
        assert!(matches!(
            ToolConfig::load(&path),
            Err(crate::Error::ConfigParse(_))
        ));
    }
}
