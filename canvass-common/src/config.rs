//! Configuration loading and data root resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Optional TOML configuration file contents
///
/// Lives at `~/.config/canvass/config.toml` (or the platform equivalent).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the interview collection server
    pub server_url: Option<String>,
    /// API token sent with every request
    pub api_token: Option<String>,
    /// Local data root (database + captured audio)
    pub data_root: Option<String>,
}

impl TomlConfig {
    /// Load the config file if one exists; missing file is not an error
    pub fn load() -> Result<Self> {
        let path = match config_file_path() {
            Ok(p) => p,
            Err(_) => return Ok(Self::default()),
        };
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Data root resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `CANVASS_DATA_ROOT` environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_root(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("CANVASS_DATA_ROOT") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_root {
        return PathBuf::from(path);
    }

    default_data_root()
}

/// Server URL resolution with the same priority chain as the data root
pub fn resolve_server_url(cli_arg: Option<&str>, toml_config: &TomlConfig) -> Result<String> {
    if let Some(url) = cli_arg {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var("CANVASS_SERVER_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }

    if let Some(url) = &toml_config.server_url {
        return Ok(url.clone());
    }

    Err(Error::Config(
        "Server URL not configured. Provide --server-url, set CANVASS_SERVER_URL, \
         or add server_url to the config file"
            .to_string(),
    ))
}

/// Default configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("canvass").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// OS-dependent default data root
fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("canvass"))
        .unwrap_or_else(|| PathBuf::from("./canvass_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_wins() {
        let toml = TomlConfig {
            data_root: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let root = resolve_data_root(Some("/from/cli"), &toml);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_toml_used_when_no_cli_or_env() {
        // Only meaningful when the env var is unset in the test environment
        if std::env::var("CANVASS_DATA_ROOT").is_ok() {
            return;
        }
        let toml = TomlConfig {
            data_root: Some("/from/toml".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_data_root(None, &toml), PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_missing_server_url_is_config_error() {
        if std::env::var("CANVASS_SERVER_URL").is_ok() {
            return;
        }
        let err = resolve_server_url(None, &TomlConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_config_parses() {
        let config: TomlConfig = toml::from_str(
            r#"
            server_url = "https://collect.example.org"
            api_token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.server_url.as_deref(),
            Some("https://collect.example.org")
        );
        assert!(config.data_root.is_none());
    }
}
