use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rentd_types::AutomationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bearer token for authentication (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            auth_token: None,
        }
    }
}

/// Top-level rentd configuration.
///
/// The automation section supplies the coordinator's initial policy;
/// runtime updates through the API are in-memory only and are not
/// written back here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RentdConfig {
    /// Gateway server config.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Billing automation defaults.
    #[serde(default)]
    pub automation: AutomationConfig,
}

/// Resolve the rentd config directory (~/.rentd/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".rentd"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.rentd/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<RentdConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<RentdConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(RentdConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: RentdConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Save configuration to the default path.
pub fn save_config(config: &RentdConfig) -> Result<(), ConfigError> {
    let dir = ensure_config_dir()?;
    save_config_to(&dir.join("config.json5"), config)
}

/// Save configuration to a specific path.
pub fn save_config_to(path: &Path, config: &RentdConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RentdConfig::default();
        assert_eq!(config.gateway.port, 3000);
        assert!(config.automation.enabled);
        assert_eq!(config.automation.generate_day, 1);
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            gateway: { port: 8080 },
            automation: {
                enabled: false,
                generate_day: 5,
            },
        }"#;
        let config: RentdConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert!(!config.automation.enabled);
        assert_eq!(config.automation.generate_day, 5);
        // Unspecified automation fields fall back to defaults
        assert_eq!(config.automation.reminder_days_before, vec![7, 3, 1]);
    }

    #[test]
    fn test_json5_parse_empty() {
        let config: RentdConfig = json5::from_str("{}").unwrap();
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert!(config.gateway.auth_token.is_none());
        assert_eq!(config.automation.manager_escalation_days, 14);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_from(Path::new("/nonexistent/rentd/config.json5")).unwrap();
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("rentd-config-save-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json5");

        let mut config = RentdConfig::default();
        config.gateway.port = 4100;
        config.gateway.auth_token = Some("token-1".into());
        config.automation.generate_day = 3;

        save_config_to(&path, &config).unwrap();
        let restored = load_config_from(&path).unwrap();
        assert_eq!(restored.gateway.port, 4100);
        assert_eq!(restored.gateway.auth_token.as_deref(), Some("token-1"));
        assert_eq!(restored.automation.generate_day, 3);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
