use crate::config::{Config, ConfigValidator};
use crate::utils::errors::{McpError, McpResult};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::path::PathBuf;
use tracing::{debug, info};

/// Prefix for environment overrides, e.g. `COOKIE_RELAY_SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "COOKIE_RELAY_";

/// Builds the effective configuration from defaults, an optional TOML file
/// and the environment, in increasing order of precedence.
pub struct ConfigManager {
    path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new(path: Option<&str>) -> Self {
        let path = path.map(|p| PathBuf::from(shellexpand::tilde(p).to_string()));
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = &self.path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate the configuration
    pub fn load(&self) -> McpResult<Config> {
        if let Some(path) = &self.path {
            if !path.exists() {
                return Err(McpError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            info!("Loading config from {}", path.display());
        }

        let config: Config = self
            .figment()
            .extract()
            .map_err(|e| McpError::ConfigError(format!("Failed to parse config: {}", e)))?;

        ConfigValidator::new().validate(&config)?;
        debug!("Effective config: {:?}", config);

        Ok(config)
    }
}
