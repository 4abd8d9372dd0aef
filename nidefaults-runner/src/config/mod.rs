//! Configuration management for the conformance runner.
//!
//! CLI arguments are parsed into [`CliConfig`], then interpreted into the
//! validated [`AppConfig`] and the Zenoh session configuration.

pub mod app_config;
pub mod cli;
pub mod zenoh_config;

pub use app_config::{AppConfig, LogLevel, ScenarioSource};
pub use cli::CliConfig;
pub use zenoh_config::ZenohConfigManager;

use anyhow::Result;
use nidefaults_shared::ZenohConfig;

/// Main configuration manager that combines all configuration sources
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub app: AppConfig,
    pub zenoh: ZenohConfig,
}

impl ConfigManager {
    /// Creates a configuration manager from CLI arguments and environment
    pub fn from_cli_and_env() -> Result<Self> {
        Self::from_cli(&CliConfig::from_args()?)
    }

    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        cli_config.validate()?;
        Ok(Self {
            app: AppConfig::from_cli(cli_config)?,
            zenoh: ZenohConfigManager::from_cli(cli_config)?,
        })
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        self.app.init_logging()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_manager_from_cli() {
        let matches = CliConfig::build_cli()
            .try_get_matches_from(["nidefaults-runner", "--simulate", "--settle", "1s"])
            .unwrap();
        let cli_config = CliConfig::from_matches(&matches).unwrap();

        let manager = ConfigManager::from_cli(&cli_config).unwrap();
        assert!(manager.app.simulate);
        assert_eq!(manager.app.timing.settle, std::time::Duration::from_secs(1));
        assert!(manager.zenoh.validate().is_ok());
    }

    #[test]
    fn test_config_manager_rejects_bad_agent() {
        let matches = CliConfig::build_cli()
            .try_get_matches_from(["nidefaults-runner", "--device-agent", "a/b"])
            .unwrap();
        let cli_config = CliConfig::from_matches(&matches).unwrap();
        assert!(ConfigManager::from_cli(&cli_config).is_err());
    }
}
