//! Zenoh session configuration from the command line.

use anyhow::Result;
use nidefaults_shared::ZenohConfig;
use nidefaults_shared::errors::ZenohConfigError;

use super::cli::CliConfig;

/// Zenoh configuration manager
pub struct ZenohConfigManager;

impl ZenohConfigManager {
    /// Create Zenoh configuration from CLI config
    pub fn from_cli(cli_config: &CliConfig) -> Result<ZenohConfig> {
        let mode = cli_config
            .zenoh_mode
            .parse()
            .map_err(|e: ZenohConfigError| anyhow::anyhow!("{}", e))?;
        let mut zenoh_config = ZenohConfig::new(mode);

        if let Some(connect_endpoints) = &cli_config.zenoh_connect {
            for endpoint in connect_endpoints.split(',').filter(|e| !e.trim().is_empty()) {
                zenoh_config = zenoh_config.add_connect_endpoint(endpoint.trim());
            }
        }

        if let Some(listen_endpoints) = &cli_config.zenoh_listen {
            for endpoint in listen_endpoints.split(',').filter(|e| !e.trim().is_empty()) {
                zenoh_config = zenoh_config.add_listen_endpoint(endpoint.trim());
            }
        }

        if cli_config.no_multicast {
            zenoh_config = zenoh_config.disable_multicast_scouting();
        }

        Self::validate_and_report(&zenoh_config)?;
        Ok(zenoh_config)
    }

    /// Validate and handle zenoh configuration errors with detailed reporting
    pub fn validate_and_report(zenoh_config: &ZenohConfig) -> Result<()> {
        if let Err(e) = zenoh_config.validate() {
            let error_message = match e {
                ZenohConfigError::InvalidEndpoint { endpoint, reason } => {
                    format!("Invalid endpoint '{}' - {}", endpoint, reason)
                }
                ZenohConfigError::ClientCannotListen { endpoint } => format!(
                    "Client mode cannot listen on '{}'. Use --zenoh-mode peer or drop --zenoh-listen.",
                    endpoint
                ),
                other => format!("Invalid zenoh configuration: {}", other),
            };

            tracing::error!("{}", error_message);
            return Err(anyhow::anyhow!(
                "Zenoh configuration validation failed: {}",
                error_message
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidefaults_shared::ZenohMode;

    fn cli(args: &[&str]) -> CliConfig {
        let matches = CliConfig::build_cli()
            .try_get_matches_from(std::iter::once("nidefaults-runner").chain(args.iter().copied()))
            .unwrap();
        CliConfig::from_matches(&matches).unwrap()
    }

    #[test]
    fn test_from_cli_defaults() {
        let config = ZenohConfigManager::from_cli(&cli(&[])).unwrap();
        assert_eq!(config.mode, ZenohMode::Peer);
        assert!(config.endpoints.is_empty());
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_from_cli_endpoints() {
        let config = ZenohConfigManager::from_cli(&cli(&[
            "--zenoh-mode",
            "client",
            "--zenoh-connect",
            "tcp/192.168.1.1:7447, tcp/192.168.1.2:7447",
            "--no-multicast",
        ]))
        .unwrap();

        assert_eq!(config.mode, ZenohMode::Client);
        assert_eq!(
            config.endpoints,
            vec![
                "connect/tcp/192.168.1.1:7447",
                "connect/tcp/192.168.1.2:7447"
            ]
        );
        assert_eq!(
            config.properties.get("scouting/multicast/enabled").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_client_cannot_listen() {
        let err = ZenohConfigManager::from_cli(&cli(&[
            "--zenoh-mode",
            "client",
            "--zenoh-listen",
            "tcp/0.0.0.0:7447",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Client mode cannot listen"));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(ZenohConfigManager::from_cli(&cli(&["--zenoh-connect", "bogus"])).is_err());
    }
}
