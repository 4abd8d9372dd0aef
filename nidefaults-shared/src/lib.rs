//! Shared types and message definitions for the nidefaults conformance runner.
//!
//! This crate contains the data model of a default address-family
//! conformance scenario and the messages used to reach the external device
//! and traffic-generator agents over Zenoh.
//!
//! # Key Components
//!
//! * [`endpoint`] - Interface addressing descriptors and MAC addresses
//! * [`device_config`] - Structured device configuration tree
//! * [`traffic`] - Emulated topology, flows, counters and verdicts
//! * [`protocol`] - Query/reply payloads for the agents
//! * [`scenario`] / [`scenario_json`] - Scenario definitions and JSON5 files
//! * [`topics`] - Key expressions for the agent services
//!
//! # Communication Patterns
//!
//! ```text
//! Runner                              Agents
//!    │ ──── Query: DeviceRequest ───► │ device
//!    │ ◄─── Reply: DeviceResponse ─── │
//!    │ ──── Query: TrafficRequest ──► │ traffic generator
//!    │ ◄─── Reply: TrafficResponse ── │
//!    │ ──── Query: StateRequest ────► │ device / traffic generator
//!    │ ◄─── Pub: StateUpdate ──────── │
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use zenoh::config::WhatAmI;

pub mod device_config;
pub mod endpoint;
pub mod errors;
pub mod protocol;
pub mod scenario;
pub mod scenario_json;
pub mod traffic;

pub use device_config::{DeviceConfig, RoutingDomainConfig};
pub use endpoint::{EndpointAttributes, MacAddress};
pub use scenario::ScenarioDefinition;
pub use traffic::{AddressFamily, FlowCounters, FlowDefinition, PortCounters, Topology, Verdict};

/// Topic key expressions for the agent services
pub mod topics {
    use zenoh::key_expr::{
        OwnedKeyExpr,
        format::{kedefine, keformat},
    };

    kedefine!(
        pub device_query_keys: "nidefaults/${agent:*}/query/device",
        pub traffic_query_keys: "nidefaults/${agent:*}/query/traffic",
        pub state_query_keys: "nidefaults/${agent:*}/query/state"
    );

    /// Device management query service of an agent
    pub fn device_query_service(agent: &str) -> OwnedKeyExpr {
        keformat!(device_query_keys::formatter(), agent = agent)
            .expect("Failed to format device query topic - this should never happen with valid agent name")
    }

    /// Traffic generator query service of an agent
    pub fn traffic_query_service(agent: &str) -> OwnedKeyExpr {
        keformat!(traffic_query_keys::formatter(), agent = agent)
            .expect("Failed to format traffic query topic - this should never happen with valid agent name")
    }

    /// Point state query service of an agent
    pub fn state_query_service(agent: &str) -> OwnedKeyExpr {
        keformat!(state_query_keys::formatter(), agent = agent)
            .expect("Failed to format state query topic - this should never happen with valid agent name")
    }

    /// Key expression on which an agent publishes updates for `path`.
    ///
    /// Path segments map to key segments, so `*` in a path matches any
    /// single segment (e.g. any neighbor address).
    pub fn state_updates(agent: &str, path: &str) -> String {
        format!("nidefaults/{}/state/{}", agent, path.trim_matches('/'))
    }

    /// Extract the state path from an update key expression.
    pub fn extract_state_path(key_expr: &str) -> Option<String> {
        let mut parts = key_expr.splitn(4, '/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("nidefaults"), Some(_agent), Some("state"), Some(path)) if !path.is_empty() => {
                Some(path.to_string())
            }
            _ => None,
        }
    }
}

/// Validation trait for data model values
pub trait Validate {
    type Error: std::fmt::Display + std::fmt::Debug;
    fn validate(&self) -> Result<(), Self::Error>;
}

/// Validation error naming the offending field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Validation error in field '{}': {}",
            self.field, self.message
        )
    }
}

impl std::error::Error for ValidationError {}

/// Zenoh session configuration used to reach the agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohConfig {
    pub mode: ZenohMode,
    /// `connect/<proto>/<addr>` or `listen/<proto>/<addr>`
    pub endpoints: Vec<String>,
    /// Raw zenoh configuration properties (JSON5 values)
    pub properties: BTreeMap<String, String>,
}

/// Zenoh session modes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ZenohMode {
    Peer,
    Client,
}

impl std::str::FromStr for ZenohMode {
    type Err = errors::ZenohConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "peer" => Ok(ZenohMode::Peer),
            "client" => Ok(ZenohMode::Client),
            _ => Err(errors::ZenohConfigError::InvalidMode {
                mode: s.to_string(),
            }),
        }
    }
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: ZenohMode::Peer,
            endpoints: vec![],
            properties: BTreeMap::new(),
        }
    }
}

impl ZenohConfig {
    pub fn new(mode: ZenohMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Disable multicast scouting discovery
    pub fn disable_multicast_scouting(mut self) -> Self {
        self.properties.insert(
            "scouting/multicast/enabled".to_string(),
            "false".to_string(),
        );
        self
    }

    /// Add a listen endpoint (peer mode only)
    pub fn add_listen_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoints.push(format!("listen/{}", endpoint));
        self
    }

    /// Add a connect endpoint
    pub fn add_connect_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoints.push(format!("connect/{}", endpoint));
        self
    }

    pub fn validate(&self) -> Result<(), errors::ZenohConfigError> {
        use errors::ZenohConfigError;

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint) {
                return Err(ZenohConfigError::DuplicateEndpoint {
                    endpoint: endpoint.clone(),
                });
            }

            let (direction, locator) = endpoint.split_once('/').ok_or_else(|| {
                ZenohConfigError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    reason: "expected 'connect/<proto>/<addr>' or 'listen/<proto>/<addr>'"
                        .to_string(),
                }
            })?;
            if direction == "listen" && self.mode == ZenohMode::Client {
                return Err(ZenohConfigError::ClientCannotListen {
                    endpoint: endpoint.clone(),
                });
            }
            if direction != "listen" && direction != "connect" {
                return Err(ZenohConfigError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    reason: format!("unknown direction '{}'", direction),
                });
            }

            let (protocol, address) = locator.split_once('/').unwrap_or((locator, ""));
            if !matches!(protocol, "tcp" | "udp" | "tls" | "quic") {
                return Err(ZenohConfigError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    reason: format!("unsupported protocol '{}'", protocol),
                });
            }
            match address.parse::<std::net::SocketAddr>() {
                Ok(addr) if addr.port() != 0 => {}
                Ok(_) => {
                    return Err(ZenohConfigError::InvalidEndpoint {
                        endpoint: endpoint.clone(),
                        reason: "port 0 is not allowed".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ZenohConfigError::InvalidEndpoint {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn endpoints_json(&self, direction: &str) -> Option<String> {
        let prefix = format!("{}/", direction);
        let endpoints: Vec<String> = self
            .endpoints
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix))
            .map(|e| format!("\"{}\"", e))
            .collect();
        (!endpoints.is_empty()).then(|| format!("[{}]", endpoints.join(",")))
    }

    /// Convert to zenoh::Config
    pub fn to_zenoh_config(&self) -> Result<zenoh::Config, errors::ZenohConfigError> {
        use errors::ZenohConfigError;

        self.validate()?;

        let mut config = zenoh::Config::default();
        let whatami = match self.mode {
            ZenohMode::Peer => WhatAmI::Peer,
            ZenohMode::Client => WhatAmI::Client,
        };
        config
            .set_mode(Some(whatami))
            .map_err(|e| ZenohConfigError::Creation {
                reason: format!("Failed to set mode: {:?}", e),
            })?;

        for direction in ["connect", "listen"] {
            if let Some(endpoints) = self.endpoints_json(direction) {
                config
                    .insert_json5(&format!("{}/endpoints", direction), &endpoints)
                    .map_err(|e| ZenohConfigError::Creation {
                        reason: format!("Failed to set {} endpoints: {}", direction, e),
                    })?;
            }
        }

        for (key, value) in &self.properties {
            config
                .insert_json5(key, value)
                .map_err(|e| ZenohConfigError::Creation {
                    reason: format!("Failed to set '{}' = '{}': {}", key, value, e),
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::ZenohConfigError;

    #[test]
    fn test_topics() {
        assert_eq!(
            topics::device_query_service("dut").as_str(),
            "nidefaults/dut/query/device"
        );
        assert_eq!(
            topics::traffic_query_service("ate").as_str(),
            "nidefaults/ate/query/traffic"
        );
        assert_eq!(
            topics::state_updates("ate", "/interfaces/port1.Eth/ipv4-neighbors/*/link-layer-address"),
            "nidefaults/ate/state/interfaces/port1.Eth/ipv4-neighbors/*/link-layer-address"
        );
    }

    #[test]
    fn test_extract_state_path() {
        assert_eq!(
            topics::extract_state_path("nidefaults/ate/state/flows/ipv4/counters").as_deref(),
            Some("flows/ipv4/counters")
        );
        assert_eq!(topics::extract_state_path("nidefaults/ate/query/state"), None);
        assert_eq!(topics::extract_state_path("other/ate/state/x"), None);
    }

    #[test]
    fn test_zenoh_mode_from_str() {
        assert_eq!("Peer".parse::<ZenohMode>().unwrap(), ZenohMode::Peer);
        assert_eq!("client".parse::<ZenohMode>().unwrap(), ZenohMode::Client);
        assert!(matches!(
            "router".parse::<ZenohMode>(),
            Err(ZenohConfigError::InvalidMode { .. })
        ));
    }

    #[test]
    fn test_zenoh_config_validation() {
        let config = ZenohConfig::new(ZenohMode::Peer)
            .add_connect_endpoint("tcp/192.168.1.10:7447")
            .add_listen_endpoint("udp/0.0.0.0:7447");
        assert!(config.validate().is_ok());

        let config = ZenohConfig::new(ZenohMode::Client).add_listen_endpoint("tcp/0.0.0.0:7447");
        assert!(matches!(
            config.validate(),
            Err(ZenohConfigError::ClientCannotListen { .. })
        ));

        let config = ZenohConfig::new(ZenohMode::Peer)
            .add_connect_endpoint("tcp/10.0.0.1:7447")
            .add_connect_endpoint("tcp/10.0.0.1:7447");
        assert!(matches!(
            config.validate(),
            Err(ZenohConfigError::DuplicateEndpoint { .. })
        ));

        let config = ZenohConfig::new(ZenohMode::Peer).add_connect_endpoint("serial/ttyS0");
        assert!(config.validate().is_err());

        let config = ZenohConfig::new(ZenohMode::Peer).add_connect_endpoint("tcp/10.0.0.1:0");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("ipv4_len", "too long");
        assert_eq!(err.to_string(), "Validation error in field 'ipv4_len': too long");
    }
}
