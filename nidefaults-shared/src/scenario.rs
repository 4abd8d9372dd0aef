//! Conformance scenario definitions.
//!
//! A scenario describes the links between DUT ports and emulated ATE ports,
//! the flow direction and optional timing overrides. All peer addressing is
//! scenario-scoped; nothing here is process-wide.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::endpoint::{EndpointAttributes, MacAddress};
use crate::{Validate, ValidationError};

/// Identifier of the built-in scenario.
pub const DEFAULT_SCENARIO_ID: &str = "default-address-families";

/// One DUT port cabled to one emulated port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLink {
    /// DUT interface name as known by the device (e.g. `Ethernet1`).
    pub dut_interface: String,
    pub dut: EndpointAttributes,
    pub ate: EndpointAttributes,
}

/// Per-scenario overrides of the harness timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingOverrides {
    pub protocol_grace: Option<Duration>,
    pub convergence_deadline: Option<Duration>,
    pub settle: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub description: String,
    /// Overrides the configured default network instance name.
    pub network_instance: Option<String>,
    pub links: Vec<PortLink>,
    /// ATE port the flows are sent from.
    pub flow_source: String,
    /// ATE port the flows are sent to.
    pub flow_destination: String,
    /// Also wait for IPv6 neighbor resolution before starting traffic.
    pub watch_ipv6_neighbors: bool,
    pub timing: TimingOverrides,
}

impl ScenarioDefinition {
    /// Two DUT ports in the default network instance, each facing an
    /// emulated port, with IPv4 /31 and IPv6 /64 addressing.
    pub fn default_address_families() -> Self {
        let link = |dut_interface: &str,
                    dut: (Ipv4Addr, Ipv6Addr),
                    ate_name: &str,
                    ate: (Ipv4Addr, Ipv6Addr),
                    mac: [u8; 6]|
         -> PortLink {
            PortLink {
                dut_interface: dut_interface.to_string(),
                dut: EndpointAttributes::new(dut_interface, dut.0, 31, dut.1, 64)
                    .expect("static DUT addressing is valid"),
                ate: EndpointAttributes::new(ate_name, ate.0, 31, ate.1, 64)
                    .and_then(|a| a.with_mac(MacAddress::new(mac)))
                    .expect("static ATE addressing is valid"),
            }
        };

        Self {
            id: DEFAULT_SCENARIO_ID.to_string(),
            description: "IPv4 and IPv6 are forwarded in the default network instance \
                          without address-family configuration"
                .to_string(),
            network_instance: None,
            links: vec![
                link(
                    "port1",
                    (Ipv4Addr::new(192, 0, 2, 0), Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
                    "port1",
                    (Ipv4Addr::new(192, 0, 2, 1), Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2)),
                    [0x02, 0x00, 0x01, 0x01, 0x01, 0x01],
                ),
                link(
                    "port2",
                    (Ipv4Addr::new(192, 0, 2, 2), Ipv6Addr::new(0x2001, 0xdb8, 1, 0, 0, 0, 0, 1)),
                    "port2",
                    (Ipv4Addr::new(192, 0, 2, 3), Ipv6Addr::new(0x2001, 0xdb8, 1, 0, 0, 0, 0, 2)),
                    [0x02, 0x00, 0x02, 0x01, 0x01, 0x01],
                ),
            ],
            flow_source: "port1".to_string(),
            flow_destination: "port2".to_string(),
            watch_ipv6_neighbors: false,
            timing: TimingOverrides::default(),
        }
    }

    /// Rename the DUT interfaces (testbed binding), keeping their order.
    pub fn with_dut_interfaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (link, name) in self.links.iter_mut().zip(names) {
            link.dut_interface = name.into();
        }
        self
    }

    pub fn link_for_ate(&self, ate_port: &str) -> Option<&PortLink> {
        self.links.iter().find(|l| l.ate.name() == ate_port)
    }

    pub fn ate_ports(&self) -> Vec<String> {
        self.links.iter().map(|l| l.ate.name().to_string()).collect()
    }
}

impl Validate for ScenarioDefinition {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::new("id", "scenario id cannot be empty"));
        }
        if self.links.len() < 2 {
            return Err(ValidationError::new(
                "links",
                format!("at least two links are required, got {}", self.links.len()),
            ));
        }

        let mut dut_interfaces = HashSet::new();
        let mut ate_ports = HashSet::new();
        for link in &self.links {
            if link.dut_interface.trim().is_empty() {
                return Err(ValidationError::new(
                    "dut_interface",
                    "DUT interface name cannot be empty",
                ));
            }
            if !dut_interfaces.insert(link.dut_interface.as_str()) {
                return Err(ValidationError::new(
                    "dut_interface",
                    format!("DUT interface '{}' is used twice", link.dut_interface),
                ));
            }
            if !ate_ports.insert(link.ate.name()) {
                return Err(ValidationError::new(
                    "ate",
                    format!("ATE port '{}' is used twice", link.ate.name()),
                ));
            }
            link.dut.validate()?;
            link.ate.validate_emulated()?;
        }

        for (field, port) in [
            ("flow_source", &self.flow_source),
            ("flow_destination", &self.flow_destination),
        ] {
            if !ate_ports.contains(port.as_str()) {
                return Err(ValidationError::new(
                    field,
                    format!("'{}' is not an ATE port of this scenario", port),
                ));
            }
        }
        if self.flow_source == self.flow_destination {
            return Err(ValidationError::new(
                "flow_destination",
                "flow source and destination must differ",
            ));
        }

        if self.timing.convergence_deadline == Some(Duration::ZERO) {
            return Err(ValidationError::new(
                "timing.convergence_deadline",
                "convergence deadline must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_is_valid() {
        let scenario = ScenarioDefinition::default_address_families();
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.ate_ports(), vec!["port1", "port2"]);
        assert_eq!(
            scenario.link_for_ate("port2").unwrap().dut.ipv4_cidr(),
            "192.0.2.2/31"
        );
    }

    #[test]
    fn test_with_dut_interfaces() {
        let scenario = ScenarioDefinition::default_address_families()
            .with_dut_interfaces(["Ethernet1", "Ethernet2"]);
        assert_eq!(scenario.links[0].dut_interface, "Ethernet1");
        assert_eq!(scenario.links[1].dut_interface, "Ethernet2");
    }

    #[test]
    fn test_flow_endpoints_must_exist() {
        let mut scenario = ScenarioDefinition::default_address_families();
        scenario.flow_destination = "port9".to_string();
        assert_eq!(scenario.validate().unwrap_err().field, "flow_destination");

        scenario.flow_destination = "port1".to_string();
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_duplicate_dut_interface_rejected() {
        let scenario = ScenarioDefinition::default_address_families()
            .with_dut_interfaces(["Ethernet1", "Ethernet1"]);
        assert_eq!(scenario.validate().unwrap_err().field, "dut_interface");
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let mut scenario = ScenarioDefinition::default_address_families();
        scenario.timing.convergence_deadline = Some(Duration::ZERO);
        assert!(scenario.validate().is_err());
    }
}
