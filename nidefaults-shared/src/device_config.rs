//! Structured device configuration tree.
//!
//! The tree follows the shape of the OpenConfig `network-instances` and
//! `interfaces` containers, restricted to what the conformance scenario
//! configures. Maps are ordered so serialization is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

/// Root of the configuration handed to device management.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    pub network_instances: BTreeMap<String, RoutingDomainConfig>,
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

impl DeviceConfig {
    /// Add a routing domain. At most one domain per identifier.
    pub fn add_network_instance(&mut self, instance: RoutingDomainConfig) -> Result<(), String> {
        if self.network_instances.contains_key(&instance.name) {
            return Err(format!(
                "network instance '{}' is already defined",
                instance.name
            ));
        }
        self.network_instances
            .insert(instance.name.clone(), instance);
        Ok(())
    }

    /// Add an interface. Interface names are unique.
    pub fn add_interface(&mut self, interface: InterfaceConfig) -> Result<(), String> {
        if self.interfaces.contains_key(&interface.name) {
            return Err(format!("interface '{}' is already defined", interface.name));
        }
        self.interfaces.insert(interface.name.clone(), interface);
        Ok(())
    }

    /// Bindings that reference an interface or subinterface missing from
    /// this tree.
    pub fn dangling_bindings(&self) -> Vec<&InterfaceBinding> {
        self.network_instances
            .values()
            .flat_map(|ni| ni.interfaces.iter())
            .filter(|binding| {
                self.interfaces
                    .get(&binding.interface)
                    .is_none_or(|intf| !intf.subinterfaces.contains_key(&binding.subinterface))
            })
            .collect()
    }

    /// Pretty JSON rendering used when logging the pushed configuration.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A routing/switching domain (OpenConfig network instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingDomainConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: NetworkInstanceType,
    pub interfaces: BTreeSet<InterfaceBinding>,
}

impl RoutingDomainConfig {
    pub fn default_instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_type: NetworkInstanceType::DefaultInstance,
            interfaces: BTreeSet::new(),
        }
    }

    /// Names of the bound interfaces.
    pub fn bound_interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(|b| b.interface.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkInstanceType {
    DefaultInstance,
    L3Vrf,
}

/// Membership of a (sub)interface in a network instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceBinding {
    pub id: String,
    pub interface: String,
    pub subinterface: u32,
}

impl InterfaceBinding {
    pub fn new(interface: &str, subinterface: u32) -> Self {
        Self {
            id: format!("{}.{}", interface, subinterface),
            interface: interface.to_string(),
            subinterface,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    pub subinterfaces: BTreeMap<u32, SubinterfaceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceType {
    #[serde(rename = "ethernetCsmacd")]
    EthernetCsmacd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubinterfaceConfig {
    pub index: u32,
    pub ipv4: IpConfig,
    pub ipv6: IpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    pub addresses: Vec<IpAddressConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IpAddressConfig {
    pub ip: IpAddr,
    pub prefix_length: u8,
}

impl fmt::Display for IpAddressConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(name: &str) -> InterfaceConfig {
        let mut subinterfaces = BTreeMap::new();
        subinterfaces.insert(
            0,
            SubinterfaceConfig {
                index: 0,
                ipv4: IpConfig::default(),
                ipv6: IpConfig::default(),
            },
        );
        InterfaceConfig {
            name: name.to_string(),
            description: None,
            interface_type: InterfaceType::EthernetCsmacd,
            enabled: true,
            mtu: None,
            subinterfaces,
        }
    }

    #[test]
    fn test_single_instance_per_identifier() {
        let mut config = DeviceConfig::default();
        config
            .add_network_instance(RoutingDomainConfig::default_instance("DEFAULT"))
            .unwrap();
        assert!(
            config
                .add_network_instance(RoutingDomainConfig::default_instance("DEFAULT"))
                .is_err()
        );
    }

    #[test]
    fn test_dangling_bindings() {
        let mut config = DeviceConfig::default();
        config.add_interface(interface("Ethernet1")).unwrap();

        let mut ni = RoutingDomainConfig::default_instance("DEFAULT");
        ni.interfaces.insert(InterfaceBinding::new("Ethernet1", 0));
        ni.interfaces.insert(InterfaceBinding::new("Ethernet2", 0));
        ni.interfaces.insert(InterfaceBinding::new("Ethernet1", 5));
        config.add_network_instance(ni).unwrap();

        let dangling: Vec<_> = config
            .dangling_bindings()
            .into_iter()
            .map(|b| b.id.clone())
            .collect();
        assert_eq!(dangling, vec!["Ethernet1.5", "Ethernet2.0"]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut config = DeviceConfig::default();
        config.add_interface(interface("Ethernet1")).unwrap();
        let mut ni = RoutingDomainConfig::default_instance("DEFAULT");
        ni.interfaces.insert(InterfaceBinding::new("Ethernet1", 0));
        config.add_network_instance(ni).unwrap();

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json["network-instances"]["DEFAULT"]["type"],
            "DEFAULT_INSTANCE"
        );
        assert_eq!(
            json["network-instances"]["DEFAULT"]["interfaces"][0]["id"],
            "Ethernet1.0"
        );
        assert_eq!(json["interfaces"]["Ethernet1"]["type"], "ethernetCsmacd");
    }
}
