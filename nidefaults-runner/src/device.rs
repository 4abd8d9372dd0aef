//! Device configuration builder.
//!
//! Produces the minimal DUT configuration for the scenario: a single default
//! network instance with the DUT ports bound to it and their addresses set.
//! No address-family is enabled explicitly; that is the behavior under test.

use tracing::debug;

use nidefaults_shared::device_config::{DeviceConfig, InterfaceBinding, RoutingDomainConfig};
use nidefaults_shared::endpoint::DEFAULT_SUBINTERFACE;
use nidefaults_shared::errors::{ConformanceError, ConformanceResult};
use nidefaults_shared::{EndpointAttributes, Validate};

/// Name most implementations use for the default network instance.
pub const DEFAULT_NETWORK_INSTANCE: &str = "DEFAULT";

#[derive(Debug, Clone)]
pub struct DeviceConfigBuilder {
    network_instance: String,
}

impl Default for DeviceConfigBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_INSTANCE)
    }
}

impl DeviceConfigBuilder {
    pub fn new(network_instance: impl Into<String>) -> Self {
        Self {
            network_instance: network_instance.into(),
        }
    }

    pub fn network_instance(&self) -> &str {
        &self.network_instance
    }

    /// Build the configuration tree. Pure: equal inputs give equal trees.
    pub fn build(&self, ports: &[(String, EndpointAttributes)]) -> ConformanceResult<DeviceConfig> {
        if self.network_instance.trim().is_empty() {
            return Err(ConformanceError::config(
                "network-instance",
                "network instance name cannot be empty",
            ));
        }

        let mut config = DeviceConfig::default();
        let mut instance = RoutingDomainConfig::default_instance(&self.network_instance);

        for (interface, attrs) in ports {
            if interface.trim().is_empty() {
                return Err(ConformanceError::config(
                    "interface",
                    "interface name cannot be empty",
                ));
            }
            attrs
                .validate()
                .map_err(|e| ConformanceError::config(interface.as_str(), e.to_string()))?;

            config
                .add_interface(attrs.to_interface_config(interface))
                .map_err(|reason| ConformanceError::config(interface.as_str(), reason))?;
            instance
                .interfaces
                .insert(InterfaceBinding::new(interface, DEFAULT_SUBINTERFACE));
        }

        config
            .add_network_instance(instance)
            .map_err(|reason| ConformanceError::config(self.network_instance.as_str(), reason))?;

        if let Some(binding) = config.dangling_bindings().first() {
            return Err(ConformanceError::config(
                binding.id.as_str(),
                "binding references an interface missing from the configuration",
            ));
        }

        debug!(
            "Built configuration for network instance '{}' with {} interface(s)",
            self.network_instance,
            config.interfaces.len()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidefaults_shared::device_config::NetworkInstanceType;

    fn ports() -> Vec<(String, EndpointAttributes)> {
        vec![
            (
                "Ethernet1".to_string(),
                EndpointAttributes::new(
                    "Ethernet1",
                    "192.0.2.0".parse().unwrap(),
                    31,
                    "2001:db8::1".parse().unwrap(),
                    64,
                )
                .unwrap(),
            ),
            (
                "Ethernet2".to_string(),
                EndpointAttributes::new(
                    "Ethernet2",
                    "192.0.2.2".parse().unwrap(),
                    31,
                    "2001:db8:1::1".parse().unwrap(),
                    64,
                )
                .unwrap(),
            ),
        ]
    }

    #[test]
    fn test_build_default_instance_with_two_bindings() {
        let config = DeviceConfigBuilder::default().build(&ports()).unwrap();

        assert_eq!(config.network_instances.len(), 1);
        let instance = &config.network_instances[DEFAULT_NETWORK_INSTANCE];
        assert_eq!(instance.instance_type, NetworkInstanceType::DefaultInstance);
        assert_eq!(
            instance.bound_interfaces().collect::<Vec<_>>(),
            vec!["Ethernet1", "Ethernet2"]
        );
        assert_eq!(config.interfaces.len(), 2);
        assert!(config.dangling_bindings().is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let builder = DeviceConfigBuilder::new("default");
        let first = builder.build(&ports()).unwrap();
        let second = builder.build(&ports()).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut reversed = ports();
        reversed.reverse();
        let builder = DeviceConfigBuilder::default();
        assert_eq!(
            builder.build(&ports()).unwrap(),
            builder.build(&reversed).unwrap()
        );
    }

    #[test]
    fn test_empty_interface_name_rejected() {
        let mut ports = ports();
        ports[1].0 = " ".to_string();
        let err = DeviceConfigBuilder::default().build(&ports).unwrap_err();
        assert!(matches!(err, ConformanceError::Config { ref subject, .. } if subject == "interface"));
    }

    #[test]
    fn test_duplicate_interface_rejected() {
        let mut ports = ports();
        ports[1].0 = "Ethernet1".to_string();
        let err = DeviceConfigBuilder::default().build(&ports).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_malformed_attributes_rejected() {
        let attrs: EndpointAttributes = serde_json::from_value(serde_json::json!({
            "name": "Ethernet3",
            "ipv4": "192.0.2.4",
            "ipv4_len": 40,
            "ipv6": "2001:db8:2::1",
            "ipv6_len": 64,
        }))
        .unwrap();

        let mut ports = ports();
        ports.push(("Ethernet3".to_string(), attrs));
        let err = DeviceConfigBuilder::default().build(&ports).unwrap_err();
        assert!(matches!(err, ConformanceError::Config { ref subject, .. } if subject == "Ethernet3"));
    }

    #[test]
    fn test_empty_network_instance_rejected() {
        assert!(DeviceConfigBuilder::new("").build(&ports()).is_err());
    }
}
