//! Endpoint addressing descriptors.
//!
//! An [`EndpointAttributes`] value describes the addressing of one side of a
//! link: either a DUT port or an emulated ATE port. The same descriptor is
//! used to produce the DUT interface configuration and the emulated device
//! the traffic generator instantiates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::device_config::{
    InterfaceConfig, InterfaceType, IpAddressConfig, IpConfig, SubinterfaceConfig,
};
use crate::traffic::EmulatedDevice;
use crate::{Validate, ValidationError};

/// Subinterface index used for all addressing.
pub const DEFAULT_SUBINTERFACE: u32 = 0;

/// Addressing of a single interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAttributes {
    name: String,
    description: Option<String>,
    ipv4: Ipv4Addr,
    ipv4_len: u8,
    ipv6: Ipv6Addr,
    ipv6_len: u8,
    mac: Option<MacAddress>,
    mtu: Option<u16>,
}

impl EndpointAttributes {
    /// Create validated attributes without a MAC (suitable for DUT ports).
    pub fn new(
        name: impl Into<String>,
        ipv4: Ipv4Addr,
        ipv4_len: u8,
        ipv6: Ipv6Addr,
        ipv6_len: u8,
    ) -> Result<Self, ValidationError> {
        let attrs = Self {
            name: name.into(),
            description: None,
            ipv4,
            ipv4_len,
            ipv6,
            ipv6_len,
            mac: None,
            mtu: None,
        };
        attrs.validate()?;
        Ok(attrs)
    }

    /// Attach a MAC address, required for emulated endpoints.
    pub fn with_mac(mut self, mac: MacAddress) -> Result<Self, ValidationError> {
        if mac.is_multicast() {
            return Err(ValidationError::new(
                "mac",
                format!("MAC address {} is not unicast", mac),
            ));
        }
        self.mac = Some(mac);
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mtu(mut self, mtu: u16) -> Result<Self, ValidationError> {
        if mtu < 68 {
            return Err(ValidationError::new(
                "mtu",
                format!("MTU must be at least 68, got {}", mtu),
            ));
        }
        self.mtu = Some(mtu);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        self.ipv4
    }

    pub fn ipv4_len(&self) -> u8 {
        self.ipv4_len
    }

    pub fn ipv6(&self) -> Ipv6Addr {
        self.ipv6
    }

    pub fn ipv6_len(&self) -> u8 {
        self.ipv6_len
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    /// `address/prefix` form of the IPv4 address.
    pub fn ipv4_cidr(&self) -> String {
        format!("{}/{}", self.ipv4, self.ipv4_len)
    }

    /// `address/prefix` form of the IPv6 address.
    pub fn ipv6_cidr(&self) -> String {
        format!("{}/{}", self.ipv6, self.ipv6_len)
    }

    /// Validate the attributes of an emulated (traffic generator) endpoint.
    ///
    /// Emulated endpoints need a name and a MAC on top of the common checks.
    pub fn validate_emulated(&self) -> Result<(), ValidationError> {
        self.validate()?;
        if self.name.trim().is_empty() {
            return Err(ValidationError::new(
                "name",
                "emulated endpoint requires a name",
            ));
        }
        if self.mac.is_none() {
            return Err(ValidationError::new(
                "mac",
                format!("emulated endpoint '{}' requires a MAC address", self.name),
            ));
        }
        Ok(())
    }

    /// DUT interface fragment: the interface with both addresses on
    /// subinterface 0. No address-family enablement beyond the addresses
    /// themselves is configured.
    pub fn to_interface_config(&self, interface: &str) -> InterfaceConfig {
        let mut subinterfaces = std::collections::BTreeMap::new();
        subinterfaces.insert(
            DEFAULT_SUBINTERFACE,
            SubinterfaceConfig {
                index: DEFAULT_SUBINTERFACE,
                ipv4: IpConfig {
                    addresses: vec![IpAddressConfig {
                        ip: IpAddr::V4(self.ipv4),
                        prefix_length: self.ipv4_len,
                    }],
                },
                ipv6: IpConfig {
                    addresses: vec![IpAddressConfig {
                        ip: IpAddr::V6(self.ipv6),
                        prefix_length: self.ipv6_len,
                    }],
                },
            },
        );

        InterfaceConfig {
            name: interface.to_string(),
            description: self.description.clone(),
            interface_type: InterfaceType::EthernetCsmacd,
            enabled: true,
            mtu: self.mtu,
            subinterfaces,
        }
    }

    /// Emulated device fragment, using `peer` (the attached DUT port) as the
    /// IPv4 and IPv6 gateway.
    pub fn to_emulated_device(&self, peer: &EndpointAttributes) -> EmulatedDevice {
        EmulatedDevice {
            port: self.name.clone(),
            ethernet_name: format!("{}.Eth", self.name),
            mac: self.mac,
            mtu: self.mtu,
            ipv4_name: format!("{}.IPv4", self.name),
            ipv4: self.ipv4,
            ipv4_len: self.ipv4_len,
            ipv4_gateway: peer.ipv4,
            ipv6_name: format!("{}.IPv6", self.name),
            ipv6: self.ipv6,
            ipv6_len: self.ipv6_len,
            ipv6_gateway: peer.ipv6,
        }
    }
}

impl Validate for EndpointAttributes {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.ipv4_len == 0 || self.ipv4_len > 32 {
            return Err(ValidationError::new(
                "ipv4_len",
                format!("IPv4 prefix length must be 1-32, got {}", self.ipv4_len),
            ));
        }
        if self.ipv6_len == 0 || self.ipv6_len > 128 {
            return Err(ValidationError::new(
                "ipv6_len",
                format!("IPv6 prefix length must be 1-128, got {}", self.ipv6_len),
            ));
        }
        if self.ipv4.is_unspecified() || self.ipv4.is_multicast() || self.ipv4.is_broadcast() {
            return Err(ValidationError::new(
                "ipv4",
                format!("{} is not a usable interface address", self.ipv4),
            ));
        }
        if self.ipv6.is_unspecified() || self.ipv6.is_multicast() {
            return Err(ValidationError::new(
                "ipv6",
                format!("{} is not a usable interface address", self.ipv6),
            ));
        }
        Ok(())
    }
}

/// Parse `address/prefix` into its parts.
pub fn parse_cidr<A: FromStr>(s: &str) -> Result<(A, u8), ValidationError> {
    let (addr, len) = s.trim().split_once('/').ok_or_else(|| {
        ValidationError::new("address", format!("'{}' is missing a prefix length", s))
    })?;
    let addr = addr
        .parse::<A>()
        .map_err(|_| ValidationError::new("address", format!("'{}' is not a valid address", addr)))?;
    let len = len.parse::<u8>().map_err(|_| {
        ValidationError::new("prefix_length", format!("'{}' is not a valid prefix length", len))
    })?;
    Ok((addr, len))
}

/// 48-bit Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group bit set (covers broadcast as well).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::new("mac", format!("'{}' is not a valid MAC address", s));

        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dut_port1() -> EndpointAttributes {
        EndpointAttributes::new(
            "",
            "192.0.2.0".parse().unwrap(),
            31,
            "2001:db8::1".parse().unwrap(),
            64,
        )
        .unwrap()
    }

    #[test]
    fn test_prefix_length_bounds() {
        let v4 = "192.0.2.1".parse().unwrap();
        let v6 = "2001:db8::2".parse().unwrap();

        assert!(EndpointAttributes::new("port1", v4, 32, v6, 128).is_ok());
        let err = EndpointAttributes::new("port1", v4, 33, v6, 64).unwrap_err();
        assert_eq!(err.field, "ipv4_len");
        let err = EndpointAttributes::new("port1", v4, 31, v6, 129).unwrap_err();
        assert_eq!(err.field, "ipv6_len");
        assert!(EndpointAttributes::new("port1", v4, 0, v6, 64).is_err());
    }

    #[test]
    fn test_unusable_addresses_rejected() {
        let v6 = "2001:db8::2".parse().unwrap();
        assert!(EndpointAttributes::new("p", "0.0.0.0".parse().unwrap(), 31, v6, 64).is_err());
        assert!(EndpointAttributes::new("p", "224.0.0.1".parse().unwrap(), 31, v6, 64).is_err());
        assert!(
            EndpointAttributes::new("p", "192.0.2.1".parse().unwrap(), 31, "ff02::1".parse().unwrap(), 64)
                .is_err()
        );
    }

    #[test]
    fn test_emulated_endpoint_requires_mac() {
        let attrs = EndpointAttributes::new(
            "port1",
            "192.0.2.1".parse().unwrap(),
            31,
            "2001:db8::2".parse().unwrap(),
            64,
        )
        .unwrap();
        assert_eq!(attrs.validate_emulated().unwrap_err().field, "mac");

        let attrs = attrs.with_mac("02:00:01:01:01:01".parse().unwrap()).unwrap();
        assert!(attrs.validate_emulated().is_ok());
    }

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddress = "02:00:01:01:01:0A".parse().unwrap();
        assert_eq!(mac.octets(), [0x02, 0x00, 0x01, 0x01, 0x01, 0x0a]);
        assert_eq!(mac.to_string(), "02:00:01:01:01:0a");
        assert!(!mac.is_multicast());

        assert!("02:00:01:01:01".parse::<MacAddress>().is_err());
        assert!("02:00:01:01:01:01:01".parse::<MacAddress>().is_err());
        assert!("zz:00:01:01:01:01".parse::<MacAddress>().is_err());
        assert!("ff:ff:ff:ff:ff:ff".parse::<MacAddress>().unwrap().is_multicast());
    }

    #[test]
    fn test_multicast_mac_rejected() {
        let err = dut_port1()
            .with_mac("01:00:5e:00:00:01".parse().unwrap())
            .unwrap_err();
        assert_eq!(err.field, "mac");
    }

    #[test]
    fn test_parse_cidr() {
        let (addr, len) = parse_cidr::<Ipv4Addr>("192.0.2.2/31").unwrap();
        assert_eq!(addr, Ipv4Addr::new(192, 0, 2, 2));
        assert_eq!(len, 31);

        let (addr, len) = parse_cidr::<Ipv6Addr>(" 2001:db8:1::1/64 ").unwrap();
        assert_eq!(addr, "2001:db8:1::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(len, 64);

        assert!(parse_cidr::<Ipv4Addr>("192.0.2.2").is_err());
        assert!(parse_cidr::<Ipv4Addr>("2001:db8::1/64").is_err());
        assert!(parse_cidr::<Ipv4Addr>("192.0.2.2/abc").is_err());
    }

    #[test]
    fn test_interface_fragment() {
        let config = dut_port1()
            .with_description("to ATE port1")
            .to_interface_config("Ethernet1");

        assert_eq!(config.name, "Ethernet1");
        assert!(config.enabled);
        assert_eq!(config.description.as_deref(), Some("to ATE port1"));
        let sub = &config.subinterfaces[&DEFAULT_SUBINTERFACE];
        assert_eq!(sub.ipv4.addresses[0].to_string(), "192.0.2.0/31");
        assert_eq!(sub.ipv6.addresses[0].to_string(), "2001:db8::1/64");
    }

    #[test]
    fn test_emulated_device_uses_peer_as_gateway() {
        let ate = EndpointAttributes::new(
            "port1",
            "192.0.2.1".parse().unwrap(),
            31,
            "2001:db8::2".parse().unwrap(),
            64,
        )
        .unwrap()
        .with_mac("02:00:01:01:01:01".parse().unwrap())
        .unwrap();

        let device = ate.to_emulated_device(&dut_port1());
        assert_eq!(device.ethernet_name, "port1.Eth");
        assert_eq!(device.ipv4_name, "port1.IPv4");
        assert_eq!(device.ipv6_name, "port1.IPv6");
        assert_eq!(device.ipv4_gateway, Ipv4Addr::new(192, 0, 2, 0));
        assert_eq!(device.ipv6_gateway, "2001:db8::1".parse::<Ipv6Addr>().unwrap());
    }
}
