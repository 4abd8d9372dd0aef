//! Traffic generator topology, flows and counters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::endpoint::MacAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Emulated device the traffic generator instantiates behind one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedDevice {
    pub port: String,
    pub ethernet_name: String,
    pub mac: Option<MacAddress>,
    pub mtu: Option<u16>,
    pub ipv4_name: String,
    pub ipv4: Ipv4Addr,
    pub ipv4_len: u8,
    pub ipv4_gateway: Ipv4Addr,
    pub ipv6_name: String,
    pub ipv6: Ipv6Addr,
    pub ipv6_len: u8,
    pub ipv6_gateway: Ipv6Addr,
}

impl EmulatedDevice {
    /// Names flows may use as tx/rx endpoints.
    pub fn endpoint_names(&self) -> [&str; 2] {
        [&self.ipv4_name, &self.ipv6_name]
    }
}

/// A generated traffic stream with its own counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    pub family: AddressFamily,
    pub tx_names: Vec<String>,
    pub rx_names: Vec<String>,
    pub src_mac: Option<MacAddress>,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub metrics_enabled: bool,
}

/// Complete traffic generator configuration for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub devices: Vec<EmulatedDevice>,
    pub flows: Vec<FlowDefinition>,
}

impl Topology {
    pub fn flow_names(&self) -> Vec<String> {
        self.flows.iter().map(|f| f.name.clone()).collect()
    }

    pub fn port_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.port.clone()).collect()
    }

    /// Structural checks done before handing the topology to the generator.
    pub fn check(&self) -> Result<(), String> {
        let mut ports = HashSet::new();
        let mut endpoints = HashSet::new();
        for device in &self.devices {
            if !ports.insert(device.port.as_str()) {
                return Err(format!("duplicate port '{}'", device.port));
            }
            endpoints.extend(device.endpoint_names());
        }

        let mut flows = HashSet::new();
        for flow in &self.flows {
            if flow.name.is_empty() {
                return Err("flow with empty name".to_string());
            }
            if !flows.insert(flow.name.as_str()) {
                return Err(format!("duplicate flow name '{}'", flow.name));
            }
            if flow.tx_names.is_empty() || flow.rx_names.is_empty() {
                return Err(format!("flow '{}' has no tx or rx endpoint", flow.name));
            }
            if let Some(unknown) = flow
                .tx_names
                .iter()
                .chain(&flow.rx_names)
                .find(|name| !endpoints.contains(name.as_str()))
            {
                return Err(format!(
                    "flow '{}' references unknown endpoint '{}'",
                    flow.name, unknown
                ));
            }
        }
        Ok(())
    }
}

/// Per-flow packet counters read after traffic stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
}

impl FlowCounters {
    pub fn new(tx_packets: u64, rx_packets: u64) -> Self {
        Self {
            tx_packets,
            rx_packets,
        }
    }

    /// `(tx - rx) * 100 / tx`; `None` when nothing was transmitted.
    /// Negative when more packets were received than sent.
    pub fn loss_percent(&self) -> Option<f64> {
        if self.tx_packets == 0 {
            return None;
        }
        let lost = self.tx_packets as f64 - self.rx_packets as f64;
        Some(lost * 100.0 / self.tx_packets as f64)
    }
}

/// Per-port frame counters, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCounters {
    pub tx_frames: u64,
    pub rx_frames: u64,
}

/// Outcome of loss verification for one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Pass {
        counters: FlowCounters,
    },
    Fail {
        loss_percent: f64,
        counters: FlowCounters,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn counters(&self) -> FlowCounters {
        match self {
            Verdict::Pass { counters } | Verdict::Fail { counters, .. } => *counters,
        }
    }

    pub fn loss_percent(&self) -> f64 {
        match self {
            Verdict::Pass { .. } => 0.0,
            Verdict::Fail { loss_percent, .. } => *loss_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(port: &str) -> EmulatedDevice {
        EmulatedDevice {
            port: port.to_string(),
            ethernet_name: format!("{}.Eth", port),
            mac: None,
            mtu: None,
            ipv4_name: format!("{}.IPv4", port),
            ipv4: Ipv4Addr::new(192, 0, 2, 1),
            ipv4_len: 31,
            ipv4_gateway: Ipv4Addr::new(192, 0, 2, 0),
            ipv6_name: format!("{}.IPv6", port),
            ipv6: "2001:db8::2".parse().unwrap(),
            ipv6_len: 64,
            ipv6_gateway: "2001:db8::1".parse().unwrap(),
        }
    }

    fn flow(name: &str, tx: &str, rx: &str) -> FlowDefinition {
        FlowDefinition {
            name: name.to_string(),
            family: AddressFamily::V4,
            tx_names: vec![tx.to_string()],
            rx_names: vec![rx.to_string()],
            src_mac: None,
            src_ip: "192.0.2.1".parse().unwrap(),
            dst_ip: "192.0.2.3".parse().unwrap(),
            metrics_enabled: true,
        }
    }

    #[test]
    fn test_loss_percent() {
        assert_eq!(FlowCounters::new(1000, 1000).loss_percent(), Some(0.0));
        assert_eq!(FlowCounters::new(1000, 900).loss_percent(), Some(10.0));
        assert_eq!(FlowCounters::new(1000, 999).loss_percent(), Some(0.1));
        assert_eq!(FlowCounters::new(0, 0).loss_percent(), None);
        assert!(FlowCounters::new(100, 101).loss_percent().unwrap() < 0.0);
    }

    #[test]
    fn test_topology_check() {
        let mut topology = Topology {
            devices: vec![device("port1"), device("port2")],
            flows: vec![flow("ipv4", "port1.IPv4", "port2.IPv4")],
        };
        assert!(topology.check().is_ok());

        topology.flows.push(flow("ipv4", "port1.IPv4", "port2.IPv4"));
        assert!(topology.check().unwrap_err().contains("duplicate flow"));

        topology.flows.pop();
        topology.flows.push(flow("ipv6", "port1.IPv6", "port3.IPv6"));
        assert!(topology.check().unwrap_err().contains("port3.IPv6"));

        topology.flows.pop();
        topology.devices.push(device("port1"));
        assert!(topology.check().unwrap_err().contains("duplicate port"));
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::Fail {
            loss_percent: 10.0,
            counters: FlowCounters::new(1000, 900),
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["verdict"], "fail");
        assert_eq!(json["counters"]["rx_packets"], 900);
        assert!(!verdict.is_pass());
    }
}
