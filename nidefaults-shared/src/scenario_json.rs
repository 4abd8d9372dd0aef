//! JSON5 parsing for scenario files.
//!
//! Addresses are written in CIDR form (`"192.0.2.0/31"`) and durations as
//! strings understood by the `duration-string` crate (`"500ms"`, `"15s"`,
//! `"1m"`). A minimal file looks like:
//!
//! ```json5
//! {
//!   id: "default-address-families",
//!   links: [
//!     { dut: { interface: "Ethernet1", ipv4: "192.0.2.0/31", ipv6: "2001:db8::1/64" },
//!       ate: { name: "port1", ipv4: "192.0.2.1/31", ipv6: "2001:db8::2/64", mac: "02:00:01:01:01:01" } },
//!     { dut: { interface: "Ethernet2", ipv4: "192.0.2.2/31", ipv6: "2001:db8:1::1/64" },
//!       ate: { name: "port2", ipv4: "192.0.2.3/31", ipv6: "2001:db8:1::2/64", mac: "02:00:02:01:01:01" } },
//!   ],
//!   flows: { source: "port1", destination: "port2" },
//!   timing: { settle: "15s", convergence_deadline: "1m" },
//! }
//! ```

use duration_string::DurationString;
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::endpoint::{EndpointAttributes, MacAddress, parse_cidr};
use crate::scenario::{PortLink, ScenarioDefinition, TimingOverrides};
use crate::{Validate, ValidationError};

/// Parse a duration string like "50ms", "5s", "1m".
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let duration: DurationString = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid duration '{}': {}", s, e))?;
    Ok(duration.into())
}

#[derive(Error, Debug)]
pub enum ScenarioParseError {
    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid value for '{field}': {message}")]
    Field { field: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub network_instance: Option<String>,
    pub links: Vec<LinkJson>,
    pub flows: FlowsJson,
    #[serde(default)]
    pub watch_ipv6_neighbors: bool,
    #[serde(default)]
    pub timing: TimingJson,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkJson {
    pub dut: DutPortJson,
    pub ate: AtePortJson,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DutPortJson {
    pub interface: String,
    pub ipv4: String,
    pub ipv6: String,
    pub description: Option<String>,
    pub mtu: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtePortJson {
    pub name: String,
    pub ipv4: String,
    pub ipv6: String,
    pub mac: String,
    pub mtu: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowsJson {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingJson {
    pub protocol_grace: Option<String>,
    pub convergence_deadline: Option<String>,
    pub settle: Option<String>,
}

fn attributes(
    name: &str,
    ipv4: &str,
    ipv6: &str,
    mtu: Option<u16>,
) -> Result<EndpointAttributes, ValidationError> {
    let (v4, v4_len) = parse_cidr::<Ipv4Addr>(ipv4)?;
    let (v6, v6_len) = parse_cidr::<Ipv6Addr>(ipv6)?;
    let attrs = EndpointAttributes::new(name, v4, v4_len, v6, v6_len)?;
    match mtu {
        Some(mtu) => attrs.with_mtu(mtu),
        None => Ok(attrs),
    }
}

fn optional_duration(
    field: &str,
    value: &Option<String>,
) -> Result<Option<Duration>, ScenarioParseError> {
    value
        .as_deref()
        .map(parse_duration_string)
        .transpose()
        .map_err(|message| ScenarioParseError::Field {
            field: format!("timing.{}", field),
            message,
        })
}

impl TryFrom<ScenarioFile> for ScenarioDefinition {
    type Error = ScenarioParseError;

    fn try_from(file: ScenarioFile) -> Result<Self, Self::Error> {
        let mut links = Vec::with_capacity(file.links.len());
        for link in file.links {
            let mut dut = attributes(
                &link.dut.interface,
                &link.dut.ipv4,
                &link.dut.ipv6,
                link.dut.mtu,
            )?;
            if let Some(description) = link.dut.description {
                dut = dut.with_description(description);
            }

            let mac: MacAddress = link.ate.mac.parse()?;
            let ate = attributes(&link.ate.name, &link.ate.ipv4, &link.ate.ipv6, link.ate.mtu)?
                .with_mac(mac)?;

            links.push(PortLink {
                dut_interface: link.dut.interface,
                dut,
                ate,
            });
        }

        let timing = TimingOverrides {
            protocol_grace: optional_duration("protocol_grace", &file.timing.protocol_grace)?,
            convergence_deadline: optional_duration(
                "convergence_deadline",
                &file.timing.convergence_deadline,
            )?,
            settle: optional_duration("settle", &file.timing.settle)?,
        };

        let scenario = ScenarioDefinition {
            id: file.id,
            description: file.description,
            network_instance: file.network_instance,
            links,
            flow_source: file.flows.source,
            flow_destination: file.flows.destination,
            watch_ipv6_neighbors: file.watch_ipv6_neighbors,
            timing,
        };
        scenario.validate()?;
        Ok(scenario)
    }
}

/// Parse and validate scenario JSON5 text.
pub fn parse_scenario_json5(content: &str) -> Result<ScenarioDefinition, ScenarioParseError> {
    let file: ScenarioFile =
        json5::from_str(content).map_err(|e| ScenarioParseError::Json5(e.to_string()))?;
    file.try_into()
}

/// Read, parse and validate a scenario file.
pub fn parse_scenario_file(path: &Path) -> Result<ScenarioDefinition, ScenarioParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_scenario_json5(&content)
}
