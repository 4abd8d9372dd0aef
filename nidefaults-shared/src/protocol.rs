//! Request/reply messages exchanged with the device and traffic agents.
//!
//! All payloads are JSON. Each agent answers queries on its own
//! [`topics`](crate::topics) key expression.

use serde::{Deserialize, Serialize};

use crate::device_config::DeviceConfig;
use crate::traffic::{FlowCounters, PortCounters, Topology};

/// Device management query (`nidefaults/{agent}/query/device`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceRequest {
    ApplyConfig { config: DeviceConfig },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceResponse {
    Applied,
    Rejected { reason: String },
    Error { message: String },
}

/// Point state query (`nidefaults/{agent}/query/state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateResponse {
    /// `None` when the path holds no value.
    Value { value: Option<serde_json::Value> },
    Error { message: String },
}

/// Pushed on `nidefaults/{agent}/state/{path}` whenever a value changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub path: String,
    pub value: Option<serde_json::Value>,
    pub timestamp: u64,
}

/// Traffic generator control query (`nidefaults/{agent}/query/traffic`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrafficRequest {
    PushTopology { topology: Topology },
    StartProtocols,
    StartTraffic,
    StopTraffic,
    FlowCounters { flow: String },
    PortCounters { port: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrafficResponse {
    Ack,
    Rejected { reason: String },
    FlowCounters { counters: FlowCounters },
    PortCounters { counters: PortCounters },
    NotFound { what: String },
    Error { message: String },
}
