//! In-memory collaborators.
//!
//! A simulated lab stands in for the DUT, the telemetry service and the
//! traffic generator. It backs the `--simulate` dry-run mode and the test
//! suite. Behavior is controlled by a [`SimulationProfile`]: per-flow loss,
//! endpoints whose neighbors never resolve, topology rejection.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use nidefaults_shared::errors::{CollaboratorError, CollaboratorResult};
use nidefaults_shared::{DeviceConfig, FlowCounters, PortCounters, Topology};

use crate::collaborators::{
    Collaborators, DeviceManagement, StatePath, StateReader, StateSubscription, StateUpdates,
    TrafficGenerator,
};

/// Link-layer address the simulated DUT answers neighbor discovery with.
const DUT_MAC: &str = "02:1a:c0:00:02:00";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Push-based telemetry keyed by exact path.
#[derive(Default)]
pub struct SimulatedTelemetry {
    paths: Mutex<HashMap<StatePath, watch::Sender<Option<Value>>>>,
}

impl SimulatedTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value at `path`, notifying every subscriber.
    pub fn publish(&self, path: &StatePath, value: Option<Value>) {
        let mut paths = lock(&self.paths);
        match paths.get(path) {
            Some(sender) => {
                sender.send_replace(value);
            }
            None => {
                paths.insert(path.clone(), watch::Sender::new(value));
            }
        }
    }

    /// Live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &StatePath) -> usize {
        lock(&self.paths)
            .get(path)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl StateReader for SimulatedTelemetry {
    async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>> {
        Ok(lock(&self.paths)
            .get(path)
            .and_then(|sender| sender.borrow().clone()))
    }
}

#[async_trait]
impl StateSubscription for SimulatedTelemetry {
    async fn subscribe(&self, path: &StatePath) -> CollaboratorResult<StateUpdates> {
        let receiver = lock(&self.paths)
            .entry(path.clone())
            .or_insert_with(|| watch::Sender::new(None))
            .subscribe();

        let updates = stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let value = receiver.borrow_and_update().clone();
            Some((Ok(value), (receiver, false)))
        });
        Ok(updates.boxed())
    }
}

/// Device that accepts configuration and serves it back as state.
#[derive(Default)]
pub struct SimulatedDevice {
    reject_reason: Option<String>,
    applied: Mutex<Vec<DeviceConfig>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that refuses every configuration with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            reject_reason: Some(reason.into()),
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn applied_configs(&self) -> Vec<DeviceConfig> {
        lock(&self.applied).clone()
    }
}

#[async_trait]
impl StateReader for SimulatedDevice {
    /// Reads the last applied configuration as a JSON document.
    async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>> {
        let applied = lock(&self.applied);
        let Some(config) = applied.last() else {
            return Ok(None);
        };
        let document = serde_json::to_value(config)?;
        let pointer = format!("/{}", path.as_str());
        Ok(document.pointer(&pointer).cloned())
    }
}

#[async_trait]
impl DeviceManagement for SimulatedDevice {
    async fn apply_config(&self, config: &DeviceConfig) -> CollaboratorResult<()> {
        if let Some(reason) = &self.reject_reason {
            return Err(CollaboratorError::Rejected {
                reason: reason.clone(),
            });
        }
        lock(&self.applied).push(config.clone());
        Ok(())
    }
}

/// Knobs of the simulated traffic generator.
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Packets every flow transmits during a traffic run.
    pub packets_per_flow: u64,
    /// Packets dropped per flow name.
    pub flow_loss: HashMap<String, u64>,
    /// Emulated ports whose neighbors never resolve.
    pub unresolved_ports: HashSet<String>,
    /// Time between protocol start and neighbor resolution.
    pub resolution_delay: Duration,
    /// Reject any pushed topology with this reason.
    pub reject_topology: Option<String>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            packets_per_flow: 500,
            flow_loss: HashMap::new(),
            unresolved_ports: HashSet::new(),
            resolution_delay: Duration::from_secs(2),
            reject_topology: None,
        }
    }
}

impl SimulationProfile {
    pub fn with_loss(mut self, flow: &str, packets: u64) -> Self {
        self.flow_loss.insert(flow.to_string(), packets);
        self
    }

    pub fn with_unresolved_port(mut self, port: &str) -> Self {
        self.unresolved_ports.insert(port.to_string());
        self
    }
}

/// Control calls received by the simulated generator, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficCall {
    PushTopology,
    StartProtocols,
    StartTraffic,
    StopTraffic,
}

#[derive(Default)]
struct GeneratorState {
    topology: Option<Topology>,
    protocols_started: bool,
    traffic_running: bool,
    flows: HashMap<String, FlowCounters>,
    ports: HashMap<String, PortCounters>,
    calls: Vec<TrafficCall>,
}

pub struct SimulatedTrafficGenerator {
    telemetry: Arc<SimulatedTelemetry>,
    profile: SimulationProfile,
    state: Mutex<GeneratorState>,
}

impl SimulatedTrafficGenerator {
    pub fn new(telemetry: Arc<SimulatedTelemetry>, profile: SimulationProfile) -> Self {
        Self {
            telemetry,
            profile,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    pub fn calls(&self) -> Vec<TrafficCall> {
        lock(&self.state).calls.clone()
    }

    fn not_ready(what: &str) -> CollaboratorError {
        CollaboratorError::Rejected {
            reason: what.to_string(),
        }
    }
}

#[async_trait]
impl TrafficGenerator for SimulatedTrafficGenerator {
    async fn push_topology(&self, topology: &Topology) -> CollaboratorResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(TrafficCall::PushTopology);
        if let Some(reason) = &self.profile.reject_topology {
            return Err(CollaboratorError::Rejected {
                reason: reason.clone(),
            });
        }
        topology
            .check()
            .map_err(|reason| CollaboratorError::Rejected { reason })?;

        state.flows = topology
            .flows
            .iter()
            .map(|f| (f.name.clone(), FlowCounters::default()))
            .collect();
        state.ports = topology
            .devices
            .iter()
            .map(|d| (d.port.clone(), PortCounters::default()))
            .collect();
        state.topology = Some(topology.clone());
        Ok(())
    }

    async fn start_protocols(&self) -> CollaboratorResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(TrafficCall::StartProtocols);
        let topology = state
            .topology
            .clone()
            .ok_or_else(|| Self::not_ready("no topology pushed"))?;
        state.protocols_started = true;

        for device in topology.devices {
            if self.profile.unresolved_ports.contains(&device.port) {
                debug!("Simulating unresolved neighbors on {}", device.port);
                continue;
            }
            let telemetry = self.telemetry.clone();
            let delay = self.profile.resolution_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mac = Some(Value::from(DUT_MAC));
                telemetry.publish(
                    &StatePath::ipv4_neighbor_link_layer(&device.ethernet_name),
                    mac.clone(),
                );
                telemetry.publish(
                    &StatePath::ipv6_neighbor_link_layer(&device.ethernet_name),
                    mac,
                );
            });
        }
        Ok(())
    }

    async fn start_traffic(&self) -> CollaboratorResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(TrafficCall::StartTraffic);
        if !state.protocols_started {
            return Err(Self::not_ready("protocols not started"));
        }
        state.traffic_running = true;
        Ok(())
    }

    async fn stop_traffic(&self) -> CollaboratorResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(TrafficCall::StopTraffic);
        if !state.traffic_running {
            return Err(Self::not_ready("traffic not running"));
        }
        state.traffic_running = false;

        let Some(topology) = state.topology.clone() else {
            return Err(Self::not_ready("no topology pushed"));
        };
        let port_of = |endpoint: &str| {
            topology
                .devices
                .iter()
                .find(|d| d.endpoint_names().contains(&endpoint))
                .map(|d| d.port.clone())
        };

        for flow in &topology.flows {
            let tx = self.profile.packets_per_flow;
            let lost = self.profile.flow_loss.get(&flow.name).copied().unwrap_or(0);
            let rx = tx.saturating_sub(lost);
            state
                .flows
                .insert(flow.name.clone(), FlowCounters::new(tx, rx));

            for (names, is_tx) in [(&flow.tx_names, true), (&flow.rx_names, false)] {
                for port in names.iter().filter_map(|n| port_of(n.as_str())) {
                    let counters = state.ports.entry(port).or_default();
                    if is_tx {
                        counters.tx_frames += tx;
                    } else {
                        counters.rx_frames += rx;
                    }
                }
            }
        }
        info!("Simulated traffic stopped for {} flow(s)", topology.flows.len());
        Ok(())
    }

    async fn flow_counters(&self, flow: &str) -> CollaboratorResult<FlowCounters> {
        lock(&self.state)
            .flows
            .get(flow)
            .copied()
            .ok_or_else(|| CollaboratorError::NotFound {
                what: format!("flow '{}'", flow),
            })
    }

    async fn port_counters(&self, port: &str) -> CollaboratorResult<PortCounters> {
        lock(&self.state)
            .ports
            .get(port)
            .copied()
            .ok_or_else(|| CollaboratorError::NotFound {
                what: format!("port '{}'", port),
            })
    }
}

/// A complete simulated test bed.
pub struct SimulatedLab {
    pub device: Arc<SimulatedDevice>,
    pub telemetry: Arc<SimulatedTelemetry>,
    pub traffic: Arc<SimulatedTrafficGenerator>,
}

impl SimulatedLab {
    pub fn new(profile: SimulationProfile) -> Self {
        Self::with_device(SimulatedDevice::new(), profile)
    }

    pub fn with_device(device: SimulatedDevice, profile: SimulationProfile) -> Self {
        let telemetry = Arc::new(SimulatedTelemetry::new());
        let traffic = Arc::new(SimulatedTrafficGenerator::new(telemetry.clone(), profile));
        Self {
            device: Arc::new(device),
            telemetry,
            traffic,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            device: self.device.clone(),
            telemetry: self.telemetry.clone(),
            traffic: self.traffic.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidefaults_shared::ScenarioDefinition;

    #[tokio::test]
    async fn test_telemetry_stream_starts_with_current_value() {
        let telemetry = SimulatedTelemetry::new();
        let path = StatePath::new("interfaces/port1.Eth/ipv4-neighbors/*/link-layer-address");
        telemetry.publish(&path, Some(Value::from(DUT_MAC)));

        let mut updates = telemetry.subscribe(&path).await.unwrap();
        assert_eq!(telemetry.subscriber_count(&path), 1);
        assert_eq!(
            updates.next().await.unwrap().unwrap(),
            Some(Value::from(DUT_MAC))
        );

        telemetry.publish(&path, None);
        assert_eq!(updates.next().await.unwrap().unwrap(), None);

        drop(updates);
        assert_eq!(telemetry.subscriber_count(&path), 0);
    }

    #[tokio::test]
    async fn test_device_serves_applied_config() {
        let device = SimulatedDevice::new();
        let path = StatePath::new("network-instances/DEFAULT/type");
        assert_eq!(device.get_state(&path).await.unwrap(), None);

        let mut config = DeviceConfig::default();
        config
            .add_network_instance(nidefaults_shared::RoutingDomainConfig::default_instance(
                "DEFAULT",
            ))
            .unwrap();
        device.apply_config(&config).await.unwrap();

        assert_eq!(
            device.get_state(&path).await.unwrap(),
            Some(Value::from("DEFAULT_INSTANCE"))
        );
    }

    #[tokio::test]
    async fn test_rejecting_device() {
        let device = SimulatedDevice::rejecting("unsupported leaf");
        let err = device
            .apply_config(&DeviceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected { .. }));
        assert!(device.applied_configs().is_empty());
    }

    #[tokio::test]
    async fn test_generator_requires_ordering() {
        let telemetry = Arc::new(SimulatedTelemetry::new());
        let generator = SimulatedTrafficGenerator::new(telemetry, SimulationProfile::default());

        assert!(generator.start_protocols().await.is_err());
        assert!(generator.start_traffic().await.is_err());
        assert!(generator.stop_traffic().await.is_err());
        assert!(generator.flow_counters("ipv4").await.is_err());
    }

    #[tokio::test]
    async fn test_generator_rejects_duplicate_flows() {
        let scenario = ScenarioDefinition::default_address_families();
        let src = &scenario.links[0];
        let dst = &scenario.links[1];
        let mut topology = Topology {
            devices: vec![
                src.ate.to_emulated_device(&src.dut),
                dst.ate.to_emulated_device(&dst.dut),
            ],
            flows: crate::traffic::default_flows(&src.ate, &dst.ate),
        };
        topology.flows.push(topology.flows[0].clone());

        let generator = SimulatedTrafficGenerator::new(
            Arc::new(SimulatedTelemetry::new()),
            SimulationProfile::default(),
        );
        let err = generator.push_topology(&topology).await.unwrap_err();
        assert!(err.to_string().contains("duplicate flow name 'ipv4'"));
    }
}
