//! Scenario execution.
//!
//! Runs one conformance scenario end to end: configure the DUT, bring up the
//! emulated endpoints, wait for neighbor resolution, send traffic and judge
//! loss. Each step blocks until done and any error aborts the run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use nidefaults_shared::errors::{CollaboratorError, ConformanceError, ConformanceResult};
use nidefaults_shared::scenario::TimingOverrides;
use nidefaults_shared::{ScenarioDefinition, Topology, Validate, Verdict};

use crate::collaborators::Collaborators;
use crate::convergence::{ConvergenceWaiter, NeighborWatch};
use crate::device::{DEFAULT_NETWORK_INSTANCE, DeviceConfigBuilder};
use crate::traffic::{TrafficSessionController, default_flows};
use crate::verify::LossVerifier;

/// Harness timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    /// Pause between protocol start and the convergence wait.
    pub protocol_grace: Duration,
    /// Upper bound on neighbor resolution.
    pub convergence_deadline: Duration,
    /// How long traffic runs.
    pub settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            protocol_grace: Duration::from_secs(10),
            convergence_deadline: Duration::from_secs(60),
            settle: Duration::from_secs(15),
        }
    }
}

impl Timing {
    pub fn with_overrides(self, overrides: &TimingOverrides) -> Self {
        Self {
            protocol_grace: overrides.protocol_grace.unwrap_or(self.protocol_grace),
            convergence_deadline: overrides
                .convergence_deadline
                .unwrap_or(self.convergence_deadline),
            settle: overrides.settle.unwrap_or(self.settle),
        }
    }
}

/// Outcome of a completed scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub network_instance: String,
    pub converged_endpoints: Vec<String>,
    pub timing: Timing,
    pub verdicts: BTreeMap<String, Verdict>,
}

impl ScenarioReport {
    /// True when there is at least one flow and every flow passed.
    pub fn passed(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.values().all(Verdict::is_pass)
    }

    pub fn failed_flows(&self) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter(|(_, v)| !v.is_pass())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub struct ScenarioRunner {
    collaborators: Collaborators,
    timing: Timing,
    network_instance: String,
}

impl ScenarioRunner {
    pub fn new(collaborators: Collaborators, timing: Timing) -> Self {
        Self {
            collaborators,
            timing,
            network_instance: DEFAULT_NETWORK_INSTANCE.to_string(),
        }
    }

    /// Network instance used when the scenario does not name one.
    pub fn with_network_instance(mut self, name: impl Into<String>) -> Self {
        self.network_instance = name.into();
        self
    }

    fn topology(scenario: &ScenarioDefinition) -> ConformanceResult<Topology> {
        let endpoint = |port: &str| {
            scenario
                .link_for_ate(port)
                .map(|link| &link.ate)
                .ok_or_else(|| ConformanceError::config(port, "flow endpoint has no link"))
        };
        let flows = default_flows(
            endpoint(&scenario.flow_source)?,
            endpoint(&scenario.flow_destination)?,
        );

        Ok(Topology {
            devices: scenario
                .links
                .iter()
                .map(|link| link.ate.to_emulated_device(&link.dut))
                .collect(),
            flows,
        })
    }

    fn neighbor_watches(scenario: &ScenarioDefinition) -> Vec<NeighborWatch> {
        let mut watches = Vec::new();
        for port in scenario.ate_ports() {
            watches.push(NeighborWatch::ipv4(&port));
            if scenario.watch_ipv6_neighbors {
                watches.push(NeighborWatch::ipv6(&port));
            }
        }
        watches
    }

    #[instrument(skip_all, fields(scenario_id = %scenario.id))]
    pub async fn run(&self, scenario: &ScenarioDefinition) -> ConformanceResult<ScenarioReport> {
        scenario
            .validate()
            .map_err(|e| ConformanceError::config(scenario.id.as_str(), e.to_string()))?;

        let timing = self.timing.with_overrides(&scenario.timing);
        let network_instance = scenario
            .network_instance
            .clone()
            .unwrap_or_else(|| self.network_instance.clone());
        info!(
            "Running scenario '{}' in network instance '{}'",
            scenario.id, network_instance
        );

        // DUT configuration
        let ports: Vec<_> = scenario
            .links
            .iter()
            .map(|link| (link.dut_interface.clone(), link.dut.clone()))
            .collect();
        let config = DeviceConfigBuilder::new(&network_instance).build(&ports)?;
        match config.to_json_pretty() {
            Ok(json) => debug!("Device configuration:\n{}", json),
            Err(e) => warn!("Could not render device configuration: {}", e),
        }

        self.collaborators
            .device
            .apply_config(&config)
            .await
            .map_err(|e| match e {
                CollaboratorError::Rejected { reason } => ConformanceError::ConfigRejected { reason },
                other => ConformanceError::collaborator("apply device configuration", other),
            })?;
        info!("Applied configuration on {} DUT port(s)", ports.len());

        // Emulated endpoints
        let mut controller = TrafficSessionController::new(self.collaborators.traffic.clone());
        controller.push_topology(Self::topology(scenario)?).await?;
        controller.start_protocols().await?;

        info!("Waiting {:?} for protocols to come up", timing.protocol_grace);
        tokio::time::sleep(timing.protocol_grace).await;

        let converged = ConvergenceWaiter::new(self.collaborators.telemetry.clone())
            .await_all(&Self::neighbor_watches(scenario), timing.convergence_deadline)
            .await?;
        let converged_endpoints = converged.endpoints().to_vec();
        controller.mark_converged(converged)?;

        // Traffic
        controller.run_traffic(timing.settle).await?;

        let (flows, ports) = match controller.topology() {
            Some(topology) => (topology.flow_names(), topology.port_names()),
            None => (Vec::new(), Vec::new()),
        };
        let verifier = LossVerifier::new(self.collaborators.traffic.clone());
        verifier.log_flow_metrics(&flows).await;
        verifier.log_port_metrics(&ports).await;
        let verdicts = verifier.verify(&flows).await?;
        controller.finish()?;

        let report = ScenarioReport {
            scenario_id: scenario.id.clone(),
            network_instance,
            converged_endpoints,
            timing,
            verdicts,
        };
        if report.passed() {
            info!("Scenario '{}' passed", report.scenario_id);
        } else {
            warn!(
                "Scenario '{}' failed on flow(s): {}",
                report.scenario_id,
                report.failed_flows().join(", ")
            );
        }
        Ok(report)
    }
}
