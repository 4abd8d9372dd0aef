//! Traffic session controller.
//!
//! Drives the generator through `Idle -> TopologyPushed -> ProtocolsStarted
//! -> TrafficRunning -> TrafficStopped -> Idle`. Traffic can only start once
//! the convergence waiter has handed over its [`Converged`] proof.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use nidefaults_shared::errors::{
    CollaboratorError, CollaboratorResult, ConformanceError, ConformanceResult,
};
use nidefaults_shared::{AddressFamily, EndpointAttributes, FlowDefinition, Topology};

use crate::collaborators::TrafficGenerator;
use crate::convergence::Converged;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    TopologyPushed,
    ProtocolsStarted,
    TrafficRunning,
    TrafficStopped,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::TopologyPushed => "topology-pushed",
            SessionState::ProtocolsStarted => "protocols-started",
            SessionState::TrafficRunning => "traffic-running",
            SessionState::TrafficStopped => "traffic-stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn flow(
    family: AddressFamily,
    src: &EndpointAttributes,
    dst: &EndpointAttributes,
) -> FlowDefinition {
    let (src_ip, dst_ip) = match family {
        AddressFamily::V4 => (IpAddr::V4(src.ipv4()), IpAddr::V4(dst.ipv4())),
        AddressFamily::V6 => (IpAddr::V6(src.ipv6()), IpAddr::V6(dst.ipv6())),
    };
    FlowDefinition {
        name: match family {
            AddressFamily::V4 => "ipv4".to_string(),
            AddressFamily::V6 => "ipv6".to_string(),
        },
        family,
        tx_names: vec![format!("{}.{}", src.name(), family)],
        rx_names: vec![format!("{}.{}", dst.name(), family)],
        src_mac: src.mac(),
        src_ip,
        dst_ip,
        metrics_enabled: true,
    }
}

/// The `ipv4` and `ipv6` flows from `src` to `dst`.
pub fn default_flows(src: &EndpointAttributes, dst: &EndpointAttributes) -> Vec<FlowDefinition> {
    vec![
        flow(AddressFamily::V4, src, dst),
        flow(AddressFamily::V6, src, dst),
    ]
}

pub struct TrafficSessionController {
    generator: Arc<dyn TrafficGenerator>,
    state: SessionState,
    topology: Option<Topology>,
    converged: Option<Converged>,
}

impl TrafficSessionController {
    pub fn new(generator: Arc<dyn TrafficGenerator>) -> Self {
        Self {
            generator,
            state: SessionState::Idle,
            topology: None,
            converged: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> ConformanceResult<()> {
        if self.state != expected {
            return Err(ConformanceError::InvalidSessionState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Record a collaborator failure: the session becomes `Failed`.
    fn settle_call(
        &mut self,
        operation: &'static str,
        result: CollaboratorResult<()>,
    ) -> ConformanceResult<()> {
        result.map_err(|e| {
            warn!("Traffic generator {} failed: {}", operation, e);
            self.state = SessionState::Failed;
            ConformanceError::collaborator(operation, e)
        })
    }

    /// Validate locally, then submit the topology.
    pub async fn push_topology(&mut self, topology: Topology) -> ConformanceResult<()> {
        self.expect_state("push topology", SessionState::Idle)?;
        topology
            .check()
            .map_err(|reason| ConformanceError::TopologyPush { reason })?;

        match self.generator.push_topology(&topology).await {
            Ok(()) => {}
            Err(CollaboratorError::Rejected { reason }) => {
                self.state = SessionState::Failed;
                return Err(ConformanceError::TopologyPush { reason });
            }
            Err(e) => return self.settle_call("push topology", Err(e)),
        }

        info!(
            "Pushed topology with ports [{}] and flows [{}]",
            topology.port_names().join(", "),
            topology.flow_names().join(", ")
        );
        self.topology = Some(topology);
        self.state = SessionState::TopologyPushed;
        Ok(())
    }

    pub async fn start_protocols(&mut self) -> ConformanceResult<()> {
        self.expect_state("start protocols", SessionState::TopologyPushed)?;
        let result = self.generator.start_protocols().await;
        self.settle_call("start protocols", result)?;
        info!("Protocols started");
        self.state = SessionState::ProtocolsStarted;
        Ok(())
    }

    pub fn mark_converged(&mut self, proof: Converged) -> ConformanceResult<()> {
        self.expect_state("mark convergence", SessionState::ProtocolsStarted)?;
        info!("Convergence confirmed on [{}]", proof.endpoints().join(", "));
        self.converged = Some(proof);
        Ok(())
    }

    /// Start traffic. Refused without a convergence proof; the generator is
    /// not contacted in that case.
    pub async fn start_traffic(&mut self) -> ConformanceResult<()> {
        match self.state {
            SessionState::Idle | SessionState::TopologyPushed => {
                return Err(ConformanceError::PrematureTrafficStart {
                    state: self.state.to_string(),
                });
            }
            SessionState::ProtocolsStarted if self.converged.is_none() => {
                return Err(ConformanceError::PrematureTrafficStart {
                    state: self.state.to_string(),
                });
            }
            SessionState::ProtocolsStarted => {}
            _ => self.expect_state("start traffic", SessionState::ProtocolsStarted)?,
        }

        let result = self.generator.start_traffic().await;
        self.settle_call("start traffic", result)?;
        info!("Traffic started");
        self.state = SessionState::TrafficRunning;
        Ok(())
    }

    pub async fn stop_traffic(&mut self) -> ConformanceResult<()> {
        self.expect_state("stop traffic", SessionState::TrafficRunning)?;
        let result = self.generator.stop_traffic().await;
        self.settle_call("stop traffic", result)?;
        info!("Traffic stopped");
        self.state = SessionState::TrafficStopped;
        Ok(())
    }

    /// Start traffic, let it run for `settle`, stop it.
    #[instrument(skip(self))]
    pub async fn run_traffic(&mut self, settle: Duration) -> ConformanceResult<()> {
        self.start_traffic().await?;
        info!("Running traffic for {:?}", settle);
        tokio::time::sleep(settle).await;
        self.stop_traffic().await
    }

    /// Close the session after traffic stopped.
    pub fn finish(&mut self) -> ConformanceResult<()> {
        self.expect_state("finish", SessionState::TrafficStopped)?;
        self.topology = None;
        self.converged = None;
        self.state = SessionState::Idle;
        Ok(())
    }
}
