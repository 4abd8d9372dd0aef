use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use zenoh::Session;

use nidefaults_shared::errors::{CollaboratorError, CollaboratorResult};
use nidefaults_shared::protocol::{TrafficRequest, TrafficResponse};
use nidefaults_shared::{FlowCounters, PortCounters, Topology, topics};

use super::query;
use crate::collaborators::TrafficGenerator;

/// Traffic generator agent reached over Zenoh.
pub struct ZenohTrafficGenerator {
    session: Arc<Session>,
    agent: String,
    timeout: Duration,
}

fn unexpected(agent: &str, response: TrafficResponse) -> CollaboratorError {
    match response {
        TrafficResponse::Rejected { reason } => CollaboratorError::Rejected { reason },
        TrafficResponse::NotFound { what } => CollaboratorError::NotFound { what },
        TrafficResponse::Error { message } => CollaboratorError::transport(format!(
            "traffic agent '{}' reported: {}",
            agent, message
        )),
        other => CollaboratorError::UnexpectedResponse {
            message: format!("{:?}", other),
        },
    }
}

impl ZenohTrafficGenerator {
    pub fn new(session: Arc<Session>, agent: &str, timeout: Duration) -> Self {
        Self {
            session,
            agent: agent.to_string(),
            timeout,
        }
    }

    async fn request(&self, request: TrafficRequest) -> CollaboratorResult<TrafficResponse> {
        query(
            &self.session,
            &topics::traffic_query_service(&self.agent),
            &request,
            self.timeout,
        )
        .await
    }

    async fn acknowledged(&self, request: TrafficRequest) -> CollaboratorResult<()> {
        match self.request(request).await? {
            TrafficResponse::Ack => Ok(()),
            other => Err(unexpected(&self.agent, other)),
        }
    }
}

#[async_trait]
impl TrafficGenerator for ZenohTrafficGenerator {
    async fn push_topology(&self, topology: &Topology) -> CollaboratorResult<()> {
        self.acknowledged(TrafficRequest::PushTopology {
            topology: topology.clone(),
        })
        .await
    }

    async fn start_protocols(&self) -> CollaboratorResult<()> {
        self.acknowledged(TrafficRequest::StartProtocols).await
    }

    async fn start_traffic(&self) -> CollaboratorResult<()> {
        self.acknowledged(TrafficRequest::StartTraffic).await
    }

    async fn stop_traffic(&self) -> CollaboratorResult<()> {
        self.acknowledged(TrafficRequest::StopTraffic).await
    }

    async fn flow_counters(&self, flow: &str) -> CollaboratorResult<FlowCounters> {
        match self
            .request(TrafficRequest::FlowCounters {
                flow: flow.to_string(),
            })
            .await?
        {
            TrafficResponse::FlowCounters { counters } => Ok(counters),
            other => Err(unexpected(&self.agent, other)),
        }
    }

    async fn port_counters(&self, port: &str) -> CollaboratorResult<PortCounters> {
        match self
            .request(TrafficRequest::PortCounters {
                port: port.to_string(),
            })
            .await?
        {
            TrafficResponse::PortCounters { counters } => Ok(counters),
            other => Err(unexpected(&self.agent, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_maps_agent_errors() {
        assert!(matches!(
            unexpected(
                "ate",
                TrafficResponse::Rejected {
                    reason: "bad flow".to_string()
                }
            ),
            CollaboratorError::Rejected { .. }
        ));
        assert!(matches!(
            unexpected(
                "ate",
                TrafficResponse::NotFound {
                    what: "flow 'ipv6'".to_string()
                }
            ),
            CollaboratorError::NotFound { .. }
        ));
        assert!(matches!(
            unexpected("ate", TrafficResponse::Ack),
            CollaboratorError::UnexpectedResponse { .. }
        ));
    }
}
