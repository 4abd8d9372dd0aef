use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use zenoh::Session;

use nidefaults_shared::errors::{CollaboratorError, CollaboratorResult};
use nidefaults_shared::protocol::{DeviceRequest, DeviceResponse};
use nidefaults_shared::{DeviceConfig, topics};

use super::query;
use super::telemetry::ZenohStateReader;
use crate::collaborators::{DeviceManagement, StatePath, StateReader};

/// Device management agent reached over Zenoh.
pub struct ZenohDevice {
    session: Arc<Session>,
    agent: String,
    timeout: Duration,
    state: ZenohStateReader,
}

impl ZenohDevice {
    pub fn new(session: Arc<Session>, agent: &str, timeout: Duration) -> Self {
        Self {
            state: ZenohStateReader::new(session.clone(), agent, timeout),
            session,
            agent: agent.to_string(),
            timeout,
        }
    }
}

fn apply_outcome(agent: &str, response: DeviceResponse) -> CollaboratorResult<()> {
    match response {
        DeviceResponse::Applied => Ok(()),
        DeviceResponse::Rejected { reason } => Err(CollaboratorError::Rejected { reason }),
        DeviceResponse::Error { message } => Err(CollaboratorError::transport(format!(
            "device agent '{}' reported: {}",
            agent, message
        ))),
    }
}

#[async_trait]
impl StateReader for ZenohDevice {
    async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>> {
        self.state.get_state(path).await
    }
}

#[async_trait]
impl DeviceManagement for ZenohDevice {
    async fn apply_config(&self, config: &DeviceConfig) -> CollaboratorResult<()> {
        let request = DeviceRequest::ApplyConfig {
            config: config.clone(),
        };
        let response: DeviceResponse = query(
            &self.session,
            &topics::device_query_service(&self.agent),
            &request,
            self.timeout,
        )
        .await?;
        apply_outcome(&self.agent, response)?;
        info!("Device agent '{}' applied configuration", self.agent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_outcome() {
        assert!(apply_outcome("dut", DeviceResponse::Applied).is_ok());

        let rejected = apply_outcome(
            "dut",
            DeviceResponse::Rejected {
                reason: "unknown leaf".to_string(),
            },
        );
        assert!(matches!(rejected, Err(CollaboratorError::Rejected { ref reason }) if reason == "unknown leaf"));

        let error = apply_outcome(
            "dut",
            DeviceResponse::Error {
                message: "gNMI session lost".to_string(),
            },
        )
        .unwrap_err();
        assert!(error.to_string().contains("device agent 'dut' reported: gNMI session lost"));
    }
}
