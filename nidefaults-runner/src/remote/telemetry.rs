use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh_ext::{AdvancedSubscriberBuilderExt, HistoryConfig};

use nidefaults_shared::errors::{CollaboratorError, CollaboratorResult};
use nidefaults_shared::protocol::{StateRequest, StateResponse, StateUpdate};
use nidefaults_shared::topics;

use super::query;
use crate::collaborators::{StatePath, StateReader, StateSubscription, StateUpdates};

/// Point reads on `nidefaults/{agent}/query/state`.
pub struct ZenohStateReader {
    session: Arc<Session>,
    agent: String,
    timeout: Duration,
}

impl ZenohStateReader {
    pub fn new(session: Arc<Session>, agent: &str, timeout: Duration) -> Self {
        Self {
            session,
            agent: agent.to_string(),
            timeout,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }
}

fn state_outcome(agent: &str, response: StateResponse) -> CollaboratorResult<Option<Value>> {
    match response {
        StateResponse::Value { value } => Ok(value),
        StateResponse::Error { message } => Err(CollaboratorError::transport(format!(
            "agent '{}' reported: {}",
            agent, message
        ))),
    }
}

#[async_trait]
impl StateReader for ZenohStateReader {
    async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>> {
        let request = StateRequest {
            path: path.to_string(),
        };
        let response: StateResponse = query(
            &self.session,
            &topics::state_query_service(&self.agent),
            &request,
            self.timeout,
        )
        .await?;
        state_outcome(&self.agent, response)
    }
}

/// Push subscription to `nidefaults/{agent}/state/{path}`.
///
/// The first item comes from a point read; later items are the published
/// updates, including any the agent cached before the subscription started.
pub struct ZenohStateSubscription {
    session: Arc<Session>,
    agent: String,
    reader: Arc<dyn StateReader>,
}

impl ZenohStateSubscription {
    pub fn new(session: Arc<Session>, agent: &str, reader: Arc<dyn StateReader>) -> Self {
        Self {
            session,
            agent: agent.to_string(),
            reader,
        }
    }
}

/// Decode a state update sample; `None` if the payload is not an update.
fn decode_update(key_expr: &str, payload: &[u8]) -> Option<Option<Value>> {
    match serde_json::from_slice::<StateUpdate>(payload) {
        Ok(update) => Some(update.value),
        Err(e) => {
            let path = topics::extract_state_path(key_expr).unwrap_or_default();
            warn!("Ignoring malformed state update for '{}': {}", path, e);
            None
        }
    }
}

#[async_trait]
impl StateSubscription for ZenohStateSubscription {
    async fn subscribe(&self, path: &StatePath) -> CollaboratorResult<StateUpdates> {
        let key = topics::state_updates(&self.agent, path.as_str());
        let subscriber = self
            .session
            .declare_subscriber(key.as_str())
            .history(HistoryConfig::default().detect_late_publishers())
            .await
            .map_err(|e| {
                CollaboratorError::transport(format!("failed to subscribe to {}: {}", key, e))
            })?;
        info!("Subscribed to state updates with history: {}", key);

        let initial = self.reader.get_state(path).await;
        if let Err(e) = &initial {
            warn!("Initial read of {} failed: {}", path, e);
        }

        let updates = stream::unfold(subscriber, |subscriber| async move {
            loop {
                match subscriber.recv_async().await {
                    Ok(sample) => {
                        let payload_bytes = sample.payload().to_bytes();
                        if let Some(value) = decode_update(sample.key_expr().as_str(), &payload_bytes) {
                            return Some((Ok(value), subscriber));
                        }
                    }
                    Err(e) => {
                        debug!("State subscription closed: {}", e);
                        return None;
                    }
                }
            }
        });

        Ok(stream::once(async move { initial }).chain(updates).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_outcome() {
        let value = state_outcome(
            "ate",
            StateResponse::Value {
                value: Some(Value::from("02:1a:c0:00:02:00")),
            },
        )
        .unwrap();
        assert_eq!(value, Some(Value::from("02:1a:c0:00:02:00")));
        assert_eq!(
            state_outcome("ate", StateResponse::Value { value: None }).unwrap(),
            None
        );

        let error = state_outcome(
            "ate",
            StateResponse::Error {
                message: "no such port".to_string(),
            },
        )
        .unwrap_err();
        assert!(error.to_string().contains("agent 'ate' reported: no such port"));
    }

    #[test]
    fn test_decode_update() {
        let payload = serde_json::to_vec(&StateUpdate {
            path: "interfaces/port1.Eth/ipv4-neighbors/192.0.2.0/link-layer-address".to_string(),
            value: Some(Value::from("02:1a:c0:00:02:00")),
            timestamp: 1,
        })
        .unwrap();

        assert_eq!(
            decode_update("nidefaults/dut/state/interfaces/port1.Eth", &payload),
            Some(Some(Value::from("02:1a:c0:00:02:00")))
        );
        assert_eq!(decode_update("nidefaults/dut/state/x", b"not json"), None);
    }
}
