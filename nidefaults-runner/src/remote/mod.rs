//! Zenoh-backed collaborators.
//!
//! Device and traffic agents answer JSON queries on their
//! [`topics`](nidefaults_shared::topics) key expressions and publish state
//! updates under `nidefaults/{agent}/state/**`. Neighbor state of the
//! emulated ports belongs to the traffic agent.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::key_expr::OwnedKeyExpr;

use nidefaults_shared::errors::{CollaboratorError, CollaboratorResult};

use crate::collaborators::{Collaborators, PollingSubscription, StateSubscription};

pub mod device;
pub mod telemetry;
pub mod traffic;

pub use device::ZenohDevice;
pub use telemetry::{ZenohStateReader, ZenohStateSubscription};
pub use traffic::ZenohTrafficGenerator;

/// Default bound on a single agent query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Send `request` to `topic` and decode the first successful reply.
pub(crate) async fn query<Req, Resp>(
    session: &Session,
    topic: &OwnedKeyExpr,
    request: &Req,
    timeout: Duration,
) -> CollaboratorResult<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_string(request)?;
    debug!("Query {}: {}", topic, payload);

    let replies = session
        .get(topic)
        .payload(payload)
        .timeout(timeout)
        .await
        .map_err(|e| CollaboratorError::transport(format!("query to {} failed: {}", topic, e)))?;

    while let Ok(reply) = replies.recv_async().await {
        match reply.into_result() {
            Ok(sample) => {
                let payload_bytes = sample.payload().to_bytes();
                return Ok(serde_json::from_slice::<Resp>(&payload_bytes)?);
            }
            Err(e) => {
                warn!("Error reply from {}: {:?}", topic, e);
            }
        }
    }

    Err(CollaboratorError::transport(format!(
        "no reply from {} within {:?}",
        topic, timeout
    )))
}

/// Agent names used for topic routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNames {
    pub device: String,
    pub traffic: String,
}

/// How state is observed on a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    /// Subscribe to pushed state updates.
    Push,
    /// Poll point reads at a fixed interval.
    Poll(Duration),
}

/// Collaborators reached over an open Zenoh session.
pub fn remote_collaborators(
    session: Arc<Session>,
    agents: &AgentNames,
    query_timeout: Duration,
    telemetry: TelemetryMode,
) -> Collaborators {
    let device = Arc::new(ZenohDevice::new(
        session.clone(),
        &agents.device,
        query_timeout,
    ));

    // Convergence watches the emulated side of each link.
    let peer_state = Arc::new(ZenohStateReader::new(
        session.clone(),
        &agents.traffic,
        query_timeout,
    ));
    info!("Watching neighbor state on agent '{}'", peer_state.agent());
    let telemetry: Arc<dyn StateSubscription> = match telemetry {
        TelemetryMode::Push => Arc::new(ZenohStateSubscription::new(
            session.clone(),
            &agents.traffic,
            peer_state,
        )),
        TelemetryMode::Poll(interval) => Arc::new(PollingSubscription::new(peer_state, interval)),
    };

    Collaborators {
        device,
        telemetry,
        traffic: Arc::new(ZenohTrafficGenerator::new(
            session,
            &agents.traffic,
            query_timeout,
        )),
    }
}
