//! Boundaries with the external collaborators.
//!
//! The runner never talks to a device or traffic generator directly. It
//! drives these traits, which are implemented by the Zenoh clients in
//! [`crate::remote`] and by the in-memory doubles in [`crate::simulated`].

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nidefaults_shared::errors::CollaboratorResult;
use nidefaults_shared::{DeviceConfig, FlowCounters, PortCounters, Topology};

/// Slash-separated operational state path.
///
/// A `*` segment matches any single key (e.g. any neighbor address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatePath(String);

impl StatePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    /// Link-layer address of any IPv4 neighbor learned on `interface`.
    pub fn ipv4_neighbor_link_layer(interface: &str) -> Self {
        Self::new(format!(
            "interfaces/{}/ipv4-neighbors/*/link-layer-address",
            interface
        ))
    }

    /// Link-layer address of any IPv6 neighbor learned on `interface`.
    pub fn ipv6_neighbor_link_layer(interface: &str) -> Self {
        Self::new(format!(
            "interfaces/{}/ipv6-neighbors/*/link-layer-address",
            interface
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values observed on a subscribed path; `None` means not present.
///
/// A collaborator failure is delivered as an `Err` item and ends the wait.
pub type StateUpdates = BoxStream<'static, CollaboratorResult<Option<Value>>>;

/// Point reads of operational state.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Current value at `path`, `None` when the path holds nothing.
    async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>>;
}

/// Applies configuration to the device under test.
#[async_trait]
pub trait DeviceManagement: StateReader {
    /// Apply a configuration tree. A refusal is reported as
    /// [`CollaboratorError::Rejected`](nidefaults_shared::errors::CollaboratorError::Rejected).
    async fn apply_config(&self, config: &DeviceConfig) -> CollaboratorResult<()>;
}

/// Streaming access to operational state.
///
/// The first item is the value at subscription time, followed by every
/// change. Dropping the stream ends the subscription.
#[async_trait]
pub trait StateSubscription: Send + Sync {
    async fn subscribe(&self, path: &StatePath) -> CollaboratorResult<StateUpdates>;
}

/// Control plane of the traffic generator. Start/stop calls return once the
/// generator acknowledged them.
#[async_trait]
pub trait TrafficGenerator: Send + Sync {
    async fn push_topology(&self, topology: &Topology) -> CollaboratorResult<()>;
    async fn start_protocols(&self) -> CollaboratorResult<()>;
    async fn start_traffic(&self) -> CollaboratorResult<()>;
    async fn stop_traffic(&self) -> CollaboratorResult<()>;
    async fn flow_counters(&self, flow: &str) -> CollaboratorResult<FlowCounters>;
    async fn port_counters(&self, port: &str) -> CollaboratorResult<PortCounters>;
}

/// Subscription built from repeated point reads.
///
/// A failed read is yielded as is; it is never retried.
pub struct PollingSubscription {
    reader: Arc<dyn StateReader>,
    interval: Duration,
}

impl PollingSubscription {
    pub fn new(reader: Arc<dyn StateReader>, interval: Duration) -> Self {
        Self { reader, interval }
    }
}

#[async_trait]
impl StateSubscription for PollingSubscription {
    async fn subscribe(&self, path: &StatePath) -> CollaboratorResult<StateUpdates> {
        let reader = self.reader.clone();
        let path = path.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let updates = stream::unfold(
            (reader, path, ticker),
            |(reader, path, mut ticker)| async move {
                ticker.tick().await;
                let value = reader.get_state(&path).await;
                if let Err(e) = &value {
                    tracing::warn!("Polling {} failed: {}", path, e);
                }
                Some((value, (reader, path, ticker)))
            },
        );
        Ok(updates.boxed())
    }
}

/// Handles to every collaborator a scenario run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub device: Arc<dyn DeviceManagement>,
    pub telemetry: Arc<dyn StateSubscription>,
    pub traffic: Arc<dyn TrafficGenerator>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use nidefaults_shared::errors::CollaboratorError;

    struct CountingReader {
        reads: AtomicUsize,
        present_after: usize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StateReader for CountingReader {
        async fn get_state(&self, path: &StatePath) -> CollaboratorResult<Option<Value>> {
            self.seen.lock().unwrap().push(path.to_string());
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((n >= self.present_after).then(|| Value::from("02:00:00:00:00:01")))
        }
    }

    #[test]
    fn test_state_path_normalization() {
        assert_eq!(StatePath::new("/a/b/").as_str(), "a/b");
        assert_eq!(
            StatePath::ipv4_neighbor_link_layer("port1.Eth").as_str(),
            "interfaces/port1.Eth/ipv4-neighbors/*/link-layer-address"
        );
        assert_eq!(
            StatePath::ipv6_neighbor_link_layer("port2.Eth").to_string(),
            "interfaces/port2.Eth/ipv6-neighbors/*/link-layer-address"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_subscription_reads_until_present() {
        let reader = Arc::new(CountingReader {
            reads: AtomicUsize::new(0),
            present_after: 3,
            seen: Mutex::new(Vec::new()),
        });
        let subscription = PollingSubscription::new(reader.clone(), Duration::from_secs(1));
        let path = StatePath::new("interfaces/port1.Eth/ipv4-neighbors/*/link-layer-address");

        let start = tokio::time::Instant::now();
        let mut updates = subscription.subscribe(&path).await.unwrap();
        assert!(matches!(updates.next().await, Some(Ok(None))));
        assert!(matches!(updates.next().await, Some(Ok(None))));
        assert!(matches!(updates.next().await, Some(Ok(Some(_)))));

        // First tick fires immediately, then once per interval.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(reader.seen.lock().unwrap().len(), 3);
    }

    struct UnreachableReader;

    #[async_trait]
    impl StateReader for UnreachableReader {
        async fn get_state(&self, _path: &StatePath) -> CollaboratorResult<Option<Value>> {
            Err(CollaboratorError::transport("no reply from nidefaults/ate/query/state"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_subscription_yields_read_errors() {
        let subscription = PollingSubscription::new(Arc::new(UnreachableReader), Duration::from_secs(1));
        let path = StatePath::ipv4_neighbor_link_layer("port1.Eth");

        let mut updates = subscription.subscribe(&path).await.unwrap();
        match updates.next().await {
            Some(Err(CollaboratorError::Transport { message })) => {
                assert!(message.contains("no reply"));
            }
            other => panic!("unexpected item: {:?}", other.map(|r| r.map_err(|e| e.to_string()))),
        }
    }
}
