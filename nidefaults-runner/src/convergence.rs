//! Convergence waiter.
//!
//! Blocks until operational state satisfies a predicate or a deadline
//! passes. The deadline is a hard bound: the subscription is dropped (and
//! with it the underlying watcher) as soon as the wait returns.

use futures_util::StreamExt;
use futures_util::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use nidefaults_shared::AddressFamily;
use nidefaults_shared::errors::{CollaboratorError, ConformanceError, ConformanceResult};

use crate::collaborators::{StatePath, StateSubscription};

/// Predicate over an observed value; the argument is `None` when the path
/// holds nothing.
pub type Predicate = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Predicate held; carries the value that satisfied it.
    Satisfied(Option<Value>),
    TimedOut,
}

/// One endpoint whose neighbor state must resolve.
#[derive(Clone)]
pub struct NeighborWatch {
    pub endpoint: String,
    pub family: AddressFamily,
    pub path: StatePath,
    pub predicate: Predicate,
}

impl std::fmt::Debug for NeighborWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborWatch")
            .field("endpoint", &self.endpoint)
            .field("family", &self.family)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A resolved neighbor has a non-null link-layer address.
fn link_layer_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

impl NeighborWatch {
    /// Any IPv4 neighbor resolved on the Ethernet of emulated port `port`.
    pub fn ipv4(port: &str) -> Self {
        Self {
            endpoint: port.to_string(),
            family: AddressFamily::V4,
            path: StatePath::ipv4_neighbor_link_layer(&format!("{}.Eth", port)),
            predicate: Arc::new(link_layer_present),
        }
    }

    /// Any IPv6 neighbor resolved on the Ethernet of emulated port `port`.
    pub fn ipv6(port: &str) -> Self {
        Self {
            endpoint: port.to_string(),
            family: AddressFamily::V6,
            path: StatePath::ipv6_neighbor_link_layer(&format!("{}.Eth", port)),
            predicate: Arc::new(link_layer_present),
        }
    }
}

/// Proof that every watched endpoint converged.
///
/// Only [`ConvergenceWaiter::await_all`] creates one; the traffic session
/// controller requires it before traffic may start.
#[derive(Debug)]
pub struct Converged {
    endpoints: Vec<String>,
}

impl Converged {
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

pub struct ConvergenceWaiter {
    subscription: Arc<dyn StateSubscription>,
}

impl ConvergenceWaiter {
    pub fn new(subscription: Arc<dyn StateSubscription>) -> Self {
        Self { subscription }
    }

    /// Wait until `predicate` holds for the value at `path`, or `deadline`.
    ///
    /// The value present at subscription time is evaluated first, so an
    /// already-true predicate returns without waiting. A collaborator
    /// failure, or a subscription that ends, is an error rather than a
    /// timeout.
    pub async fn watch(
        &self,
        path: &StatePath,
        predicate: &(dyn Fn(Option<&Value>) -> bool + Send + Sync),
        deadline: Instant,
    ) -> ConformanceResult<WaitOutcome> {
        let wait = async {
            let mut updates = self
                .subscription
                .subscribe(path)
                .await
                .map_err(|e| ConformanceError::collaborator("state subscription", e))?;

            while let Some(item) = updates.next().await {
                let value = item.map_err(|e| {
                    warn!("Reading {} failed: {}", path, e);
                    ConformanceError::collaborator("state read", e)
                })?;
                if predicate(value.as_ref()) {
                    return Ok(WaitOutcome::Satisfied(value));
                }
                debug!("{} not converged yet (observed {:?})", path, value);
            }

            Err(ConformanceError::collaborator(
                "state subscription",
                CollaboratorError::Transport {
                    message: format!("subscription to {} closed", path),
                },
            ))
        };

        match timeout_at(deadline, wait).await {
            Ok(result) => result,
            Err(_) => Ok(WaitOutcome::TimedOut),
        }
    }

    /// Watch every endpoint concurrently against one shared deadline and
    /// join on all of them.
    ///
    /// Fails with [`ConformanceError::ConvergenceTimeout`] naming every
    /// endpoint that did not converge in time.
    #[instrument(skip_all, fields(endpoints = watches.len(), timeout = ?timeout))]
    pub async fn await_all(
        &self,
        watches: &[NeighborWatch],
        timeout: Duration,
    ) -> ConformanceResult<Converged> {
        let deadline = Instant::now() + timeout;

        let outcomes = try_join_all(watches.iter().map(|w| async move {
            info!("Checking for {} neighbor resolution on {}", w.family, w.endpoint);
            let outcome = self.watch(&w.path, &*w.predicate, deadline).await?;
            Ok::<_, ConformanceError>((w, outcome))
        }))
        .await?;

        let mut unresolved: Vec<String> = Vec::new();
        let mut converged: Vec<String> = Vec::new();
        for (watch, outcome) in outcomes {
            match outcome {
                WaitOutcome::Satisfied(value) => {
                    info!(
                        "{} neighbor resolved on {}: {}",
                        watch.family,
                        watch.endpoint,
                        value.map(|v| v.to_string()).unwrap_or_default()
                    );
                    if !converged.contains(&watch.endpoint) {
                        converged.push(watch.endpoint.clone());
                    }
                }
                WaitOutcome::TimedOut => {
                    warn!(
                        "{} neighbor not resolved on {} within {:?}",
                        watch.family, watch.endpoint, timeout
                    );
                    if !unresolved.contains(&watch.endpoint) {
                        unresolved.push(watch.endpoint.clone());
                    }
                }
            }
        }

        if !unresolved.is_empty() {
            return Err(ConformanceError::ConvergenceTimeout {
                endpoints: unresolved,
                deadline_secs: timeout.as_secs_f64(),
            });
        }

        Ok(Converged {
            endpoints: converged,
        })
    }
}
