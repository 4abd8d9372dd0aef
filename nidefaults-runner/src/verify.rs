//! Loss verifier.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use nidefaults_shared::errors::{ConformanceError, ConformanceResult};
use nidefaults_shared::{FlowCounters, Verdict};

use crate::collaborators::TrafficGenerator;

/// Verdict for one flow's counters. Only exact delivery passes.
pub fn classify(flow: &str, counters: FlowCounters) -> ConformanceResult<Verdict> {
    let Some(loss_percent) = counters.loss_percent() else {
        return Err(ConformanceError::AmbiguousLoss {
            flow: flow.to_string(),
            counters,
        });
    };

    if counters.rx_packets == counters.tx_packets {
        Ok(Verdict::Pass { counters })
    } else {
        Ok(Verdict::Fail {
            loss_percent,
            counters,
        })
    }
}

pub struct LossVerifier {
    generator: Arc<dyn TrafficGenerator>,
}

impl LossVerifier {
    pub fn new(generator: Arc<dyn TrafficGenerator>) -> Self {
        Self { generator }
    }

    /// Read counters for every flow and compute its verdict.
    ///
    /// A flow that transmitted nothing aborts verification with
    /// [`ConformanceError::AmbiguousLoss`].
    pub async fn verify(&self, flows: &[String]) -> ConformanceResult<BTreeMap<String, Verdict>> {
        let mut verdicts = BTreeMap::new();
        for flow in flows {
            let counters = self
                .generator
                .flow_counters(flow)
                .await
                .map_err(|e| ConformanceError::collaborator("read flow counters", e))?;

            let verdict = classify(flow, counters)?;
            match &verdict {
                Verdict::Pass { .. } => info!(
                    "Flow {}: PASS (tx={}, rx={})",
                    flow, counters.tx_packets, counters.rx_packets
                ),
                Verdict::Fail { loss_percent, .. } => warn!(
                    "Flow {}: FAIL with {:.2}% loss (tx={}, rx={})",
                    flow, loss_percent, counters.tx_packets, counters.rx_packets
                ),
            }
            verdicts.insert(flow.clone(), verdict);
        }
        Ok(verdicts)
    }

    /// Log a counter table for `flows`. Read failures are logged, not raised.
    pub async fn log_flow_metrics(&self, flows: &[String]) {
        info!("{:<12} {:>12} {:>12} {:>8}", "Flow", "Tx Pkts", "Rx Pkts", "Loss %");
        for flow in flows {
            match self.generator.flow_counters(flow).await {
                Ok(c) => info!(
                    "{:<12} {:>12} {:>12} {:>8}",
                    flow,
                    c.tx_packets,
                    c.rx_packets,
                    c.loss_percent()
                        .map(|l| format!("{:.2}", l))
                        .unwrap_or_else(|| "-".to_string())
                ),
                Err(e) => warn!("Could not read counters for flow {}: {}", flow, e),
            }
        }
    }

    pub async fn log_port_metrics(&self, ports: &[String]) {
        info!("{:<12} {:>12} {:>12}", "Port", "Tx Frames", "Rx Frames");
        for port in ports {
            match self.generator.port_counters(port).await {
                Ok(c) => info!("{:<12} {:>12} {:>12}", port, c.tx_frames, c.rx_frames),
                Err(e) => warn!("Could not read counters for port {}: {}", port, e),
            }
        }
    }
}
