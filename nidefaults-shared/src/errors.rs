use thiserror::Error;

use crate::traffic::FlowCounters;

/// Errors that abort a conformance scenario.
///
/// Every variant names the offending interface, flow or endpoint so the
/// failure can be diagnosed from the message alone.
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Invalid configuration for '{subject}': {reason}")]
    Config { subject: String, reason: String },

    #[error("Device rejected configuration: {reason}")]
    ConfigRejected { reason: String },

    #[error("Traffic generator rejected topology: {reason}")]
    TopologyPush { reason: String },

    #[error("{operation} failed: {source}")]
    Collaborator {
        operation: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Neighbor resolution timed out after {deadline_secs:.1}s on: {}", endpoints.join(", "))]
    ConvergenceTimeout {
        endpoints: Vec<String>,
        deadline_secs: f64,
    },

    #[error("Traffic start requested in state {state} before convergence was confirmed")]
    PrematureTrafficStart { state: String },

    #[error("Cannot {operation} while traffic session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: String,
    },

    #[error("Flow '{flow}' transmitted no packets (tx={}, rx={}); loss is undefined", counters.tx_packets, counters.rx_packets)]
    AmbiguousLoss { flow: String, counters: FlowCounters },
}

impl ConformanceError {
    pub fn config(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        ConformanceError::Config {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn collaborator(operation: &'static str, source: CollaboratorError) -> Self {
        ConformanceError::Collaborator { operation, source }
    }
}

/// Failures reported by (or while talking to) an external collaborator.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollaboratorError {
    pub fn transport(message: impl std::fmt::Display) -> Self {
        CollaboratorError::Transport {
            message: message.to_string(),
        }
    }
}

/// Zenoh configuration specific errors
#[derive(Error, Debug)]
pub enum ZenohConfigError {
    #[error("Invalid zenoh mode: expected 'peer' or 'client', got '{mode}'")]
    InvalidMode { mode: String },

    #[error("Invalid endpoint format: '{endpoint}' - {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Client mode cannot listen on '{endpoint}'")]
    ClientCannotListen { endpoint: String },

    #[error("Duplicate endpoint: '{endpoint}'")]
    DuplicateEndpoint { endpoint: String },

    #[error("Failed to create zenoh config: {reason}")]
    Creation { reason: String },
}

/// Result type aliases for convenience
pub type ConformanceResult<T> = Result<T, ConformanceError>;
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
pub type ZenohConfigResult<T> = Result<T, ZenohConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_timeout_names_endpoints() {
        let err = ConformanceError::ConvergenceTimeout {
            endpoints: vec!["port1".to_string(), "port2".to_string()],
            deadline_secs: 60.0,
        };
        let message = err.to_string();
        assert!(message.contains("port1, port2"));
        assert!(message.contains("60.0s"));
    }

    #[test]
    fn test_ambiguous_loss_carries_counters() {
        let err = ConformanceError::AmbiguousLoss {
            flow: "ipv4".to_string(),
            counters: FlowCounters::new(0, 0),
        };
        assert_eq!(
            err.to_string(),
            "Flow 'ipv4' transmitted no packets (tx=0, rx=0); loss is undefined"
        );
    }
}
