//! Conformance runner for default IPv4/IPv6 forwarding in the default
//! network instance.
//!
//! The library exposes the orchestration core (device configuration,
//! convergence waiting, traffic session control, loss verification), the
//! collaborator traits with their Zenoh and simulated implementations, and
//! the configuration used by the `nidefaults-runner` binary.

pub mod collaborators;
pub mod config;
pub mod convergence;
pub mod device;
pub mod remote;
pub mod scenario;
pub mod simulated;
pub mod traffic;
pub mod verify;

pub use collaborators::Collaborators;
pub use convergence::{Converged, ConvergenceWaiter, NeighborWatch, WaitOutcome};
pub use device::DeviceConfigBuilder;
pub use scenario::{ScenarioReport, ScenarioRunner, Timing};
pub use traffic::{SessionState, TrafficSessionController};
pub use verify::LossVerifier;
