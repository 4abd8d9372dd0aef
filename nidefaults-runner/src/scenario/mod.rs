//! Scenario execution and file-based scenario loading.

pub mod execution;
pub mod loader;

pub use execution::{ScenarioReport, ScenarioRunner, Timing};
pub use loader::ScenarioLoader;
