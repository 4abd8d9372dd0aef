//! Application configuration for the conformance runner.
//!
//! Turns the raw CLI strings into typed settings: log level, scenario source,
//! harness timing, agent names and telemetry mode.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use nidefaults_shared::scenario_json::parse_duration_string;

use super::cli::CliConfig;
use crate::remote::{AgentNames, TelemetryMode};
use crate::scenario::Timing;

/// Crates whose debug output drowns the runner's own.
const QUIET_TARGETS: &str = "zenoh=warn,zenoh_transport=warn,zenoh_runtime=warn,zenoh_protocol=warn";

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Where the scenario to run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioSource {
    BuiltIn,
    File(PathBuf),
    /// Look `id` up in the scenario directories.
    Directory {
        extra_dirs: Vec<PathBuf>,
        id: String,
    },
}

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: LogLevel,
    pub scenario: ScenarioSource,
    pub timing: Timing,
    pub telemetry: TelemetryMode,
    pub query_timeout: Duration,
    pub network_instance: String,
    pub agents: AgentNames,
    pub simulate: bool,
    pub report: Option<PathBuf>,
}

fn duration_arg(name: &str, value: &str) -> Result<Duration> {
    parse_duration_string(value)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid value for --{}", name))
}

impl AppConfig {
    /// Create application configuration from CLI config
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        let log_level = if cli_config.verbose {
            LogLevel::Debug
        } else {
            match env::var("RUST_LOG") {
                Ok(level_str) => Self::parse_log_level(&level_str),
                Err(_) => LogLevel::Info,
            }
        };

        let scenario = match (&cli_config.scenario, &cli_config.scenario_id) {
            (Some(file), _) => ScenarioSource::File(PathBuf::from(file)),
            (None, Some(id)) => ScenarioSource::Directory {
                extra_dirs: cli_config.scenario_dirs.iter().map(PathBuf::from).collect(),
                id: id.clone(),
            },
            (None, None) => ScenarioSource::BuiltIn,
        };

        let timing = Timing {
            protocol_grace: duration_arg("protocol-grace", &cli_config.protocol_grace)?,
            convergence_deadline: duration_arg(
                "convergence-deadline",
                &cli_config.convergence_deadline,
            )?,
            settle: duration_arg("settle", &cli_config.settle)?,
        };

        let telemetry = match cli_config.telemetry.as_str() {
            "push" => TelemetryMode::Push,
            "poll" => TelemetryMode::Poll(duration_arg("poll-interval", &cli_config.poll_interval)?),
            other => return Err(anyhow::anyhow!("Invalid telemetry mode '{}'", other)),
        };

        let config = Self {
            log_level,
            scenario,
            timing,
            telemetry,
            query_timeout: duration_arg("query-timeout", &cli_config.query_timeout)?,
            network_instance: cli_config.network_instance.clone(),
            agents: AgentNames {
                device: cli_config.device_agent.clone(),
                traffic: cli_config.traffic_agent.clone(),
            },
            simulate: cli_config.simulate,
            report: cli_config.report.as_ref().map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse log level from string
    fn parse_log_level(level_str: &str) -> LogLevel {
        // Extract the main log level from complex RUST_LOG format
        let main_level = level_str
            .split(',')
            .next()
            .unwrap_or(level_str)
            .split('=')
            .next()
            .unwrap_or(level_str)
            .to_lowercase();

        match main_level.as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// Filter directives: `RUST_LOG` wins unless verbose logging was asked
    /// for; noisy crates are capped either way.
    fn filter_directives(&self, rust_log: Option<&str>) -> String {
        match rust_log {
            Some(existing) if !existing.is_empty() && self.log_level != LogLevel::Debug => {
                format!("{},{}", existing, QUIET_TARGETS)
            }
            _ => format!("{},{}", self.log_level.to_filter_string(), QUIET_TARGETS),
        }
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        let rust_log = env::var("RUST_LOG").ok();
        let filter = EnvFilter::try_new(self.filter_directives(rust_log.as_deref()))
            .context("Invalid log filter")?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true)
            .event_format(
                tracing_subscriber::fmt::format()
                    .with_target(false)
                    .compact(),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        tracing::info!("Logging initialized with level: {:?}", self.log_level);
        Ok(())
    }

    /// Validate application configuration
    pub fn validate(&self) -> Result<()> {
        if self.network_instance.trim().is_empty() {
            return Err(anyhow::anyhow!("Network instance name cannot be empty"));
        }
        if self.timing.settle.is_zero() {
            return Err(anyhow::anyhow!("Settle duration must be greater than 0"));
        }
        if self.timing.convergence_deadline.is_zero() {
            return Err(anyhow::anyhow!(
                "Convergence deadline must be greater than 0"
            ));
        }
        if let TelemetryMode::Poll(interval) = self.telemetry {
            if interval.is_zero() {
                return Err(anyhow::anyhow!("Poll interval must be greater than 0"));
            }
        }
        if self.query_timeout.is_zero() {
            return Err(anyhow::anyhow!("Query timeout must be greater than 0"));
        }
        Ok(())
    }
}
