use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use nidefaults_runner::collaborators::Collaborators;
use nidefaults_runner::config::{AppConfig, ConfigManager, ScenarioSource};
use nidefaults_runner::remote::remote_collaborators;
use nidefaults_runner::scenario::{ScenarioLoader, ScenarioReport, ScenarioRunner};
use nidefaults_runner::simulated::{SimulatedLab, SimulationProfile};
use nidefaults_shared::ScenarioDefinition;

fn load_scenario(source: &ScenarioSource) -> Result<ScenarioDefinition> {
    match source {
        ScenarioSource::BuiltIn => Ok(ScenarioDefinition::default_address_families()),
        ScenarioSource::File(path) => ScenarioLoader::load_file(path),
        ScenarioSource::Directory { extra_dirs, id } => {
            let mut loader = ScenarioLoader::new();
            loader.add_directories(extra_dirs.iter().cloned());
            loader.get_scenario(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "Scenario '{}' not found in {:?}",
                    id,
                    loader.directories()
                )
            })
        }
    }
}

fn write_report(path: &Path, report: &ScenarioReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
    info!("Report written to {:?}", path);
    Ok(())
}

async fn run(
    collaborators: Collaborators,
    app: &AppConfig,
    scenario: &ScenarioDefinition,
) -> Result<ExitCode> {
    let runner = ScenarioRunner::new(collaborators, app.timing)
        .with_network_instance(app.network_instance.clone());

    match runner.run(scenario).await {
        Ok(report) => {
            if let Some(path) = &app.report {
                write_report(path, &report)?;
            }
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            error!("Scenario '{}' aborted: {}", scenario.id, e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config_manager = ConfigManager::from_cli_and_env()?;
    config_manager.init_logging()?;
    let app = &config_manager.app;

    let scenario = load_scenario(&app.scenario)?;
    info!(
        "Starting nidefaults-runner with scenario '{}': {}",
        scenario.id, scenario.description
    );

    if app.simulate {
        info!("Running against simulated collaborators");
        let lab = SimulatedLab::new(SimulationProfile::default());
        return run(lab.collaborators(), app, &scenario).await;
    }

    let zenoh_config = config_manager
        .zenoh
        .to_zenoh_config()
        .map_err(|e| anyhow::anyhow!("Zenoh configuration error: {}", e))?;
    let session = zenoh::open(zenoh_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;
    info!(
        "Zenoh session opened with mode: {:?}, endpoints: {:?}",
        config_manager.zenoh.mode, config_manager.zenoh.endpoints
    );
    info!(
        "Device agent '{}', traffic agent '{}', telemetry {:?}",
        app.agents.device, app.agents.traffic, app.telemetry
    );

    let collaborators =
        remote_collaborators(Arc::new(session), &app.agents, app.query_timeout, app.telemetry);
    run(collaborators, app, &scenario).await
}
