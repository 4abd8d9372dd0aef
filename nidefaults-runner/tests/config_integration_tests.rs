//! Integration tests for the command line interface.
//!
//! These run the real binary against simulated collaborators and check the
//! help text, argument validation, exit codes and the JSON report.

use anyhow::Result;
use std::process::Command;
use tempfile::TempDir;

fn runner() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nidefaults-runner"))
}

#[test]
fn test_runner_cli_help_works() -> Result<()> {
    let output = runner().args(["--help"]).output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("nidefaults-runner"));
    for flag in [
        "--verbose",
        "--scenario",
        "--scenario-dir",
        "--settle",
        "--convergence-deadline",
        "--protocol-grace",
        "--network-instance",
        "--device-agent",
        "--traffic-agent",
        "--zenoh-mode",
        "--simulate",
        "--report",
    ] {
        assert!(stdout.contains(flag), "help is missing {}", flag);
    }
    Ok(())
}

#[test]
fn test_runner_cli_version_works() -> Result<()> {
    let output = runner().args(["--version"]).output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn test_runner_rejects_invalid_zenoh_mode() -> Result<()> {
    let output = runner().args(["--zenoh-mode", "router"]).output()?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_runner_rejects_invalid_duration() -> Result<()> {
    let output = runner().args(["--simulate", "--settle", "later"]).output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--settle"));
    Ok(())
}

#[test]
fn test_simulated_run_writes_passing_report() -> Result<()> {
    let dir = TempDir::new()?;
    let report_path = dir.path().join("report.json");

    let output = runner()
        .args(["--simulate", "--protocol-grace", "0s", "--settle", "100ms", "--report"])
        .arg(&report_path)
        .output()?;
    assert!(
        output.status.success(),
        "runner failed: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    assert_eq!(report["scenario_id"], "default-address-families");
    assert_eq!(report["network_instance"], "DEFAULT");
    assert_eq!(report["verdicts"]["ipv4"]["verdict"], "pass");
    assert_eq!(report["verdicts"]["ipv6"]["verdict"], "pass");
    assert_eq!(report["verdicts"]["ipv4"]["counters"]["tx_packets"], 500);
    Ok(())
}

#[test]
fn test_missing_scenario_file_fails() -> Result<()> {
    let output = runner()
        .args(["--simulate", "--scenario", "/nonexistent/scenario.json5"])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
