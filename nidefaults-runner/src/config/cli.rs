//! CLI argument parsing for the conformance runner.
//!
//! Arguments are parsed with clap into a flat [`CliConfig`]; interpretation
//! (durations, paths, modes) happens in [`AppConfig`](super::AppConfig).

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};

/// CLI configuration structure containing all parsed command line arguments
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub verbose: bool,
    pub scenario: Option<String>,
    pub scenario_dirs: Vec<String>,
    pub scenario_id: Option<String>,
    pub settle: String,
    pub convergence_deadline: String,
    pub protocol_grace: String,
    pub telemetry: String,
    pub poll_interval: String,
    pub query_timeout: String,
    pub network_instance: String,
    pub device_agent: String,
    pub traffic_agent: String,
    pub zenoh_mode: String,
    pub zenoh_connect: Option<String>,
    pub zenoh_listen: Option<String>,
    pub no_multicast: bool,
    pub simulate: bool,
    pub report: Option<String>,
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Argument --{} is required", name))
}

impl CliConfig {
    /// Parse CLI arguments and create CliConfig
    pub fn from_args() -> Result<Self> {
        let matches = Self::build_cli().get_matches();
        Self::from_matches(&matches)
    }

    /// Create CliConfig from pre-parsed ArgMatches (useful for testing)
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            verbose: matches.get_flag("verbose"),
            scenario: matches.get_one::<String>("scenario").cloned(),
            scenario_dirs: matches
                .get_many::<String>("scenario-dir")
                .map(|vals| vals.cloned().collect())
                .unwrap_or_default(),
            scenario_id: matches.get_one::<String>("scenario-id").cloned(),
            settle: required(matches, "settle")?,
            convergence_deadline: required(matches, "convergence-deadline")?,
            protocol_grace: required(matches, "protocol-grace")?,
            telemetry: required(matches, "telemetry")?,
            poll_interval: required(matches, "poll-interval")?,
            query_timeout: required(matches, "query-timeout")?,
            network_instance: required(matches, "network-instance")?,
            device_agent: required(matches, "device-agent")?,
            traffic_agent: required(matches, "traffic-agent")?,
            zenoh_mode: required(matches, "zenoh-mode")?,
            zenoh_connect: matches.get_one::<String>("zenoh-connect").cloned(),
            zenoh_listen: matches.get_one::<String>("zenoh-listen").cloned(),
            no_multicast: matches.get_flag("no-multicast"),
            simulate: matches.get_flag("simulate"),
            report: matches.get_one::<String>("report").cloned(),
        })
    }

    /// Build the clap Command structure
    pub fn build_cli() -> Command {
        Command::new("nidefaults-runner")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Default network instance address-family conformance runner")
            .long_about("Configures a device under test with a default network instance and two \
                       ports, brings up emulated peers, waits for neighbor resolution and checks \
                       that IPv4 and IPv6 traffic is forwarded without loss.")
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Enable verbose logging")
                    .long_help("Enable debug logging, including the rendered device configuration \
                              and every agent query."),
            )
            .arg(
                Arg::new("scenario")
                    .short('s')
                    .long("scenario")
                    .value_name("FILE")
                    .conflicts_with("scenario-id")
                    .help("Run the scenario defined in a .json5 file")
                    .long_help("Run the scenario defined in a .json5 file. Without this option (and \
                              without --scenario-id) the built-in two-port scenario is used."),
            )
            .arg(
                Arg::new("scenario-dir")
                    .long("scenario-dir")
                    .value_name("DIRECTORY")
                    .action(ArgAction::Append)
                    .help("Additional directory to load scenario files from")
                    .long_help("Additional directory to scan for .json5 scenario files. \
                              Can be specified multiple times. Directories are scanned in order \
                              with later ones taking priority (can override scenarios with same ID). \
                              Default directories: /usr/share/nidefaults/scenarios, \
                              ~/.config/nidefaults/scenarios, ./scenarios"),
            )
            .arg(
                Arg::new("scenario-id")
                    .long("scenario-id")
                    .value_name("ID")
                    .help("Run the scenario with this id from the scenario directories"),
            )
            .arg(
                Arg::new("settle")
                    .long("settle")
                    .value_name("DURATION")
                    .default_value("15s")
                    .help("How long traffic runs before it is stopped"),
            )
            .arg(
                Arg::new("convergence-deadline")
                    .long("convergence-deadline")
                    .value_name("DURATION")
                    .default_value("1m")
                    .help("Upper bound on neighbor resolution"),
            )
            .arg(
                Arg::new("protocol-grace")
                    .long("protocol-grace")
                    .value_name("DURATION")
                    .default_value("10s")
                    .help("Pause between protocol start and the convergence wait"),
            )
            .arg(
                Arg::new("telemetry")
                    .long("telemetry")
                    .value_name("MODE")
                    .value_parser(["push", "poll"])
                    .default_value("push")
                    .help("Observe device state through pushed updates or polling"),
            )
            .arg(
                Arg::new("poll-interval")
                    .long("poll-interval")
                    .value_name("DURATION")
                    .default_value("1s")
                    .help("Interval between state reads in poll mode"),
            )
            .arg(
                Arg::new("query-timeout")
                    .long("query-timeout")
                    .value_name("DURATION")
                    .default_value("10s")
                    .help("Upper bound on a single agent query"),
            )
            .arg(
                Arg::new("network-instance")
                    .long("network-instance")
                    .value_name("NAME")
                    .default_value("DEFAULT")
                    .help("Name of the default network instance on the device"),
            )
            .arg(
                Arg::new("device-agent")
                    .long("device-agent")
                    .value_name("NAME")
                    .default_value("dut")
                    .help("Name of the device management agent")
                    .long_help("Name of the device management agent. This name is used for Zenoh \
                              topic routing (nidefaults/<NAME>/query/...)."),
            )
            .arg(
                Arg::new("traffic-agent")
                    .long("traffic-agent")
                    .value_name("NAME")
                    .default_value("ate")
                    .help("Name of the traffic generator agent"),
            )
            .arg(
                Arg::new("zenoh-mode")
                    .long("zenoh-mode")
                    .value_name("MODE")
                    .help("Zenoh session mode: peer or client")
                    .value_parser(["peer", "client"])
                    .default_value("peer"),
            )
            .arg(
                Arg::new("zenoh-connect")
                    .long("zenoh-connect")
                    .value_name("ENDPOINTS")
                    .help("Zenoh connect endpoints (comma-separated)")
                    .long_help("Comma-separated list of Zenoh endpoints to connect to. \
                              Examples: tcp/192.168.1.1:7447, tls/secure.host:7448"),
            )
            .arg(
                Arg::new("zenoh-listen")
                    .long("zenoh-listen")
                    .value_name("ENDPOINTS")
                    .help("Zenoh listen endpoints (comma-separated)"),
            )
            .arg(
                Arg::new("no-multicast")
                    .long("no-multicast")
                    .action(ArgAction::SetTrue)
                    .help("Disable multicast scouting for peer discovery")
                    .long_help("Disable multicast scouting for automatic peer discovery. \
                              When disabled, you must explicitly specify connect endpoints."),
            )
            .arg(
                Arg::new("simulate")
                    .long("simulate")
                    .action(ArgAction::SetTrue)
                    .help("Run against simulated collaborators instead of remote agents"),
            )
            .arg(
                Arg::new("report")
                    .long("report")
                    .value_name("FILE")
                    .help("Write the JSON report to FILE"),
            )
    }

    /// Validate CLI configuration
    pub fn validate(&self) -> Result<()> {
        for (what, name) in [
            ("Device agent", &self.device_agent),
            ("Traffic agent", &self.traffic_agent),
        ] {
            if name.is_empty() {
                return Err(anyhow::anyhow!("{} name cannot be empty", what));
            }
            if !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            {
                return Err(anyhow::anyhow!(
                    "{} name can only contain alphanumeric characters, hyphens, and underscores",
                    what
                ));
            }
        }

        if self.scenario_id.is_some() && self.scenario.is_some() {
            return Err(anyhow::anyhow!(
                "--scenario and --scenario-id are mutually exclusive"
            ));
        }

        Ok(())
    }
}
