//! Scenario Loader - File-based scenario loading from directories.
//!
//! Scans directories for `.json5` scenario files and parses them. Several
//! source directories can be configured; user scenarios override system ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use nidefaults_shared::ScenarioDefinition;
use nidefaults_shared::scenario_json::parse_scenario_file;

/// Default system scenario directory (installed via package)
pub const SYSTEM_SCENARIO_DIR: &str = "/usr/share/nidefaults/scenarios";

/// Default user scenario directory
pub const USER_SCENARIO_DIR: &str = ".config/nidefaults/scenarios";

/// Scenario loader that scans directories for .json5 scenario files.
///
/// Directories are scanned in priority order - later directories can override
/// scenarios with the same ID from earlier directories.
#[derive(Debug, Clone)]
pub struct ScenarioLoader {
    directories: Vec<PathBuf>,
}

impl Default for ScenarioLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioLoader {
    /// Loader over the default directories, lowest priority first:
    /// `/usr/share/nidefaults/scenarios`, `~/.config/nidefaults/scenarios`,
    /// `./scenarios`.
    pub fn new() -> Self {
        let mut directories = vec![PathBuf::from(SYSTEM_SCENARIO_DIR)];
        if let Some(home) = dirs::home_dir() {
            directories.push(home.join(USER_SCENARIO_DIR));
        }
        directories.push(PathBuf::from("./scenarios"));

        Self { directories }
    }

    pub fn with_directories(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    /// Append directories with the highest priority.
    pub fn add_directories(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.directories.extend(dirs);
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Load all scenarios, sorted by id. Unreadable directories and invalid
    /// files are skipped with a warning.
    pub fn load_all(&self) -> Vec<ScenarioDefinition> {
        let mut scenarios: HashMap<String, ScenarioDefinition> = HashMap::new();

        for dir in &self.directories {
            if !dir.exists() {
                debug!("Scenario directory does not exist, skipping: {:?}", dir);
                continue;
            }

            match self.load_from_directory(dir) {
                Ok(loaded) => {
                    let count = loaded.len();
                    for scenario in loaded {
                        if scenarios.contains_key(&scenario.id) {
                            debug!(
                                "Scenario '{}' from {:?} overrides previous definition",
                                scenario.id, dir
                            );
                        }
                        scenarios.insert(scenario.id.clone(), scenario);
                    }
                    if count > 0 {
                        info!("Loaded {} scenarios from {:?}", count, dir);
                    }
                }
                Err(e) => {
                    warn!("Failed to load scenarios from {:?}: {}", dir, e);
                }
            }
        }

        let mut scenarios: Vec<_> = scenarios.into_values().collect();
        scenarios.sort_by(|a, b| a.id.cmp(&b.id));
        scenarios
    }

    fn load_from_directory(&self, dir: &Path) -> Result<Vec<ScenarioDefinition>> {
        let mut scenarios = Vec::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {:?}", dir))?;

        for entry in entries {
            let entry =
                entry.with_context(|| format!("Failed to read directory entry in {:?}", dir))?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json5") {
                continue;
            }

            match Self::load_file(&path) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => warn!("Failed to load scenario from {:?}: {:#}", path, e),
            }
        }

        Ok(scenarios)
    }

    /// Load a single scenario file.
    pub fn load_file(path: &Path) -> Result<ScenarioDefinition> {
        debug!("Loading scenario from {:?}", path);
        parse_scenario_file(path)
            .with_context(|| format!("Failed to parse scenario file: {:?}", path))
    }

    pub fn get_scenario(&self, id: &str) -> Option<ScenarioDefinition> {
        self.load_all().into_iter().find(|s| s.id == id)
    }
}
