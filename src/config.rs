use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use wiggum::agent::AgentCommand;
use wiggum::backpressure::CheckOptions;
use wiggum::runner::LoopRunnerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub agent: AgentConfig,
    pub backpressure: BackpressureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub binary: String,
    pub extra_args: Vec<String>,
    pub max_turns: Option<u32>,
    pub skip_permissions: bool,
    pub resume_previous_session: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            extra_args: Vec::new(),
            max_turns: None,
            skip_permissions: false,
            resume_previous_session: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    pub timeout_ms: u64,
    pub max_output_chars: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            max_output_chars: 20_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            agent: AgentConfig::default(),
            backpressure: BackpressureConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn agent_command(&self) -> AgentCommand {
        AgentCommand::new(&self.agent.binary).args(self.agent.extra_args.iter())
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions::default().timeout_ms(self.backpressure.timeout_ms)
    }

    pub fn runner_config(&self) -> LoopRunnerConfig {
        LoopRunnerConfig {
            max_turns: self.agent.max_turns,
            skip_permissions: self.agent.skip_permissions,
            resume_previous_session: self.agent.resume_previous_session,
            max_output_chars: self.backpressure.max_output_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.binary, "claude");
        assert_eq!(config.backpressure.timeout_ms, 600_000);
        assert_eq!(config.runner_config().max_output_chars, 20_000);
        assert!(!config.runner_config().skip_permissions);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wiggum.yml");
        fs::write(&path, "agent:\n  binary: /opt/claude\n  extra_args: [--debug]\n  max_turns: 30\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.agent.binary, "/opt/claude");
        assert_eq!(config.runner_config().max_turns, Some(30));
        assert_eq!(config.backpressure.max_output_chars, 20_000);
        assert_eq!(config.agent_command().program, "/opt/claude");
        assert_eq!(config.agent_command().base_args, vec!["--debug"]);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let path = PathBuf::from("/nonexistent/wiggum.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
