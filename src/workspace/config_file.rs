//! `.wiggum/config.yaml` - per-project loop settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::{BackpressureCheck, LoopConfig, LoopMode};
use crate::error::{Result, WiggumError};

/// The shape of `.wiggum/config.yaml` on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Human-readable loop name
    pub name: String,

    #[serde(rename = "loop", default)]
    pub loop_settings: LoopSettings,

    #[serde(default)]
    pub backpressure: BackpressureSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSettings {
    #[serde(default)]
    pub mode: LoopMode,
    pub max_iterations: Option<u32>,
    pub budget_usd: Option<f64>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackpressureSettings {
    #[serde(default)]
    pub checks: Vec<BackpressureCheck>,
}

impl WorkspaceConfig {
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        if config.name.trim().is_empty() {
            return Err(WiggumError::Workspace("config name cannot be empty".to_string()));
        }
        if config.loop_settings.budget_usd.is_some_and(|b| b < 0.0) {
            return Err(WiggumError::Workspace("budgetUsd cannot be negative".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| WiggumError::Workspace(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Loop settings as the runner sees them
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            mode: self.loop_settings.mode,
            max_iterations: self.loop_settings.max_iterations,
            budget_usd: self.loop_settings.budget_usd,
            model: self
                .loop_settings
                .model
                .clone()
                .filter(|m| !m.trim().is_empty()),
        }
    }
}
