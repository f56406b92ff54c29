//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{EnvConfig, OutputType, ReportConfig};
use crate::portal::Attribute;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./parallel-report.yaml",
    "./parallel-report.yml",
    "./.parallel-report.yaml",
    "~/.config/parallel-report/config.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            report: ReportConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate_version()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the effective settings: the given or discovered file, then the environment
    pub fn resolve(path: Option<&Path>) -> Result<ReportConfig> {
        let env = EnvConfig::load();
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_deref().map(expand_path));

        let file = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };

        let mut report = file.report;
        report.apply_env(&env);
        Ok(report)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        // Create parent directory if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn validate_version(&self) -> Result<()> {
        if self.version != "1.0" {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_version()?;
        self.report.validate()
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: default_version(),
            report: ReportConfig {
                output_type: OutputType::Rp,
                endpoint: Some("https://reportportal.example.com/api/v1".to_string()),
                project: Some("my_project".to_string()),
                token: Some("00000000-0000-0000-0000-000000000000".to_string()),
                launch: "nightly-regression".to_string(),
                description: Some("Nightly regression suite".to_string()),
                tags: vec!["nightly".to_string()],
                attributes: vec![Attribute {
                    key: Some("branch".to_string()),
                    value: "main".to_string(),
                }],
                workers: Some(4),
                launch_info_file: Some(PathBuf::from("launch_info.json")),
                ..ReportConfig::default()
            },
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub(crate) fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
