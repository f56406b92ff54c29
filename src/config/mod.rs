//! Configuration module
//!
//! Handles loading and managing configuration.

pub mod env;
pub mod file;

pub use env::{EnvConfig, WorkerInfo};
pub use file::ConfigFile;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::portal::{Attribute, LaunchMode, RunRequest};
use crate::utils::logger::LogLevel;

/// Where results are reported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Only the shared tree and the console summary
    #[default]
    Local,
    /// A ReportPortal-compatible remote service as well
    Rp,
}

impl OutputType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(OutputType::Local),
            "rp" | "remote" => Some(OutputType::Rp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Local => "local",
            OutputType::Rp => "rp",
        }
    }
}

/// Report configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_type: OutputType,

    /// API endpoint of the remote service, e.g. `https://rp.example.com/api/v1`
    pub endpoint: Option<String>,

    pub project: Option<String>,

    /// API token for the remote service
    pub token: Option<String>,

    /// Run (launch) name
    pub launch: String,

    pub description: Option<String>,

    pub tags: Vec<String>,

    pub attributes: Vec<Attribute>,

    /// Start runs in debug mode
    pub debug: bool,

    /// 0 errors only, 1 info, 2 debug
    pub verbose: u8,

    /// Directory holding the shared documents
    pub shared_dir: Option<PathBuf>,

    /// Namespaces the shared documents of concurrent runs
    pub run_key: String,

    /// Expected number of workers
    pub workers: Option<u32>,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// File receiving the remote run metadata at teardown
    pub launch_info_file: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_type: OutputType::Local,
            endpoint: None,
            project: None,
            token: None,
            launch: "parallel-report".to_string(),
            description: None,
            tags: Vec::new(),
            attributes: Vec::new(),
            debug: false,
            verbose: 1,
            shared_dir: None,
            run_key: "default".to_string(),
            workers: None,
            timeout_secs: 60,
            launch_info_file: None,
        }
    }
}

impl ReportConfig {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if file::is_yaml_file(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    pub fn is_remote(&self) -> bool {
        self.output_type == OutputType::Rp
    }

    /// Remote mode requires endpoint, project and token
    pub fn validate(&self) -> Result<()> {
        if self.is_remote() {
            let missing: Vec<&str> = [
                ("endpoint", &self.endpoint),
                ("project", &self.project),
                ("token", &self.token),
            ]
            .iter()
            .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                anyhow::bail!(
                    "Remote reporting requires {} to be configured",
                    missing.join(", ")
                );
            }
        }

        if self.workers == Some(0) {
            anyhow::bail!("workers must be at least 1");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Overlay values set in the environment
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(output_type) = env.output_type {
            self.output_type = output_type;
        }
        if let Some(endpoint) = &env.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        if let Some(project) = &env.project {
            self.project = Some(project.clone());
        }
        if let Some(token) = &env.token {
            self.token = Some(token.clone());
        }
        if let Some(launch) = &env.launch {
            self.launch = launch.clone();
        }
        if let Some(description) = &env.description {
            self.description = Some(description.clone());
        }
        if let Some(tags) = &env.tags {
            self.tags = tags.clone();
        }
        if let Some(debug) = env.debug {
            self.debug = debug;
        }
        if let Some(verbose) = env.verbose {
            self.verbose = verbose;
        }
        if let Some(dir) = &env.shared_dir {
            self.shared_dir = Some(dir.clone());
        }
        if let Some(run_key) = &env.run_key {
            self.run_key = run_key.clone();
        }
        if let Some(workers) = env.workers {
            self.workers = Some(workers);
        }
        if let Some(timeout) = env.timeout {
            self.timeout_secs = timeout;
        }
        if let Some(path) = &env.launch_info_file {
            self.launch_info_file = Some(path.clone());
        }
    }

    /// Directory holding the shared documents
    pub fn shared_dir(&self) -> PathBuf {
        self.shared_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Expected worker count, falling back to the worker environment
    pub fn expected_workers(&self, worker: &WorkerInfo) -> u32 {
        self.workers.or(worker.groups).unwrap_or(1).max(1)
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbose)
    }

    /// Metadata for starting the remote run
    pub fn run_request(&self, start_time: DateTime<Utc>) -> RunRequest {
        RunRequest {
            name: self.launch.clone(),
            description: self.description.clone(),
            start_time,
            tags: self.tags.clone(),
            attributes: self.attributes.clone(),
            mode: if self.debug {
                LaunchMode::Debug
            } else {
                LaunchMode::Default
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn remote() -> ReportConfig {
        ReportConfig {
            output_type: OutputType::Rp,
            endpoint: Some("https://rp.example.com/api/v1".to_string()),
            project: Some("demo".to_string()),
            token: Some("secret".to_string()),
            ..ReportConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ReportConfig::default();
        assert_eq!(config.output_type, OutputType::Local);
        assert_eq!(config.verbose, 1);
        assert_eq!(config.timeout_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_validation() {
        assert!(remote().validate().is_ok());

        let missing = ReportConfig {
            token: None,
            project: Some("  ".to_string()),
            ..remote()
        };
        let err = missing.validate().unwrap_err().to_string();
        assert!(err.contains("project, token"));
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.yaml");
        std::fs::write(&path, "output_type: rp\nendpoint: http://rp/api/v1\nworkers: 3\n").unwrap();

        let config = ReportConfig::load(&path).unwrap();
        assert!(config.is_remote());
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.launch, "parallel-report");
    }

    #[test]
    fn test_apply_env() {
        let mut config = ReportConfig::default();
        let env = EnvConfig {
            output_type: Some(OutputType::Rp),
            tags: Some(vec!["nightly".to_string()]),
            workers: Some(4),
            ..EnvConfig::default()
        };
        config.apply_env(&env);

        assert!(config.is_remote());
        assert_eq!(config.tags, ["nightly"]);
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.launch, "parallel-report");
    }

    #[test]
    fn test_expected_workers() {
        let config = ReportConfig::default();
        let solo = WorkerInfo { number: 1, groups: None };
        let grouped = WorkerInfo { number: 2, groups: Some(3) };
        assert_eq!(config.expected_workers(&solo), 1);
        assert_eq!(config.expected_workers(&grouped), 3);

        let pinned = ReportConfig {
            workers: Some(5),
            ..ReportConfig::default()
        };
        assert_eq!(pinned.expected_workers(&grouped), 5);
    }

    #[test]
    fn test_run_request() {
        let config = ReportConfig {
            debug: true,
            ..remote()
        };
        let request = config.run_request(Utc::now());
        assert_eq!(request.mode, LaunchMode::Debug);
        assert_eq!(request.name, "parallel-report");
    }
}
