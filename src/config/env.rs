//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration, and reads the
//! worker identity exported by the parallel test runner.

use std::env;
use std::path::PathBuf;

use super::OutputType;

/// Environment variable prefix
const ENV_PREFIX: &str = "PARALLEL_REPORT";

/// Worker number exported by the parallel runner; empty for the first worker
const WORKER_NUMBER_VAR: &str = "TEST_ENV_NUMBER";

/// Total number of worker groups exported by the parallel runner
const WORKER_GROUPS_VAR: &str = "PARALLEL_TEST_GROUPS";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Output type from PARALLEL_REPORT_OUTPUT_TYPE
    pub output_type: Option<OutputType>,
    /// Endpoint from PARALLEL_REPORT_ENDPOINT
    pub endpoint: Option<String>,
    /// Project from PARALLEL_REPORT_PROJECT
    pub project: Option<String>,
    /// API token from PARALLEL_REPORT_TOKEN
    pub token: Option<String>,
    /// Run name from PARALLEL_REPORT_LAUNCH
    pub launch: Option<String>,
    /// Run description from PARALLEL_REPORT_DESCRIPTION
    pub description: Option<String>,
    /// Comma separated tags from PARALLEL_REPORT_TAGS
    pub tags: Option<Vec<String>>,
    /// Debug mode from PARALLEL_REPORT_DEBUG
    pub debug: Option<bool>,
    /// Verbosity from PARALLEL_REPORT_VERBOSE
    pub verbose: Option<u8>,
    /// Shared directory from PARALLEL_REPORT_SHARED_DIR
    pub shared_dir: Option<PathBuf>,
    /// Run key from PARALLEL_REPORT_RUN_KEY
    pub run_key: Option<String>,
    /// Expected workers from PARALLEL_REPORT_WORKERS
    pub workers: Option<u32>,
    /// HTTP timeout from PARALLEL_REPORT_TIMEOUT
    pub timeout: Option<u64>,
    /// Launch info output from PARALLEL_REPORT_LAUNCH_INFO_FILE
    pub launch_info_file: Option<PathBuf>,
    /// Config file from PARALLEL_REPORT_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            output_type: get_env("OUTPUT_TYPE").and_then(|v| OutputType::from_str(&v)),
            endpoint: get_env("ENDPOINT"),
            project: get_env("PROJECT"),
            token: get_env("TOKEN"),
            launch: get_env("LAUNCH"),
            description: get_env("DESCRIPTION"),
            tags: get_env("TAGS").map(|v| split_list(&v)),
            debug: get_env_bool("DEBUG"),
            verbose: get_env_parse("VERBOSE"),
            shared_dir: get_env("SHARED_DIR").map(PathBuf::from),
            run_key: get_env("RUN_KEY"),
            workers: get_env_parse("WORKERS"),
            timeout: get_env_parse("TIMEOUT"),
            launch_info_file: get_env("LAUNCH_INFO_FILE").map(PathBuf::from),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.output_type.is_some()
            || self.endpoint.is_some()
            || self.project.is_some()
            || self.token.is_some()
            || self.launch.is_some()
            || self.description.is_some()
            || self.tags.is_some()
            || self.debug.is_some()
            || self.verbose.is_some()
            || self.shared_dir.is_some()
            || self.run_key.is_some()
            || self.workers.is_some()
            || self.timeout.is_some()
            || self.launch_info_file.is_some()
            || self.config_file.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_OUTPUT_TYPE:  {:?}", ENV_PREFIX, self.output_type);
        println!("  {}_ENDPOINT:     {:?}", ENV_PREFIX, self.endpoint);
        println!("  {}_PROJECT:      {:?}", ENV_PREFIX, self.project);
        println!(
            "  {}_TOKEN:        {}",
            ENV_PREFIX,
            if self.token.is_some() { "<set>" } else { "None" }
        );
        println!("  {}_LAUNCH:       {:?}", ENV_PREFIX, self.launch);
        println!("  {}_TAGS:         {:?}", ENV_PREFIX, self.tags);
        println!("  {}_DEBUG:        {:?}", ENV_PREFIX, self.debug);
        println!("  {}_VERBOSE:      {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_SHARED_DIR:   {:?}", ENV_PREFIX, self.shared_dir);
        println!("  {}_RUN_KEY:      {:?}", ENV_PREFIX, self.run_key);
        println!("  {}_WORKERS:      {:?}", ENV_PREFIX, self.workers);
        println!("  {}_TIMEOUT:      {:?}", ENV_PREFIX, self.timeout);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);

        let worker = WorkerInfo::load();
        println!("  {WORKER_NUMBER_VAR}:        {}", worker.number);
        println!("  {WORKER_GROUPS_VAR}:   {:?}", worker.groups);
    }
}

/// Identity of this worker within the parallel run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerInfo {
    /// 1-based worker number
    pub number: u32,
    /// Total number of workers, when run under the parallel runner
    pub groups: Option<u32>,
}

impl WorkerInfo {
    pub fn load() -> Self {
        Self::parse(
            env::var(WORKER_NUMBER_VAR).ok().as_deref(),
            env::var(WORKER_GROUPS_VAR).ok().as_deref(),
        )
    }

    /// The first worker exports an empty number
    pub fn parse(number: Option<&str>, groups: Option<&str>) -> Self {
        let number = number
            .map(str::trim)
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        let groups = groups
            .map(str::trim)
            .and_then(|g| g.parse::<u32>().ok())
            .filter(|g| *g > 0);

        Self { number, groups }
    }

    pub fn is_parallel(&self) -> bool {
        self.groups.is_some_and(|g| g > 1)
    }
}

impl Default for WorkerInfo {
    fn default() -> Self {
        Self {
            number: 1,
            groups: None,
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set a prefixed variable
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn output_type(self, output_type: OutputType) -> Self {
        self.var("OUTPUT_TYPE", output_type.as_str())
    }

    pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
        self.var("ENDPOINT", endpoint)
    }

    pub fn tags(self, tags: &[&str]) -> Self {
        self.var("TAGS", tags.join(","))
    }

    pub fn workers(self, workers: u32) -> Self {
        self.var("WORKERS", workers.to_string())
    }

    pub fn debug(self, debug: bool) -> Self {
        self.var("DEBUG", debug.to_string())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all PARALLEL_REPORT environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_OUTPUT_TYPE       Reporting mode (local, rp)");
    println!("  {ENV_PREFIX}_ENDPOINT          Remote API endpoint, e.g. https://rp/api/v1");
    println!("  {ENV_PREFIX}_PROJECT           Remote project name");
    println!("  {ENV_PREFIX}_TOKEN             Remote API token");
    println!("  {ENV_PREFIX}_LAUNCH            Run name");
    println!("  {ENV_PREFIX}_DESCRIPTION       Run description");
    println!("  {ENV_PREFIX}_TAGS              Comma separated run tags");
    println!("  {ENV_PREFIX}_DEBUG             Start the run in debug mode (true/false)");
    println!("  {ENV_PREFIX}_VERBOSE           Verbosity (0 errors, 1 info, 2 debug)");
    println!("  {ENV_PREFIX}_SHARED_DIR        Directory for the shared run documents");
    println!("  {ENV_PREFIX}_RUN_KEY           Key separating concurrent runs");
    println!("  {ENV_PREFIX}_WORKERS           Number of workers expected to finish");
    println!("  {ENV_PREFIX}_TIMEOUT           HTTP timeout in seconds");
    println!("  {ENV_PREFIX}_LAUNCH_INFO_FILE  Where to write the remote run metadata");
    println!("  {ENV_PREFIX}_CONFIG            Path to configuration file");
    println!("  {WORKER_NUMBER_VAR}            Worker number (set by the parallel runner)");
    println!("  {WORKER_GROUPS_VAR}       Worker count (set by the parallel runner)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_OUTPUT_TYPE=rp");
    println!("  export {ENV_PREFIX}_ENDPOINT=https://rp.example.com/api/v1");
    println!("  parallel-report launch");
}
