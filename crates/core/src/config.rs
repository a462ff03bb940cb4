//! Configuration defaults and path utilities for runwatch.
//!
//! This module provides the defaults every run falls back to (telemetry
//! address, shell, buffer ceilings) and functions for resolving configuration
//! file paths and expanding shell variables like `~` in paths.

use std::time::Duration;

use crate::process::ProcessOptions;

/// Default path for the run profiles file
const DEFAULT_PROFILES_PATH: &str = "~/.runwatch/profiles.yml";

/// Default shell used to launch the engine invocation
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default UDP port the engine sends telemetry to
pub const DEFAULT_PORT: u16 = 5555;

/// Default host the status listener binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default ceiling for captured stderr text (10 MiB)
pub const DEFAULT_STDERR_CEILING: usize = 10 * 1024 * 1024;

/// Default time between the interrupt signal and a forced kill
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Default capacity of the process output channel
pub const DEFAULT_OUTPUT_CAPACITY: usize = 256;

/// Tunables for a single run session.
///
/// Everything except `host`/`port` has a sensible default and is rarely
/// changed outside of tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub host: String,
    pub port: u16,
    pub shell: String,
    pub run_timeout: Option<Duration>,
    pub kill_grace: Duration,
    pub stderr_ceiling: usize,
    pub output_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shell: DEFAULT_SHELL.to_string(),
            run_timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            stderr_ceiling: DEFAULT_STDERR_CEILING,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl SessionSettings {
    /// Address string the status listener binds to. IPv6 literals are
    /// bracketed so the port stays separable.
    #[must_use]
    pub fn listen_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    #[must_use]
    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            stderr_ceiling: self.stderr_ceiling,
            kill_grace: self.kill_grace,
        }
    }
}

/// Resolves the run profiles file path.
///
/// If a custom path is provided, uses that path. Otherwise, uses the default
/// profiles path. Shell expansions like `~` are resolved.
///
/// # Examples
///
/// ```
/// use runwatch_core::config::get_profiles_path;
///
/// // Use default path
/// let default_path = get_profiles_path(&None);
///
/// // Use custom path
/// let custom_path = get_profiles_path(&Some("/path/to/profiles.yml".to_string()));
/// ```
pub fn get_profiles_path(profiles_path_arg: &Option<String>) -> String {
    let profiles_path = match profiles_path_arg {
        Some(profiles_path) => profiles_path,
        None => DEFAULT_PROFILES_PATH,
    };

    shellexpand::tilde(profiles_path).to_string()
}

/// Expands shell variables in a working directory path.
///
/// Returns None if no working directory is provided.
///
/// # Examples
///
/// ```
/// use runwatch_core::config::expand_working_directory;
///
/// // Expand tilde
/// let expanded = expand_working_directory(&Some("~/projects".to_string()));
/// assert!(expanded.is_some());
///
/// // Handle None input
/// let none_result = expand_working_directory(&None);
/// assert!(none_result.is_none());
/// ```
pub fn expand_working_directory(working_directory: &Option<String>) -> Option<String> {
    working_directory
        .as_ref()
        .map(|working_directory| shellexpand::tilde(working_directory).to_string())
}
