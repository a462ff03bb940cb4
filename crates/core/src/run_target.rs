use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::process::Stdio;
use std::time::Duration;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::{expand_working_directory, SessionSettings};
use crate::error::{Error, Result};
use crate::interpolation::{build_context, interpolate};

/// Flag the engine reads its telemetry port from.
pub const PORT_FLAG: &str = "--port";
/// Flag the engine reads a configuration file override from.
pub const CONFIG_FILE_FLAG: &str = "--config_file";

/// A named, reusable run configuration as stored in the profiles YAML.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RunProfile {
    pub id: String,
    pub description: Option<String>,
    pub engine: Option<String>,
    pub working_directory: Option<String>,
    pub config_file: Option<String>,
    #[serde(default)]
    pub scripts: Vec<String>,
    pub environment: Option<HashMap<String, String>>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
}

impl Display for RunProfile {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(formatter, "{} ({})", self.id, description),
            None => formatter.write_str(&self.id),
        }
    }
}

impl RunProfile {
    /// Applies this profile's telemetry and timeout overrides to `settings`.
    pub fn apply_to(&self, settings: &mut SessionSettings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            settings.run_timeout = Some(Duration::from_secs(timeout_secs));
        }
    }
}

/// What a session executes: the engine invocation plus the scripts handed to it.
///
/// Built once and then owned by the session; there are no setters after
/// construction, only the consuming `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    engine: String,
    scripts: Vec<String>,
    config_file: Option<String>,
    working_directory: Option<String>,
    environment: HashMap<String, String>,
}

impl RunTarget {
    /// Creates a target, dropping repeated script paths while keeping order.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine command is blank or no scripts are given.
    pub fn new<I, S>(engine: impl Into<String>, scripts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = engine.into().trim().to_string();
        if engine.is_empty() {
            return Err(Error::EmptyEngineCommand);
        }

        let scripts: IndexSet<String> = scripts
            .into_iter()
            .map(Into::into)
            .filter(|script: &String| !script.trim().is_empty())
            .collect();
        if scripts.is_empty() {
            return Err(Error::NoScripts);
        }

        Ok(Self {
            engine,
            scripts: scripts.into_iter().collect(),
            config_file: None,
            working_directory: None,
            environment: HashMap::new(),
        })
    }

    /// Builds a target from a stored profile, rendering `{project_dir}` and
    /// `{home}` placeholders in the engine command.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile has no engine, no scripts, or the
    /// engine command references an unknown placeholder.
    pub fn from_profile(profile: &RunProfile) -> Result<Self> {
        let engine = profile.engine.as_ref().ok_or(Error::EmptyEngineCommand)?;
        let working_directory = expand_working_directory(&profile.working_directory);
        let context = build_context(working_directory.as_deref());
        let engine = interpolate(engine, &context)?;

        let mut target = Self::new(engine, profile.scripts.iter().cloned())?
            .with_config_file(profile.config_file.clone())
            .with_working_directory(working_directory);

        if let Some(environment) = &profile.environment {
            target = target.with_environment(environment.clone());
        }

        Ok(target)
    }

    #[must_use]
    pub fn with_config_file(mut self, config_file: Option<String>) -> Self {
        self.config_file = config_file.map(|path| shellexpand::tilde(&path).to_string());
        self
    }

    #[must_use]
    pub fn with_working_directory(mut self, working_directory: Option<String>) -> Self {
        self.working_directory = expand_working_directory(&working_directory);
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    pub fn config_file(&self) -> Option<&str> {
        self.config_file.as_deref()
    }

    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// The single shell command line handed to the shell with `-c`.
    ///
    /// The engine string is used verbatim so users can put interpreter flags
    /// in it; script and config paths are quoted.
    #[must_use]
    pub fn shell_command(&self, port: u16) -> String {
        let mut parts = vec![self.engine.clone(), PORT_FLAG.to_string(), port.to_string()];

        if let Some(config_file) = &self.config_file {
            parts.push(CONFIG_FILE_FLAG.to_string());
            parts.push(shell_quote(config_file));
        }

        parts.extend(self.scripts.iter().map(|script| shell_quote(script)));
        parts.join(" ")
    }

    /// Builds the engine process command with piped standard streams.
    #[must_use]
    pub fn command(&self, shell: &str, port: u16) -> Command {
        let mut command = Command::new(shell);
        command
            .arg("-c")
            .arg(self.shell_command(port))
            .envs(&self.environment)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_directory) = &self.working_directory {
            command.current_dir(working_directory);
        }

        command
    }
}

impl Display for RunTarget {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({} scripts)", self.engine, self.scripts.len())
    }
}

fn shell_quote(value: &str) -> String {
    let is_safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));

    if is_safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
