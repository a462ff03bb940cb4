use leon::{ParseError, RenderError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Title shown for failures of the telemetry socket.
pub const LISTENER_ERROR_TITLE: &str = "Unable to Start Status Listener";
/// Title shown for engine spawn failures and non-zero exits.
pub const ENGINE_ERROR_TITLE: &str = "Unable to Start Script Engine";
/// Title shown when a configured run timeout elapses.
pub const TIMEOUT_ERROR_TITLE: &str = "Run Timed Out";
/// Title shown for everything else (configuration, IO).
pub const CONFIGURATION_ERROR_TITLE: &str = "Invalid Run Configuration";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Status listener error on `{}`: {}", .address, .original)]
    Listener {
        address: String,
        original: std::io::Error,
    },

    #[error("Failed to launch `{}`: {}", .command, .original)]
    Launch {
        command: String,
        original: std::io::Error,
    },

    #[error("{}", process_exit_message(.code, .stderr))]
    ProcessExit { code: Option<i32>, stderr: String },

    #[error("Terminal error: {}", .0)]
    Terminal(#[from] std::io::Error),

    #[error("The engine process is not running.")]
    ProcessNotRunning,

    #[error("Run exceeded the configured timeout of {:?}.", .0)]
    Timeout(std::time::Duration),

    #[error("Error {} {} file at `{}`: {}", .action, .file_description, .path, .original)]
    Yaml {
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    },

    #[error("IO error with {} file at path `{}`: {}", .file_description, .path, .original)]
    Io {
        file_description: String,
        path: String,
        original: std::io::Error,
    },

    #[error("No run profiles were found in `{}`. Is it empty?", .path)]
    EmptyProfiles { path: String },

    #[error("No run profile with ID `{}`", .0)]
    ProfileNotFound(String),

    #[error("Found a non-unique profile ID: `{}`", .0)]
    NonUniqueProfileId(String),

    #[error("Invalid ID: ID may not be empty")]
    EmptyId,

    #[error("Invalid ID `{}`: ID may not contain spaces", .0)]
    IdWithSpace(String),

    #[error("Invalid ID `{}`: ID cannot be purely numeric", .0)]
    NumericId(String),

    #[error("Unknown placeholder in engine command of profile {}: `{}`", .0, .1)]
    UnknownPlaceholder(String, String),

    #[error("No test scripts were given to run.")]
    NoScripts,

    #[error("No engine command was given.")]
    EmptyEngineCommand,

    #[error("Error parsing placeholder string: {}", .0)]
    Parse(#[from] ParseError),

    #[error("Error rendering placeholder template string: {}", .0)]
    Render(#[from] RenderError),
}

fn process_exit_message(code: &Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match (code, stderr.is_empty()) {
        (Some(code), true) => format!("Engine exited with code {code}"),
        (None, true) => "Engine was terminated by a signal".to_string(),
        (_, false) => stderr.to_string(),
    }
}

impl Error {
    pub fn listener_error(address: String, original: std::io::Error) -> Self {
        Self::Listener { address, original }
    }

    pub fn launch_error(command: String, original: std::io::Error) -> Self {
        Self::Launch { command, original }
    }

    pub fn empty_profiles(path: String) -> Self {
        Self::EmptyProfiles { path }
    }

    pub fn yaml_error(
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    ) -> Self {
        Self::Yaml {
            action,
            file_description,
            path,
            original,
        }
    }

    pub fn io_error(file_description: String, path: String, original: std::io::Error) -> Self {
        Self::Io {
            file_description,
            path,
            original,
        }
    }

    /// The title a view should show above this error's message.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Listener { .. } => LISTENER_ERROR_TITLE,
            Self::Launch { .. } | Self::ProcessExit { .. } | Self::ProcessNotRunning => {
                ENGINE_ERROR_TITLE
            }
            Self::Timeout(_) => TIMEOUT_ERROR_TITLE,
            _ => CONFIGURATION_ERROR_TITLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exit_uses_stderr_text() {
        let error = Error::ProcessExit {
            code: Some(2),
            stderr: "engine crashed\n".to_string(),
        };
        assert_eq!(error.to_string(), "engine crashed");
        assert_eq!(error.title(), ENGINE_ERROR_TITLE);
    }

    #[test]
    fn test_process_exit_without_stderr_mentions_code() {
        let error = Error::ProcessExit {
            code: Some(3),
            stderr: String::new(),
        };
        assert_eq!(error.to_string(), "Engine exited with code 3");
    }

    #[test]
    fn test_timeout_keeps_sub_second_precision() {
        let error = Error::Timeout(std::time::Duration::from_millis(300));
        assert_eq!(error.to_string(), "Run exceeded the configured timeout of 300ms.");
        assert_eq!(error.title(), TIMEOUT_ERROR_TITLE);
    }

    #[test]
    fn test_listener_title_differs_from_engine_title() {
        let error = Error::listener_error(
            "127.0.0.1:5555".to_string(),
            std::io::Error::from(std::io::ErrorKind::AddrInUse),
        );
        assert_eq!(error.title(), LISTENER_ERROR_TITLE);
        assert_ne!(error.title(), ENGINE_ERROR_TITLE);
    }
}
