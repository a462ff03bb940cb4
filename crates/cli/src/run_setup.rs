//! Turning command-line arguments and run profiles into something to run.

use itertools::Itertools;
use log::debug;
use runwatch_core::config::{self, SessionSettings};
use runwatch_core::error::Result;
use runwatch_core::file_handling;
use runwatch_core::run_target::{RunProfile, RunTarget};

use crate::cli_args::Args;

/// ID given to the profile assembled from command-line flags alone.
const COMMAND_LINE_PROFILE_ID: &str = "command-line";

/// Loads the requested profile, if any, and lays the command-line flags over it.
///
/// # Errors
///
/// Returns an error if the profiles file cannot be loaded or the profile
/// does not exist.
pub fn resolve_profile(args: &Args) -> Result<RunProfile> {
    let base = match &args.profile {
        Some(profile_id) => {
            let profiles_path = config::get_profiles_path(&args.profiles_path);
            debug!("Profiles path: `{profiles_path}`");

            let profiles = file_handling::get_run_profiles(&profiles_path)?;
            file_handling::find_profile(&profiles, profile_id)?.clone()
        }
        None => RunProfile {
            id: COMMAND_LINE_PROFILE_ID.to_string(),
            description: None,
            engine: None,
            working_directory: None,
            config_file: None,
            scripts: Vec::new(),
            environment: None,
            host: None,
            port: None,
            timeout_secs: None,
        },
    };

    Ok(apply_args(base, args))
}

/// Command-line flags win over profile fields; scripts given on the command
/// line replace the profile's list instead of extending it.
pub fn apply_args(mut profile: RunProfile, args: &Args) -> RunProfile {
    if args.engine.is_some() {
        profile.engine.clone_from(&args.engine);
    }
    if args.config_file.is_some() {
        profile.config_file.clone_from(&args.config_file);
    }
    if args.working_directory.is_some() {
        profile.working_directory.clone_from(&args.working_directory);
    }
    if !args.scripts.is_empty() {
        profile.scripts.clone_from(&args.scripts);
    }
    if args.host.is_some() {
        profile.host.clone_from(&args.host);
    }
    if args.port.is_some() {
        profile.port = args.port;
    }
    if args.timeout.is_some() {
        profile.timeout_secs = args.timeout;
    }

    profile
}

/// Builds the run target and session settings for `args`.
///
/// # Errors
///
/// Returns an error if the profile cannot be resolved, no engine or scripts
/// were given, or the engine command has an unknown placeholder.
pub fn build_run(args: &Args) -> Result<(RunTarget, SessionSettings)> {
    let profile = resolve_profile(args)?;
    let target = RunTarget::from_profile(&profile)?;

    let mut settings = SessionSettings::default();
    profile.apply_to(&mut settings);

    Ok((target, settings))
}

/// Prints what would be executed, for dry runs.
pub fn print_invocation(target: &RunTarget, settings: &SessionSettings) {
    println!(
        "Executing engine:\n{} -c \"{}\"",
        settings.shell,
        target.shell_command(settings.port)
    );

    if let Some(working_directory) = target.working_directory() {
        println!("In directory: {working_directory}");
    }

    if !target.environment().is_empty() {
        println!("With environment:");
        for (key, value) in target.environment().iter().sorted() {
            println!("\t\"{key}\": \"{value}\"");
        }
    }

    println!("Telemetry expected on {}", settings.listen_address());

    if let Some(timeout) = settings.run_timeout {
        println!("Run timeout: {} seconds", timeout.as_secs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwatch_core::error::Error;

    fn profile() -> RunProfile {
        RunProfile {
            id: "smoke".to_string(),
            description: None,
            engine: Some("python3 run_ctf.py".to_string()),
            working_directory: None,
            config_file: Some("configs/default.ini".to_string()),
            scripts: vec!["a.json".to_string(), "b.json".to_string()],
            environment: None,
            host: None,
            port: Some(6000),
            timeout_secs: None,
        }
    }

    #[test]
    fn test_apply_args_overrides_fields() {
        let args = Args {
            config_file: Some("configs/local.ini".to_string()),
            port: Some(7000),
            timeout: Some(90),
            ..Args::default()
        };

        let merged = apply_args(profile(), &args);
        assert_eq!(merged.engine, Some("python3 run_ctf.py".to_string()));
        assert_eq!(merged.config_file, Some("configs/local.ini".to_string()));
        assert_eq!(merged.port, Some(7000));
        assert_eq!(merged.timeout_secs, Some(90));
        assert_eq!(merged.scripts, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_apply_args_scripts_replace_profile_scripts() {
        let args = Args {
            scripts: vec!["c.json".to_string()],
            ..Args::default()
        };

        let merged = apply_args(profile(), &args);
        assert_eq!(merged.scripts, vec!["c.json"]);
    }

    #[test]
    fn test_build_run_from_flags_only() {
        let args = Args {
            engine: Some("python3 run_ctf.py".to_string()),
            port: Some(0),
            scripts: vec!["a.json".to_string()],
            ..Args::default()
        };

        let (target, settings) = build_run(&args).unwrap();
        assert_eq!(target.shell_command(settings.port), "python3 run_ctf.py --port 0 a.json");
        assert!(settings.run_timeout.is_none());
    }

    #[test]
    fn test_build_run_without_engine() {
        let args = Args {
            scripts: vec!["a.json".to_string()],
            ..Args::default()
        };

        assert!(matches!(build_run(&args), Err(Error::EmptyEngineCommand)));
    }

    #[test]
    fn test_build_run_without_scripts() {
        let args = Args {
            engine: Some("python3 run_ctf.py".to_string()),
            ..Args::default()
        };

        assert!(matches!(build_run(&args), Err(Error::NoScripts)));
    }
}
