//! Command-line argument parsing.
//!
//! This module defines the command-line interface structure using the `clap`
//! crate. Flags given here override the matching fields of a run profile.

use clap::Parser;

/// Command-line arguments for the runwatch CLI tool.
///
/// # Examples
///
/// ```rust
/// use clap::Parser;
/// use runwatch_cli::cli_args::Args;
///
/// let args = Args::parse_from(["rw", "--engine", "python3 run_ctf.py", "scripts/a.json"]);
/// assert_eq!(args.scripts, vec!["scripts/a.json"]);
/// ```
#[derive(Parser, Debug, Default)] // requires `derive` feature
#[command(term_width = 0)] // Just to make testing across clap features easier
#[allow(clippy::struct_excessive_bools)]
pub struct Args {
    /// ID of the run profile to start from.
    #[arg(long, short = 'P')]
    pub profile: Option<String>,

    /// Path to the run profiles YAML.
    ///
    /// If not provided, defaults to `~/.runwatch/profiles.yml`.
    #[arg(long)]
    pub profiles_path: Option<String>,

    /// Engine invocation, e.g. `python3 run_ctf.py`.
    #[arg(long, short = 'e')]
    pub engine: Option<String>,

    /// Configuration file handed to the engine with `--config_file`.
    #[arg(long, short = 'c')]
    pub config_file: Option<String>,

    /// Directory the engine is started in.
    #[arg(long, short = 'w')]
    pub working_directory: Option<String>,

    /// UDP port to receive telemetry on. Use 0 for any free port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to receive telemetry on.
    #[arg(long)]
    pub host: Option<String>,

    /// Stop the run after this many seconds.
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,

    /// Answer yes to every confirmation the engine asks for.
    #[arg(long, short = 'y', action)]
    pub yes: bool,

    /// Print the engine invocation without running it.
    #[arg(long, short = 'd', action)]
    pub dry_run: bool,

    /// Test scripts to run, in order.
    #[arg(trailing_var_arg = true)]
    pub scripts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["rw"]);

        assert!(args.profile.is_none());
        assert!(args.profiles_path.is_none());
        assert!(args.engine.is_none());
        assert!(args.config_file.is_none());
        assert!(args.working_directory.is_none());
        assert!(args.port.is_none());
        assert!(args.host.is_none());
        assert!(args.timeout.is_none());
        assert!(!args.yes);
        assert!(!args.dry_run);
        assert!(args.scripts.is_empty());
    }

    #[test]
    fn test_args_short_flags() {
        let args = Args::parse_from([
            "rw",
            "-P",
            "smoke",
            "-e",
            "python3 run_ctf.py",
            "-c",
            "configs/local.ini",
            "-w",
            "/work/cfs",
            "-t",
            "60",
            "-y",
            "-d",
        ]);

        assert_eq!(args.profile, Some("smoke".to_string()));
        assert_eq!(args.engine, Some("python3 run_ctf.py".to_string()));
        assert_eq!(args.config_file, Some("configs/local.ini".to_string()));
        assert_eq!(args.working_directory, Some("/work/cfs".to_string()));
        assert_eq!(args.timeout, Some(60));
        assert!(args.yes);
        assert!(args.dry_run);
    }

    #[test]
    fn test_args_long_flags() {
        let args = Args::parse_from([
            "rw",
            "--profile",
            "nightly",
            "--profiles-path",
            "/custom/profiles.yml",
            "--port",
            "6000",
            "--host",
            "0.0.0.0",
            "--yes",
            "--dry-run",
        ]);

        assert_eq!(args.profile, Some("nightly".to_string()));
        assert_eq!(args.profiles_path, Some("/custom/profiles.yml".to_string()));
        assert_eq!(args.port, Some(6000));
        assert_eq!(args.host, Some("0.0.0.0".to_string()));
        assert!(args.yes);
        assert!(args.dry_run);
    }

    #[test]
    fn test_args_scripts_keep_order() {
        let args = Args::parse_from(["rw", "-P", "smoke", "b.json", "a.json", "c.json"]);
        assert_eq!(args.scripts, vec!["b.json", "a.json", "c.json"]);
    }

    #[test]
    fn test_args_invalid_port_rejected() {
        let result = Args::try_parse_from(["rw", "--port", "70000"]);
        assert!(result.is_err());
    }
}
