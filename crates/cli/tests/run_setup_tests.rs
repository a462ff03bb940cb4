//! Integration tests for building runs from profiles and flags.

use std::io::Write;
use std::time::Duration;

use runwatch_cli::cli_args::Args;
use runwatch_cli::run_setup::build_run;
use runwatch_core::error::Error;
use tempfile::NamedTempFile;

const PROFILES: &str = r#"
- id: "smoke"
  description: "Quick checks"
  engine: "{project_dir}/venv/bin/python run_ctf.py"
  working_directory: "/work/cfs"
  config_file: "configs/local.ini"
  scripts: ["scripts/a.json", "scripts/b.json", "scripts/a.json"]
  environment:
    CFS_TARGET: "sim"
  port: 6000
  timeout_secs: 120

- id: "nightly"
  engine: "python3 run_ctf.py"
  scripts: ["scripts/all.json"]
"#;

fn write_profiles() -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{PROFILES}").unwrap();
    temp_file
}

fn args_for(profile: &str, profiles: &NamedTempFile) -> Args {
    Args {
        profile: Some(profile.to_string()),
        profiles_path: Some(profiles.path().to_str().unwrap().to_string()),
        ..Args::default()
    }
}

#[test]
fn test_profile_becomes_run_target() {
    let profiles = write_profiles();
    let (target, settings) = build_run(&args_for("smoke", &profiles)).unwrap();

    assert_eq!(
        target.shell_command(settings.port),
        "/work/cfs/venv/bin/python run_ctf.py --port 6000 --config_file configs/local.ini scripts/a.json scripts/b.json"
    );
    assert_eq!(target.working_directory(), Some("/work/cfs"));
    assert_eq!(target.environment().get("CFS_TARGET"), Some(&"sim".to_string()));
    assert_eq!(settings.run_timeout, Some(Duration::from_secs(120)));
}

#[test]
fn test_flags_override_profile() {
    let profiles = write_profiles();
    let args = Args {
        port: Some(0),
        timeout: Some(5),
        scripts: vec!["scripts/one.json".to_string()],
        ..args_for("nightly", &profiles)
    };

    let (target, settings) = build_run(&args).unwrap();
    assert_eq!(target.scripts(), ["scripts/one.json"]);
    assert_eq!(settings.port, 0);
    assert_eq!(settings.listen_address(), "127.0.0.1:0");
    assert_eq!(settings.run_timeout, Some(Duration::from_secs(5)));
}

#[test]
fn test_unknown_profile() {
    let profiles = write_profiles();
    let result = build_run(&args_for("weekly", &profiles));
    assert!(matches!(result, Err(Error::ProfileNotFound(id)) if id == "weekly"));
}

#[test]
fn test_missing_profiles_file() {
    let args = Args {
        profile: Some("smoke".to_string()),
        profiles_path: Some("/this/path/does/not/exist.yml".to_string()),
        ..Args::default()
    };

    assert!(matches!(build_run(&args), Err(Error::Io { .. })));
}
