//! File handling and validation for runwatch profiles.
//!
//! This module reads the run profiles YAML and validates profile IDs and the
//! placeholders used in their engine commands.

use std::collections::HashSet;
use std::fs::File;

use crate::error::Error::{EmptyId, IdWithSpace, NonUniqueProfileId, NumericId, UnknownPlaceholder};
use crate::error::{Error, Result};
use crate::interpolation::{get_tokens, HOME_KEY, PROJECT_DIR_KEY};
use crate::run_target::RunProfile;

fn get_reader(file_description: &str, path: &str) -> Result<File> {
    File::open(path).map_err(|e| Error::io_error(file_description.to_string(), path.to_string(), e))
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(EmptyId);
    }

    if id.contains(' ') {
        return Err(IdWithSpace(id.to_string()));
    }

    if id.chars().all(|c| c.is_numeric()) {
        return Err(NumericId(id.to_string()));
    }

    Ok(())
}

fn validate_engine_placeholders(profile: &RunProfile) -> Result<()> {
    let Some(engine) = &profile.engine else {
        return Ok(());
    };

    for token in get_tokens(engine)? {
        let known = token == HOME_KEY
            || (token == PROJECT_DIR_KEY && profile.working_directory.is_some());

        if !known {
            return Err(UnknownPlaceholder(profile.id.clone(), token));
        }
    }

    Ok(())
}

fn validate_profiles(profiles: &[RunProfile]) -> Result<()> {
    let mut ids = HashSet::new();

    for profile in profiles {
        validate_id(&profile.id)?;

        if !ids.insert(profile.id.clone()) {
            return Err(NonUniqueProfileId(profile.id.clone()));
        }

        validate_engine_placeholders(profile)?;
    }

    Ok(())
}

/// Loads and validates run profiles from a YAML file.
///
/// # Errors
///
/// Returns an error if:
/// - The profiles file cannot be read
/// - The YAML is malformed or doesn't match the expected structure
/// - The file contains no profiles
/// - Profile IDs are invalid or non-unique
/// - An engine command references a placeholder that cannot be filled
///
/// # Examples
///
/// ```no_run
/// use runwatch_core::file_handling::get_run_profiles;
///
/// let profiles = get_run_profiles("~/.runwatch/profiles.yml")?;
/// println!("Loaded {} profiles", profiles.len());
/// # Ok::<(), runwatch_core::error::Error>(())
/// ```
pub fn get_run_profiles(profiles_path: &str) -> Result<Vec<RunProfile>> {
    let profiles_path = shellexpand::tilde(profiles_path).to_string();
    let reader = get_reader("profiles", &profiles_path)?;

    let profiles: Vec<RunProfile> = serde_yaml::from_reader(reader).map_err(|e| {
        Error::yaml_error(
            "reading".to_string(),
            "profiles".to_string(),
            profiles_path.clone(),
            e,
        )
    })?;

    if profiles.is_empty() {
        return Err(Error::empty_profiles(profiles_path));
    }

    validate_profiles(&profiles)?;

    Ok(profiles)
}

/// Finds a profile by ID.
///
/// # Errors
///
/// Returns [`Error::ProfileNotFound`] if no profile has the given ID.
pub fn find_profile<'a>(profiles: &'a [RunProfile], id: &str) -> Result<&'a RunProfile> {
    profiles
        .iter()
        .find(|profile| profile.id == id)
        .ok_or_else(|| Error::ProfileNotFound(id.to_string()))
}
