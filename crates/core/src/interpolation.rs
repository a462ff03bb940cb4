use std::collections::HashMap;

use indexmap::IndexSet;
use leon::Template;

use crate::error::Result;

/// Placeholder for the profile's working directory in an engine command.
pub const PROJECT_DIR_KEY: &str = "project_dir";
/// Placeholder for the user's home directory in an engine command.
pub const HOME_KEY: &str = "home";

/// Builds the values available to `{...}` placeholders in an engine command.
pub fn build_context(working_directory: Option<&str>) -> HashMap<String, String> {
    let mut context = HashMap::new();

    context.insert(HOME_KEY.to_string(), shellexpand::tilde("~").to_string());

    if let Some(working_directory) = working_directory {
        context.insert(PROJECT_DIR_KEY.to_string(), working_directory.to_string());
    }

    context
}

/// Find all placeholder tokens in a template string, in order of appearance.
pub fn get_tokens(template: &str) -> Result<IndexSet<String>> {
    let template = Template::parse(template)?;

    Ok(template.keys().map(|key| (*key).to_string()).collect())
}

pub fn interpolate(template: &str, context: &HashMap<String, String>) -> Result<String> {
    let template = Template::parse(template)?;

    Ok(template.render(context)?)
}
