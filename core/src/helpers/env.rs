use std::{env, path::Path};

use dotenv::{dotenv, from_path};
use regex::{Captures, Regex};
use tracing::{error, warn};

#[derive(thiserror::Error, Debug)]
pub enum SubstituteEnvError {
    #[error("Environment variable {0} not found")]
    MissingVariable(String),

    #[error("Could not build the env substitution pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Replaces every `${VAR}` in `contents` with the value of the environment variable `VAR`.
pub fn substitute_env_variables(contents: &str) -> Result<String, SubstituteEnvError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;
    let mut missing = None;

    let result = re.replace_all(contents, |caps: &Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                error!("Environment variable {} not found", var_name);
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(SubstituteEnvError::MissingVariable(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// Loads the `.env` file sitting next to `config_path`, falling back to the working directory.
pub fn load_env_for_config(config_path: &Path) {
    let env_file = config_path.parent().map(|dir| dir.join(".env"));

    match env_file {
        Some(path) if path.exists() => {
            if let Err(e) = from_path(&path) {
                warn!("Could not load env file {}: {}", path.display(), e);
            }
        }
        _ => {
            dotenv().ok();
        }
    }
}
