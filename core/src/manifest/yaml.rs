use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    helpers::{load_env_for_config, substitute_env_variables, SubstituteEnvError},
    manifest::db::{ConnectionParams, ConnectionParamsError, DbDetails},
};

pub const YAML_CONFIG_NAME: &str = "batchload.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConfigFile {
    #[serde(rename = "DB", default, skip_serializing_if = "Option::is_none")]
    pub db: Option<DbDetails>,
}

#[derive(thiserror::Error, Debug)]
pub enum ReadConfigError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    CouldNotParseConfig(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] SubstituteEnvError),

    #[error("Config {0} has no DB section")]
    MissingDbSection(PathBuf),

    #[error("{0}")]
    InvalidConnectionParams(#[from] ConnectionParamsError),
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, ReadConfigError> {
    let contents = substitute_env_variables(contents)?;
    let config: ConfigFile = serde_yaml::from_str(&contents)?;
    Ok(config)
}

pub fn read_config(file_path: &Path) -> Result<ConfigFile, ReadConfigError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    load_env_for_config(file_path);

    parse_config(&contents)
}

/// Reads the `DB` section of `file_path` into connection parameters.
pub fn read_connection_params(file_path: &Path) -> Result<ConnectionParams, ReadConfigError> {
    let config = read_config(file_path)?;
    let details =
        config.db.ok_or_else(|| ReadConfigError::MissingDbSection(file_path.to_path_buf()))?;

    debug!("Read DB section from {}", file_path.display());

    Ok(ConnectionParams::from_details(&details)?)
}
