mod insert;
mod upsert;

use std::path::Path;

use batchload::{
    manifest::{
        db::ConnectionParams,
        yaml::{read_connection_params, YAML_CONFIG_NAME},
    },
    read_csv_rows, CsvRows, PostgresConnectionProvider,
};
pub use insert::handle_insert_command;
pub use upsert::{handle_upsert_command, UpsertDetails};

use crate::{cli_interface::SourceArgs, console::print_error_message};

/// Reads the DB section from `config_path`; when the default config file is absent, falls back
/// to `DATABASE_URL`.
pub fn load_connection_params(config_path: &Path) -> Result<ConnectionParams, String> {
    if !config_path.exists() && config_path == Path::new(YAML_CONFIG_NAME) {
        return ConnectionParams::from_env().map_err(|e| {
            let message = format!(
                "No {} found and DATABASE_URL is not usable, add a DB section or set DATABASE_URL: trace: {}",
                YAML_CONFIG_NAME, e
            );
            print_error_message(&message);
            message
        });
    }

    read_connection_params(config_path).map_err(|e| {
        let message =
            format!("Could not read the DB section from {}: trace: {}", config_path.display(), e);
        print_error_message(&message);
        message
    })
}

pub fn connection_provider(config_path: &Path) -> Result<PostgresConnectionProvider, String> {
    Ok(PostgresConnectionProvider::new(load_connection_params(config_path)?))
}

pub async fn load_source(source: &SourceArgs) -> Result<CsvRows, String> {
    read_csv_rows(&source.file, !source.no_header).await.map_err(|e| {
        let message = format!("Could not read {}: trace: {}", source.file.display(), e);
        print_error_message(&message);
        message
    })
}
