mod cli_interface;
mod commands;
mod console;

use batchload::{parse_log_level, setup_logger, LogSettings};
use clap::Parser;

use crate::{
    cli_interface::{Commands, CLI},
    commands::{handle_insert_command, handle_upsert_command, UpsertDetails},
    console::print_error_message,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();

    let level = parse_log_level(&cli.log_level).map_err(|e| {
        print_error_message(&format!("Invalid log level {}: {}", cli.log_level, e));
        e
    })?;
    setup_logger(LogSettings { level, ..Default::default() });

    match cli.command {
        Commands::Insert { source, columns, batch_size } => {
            handle_insert_command(&cli.config, &source, columns, batch_size).await?
        }
        Commands::Upsert { source, pk, columns, pk_name, schema, target_fields, batch_size } => {
            let details = UpsertDetails { pk, columns, pk_name, schema, target_fields, batch_size };
            handle_upsert_command(&cli.config, &source, details).await?
        }
    }

    Ok(())
}
