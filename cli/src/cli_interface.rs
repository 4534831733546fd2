use std::{num::NonZeroUsize, path::PathBuf};

use batchload::{
    manifest::yaml::YAML_CONFIG_NAME, DEFAULT_INSERT_BATCH_SIZE, DEFAULT_UPSERT_BATCH_SIZE,
};
use clap::{Args, Parser, Subcommand};

const fn non_zero(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => NonZeroUsize::MIN,
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "batchload", about = "Load CSV files into PostgreSQL in committed batches", version)]
pub struct CLI {
    /// Config file holding the DB section. Falls back to DATABASE_URL when the default file is
    /// missing.
    #[clap(long, short, global = true, default_value = YAML_CONFIG_NAME)]
    pub config: PathBuf,

    /// error, warn, info, debug or trace.
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Target table, optionally schema qualified.
    #[clap(long, short)]
    pub table: String,

    /// CSV file holding the rows.
    #[clap(long, short)]
    pub file: PathBuf,

    /// The first CSV line is data, not a header.
    #[clap(long)]
    pub no_header: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inserts every CSV row, committing after each batch.
    ///
    /// Example:
    /// `batchload insert --table people --file people.csv --batch-size 1000`
    #[clap(name = "insert")]
    Insert {
        #[clap(flatten)]
        source: SourceArgs,

        /// Columns to fill, in CSV order. Defaults to the CSV header when present.
        #[clap(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        #[clap(long, default_value_t = non_zero(DEFAULT_INSERT_BATCH_SIZE))]
        batch_size: NonZeroUsize,
    },

    /// Inserts every CSV row, updating rows whose primary key already exists.
    ///
    /// Example:
    /// `batchload upsert --table people --file people.csv --pk id --columns id,name,email`
    #[clap(name = "upsert")]
    Upsert {
        #[clap(flatten)]
        source: SourceArgs,

        /// Primary key column(s).
        #[clap(long, value_delimiter = ',', required = true)]
        pk: Vec<String>,

        /// Every column of the table, in table order.
        #[clap(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Primary key constraint name, defaults to <table>_pkey.
        #[clap(long)]
        pk_name: Option<String>,

        /// Schema prefixed to the table unless it is already qualified.
        #[clap(long)]
        schema: Option<String>,

        /// Explicit column list for the INSERT.
        #[clap(long, value_delimiter = ',')]
        target_fields: Option<Vec<String>>,

        #[clap(long, default_value_t = non_zero(DEFAULT_UPSERT_BATCH_SIZE))]
        batch_size: NonZeroUsize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert() {
        let cli = CLI::parse_from([
            "batchload",
            "insert",
            "--table",
            "people",
            "--file",
            "people.csv",
            "--columns",
            "id,name",
        ]);

        assert_eq!(cli.config, PathBuf::from(YAML_CONFIG_NAME));
        match cli.command {
            Commands::Insert { source, columns, batch_size } => {
                assert_eq!(source.table, "people");
                assert!(!source.no_header);
                assert_eq!(columns, Some(vec!["id".to_string(), "name".to_string()]));
                assert_eq!(batch_size.get(), DEFAULT_INSERT_BATCH_SIZE);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_upsert() {
        let cli = CLI::parse_from([
            "batchload", "upsert", "-t", "people", "-f", "people.csv", "--pk", "id", "--columns",
            "id,name", "--schema", "crm", "--batch-size", "20", "--config", "other.yaml",
        ]);

        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        match cli.command {
            Commands::Upsert { pk, columns, schema, batch_size, pk_name, .. } => {
                assert_eq!(pk, vec!["id".to_string()]);
                assert_eq!(columns, vec!["id".to_string(), "name".to_string()]);
                assert_eq!(schema.as_deref(), Some("crm"));
                assert_eq!(batch_size.get(), 20);
                assert!(pk_name.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = CLI::try_parse_from([
            "batchload", "insert", "--table", "t", "--file", "t.csv", "--batch-size", "0",
        ]);
        assert!(result.is_err());
    }
}
