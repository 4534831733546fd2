use std::{num::NonZeroUsize, path::Path};

use batchload::{upsert, UpsertTarget};

use super::{connection_provider, load_source};
use crate::{
    cli_interface::SourceArgs,
    console::{print_error_message, print_success_message, print_warn_message},
};

pub struct UpsertDetails {
    pub pk: Vec<String>,
    pub columns: Vec<String>,
    pub pk_name: Option<String>,
    pub schema: Option<String>,
    pub target_fields: Option<Vec<String>>,
    pub batch_size: NonZeroUsize,
}

impl UpsertDetails {
    pub fn target(&self, table: &str) -> UpsertTarget {
        let mut target =
            UpsertTarget::new(table, self.pk.iter().cloned(), self.columns.iter().cloned());
        target.pk_name = self.pk_name.clone();
        target.schema = self.schema.clone();
        target.target_fields = self.target_fields.clone();
        target
    }
}

pub async fn handle_upsert_command(
    config_path: &Path,
    source: &SourceArgs,
    details: UpsertDetails,
) -> Result<(), String> {
    let target = details.target(&source.table);

    // Fail on a bad target before reading the file or touching the database
    target.statement().map_err(|e| {
        let message = format!("Invalid upsert target {}: {}", source.table, e);
        print_error_message(&message);
        message
    })?;

    let csv = load_source(source).await?;
    if let Some(header) = &csv.header {
        let expected = target.target_fields.as_ref().unwrap_or(&target.all_fields);
        if header != expected {
            print_warn_message(&format!(
                "CSV header {:?} differs from the upsert columns {:?}, values are bound by position",
                header, expected
            ));
        }
    }

    let provider = connection_provider(config_path)?;

    let report = upsert(&provider, &target, &csv.rows, details.batch_size).await.map_err(|e| {
        let message = format!("Could not upsert into {}: trace: {}", source.table, e);
        print_error_message(&message);
        message
    })?;

    print_success_message(&format!(
        "Upserted {} rows into {} in {} batches.",
        report.total_rows, source.table, report.batches
    ));

    Ok(())
}
