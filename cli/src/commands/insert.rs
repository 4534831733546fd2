use std::{num::NonZeroUsize, path::Path};

use batchload::{insert_rows_batch, BulkInsertOptions};

use super::{connection_provider, load_source};
use crate::{
    cli_interface::SourceArgs,
    console::{print_error_message, print_success_message},
};

pub async fn handle_insert_command(
    config_path: &Path,
    source: &SourceArgs,
    columns: Option<Vec<String>>,
    batch_size: NonZeroUsize,
) -> Result<(), String> {
    let csv = load_source(source).await?;
    let provider = connection_provider(config_path)?;

    let mut options = BulkInsertOptions::default().with_batch_size(batch_size);
    options.target_fields = columns.or(csv.header);

    let report =
        insert_rows_batch(&provider, &source.table, &csv.rows, &options).await.map_err(|e| {
            let message = format!("Could not insert into {}: trace: {}", source.table, e);
            print_error_message(&message);
            message
        })?;

    print_success_message(&format!(
        "Inserted {} rows into {} in {} batches.",
        report.total_rows, source.table, report.batches
    ));

    Ok(())
}
