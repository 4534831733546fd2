use std::num::NonZeroUsize;

use tracing::{debug, info};

use super::{
    batch_params,
    query_builder::{parse_identifiers, InsertStatement, QualifiedName},
    row_width, LoadError, LoadReport,
};
use crate::{
    database::postgres::{
        client::{Connection, ConnectionProvider},
        sql_type_wrapper::Row,
    },
    helpers::batches,
};

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct BulkInsertOptions {
    pub batch_size: NonZeroUsize,
    pub target_fields: Option<Vec<String>>,
}

impl Default for BulkInsertOptions {
    fn default() -> Self {
        BulkInsertOptions {
            batch_size: NonZeroUsize::new(DEFAULT_INSERT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            target_fields: None,
        }
    }
}

impl BulkInsertOptions {
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_target_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.target_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Inserts `rows` into `table`, one multi-row `INSERT` and one commit per batch.
///
/// Rows are inserted in input order. Values are bound positionally and are not checked against
/// the table's column types. Returns the number of rows loaded once every batch is committed.
pub async fn insert_rows_batch<P: ConnectionProvider>(
    provider: &P,
    table: &str,
    rows: &[Row],
    options: &BulkInsertOptions,
) -> Result<LoadReport, LoadError> {
    let table_name = QualifiedName::parse(table)?;
    // An empty column list means the same as none
    let target_fields = options
        .target_fields
        .as_deref()
        .filter(|fields| !fields.is_empty())
        .map(parse_identifiers)
        .transpose()?;
    let statement = InsertStatement::new(&table_name, target_fields.as_deref());

    let width = row_width(rows, target_fields.as_ref().map(Vec::len))?;
    let mut report = LoadReport::default();

    if rows.is_empty() {
        info!("Done loading. Loaded a total of {} rows.", report.total_rows);
        return Ok(report);
    }

    // Render the largest statement up front so a parameter overflow fails before connecting
    statement.render(options.batch_size.get().min(rows.len()), width)?;

    let mut connection = provider.connect().await?;

    for batch in batches(rows, options.batch_size) {
        let sql = statement.render(batch.len(), width)?;
        debug!("Bulk insert statement: {}", sql);

        connection.execute(&sql, &batch_params(batch)).await?;
        connection.commit().await?;

        report.record_batch(batch.len());
        info!("Loaded {} rows into {} so far.", report.total_rows, table);
    }

    info!("Done loading. Loaded a total of {} rows.", report.total_rows);
    connection.close().await;

    Ok(report)
}
