//! Batched bulk insert and upsert into PostgreSQL.
//!
//! Both loaders open one connection per call and walk the rows batch by batch. Every batch is a
//! single multi-row statement followed by a commit, so a failure leaves all earlier batches
//! applied and the failing one rolled back. There are no retries.

mod insert;
mod query_builder;
#[cfg(test)]
mod recording;
mod upsert;

pub use insert::{insert_rows_batch, BulkInsertOptions, DEFAULT_INSERT_BATCH_SIZE};
pub use query_builder::{
    Identifier, IdentifierError, InsertStatement, QualifiedName, StatementError, UpsertStatement,
    MAX_BIND_PARAMETERS,
};
pub use upsert::{
    upsert, UpsertStatements, UpsertTarget, UpsertTargetError, DEFAULT_UPSERT_BATCH_SIZE,
};

use crate::database::postgres::{
    client::{PostgresConnectionError, PostgresError, ToSql},
    sql_type_wrapper::Row,
};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{0}")]
    Connection(#[from] PostgresConnectionError),

    #[error("{0}")]
    Postgres(#[from] PostgresError),

    #[error("{0}")]
    Identifier(#[from] IdentifierError),

    #[error("{0}")]
    Statement(#[from] StatementError),

    #[error("{0}")]
    Target(#[from] UpsertTargetError),

    #[error("Row {row} has {found} values but {expected} were expected")]
    RowArityMismatch { row: usize, expected: usize, found: usize },

    #[error("No statement was prepared for a batch of {0} rows")]
    NoStatementForBatch(usize),
}

/// Outcome of a completed load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub batches: usize,
}

impl LoadReport {
    fn record_batch(&mut self, rows: usize) {
        self.total_rows += rows;
        self.batches += 1;
    }
}

/// Checks every row has the same number of values and returns it.
///
/// `expected` pins the width (an explicit column list); otherwise the first row decides.
fn row_width(rows: &[Row], expected: Option<usize>) -> Result<usize, LoadError> {
    let width = match expected.or_else(|| rows.first().map(Vec::len)) {
        Some(width) => width,
        None => return Ok(0),
    };

    match rows.iter().position(|row| row.len() != width) {
        Some(row) => {
            Err(LoadError::RowArityMismatch { row, expected: width, found: rows[row].len() })
        }
        None => Ok(width),
    }
}

fn batch_params(batch: &[Row]) -> Vec<&(dyn ToSql + Sync)> {
    batch.iter().flatten().map(|value| value as &(dyn ToSql + Sync)).collect()
}
