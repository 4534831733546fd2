use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tokio::task::JoinError;

use crate::database::postgres::sql_type_wrapper::{Row, SqlValue};

#[derive(thiserror::Error, Debug)]
pub enum ReadCsvError {
    #[error("Could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV read task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvRows {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Row>,
}

/// Infers a value from a CSV cell: empty is `Null`, then bool, integer, float, else text.
///
/// Typed guesses keep the cell text, so a text column receives the cell exactly as written.
pub fn infer_sql_value(cell: &str) -> SqlValue {
    if cell.is_empty() {
        return SqlValue::Null;
    }

    let value = match cell {
        "true" | "TRUE" | "True" => SqlValue::Bool(true),
        "false" | "FALSE" | "False" => SqlValue::Bool(false),
        _ => match (cell.parse::<i64>(), cell.parse::<f64>()) {
            (Ok(value), _) => SqlValue::Int(value),
            (_, Ok(value)) if value.is_finite() => SqlValue::Float(value),
            _ => return SqlValue::Text(cell.to_string()),
        },
    };

    SqlValue::Inferred { raw: cell.to_string(), value: Box::new(value) }
}

fn read_csv_rows_sync(path: &Path, has_header: bool) -> Result<CsvRows, csv::Error> {
    let mut reader = ReaderBuilder::new().has_headers(has_header).from_path(path)?;

    let header = if has_header {
        Some(reader.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(infer_sql_value).collect());
    }

    Ok(CsvRows { header, rows })
}

/// Reads every record of the CSV file at `path` into rows, off the async runtime.
pub async fn read_csv_rows(path: &Path, has_header: bool) -> Result<CsvRows, ReadCsvError> {
    let path: PathBuf = path.to_path_buf();

    let rows = tokio::task::spawn_blocking(move || read_csv_rows_sync(&path, has_header)).await??;

    Ok(rows)
}
