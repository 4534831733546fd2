// public
pub mod manifest;

mod database;
pub use database::postgres::{
    batch_operations::{
        insert_rows_batch, upsert, BulkInsertOptions, Identifier, IdentifierError,
        InsertStatement, LoadError, LoadReport, QualifiedName, StatementError, UpsertStatement,
        UpsertStatements, UpsertTarget, UpsertTargetError, DEFAULT_INSERT_BATCH_SIZE,
        DEFAULT_UPSERT_BATCH_SIZE, MAX_BIND_PARAMETERS,
    },
    client::{
        Connection, ConnectionProvider, PgType, PostgresConnection, PostgresConnectionError,
        PostgresConnectionProvider, PostgresError, ToSql,
    },
    sql_type_wrapper::{BindError, Row, SqlValue},
};

mod helpers;
pub use helpers::{batches, remainder_batch_len};

mod simple_file_formatters;
pub use simple_file_formatters::csv::{infer_sql_value, read_csv_rows, CsvRows, ReadCsvError};

mod logger;
pub use logger::{parse_log_level, setup_info_logger, setup_logger, LogSettings};

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tracing::level_filters::LevelFilter;
pub use tracing::{error as batchload_error, info as batchload_info};
