use std::num::NonZeroUsize;

use tracing::{debug, info};

use super::{
    batch_params,
    query_builder::{
        parse_identifiers, Identifier, IdentifierError, QualifiedName, UpsertStatement,
    },
    row_width, LoadError, LoadReport,
};
use crate::{
    database::postgres::{
        client::{Connection, ConnectionProvider},
        sql_type_wrapper::Row,
    },
    helpers::{batches, remainder_batch_len},
};

pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

#[derive(thiserror::Error, Debug)]
pub enum UpsertTargetError {
    #[error("Upsert needs at least one primary key field")]
    EmptyPrimaryKey,

    #[error("Upsert needs at least two fields, got {0}")]
    TooFewFields(usize),

    #[error("Primary key field {0} is not one of the table fields")]
    PrimaryKeyNotInFields(String),

    #[error("Upsert needs at least one field outside the primary key")]
    NoNonKeyFields,

    #[error("{0}")]
    Identifier(#[from] IdentifierError),
}

/// Where and how an upsert writes.
#[derive(Debug, Clone)]
pub struct UpsertTarget {
    pub table: String,
    /// Primary key field(s), resolved through the constraint named by `pk_name`.
    pub pk_fields: Vec<String>,
    /// Every field of the table, in the table's column order.
    pub all_fields: Vec<String>,
    /// Defaults to `<table>_pkey`.
    pub pk_name: Option<String>,
    /// Prefixed to `table` unless it is already qualified.
    pub schema: Option<String>,
    pub target_fields: Option<Vec<String>>,
}

impl UpsertTarget {
    pub fn new<S: Into<String>>(
        table: impl Into<String>,
        pk_fields: impl IntoIterator<Item = S>,
        all_fields: impl IntoIterator<Item = S>,
    ) -> Self {
        UpsertTarget {
            table: table.into(),
            pk_fields: pk_fields.into_iter().map(Into::into).collect(),
            all_fields: all_fields.into_iter().map(Into::into).collect(),
            pk_name: None,
            schema: None,
            target_fields: None,
        }
    }

    pub fn with_pk_name(mut self, pk_name: impl Into<String>) -> Self {
        self.pk_name = Some(pk_name.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_target_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.target_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// `all_fields` minus `pk_fields`, in `all_fields` order.
    pub fn non_key_fields(&self) -> Vec<&str> {
        self.all_fields
            .iter()
            .filter(|field| !self.pk_fields.contains(*field))
            .map(String::as_str)
            .collect()
    }

    /// The explicit column list, if a non-empty one was given.
    fn explicit_target_fields(&self) -> Option<&[String]> {
        self.target_fields.as_deref().filter(|fields| !fields.is_empty())
    }

    /// Number of values each row must carry.
    pub fn row_width(&self) -> usize {
        self.explicit_target_fields().map_or(self.all_fields.len(), <[String]>::len)
    }

    /// Validates the target and builds its statement template.
    pub fn statement(&self) -> Result<UpsertStatement, UpsertTargetError> {
        if self.pk_fields.is_empty() {
            return Err(UpsertTargetError::EmptyPrimaryKey);
        }
        if self.all_fields.len() < 2 {
            return Err(UpsertTargetError::TooFewFields(self.all_fields.len()));
        }
        if let Some(missing) = self.pk_fields.iter().find(|pk| !self.all_fields.contains(*pk)) {
            return Err(UpsertTargetError::PrimaryKeyNotInFields(missing.clone()));
        }

        let non_key_fields = parse_identifiers(&self.non_key_fields())?;
        if non_key_fields.is_empty() {
            return Err(UpsertTargetError::NoNonKeyFields);
        }

        let table = QualifiedName::parse(&self.table)?;
        let pk_name = match &self.pk_name {
            Some(pk_name) => Identifier::parse(pk_name)?,
            None => Identifier::parse(&format!("{}_pkey", table.relation()))?,
        };
        let table = table.with_default_schema(self.schema.as_deref())?;
        let target_fields = self.explicit_target_fields().map(parse_identifiers).transpose()?;

        Ok(UpsertStatement::new(&table, target_fields.as_deref(), &pk_name, &non_key_fields))
    }
}

/// The upsert SQL rendered once for full batches and once for the trailing partial batch.
///
/// A render is only produced when a batch of that size will actually run.
#[derive(Debug, Clone)]
pub struct UpsertStatements {
    batch_size: usize,
    full: Option<String>,
    remainder_len: usize,
    remainder: Option<String>,
}

impl UpsertStatements {
    pub fn prepare(
        statement: &UpsertStatement,
        total_rows: usize,
        batch_size: NonZeroUsize,
        width: usize,
    ) -> Result<Self, LoadError> {
        let remainder_len = remainder_batch_len(total_rows, batch_size);

        let full = if total_rows >= batch_size.get() {
            Some(statement.render(batch_size.get(), width)?)
        } else {
            None
        };
        let remainder = if remainder_len > 0 {
            Some(statement.render(remainder_len, width)?)
        } else {
            None
        };

        Ok(UpsertStatements { batch_size: batch_size.get(), full, remainder_len, remainder })
    }

    pub fn full(&self) -> Option<&str> {
        self.full.as_deref()
    }

    pub fn remainder(&self) -> Option<&str> {
        self.remainder.as_deref()
    }

    pub fn for_batch(&self, len: usize) -> Result<&str, LoadError> {
        let sql = if len == self.batch_size {
            self.full()
        } else if len == self.remainder_len {
            self.remainder()
        } else {
            None
        };

        sql.ok_or(LoadError::NoStatementForBatch(len))
    }
}

/// Inserts `rows`, updating the non-key fields of any row whose primary key already exists.
///
/// Conflicts are resolved by the database through the target's primary key constraint. The
/// target is validated before any connection is opened.
pub async fn upsert<P: ConnectionProvider>(
    provider: &P,
    target: &UpsertTarget,
    rows: &[Row],
    batch_size: NonZeroUsize,
) -> Result<LoadReport, LoadError> {
    let statement = target.statement()?;
    let width = row_width(rows, Some(target.row_width()))?;
    let statements = UpsertStatements::prepare(&statement, rows.len(), batch_size, width)?;

    let mut report = LoadReport::default();

    if !rows.is_empty() {
        let mut connection = provider.connect().await?;

        for batch in batches(rows, batch_size) {
            let sql = statements.for_batch(batch.len())?;
            debug!("Upsert statement: {}", sql);

            connection.execute(sql, &batch_params(batch)).await?;
            connection.commit().await?;

            report.record_batch(batch.len());
            info!("Commit done on {} row(s) for UPSERT so far.", report.total_rows);
        }

        connection.close().await;
    }

    info!("Commit done on all {} rows for UPSERT.", rows.len());
    info!("UPSERT Done.");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::postgres::{
        batch_operations::recording::{Event, LogCapture, RecordingProvider},
        sql_type_wrapper::SqlValue,
    };

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn people(n: i64) -> Vec<Row> {
        (1..=n).map(|i| vec![SqlValue::Int(i), SqlValue::Text(format!("p{}", i))]).collect()
    }

    #[test]
    fn test_non_key_fields_keep_order() {
        let target = UpsertTarget::new("t", ["pk1", "pk2"], ["pk1", "pk2", "a", "b"]);
        assert_eq!(target.non_key_fields(), vec!["a", "b"]);

        let interleaved = UpsertTarget::new("t", ["id"], ["b", "id", "a"]);
        assert_eq!(interleaved.non_key_fields(), vec!["b", "a"]);
    }

    #[test]
    fn test_statement_single_non_key_is_bare() {
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);
        let sql = target.statement().unwrap().render(1, 2).unwrap();

        assert_eq!(
            sql,
            "INSERT INTO t  VALUES ($1, $2) ON CONFLICT ON CONSTRAINT t_pkey DO UPDATE SET name = (EXCLUDED.name);"
        );
    }

    #[test]
    fn test_statement_many_non_key_is_tuple() {
        let target = UpsertTarget::new("t", ["pk1", "pk2"], ["pk1", "pk2", "a", "b"]);
        let sql = target.statement().unwrap().render(1, 4).unwrap();

        assert!(sql.ends_with(
            "ON CONFLICT ON CONSTRAINT t_pkey DO UPDATE SET (a, b) = (EXCLUDED.a, EXCLUDED.b);"
        ));
    }

    #[test]
    fn test_statement_schema_and_pk_name() {
        let target = UpsertTarget::new("orders", ["id"], ["id", "total"])
            .with_schema("sales")
            .with_target_fields(["id", "total"]);
        let sql = target.statement().unwrap().render(1, 2).unwrap();

        assert_eq!(
            sql,
            "INSERT INTO sales.orders (id, total) VALUES ($1, $2) ON CONFLICT ON CONSTRAINT orders_pkey DO UPDATE SET total = (EXCLUDED.total);"
        );

        let named = UpsertTarget::new("archive.orders", ["id"], ["id", "total"])
            .with_schema("sales")
            .with_pk_name("orders_id_key");
        let sql = named.statement().unwrap().render(1, 2).unwrap();

        assert!(sql.starts_with("INSERT INTO archive.orders  VALUES"));
        assert!(sql.contains("ON CONSTRAINT orders_id_key "));
    }

    #[test]
    fn test_statement_rejects_invalid_targets() {
        let no_pk = UpsertTarget::new("t", Vec::<String>::new(), vec!["id".into(), "name".into()]);
        assert!(matches!(no_pk.statement(), Err(UpsertTargetError::EmptyPrimaryKey)));

        let one_field = UpsertTarget::new("t", ["id"], ["id"]);
        assert!(matches!(one_field.statement(), Err(UpsertTargetError::TooFewFields(1))));

        let stray_pk = UpsertTarget::new("t", ["uid"], ["id", "name"]);
        assert!(matches!(
            stray_pk.statement(),
            Err(UpsertTargetError::PrimaryKeyNotInFields(pk)) if pk == "uid"
        ));

        let all_keys = UpsertTarget::new("t", ["a", "b"], ["a", "b"]);
        assert!(matches!(all_keys.statement(), Err(UpsertTargetError::NoNonKeyFields)));
    }

    #[test]
    fn test_statements_skip_zero_remainder() {
        let statement = UpsertTarget::new("t", ["id"], ["id", "name"]).statement().unwrap();

        let even = UpsertStatements::prepare(&statement, 4, size(2), 2).unwrap();
        assert!(even.full().is_some());
        assert!(even.remainder().is_none());

        let short = UpsertStatements::prepare(&statement, 1, size(2), 2).unwrap();
        assert!(short.full().is_none());
        assert_eq!(short.for_batch(1).unwrap(), short.remainder().unwrap());
        assert!(matches!(short.for_batch(2), Err(LoadError::NoStatementForBatch(2))));
    }

    fn abc_rows() -> Vec<Row> {
        vec![
            vec![SqlValue::Int(1), SqlValue::from("a")],
            vec![SqlValue::Int(2), SqlValue::from("b")],
            vec![SqlValue::Int(3), SqlValue::from("c")],
        ]
    }

    #[tokio::test]
    async fn test_upsert_end_to_end() {
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        let report = upsert(&provider, &target, &abc_rows(), size(2)).await.unwrap();

        let conflict = "ON CONFLICT ON CONSTRAINT t_pkey DO UPDATE SET name = (EXCLUDED.name);";
        assert_eq!(report, LoadReport { total_rows: 3, batches: 2 });
        assert_eq!(
            provider.events(),
            vec![
                Event::Connect,
                Event::Execute {
                    sql: format!("INSERT INTO t  VALUES ($1, $2),($3, $4) {}", conflict),
                    params: 4,
                },
                Event::Commit,
                Event::Execute {
                    sql: format!("INSERT INTO t  VALUES ($1, $2) {}", conflict),
                    params: 2,
                },
                Event::Commit,
                Event::Close,
                Event::Released,
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_logs_progress() {
        let (logs, _guard) = LogCapture::start();
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        upsert(&provider, &target, &abc_rows(), size(2)).await.unwrap();

        assert_eq!(
            logs.lines(),
            vec![
                "Commit done on 2 row(s) for UPSERT so far.",
                "Commit done on 3 row(s) for UPSERT so far.",
                "Commit done on all 3 rows for UPSERT.",
                "UPSERT Done.",
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_empty_target_fields_is_no_column_list() {
        let provider = RecordingProvider::new();
        let target =
            UpsertTarget::new("t", ["id"], ["id", "name"]).with_target_fields(Vec::<String>::new());

        assert_eq!(target.row_width(), 2);

        let report = upsert(&provider, &target, &abc_rows(), size(3)).await.unwrap();

        assert_eq!(report.total_rows, 3);
        assert!(provider.executes()[0].0.starts_with("INSERT INTO t  VALUES ($1, $2),"));
    }

    #[tokio::test]
    async fn test_upsert_evenly_divisible_uses_full_statement_only() {
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        let report = upsert(&provider, &target, &people(6), size(3)).await.unwrap();

        let executes = provider.executes();
        assert_eq!(report.batches, 2);
        assert_eq!(executes.len(), 2);
        assert_eq!(executes[0], executes[1]);
        assert_eq!(provider.count(&Event::Commit), 2);
    }

    #[tokio::test]
    async fn test_upsert_default_batch_size() {
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        upsert(&provider, &target, &people(250), size(DEFAULT_UPSERT_BATCH_SIZE)).await.unwrap();

        let sizes: Vec<usize> = provider.executes().iter().map(|(_, params)| params / 2).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_upsert_invalid_target_never_connects() {
        let provider = RecordingProvider::new();
        let no_pk = UpsertTarget::new("t", Vec::<String>::new(), vec!["id".into(), "name".into()]);
        let one_field = UpsertTarget::new("t", ["id"], ["id"]);

        for target in [no_pk, one_field] {
            let err = upsert(&provider, &target, &people(3), size(2)).await.unwrap_err();
            assert!(matches!(err, LoadError::Target(_)));
        }

        assert!(provider.events().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_arity_checked_against_fields() {
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name", "email"]);

        let err = upsert(&provider, &target, &people(2), size(2)).await.unwrap_err();

        assert!(matches!(err, LoadError::RowArityMismatch { row: 0, expected: 3, found: 2 }));
        assert!(provider.events().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_failure_propagates_and_releases_connection() {
        let provider = RecordingProvider::failing_on_execute(0);
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        let err = upsert(&provider, &target, &people(3), size(2)).await.unwrap_err();

        assert!(matches!(err, LoadError::Postgres(_)));
        assert_eq!(provider.events(), vec![Event::Connect, Event::Released]);
    }

    #[tokio::test]
    async fn test_upsert_empty_rows_does_not_connect() {
        let provider = RecordingProvider::new();
        let target = UpsertTarget::new("t", ["id"], ["id", "name"]);

        let report = upsert(&provider, &target, &[], size(2)).await.unwrap();

        assert_eq!(report, LoadReport::default());
        assert!(provider.events().is_empty());
    }
}
