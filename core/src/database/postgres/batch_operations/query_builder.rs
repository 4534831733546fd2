//! SQL statement building for the batched insert and upsert loaders.
//!
//! Identifiers (tables, columns, constraints) are validated and quoted here. Values never appear
//! in the generated text: every row becomes a group of positional `$n` parameters.

use std::fmt;

/// PostgreSQL caps the number of bind parameters in a single statement.
pub const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

/// Reserved SQL keywords that need quoting.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "both", "case", "cast",
    "check", "collate", "column", "constraint", "create", "current_date", "current_user",
    "default", "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for",
    "foreign", "from", "grant", "group", "having", "in", "index", "into", "is", "key", "leading",
    "limit", "not", "null", "offset", "on", "only", "or", "order", "primary", "references",
    "returning", "select", "some", "table", "then", "to", "trailing", "true", "union", "unique",
    "user", "using", "when", "where", "window", "with",
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Identifier can not be empty")]
    Empty,

    #[error("Identifier {0:?} contains a NUL character")]
    ContainsNul(String),

    #[error("Qualified name {0:?} has {1} parts, expected at most 3")]
    TooManyParts(String, usize),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StatementError {
    #[error("Statement needs at least one value per row")]
    EmptyRowGroup,

    #[error("{rows} rows of {width} values exceed the limit of 65535 bind parameters")]
    TooManyParameters { rows: usize, width: usize },
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_reserved(name: &str) -> bool {
    RESERVED_KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
}

/// Quotes an identifier, doubling any embedded double quote.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A single validated SQL identifier.
///
/// Plain names render verbatim so the server folds their case as usual. Reserved keywords and
/// names with any other character render quoted. A name given already quoted keeps its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    raw: String,
    rendered: String,
}

impl Identifier {
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        let (raw, force_quotes) = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
            Some(inner) if name.len() >= 2 => (inner.replace("\"\"", "\""), true),
            _ => (name.to_string(), false),
        };

        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.contains('\0') {
            return Err(IdentifierError::ContainsNul(raw));
        }

        let rendered = if force_quotes || !is_plain_identifier(&raw) || is_reserved(&raw) {
            quote_identifier(&raw)
        } else {
            raw.clone()
        };

        Ok(Identifier { raw, rendered })
    }

    /// The name as the database sees it, without quoting.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_sql(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

fn split_qualified(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in name.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&name[start..]);

    parts
}

/// A possibly schema-qualified relation name such as `sales.orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    parts: Vec<Identifier>,
}

impl QualifiedName {
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        let raw_parts = split_qualified(name);
        if raw_parts.len() > 3 {
            return Err(IdentifierError::TooManyParts(name.to_string(), raw_parts.len()));
        }

        let parts = raw_parts.into_iter().map(Identifier::parse).collect::<Result<Vec<_>, _>>()?;

        Ok(QualifiedName { parts })
    }

    pub fn is_qualified(&self) -> bool {
        self.parts.len() > 1
    }

    /// Prefixes `schema` unless the name is already qualified.
    pub fn with_default_schema(mut self, schema: Option<&str>) -> Result<Self, IdentifierError> {
        if let (false, Some(schema)) = (self.is_qualified(), schema) {
            self.parts.insert(0, Identifier::parse(schema)?);
        }
        Ok(self)
    }

    /// The last part of the name, unquoted.
    pub fn relation(&self) -> &str {
        self.parts.last().map(Identifier::raw).unwrap_or_default()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.parts.iter().map(Identifier::as_sql).collect::<Vec<_>>().join(".");
        f.write_str(&joined)
    }
}

pub fn parse_identifiers<S: AsRef<str>>(names: &[S]) -> Result<Vec<Identifier>, IdentifierError> {
    names.iter().map(|name| Identifier::parse(name.as_ref())).collect()
}

/// Renders `(col1, col2, ...)`, or an empty string when no explicit column list is given.
pub fn build_target_fields(target_fields: Option<&[Identifier]>) -> String {
    match target_fields {
        Some(fields) if !fields.is_empty() => {
            format!("({})", fields.iter().map(Identifier::as_sql).collect::<Vec<_>>().join(", "))
        }
        _ => String::new(),
    }
}

/// Renders `rows` parameter groups of `width` values each: `($1, $2),($3, $4)`.
pub fn build_placeholders(rows: usize, width: usize) -> Result<String, StatementError> {
    if width == 0 {
        return Err(StatementError::EmptyRowGroup);
    }
    if rows.saturating_mul(width) > MAX_BIND_PARAMETERS {
        return Err(StatementError::TooManyParameters { rows, width });
    }

    let groups = (0..rows)
        .map(|i| {
            let base = i * width + 1;
            let group = (base..base + width).map(|n| format!("${}", n)).collect::<Vec<_>>();
            format!("({})", group.join(", "))
        })
        .collect::<Vec<_>>();

    Ok(groups.join(","))
}

/// Renders the `DO UPDATE SET` target: a bare column when there is one, a tuple otherwise.
pub fn build_update_columns(non_key_columns: &[Identifier]) -> String {
    let joined = non_key_columns.iter().map(Identifier::as_sql).collect::<Vec<_>>().join(", ");
    if non_key_columns.len() == 1 {
        joined
    } else {
        format!("({})", joined)
    }
}

pub fn build_excluded_list(non_key_columns: &[Identifier]) -> String {
    non_key_columns
        .iter()
        .map(|col| format!("EXCLUDED.{}", col.as_sql()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT INTO {table} {target_fields} VALUES {placeholders};`
#[derive(Debug, Clone)]
pub struct InsertStatement {
    head: String,
}

impl InsertStatement {
    pub fn new(table: &QualifiedName, target_fields: Option<&[Identifier]>) -> Self {
        InsertStatement {
            head: format!("INSERT INTO {} {} VALUES ", table, build_target_fields(target_fields)),
        }
    }

    pub fn render(&self, rows: usize, width: usize) -> Result<String, StatementError> {
        Ok(format!("{}{};", self.head, build_placeholders(rows, width)?))
    }
}

/// `INSERT INTO {table} {target_fields} VALUES {placeholders} ON CONFLICT ON CONSTRAINT {pk_name}
/// DO UPDATE SET {non_key_cols} = ({excluded_list});`
#[derive(Debug, Clone)]
pub struct UpsertStatement {
    head: String,
    tail: String,
}

impl UpsertStatement {
    pub fn new(
        table: &QualifiedName,
        target_fields: Option<&[Identifier]>,
        pk_name: &Identifier,
        non_key_columns: &[Identifier],
    ) -> Self {
        UpsertStatement {
            head: format!("INSERT INTO {} {} VALUES ", table, build_target_fields(target_fields)),
            tail: format!(
                " ON CONFLICT ON CONSTRAINT {} DO UPDATE SET {} = ({});",
                pk_name,
                build_update_columns(non_key_columns),
                build_excluded_list(non_key_columns)
            ),
        }
    }

    pub fn render(&self, rows: usize, width: usize) -> Result<String, StatementError> {
        Ok(format!("{}{}{}", self.head, build_placeholders(rows, width)?, self.tail))
    }
}
