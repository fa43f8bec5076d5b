//! Table and column metadata consumed by statements.
//!
//! Columns carry everything the statement layer needs to know about them:
//! value type, nullability, auto-increment, client-side default generator and
//! database-side default. Identifiers are validated when a table is built,
//! so rendering never has to quote or escape them.
//!
//! # Example
//! ```ignore
//! use typedml::{ColumnDef, ColumnType, Table};
//!
//! let users = Table::builder("users")
//!     .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
//!     .column(ColumnDef::new("name", ColumnType::Varchar(Some(50))))
//!     .column(ColumnDef::new("note", ColumnType::Text).nullable())
//!     .primary_key(&["id"])
//!     .build()?;
//! # Ok::<(), typedml::StmtError>(())
//! ```

use crate::error::{StmtError, StmtResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Column value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Double,
    #[cfg(feature = "rust_decimal")]
    Decimal { precision: u32, scale: u32 },
    /// VARCHAR with an optional maximum length in characters.
    Varchar(Option<u32>),
    Text,
    Binary,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    /// Identifier column of an entity table wrapping the underlying type.
    EntityId(Box<ColumnType>),
}

impl ColumnType {
    pub fn is_entity_id(&self) -> bool {
        matches!(self, ColumnType::EntityId(_))
    }

    /// The storage type, looking through `EntityId`.
    pub fn base(&self) -> &ColumnType {
        match self {
            ColumnType::EntityId(inner) => inner.base(),
            other => other,
        }
    }

    /// Check and convert a non-null literal before it is stored for `column`.
    pub fn validate(&self, column: &str, value: Value) -> StmtResult<Value> {
        if value.is_null() {
            return Ok(value);
        }

        let mismatch = |value: &Value| StmtError::InvalidValue {
            column: column.to_string(),
            message: format!("{} value does not fit column type {}", value.type_name(), self),
        };

        match (self.base(), value) {
            (ColumnType::Boolean, v @ Value::Bool(_)) => Ok(v),
            (ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt, v)
                if v.as_i64().is_some() =>
            {
                let n = v.as_i64().unwrap_or_default();
                let out_of_range = || StmtError::InvalidValue {
                    column: column.to_string(),
                    message: format!("{n} is out of range for {self}"),
                };
                match self.base() {
                    ColumnType::SmallInt => {
                        i16::try_from(n).map(Value::SmallInt).map_err(|_| out_of_range())
                    }
                    ColumnType::Integer => {
                        i32::try_from(n).map(Value::Int).map_err(|_| out_of_range())
                    }
                    _ => Ok(Value::BigInt(n)),
                }
            }
            (ColumnType::Double, Value::Double(d)) => Ok(Value::Double(d)),
            (ColumnType::Double, v) if v.as_i64().is_some() => {
                Ok(Value::Double(v.as_i64().unwrap_or_default() as f64))
            }
            #[cfg(feature = "rust_decimal")]
            (ColumnType::Decimal { .. }, v @ Value::Decimal(_)) => Ok(v),
            #[cfg(feature = "rust_decimal")]
            (ColumnType::Decimal { .. }, v) if v.as_i64().is_some() => Ok(Value::Decimal(
                rust_decimal::Decimal::from(v.as_i64().unwrap_or_default()),
            )),
            (ColumnType::Varchar(limit), Value::Text(s)) => match limit {
                Some(max) if s.chars().count() > *max as usize => Err(StmtError::InvalidValue {
                    column: column.to_string(),
                    message: format!(
                        "value of length {} exceeds VARCHAR({max})",
                        s.chars().count()
                    ),
                }),
                _ => Ok(Value::Text(s)),
            },
            (ColumnType::Text, v @ Value::Text(_)) => Ok(v),
            (ColumnType::Binary, v @ Value::Bytes(_)) => Ok(v),
            (ColumnType::Uuid, v @ Value::Uuid(_)) => Ok(v),
            (ColumnType::Uuid, Value::Text(s)) => {
                uuid::Uuid::parse_str(&s)
                    .map(Value::Uuid)
                    .map_err(|e| StmtError::InvalidValue {
                        column: column.to_string(),
                        message: format!("'{s}' is not a UUID: {e}"),
                    })
            }
            (ColumnType::Date, v @ Value::Date(_)) => Ok(v),
            (ColumnType::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
            (ColumnType::TimestampTz, v @ Value::TimestampTz(_)) => Ok(v),
            (ColumnType::Json, v) => Ok(v),
            (_, v) => Err(mismatch(&v)),
        }
    }

    /// Render a value of this type as a SQL literal.
    pub fn literal(&self, value: &Value) -> String {
        match (self.base(), value) {
            (ColumnType::Json, Value::Json(_)) => value.to_sql_literal(),
            (ColumnType::Json, Value::Null) => value.to_sql_literal(),
            (ColumnType::Json, other) => match serde_json::to_string(&json_of(other)) {
                Ok(s) => format!("'{}'", s.replace('\'', "''")),
                Err(_) => other.to_sql_literal(),
            },
            _ => value.to_sql_literal(),
        }
    }
}

fn json_of(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Json(j) => j.clone(),
        other => match other.as_i64() {
            Some(n) => serde_json::Value::from(n),
            None => serde_json::Value::String(other.to_string()),
        },
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::SmallInt => f.write_str("SMALLINT"),
            ColumnType::Integer => f.write_str("INT"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Double => f.write_str("DOUBLE PRECISION"),
            #[cfg(feature = "rust_decimal")]
            ColumnType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            ColumnType::Varchar(Some(n)) => write!(f, "VARCHAR({n})"),
            ColumnType::Varchar(None) => f.write_str("VARCHAR"),
            ColumnType::Text => f.write_str("TEXT"),
            ColumnType::Binary => f.write_str("BINARY"),
            ColumnType::Uuid => f.write_str("UUID"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
            ColumnType::TimestampTz => f.write_str("TIMESTAMP WITH TIME ZONE"),
            ColumnType::Json => f.write_str("JSON"),
            ColumnType::EntityId(inner) => inner.fmt(f),
        }
    }
}

/// Client-side default value generator.
#[derive(Clone)]
pub struct ClientDefault(Arc<dyn Fn() -> Value + Send + Sync>);

impl ClientDefault {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn generate(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for ClientDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientDefault").field(&"<fn>").finish()
    }
}

/// Auto-increment (identity/serial/sequence) marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutoIncrement {
    /// Explicit sequence name, if the column is fed by a named sequence.
    pub sequence: Option<String>,
}

/// A typed table column.
#[derive(Debug)]
pub struct Column {
    table: String,
    name: String,
    index: usize,
    column_type: ColumnType,
    nullable: bool,
    auto_increment: Option<AutoIncrement>,
    client_default: Option<ClientDefault>,
    db_default: Option<String>,
    primary_key: bool,
}

/// Shared handle to a column.
pub type ColumnRef = Arc<Column>;

/// Deterministic column sort key: table name, then declaration index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub table: String,
    pub index: usize,
}

impl Column {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration index within the table.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn auto_increment(&self) -> Option<&AutoIncrement> {
        self.auto_increment.as_ref()
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment.is_some()
    }

    pub fn client_default(&self) -> Option<&ClientDefault> {
        self.client_default.as_ref()
    }

    /// Database-side default expression, if any.
    pub fn db_default(&self) -> Option<&str> {
        self.db_default.as_deref()
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_entity_id(&self) -> bool {
        self.column_type.is_entity_id()
    }

    /// Whether a row may omit this column and still be valid.
    pub fn is_defaultable(&self) -> bool {
        self.nullable
            || self.client_default.is_some()
            || self.db_default.is_some()
            || self.auto_increment.is_some()
            || self.is_entity_id()
    }

    /// Whether the database produces the value when the column is omitted.
    pub fn is_database_generated(&self) -> bool {
        self.auto_increment.is_some() || self.db_default.is_some()
    }

    pub fn key(&self) -> ColumnKey {
        ColumnKey {
            table: self.table.clone(),
            index: self.index,
        }
    }

    /// `table.column`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

/// Columns compare by table, declaration index and name; `Eq` and `Ord`
/// agree on that key.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Column {}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Column {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.table, self.index, &self.name).cmp(&(&other.table, other.index, &other.name))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// Column definition used by [`TableBuilder`].
#[derive(Debug, Clone)]
pub struct ColumnDef {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    auto_increment: Option<AutoIncrement>,
    client_default: Option<ClientDefault>,
    db_default: Option<String>,
}

impl ColumnDef {
    /// A NOT NULL column with no defaults.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            auto_increment: None,
            client_default: None,
            db_default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = Some(AutoIncrement::default());
        self
    }

    /// Auto-increment fed by a named sequence.
    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.auto_increment = Some(AutoIncrement {
            sequence: Some(name.into()),
        });
        self
    }

    /// Generate a value on the client when the column is not assigned.
    pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.client_default = Some(ClientDefault::new(f));
        self
    }

    /// Constant client-side default.
    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_fn(move || value.clone())
    }

    /// Database-side default expression (e.g. `CURRENT_TIMESTAMP`).
    pub fn db_default(mut self, expr: impl Into<String>) -> Self {
        self.db_default = Some(expr.into());
        self
    }
}

/// A table with ordered, typed columns.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<ColumnRef>,
    primary_key: Vec<ColumnRef>,
    unique_indices: Vec<Vec<ColumnRef>>,
}

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique_indices: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnRef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing with a schema error if it does not exist.
    pub fn col(&self, name: &str) -> StmtResult<ColumnRef> {
        self.column(name).cloned().ok_or_else(|| {
            StmtError::schema(format!("table '{}' has no column '{name}'", self.name))
        })
    }

    pub fn primary_key(&self) -> &[ColumnRef] {
        &self.primary_key
    }

    pub fn unique_indices(&self) -> &[Vec<ColumnRef>] {
        &self.unique_indices
    }

    pub fn auto_increment_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.columns.iter().filter(|c| c.is_auto_increment())
    }

    /// Columns every inserted row must supply.
    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.columns.iter().filter(|c| !c.is_defaultable())
    }

    pub fn contains(&self, column: &Column) -> bool {
        column.table == self.name
    }
}

/// Builder for [`Table`].
#[derive(Debug)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    unique_indices: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn column(mut self, def: ColumnDef) -> Self {
        self.columns.push(def);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn unique_index(mut self, columns: &[&str]) -> Self {
        self.unique_indices
            .push(columns.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> StmtResult<Arc<Table>> {
        validate_table_name(&self.name)?;

        let mut columns: Vec<ColumnRef> = Vec::with_capacity(self.columns.len());
        for (index, def) in self.columns.into_iter().enumerate() {
            validate_identifier(&def.name)?;
            if columns.iter().any(|c| c.name == def.name) {
                return Err(StmtError::schema(format!(
                    "duplicate column '{}' in table '{}'",
                    def.name, self.name
                )));
            }
            let primary_key = self.primary_key.contains(&def.name);
            columns.push(Arc::new(Column {
                table: self.name.clone(),
                name: def.name,
                index,
                column_type: def.column_type,
                nullable: def.nullable,
                auto_increment: def.auto_increment,
                client_default: def.client_default,
                db_default: def.db_default,
                primary_key,
            }));
        }

        let resolve = |names: &[String]| -> StmtResult<Vec<ColumnRef>> {
            names
                .iter()
                .map(|n| {
                    columns.iter().find(|c| &c.name == n).cloned().ok_or_else(|| {
                        StmtError::schema(format!(
                            "key column '{n}' is not defined in table '{}'",
                            self.name
                        ))
                    })
                })
                .collect()
        };

        let primary_key = resolve(&self.primary_key)?;
        let unique_indices = self
            .unique_indices
            .iter()
            .map(|idx| resolve(idx))
            .collect::<StmtResult<Vec<_>>>()?;

        Ok(Arc::new(Table {
            name: self.name,
            columns,
            primary_key,
            unique_indices,
        }))
    }
}

/// Validate a single unquoted identifier: `[A-Za-z_][A-Za-z0-9_$]*`.
fn validate_identifier(name: &str) -> StmtResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(StmtError::schema("identifier cannot be empty"));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(StmtError::schema(format!("invalid identifier '{name}'")));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(StmtError::schema(format!("invalid identifier '{name}'")));
    }
    Ok(())
}

/// Table names may be schema-qualified (`schema.table`).
fn validate_table_name(name: &str) -> StmtResult<()> {
    if name.ends_with('.') {
        return Err(StmtError::schema(format!("trailing '.' in table name '{name}'")));
    }
    name.split('.').try_for_each(validate_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Arc<Table> {
        Table::builder("users")
            .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
            .column(ColumnDef::new("name", ColumnType::Varchar(Some(5))))
            .column(ColumnDef::new("note", ColumnType::Text).nullable())
            .column(ColumnDef::new("created", ColumnType::Timestamp).db_default("CURRENT_TIMESTAMP"))
            .primary_key(&["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_assigns_indices_and_keys() {
        let t = users();
        assert_eq!(t.col("note").unwrap().index(), 2);
        assert!(t.col("id").unwrap().is_primary_key());
        assert_eq!(t.primary_key().len(), 1);
        assert_eq!(t.auto_increment_columns().count(), 1);
    }

    #[test]
    fn test_required_columns() {
        let t = users();
        let required: Vec<_> = t.required_columns().map(|c| c.name().to_string()).collect();
        assert_eq!(required, vec!["name"]);
    }

    #[test]
    fn test_builder_rejects_bad_identifiers() {
        let err = Table::builder("users;drop")
            .column(ColumnDef::new("id", ColumnType::BigInt))
            .build()
            .unwrap_err();
        assert!(matches!(err, StmtError::Schema(_)));

        let err = Table::builder("t")
            .column(ColumnDef::new("a b", ColumnType::BigInt))
            .build()
            .unwrap_err();
        assert!(matches!(err, StmtError::Schema(_)));

        assert!(Table::builder("public.users").build().is_ok());
    }

    #[test]
    fn test_builder_rejects_duplicates_and_unknown_keys() {
        let err = Table::builder("t")
            .column(ColumnDef::new("a", ColumnType::BigInt))
            .column(ColumnDef::new("a", ColumnType::Text))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate column"));

        let err = Table::builder("t")
            .column(ColumnDef::new("a", ColumnType::BigInt))
            .unique_index(&["b"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_validate_varchar_length() {
        let t = users();
        let name = t.col("name").unwrap();
        assert!(name.column_type().validate("name", Value::from("abcde")).is_ok());
        let err = name
            .column_type()
            .validate("name", Value::from("abcdef"))
            .unwrap_err();
        assert!(matches!(err, StmtError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_integer_conversion() {
        assert_eq!(
            ColumnType::BigInt.validate("id", Value::Int(7)).unwrap(),
            Value::BigInt(7)
        );
        assert!(ColumnType::SmallInt.validate("n", Value::BigInt(70_000)).is_err());
        assert_eq!(
            ColumnType::Double.validate("d", Value::Int(2)).unwrap(),
            Value::Double(2.0)
        );
        assert!(ColumnType::Integer.validate("n", Value::from("1")).is_err());
    }

    #[test]
    fn test_validate_uuid_from_text() {
        let v = ColumnType::Uuid
            .validate("u", Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8"))
            .unwrap();
        assert!(matches!(v, Value::Uuid(_)));
        assert!(ColumnType::Uuid.validate("u", Value::from("nope")).is_err());
    }

    #[test]
    fn test_defaultability() {
        let t = users();
        assert!(t.col("id").unwrap().is_defaultable());
        assert!(!t.col("name").unwrap().is_defaultable());
        assert!(t.col("note").unwrap().is_defaultable());
        assert!(t.col("created").unwrap().is_defaultable());
    }

    #[test]
    fn test_column_equality_by_table_index_name() {
        let a = users();
        let b = users();
        assert_eq!(*a.col("name").unwrap(), *b.col("name").unwrap());
        assert_ne!(*a.col("name").unwrap(), *a.col("note").unwrap());
    }

    #[test]
    fn test_column_eq_agrees_with_ord() {
        let first = Table::builder("t")
            .column(ColumnDef::new("a", ColumnType::BigInt))
            .column(ColumnDef::new("b", ColumnType::Text))
            .build()
            .unwrap();
        let swapped = Table::builder("t")
            .column(ColumnDef::new("b", ColumnType::Text))
            .column(ColumnDef::new("a", ColumnType::BigInt))
            .build()
            .unwrap();
        let retyped = Table::builder("t")
            .column(ColumnDef::new("a", ColumnType::Text))
            .column(ColumnDef::new("b", ColumnType::Text))
            .build()
            .unwrap();

        let columns: Vec<ColumnRef> = [&first, &swapped, &retyped]
            .iter()
            .flat_map(|t| t.columns().iter().cloned())
            .collect();
        for x in &columns {
            for y in &columns {
                assert_eq!(x == y, x.cmp(y) == Ordering::Equal, "{x:?} vs {y:?}");
            }
        }
        assert_ne!(*first.col("a").unwrap(), *swapped.col("a").unwrap());
        assert_eq!(*first.col("a").unwrap(), *retyped.col("a").unwrap());
    }
}
