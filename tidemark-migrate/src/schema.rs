//! Dialect-neutral definitions consumed by the schema DSL.
//!
//! These carry everything a [`Dialect`](crate::sql::Dialect) needs to render
//! DDL, and double as the "reversible parameters" that let a drop operation
//! reconstruct what it removed.

use serde::{Deserialize, Serialize};

/// A column type, mapped to concrete SQL by each dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Boolean,
    Text,
    Varchar(u32),
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    Blob,
    /// Passed through to the database verbatim.
    Custom(String),
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether this column alone is the primary key.
    pub primary_key: bool,
    /// Whether values must be unique.
    pub unique: bool,
    /// Whether the database generates values.
    pub auto_increment: bool,
    /// Default value as a SQL expression.
    pub default: Option<String>,
}

impl Column {
    /// Create a new non-null column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            primary_key: false,
            unique: false,
            auto_increment: false,
            default: None,
        }
    }

    /// Allow NULL values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Add a unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Let the database generate values.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set the default expression.
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Composite primary key. Empty when a column carries `primary_key`.
    pub primary_key: Vec<String>,
    /// Sorting key for engines that require one (ClickHouse `ORDER BY`).
    pub order_by: Vec<String>,
    /// Render `IF NOT EXISTS`.
    pub if_not_exists: bool,
}

impl Table {
    /// Create a new table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            order_by: Vec::new(),
            if_not_exists: false,
        }
    }

    /// Add a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set a composite primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sorting key.
    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Only create the table when it does not exist yet.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Primary key columns, whether declared per column or composite.
    pub fn key_columns(&self) -> Vec<&str> {
        if !self.primary_key.is_empty() {
            return self.primary_key.iter().map(String::as_str).collect();
        }
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl Index {
    /// Create a new index.
    pub fn new<I, S>(name: impl Into<String>, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}
