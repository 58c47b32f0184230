//! Per-dialect DDL generation.
//!
//! Each dialect renders the definitions from [`crate::schema`] into SQL text.
//! The engine only ever hands these strings to an
//! [`Executor`](crate::database::Executor); it never interprets them.

use chrono::{DateTime, Utc};

use crate::schema::{Column, ColumnType, Index, Table};

/// DDL builder for one SQL dialect.
pub trait Dialect: Send + Sync {
    /// Short dialect name (`postgres`, `sqlite`, `clickhouse`).
    fn name(&self) -> &'static str;

    /// Quote an identifier.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Map a column type to SQL.
    fn column_type(&self, ty: &ColumnType) -> String;

    /// Expression for the current timestamp.
    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Render a UTC timestamp as a literal.
    fn timestamp_literal(&self, at: &DateTime<Utc>) -> String {
        self.quote_literal(&at.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string())
    }

    /// Whether DDL participates in transactions.
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Render a column definition.
    fn column_definition(&self, column: &Column) -> String {
        let mut parts = vec![self.quote_ident(&column.name), self.column_type(&column.ty)];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    /// Generate CREATE TABLE.
    fn create_table(&self, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        if !table.primary_key.is_empty() {
            let cols: Vec<String> = table.primary_key.iter().map(|c| self.quote_ident(c)).collect();
            lines.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        let if_not_exists = if table.if_not_exists { "IF NOT EXISTS " } else { "" };
        format!(
            "CREATE TABLE {}{} (\n    {}\n)",
            if_not_exists,
            self.quote_ident(&table.name),
            lines.join(",\n    ")
        )
    }

    /// Generate DROP TABLE.
    fn drop_table(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(name))
    }

    /// Generate ALTER TABLE ... ADD COLUMN.
    fn add_column(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_definition(column)
        )
    }

    /// Generate ALTER TABLE ... DROP COLUMN.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(column)
        )
    }

    /// Generate a table rename.
    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_ident(from),
            self.quote_ident(to)
        )
    }

    /// Generate a column rename.
    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_ident(table),
            self.quote_ident(from),
            self.quote_ident(to)
        )
    }

    /// Generate CREATE INDEX.
    fn create_index(&self, index: &Index) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote_ident(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            self.quote_ident(&index.name),
            self.quote_ident(&index.table),
            cols.join(", ")
        )
    }

    /// Generate DROP INDEX.
    fn drop_index(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quote_ident(name))
    }
}

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Blob => "BYTEA".to_string(),
            ColumnType::Custom(sql) => sql.clone(),
        }
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn column_definition(&self, column: &Column) -> String {
        let sql_type = match (&column.ty, column.auto_increment) {
            (ColumnType::SmallInt, true) => "SMALLSERIAL".to_string(),
            (ColumnType::Integer, true) => "SERIAL".to_string(),
            (ColumnType::BigInt, true) => "BIGSERIAL".to_string(),
            (ty, _) => self.column_type(ty),
        };
        let mut parts = vec![self.quote_ident(&column.name), sql_type];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => "INTEGER",
            ColumnType::Boolean => "INTEGER",
            ColumnType::Real | ColumnType::Double => "REAL",
            ColumnType::Decimal { .. } => "NUMERIC",
            ColumnType::Text | ColumnType::Varchar(_) | ColumnType::Json | ColumnType::Uuid => {
                "TEXT"
            }
            ColumnType::Date | ColumnType::Timestamp | ColumnType::TimestampTz => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Custom(sql) => return sql.clone(),
        }
        .to_string()
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut parts = vec![self.quote_ident(&column.name), self.column_type(&column.ty)];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            // SQLite only honours AUTOINCREMENT on INTEGER PRIMARY KEY
            if column.auto_increment {
                parts.push("AUTOINCREMENT".to_string());
            }
        } else if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

/// ClickHouse dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDialect;

impl Dialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "\\`"))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt => "Int16".to_string(),
            ColumnType::Integer => "Int32".to_string(),
            ColumnType::BigInt => "Int64".to_string(),
            ColumnType::Real => "Float32".to_string(),
            ColumnType::Double => "Float64".to_string(),
            ColumnType::Decimal { precision, scale } => format!("Decimal({}, {})", precision, scale),
            ColumnType::Boolean => "Bool".to_string(),
            ColumnType::Text | ColumnType::Varchar(_) | ColumnType::Json => "String".to_string(),
            ColumnType::Date => "Date".to_string(),
            ColumnType::Timestamp => "DateTime".to_string(),
            ColumnType::TimestampTz => "DateTime64(3, 'UTC')".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Blob => "String".to_string(),
            ColumnType::Custom(sql) => sql.clone(),
        }
    }

    fn now(&self) -> &'static str {
        "now()"
    }

    fn timestamp_literal(&self, at: &DateTime<Utc>) -> String {
        self.quote_literal(&at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn column_definition(&self, column: &Column) -> String {
        let ty = self.column_type(&column.ty);
        let ty = if column.nullable && !column.primary_key {
            format!("Nullable({})", ty)
        } else {
            ty
        };
        let mut parts = vec![self.quote_ident(&column.name), ty];
        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }
        parts.join(" ")
    }

    fn create_table(&self, table: &Table) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        let order_by: Vec<&str> = if !table.order_by.is_empty() {
            table.order_by.iter().map(String::as_str).collect()
        } else {
            table.key_columns()
        };
        let order_by = if order_by.is_empty() {
            "tuple()".to_string()
        } else {
            let cols: Vec<String> = order_by.iter().map(|c| self.quote_ident(c)).collect();
            format!("({})", cols.join(", "))
        };

        let if_not_exists = if table.if_not_exists { "IF NOT EXISTS " } else { "" };
        format!(
            "CREATE TABLE {}{} (\n    {}\n) ENGINE = MergeTree ORDER BY {}",
            if_not_exists,
            self.quote_ident(&table.name),
            columns.join(",\n    "),
            order_by
        )
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_ident(from),
            self.quote_ident(to)
        )
    }

    fn create_index(&self, index: &Index) -> String {
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote_ident(c)).collect();
        format!(
            "ALTER TABLE {} ADD INDEX {} ({}) TYPE minmax GRANULARITY 1",
            self.quote_ident(&index.table),
            self.quote_ident(&index.name),
            cols.join(", ")
        )
    }

    fn drop_index(&self, name: &str, table: &str) -> String {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.quote_ident(table),
            self.quote_ident(name)
        )
    }
}
