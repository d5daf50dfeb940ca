//! Table and column metadata produced by schema validation.
//!
//! A [`TableDescriptor`] is built once per run and never mutated afterwards.
//! Column order is the catalog's ordinal order and is authoritative for both
//! reading and writing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Portable classification of a column's SQL type.
///
/// Parsed from catalog type names. Only [`SqlType::Blob`] and
/// [`SqlType::Clob`] are large objects; everything else is copied as an
/// opaque typed cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    /// Bounded binary (`bytea`, `varbinary`).
    Binary,
    /// Binary large object.
    Blob,
    /// Character large object.
    Clob,
    /// Anything not recognized, keeping the catalog name.
    Other(String),
}

impl SqlType {
    /// Parse a catalog type.
    ///
    /// `data_type` is the `information_schema.columns.data_type` value and
    /// `udt_name` the underlying type name, which is what identifies domains
    /// and extension types (`lo`) reported as `USER-DEFINED`.
    pub fn from_catalog(data_type: &str, udt_name: &str) -> Self {
        let parsed = Self::parse(data_type);
        match parsed {
            SqlType::Other(_) if !udt_name.is_empty() => match Self::parse(udt_name) {
                SqlType::Other(_) => parsed,
                resolved => resolved,
            },
            _ => parsed,
        }
    }

    /// Parse a single type name, ignoring case and any length/precision suffix.
    pub fn parse(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();

        match base {
            "bool" | "boolean" | "bit" => SqlType::Boolean,
            "int2" | "smallint" | "tinyint" => SqlType::SmallInt,
            "int" | "int4" | "integer" => SqlType::Integer,
            "int8" | "bigint" => SqlType::BigInt,
            "float4" | "real" => SqlType::Real,
            "float8" | "double precision" | "float" | "double" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Numeric,
            "char" | "bpchar" | "character" | "nchar" => SqlType::Char,
            "varchar" | "character varying" | "nvarchar" => SqlType::Varchar,
            "text" | "citext" | "name" => SqlType::Text,
            "date" => SqlType::Date,
            "time" | "time without time zone" => SqlType::Time,
            "timestamp" | "timestamp without time zone" | "datetime" | "datetime2" => {
                SqlType::Timestamp
            }
            "timestamptz" | "timestamp with time zone" | "datetimeoffset" => SqlType::TimestampTz,
            "uuid" | "uniqueidentifier" => SqlType::Uuid,
            "json" | "jsonb" => SqlType::Json,
            "bytea" | "binary" | "varbinary" => SqlType::Binary,
            "lo" | "blob" | "binary large object" => SqlType::Blob,
            "clob" | "character large object" => SqlType::Clob,
            _ => SqlType::Other(lower),
        }
    }

    /// Whether this type holds unbounded binary or character data.
    pub fn is_large_object(&self) -> bool {
        matches!(self, SqlType::Blob | SqlType::Clob)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "boolean",
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::Double => "double precision",
            SqlType::Numeric => "numeric",
            SqlType::Char => "char",
            SqlType::Varchar => "varchar",
            SqlType::Text => "text",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::TimestampTz => "timestamptz",
            SqlType::Uuid => "uuid",
            SqlType::Json => "json",
            SqlType::Binary => "binary",
            SqlType::Blob => "blob",
            SqlType::Clob => "clob",
            SqlType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Portable type class.
    pub sql_type: SqlType,

    /// Raw catalog type name (e.g., "character varying", "lo").
    pub data_type: String,

    /// Schema of the underlying type (`pg_catalog` for built-ins).
    #[serde(default)]
    pub udt_schema: String,

    /// Underlying type name (`int4`, `_text`, an enum's name). Empty when
    /// the column was not read from a catalog.
    #[serde(default)]
    pub udt_name: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Build a column whose raw type name is the display of `sql_type`.
    pub fn new(name: impl Into<String>, sql_type: SqlType, ordinal_pos: i32) -> Self {
        Self {
            name: name.into(),
            data_type: sql_type.to_string(),
            sql_type,
            udt_schema: String::new(),
            udt_name: String::new(),
            is_nullable: true,
            ordinal_pos,
        }
    }
}

/// A validated table: schema, name and ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl TableDescriptor {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns,
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Column types in order.
    pub fn column_types(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.sql_type.clone()).collect()
    }

    /// Find a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
