//! PostgreSQL SQL dialect (Strategy pattern).

use super::value::is_text_transported;
use crate::core::traits::Dialect;
use crate::core::Column;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Embedded double quotes are doubled
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn column_param(&self, index: usize, column: &Column) -> String {
        if !is_text_transported(column) {
            return self.param_placeholder(index);
        }
        // Binding as text keeps the parameter type `text`; the second cast
        // is an I/O conversion into the column type.
        let target = if column.udt_schema.is_empty() {
            self.quote_ident(&column.udt_name)
        } else {
            self.qualify(&column.udt_schema, &column.udt_name)
        };
        format!("${}::text::{}", index, target)
    }
}
