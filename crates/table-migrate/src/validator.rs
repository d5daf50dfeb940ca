//! Schema validation: existence checks and column extraction.

use tracing::{debug, warn};

use crate::core::{CatalogReader, TableDescriptor};
use crate::error::{MigrateError, Result};

/// Confirms a table exists and extracts its column metadata.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate `schema.table` against the catalog.
    ///
    /// Fails with `SchemaNotFound`, `TableNotFound` or, on the first
    /// large-object column, `UnsupportedColumnType`. No partial descriptor
    /// is ever returned.
    pub async fn validate<C>(schema: &str, table: &str, catalog: &C) -> Result<TableDescriptor>
    where
        C: CatalogReader + ?Sized,
    {
        if !catalog.schema_exists(schema).await? {
            return Err(MigrateError::SchemaNotFound(schema.to_string()));
        }

        if !catalog.table_exists(schema, table).await? {
            return Err(MigrateError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }

        let mut columns = catalog.columns(schema, table).await?;
        columns.sort_by_key(|c| c.ordinal_pos);

        if let Some(col) = columns.iter().find(|c| c.sql_type.is_large_object()) {
            return Err(MigrateError::UnsupportedColumnType {
                table: format!("{schema}.{table}"),
                column: col.name.clone(),
                sql_type: col.data_type.clone(),
            });
        }

        if columns.is_empty() {
            return Err(MigrateError::MigrationFailed(format!(
                "table {schema}.{table} has no columns"
            )));
        }

        debug!("Validated {}.{} with {} columns", schema, table, columns.len());
        Ok(TableDescriptor::new(schema, table, columns))
    }

    /// Check that every destination column can be read from the source.
    ///
    /// Matching is by exact name. Types are not compared; extra source
    /// columns are skipped with a warning.
    pub fn check_columns(source: &TableDescriptor, destination: &TableDescriptor) -> Result<()> {
        let missing: Vec<String> = destination
            .columns
            .iter()
            .filter(|c| source.column(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect();

        if !missing.is_empty() {
            return Err(MigrateError::ColumnMismatch {
                source_table: source.full_name(),
                missing,
            });
        }

        let extra: Vec<&str> = source
            .columns
            .iter()
            .filter(|c| destination.column(&c.name).is_none())
            .map(|c| c.name.as_str())
            .collect();
        if !extra.is_empty() {
            warn!(
                "Source {} has columns not present in {}; they will not be copied: {}",
                source.full_name(),
                destination.full_name(),
                extra.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::core::{Column, SqlType};

    #[derive(Default)]
    struct Catalog {
        tables: HashMap<(String, String), Vec<Column>>,
    }

    impl Catalog {
        fn with(mut self, schema: &str, table: &str, columns: Vec<Column>) -> Self {
            self.tables
                .insert((schema.to_string(), table.to_string()), columns);
            self
        }
    }

    #[async_trait]
    impl CatalogReader for Catalog {
        async fn schema_exists(&self, schema: &str) -> Result<bool> {
            Ok(self.tables.keys().any(|(s, _)| s == schema))
        }

        async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
            Ok(self
                .tables
                .contains_key(&(schema.to_string(), table.to_string())))
        }

        async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
            Ok(self
                .tables
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn orders() -> Vec<Column> {
        vec![
            Column::new("id", SqlType::BigInt, 1),
            Column::new("customer", SqlType::Varchar, 2),
            Column::new("total", SqlType::Numeric, 3),
        ]
    }

    #[tokio::test]
    async fn test_validate_returns_columns_in_ordinal_order() {
        let mut cols = orders();
        cols.reverse();
        let catalog = Catalog::default().with("public", "orders", cols);

        let desc = SchemaValidator::validate("public", "orders", &catalog)
            .await
            .unwrap();
        assert_eq!(desc.column_names(), vec!["id", "customer", "total"]);
    }

    #[tokio::test]
    async fn test_validate_missing_schema() {
        let catalog = Catalog::default().with("public", "orders", orders());
        let err = SchemaValidator::validate("sales", "orders", &catalog)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::SchemaNotFound(s) if s == "sales"));
    }

    #[tokio::test]
    async fn test_validate_missing_table() {
        let catalog = Catalog::default().with("public", "orders", orders());
        let err = SchemaValidator::validate("public", "invoices", &catalog)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound { table, .. } if table == "invoices"));
    }

    #[tokio::test]
    async fn test_validate_rejects_first_large_object() {
        let mut cols = orders();
        cols.push(Column::new("scan", SqlType::Blob, 4));
        cols.push(Column::new("notes", SqlType::Clob, 5));
        let catalog = Catalog::default().with("public", "orders", cols);

        let err = SchemaValidator::validate("public", "orders", &catalog)
            .await
            .unwrap_err();
        match err {
            MigrateError::UnsupportedColumnType { column, .. } => assert_eq!(column, "scan"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_table_definition() {
        let catalog = Catalog::default().with("public", "empty", Vec::new());
        let err = SchemaValidator::validate("public", "empty", &catalog)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::MigrationFailed(_)));
    }

    #[test]
    fn test_check_columns() {
        let src = TableDescriptor::new("public", "orders", orders());
        let mut dst_cols = orders();
        dst_cols.remove(1);
        let dst = TableDescriptor::new("public", "orders_copy", dst_cols);

        // Extra source column is fine
        assert!(SchemaValidator::check_columns(&src, &dst).is_ok());

        // Missing source column is not
        let err = SchemaValidator::check_columns(&dst, &src).unwrap_err();
        match err {
            MigrateError::ColumnMismatch { missing, .. } => assert_eq!(missing, vec!["customer"]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
