//! information_schema lookups shared by the source and destination sides.

use deadpool_postgres::Pool;

use crate::core::{Column, SqlType};
use crate::error::{MigrateError, Result};

pub(super) async fn schema_exists(pool: &Pool, schema: &str) -> Result<bool> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, "getting connection for schema lookup"))?;

    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
            &[&schema],
        )
        .await?;
    Ok(row.get(0))
}

pub(super) async fn table_exists(pool: &Pool, schema: &str, table: &str) -> Result<bool> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, "getting connection for table lookup"))?;

    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2 AND table_type = 'BASE TABLE'
            )
            "#,
            &[&schema, &table],
        )
        .await?;
    Ok(row.get(0))
}

pub(super) async fn columns(pool: &Pool, schema: &str, table: &str) -> Result<Vec<Column>> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, "getting connection for column lookup"))?;

    let rows = client
        .query(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                udt_name::text,
                is_nullable = 'YES',
                ordinal_position::int4,
                udt_schema::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
            &[&schema, &table],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let data_type: String = row.get(1);
            let udt_name: String = row.get(2);
            let sql_type = SqlType::from_catalog(&data_type, &udt_name);
            let mut column = Column::new(row.get::<_, String>(0), sql_type, row.get(4));
            column.data_type = if data_type == "USER-DEFINED" {
                udt_name.clone()
            } else {
                data_type
            };
            column.udt_schema = row.get(5);
            column.udt_name = udt_name;
            column.is_nullable = row.get(3);
            column
        })
        .collect())
}
