//! Schema introspection queries for the metadata tools.

use crate::database::connection::RawConnection;
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use tiberius::ToSql;
use tracing::debug;

/// A schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    /// Render as `<schema>.<table>`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A column name with its declared data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// List base tables, optionally filtered to the given schemas.
pub async fn list_tables(
    client: &mut RawConnection,
    schemas: &[String],
) -> Result<Vec<TableRef>, ServerError> {
    let query = tables_query(schemas.len());
    debug!(filter = ?schemas, "listing tables");

    let params: Vec<&dyn ToSql> = schemas.iter().map(|s| s as &dyn ToSql).collect();
    let rows = client
        .query(query.as_str(), &params)
        .await?
        .into_first_result()
        .await?;

    Ok(rows
        .iter()
        .map(|row| TableRef {
            schema: row.try_get::<&str, _>(0).ok().flatten().unwrap_or("").to_string(),
            name: row.try_get::<&str, _>(1).ok().flatten().unwrap_or("").to_string(),
        })
        .collect())
}

/// Look up column names and declared types for a table.
///
/// The match is by unqualified table name, so same-named tables in different
/// schemas produce a merged column list; callers that need disambiguation
/// must qualify at a different layer. An unknown table yields an empty list,
/// which is not an error.
pub async fn describe_table(
    client: &mut RawConnection,
    table_name: &str,
) -> Result<Vec<ColumnDef>, ServerError> {
    const QUERY: &str = "SELECT COLUMN_NAME, DATA_TYPE \
         FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_NAME = @P1 \
         ORDER BY ORDINAL_POSITION";

    debug!(table_name, "describing table");

    let rows = client
        .query(QUERY, &[&table_name])
        .await?
        .into_first_result()
        .await?;

    Ok(rows
        .iter()
        .map(|row| ColumnDef {
            name: row.try_get::<&str, _>(0).ok().flatten().unwrap_or("").to_string(),
            data_type: row.try_get::<&str, _>(1).ok().flatten().unwrap_or("").to_string(),
        })
        .collect())
}

/// Build the table-listing query with `@P1..@Pn` placeholders for an
/// optional schema filter.
fn tables_query(filter_count: usize) -> String {
    let mut query = String::from(
        "SELECT TABLE_SCHEMA, TABLE_NAME \
         FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE'",
    );

    if filter_count > 0 {
        let placeholders: Vec<String> = (1..=filter_count).map(|i| format!("@P{i}")).collect();
        query.push_str(&format!(" AND TABLE_SCHEMA IN ({})", placeholders.join(", ")));
    }

    query.push_str(" ORDER BY TABLE_SCHEMA, TABLE_NAME");
    query
}
