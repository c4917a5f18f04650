// jsonstore-core/src/catalog.rs
//! Physical layout of collections
//!
//! Each collection is one table. The `jsonstore_catalog` table keeps the
//! declared schema of every collection as JSON, so a reopened store can
//! hand out handles without the caller declaring the fields again.

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::schema::{
    quote_identifier, CollectionSchema, DELETED_COLUMN, DIRTY_COLUMN, ID_COLUMN, JSON_COLUMN,
    OPERATION_COLUMN,
};

pub const CATALOG_TABLE: &str = "jsonstore_catalog";

pub(crate) fn ensure_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY NOT NULL, schema TEXT NOT NULL)",
        CATALOG_TABLE
    ))?;
    Ok(())
}

pub(crate) fn load_schema(conn: &Connection, name: &str) -> Result<Option<CollectionSchema>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT schema FROM {} WHERE name = ?1",
        CATALOG_TABLE
    ))?;
    let text: Option<String> = stmt
        .query_row(params![name], |row| row.get(0))
        .optional()?;
    match text {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub(crate) fn save_schema(conn: &Connection, name: &str, schema: &CollectionSchema) -> Result<()> {
    let text = serde_json::to_string(schema)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (name, schema) VALUES (?1, ?2)",
            CATALOG_TABLE
        ),
        params![name, text],
    )?;
    Ok(())
}

/// An existing collection whose name equals `name` ignoring ASCII case, but
/// is spelled differently. SQLite table names are case-insensitive.
pub(crate) fn case_variant(conn: &Connection, name: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT name FROM {} WHERE name = ?1 COLLATE NOCASE AND name != ?1",
        CATALOG_TABLE
    ))?;
    let existing = stmt
        .query_row(params![name], |row| row.get(0))
        .optional()?;
    Ok(existing)
}

pub(crate) fn collection_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT name FROM {} ORDER BY name",
        CATALOG_TABLE
    ))?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Column names of a table, or `None` if it does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    if columns.is_empty() {
        Ok(None)
    } else {
        Ok(Some(columns))
    }
}

/// Create the collection table, its indexes and its catalog entry.
pub(crate) fn create_collection(
    conn: &Connection,
    name: &str,
    schema: &CollectionSchema,
) -> Result<()> {
    let table = quote_identifier(name);
    let mut columns = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_identifier(ID_COLUMN)),
        format!("{} TEXT NOT NULL", quote_identifier(JSON_COLUMN)),
        format!("{} INTEGER NOT NULL DEFAULT 0", quote_identifier(DIRTY_COLUMN)),
        format!("{} INTEGER NOT NULL DEFAULT 0", quote_identifier(DELETED_COLUMN)),
        format!("{} TEXT NOT NULL DEFAULT ''", quote_identifier(OPERATION_COLUMN)),
    ];
    for field in schema.fields() {
        columns.push(format!(
            "{} {}",
            quote_identifier(&field.column()),
            field.field_type.sql_affinity()
        ));
    }

    let mut sql = format!("CREATE TABLE {} ({});\n", table, columns.join(", "));
    let indexed = schema
        .fields()
        .map(|f| f.column())
        .chain(std::iter::once(DIRTY_COLUMN.to_string()));
    for column in indexed {
        sql.push_str(&format!(
            "CREATE INDEX {} ON {} ({});\n",
            quote_identifier(&index_name(name, &column)),
            table,
            quote_identifier(&column)
        ));
    }
    conn.execute_batch(&sql)?;
    save_schema(conn, name, schema)?;
    debug!("Created collection '{}' with columns {:?}", name, schema.columns());
    Ok(())
}

/// `$` never appears in a collection name or a sanitized column, so index
/// names cannot collide across collections.
fn index_name(collection: &str, column: &str) -> String {
    format!("{}$idx${}", collection, column)
}

/// Drop the collection table and forget its schema.
pub(crate) fn drop_collection(conn: &Connection, name: &str) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))?;
    conn.execute(
        &format!("DELETE FROM {} WHERE name = ?1", CATALOG_TABLE),
        params![name],
    )?;
    debug!("Dropped collection '{}'", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_catalog(&conn).unwrap();
        conn
    }

    fn people() -> CollectionSchema {
        CollectionSchema::new()
            .search_field("name", FieldType::String)
            .search_field("address.city", FieldType::String)
            .additional_search_field("owner", FieldType::String)
    }

    #[test]
    fn test_create_collection_layout() {
        let conn = conn();
        create_collection(&conn, "people", &people()).unwrap();
        let columns = table_columns(&conn, "people").unwrap().unwrap();
        assert_eq!(
            columns,
            vec![
                "_id",
                "_json",
                "_dirty",
                "_deleted",
                "_operation",
                "name",
                "address_city",
                "owner"
            ]
        );
        assert_eq!(load_schema(&conn, "people").unwrap(), Some(people()));
        assert_eq!(collection_names(&conn).unwrap(), vec!["people"]);
    }

    #[test]
    fn test_missing_table_has_no_columns() {
        let conn = conn();
        assert_eq!(table_columns(&conn, "nothing").unwrap(), None);
        assert_eq!(load_schema(&conn, "nothing").unwrap(), None);
    }

    #[test]
    fn test_index_names_do_not_collide() {
        let conn = conn();
        let first = CollectionSchema::new().search_field("q_idx_r", FieldType::String);
        let second = CollectionSchema::new().search_field("r", FieldType::String);
        create_collection(&conn, "p", &first).unwrap();
        create_collection(&conn, "p_idx_q", &second).unwrap();
        assert_eq!(collection_names(&conn).unwrap(), vec!["p", "p_idx_q"]);
    }

    #[test]
    fn test_case_variant_lookup() {
        let conn = conn();
        create_collection(&conn, "people", &people()).unwrap();
        assert_eq!(case_variant(&conn, "People").unwrap(), Some("people".to_string()));
        assert_eq!(case_variant(&conn, "people").unwrap(), None);
        assert_eq!(case_variant(&conn, "notes").unwrap(), None);
    }

    #[test]
    fn test_drop_collection_forgets_schema() {
        let conn = conn();
        create_collection(&conn, "people", &people()).unwrap();
        drop_collection(&conn, "people").unwrap();
        assert_eq!(table_columns(&conn, "people").unwrap(), None);
        assert!(collection_names(&conn).unwrap().is_empty());
    }
}
