// src/query/compiler.rs
//! Compiles [`QueryParts`] into parameterized SQL
//!
//! find and count share this path: count is a find whose projection is the
//! `count` pseudo-column, so both always match the same rows.

use ahash::AHashSet;
use log::trace;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::{JsonStoreError, Result};
use crate::options::{CountOptions, FindOptions};
use crate::query::QueryParts;
use crate::schema::{
    quote_identifier, CollectionSchema, ColumnRef, COUNT_COLUMN, DELETED_COLUMN, ID_COLUMN,
    JSON_COLUMN,
};
use crate::value::sql_to_json;

/// Columns returned by a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `_id` and `_json`, rehydrated into [`Document`]s
    Default,
    /// Caller-selected declared or reserved fields
    Columns(Vec<ColumnRef>),
    /// `COUNT(*)`
    Count,
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub projection: Projection,
}

/// Result rows of an executed query, deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Documents(Vec<Document>),
    Rows(Vec<Map<String, Value>>),
    Count(u64),
}

impl QueryOutput {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            QueryOutput::Documents(docs) => docs,
            _ => Vec::new(),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            QueryOutput::Documents(docs) => docs.iter().map(Document::to_value).collect(),
            QueryOutput::Rows(rows) => rows.into_iter().map(Value::Object).collect(),
            QueryOutput::Count(count) => vec![Value::from(count)],
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            QueryOutput::Documents(docs) => docs.len() as u64,
            QueryOutput::Rows(rows) => rows.len() as u64,
            QueryOutput::Count(count) => *count,
        }
    }
}

/// Compiles queries against one collection's schema.
pub struct QueryCompiler<'a> {
    collection: &'a str,
    schema: &'a CollectionSchema,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(collection: &'a str, schema: &'a CollectionSchema) -> Self {
        QueryCompiler { collection, schema }
    }

    fn resolve(&self, field: &str) -> Result<ColumnRef> {
        self.schema
            .resolve(field)
            .ok_or_else(|| JsonStoreError::UnknownField {
                collection: self.collection.to_string(),
                field: field.to_string(),
            })
    }

    /// Resolve a `filter` list into a projection.
    pub fn projection(&self, filter: &[String]) -> Result<Projection> {
        match filter {
            [] => Ok(Projection::Default),
            [only] if only == COUNT_COLUMN => Ok(Projection::Count),
            fields => {
                let mut columns = Vec::with_capacity(fields.len());
                for field in fields {
                    if field == COUNT_COLUMN {
                        return Err(JsonStoreError::InvalidQuery(
                            "'count' cannot be combined with other projection fields".to_string(),
                        ));
                    }
                    columns.push(self.resolve(field)?);
                }
                Ok(Projection::Columns(columns))
            }
        }
    }

    /// WHERE clause: parts OR-joined, predicates AND-joined.
    pub fn compile_where(
        &self,
        query: &QueryParts,
        include_deleted: bool,
    ) -> Result<(String, Vec<SqlValue>)> {
        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(query.parts().len());

        for part in query.parts() {
            if part.is_empty() {
                clauses.push("1".to_string());
                continue;
            }
            let mut terms = Vec::with_capacity(part.predicates().len());
            for predicate in part.predicates() {
                let column = self.resolve(predicate.field())?;
                let operand = predicate.operand().for_field_type(column.field_type);
                terms.push(predicate.operator().render(
                    &quote_identifier(&column.column),
                    &operand,
                    &mut params,
                ));
            }
            clauses.push(format!("({})", terms.join(" AND ")));
        }

        let matcher = if clauses.is_empty() {
            "1".to_string()
        } else {
            clauses.join(" OR ")
        };
        let sql = if include_deleted {
            format!("({})", matcher)
        } else {
            format!("({}) AND {} = 0", matcher, quote_identifier(DELETED_COLUMN))
        };
        Ok((sql, params))
    }

    pub fn compile_find(&self, query: &QueryParts, options: &FindOptions) -> Result<CompiledQuery> {
        let projection = self.projection(&options.filter)?;
        let (where_sql, mut params) = self.compile_where(query, options.include_deleted)?;

        let select = match &projection {
            Projection::Default => format!(
                "{}, {}",
                quote_identifier(ID_COLUMN),
                quote_identifier(JSON_COLUMN)
            ),
            Projection::Columns(columns) => columns
                .iter()
                .map(|c| quote_identifier(&c.column))
                .collect::<Vec<_>>()
                .join(", "),
            Projection::Count => "COUNT(*)".to_string(),
        };

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select,
            quote_identifier(self.collection),
            where_sql
        );

        if projection != Projection::Count {
            let mut order = Vec::with_capacity(options.sort.len() + 1);
            let mut sorts_by_id = false;
            for key in &options.sort {
                let column = self.resolve(&key.field)?;
                sorts_by_id |= column.column == ID_COLUMN;
                order.push(format!(
                    "{} {}",
                    quote_identifier(&column.column),
                    key.direction.as_sql()
                ));
            }
            if !sorts_by_id {
                order.push(format!("{} ASC", quote_identifier(ID_COLUMN)));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));

            if options.limit.is_some() || options.offset.is_some() {
                // SQLite needs a LIMIT before OFFSET; -1 means no limit
                let limit = options.limit.map(to_sql_int).unwrap_or(-1);
                let offset = options.offset.map(to_sql_int).unwrap_or(0);
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(limit));
                params.push(SqlValue::Integer(offset));
            }
        }

        Ok(CompiledQuery {
            sql,
            params,
            projection,
        })
    }

    pub fn compile_count(&self, query: &QueryParts, options: &CountOptions) -> Result<CompiledQuery> {
        let find = FindOptions {
            filter: vec![COUNT_COLUMN.to_string()],
            include_deleted: options.include_deleted,
            ..FindOptions::default()
        };
        self.compile_find(query, &find)
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl CompiledQuery {
    /// Run the query and rehydrate its rows.
    pub fn execute(&self, conn: &Connection) -> Result<QueryOutput> {
        trace!("query: {} {:?}", self.sql, self.params);
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let mut rows = stmt.query(params_from_iter(self.params.iter()))?;

        let output = match &self.projection {
            Projection::Count => {
                let count: i64 = match rows.next()? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                QueryOutput::Count(count.max(0) as u64)
            }
            Projection::Default => {
                let mut seen = AHashSet::new();
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    let id: i64 = row.get(0)?;
                    if !seen.insert(id) {
                        continue;
                    }
                    let json: String = row.get(1)?;
                    documents.push(Document::new(id, serde_json::from_str(&json)?));
                }
                QueryOutput::Documents(documents)
            }
            Projection::Columns(columns) => {
                let mut seen = AHashSet::new();
                let mut result = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut object = Map::new();
                    for (index, column) in columns.iter().enumerate() {
                        let raw: SqlValue = row.get(index)?;
                        let value = match raw {
                            SqlValue::Text(text) if column.column == JSON_COLUMN => {
                                serde_json::from_str(&text)?
                            }
                            other => sql_to_json(other),
                        };
                        object.insert(column.name.clone(), value);
                    }
                    let key = serde_json::to_string(&object)?;
                    if seen.insert(key) {
                        result.push(object);
                    }
                }
                QueryOutput::Rows(result)
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryPart, QueryParts};
    use crate::schema::FieldType;

    fn schema() -> CollectionSchema {
        CollectionSchema::new()
            .search_field("name", FieldType::String)
            .search_field("age", FieldType::Integer)
            .search_field("active", FieldType::Boolean)
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let (sql, params) = compiler.compile_where(&QueryParts::all(), false).unwrap();
        assert_eq!(sql, "(1) AND \"_deleted\" = 0");
        assert!(params.is_empty());

        let (sql, _) = compiler.compile_where(&QueryParts::all(), true).unwrap();
        assert_eq!(sql, "(1)");
    }

    #[test]
    fn test_parts_or_joined_predicates_and_joined() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let query = QueryParts::new()
            .or(QueryPart::new().greater_than("age", 1).like("name", "a"))
            .or(QueryPart::new().equal("name", "mike"));
        let (sql, params) = compiler.compile_where(&query, true).unwrap();
        assert_eq!(
            sql,
            "((\"age\" > ? AND \"name\" LIKE ? ESCAPE '\\') OR (\"name\" = ?))"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("%a%".to_string()),
                SqlValue::Text("mike".to_string())
            ]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let query: QueryParts = QueryPart::new().equal("email", "x").into();
        let err = compiler.compile_where(&query, false).unwrap_err();
        assert!(matches!(err, JsonStoreError::UnknownField { ref field, .. } if field == "email"));
    }

    #[test]
    fn test_reserved_columns_always_queryable() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let query: QueryParts = QueryPart::new().equal("_operation", "delete").into();
        assert!(compiler.compile_where(&query, true).is_ok());
    }

    #[test]
    fn test_boolean_operands_normalized() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let query: QueryParts = QueryPart::new().equal("active", "1").into();
        let (_, params) = compiler.compile_where(&query, true).unwrap();
        assert_eq!(params, vec![SqlValue::Integer(1)]);
    }

    #[test]
    fn test_sort_limit_offset() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let options = FindOptions::new()
            .sort_ascending("age")
            .sort_descending("name")
            .with_offset(2);
        let compiled = compiler.compile_find(&QueryParts::all(), &options).unwrap();
        assert!(compiled
            .sql
            .ends_with("ORDER BY \"age\" ASC, \"name\" DESC, \"_id\" ASC LIMIT ? OFFSET ?"));
        assert_eq!(
            compiled.params,
            vec![SqlValue::Integer(-1), SqlValue::Integer(2)]
        );
    }

    #[test]
    fn test_count_is_find_with_count_projection() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        let compiled = compiler
            .compile_count(&QueryParts::all(), &CountOptions::default())
            .unwrap();
        assert_eq!(compiled.projection, Projection::Count);
        assert!(compiled.sql.starts_with("SELECT COUNT(*) FROM \"people\""));
    }

    #[test]
    fn test_projection_resolution() {
        let schema = schema();
        let compiler = QueryCompiler::new("people", &schema);
        assert_eq!(compiler.projection(&[]).unwrap(), Projection::Default);
        match compiler
            .projection(&["name".to_string(), "_dirty".to_string()])
            .unwrap()
        {
            Projection::Columns(columns) => assert_eq!(columns.len(), 2),
            other => panic!("unexpected projection {:?}", other),
        }
        assert!(compiler
            .projection(&["count".to_string(), "name".to_string()])
            .is_err());
        assert!(compiler.projection(&["email".to_string()]).is_err());
    }
}
