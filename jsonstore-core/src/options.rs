// jsonstore-core/src/options.rs
// Per-operation option records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Options for find queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindOptions {
    /// Maximum number of rows to return
    pub limit: Option<usize>,

    /// Rows to skip after sorting
    pub offset: Option<usize>,

    /// Sort keys; the first key added is the primary one
    pub sort: Vec<SortKey>,

    /// Projection: declared or reserved fields to return instead of `{_id, json}`
    pub filter: Vec<String>,

    /// Include tombstoned documents
    pub include_deleted: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn sort_ascending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn sort_descending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn with_filter<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.filter = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountOptions {
    pub include_deleted: bool,
}

impl CountOptions {
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddOptions {
    /// Values for the collection's additional search fields, applied to every document
    pub additional_search_fields: HashMap<String, Scalar>,
    pub mark_dirty: bool,
}

impl AddOptions {
    pub fn mark_dirty(mut self, mark_dirty: bool) -> Self {
        self.mark_dirty = mark_dirty;
        self
    }

    pub fn with_additional_field(mut self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.additional_search_fields
            .insert(field.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplaceOptions {
    pub mark_dirty: bool,
}

impl ReplaceOptions {
    pub fn mark_dirty(mut self, mark_dirty: bool) -> Self {
        self.mark_dirty = mark_dirty;
        self
    }
}

/// Remove defaults to dirty tracking: rows are tombstoned until marked clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveOptions {
    pub mark_dirty: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        RemoveOptions { mark_dirty: true }
    }
}

impl RemoveOptions {
    pub fn mark_dirty(mut self, mark_dirty: bool) -> Self {
        self.mark_dirty = mark_dirty;
        self
    }
}

/// Options for `change` (upsert)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeOptions {
    /// Search fields compared for equality; empty means nothing ever matches
    pub replace_criteria: Vec<String>,
    /// Insert documents that match nothing
    pub add_new: bool,
    pub mark_dirty: bool,
}

impl ChangeOptions {
    pub fn with_criteria<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.replace_criteria = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_new(mut self, add_new: bool) -> Self {
        self.add_new = add_new;
        self
    }

    pub fn mark_dirty(mut self, mark_dirty: bool) -> Self {
        self.mark_dirty = mark_dirty;
        self
    }
}

/// Options for opening a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenCollectionOptions {
    /// Drop and recreate the collection when its declared fields changed
    pub drop_collection: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        assert!(RemoveOptions::default().mark_dirty);
        assert!(!AddOptions::default().mark_dirty);
        assert!(!ReplaceOptions::default().mark_dirty);
        let change = ChangeOptions::default();
        assert!(change.replace_criteria.is_empty());
        assert!(!change.add_new);
        let find = FindOptions::default();
        assert_eq!(find.limit, None);
        assert!(!find.include_deleted);
    }

    #[test]
    fn test_sort_keys_keep_insertion_order() {
        let options = FindOptions::new().sort_ascending("a").sort_descending("b");
        assert_eq!(options.sort[0].field, "a");
        assert_eq!(options.sort[0].direction, SortDirection::Asc);
        assert_eq!(options.sort[1].direction, SortDirection::Desc);
    }

    #[test]
    fn test_find_options_from_json() {
        let options: FindOptions = serde_json::from_value(json!({
            "limit": 5,
            "sort": [{"field": "age", "direction": "DESC"}],
            "includeDeleted": true
        }))
        .unwrap();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.sort[0].direction, SortDirection::Desc);
        assert!(options.include_deleted);
    }

    #[test]
    fn test_remove_options_from_empty_json_keeps_dirty_default() {
        let options: RemoveOptions = serde_json::from_value(json!({})).unwrap();
        assert!(options.mark_dirty);
    }
}
