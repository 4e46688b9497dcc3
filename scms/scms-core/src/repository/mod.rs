//! Repository abstraction over the backing store.
//!
//! Rows are JSON objects. Queries are expressed with [`Filter`] so a backend
//! can push them down to its own query engine; the reference backends in
//! this module evaluate them in process with [`Filter::matches`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use uuid::Uuid;

pub mod file;
pub mod memory;


pub use file::FileRepository;
pub use memory::MemoryRepository;

pub const ID_FIELD: &str = "_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Folders,
    Documents,
    Permissions,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Folders,
        Collection::Documents,
        Collection::Permissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Folders => "folders",
            Collection::Documents => "documents",
            Collection::Permissions => "permissions",
        }
    }
}

/// Row predicate. A field that is absent never satisfies a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    /// Field is a number or string no greater than the value.
    Lte(String, Value),
    /// Array field contains the value (or scalar field equals it).
    Contains(String, Value),
    /// Field (or any element of an array field) is one of the values.
    In(String, Vec<Value>),
    /// Field is absent or null.
    Missing(String),
    /// Any element of an array-of-objects field matches.
    ElemMatch(String, Box<Filter>),
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Filter::In(field.to_string(), values)
    }

    pub fn missing(field: &str) -> Self {
        Filter::Missing(field.to_string())
    }

    pub fn elem_match(field: &str, inner: Filter) -> Self {
        Filter::ElemMatch(field.to_string(), Box::new(inner))
    }

    pub fn id(id: Uuid) -> Self {
        Filter::eq(ID_FIELD, id.to_string())
    }

    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, want) => row.get(field).map_or(false, |v| v == want),
            Filter::Lte(field, bound) => row
                .get(field)
                .and_then(|v| compare_scalars(v, bound))
                .map_or(false, |ord| ord != Ordering::Greater),
            Filter::Contains(field, want) => match row.get(field) {
                Some(Value::Array(items)) => items.contains(want),
                Some(v) => v == want,
                None => false,
            },
            Filter::In(field, values) => match row.get(field) {
                Some(Value::Array(items)) => items.iter().any(|i| values.contains(i)),
                Some(Value::Null) | None => false,
                Some(v) => values.contains(v),
            },
            Filter::Missing(field) => matches!(row.get(field), None | Some(Value::Null)),
            Filter::ElemMatch(field, inner) => match row.get(field) {
                Some(Value::Array(items)) => items.iter().any(|i| inner.matches(i)),
                _ => false,
            },
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
        }
    }
}

/// Ascending sort keys applied in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<String>,
}

impl Sort {
    pub fn by(field: &str) -> Self {
        Self::default().then(field)
    }

    /// Sort by `field` ascending, breaking ties by `_id`.
    pub fn by_then_id(field: &str) -> Self {
        Self::by(field).then(ID_FIELD)
    }

    pub fn then(mut self, field: &str) -> Self {
        self.keys.push(field.to_string());
        self
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for field in &self.keys {
            let ord = compare_fields(a.get(field), b.get(field));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn apply(&self, rows: &mut [Value]) {
        if !self.keys.is_empty() {
            rows.sort_by(|a, b| self.compare(a, b));
        }
    }
}

/// Join rows of `from` whose `foreign_field` equals the row's `local_field`,
/// storing them as an array under `as_field`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub from: Collection,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

impl Lookup {
    pub fn new(from: Collection, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        Self {
            from,
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
        }
    }
}

/// Result of an unordered bulk upsert.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// `(index in batch, reason)` for every row that was not written.
    pub failed: Vec<(usize, String)>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_by_id(&self, collection: Collection, id: Uuid) -> Result<Option<Value>>;

    async fn find_filtered(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Value>>;

    /// Insert or replace the row stored under `id`.
    async fn upsert_by_id(&self, collection: Collection, id: Uuid, row: Value) -> Result<()>;

    /// Unordered upsert of many rows keyed by `key_fields`. A row matching an
    /// existing record keeps that record's `_id`; otherwise it is inserted
    /// under its own `_id`. Rows that cannot be written are reported in
    /// [`BulkOutcome::failed`] while the others still apply.
    async fn bulk_upsert(
        &self,
        collection: Collection,
        key_fields: &[&str],
        rows: Vec<Value>,
    ) -> Result<BulkOutcome>;

    /// Rows of `collection` joined per `lookup`, then filtered and sorted.
    async fn lookup(
        &self,
        collection: Collection,
        lookup: &Lookup,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Value>>;
}

/// Decode a stored row into its typed record.
pub fn decode<T: DeserializeOwned>(row: Value) -> Result<T> {
    serde_json::from_value(row).map_err(|e| Error::Decode(e.to_string()))
}

/// Decode the joined array stored under `field`. One bad element fails the row.
pub fn decode_joined<T: DeserializeOwned>(row: &Value, field: &str) -> Result<Vec<T>> {
    match row.get(field) {
        Some(Value::Array(items)) => items.iter().cloned().map(decode).collect(),
        _ => Ok(Vec::new()),
    }
}

fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Absent and null sort first; mismatched types fall back to their JSON text.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            compare_scalars(x, y).unwrap_or_else(|| x.to_string().cmp(&y.to_string()))
        }
    }
}
