//! In-process repository. Also the query engine behind [`super::FileRepository`].

use super::{BulkOutcome, Collection, Filter, Lookup, Repository, Sort, ID_FIELD};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Rows per collection, keyed by `_id`.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tables {
    rows: HashMap<Collection, BTreeMap<String, Value>>,
}

impl Tables {
    pub(crate) fn insert_loaded(&mut self, collection: Collection, rows: Vec<Value>) -> Result<()> {
        let table = self.rows.entry(collection).or_default();
        for row in rows {
            let id = row
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Decode(format!("{} row without {ID_FIELD}", collection.as_str()))
                })?
                .to_string();
            table.insert(id, row);
        }
        Ok(())
    }

    pub(crate) fn rows(&self, collection: Collection) -> Vec<Value> {
        self.rows
            .get(&collection)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn find_by_id(&self, collection: Collection, id: Uuid) -> Option<Value> {
        self.rows
            .get(&collection)
            .and_then(|t| t.get(&id.to_string()))
            .cloned()
    }

    pub(crate) fn find_filtered(&self, collection: Collection, filter: &Filter, sort: &Sort) -> Vec<Value> {
        let mut out: Vec<Value> = self
            .rows
            .get(&collection)
            .map(|t| t.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        sort.apply(&mut out);
        out
    }

    pub(crate) fn upsert_by_id(&mut self, collection: Collection, id: Uuid, mut row: Value) -> Result<()> {
        let obj = row
            .as_object_mut()
            .ok_or_else(|| Error::Decode("row is not an object".into()))?;
        obj.insert(ID_FIELD.into(), Value::String(id.to_string()));
        self.rows
            .entry(collection)
            .or_default()
            .insert(id.to_string(), row);
        Ok(())
    }

    pub(crate) fn bulk_upsert(
        &mut self,
        collection: Collection,
        key_fields: &[&str],
        rows: Vec<Value>,
    ) -> BulkOutcome {
        let table = self.rows.entry(collection).or_default();
        let mut by_key: HashMap<String, String> = table
            .iter()
            .filter_map(|(id, row)| key_of(row, key_fields).map(|k| (k, id.clone())))
            .collect();

        let mut outcome = BulkOutcome::default();
        for (index, mut row) in rows.into_iter().enumerate() {
            let Some(key) = key_of(&row, key_fields) else {
                outcome
                    .failed
                    .push((index, format!("missing key field, one of {key_fields:?}")));
                continue;
            };
            let Some(obj) = row.as_object_mut() else {
                outcome.failed.push((index, "row is not an object".into()));
                continue;
            };
            if let Some(existing) = by_key.get(&key) {
                obj.insert(ID_FIELD.into(), Value::String(existing.clone()));
                table.insert(existing.clone(), row);
                outcome.updated += 1;
                continue;
            }
            let Some(id) = obj.get(ID_FIELD).and_then(Value::as_str).map(str::to_string) else {
                outcome.failed.push((index, format!("new row without {ID_FIELD}")));
                continue;
            };
            // An id already used under a different key would silently
            // re-key that record.
            if table.contains_key(&id) {
                outcome
                    .failed
                    .push((index, format!("{ID_FIELD} {id} belongs to another key")));
                continue;
            }
            by_key.insert(key, id.clone());
            table.insert(id, row);
            outcome.inserted += 1;
        }
        outcome
    }

    pub(crate) fn lookup(
        &self,
        collection: Collection,
        lookup: &Lookup,
        filter: &Filter,
        sort: &Sort,
    ) -> Vec<Value> {
        let foreign = self.rows.get(&lookup.from);
        let mut out = Vec::new();
        for row in self.rows.get(&collection).into_iter().flat_map(|t| t.values()) {
            let local = row.get(&lookup.local_field).filter(|v| !v.is_null());
            let joined: Vec<Value> = match (local, foreign) {
                (Some(local), Some(foreign)) => foreign
                    .values()
                    .filter(|f| f.get(&lookup.foreign_field) == Some(local))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            let mut row = row.clone();
            if let Some(obj) = row.as_object_mut() {
                obj.insert(lookup.as_field.clone(), Value::Array(joined));
            }
            if filter.matches(&row) {
                out.push(row);
            }
        }
        sort.apply(&mut out);
        out
    }
}

/// Composite key text, or `None` when a key field is absent or null.
fn key_of(row: &Value, key_fields: &[&str]) -> Option<String> {
    let parts: Option<Vec<&Value>> = key_fields
        .iter()
        .map(|k| row.get(*k).filter(|v| !v.is_null()))
        .collect();
    serde_json::to_string(&parts?).ok()
}

/// Repository held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored in `collection`.
    pub fn count(&self, collection: Collection) -> usize {
        self.tables.read().rows(collection).len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_by_id(&self, collection: Collection, id: Uuid) -> Result<Option<Value>> {
        Ok(self.tables.read().find_by_id(collection, id))
    }

    async fn find_filtered(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Value>> {
        Ok(self.tables.read().find_filtered(collection, filter, sort))
    }

    async fn upsert_by_id(&self, collection: Collection, id: Uuid, row: Value) -> Result<()> {
        self.tables.write().upsert_by_id(collection, id, row)
    }

    async fn bulk_upsert(
        &self,
        collection: Collection,
        key_fields: &[&str],
        rows: Vec<Value>,
    ) -> Result<BulkOutcome> {
        Ok(self.tables.write().bulk_upsert(collection, key_fields, rows))
    }

    async fn lookup(
        &self,
        collection: Collection,
        lookup: &Lookup,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Value>> {
        Ok(self.tables.read().lookup(collection, lookup, filter, sort))
    }
}
