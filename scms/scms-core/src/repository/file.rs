//! Directory-backed repository: one JSON array file per collection, loaded at
//! open and rewritten after every mutation. A mutation becomes visible only
//! once its collection file has been written.

use super::memory::Tables;
use super::{BulkOutcome, Collection, Filter, Lookup, Repository, Sort};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use uuid::Uuid;

pub struct FileRepository {
    dir: PathBuf,
    tables: RwLock<Tables>,
}

impl FileRepository {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(unavailable)?;
        let mut tables = Tables::default();
        for collection in Collection::ALL {
            let path = collection_path(&dir, collection);
            if !path.exists() {
                continue;
            }
            let data = std::fs::read_to_string(&path).map_err(unavailable)?;
            let rows: Vec<Value> = serde_json::from_str(&data)?;
            debug!(collection = collection.as_str(), rows = rows.len(), "loaded collection");
            tables.insert_loaded(collection, rows)?;
        }
        Ok(Self {
            dir,
            tables: RwLock::new(tables),
        })
    }

    /// Directory where collections are persisted.
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    fn persist(&self, tables: &Tables, collection: Collection) -> Result<()> {
        let path = collection_path(&self.dir, collection);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&tables.rows(collection))?;
        std::fs::write(&tmp, data)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                error!(path = %path.display(), "failed to persist collection: {e}");
                unavailable(e)
            })
    }
}

fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.as_str()))
}

fn unavailable(e: std::io::Error) -> Error {
    Error::RepositoryUnavailable(e.to_string())
}

#[async_trait]
impl Repository for FileRepository {
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
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        staged.upsert_by_id(collection, id, row)?;
        self.persist(&staged, collection)?;
        *tables = staged;
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        collection: Collection,
        key_fields: &[&str],
        rows: Vec<Value>,
    ) -> Result<BulkOutcome> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let outcome = staged.bulk_upsert(collection, key_fields, rows);
        if outcome.inserted + outcome.updated > 0 {
            self.persist(&staged, collection)?;
            *tables = staged;
        }
        Ok(outcome)
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
