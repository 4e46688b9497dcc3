//! Selection of the folders and documents a principal may see.
//!
//! The admin, level, ownership and grant rules of [`crate::policy`] are
//! expressed once per principal as a [`Filter`] and pushed to the repository
//! instead of evaluating every row individually.

use crate::error::{Error, Result};
use crate::model::{Capability, Document, Folder};
use crate::permissions::PermissionStore;
use crate::principal::Principal;
use crate::repository::{decode, Collection, Filter, Lookup, Repository, Sort, ID_FIELD};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const JOINED_DOCUMENTS: &str = "documents";

/// Predicates for one principal.
#[derive(Clone, Debug, PartialEq)]
pub struct VisibilityPredicate {
    pub folders: Filter,
    pub documents: Filter,
    level: i32,
    admin: bool,
}

impl VisibilityPredicate {
    /// `list_grants` and `read_grants` are the folder ids where the principal
    /// holds a grant with that capability.
    pub fn new(principal: &Principal, list_grants: Vec<Uuid>, read_grants: Vec<Uuid>) -> Self {
        if principal.admin {
            return Self {
                folders: Filter::All,
                documents: Filter::All,
                level: principal.level,
                admin: true,
            };
        }
        let ids = |v: Vec<Uuid>| -> Vec<Value> {
            v.into_iter().map(|id| Value::String(id.to_string())).collect()
        };
        let owner = principal.id.to_string();
        let mut folders = vec![
            Filter::lte("level", principal.level),
            Filter::contains("userIDs", owner.clone()),
            Filter::is_in(ID_FIELD, ids(list_grants)),
        ];
        // A folder stored without a level is level 0.
        if principal.level >= 0 {
            folders.push(Filter::missing("level"));
        }
        Self {
            folders: Filter::Or(folders),
            documents: Filter::Or(vec![
                Filter::lte("level", principal.level),
                Filter::contains("userIDs", owner),
                Filter::is_in("folderId", ids(read_grants)),
            ]),
            level: principal.level,
            admin: false,
        }
    }

    /// Whether a stored document row is visible, given the level of the
    /// folder it sits in (`None` when unfiled).
    pub fn admits_document(&self, row: &Value, folder_level: Option<i32>) -> bool {
        if self.admin || self.documents.matches(row) {
            return true;
        }
        // A document without its own level takes the folder's, or 0.
        Filter::missing("level").matches(row) && folder_level.unwrap_or(0) <= self.level
    }
}

#[derive(Clone)]
pub struct VisibilityFilter {
    repo: Arc<dyn Repository>,
    grants: PermissionStore,
}

impl VisibilityFilter {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        let grants = PermissionStore::new(repo.clone());
        Self { repo, grants }
    }

    pub async fn predicate(&self, principal: &Principal) -> Result<VisibilityPredicate> {
        if principal.admin {
            return Ok(VisibilityPredicate::new(principal, Vec::new(), Vec::new()));
        }
        let held = self.grants.grants_for_user(principal.id).await?;
        let with = |cap: Capability| {
            held.iter()
                .filter(|g| g.allows(cap))
                .map(|g| g.folder_id)
                .collect::<Vec<_>>()
        };
        let predicate = VisibilityPredicate::new(principal, with(Capability::List), with(Capability::Read));
        debug!(principal = %principal.id, grants = held.len(), "built visibility predicate");
        Ok(predicate)
    }

    /// Visible folders by name, each with its visible documents by title.
    ///
    /// A folder is listed when it is visible itself or when any of its
    /// documents is. A visible folder with no visible documents is still
    /// listed.
    pub async fn visible_folders(&self, principal: &Principal) -> Result<Vec<(Folder, Vec<Document>)>> {
        let predicate = self.predicate(principal).await?;
        let lookup = Lookup::new(Collection::Documents, ID_FIELD, "folderId", JOINED_DOCUMENTS);
        let filter = Filter::Or(vec![
            predicate.folders.clone(),
            Filter::elem_match(JOINED_DOCUMENTS, predicate.documents.clone()),
        ]);
        let rows = self
            .repo
            .lookup(Collection::Folders, &lookup, &filter, &Sort::by_then_id("name"))
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            let joined = match row.as_object_mut().and_then(|o| o.remove(JOINED_DOCUMENTS)) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let folder: Folder = decode(row)?;
            let documents = visible_in(&predicate, joined, Some(folder.level))?;
            out.push((folder, documents));
        }
        Ok(out)
    }

    /// Visible documents of one folder by title.
    pub async fn visible_documents(&self, principal: &Principal, folder_id: Uuid) -> Result<Vec<Document>> {
        let folder = self
            .repo
            .find_by_id(Collection::Folders, folder_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                collection: Collection::Folders.as_str(),
                id: folder_id.to_string(),
            })?;
        let folder: Folder = decode(folder)?;
        let predicate = self.predicate(principal).await?;
        let rows = self
            .repo
            .find_filtered(
                Collection::Documents,
                &Filter::eq("folderId", folder_id.to_string()),
                &Sort::default(),
            )
            .await?;
        visible_in(&predicate, rows, Some(folder.level))
    }

    /// Visible documents that belong to no folder, by title. A document whose
    /// folder no longer exists counts as unfiled.
    pub async fn visible_unfiled(&self, principal: &Principal) -> Result<Vec<Document>> {
        let predicate = self.predicate(principal).await?;
        let folder_ids: Vec<Value> = self
            .repo
            .find_filtered(Collection::Folders, &Filter::All, &Sort::default())
            .await?
            .into_iter()
            .filter_map(|mut row| row.as_object_mut().and_then(|o| o.remove(ID_FIELD)))
            .collect();
        let filed = Filter::is_in("folderId", folder_ids);
        let rows: Vec<Value> = self
            .repo
            .find_filtered(Collection::Documents, &Filter::All, &Sort::default())
            .await?
            .into_iter()
            .filter(|row| !filed.matches(row))
            .collect();
        visible_in(&predicate, rows, None)
    }
}

fn visible_in(
    predicate: &VisibilityPredicate,
    rows: Vec<Value>,
    folder_level: Option<i32>,
) -> Result<Vec<Document>> {
    let mut rows: Vec<Value> = rows
        .into_iter()
        .filter(|r| predicate.admits_document(r, folder_level))
        .collect();
    Sort::by_then_id("title").apply(&mut rows);
    rows.into_iter().map(decode).collect()
}
