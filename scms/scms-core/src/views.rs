//! Typed page models handed to the presentation layer. They never carry
//! ciphertext or password verifiers.

use crate::model::{Capability, Document, Folder, Permission, UserSummary};
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub folder_id: Option<Uuid>,
    pub edited: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            folder_id: doc.folder_id,
            edited: doc.edited,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DocumentView {
    pub id: Uuid,
    pub title: String,
    pub folder_id: Option<Uuid>,
    /// Level as declared; `None` when inherited.
    pub level: Option<i32>,
    pub effective_level: i32,
    pub body: String,
    /// Set when the stored body could not be decrypted.
    pub body_unavailable: bool,
    pub created: DateTime<Utc>,
    pub edited: DateTime<Utc>,
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GrantView {
    pub user_id: Uuid,
    pub user: Option<UserSummary>,
    pub list: bool,
    pub read: bool,
    pub update: bool,
    pub create: bool,
    pub delete: bool,
}

impl From<&Permission> for GrantView {
    fn from(grant: &Permission) -> Self {
        Self {
            user_id: grant.user_id,
            user: grant.user.clone(),
            list: grant.list,
            read: grant.read,
            update: grant.update,
            create: grant.create,
            delete: grant.delete,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FolderView {
    pub id: Uuid,
    pub name: String,
    pub level: i32,
    pub user_ids: Vec<Uuid>,
    pub documents: Vec<DocumentSummary>,
    /// Only filled in for administrators.
    pub grants: Vec<GrantView>,
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: Uuid,
    pub name: String,
    pub level: i32,
    pub documents: Vec<DocumentSummary>,
}

impl FolderEntry {
    pub fn new(folder: &Folder, documents: &[Document]) -> Self {
        Self {
            id: folder.id,
            name: folder.name.clone(),
            level: folder.level,
            documents: documents.iter().map(DocumentSummary::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct IndexView {
    pub principal: Principal,
    pub folders: Vec<FolderEntry>,
    pub unfiled: Vec<DocumentSummary>,
}
