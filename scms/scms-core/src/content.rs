//! Read and write paths for folders and documents.
//!
//! Every operation takes the request's [`Principal`] explicitly and checks it
//! against [`crate::policy`] before touching the repository.

use crate::codec::{Codec, TECH_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::model::{Capability, Document, Folder, Permission};
use crate::permissions::{PermissionStore, SaveReport};
use crate::policy::{allowed_capabilities, can_access, Resource};
use crate::principal::Principal;
use crate::repository::{decode, Collection, Repository};
use crate::views::{DocumentSummary, DocumentView, FolderEntry, FolderView, GrantView, IndexView};
use crate::visibility::VisibilityFilter;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Document fields supplied by an editor. `id: None` creates a new document.
#[derive(Clone, Debug, Default)]
pub struct DocumentDraft {
    pub id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub folder_id: Option<Uuid>,
    pub level: Option<i32>,
    pub user_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Default)]
pub struct FolderDraft {
    pub id: Option<Uuid>,
    pub name: String,
    pub level: i32,
    pub user_ids: Vec<Uuid>,
}

/// Guard for documents created outside any folder.
const UNFILED: Resource<'static> = Resource {
    folder_id: None,
    level: 0,
    user_ids: &[],
    grants: &[],
};

#[derive(Clone)]
pub struct ContentService {
    repo: Arc<dyn Repository>,
    codec: Arc<Codec>,
    grants: PermissionStore,
    visibility: VisibilityFilter,
}

impl ContentService {
    pub fn new(repo: Arc<dyn Repository>, codec: Arc<Codec>) -> Self {
        Self {
            grants: PermissionStore::new(repo.clone()),
            visibility: VisibilityFilter::new(repo.clone()),
            repo,
            codec,
        }
    }

    pub fn grants(&self) -> &PermissionStore {
        &self.grants
    }

    pub fn visibility(&self) -> &VisibilityFilter {
        &self.visibility
    }

    pub async fn open_document(&self, principal: &Principal, id: Uuid) -> Result<DocumentView> {
        let doc = self.document(id).await?;
        let folder = self.parent_of(&doc).await?;
        let resource = Resource::document(&doc, folder.as_ref());
        if !can_access(principal, &resource, Capability::Read) {
            return Err(Error::Forbidden(Capability::Read));
        }

        let (body, body_unavailable) = if principal.tech {
            (TECH_PLACEHOLDER.to_string(), false)
        } else {
            match self.codec.decrypt_text(&doc.body) {
                Ok(text) => (text, false),
                Err(e) => {
                    warn!(document = %doc.id, "document body unavailable: {e}");
                    (String::new(), true)
                }
            }
        };

        Ok(DocumentView {
            id: doc.id,
            title: doc.title.clone(),
            folder_id: doc.folder_id,
            level: doc.level,
            effective_level: resource.level,
            body,
            body_unavailable,
            created: doc.created,
            edited: doc.edited,
            capabilities: allowed_capabilities(principal, &resource),
        })
    }

    /// The stored document as an editable draft, body decrypted. Needs `read`.
    /// Tech principals get the placeholder instead of the body. A document
    /// whose folder is gone comes back unfiled.
    pub async fn draft_for(&self, principal: &Principal, id: Uuid) -> Result<DocumentDraft> {
        let doc = self.document(id).await?;
        let folder = self.parent_of(&doc).await?;
        if !can_access(principal, &Resource::document(&doc, folder.as_ref()), Capability::Read) {
            return Err(Error::Forbidden(Capability::Read));
        }
        Ok(DocumentDraft {
            id: Some(doc.id),
            body: if principal.tech {
                TECH_PLACEHOLDER.to_string()
            } else {
                self.codec.decrypt_text(&doc.body)?
            },
            title: doc.title,
            folder_id: folder.map(|f| f.id),
            level: doc.level,
            user_ids: doc.user_ids,
        })
    }

    /// Create or update a document. Creating needs `create` on the target
    /// folder (or on the unfiled area); updating needs `write` on the
    /// document, plus `create` on the new folder when it moves.
    pub async fn save_document(&self, principal: &Principal, draft: DocumentDraft) -> Result<Document> {
        let existing = match draft.id {
            Some(id) => self.find_document(id).await?,
            None => None,
        };
        let target = match draft.folder_id {
            Some(folder_id) => Some(self.folder(folder_id).await?),
            None => None,
        };
        let create_guard = target.as_ref().map(Resource::folder).unwrap_or(UNFILED);

        if let Some(existing) = &existing {
            let parent = self.parent_of(existing).await?;
            let resource = Resource::document(existing, parent.as_ref());
            if !can_access(principal, &resource, Capability::Write) {
                return Err(Error::Forbidden(Capability::Write));
            }
            if existing.folder_id != draft.folder_id
                && !can_access(principal, &create_guard, Capability::Create)
            {
                return Err(Error::Forbidden(Capability::Create));
            }
        } else if !can_access(principal, &create_guard, Capability::Create) {
            return Err(Error::Forbidden(Capability::Create));
        }

        let now = Utc::now();
        let doc = Document {
            id: draft.id.unwrap_or_else(Uuid::new_v4),
            title: draft.title,
            body: self.codec.encrypt(draft.body.as_bytes())?,
            folder_id: draft.folder_id,
            level: draft.level,
            user_ids: draft.user_ids,
            created: existing.as_ref().map_or(now, |d| d.created),
            edited: now,
        };
        self.repo
            .upsert_by_id(Collection::Documents, doc.id, serde_json::to_value(&doc)?)
            .await?;
        info!(document = %doc.id, by = %principal.id, "saved document");
        Ok(doc)
    }

    /// Create or update a folder. Administrators only.
    pub async fn save_folder(&self, principal: &Principal, draft: FolderDraft) -> Result<Folder> {
        if !principal.admin {
            let denied = if draft.id.is_some() {
                Capability::Write
            } else {
                Capability::Create
            };
            return Err(Error::Forbidden(denied));
        }
        let mut folder = Folder::new(draft.name, draft.level);
        if let Some(id) = draft.id {
            folder.id = id;
        }
        folder.user_ids = draft.user_ids;
        self.repo
            .upsert_by_id(Collection::Folders, folder.id, serde_json::to_value(&folder)?)
            .await?;
        info!(folder = %folder.id, name = %folder.name, "saved folder");
        Ok(folder)
    }

    /// A folder with its visible documents. Grants are shown to
    /// administrators only.
    ///
    /// Opens for anyone who may list the folder or read one of its documents,
    /// the same rule that puts the folder in the index.
    pub async fn load_folder(&self, principal: &Principal, id: Uuid) -> Result<FolderView> {
        let folder = self.folder(id).await?;
        let resource = Resource::folder(&folder);
        let documents = self.visibility.visible_documents(principal, id).await?;
        if documents.is_empty() && !can_access(principal, &resource, Capability::List) {
            return Err(Error::Forbidden(Capability::List));
        }
        let grants = if principal.admin {
            folder.permissions.iter().map(GrantView::from).collect()
        } else {
            Vec::new()
        };
        Ok(FolderView {
            id: folder.id,
            name: folder.name.clone(),
            level: folder.level,
            user_ids: folder.user_ids.clone(),
            documents: documents.iter().map(DocumentSummary::from).collect(),
            grants,
            capabilities: allowed_capabilities(principal, &resource),
        })
    }

    pub async fn index(&self, principal: &Principal) -> Result<IndexView> {
        let folders = self.visibility.visible_folders(principal).await?;
        let unfiled = self.visibility.visible_unfiled(principal).await?;
        Ok(IndexView {
            principal: principal.clone(),
            folders: folders
                .iter()
                .map(|(folder, docs)| FolderEntry::new(folder, docs))
                .collect(),
            unfiled: unfiled.iter().map(DocumentSummary::from).collect(),
        })
    }

    /// Save grants on behalf of an administrator.
    pub async fn grant(&self, principal: &Principal, grants: Vec<Permission>) -> Result<SaveReport> {
        if !principal.admin {
            return Err(Error::Forbidden(Capability::Write));
        }
        self.grants.save_grants(grants).await
    }

    /// The folder `id` with its grants loaded.
    pub async fn folder(&self, id: Uuid) -> Result<Folder> {
        let row = self
            .repo
            .find_by_id(Collection::Folders, id)
            .await?
            .ok_or_else(|| Error::NotFound {
                collection: Collection::Folders.as_str(),
                id: id.to_string(),
            })?;
        let mut folder: Folder = decode(row)?;
        folder.permissions = self.grants.get_grants(id).await?;
        Ok(folder)
    }

    async fn document(&self, id: Uuid) -> Result<Document> {
        self.find_document(id).await?.ok_or_else(|| Error::NotFound {
            collection: Collection::Documents.as_str(),
            id: id.to_string(),
        })
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        self.repo
            .find_by_id(Collection::Documents, id)
            .await?
            .map(decode)
            .transpose()
    }

    /// The document's folder, or `None` when unfiled or the folder is gone.
    async fn parent_of(&self, doc: &Document) -> Result<Option<Folder>> {
        let Some(folder_id) = doc.folder_id else {
            return Ok(None);
        };
        match self.folder(folder_id).await {
            Ok(folder) => Ok(Some(folder)),
            Err(Error::NotFound { .. }) => {
                warn!(document = %doc.id, folder = %folder_id, "document refers to a missing folder");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
