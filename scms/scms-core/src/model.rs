//! Records stored in the repository and the capabilities that guard them.
//!
//! Rows are serialized with the field names the store has always used
//! (`_id`, `folderId`, `userIDs`, ...) so existing data keeps decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Something a principal may want to do with a folder or document.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    List,
    Read,
    Write,
    Create,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::List,
        Capability::Read,
        Capability::Write,
        Capability::Create,
        Capability::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::List => "list",
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Create => "create",
            Capability::Delete => "delete",
        }
    }

    /// Capabilities implied by being named in a resource's `userIDs`.
    pub fn is_visibility(&self) -> bool {
        matches!(self, Capability::List | Capability::Read)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable identity record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub tech: bool,
    /// scrypt verifier, never the plaintext password.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub password: Vec<u8>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, level: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            level,
            admin: false,
            tech: false,
            password: Vec::new(),
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            level: self.level,
            admin: self.admin,
            tech: self.tech,
        }
    }
}

/// A user without its password verifier, safe to hand to views.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub level: i32,
    pub admin: bool,
    pub tech: bool,
}

/// A container of documents. Folders do not nest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub level: i32,
    #[serde(rename = "userIDs", default)]
    pub user_ids: Vec<Uuid>,
    /// Populated on load, never stored.
    #[serde(skip)]
    pub documents: Vec<Document>,
    /// Populated on load, never stored.
    #[serde(skip)]
    pub permissions: Vec<Permission>,
}

impl Folder {
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            level,
            user_ids: Vec::new(),
            documents: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    /// `IV || ciphertext`, see [`crate::codec`].
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
    #[serde(rename = "folderId", default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<Uuid>,
    /// `None` inherits the folder's level (or 0 when unfiled).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(rename = "userIDs", default)]
    pub user_ids: Vec<Uuid>,
    pub created: DateTime<Utc>,
    pub edited: DateTime<Utc>,
}

impl Document {
    /// The level that guards this document once inheritance is applied.
    pub fn effective_level(&self, folder: Option<&Folder>) -> i32 {
        self.level
            .or_else(|| folder.map(|f| f.level))
            .unwrap_or(0)
    }
}

/// Explicit per-user, per-folder grant. `(folder_id, user_id)` is unique.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "folderId")]
    pub folder_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub delete: bool,
    /// Display snapshot joined on read. Not authoritative, never stored.
    #[serde(skip)]
    pub user: Option<UserSummary>,
}

impl Permission {
    pub fn new(folder_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: None,
            folder_id,
            user_id,
            list: false,
            read: false,
            update: false,
            create: false,
            delete: false,
            user: None,
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::List => self.list = true,
            Capability::Read => self.read = true,
            Capability::Write => self.update = true,
            Capability::Create => self.create = true,
            Capability::Delete => self.delete = true,
        }
        self
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::List => self.list,
            Capability::Read => self.read,
            Capability::Write => self.update,
            Capability::Create => self.create,
            Capability::Delete => self.delete,
        }
    }
}

/// Serde helper storing byte blobs as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(d)?.unwrap_or_default();
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_inherits_folder_level() {
        let folder = Folder::new("ops", 5);
        let now = Utc::now();
        let mut doc = Document {
            id: Uuid::new_v4(),
            title: "runbook".into(),
            body: Vec::new(),
            folder_id: Some(folder.id),
            level: None,
            user_ids: Vec::new(),
            created: now,
            edited: now,
        };
        assert_eq!(doc.effective_level(Some(&folder)), 5);
        assert_eq!(doc.effective_level(None), 0);
        doc.level = Some(8);
        assert_eq!(doc.effective_level(Some(&folder)), 8);
    }

    #[test]
    fn folder_derived_fields_are_not_stored() {
        let mut folder = Folder::new("ops", 2);
        folder.permissions.push(Permission::new(folder.id, Uuid::new_v4()));
        let row = serde_json::to_value(&folder).unwrap();
        assert!(row.get("permissions").is_none());
        assert!(row.get("documents").is_none());
        assert_eq!(row["level"], json!(2));
        assert!(row.get("_id").is_some());
    }

    #[test]
    fn permission_write_maps_to_update_field() {
        let grant = Permission::new(Uuid::new_v4(), Uuid::new_v4()).with(Capability::Write);
        assert!(grant.update);
        assert!(grant.allows(Capability::Write));
        assert!(!grant.allows(Capability::Read));
        let row = serde_json::to_value(&grant).unwrap();
        assert_eq!(row["update"], json!(true));
        assert!(row.get("user").is_none());
    }

    #[test]
    fn user_password_is_base64_in_rows() {
        let mut user = User::new("ann", "ann@example.com", 3);
        user.password = vec![0xde, 0xad, 0xbe, 0xef];
        let row = serde_json::to_value(&user).unwrap();
        assert_eq!(row["password"], json!("3q2+7w=="));
        let back: User = serde_json::from_value(row).unwrap();
        assert_eq!(back.password, user.password);
    }
}
