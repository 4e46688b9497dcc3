//! Permission grants: per-user, per-folder capability overrides.

use crate::error::{Error, Result};
use crate::model::{Permission, User};
use crate::repository::{
    decode, decode_joined, Collection, Filter, Lookup, Repository, Sort, ID_FIELD,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const GRANT_KEY: [&str; 2] = ["folderId", "userId"];

/// Counts from a successful [`PermissionStore::save_grants`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Clone)]
pub struct PermissionStore {
    repo: Arc<dyn Repository>,
}

impl PermissionStore {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Grants on `folder_id` with the grantee's display snapshot attached,
    /// ordered by grantee name.
    pub async fn get_grants(&self, folder_id: Uuid) -> Result<Vec<Permission>> {
        let lookup = Lookup::new(Collection::Users, "userId", ID_FIELD, "user");
        let rows = self
            .repo
            .lookup(
                Collection::Permissions,
                &lookup,
                &Filter::eq("folderId", folder_id.to_string()),
                &Sort::default(),
            )
            .await?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let users: Vec<User> = decode_joined(&row, "user")?;
            let mut grant: Permission = decode(row)?;
            grant.user = users.first().map(|u| u.summary());
            grants.push(grant);
        }
        grants.sort_by(|a, b| {
            grantee_name(a)
                .cmp(grantee_name(b))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(grants)
    }

    /// Every grant held by `user_id`, in folder order.
    pub async fn grants_for_user(&self, user_id: Uuid) -> Result<Vec<Permission>> {
        let rows = self
            .repo
            .find_filtered(
                Collection::Permissions,
                &Filter::eq("userId", user_id.to_string()),
                &Sort::by("folderId"),
            )
            .await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn grant_for(&self, folder_id: Uuid, user_id: Uuid) -> Result<Option<Permission>> {
        let rows = self
            .repo
            .find_filtered(
                Collection::Permissions,
                &Filter::And(vec![
                    Filter::eq("folderId", folder_id.to_string()),
                    Filter::eq("userId", user_id.to_string()),
                ]),
                &Sort::default(),
            )
            .await?;
        rows.into_iter().next().map(decode).transpose()
    }

    /// Upsert many grants in one unordered write keyed by
    /// `(folder_id, user_id)`.
    ///
    /// A grant without an id keeps the stored record's id when its key
    /// already exists and gets a fresh one otherwise. Repeated keys in one
    /// batch collapse to the last occurrence. Any row the repository rejects
    /// fails the whole call after the others have been applied.
    pub async fn save_grants(&self, grants: Vec<Permission>) -> Result<SaveReport> {
        if grants.is_empty() {
            return Ok(SaveReport::default());
        }

        let mut order = Vec::new();
        let mut latest: HashMap<(Uuid, Uuid), Permission> = HashMap::new();
        for grant in grants {
            let key = (grant.folder_id, grant.user_id);
            if latest.insert(key, grant).is_none() {
                order.push(key);
            }
        }

        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            let Some(mut grant) = latest.remove(&key) else {
                continue;
            };
            grant.id.get_or_insert_with(Uuid::new_v4);
            grant.user = None;
            rows.push(serde_json::to_value(&grant)?);
        }

        let total = rows.len();
        let outcome = self
            .repo
            .bulk_upsert(Collection::Permissions, &GRANT_KEY, rows)
            .await?;
        if !outcome.is_complete() {
            for (index, reason) in &outcome.failed {
                error!(index, %reason, "grant not saved");
            }
            return Err(Error::PermissionLookupFailed(format!(
                "{} of {} grants failed",
                outcome.failed.len(),
                total
            )));
        }

        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            "saved permission grants"
        );
        Ok(SaveReport {
            inserted: outcome.inserted,
            updated: outcome.updated,
        })
    }
}

fn grantee_name(grant: &Permission) -> &str {
    grant.user.as_ref().map(|u| u.name.as_str()).unwrap_or("")
}
