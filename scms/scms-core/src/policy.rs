//! Access policy: level-based default access widened by explicit grants.
//!
//! A principal may act on a resource if ANY of the mechanisms allows it.
//! Grants and `userIDs` only ever widen what the clearance level allows.

use crate::model::{Capability, Document, Folder, Permission};
use crate::principal::Principal;
use uuid::Uuid;

/// The parts of a folder or document that the policy looks at.
#[derive(Clone, Copy, Debug)]
pub struct Resource<'a> {
    /// Folder whose grants apply. A folder's own id; a document's parent.
    pub folder_id: Option<Uuid>,
    pub level: i32,
    pub user_ids: &'a [Uuid],
    pub grants: &'a [Permission],
}

impl<'a> Resource<'a> {
    pub fn folder(folder: &'a Folder) -> Self {
        Self {
            folder_id: Some(folder.id),
            level: folder.level,
            user_ids: &folder.user_ids,
            grants: &folder.permissions,
        }
    }

    /// A document, inheriting level and grants from its folder when given.
    pub fn document(doc: &'a Document, folder: Option<&'a Folder>) -> Self {
        Self {
            folder_id: doc.folder_id,
            level: doc.effective_level(folder),
            user_ids: &doc.user_ids,
            grants: folder.map(|f| f.permissions.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn with_grants(mut self, grants: &'a [Permission]) -> Self {
        self.grants = grants;
        self
    }
}

/// Decide whether `principal` may perform `capability` on `resource`.
pub fn can_access(principal: &Principal, resource: &Resource<'_>, capability: Capability) -> bool {
    if principal.admin {
        return true;
    }
    if let Some(folder_id) = resource.folder_id {
        let granted = resource.grants.iter().any(|g| {
            g.folder_id == folder_id && g.user_id == principal.id && g.allows(capability)
        });
        if granted {
            return true;
        }
    }
    if capability.is_visibility() && resource.user_ids.contains(&principal.id) {
        return true;
    }
    principal.level >= resource.level
}

pub fn allowed_capabilities(principal: &Principal, resource: &Resource<'_>) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|c| can_access(principal, resource, *c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(level: i32) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            name: "p".into(),
            email: "p@example.com".into(),
            level,
            admin: false,
            tech: false,
        }
    }

    #[test]
    fn admin_bypasses_everything() {
        let mut admin = principal(0);
        admin.admin = true;
        let folder = Folder::new("secret", 99);
        for cap in Capability::ALL {
            assert!(can_access(&admin, &Resource::folder(&folder), cap));
        }
    }

    #[test]
    fn scenario_f42() {
        let mut f42 = Folder::new("F42", 9);
        let a = principal(3);
        let b = principal(3);
        let c = principal(9);
        f42.permissions
            .push(Permission::new(f42.id, a.id).with(Capability::Read));

        let r = Resource::folder(&f42);
        assert!(can_access(&a, &r, Capability::Read));
        assert!(!can_access(&b, &r, Capability::Read));
        assert!(can_access(&c, &r, Capability::Read));
    }

    #[test]
    fn grant_is_per_capability() {
        let mut folder = Folder::new("ops", 9);
        let p = principal(1);
        folder
            .permissions
            .push(Permission::new(folder.id, p.id).with(Capability::Write));
        let r = Resource::folder(&folder);
        assert!(can_access(&p, &r, Capability::Write));
        assert!(!can_access(&p, &r, Capability::Read));
        assert!(!can_access(&p, &r, Capability::Delete));
    }

    #[test]
    fn grant_for_another_folder_does_not_apply() {
        let mut folder = Folder::new("ops", 9);
        let p = principal(1);
        folder
            .permissions
            .push(Permission::new(Uuid::new_v4(), p.id).with(Capability::Read));
        assert!(!can_access(&p, &Resource::folder(&folder), Capability::Read));
    }

    #[test]
    fn named_user_sees_but_cannot_write() {
        let mut folder = Folder::new("ops", 9);
        let p = principal(1);
        folder.user_ids.push(p.id);
        let r = Resource::folder(&folder);
        assert!(can_access(&p, &r, Capability::List));
        assert!(can_access(&p, &r, Capability::Read));
        assert!(!can_access(&p, &r, Capability::Write));
        assert!(!can_access(&p, &r, Capability::Create));
    }

    #[test]
    fn level_at_threshold_is_enough() {
        let folder = Folder::new("ops", 4);
        let r = Resource::folder(&folder);
        assert!(can_access(&principal(4), &r, Capability::Delete));
        assert!(can_access(&principal(5), &r, Capability::Read));
        assert!(!can_access(&principal(3), &r, Capability::Read));
    }

    #[test]
    fn document_uses_folder_grants_and_level() {
        let mut folder = Folder::new("ops", 6);
        let p = principal(2);
        folder
            .permissions
            .push(Permission::new(folder.id, p.id).with(Capability::Read));
        let doc = Document {
            id: Uuid::new_v4(),
            title: "t".into(),
            body: Vec::new(),
            folder_id: Some(folder.id),
            level: None,
            user_ids: Vec::new(),
            created: chrono::Utc::now(),
            edited: chrono::Utc::now(),
        };
        let r = Resource::document(&doc, Some(&folder));
        assert_eq!(r.level, 6);
        assert!(can_access(&p, &r, Capability::Read));
        assert!(!can_access(&p, &r, Capability::Write));
        assert!(!can_access(&principal(5), &r, Capability::Read));
        assert!(can_access(&principal(0), &Resource::document(&doc, None), Capability::Read));
    }

    #[test]
    fn allowed_capabilities_lists_union() {
        let mut folder = Folder::new("ops", 9);
        let p = principal(1);
        folder.user_ids.push(p.id);
        folder
            .permissions
            .push(Permission::new(folder.id, p.id).with(Capability::Create));
        let caps = allowed_capabilities(&p, &Resource::folder(&folder));
        assert_eq!(
            caps,
            vec![Capability::List, Capability::Read, Capability::Create]
        );
    }
}
