use crate::credentials::PasswordHasher;
use crate::error::{Error, Result};
use crate::model::User;
use crate::repository::{decode, Collection, Filter, Repository, Sort};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const ADMIN_NAME: &str = "Admin";
pub const ADMIN_EMAIL: &str = "admin@email.com";
pub const ADMIN_LEVEL: i32 = 7;

#[derive(Clone)]
pub struct UserStore {
    repo: Arc<dyn Repository>,
    hasher: PasswordHasher,
}

impl UserStore {
    pub fn new(repo: Arc<dyn Repository>, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    /// Insert or update `user`. A supplied password replaces the verifier;
    /// otherwise the stored one is kept. Fails with [`Error::DuplicateUser`]
    /// when another user already has the same name or email.
    pub async fn save(&self, mut user: User, password: Option<&str>) -> Result<User> {
        let clash = self
            .repo
            .find_filtered(
                Collection::Users,
                &Filter::Or(vec![
                    Filter::eq("name", user.name.clone()),
                    Filter::eq("email", user.email.clone()),
                ]),
                &Sort::default(),
            )
            .await?
            .into_iter()
            .map(decode::<User>)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .any(|other| other.id != user.id);
        if clash {
            warn!(name = %user.name, email = %user.email, "rejecting duplicate user");
            return Err(Error::DuplicateUser {
                name: user.name,
                email: user.email,
            });
        }

        match password {
            Some(password) => {
                user.password = self.derive(&user.email, password).await?;
            }
            None => {
                if let Some(existing) = self.find(user.id).await? {
                    user.password = existing.password;
                }
            }
        }

        self.repo
            .upsert_by_id(Collection::Users, user.id, serde_json::to_value(&user)?)
            .await?;
        info!(user = %user.id, name = %user.name, "saved user");
        Ok(user)
    }

    /// The user with `email` when `password` matches its verifier.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        let hasher = self.hasher.clone();
        let (for_email, password, verifier) =
            (email.to_string(), password.to_string(), user.password.clone());
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&for_email, &password, &verifier))
            .await
            .map_err(|e| Error::KeyDerivation(e.to_string()))??;
        if !ok {
            warn!(%email, "failed login");
            return Ok(None);
        }
        Ok(Some(user))
    }

    /// Create the default administrator unless a user with its email exists.
    pub async fn seed_admin(&self, password: &str) -> Result<User> {
        if let Some(existing) = self.find_by_email(ADMIN_EMAIL).await? {
            return Ok(existing);
        }
        let mut admin = User::new(ADMIN_NAME, ADMIN_EMAIL, ADMIN_LEVEL);
        admin.admin = true;
        let admin = self.save(admin, Some(password)).await?;
        info!(user = %admin.id, "seeded administrator");
        Ok(admin)
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        self.repo
            .find_filtered(Collection::Users, &Filter::All, &Sort::by_then_id("name"))
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<User>> {
        self.repo
            .find_by_id(Collection::Users, id)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.repo
            .find_filtered(Collection::Users, &Filter::eq("email", email), &Sort::default())
            .await?
            .into_iter()
            .next()
            .map(decode)
            .transpose()
    }

    async fn derive(&self, email: &str, password: &str) -> Result<Vec<u8>> {
        let hasher = self.hasher.clone();
        let (email, password) = (email.to_string(), password.to_string());
        tokio::task::spawn_blocking(move || hasher.derive(&email, &password))
            .await
            .map_err(|e| Error::KeyDerivation(e.to_string()))?
    }
}
