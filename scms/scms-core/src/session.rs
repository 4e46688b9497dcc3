use crate::error::{Error, Result};
use crate::model::User;
use crate::principal::{Principal, SessionClaims};
use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Supplies the claims mapping behind an opaque session token.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn claims(&self, token: &str) -> Option<SessionClaims>;
}

/// Sessions carried as HS256-signed tokens.
pub struct Hs256Sessions {
    encoding: EncodingKey,
    decoding: DecodingKey,
    max_age: Duration,
}

impl Hs256Sessions {
    pub fn new(secret: &str, max_age: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            max_age,
        }
    }

    /// Issue a token carrying the login claims for `user`.
    pub fn issue(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Token(e.to_string()))?
            .as_secs();
        let mut claims = Principal::claims_for(user);
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + self.max_age.as_secs()));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Token(e.to_string()))
    }
}

#[async_trait]
impl SessionSource for Hs256Sessions {
    async fn claims(&self, token: &str) -> Option<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<SessionClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|d| d.claims)
    }
}

/// Resolve the principal for a request token. An absent or unverifiable token
/// is [`Error::MissingIdentity`]; a corrupt claim set is logged before being
/// returned so callers can treat both the same way.
pub async fn resolve_request(source: &dyn SessionSource, token: Option<&str>) -> Result<Principal> {
    let Some(token) = token else {
        return Err(Error::MissingIdentity);
    };
    let claims = source.claims(token).await.ok_or(Error::MissingIdentity)?;
    Principal::resolve(&claims).map_err(|e| {
        if let Error::CorruptSession(reason) = &e {
            warn!(%reason, "discarding corrupt session");
        }
        e
    })
}
