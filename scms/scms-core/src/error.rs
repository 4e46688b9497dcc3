use crate::model::Capability;
use thiserror::Error;

/// Errors surfaced by the core. Nothing here is shown to end users directly;
/// callers map them to redirects, flashes or status codes.
#[derive(Debug, Error)]
pub enum Error {
    /// No identity in the session. The normal "not logged in" state.
    #[error("no identity in session")]
    MissingIdentity,

    /// A session claim is present but has the wrong shape.
    #[error("corrupt session claim: {0}")]
    CorruptSession(String),

    #[error("ciphertext too short: {len} bytes")]
    CiphertextTooShort { len: usize },

    #[error("permission lookup failed: {0}")]
    PermissionLookupFailed(String),

    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// A user with the same name or email already exists.
    #[error("user already exists: {name} <{email}>")]
    DuplicateUser { name: String, email: String },

    #[error("{collection} {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{0} access denied")]
    Forbidden(Capability),

    /// A stored row could not be decoded into its typed record.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("random source failed: {0}")]
    Random(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("session token error: {0}")]
    Token(String),
}

impl Error {
    /// Both session errors send the caller back to the login flow.
    pub fn requires_login(&self) -> bool {
        matches!(self, Error::MissingIdentity | Error::CorruptSession(_))
    }

    /// Collaborator failures the caller may retry. This layer never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RepositoryUnavailable(_) | Error::PermissionLookupFailed(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_require_login() {
        assert!(Error::MissingIdentity.requires_login());
        assert!(Error::CorruptSession("level".into()).requires_login());
        assert!(!Error::CiphertextTooShort { len: 3 }.requires_login());
    }

    #[test]
    fn only_collaborator_failures_are_retryable() {
        assert!(Error::RepositoryUnavailable("down".into()).is_retryable());
        assert!(Error::PermissionLookupFailed("1 of 3 failed".into()).is_retryable());
        assert!(!Error::Forbidden(Capability::Read).is_retryable());
        assert!(!Error::DuplicateUser {
            name: "a".into(),
            email: "a@b".into()
        }
        .is_retryable());
    }
}
