//! Projection of session claims into a typed, request-scoped [`Principal`].

use crate::error::{Error, Result};
use crate::model::User;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Claim name to value, as placed in the session at login.
pub type SessionClaims = Map<String, Value>;

/// The authenticated actor for one request. Never stored, never shared
/// between requests; handlers receive it as a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub level: i32,
    pub admin: bool,
    pub tech: bool,
}

impl Principal {
    /// Resolve the principal for the current request.
    ///
    /// A missing or null `id` is [`Error::MissingIdentity`]; any other claim
    /// with an unexpected type is [`Error::CorruptSession`].
    pub fn resolve(claims: &SessionClaims) -> Result<Self> {
        let id = match claims.get("id") {
            None | Some(Value::Null) => return Err(Error::MissingIdentity),
            Some(Value::String(s)) => Uuid::parse_str(s)
                .map_err(|_| Error::CorruptSession("id is not a valid identifier".into()))?,
            Some(_) => return Err(Error::CorruptSession("id is not a string".into())),
        };
        Ok(Self {
            id,
            name: string_claim(claims, "name")?,
            email: string_claim(claims, "email")?,
            level: level_claim(claims)?,
            admin: bool_claim(claims, "admin")?
                .ok_or_else(|| Error::CorruptSession("admin is missing".into()))?,
            tech: bool_claim(claims, "tech")?.unwrap_or(false),
        })
    }

    /// Claims to place in the session after a successful login.
    pub fn claims_for(user: &User) -> SessionClaims {
        let mut claims = Map::new();
        claims.insert("id".into(), Value::String(user.id.to_string()));
        claims.insert("name".into(), Value::String(user.name.clone()));
        claims.insert("email".into(), Value::String(user.email.clone()));
        claims.insert("level".into(), Value::from(user.level));
        claims.insert("admin".into(), Value::Bool(user.admin));
        claims.insert("tech".into(), Value::Bool(user.tech));
        claims
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            level: user.level,
            admin: user.admin,
            tech: user.tech,
        }
    }
}

fn string_claim(claims: &SessionClaims, name: &str) -> Result<String> {
    match claims.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::CorruptSession(format!("{name} is not a string"))),
        None => Err(Error::CorruptSession(format!("{name} is missing"))),
    }
}

fn level_claim(claims: &SessionClaims) -> Result<i32> {
    let value = claims
        .get("level")
        .ok_or_else(|| Error::CorruptSession("level is missing".into()))?;
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| Error::CorruptSession("level is not an integer".into()))
}

fn bool_claim(claims: &SessionClaims, name: &str) -> Result<Option<bool>> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::CorruptSession(format!("{name} is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> SessionClaims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn resolves_full_claim_set() {
        let id = Uuid::new_v4();
        let c = claims(json!({
            "id": id.to_string(),
            "name": "ann",
            "email": "ann@example.com",
            "level": 4,
            "admin": false,
            "tech": true,
        }));
        let p = Principal::resolve(&c).unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.level, 4);
        assert!(p.tech);
        assert!(!p.admin);
    }

    #[test]
    fn tech_defaults_to_false() {
        let c = claims(json!({
            "id": Uuid::new_v4().to_string(),
            "name": "bo",
            "email": "bo@example.com",
            "level": 1,
            "admin": true,
        }));
        let p = Principal::resolve(&c).unwrap();
        assert!(!p.tech);
        assert!(p.admin);
    }

    #[test]
    fn missing_id_is_not_logged_in() {
        let c = claims(json!({ "name": "ann", "level": 3, "admin": false }));
        assert!(matches!(
            Principal::resolve(&c),
            Err(Error::MissingIdentity)
        ));
        let c = claims(json!({ "id": null }));
        assert!(matches!(
            Principal::resolve(&c),
            Err(Error::MissingIdentity)
        ));
    }

    #[test]
    fn malformed_claims_are_corrupt() {
        let id = Uuid::new_v4().to_string();
        let cases = [
            json!({ "id": 7, "name": "a", "email": "e", "level": 1, "admin": false }),
            json!({ "id": "nope", "name": "a", "email": "e", "level": 1, "admin": false }),
            json!({ "id": id, "name": "a", "email": "e", "level": "high", "admin": false }),
            json!({ "id": id, "name": "a", "email": "e", "level": 1.5, "admin": false }),
            json!({ "id": id, "name": "a", "email": "e", "level": 1, "admin": "yes" }),
            json!({ "id": id, "name": "a", "email": "e", "level": 1 }),
            json!({ "id": id, "email": "e", "level": 1, "admin": false }),
            json!({ "id": id, "name": "a", "email": "e", "level": 1, "admin": false, "tech": 1 }),
        ];
        for case in cases {
            let result = Principal::resolve(&claims(case.clone()));
            assert!(
                matches!(result, Err(Error::CorruptSession(_))),
                "expected corrupt session for {case}"
            );
        }
    }

    #[test]
    fn claims_round_trip_through_resolver() {
        let mut user = User::new("cy", "cy@example.com", 9);
        user.admin = true;
        let p = Principal::resolve(&Principal::claims_for(&user)).unwrap();
        assert_eq!(p, Principal::from(&user));
    }
}
