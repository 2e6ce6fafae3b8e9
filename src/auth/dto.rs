use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{repo_types::User, services::AccountError};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Query of the verification link.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// Public part of the user returned to the client. Never carries the hash or token.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub account_created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub account_updated: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            account_created: u.account_created_at,
            account_updated: u.account_updated_at,
        }
    }
}

/// Partial update of the owner's profile. `None` means the field was absent.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

impl ProfilePatch {
    /// Only `first_name`, `last_name` and `password` may appear in the body.
    pub fn from_json(body: Value) -> Result<Self, AccountError> {
        let Value::Object(map) = body else {
            return Err(AccountError::MalformedBody(
                "request body must be a JSON object".into(),
            ));
        };
        if map.is_empty() {
            return Err(AccountError::EmptyUpdate);
        }

        let mut patch = ProfilePatch::default();
        for (key, value) in map {
            let slot = match key.as_str() {
                "first_name" => &mut patch.first_name,
                "last_name" => &mut patch.last_name,
                "password" => &mut patch.password,
                _ => return Err(AccountError::UnknownField(key)),
            };
            match value {
                Value::String(s) => *slot = Some(s),
                _ => return Err(AccountError::MalformedBody(format!("{key} must be a string"))),
            }
        }
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_keeps_only_supplied_fields() {
        let patch = ProfilePatch::from_json(json!({ "last_name": "Lovelace" })).unwrap();
        assert_eq!(
            patch,
            ProfilePatch {
                last_name: Some("Lovelace".into()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn patch_rejects_fields_outside_allow_set() {
        let err = ProfilePatch::from_json(json!({ "first_name": "A", "email": "b@gmail.com" }))
            .unwrap_err();
        assert!(matches!(err, AccountError::UnknownField(f) if f == "email"));
    }

    #[test]
    fn patch_rejects_non_string_values_and_non_objects() {
        assert!(matches!(
            ProfilePatch::from_json(json!({ "password": 12345 })),
            Err(AccountError::MalformedBody(_))
        ));
        assert!(matches!(
            ProfilePatch::from_json(json!(["first_name"])),
            Err(AccountError::MalformedBody(_))
        ));
        assert!(matches!(
            ProfilePatch::from_json(json!({})),
            Err(AccountError::EmptyUpdate)
        ));
    }

    #[test]
    fn public_user_hides_secrets() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@gmail.com".into(),
            password_hash: "$argon2id$secret".into(),
            is_verified: false,
            verification_token: Some("tok".into()),
            verification_token_created_at: Some(now),
            account_created_at: now,
            account_updated_at: now,
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("\"email\":\"a@gmail.com\""));
        assert!(!json.contains("password"));
        assert!(!json.contains("tok"));
    }
}
