use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_created_at: Option<OffsetDateTime>,
    pub account_created_at: OffsetDateTime,
    pub account_updated_at: OffsetDateTime,
}
