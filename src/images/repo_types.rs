use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Profile picture record. At most one exists per user.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProfileImage {
    pub id: Uuid,
    pub file_name: String, // object key in the bucket
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    pub user_id: Uuid,
}
