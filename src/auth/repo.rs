use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    db::{RepoError, Schema},
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, is_verified, \
     verification_token, verification_token_created_at, account_created_at, account_updated_at";

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Round trip to the store, used by the health check. Fails until the
    /// schema is in place.
    async fn ping(&self) -> Result<(), RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<User>, RepoError>;
    /// Fails with `UniqueViolation` when the email (or token) is taken.
    async fn insert(&self, user: &User) -> Result<(), RepoError>;
    /// Consumes `token` for `user_id`. Returns `false` if the token was no
    /// longer held by that user.
    async fn mark_verified(
        &self,
        user_id: Uuid,
        token: &str,
        at: OffsetDateTime,
    ) -> Result<bool, RepoError>;
    /// Writes names, hash and `account_updated_at`. Returns `false` if the row is gone.
    async fn update_profile(&self, user: &User) -> Result<bool, RepoError>;
}

pub struct PgUserRepo {
    db: PgPool,
    schema: Schema,
}

impl PgUserRepo {
    pub fn new(db: PgPool, schema: Schema) -> Self {
        Self { db, schema }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn ping(&self) -> Result<(), RepoError> {
        crate::db::ping(&self.db).await?;
        self.schema.ready(&self.db).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.schema.ready(&self.db).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        self.schema.ready(&self.db).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<(), RepoError> {
        self.schema.ready(&self.db).await?;
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, is_verified,
                               verification_token, verification_token_created_at,
                               account_created_at, account_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(&user.verification_token)
        .bind(user.verification_token_created_at)
        .bind(user.account_created_at)
        .bind(user.account_updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_verified(
        &self,
        user_id: Uuid,
        token: &str,
        at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        self.schema.ready(&self.db).await?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET is_verified = TRUE,
                   verification_token = NULL,
                   verification_token_created_at = NULL,
                   account_updated_at = $3
             WHERE id = $1 AND verification_token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_profile(&self, user: &User) -> Result<bool, RepoError> {
        self.schema.ready(&self.db).await?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET first_name = $2,
                   last_name = $3,
                   password_hash = $4,
                   account_updated_at = $5
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.account_updated_at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
