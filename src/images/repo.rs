use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::{RepoError, Schema},
    images::repo_types::ProfileImage,
};

#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<ProfileImage>, RepoError>;
    /// Fails with `UniqueViolation` if the user already has an image.
    async fn insert(&self, image: &ProfileImage) -> Result<(), RepoError>;
    /// Returns `false` if no row was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;
}

pub struct PgImageRepo {
    db: PgPool,
    schema: Schema,
}

impl PgImageRepo {
    pub fn new(db: PgPool, schema: Schema) -> Self {
        Self { db, schema }
    }
}

#[async_trait]
impl ImageRepo for PgImageRepo {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<ProfileImage>, RepoError> {
        self.schema.ready(&self.db).await?;
        let image = sqlx::query_as::<_, ProfileImage>(
            r#"
            SELECT id, file_name, url, upload_date, user_id
              FROM images
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(image)
    }

    async fn insert(&self, image: &ProfileImage) -> Result<(), RepoError> {
        self.schema.ready(&self.db).await?;
        sqlx::query(
            r#"
            INSERT INTO images (id, file_name, url, upload_date, user_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(image.id)
        .bind(&image.file_name)
        .bind(&image.url)
        .bind(image.upload_date)
        .bind(image.user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.schema.ready(&self.db).await?;
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
