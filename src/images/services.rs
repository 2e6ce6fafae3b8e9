use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{repo::ImageRepo, repo_types::ProfileImage};
use crate::{auth::repo::UserRepo, db::RepoError, error::ErrorKind, storage::StorageClient};

pub struct UploadItem {
    pub file_name: String,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("No file was uploaded")]
    NoFile,

    #[error("File name must not be empty")]
    EmptyFilename,

    #[error("Unsupported file type '{0}'; allowed: png, jpg, jpeg")]
    UnsupportedType(String),

    #[error("{0}")]
    MalformedUpload(String),

    #[error("Profile image already exists; delete it first")]
    ImageAlreadyExists,

    #[error("Profile image not found")]
    ImageNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("object storage request failed")]
    StorageFailure(#[source] anyhow::Error),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::NoFile
            | ImageError::EmptyFilename
            | ImageError::UnsupportedType(_)
            | ImageError::MalformedUpload(_) => ErrorKind::Validation,
            ImageError::ImageAlreadyExists => ErrorKind::Conflict,
            ImageError::ImageNotFound | ImageError::UserNotFound => ErrorKind::NotFound,
            ImageError::StorageFailure(_) => ErrorKind::Dependency,
            ImageError::Repository(RepoError::UniqueViolation(_)) => ErrorKind::Conflict,
            ImageError::Repository(RepoError::Database(_)) => ErrorKind::Unavailable,
        }
    }
}

/// Reduces an uploaded name to `[A-Za-z0-9._-]`, dropping any directory part.
/// Returns `None` when nothing usable is left.
pub(crate) fn sanitize_filename(name: &str) -> Option<String> {
    let base = base_name(name);
    let clean = |part: &str| -> String {
        part.chars()
            .filter_map(|c| match c {
                c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
                c if c.is_whitespace() => Some('_'),
                _ => None,
            })
            .collect()
    };
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (base, None),
    };
    let stem = clean(stem);
    let stem = stem.trim_start_matches(&['.', '_'][..]);
    if stem.is_empty() {
        return None;
    }
    Some(match ext {
        Some(ext) => format!("{stem}.{}", clean(ext)),
        None => stem.to_string(),
    })
}

fn base_name(name: &str) -> &str {
    name.rsplit(&['/', '\\'][..]).next().unwrap_or_default()
}

/// Judges the extension exactly as uploaded, before any sanitizing.
fn content_type_for(name: &str) -> Result<&'static str, ImageError> {
    let ext = base_name(name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        _ => Err(ImageError::UnsupportedType(ext)),
    }
}

/// Keeps the one-image-per-user invariant and orders object-store and
/// database writes so a failure leaves an orphaned object, never a record
/// without its object.
pub struct ProfileImages {
    users: Arc<dyn UserRepo>,
    images: Arc<dyn ImageRepo>,
    storage: Arc<dyn StorageClient>,
}

impl ProfileImages {
    pub fn new(
        users: Arc<dyn UserRepo>,
        images: Arc<dyn ImageRepo>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            users,
            images,
            storage,
        }
    }

    async fn user_id(&self, email: &str) -> Result<Uuid, ImageError> {
        self.users
            .find_by_email(email)
            .await?
            .map(|u| u.id)
            .ok_or(ImageError::UserNotFound)
    }

    #[instrument(skip(self, file))]
    pub async fn upload(
        &self,
        email: &str,
        file: Option<UploadItem>,
    ) -> Result<ProfileImage, ImageError> {
        let file = file.filter(|f| !f.body.is_empty()).ok_or(ImageError::NoFile)?;
        if file.file_name.trim().is_empty() {
            return Err(ImageError::EmptyFilename);
        }
        let content_type = content_type_for(&file.file_name)?;
        let file_name = sanitize_filename(&file.file_name).ok_or(ImageError::EmptyFilename)?;

        let user_id = self.user_id(email).await?;
        if self.images.find_by_user(user_id).await?.is_some() {
            warn!(%user_id, "profile image already exists");
            return Err(ImageError::ImageAlreadyExists);
        }

        let id = Uuid::new_v4();
        let key = format!("{user_id}/{id}-{file_name}");
        self.storage
            .put_object(&key, file.body, content_type)
            .await
            .map_err(|e| {
                error!(error = %e, %key, "profile image upload failed");
                ImageError::StorageFailure(e)
            })?;

        let image = ProfileImage {
            id,
            url: self.storage.object_url(&key),
            file_name: key,
            upload_date: OffsetDateTime::now_utc(),
            user_id,
        };
        if let Err(e) = self.images.insert(&image).await {
            self.discard_object(&image.file_name).await;
            return Err(match e {
                RepoError::UniqueViolation(_) => ImageError::ImageAlreadyExists,
                other => other.into(),
            });
        }

        info!(%user_id, image_id = %image.id, "profile image uploaded");
        Ok(image)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, email: &str) -> Result<ProfileImage, ImageError> {
        let user_id = self.user_id(email).await?;
        self.images
            .find_by_user(user_id)
            .await?
            .ok_or(ImageError::ImageNotFound)
    }

    /// Deletes the object first; the record survives any storage failure.
    #[instrument(skip(self))]
    pub async fn delete(&self, email: &str) -> Result<(), ImageError> {
        let image = self.get(email).await?;

        self.storage
            .delete_object(&image.file_name)
            .await
            .map_err(|e| {
                error!(error = %e, key = %image.file_name, "profile image delete failed");
                ImageError::StorageFailure(e)
            })?;

        if !self.images.delete(image.id).await? {
            return Err(ImageError::ImageNotFound);
        }
        info!(user_id = %image.user_id, image_id = %image.id, "profile image deleted");
        Ok(())
    }

    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.storage.delete_object(key).await {
            warn!(error = %e, %key, "could not remove orphaned profile image object");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::dto::RegisterRequest,
        testing::{fake_state, Fakes},
    };

    async fn registered() -> (Arc<ProfileImages>, Fakes) {
        let (state, fakes) = fake_state();
        state
            .accounts
            .register(RegisterRequest {
                first_name: "A".into(),
                last_name: "B".into(),
                email: "a@gmail.com".into(),
                password: "abcde".into(),
            })
            .await
            .unwrap();
        (state.images, fakes)
    }

    fn png(name: &str) -> Option<UploadItem> {
        Some(UploadItem {
            file_name: name.into(),
            body: Bytes::from_static(b"\x89PNG fake"),
        })
    }

    #[test]
    fn sanitize_strips_paths_and_unsafe_chars() {
        assert_eq!(sanitize_filename("me.png").as_deref(), Some("me.png"));
        assert_eq!(sanitize_filename("../../etc/pa$$wd.png").as_deref(), Some("pawd.png"));
        assert_eq!(sanitize_filename("C:\\Users\\me\\my pic.JPG").as_deref(), Some("my_pic.JPG"));
        assert_eq!(sanitize_filename(".hidden.png").as_deref(), Some("hidden.png"));
        assert_eq!(sanitize_filename("$$$.png"), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn only_png_and_jpeg_are_accepted() {
        assert_eq!(content_type_for("a.png").unwrap(), "image/png");
        assert_eq!(content_type_for("a.JPEG").unwrap(), "image/jpeg");
        assert_eq!(content_type_for("a.jpg").unwrap(), "image/jpeg");
        assert!(matches!(content_type_for("a.gif"), Err(ImageError::UnsupportedType(e)) if e == "gif"));
        assert!(matches!(content_type_for("png"), Err(ImageError::UnsupportedType(_))));
        assert!(matches!(content_type_for("x.png/photo"), Err(ImageError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn extension_is_judged_before_sanitizing() {
        let (images, fakes) = registered().await;
        for name in ["photo.p!ng", "photo.j$pg", "photo.jp eg"] {
            let err = images.upload("a@gmail.com", png(name)).await.unwrap_err();
            assert!(matches!(err, ImageError::UnsupportedType(_)), "{name}");
        }
        assert_eq!(fakes.storage.len(), 0);
        assert_eq!(fakes.images.count(), 0);
    }

    #[tokio::test]
    async fn upload_stores_object_then_record() {
        let (images, fakes) = registered().await;
        let image = images.upload("a@gmail.com", png("me.png")).await.unwrap();

        assert!(image.file_name.starts_with(&image.user_id.to_string()));
        assert!(image.file_name.ends_with("-me.png"));
        assert!(image.url.ends_with(&image.file_name));
        assert!(fakes.storage.contains(&image.file_name));
        assert_eq!(images.get("a@gmail.com").await.unwrap().id, image.id);
    }

    #[tokio::test]
    async fn second_upload_is_rejected_without_side_effects() {
        let (images, fakes) = registered().await;
        images.upload("a@gmail.com", png("me.png")).await.unwrap();

        let err = images.upload("a@gmail.com", png("other.jpg")).await.unwrap_err();
        assert!(matches!(err, ImageError::ImageAlreadyExists));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fakes.images.count(), 1);
        assert_eq!(fakes.storage.len(), 1);
    }

    #[tokio::test]
    async fn upload_validates_payload() {
        let (images, fakes) = registered().await;
        assert!(matches!(images.upload("a@gmail.com", None).await, Err(ImageError::NoFile)));
        let empty = Some(UploadItem {
            file_name: "a.png".into(),
            body: Bytes::new(),
        });
        assert!(matches!(images.upload("a@gmail.com", empty).await, Err(ImageError::NoFile)));
        assert!(matches!(
            images.upload("a@gmail.com", png("   ")).await,
            Err(ImageError::EmptyFilename)
        ));
        assert!(matches!(
            images.upload("a@gmail.com", png("doc.pdf")).await,
            Err(ImageError::UnsupportedType(_))
        ));
        assert_eq!(fakes.storage.len(), 0);
        assert_eq!(fakes.images.count(), 0);
    }

    #[tokio::test]
    async fn failed_put_creates_no_record() {
        let (images, fakes) = registered().await;
        fakes.storage.fail_put(true);
        let err = images.upload("a@gmail.com", png("me.png")).await.unwrap_err();
        assert!(matches!(err, ImageError::StorageFailure(_)));
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert_eq!(fakes.images.count(), 0);
    }

    #[tokio::test]
    async fn lost_insert_race_discards_the_object() {
        let (images, fakes) = registered().await;
        fakes.images.reject_inserts(true);
        let err = images.upload("a@gmail.com", png("me.png")).await.unwrap_err();
        assert!(matches!(err, ImageError::ImageAlreadyExists));
        assert_eq!(fakes.storage.len(), 0);
    }

    #[tokio::test]
    async fn delete_removes_object_and_record() {
        let (images, fakes) = registered().await;
        let image = images.upload("a@gmail.com", png("me.png")).await.unwrap();

        images.delete("a@gmail.com").await.unwrap();
        assert!(!fakes.storage.contains(&image.file_name));
        assert!(matches!(images.get("a@gmail.com").await, Err(ImageError::ImageNotFound)));
        assert!(matches!(images.delete("a@gmail.com").await, Err(ImageError::ImageNotFound)));

        // The slot is free again.
        images.upload("a@gmail.com", png("again.jpeg")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_storage_delete_keeps_the_record() {
        let (images, fakes) = registered().await;
        let image = images.upload("a@gmail.com", png("me.png")).await.unwrap();

        fakes.storage.fail_delete(true);
        let err = images.delete("a@gmail.com").await.unwrap_err();
        assert!(matches!(err, ImageError::StorageFailure(_)));

        let still_there = images.get("a@gmail.com").await.unwrap();
        assert_eq!(still_there.id, image.id);
        assert_eq!(still_there.file_name, image.file_name);
        assert!(fakes.storage.contains(&image.file_name));
    }

    #[tokio::test]
    async fn unknown_user_has_no_image() {
        let (images, _fakes) = registered().await;
        assert!(matches!(
            images.get("ghost@gmail.com").await,
            Err(ImageError::UserNotFound)
        ));
    }
}
