//! In-memory stand-ins for the database, object store and notification channel.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{repo::UserRepo, repo_types::User},
    config::AppConfig,
    db::RepoError,
    images::{repo::ImageRepo, repo_types::ProfileImage},
    notify::{Notifier, VerificationMessage},
    state::AppState,
    storage::StorageClient,
};

fn outage() -> RepoError {
    RepoError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<User>>,
    down: AtomicBool,
}

impl MemoryUsers {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn get(&self, email: &str) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.email == email).cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn update_with(&self, email: &str, f: impl FnOnce(&mut User)) {
        let mut rows = self.rows.lock().unwrap();
        let user = rows.iter_mut().find(|u| u.email == email).expect("user exists");
        f(user);
    }

    fn guard(&self) -> Result<(), RepoError> {
        if self.down.load(Ordering::SeqCst) {
            Err(outage())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserRepo for MemoryUsers {
    async fn ping(&self) -> Result<(), RepoError> {
        self.guard()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.guard()?;
        Ok(self.get(email))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        self.guard()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), RepoError> {
        self.guard()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == user.email) {
            return Err(RepoError::UniqueViolation("users_email_key".into()));
        }
        rows.push(user.clone());
        Ok(())
    }

    async fn mark_verified(
        &self,
        user_id: Uuid,
        token: &str,
        at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        self.guard()?;
        let mut rows = self.rows.lock().unwrap();
        let Some(user) = rows
            .iter_mut()
            .find(|u| u.id == user_id && u.verification_token.as_deref() == Some(token))
        else {
            return Ok(false);
        };
        user.is_verified = true;
        user.verification_token = None;
        user.verification_token_created_at = None;
        user.account_updated_at = at;
        Ok(true)
    }

    async fn update_profile(&self, user: &User) -> Result<bool, RepoError> {
        self.guard()?;
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|u| u.id == user.id) else {
            return Ok(false);
        };
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.password_hash = user.password_hash.clone();
        row.account_updated_at = user.account_updated_at;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryImages {
    rows: Mutex<Vec<ProfileImage>>,
    reject_inserts: AtomicBool,
}

impl MemoryImages {
    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Simulates losing the uniqueness race against a concurrent upload.
    pub fn reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageRepo for MemoryImages {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<ProfileImage>, RepoError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|i| i.user_id == user_id).cloned())
    }

    async fn insert(&self, image: &ProfileImage) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if self.reject_inserts.load(Ordering::SeqCst)
            || rows.iter().any(|i| i.user_id == image.user_id)
        {
            return Err(RepoError::UniqueViolation("images_user_id_key".into()));
        }
        rows.push(image.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|i| i.id != id);
        Ok(rows.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            anyhow::bail!("bucket unreachable");
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            anyhow::bail!("bucket unreachable");
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://fake.local/{}", key)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<VerificationMessage>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<VerificationMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_verification(&self, message: &VerificationMessage) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("topic unreachable");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub users: Arc<MemoryUsers>,
    pub images: Arc<MemoryImages>,
    pub storage: Arc<MemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn fake_state() -> (AppState, Fakes) {
    fake_state_with(AppConfig::test_default())
}

pub fn fake_state_with(config: AppConfig) -> (AppState, Fakes) {
    let fakes = Fakes {
        users: Arc::new(MemoryUsers::default()),
        images: Arc::new(MemoryImages::default()),
        storage: Arc::new(MemoryStorage::default()),
        notifier: Arc::new(RecordingNotifier::default()),
    };
    let state = AppState::from_parts(
        config,
        fakes.users.clone(),
        fakes.images.clone(),
        fakes.storage.clone(),
        fakes.notifier.clone(),
    );
    (state, fakes)
}
