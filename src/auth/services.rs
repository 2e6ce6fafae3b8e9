use std::sync::Arc;

use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{ProfilePatch, PublicUser, RegisterRequest},
        password::{hash_password, is_strong_enough, verify_password},
        repo::UserRepo,
        repo_types::User,
    },
    config::VerificationConfig,
    db::RepoError,
    error::ErrorKind,
    notify::{verification_link, Notifier, VerificationMessage},
};

const MAX_NAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 100;
const TOKEN_LEN: usize = 32;

/// Domains reserved for documentation and testing; no mailbox can exist there.
const RESERVED_DOMAINS: [&str; 3] = ["example.com", "example.net", "example.org"];
const RESERVED_TLDS: [&str; 4] = ["test", "example", "invalid", "localhost"];

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("User already exists!")]
    DuplicateEmail,

    #[error("Password must be at least 5 characters long")]
    WeakPassword,

    #[error("First and last name must be between 1 and 50 characters")]
    InvalidName,

    #[error("{0}")]
    MalformedBody(String),

    #[error("Field '{0}' cannot be updated")]
    UnknownField(String),

    #[error("No fields to update")]
    EmptyUpdate,

    #[error("Verification email could not be sent")]
    NotificationFailure(#[source] anyhow::Error),

    #[error("Verification token is required")]
    MissingToken,

    #[error("Invalid verification token")]
    InvalidToken,

    #[error("Verification token has expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed")]
    Hashing(#[source] anyhow::Error),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl AccountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::InvalidEmail
            | AccountError::WeakPassword
            | AccountError::InvalidName
            | AccountError::MalformedBody(_)
            | AccountError::UnknownField(_)
            | AccountError::EmptyUpdate
            | AccountError::MissingToken
            | AccountError::TokenExpired => ErrorKind::Validation,
            AccountError::DuplicateEmail => ErrorKind::Conflict,
            AccountError::InvalidToken | AccountError::UserNotFound => ErrorKind::NotFound,
            AccountError::InvalidCredentials => ErrorKind::Unauthorized,
            AccountError::NotificationFailure(_) => ErrorKind::Dependency,
            AccountError::Hashing(_) => ErrorKind::Internal,
            AccountError::Repository(RepoError::UniqueViolation(_)) => ErrorKind::Conflict,
            AccountError::Repository(RepoError::Database(_)) => ErrorKind::Unavailable,
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
                .unwrap();
    }
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return false;
    }
    let domain = match email.rsplit_once('@') {
        Some((_, d)) => d.to_ascii_lowercase(),
        None => return false,
    };
    let tld = domain.rsplit('.').next().unwrap_or_default();
    !RESERVED_DOMAINS.contains(&domain.as_str()) && !RESERVED_TLDS.contains(&tld)
}

fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_NAME_LEN
}

fn mint_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn hash(plain: &str) -> Result<String, AccountError> {
    hash_password(plain).map_err(AccountError::Hashing)
}

/// Owns the user entity's transitions: registration, verification,
/// authentication and profile updates.
pub struct Accounts {
    users: Arc<dyn UserRepo>,
    notifier: Arc<dyn Notifier>,
    verification: VerificationConfig,
}

impl Accounts {
    pub fn new(
        users: Arc<dyn UserRepo>,
        notifier: Arc<dyn Notifier>,
        verification: VerificationConfig,
    ) -> Self {
        Self {
            users,
            notifier,
            verification,
        }
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<PublicUser, AccountError> {
        if !is_valid_name(&req.first_name) || !is_valid_name(&req.last_name) {
            warn!("invalid name");
            return Err(AccountError::InvalidName);
        }
        if !is_valid_email(&req.email) {
            warn!("invalid email");
            return Err(AccountError::InvalidEmail);
        }
        if self.users.find_by_email(&req.email).await?.is_some() {
            warn!("email already registered");
            return Err(AccountError::DuplicateEmail);
        }
        if !is_strong_enough(&req.password) {
            warn!("password too short");
            return Err(AccountError::WeakPassword);
        }

        let now = OffsetDateTime::now_utc();
        let token = mint_token();
        let user = User {
            id: Uuid::new_v4(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email: req.email,
            password_hash: hash(&req.password)?,
            is_verified: false,
            verification_token: Some(token.clone()),
            verification_token_created_at: Some(now),
            account_created_at: now,
            account_updated_at: now,
        };

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(RepoError::UniqueViolation(constraint)) => {
                warn!(%constraint, "lost registration race");
                return Err(AccountError::DuplicateEmail);
            }
            Err(e) => return Err(e.into()),
        }
        info!(user_id = %user.id, "user registered");

        // The row is committed at this point; a failed publish leaves an
        // unverified user with no way to request a new link.
        let message = VerificationMessage {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            verification_link: verification_link(&self.verification.base_url, &token),
            token,
        };
        if let Err(e) = self.notifier.send_verification(&message).await {
            error!(error = %e, user_id = %user.id, "verification notification failed");
            return Err(AccountError::NotificationFailure(e));
        }

        Ok(PublicUser::from(&user))
    }

    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: Option<&str>) -> Result<(), AccountError> {
        self.verify_email_at(token, OffsetDateTime::now_utc()).await
    }

    async fn verify_email_at(
        &self,
        token: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(), AccountError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AccountError::MissingToken),
        };
        let user = self
            .users
            .find_by_token(token)
            .await?
            .ok_or(AccountError::InvalidToken)?;

        let ttl = Duration::seconds(self.verification.ttl_seconds);
        let expired = match user.verification_token_created_at {
            Some(issued_at) => now > issued_at + ttl,
            None => true,
        };
        if expired {
            warn!(user_id = %user.id, "verification token expired");
            return Err(AccountError::TokenExpired);
        }

        if !self.users.mark_verified(user.id, token, now).await? {
            // Consumed by a concurrent request.
            return Err(AccountError::InvalidToken);
        }
        info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// Resolves basic credentials to a user. Unknown email and wrong password
    /// fail differently so the HTTP layer can map them to 404 and 401.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        let ok = verify_password(password, &user.password_hash).map_err(AccountError::Hashing)?;
        if !ok {
            warn!(user_id = %user.id, "invalid password");
            return Err(AccountError::InvalidCredentials);
        }
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, email: &str) -> Result<PublicUser, AccountError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_profile(&self, email: &str, patch: ProfilePatch) -> Result<(), AccountError> {
        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if let Some(first_name) = patch.first_name {
            if !is_valid_name(&first_name) {
                return Err(AccountError::InvalidName);
            }
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = patch.last_name {
            if !is_valid_name(&last_name) {
                return Err(AccountError::InvalidName);
            }
            user.last_name = last_name.trim().to_string();
        }
        if let Some(password) = patch.password {
            if !is_strong_enough(&password) {
                return Err(AccountError::WeakPassword);
            }
            user.password_hash = hash(&password)?;
        }
        user.account_updated_at = OffsetDateTime::now_utc();

        if !self.users.update_profile(&user).await? {
            return Err(AccountError::UserNotFound);
        }
        info!(user_id = %user.id, "profile updated");
        Ok(())
    }
}
