use crate::auth::{
    repo::{PgUserRepo, UserRepo},
    services::Accounts,
};
use crate::config::AppConfig;
use crate::db::Schema;
use crate::images::{
    repo::{ImageRepo, PgImageRepo},
    services::ProfileImages,
};
use crate::notify::{LogNotifier, Notifier, SnsNotifier};
use crate::storage::{Storage, StorageClient};
use aws_config::{defaults, BehaviorVersion};
use aws_sdk_s3::config::Region;
use aws_credential_types::Credentials;
use std::sync::Arc;

/// Explicit application context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub accounts: Arc<Accounts>,
    pub images: Arc<ProfileImages>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = crate::db::connect(&config)?;
        let schema = Schema::default();
        if let Err(e) = schema.ready(&db).await {
            tracing::warn!(error = %e, "migrations not applied yet; retrying on first use");
        }

        let mut loader =
            defaults(BehaviorVersion::latest()).region(Region::new(config.s3.region.clone()));
        if let (Some(access_key), Some(secret_key)) = (&config.s3.access_key, &config.s3.secret_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ));
        }
        let shared = loader.load().await;

        let storage = Arc::new(Storage::new(&shared, &config.s3)) as Arc<dyn StorageClient>;
        let notifier: Arc<dyn Notifier> = match &config.sns_topic_arn {
            Some(arn) => Arc::new(SnsNotifier::new(&shared, arn)),
            None => {
                tracing::warn!("SNS_TOPIC_ARN not set; verification links will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone(), schema.clone())),
            Arc::new(PgImageRepo::new(db, schema)),
            storage,
            notifier,
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserRepo>,
        images: Arc<dyn ImageRepo>,
        storage: Arc<dyn StorageClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let accounts = Accounts::new(users.clone(), notifier, config.verification.clone());
        let images = ProfileImages::new(users.clone(), images, storage);
        Self {
            config: Arc::new(config),
            users,
            accounts: Arc::new(accounts),
            images: Arc::new(images),
        }
    }
}
