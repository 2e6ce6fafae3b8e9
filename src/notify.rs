use anyhow::Context;
use async_trait::async_trait;
use aws_config::SdkConfig;
use serde::Serialize;
use tracing::info;

/// Payload handed to the delivery channel after registration.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationMessage {
    pub email: String,
    pub first_name: String,
    pub token: String,
    pub verification_link: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification(&self, message: &VerificationMessage) -> anyhow::Result<()>;
}

/// Publishes to an SNS topic; a subscriber delivers the email.
pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(shared: &SdkConfig, topic_arn: &str) -> Self {
        Self {
            client: aws_sdk_sns::Client::new(shared),
            topic_arn: topic_arn.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn send_verification(&self, message: &VerificationMessage) -> anyhow::Result<()> {
        let body = serde_json::to_string(message).context("encode verification message")?;
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .send()
            .await
            .context("sns publish")?;
        Ok(())
    }
}

/// Development fallback when no topic is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification(&self, message: &VerificationMessage) -> anyhow::Result<()> {
        info!(
            email = %message.email,
            link = %message.verification_link,
            "verification link (no SNS topic configured)"
        );
        Ok(())
    }
}

pub fn verification_link(base_url: &str, token: &str) -> String {
    format!("{}/v1/verify-email?token={}", base_url.trim_end_matches('/'), token)
}
