pub mod fcm;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use parley_db::models::{Message, User};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dao::UserDao;
use crate::dispatch::preview::preview_for;
use crate::error::{ChatError, ChatResult};

pub use fcm::FcmPushProvider;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected request: {0}")]
    Provider(String),
    #[error("Push dispatch timed out")]
    Timeout,
}

impl From<PushError> for ChatError {
    fn from(err: PushError) -> Self {
        ChatError::Background(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub data: HashMap<String, String>,
}

/// Per-token outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Tokens the provider says will never work again.
    pub invalid_tokens: Vec<String>,
}

/// Outbound push gateway. Partial failure is reported, not raised; `Ok(None)`
/// means the provider refused our credentials.
#[async_trait]
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(
        &self,
        tokens: &[String],
        payload: &PushPayload,
    ) -> Result<Option<PushReport>, PushError>;
}

/// Writes pushes to the log. Used when no provider is configured.
pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(
        &self,
        tokens: &[String],
        payload: &PushPayload,
    ) -> Result<Option<PushReport>, PushError> {
        info!(
            tokens = tokens.len(),
            title = %payload.title,
            body = %payload.body,
            "Push notification"
        );
        Ok(Some(PushReport {
            success_count: tokens.len(),
            ..PushReport::default()
        }))
    }
}

/// Fallback path for recipients without a live connection.
pub struct Notifier {
    provider: Arc<dyn PushProvider>,
    users: Arc<UserDao>,
    preview_length: usize,
    timeout: Duration,
}

impl Notifier {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        users: Arc<UserDao>,
        preview_length: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            users,
            preview_length,
            timeout,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One dispatch for one offline recipient. Returns whether anything was
    /// sent; a recipient without tokens is skipped.
    pub async fn notify_offline(
        &self,
        recipient: &User,
        sender: &User,
        message: &Message,
    ) -> ChatResult<bool> {
        let recipient_id = recipient.id.unwrap_or_default();
        let tokens = recipient.push_token_values();
        if tokens.is_empty() {
            debug!(?recipient_id, "Offline recipient has no push tokens");
            return Ok(false);
        }

        let payload = build_payload(sender, message, self.preview_length);
        let outcome = tokio::time::timeout(self.timeout, self.provider.dispatch(&tokens, &payload))
            .await
            .map_err(|_| PushError::Timeout)??;

        match outcome {
            None => {
                warn!(
                    provider = self.provider.name(),
                    ?recipient_id,
                    "Push provider rejected credentials"
                );
            }
            Some(report) => {
                debug!(
                    ?recipient_id,
                    success = report.success_count,
                    failure = report.failure_count,
                    "Push dispatched"
                );
                if !report.invalid_tokens.is_empty() {
                    self.drop_invalid_tokens(recipient_id, &report.invalid_tokens)
                        .await?;
                }
            }
        }
        Ok(true)
    }

    async fn drop_invalid_tokens(&self, user_id: ObjectId, tokens: &[String]) -> ChatResult<()> {
        let removed = self.users.remove_push_tokens(user_id, tokens).await?;
        info!(?user_id, count = tokens.len(), removed, "Removed invalid push tokens");
        Ok(())
    }
}

/// Sender chrome plus a truncated preview of the content.
pub fn build_payload(sender: &User, message: &Message, preview_length: usize) -> PushPayload {
    let mut data = HashMap::new();
    data.insert("sender".to_string(), sender.username.clone());
    data.insert("container_kind".to_string(), message.container.kind().as_str().to_string());
    data.insert("container_id".to_string(), message.container.id().to_hex());
    if let Some(id) = message.id {
        data.insert("message_id".to_string(), id.to_hex());
    }

    PushPayload {
        title: format!("New message from {}", sender.display_name),
        body: preview_for(
            &message.content,
            message.photo_urls.len(),
            message.file_urls.len(),
            preview_length,
        ),
        icon: sender.avatar.clone(),
        data,
    }
}
