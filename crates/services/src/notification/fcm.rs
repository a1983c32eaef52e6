use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PushError, PushPayload, PushProvider, PushReport};

/// Firebase Cloud Messaging over the HTTP multicast endpoint.
pub struct FcmPushProvider {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    registration_ids: &'a [String],
    notification: FcmNotification<'a>,
    data: &'a HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    sound: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: usize,
    #[serde(default)]
    failure: usize,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    error: Option<String>,
}

impl FcmPushProvider {
    pub fn new(endpoint: String, server_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            server_key,
        }
    }
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    fn name(&self) -> &'static str {
        "fcm"
    }

    async fn dispatch(
        &self,
        tokens: &[String],
        payload: &PushPayload,
    ) -> Result<Option<PushReport>, PushError> {
        let body = FcmRequest {
            registration_ids: tokens,
            notification: FcmNotification {
                title: &payload.title,
                body: &payload.body,
                icon: payload.icon.as_deref(),
                sound: "default",
            },
            data: &payload.data,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %resp.status(), "FCM rejected server key");
                return Ok(None);
            }
            status if !status.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                return Err(PushError::Provider(format!("{status}: {text}")));
            }
            _ => {}
        }

        let parsed = resp.json::<FcmResponse>().await?;
        Ok(Some(into_report(tokens, parsed)))
    }
}

/// Results come back in token order. Only errors that mean the token is
/// permanently dead mark it invalid.
fn into_report(tokens: &[String], resp: FcmResponse) -> PushReport {
    let invalid_tokens = tokens
        .iter()
        .zip(resp.results.iter())
        .filter(|(_, r)| {
            matches!(
                r.error.as_deref(),
                Some("NotRegistered") | Some("InvalidRegistration") | Some("MismatchSenderId")
            )
        })
        .map(|(t, _)| t.clone())
        .collect();

    PushReport {
        success_count: resp.success,
        failure_count: resp.failure,
        invalid_tokens,
    }
}
