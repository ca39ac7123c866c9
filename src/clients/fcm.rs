use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    clients::PushSender,
    config::Config,
    error::SendError,
    message::RenderedMessage,
    models::fcm::{AndroidConfig, ApnsConfig, ApnsPayload, Aps, FcmMessage, FcmRequest, FcmResponse},
};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];
const ANDROID_TTL: &str = "3600s";

/// FCM HTTP v1 client. Constructed once at process start and passed into the
/// dispatch engine; there is no hidden backend singleton.
pub struct FcmClient {
    http_client: Client,
    project_id: String,
    base_url: String,
    auth: Option<Arc<dyn TokenProvider>>,
}

impl FcmClient {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let provider: Arc<dyn TokenProvider> = match &config.fcm_credentials_path {
            Some(path) => Arc::new(
                CustomServiceAccount::from_file(path)
                    .map_err(|e| anyhow!("Failed to load FCM credentials: {e}"))?,
            ),
            None => gcp_auth::provider()
                .await
                .map_err(|e| anyhow!("No FCM credentials available: {e}"))?,
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(project_id = %config.fcm_project_id, "FCM client initialized");

        Ok(Self {
            http_client,
            project_id: config.fcm_project_id.clone(),
            base_url: config
                .fcm_endpoint
                .clone()
                .unwrap_or_else(|| FCM_ENDPOINT.to_string()),
            auth: Some(provider),
        })
    }

    /// Client for an emulator or mock endpoint; skips bearer authentication.
    pub fn unauthenticated(project_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            project_id: project_id.into(),
            base_url: base_url.into(),
            auth: None,
        }
    }

    fn request_for(&self, device_token: &str, message: &RenderedMessage) -> FcmRequest {
        let mut data = HashMap::new();
        data.insert("title".to_string(), message.title.clone());
        data.insert("body".to_string(), message.body.clone());

        let mut headers = HashMap::new();
        headers.insert("apns-priority".to_string(), "5".to_string());
        headers.insert("apns-push-type".to_string(), "background".to_string());

        FcmRequest {
            message: FcmMessage {
                token: device_token.to_string(),
                data,
                android: AndroidConfig {
                    ttl: ANDROID_TTL.to_string(),
                    priority: "normal".to_string(),
                },
                apns: ApnsConfig {
                    headers,
                    payload: ApnsPayload {
                        aps: Aps {
                            content_available: 1,
                        },
                    },
                },
            },
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>, SendError> {
        match &self.auth {
            Some(provider) => {
                let token = provider
                    .token(FCM_SCOPES)
                    .await
                    .map_err(|e| SendError::Auth(e.to_string()))?;
                Ok(Some(token.as_str().to_string()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );
        let bearer = self.bearer_token().await?;

        for device_token in tokens {
            let request = self.request_for(device_token, message);

            let mut builder = self.http_client.post(&url).json(&request);
            if let Some(token) = &bearer {
                builder = builder.bearer_auth(token);
            }

            let response = builder.send().await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let detail = response.text().await.unwrap_or_default();
                return Err(SendError::Backend { status, detail });
            }

            let body = response.json::<FcmResponse>().await.ok();
            debug!(
                device_token = %device_token,
                message_name = ?body.and_then(|b| b.name),
                "FCM push notification sent"
            );
        }

        Ok(())
    }
}
