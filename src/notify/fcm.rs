//! Firebase Cloud Messaging (HTTP v1) notifier.
//!
//! The OAuth access token is minted outside the process (service account
//! tooling) and supplied through the environment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{Notifier, PushMessage};
use crate::types::DealScoutError;

const FCM_BASE_URL: &str = "https://fcm.googleapis.com/v1/projects";
const SERVICE: &str = "notifier";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

pub struct FcmNotifier {
    http: Client,
    project_id: String,
    access_token: SecretString,
}

impl FcmNotifier {
    pub fn new(project_id: String, access_token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build FCM HTTP client")?;
        Ok(Self {
            http,
            project_id,
            access_token,
        })
    }

    fn build_request<'a>(token: &'a str, message: &'a PushMessage) -> SendRequest<'a> {
        SendRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        }
    }

    async fn post(&self, token: &str, message: &PushMessage) -> Result<()> {
        let url = format!("{FCM_BASE_URL}/{}/messages:send", self.project_id);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&Self::build_request(token, message))
            .send()
            .await
            .context("FCM request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("FCM error {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DealScoutError> {
        self.post(token, message)
            .await
            .map_err(|e| DealScoutError::transient(SERVICE, format!("{e:#}")))?;
        debug!(title = %message.title, "Push sent");
        Ok(())
    }
}
