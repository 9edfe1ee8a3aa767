//! Mastodon API client
//!
//! Covers the three operations the pipeline needs: v2 media upload
//! (multipart), v1 status creation with `in_reply_to_id`, and the
//! `update_credentials` profile metadata call.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::types::{ProfileField, StagedFile};

use super::TargetPlatform;

/// Connection settings for one Mastodon account
#[derive(Debug, Clone)]
pub struct MastodonConfig {
    /// Instance base URL, e.g. `https://mastodon.example`
    pub base_url: String,
    pub access_token: String,
    /// Status visibility; `private` is useful while testing a deployment
    pub visibility: String,
}

pub struct MastodonClient {
    client: reqwest::Client,
    config: MastodonConfig,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, serde::Serialize)]
struct CreateStatusRequest<'a> {
    status: &'a str,
    visibility: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to_id: Option<&'a str>,
}

impl MastodonClient {
    pub fn new(client: reqwest::Client, config: MastodonConfig) -> Self {
        let config = MastodonConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Turn a non-success response into an `Api` error with the body text
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(BridgeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TargetPlatform for MastodonClient {
    async fn upload_media(&self, file: &StagedFile) -> Result<String> {
        let bytes = tokio::fs::read(&file.path).await?;
        let filename = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        debug!(path = %file.path.display(), bytes = bytes.len(), "uploading media");

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        if let Some(caption) = &file.caption {
            form = form.text("description", caption.clone());
        }

        let response = self
            .client
            .post(self.url("/api/v2/media"))
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await?;

        let media: IdResponse = Self::check(response).await?.json().await?;
        debug!(media_id = %media.id, "media uploaded");
        Ok(media.id)
    }

    async fn create_post(
        &self,
        text: &str,
        media_ids: &[String],
        in_reply_to: Option<&str>,
    ) -> Result<String> {
        let request = CreateStatusRequest {
            status: text,
            visibility: &self.config.visibility,
            media_ids: if media_ids.is_empty() {
                None
            } else {
                Some(media_ids)
            },
            in_reply_to_id: in_reply_to,
        };

        let response = self
            .client
            .post(self.url("/api/v1/statuses"))
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;

        let status: IdResponse = Self::check(response).await?.json().await?;
        Ok(status.id)
    }

    async fn update_profile_metadata(&self, fields: &[ProfileField]) -> Result<()> {
        // update_credentials takes indexed form keys for the field table
        let mut form: Vec<(String, String)> = Vec::with_capacity(fields.len() * 2);
        for (i, field) in fields.iter().enumerate() {
            form.push((format!("fields_attributes[{i}][name]"), field.name.clone()));
            form.push((format!("fields_attributes[{i}][value]"), field.value.clone()));
        }

        let response = self
            .client
            .patch(self.url("/api/v1/accounts/update_credentials"))
            .bearer_auth(&self.config.access_token)
            .form(&form)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
