//! Media staging: download attachments into the cycle's scoped temp area
//!
//! Downloads for one post's attachments run concurrently with bounded
//! parallelism, but the returned sequence always preserves attachment order
//! regardless of completion order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::{COOKIE, USER_AGENT};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::types::{Attachment, MediaConfig, MediaOrigin, StagedFile};

/// Video pages only expose the stream URL with HLS playback enabled
const HLS_COOKIE: &str = "hlsPlayback=on;";

static VIDEO_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-url="([^"]*)""#).unwrap());

/// Boundary for staging a post's attachments into local files
#[async_trait]
pub trait MediaStager: Send + Sync {
    /// Stage all attachments, in order. A single failure fails the whole
    /// call with `AttachmentUnavailable` naming the failing descriptor.
    async fn stage(
        &self,
        dir: &Path,
        post_id: &str,
        attachments: &[Attachment],
    ) -> Result<Vec<StagedFile>>;

    /// Stage what can be staged, dropping failed attachments but keeping
    /// the survivors in their original order. Partial attachment loss is
    /// non-fatal to the post itself.
    async fn stage_partial(
        &self,
        dir: &Path,
        post_id: &str,
        attachments: &[Attachment],
    ) -> Vec<StagedFile> {
        let mut staged = Vec::with_capacity(attachments.len());
        for (index, attachment) in attachments.iter().enumerate() {
            match self.stage(dir, post_id, std::slice::from_ref(attachment)).await {
                Ok(mut files) => staged.append(&mut files),
                Err(e) => {
                    warn!(
                        post_id,
                        index,
                        error = %e,
                        "dropping attachment that failed to stage"
                    );
                }
            }
        }
        staged
    }
}

/// HTTP-backed stager used in production
pub struct HttpMediaStager {
    client: reqwest::Client,
    config: MediaConfig,
    user_agent: String,
}

impl HttpMediaStager {
    pub fn new(client: reqwest::Client, config: MediaConfig) -> Self {
        Self {
            client,
            config,
            user_agent:
                "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
                    .to_string(),
        }
    }

    /// Resolve an attachment origin to a directly downloadable URL
    async fn resolve_url(&self, origin: &MediaOrigin) -> Result<String> {
        match origin {
            MediaOrigin::Direct(url) => Ok(url.clone()),
            MediaOrigin::StatusPage(page_url) => {
                let page = self
                    .client
                    .get(page_url)
                    .header(USER_AGENT, &self.user_agent)
                    .header(COOKIE, HLS_COOKIE)
                    .send()
                    .await
                    .map_err(|_| unavailable(page_url))?
                    .error_for_status()
                    .map_err(|_| unavailable(page_url))?
                    .text()
                    .await
                    .map_err(|_| unavailable(page_url))?;

                let encoded = VIDEO_URL_RE
                    .captures(&page)
                    .and_then(|c| c[1].rsplit('/').next().map(str::to_string))
                    .ok_or_else(|| unavailable(page_url))?;

                Ok(percent_decode(&encoded))
            }
        }
    }

    /// Download one attachment to `<index>_<post_id>.<ext>` in the temp dir
    async fn stage_one(
        &self,
        dir: &Path,
        post_id: &str,
        index: usize,
        attachment: &Attachment,
    ) -> Result<StagedFile> {
        let url = self.resolve_url(&attachment.origin).await?;
        debug!(post_id, index, url, "downloading attachment");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|_| unavailable(&url))?
            .error_for_status()
            .map_err(|_| unavailable(&url))?;

        let path: PathBuf = dir.join(format!(
            "{}_{}.{}",
            index,
            post_id,
            attachment.kind.extension()
        ));
        let mut file = tokio::fs::File::create(&path).await?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|_| unavailable(&url))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(StagedFile {
            path,
            kind: attachment.kind,
            caption: attachment.caption.clone(),
        })
    }
}

#[async_trait]
impl MediaStager for HttpMediaStager {
    async fn stage(
        &self,
        dir: &Path,
        post_id: &str,
        attachments: &[Attachment],
    ) -> Result<Vec<StagedFile>> {
        let downloads = attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| self.stage_one(dir, post_id, index, attachment))
            .collect::<Vec<_>>();

        // buffered() yields in input order even when downloads complete
        // out of order, which is exactly the ordering contract here.
        let results: Vec<Result<StagedFile>> = stream::iter(downloads)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    async fn stage_partial(
        &self,
        dir: &Path,
        post_id: &str,
        attachments: &[Attachment],
    ) -> Vec<StagedFile> {
        let downloads = attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| self.stage_one(dir, post_id, index, attachment))
            .collect::<Vec<_>>();

        let results: Vec<Result<StagedFile>> = stream::iter(downloads)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(post_id, index, error = %e, "dropping attachment that failed to stage");
                    None
                }
            })
            .collect()
    }
}

fn unavailable(url: &str) -> BridgeError {
    BridgeError::AttachmentUnavailable {
        url: url.to_string(),
    }
}

/// Decode the provider's percent-encoded media path segments
fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;

    #[test]
    fn test_percent_decode() {
        assert_eq!(
            percent_decode("https%3A%2F%2Fvideo.example%2Fclip.mp4"),
            "https://video.example/clip.mp4"
        );
        assert_eq!(percent_decode("plain.mp4"), "plain.mp4");
        assert_eq!(percent_decode("broken%2"), "broken%2");
    }

    #[test]
    fn test_video_url_extraction_from_page() {
        let page = r#"<div class="video-container" data-url="/video/enc/https%3A%2F%2Fvideo.example%2Fclip.m3u8"></div>"#;
        let encoded = VIDEO_URL_RE
            .captures(page)
            .and_then(|c| c[1].rsplit('/').next().map(str::to_string))
            .unwrap();
        assert_eq!(
            percent_decode(&encoded),
            "https://video.example/clip.m3u8"
        );
    }

    #[test]
    fn test_staged_filename_layout() {
        let dir = Path::new("/tmp/cycle");
        let path = dir.join(format!("{}_{}.{}", 1, "12345", MediaKind::Video.extension()));
        assert_eq!(path, PathBuf::from("/tmp/cycle/1_12345.mp4"));
    }
}
