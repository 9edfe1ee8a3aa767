//! Target platform boundary
//!
//! Everything the publisher needs from the republishing side: media upload,
//! post creation with optional reply threading, and the profile metadata
//! refresh that runs after each cycle.

mod mastodon;

pub use mastodon::{MastodonClient, MastodonConfig};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ProfileField, StagedFile};

/// Boundary to the service posts are republished to
#[async_trait]
pub trait TargetPlatform: Send + Sync {
    /// Upload one staged file, returning the platform's media id
    async fn upload_media(&self, file: &StagedFile) -> Result<String>;

    /// Create a post; returns the target post id used for id mapping and
    /// later reply resolution
    async fn create_post(
        &self,
        text: &str,
        media_ids: &[String],
        in_reply_to: Option<&str>,
    ) -> Result<String>;

    /// Replace the profile metadata fields
    async fn update_profile_metadata(&self, fields: &[ProfileField]) -> Result<()>;
}
