//! Core data types shared across the sync pipeline

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A post fetched from the source platform.
///
/// Immutable once fetched; lives for the duration of one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePost {
    /// Source-platform-assigned identifier. Opaque string, monotonically
    /// increasing in practice but not guaranteed within a fetch batch.
    pub id: String,
    /// Body text as fetched, before grooming.
    pub text: String,
    /// Identifier of the post this one replies to, if any.
    pub parent_id: Option<String>,
    /// Attachment descriptors in the order they appear on the post.
    pub attachments: Vec<Attachment>,
}

impl SourcePost {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Kind of an attached media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// File extension used for staged copies
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// Where the bytes of an attachment come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaOrigin {
    /// Directly downloadable URL
    Direct(String),
    /// A status page that embeds the media URL; the stager scrapes it out
    StatusPage(String),
}

impl MediaOrigin {
    /// Human-readable reference for logs and errors
    pub fn describe(&self) -> &str {
        match self {
            MediaOrigin::Direct(url) | MediaOrigin::StatusPage(url) => url,
        }
    }
}

/// Descriptor of a media item attached to a source post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub origin: MediaOrigin,
    pub kind: MediaKind,
    pub caption: Option<String>,
}

/// A locally materialized copy of a remote attachment.
///
/// Owned exclusively by the cycle that created it; the backing file lives in
/// the cycle's temp dir and disappears with it.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub caption: Option<String>,
}

/// Terminal state of one post's trip through the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// Submitted (or already on record) with the target platform id
    Published { target_id: String },
    /// Deferred: parent not yet mapped, eligible again next cycle
    Skipped,
    /// Abandoned for this cycle after a submit failure
    Failed,
}

/// One name/value field on the target platform profile
#[derive(Debug, Clone, Serialize)]
pub struct ProfileField {
    pub name: String,
    pub value: String,
}

/// Counters reported after a sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Feed-side configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Source account handle, without the leading `@`
    pub user_handle: String,
    /// Provider endpoint pool, tried with linear probing from a random start
    pub providers: Vec<String>,
}

/// Text grooming configuration
#[derive(Debug, Clone)]
pub struct TextConfig {
    /// Explicit source-handle to target-handle remappings
    pub handle_map: HashMap<String, String>,
    /// Suffix appended to handles with no explicit mapping
    pub fallback_suffix: String,
    /// Hard character limit on the target platform
    pub char_limit: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            handle_map: HashMap::new(),
            fallback_suffix: "@twtr".to_string(),
            char_limit: 500,
        }
    }
}

/// Media staging configuration
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Maximum concurrent downloads within one post's attachments
    pub concurrency: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}
