//! Test doubles for the service seams
//!
//! The orchestrator takes its collaborators by trait object, so tests wire
//! in these in-memory stand-ins instead of network clients.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::feed::{FeedFetcher, FetchOutcome};
use crate::media::MediaStager;
use crate::target::TargetPlatform;
use crate::types::{Attachment, ProfileField, SourcePost, StagedFile};

/// One `create_post` call as seen by the fake target platform
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub target_id: String,
    pub text: String,
    pub media_files: Vec<String>,
    pub in_reply_to: Option<String>,
}

/// Fake target platform that records every call
pub struct RecordingTarget {
    created: Mutex<Vec<CreatedPost>>,
    profile_updates: Mutex<Vec<Vec<ProfileField>>>,
    next_id: AtomicU64,
    fail_submit: AtomicBool,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            profile_updates: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100),
            fail_submit: AtomicBool::new(false),
        }
    }

    /// A target whose submits fail until `heal` is called
    pub fn failing() -> Self {
        let target = Self::new();
        target.fail_submit.store(true, Ordering::SeqCst);
        target
    }

    pub fn heal(&self) {
        self.fail_submit.store(false, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<CreatedPost> {
        self.created.lock().clone()
    }

    pub fn profile_update_count(&self) -> usize {
        self.profile_updates.lock().len()
    }
}

impl Default for RecordingTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetPlatform for RecordingTarget {
    async fn upload_media(&self, file: &StagedFile) -> Result<String> {
        Ok(file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    async fn create_post(
        &self,
        text: &str,
        media_ids: &[String],
        in_reply_to: Option<&str>,
    ) -> Result<String> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(BridgeError::Api {
                status: 500,
                message: "simulated submit failure".to_string(),
            });
        }

        let target_id = format!("t-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().push(CreatedPost {
            target_id: target_id.clone(),
            text: text.to_string(),
            media_files: media_ids.to_vec(),
            in_reply_to: in_reply_to.map(str::to_string),
        });
        Ok(target_id)
    }

    async fn update_profile_metadata(&self, fields: &[ProfileField]) -> Result<()> {
        self.profile_updates.lock().push(fields.to_vec());
        Ok(())
    }
}

/// Stager that stages nothing, for text-only tests
pub struct NullStager;

#[async_trait]
impl MediaStager for NullStager {
    async fn stage(
        &self,
        _dir: &Path,
        _post_id: &str,
        _attachments: &[Attachment],
    ) -> Result<Vec<StagedFile>> {
        Ok(vec![])
    }

    async fn stage_partial(
        &self,
        _dir: &Path,
        _post_id: &str,
        _attachments: &[Attachment],
    ) -> Vec<StagedFile> {
        vec![]
    }
}

/// Stager that pretends to stage attachments without touching the network,
/// optionally failing a chosen subset by index
pub struct FailingStager {
    fail_index: fn(usize) -> bool,
}

impl FailingStager {
    /// Attachments at odd indices fail to stage
    pub fn failing_odd_indices() -> Self {
        Self {
            fail_index: |i| i % 2 == 1,
        }
    }

    fn fake_file(&self, dir: &Path, index: usize, attachment: &Attachment) -> StagedFile {
        StagedFile {
            path: dir.join(format!("{}.{}", index, attachment.kind.extension())),
            kind: attachment.kind,
            caption: attachment.caption.clone(),
        }
    }
}

#[async_trait]
impl MediaStager for FailingStager {
    async fn stage(
        &self,
        dir: &Path,
        _post_id: &str,
        attachments: &[Attachment],
    ) -> Result<Vec<StagedFile>> {
        attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| {
                if (self.fail_index)(index) {
                    Err(BridgeError::AttachmentUnavailable {
                        url: attachment.origin.describe().to_string(),
                    })
                } else {
                    Ok(self.fake_file(dir, index, attachment))
                }
            })
            .collect()
    }

    async fn stage_partial(
        &self,
        dir: &Path,
        _post_id: &str,
        attachments: &[Attachment],
    ) -> Vec<StagedFile> {
        attachments
            .iter()
            .enumerate()
            .filter(|(index, _)| !(self.fail_index)(*index))
            .map(|(index, attachment)| self.fake_file(dir, index, attachment))
            .collect()
    }
}

/// Scripted feed fetcher: each call pops the next outcome
pub struct ScriptedFetcher {
    outcomes: Mutex<VecDeque<Result<FetchOutcome>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_batch(&self, posts: Vec<SourcePost>) {
        self.outcomes
            .lock()
            .push_back(Ok(FetchOutcome::Batch(posts)));
    }

    pub fn push_seed(&self, newest_id: &str) {
        self.outcomes
            .lock()
            .push_back(Ok(FetchOutcome::SeedCursor(newest_id.to_string())));
    }

    pub fn push_error(&self, error: BridgeError) {
        self.outcomes.lock().push_back(Err(error));
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch_since(&self, _cursor: Option<&str>) -> Result<FetchOutcome> {
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(Ok(FetchOutcome::Batch(vec![])))
    }
}

/// Shorthand for building posts in tests
pub fn make_post(id: &str, text: &str, parent: Option<&str>) -> SourcePost {
    SourcePost {
        id: id.to_string(),
        text: text.to_string(),
        parent_id: parent.map(str::to_string),
        attachments: vec![],
    }
}
