//! Per-post publication state machine
//!
//! Each post runs through: duplicate check, parent resolution, media
//! staging, text grooming, submit, record. The terminal states are
//! `Published`, `Skipped` (deferred reply), and `Failed` (abandoned for this
//! cycle). Store errors propagate to the caller and abort the cycle;
//! everything post-local is contained here so one bad post never takes the
//! batch down with it.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::media::MediaStager;
use crate::store::CursorStore;
use crate::target::TargetPlatform;
use crate::text::TextPipeline;
use crate::types::{PostOutcome, SourcePost};

pub struct Publisher {
    store: CursorStore,
    target: Arc<dyn TargetPlatform>,
    stager: Arc<dyn MediaStager>,
    pipeline: TextPipeline,
}

impl Publisher {
    pub fn new(
        store: CursorStore,
        target: Arc<dyn TargetPlatform>,
        stager: Arc<dyn MediaStager>,
        pipeline: TextPipeline,
    ) -> Self {
        Self {
            store,
            target,
            stager,
            pipeline,
        }
    }

    /// Publish one post, idempotently.
    ///
    /// Only store failures escape as errors; submit failures terminate in
    /// `Failed` and deferred replies in `Skipped`.
    pub async fn publish(&self, post: &SourcePost, staging_dir: &Path) -> Result<PostOutcome> {
        // CHECK_DUPLICATE
        if let Some(target_id) = self.store.target_id(&post.id)? {
            warn!(source_id = %post.id, %target_id, "refusing to repost duplicate");
            return Ok(PostOutcome::Published { target_id });
        }

        // RESOLVE_PARENT
        let parent_target = match &post.parent_id {
            Some(parent_id) => match self.store.target_id(parent_id)? {
                Some(target_id) => Some(target_id),
                None => {
                    info!(
                        source_id = %post.id,
                        parent_id = %parent_id,
                        "parent not yet mapped, deferring reply to a later cycle"
                    );
                    return Ok(PostOutcome::Skipped);
                }
            },
            None => None,
        };

        // STAGE_MEDIA: attachment loss is non-fatal, the text still posts
        let staged = self
            .stager
            .stage_partial(staging_dir, &post.id, &post.attachments)
            .await;
        if staged.len() < post.attachments.len() {
            warn!(
                source_id = %post.id,
                staged = staged.len(),
                total = post.attachments.len(),
                "posting with partial attachments"
            );
        }

        // TRANSFORM_TEXT
        let text = self.pipeline.groom(&post.text);
        debug!(source_id = %post.id, "groomed text:\n{text}");

        // Upload whatever staged; an upload failure abandons the post
        let mut media_ids = Vec::with_capacity(staged.len());
        for file in &staged {
            match self.target.upload_media(file).await {
                Ok(id) => media_ids.push(id),
                Err(e) => {
                    warn!(source_id = %post.id, error = %e, "media upload failed, abandoning post");
                    return Ok(PostOutcome::Failed);
                }
            }
        }

        // A crash between a past submit and its record write is the one
        // double-post window; close it by re-checking right before submit.
        if let Some(target_id) = self.store.target_id(&post.id)? {
            return Ok(PostOutcome::Published { target_id });
        }

        // SUBMIT
        info!(
            source_id = %post.id,
            media = media_ids.len(),
            in_reply_to = parent_target.as_deref().unwrap_or("-"),
            "submitting post"
        );
        let target_id = match self
            .target
            .create_post(&text, &media_ids, parent_target.as_deref())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let err = BridgeError::SubmitFailed {
                    source_id: post.id.clone(),
                    message: e.to_string(),
                };
                warn!(error = %err, "abandoning post for this cycle");
                return Ok(PostOutcome::Failed);
            }
        };

        // RECORD: write-once; a duplicate here means another path already
        // recorded it, which is success.
        match self.store.record_published(&post.id, &target_id) {
            Ok(()) => Ok(PostOutcome::Published { target_id }),
            Err(BridgeError::DuplicateKey { .. }) => {
                let existing = self.store.target_id(&post.id)?.unwrap_or(target_id);
                Ok(PostOutcome::Published {
                    target_id: existing,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailingStager, NullStager, RecordingTarget};
    use crate::types::{Attachment, MediaKind, MediaOrigin, TextConfig};

    fn post(id: &str, text: &str, parent: Option<&str>) -> SourcePost {
        SourcePost {
            id: id.to_string(),
            text: text.to_string(),
            parent_id: parent.map(str::to_string),
            attachments: vec![],
        }
    }

    fn publisher(store: &CursorStore, target: Arc<RecordingTarget>) -> Publisher {
        Publisher::new(
            store.clone(),
            target,
            Arc::new(NullStager),
            TextPipeline::standard(&TextConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_simple_post_publishes_and_records() {
        let store = CursorStore::open_in_memory().unwrap();
        let target = Arc::new(RecordingTarget::new());
        let publisher = publisher(&store, target.clone());

        let outcome = publisher
            .publish(&post("1", "hello", None), Path::new("/tmp"))
            .await
            .unwrap();

        let target_id = match outcome {
            PostOutcome::Published { target_id } => target_id,
            other => panic!("expected Published, got {other:?}"),
        };
        assert_eq!(store.target_id("1").unwrap(), Some(target_id));
        assert_eq!(target.created().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_a_no_op() {
        let store = CursorStore::open_in_memory().unwrap();
        store.record_published("1", "t-1").unwrap();
        let target = Arc::new(RecordingTarget::new());
        let publisher = publisher(&store, target.clone());

        let outcome = publisher
            .publish(&post("1", "hello", None), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PostOutcome::Published {
                target_id: "t-1".to_string()
            }
        );
        assert!(target.created().is_empty(), "no second submit may happen");
    }

    #[tokio::test]
    async fn test_reply_with_unmapped_parent_is_skipped() {
        let store = CursorStore::open_in_memory().unwrap();
        let target = Arc::new(RecordingTarget::new());
        let publisher = publisher(&store, target.clone());

        let outcome = publisher
            .publish(&post("2", "a reply", Some("1")), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(outcome, PostOutcome::Skipped);
        assert!(target.created().is_empty());
        assert_eq!(store.target_id("2").unwrap(), None);
    }

    #[tokio::test]
    async fn test_reply_threads_through_parent_mapping() {
        let store = CursorStore::open_in_memory().unwrap();
        store.record_published("1", "t-1").unwrap();
        let target = Arc::new(RecordingTarget::new());
        let publisher = publisher(&store, target.clone());

        let outcome = publisher
            .publish(&post("2", "a reply", Some("1")), Path::new("/tmp"))
            .await
            .unwrap();

        assert!(matches!(outcome, PostOutcome::Published { .. }));
        let created = target.created();
        assert_eq!(created[0].in_reply_to.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_submit_failure_is_contained() {
        let store = CursorStore::open_in_memory().unwrap();
        let target = Arc::new(RecordingTarget::failing());
        let publisher = publisher(&store, target.clone());

        let outcome = publisher
            .publish(&post("1", "hello", None), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(outcome, PostOutcome::Failed);
        assert_eq!(store.target_id("1").unwrap(), None, "no record on failure");
    }

    #[tokio::test]
    async fn test_attachment_failure_degrades_but_still_posts() {
        let store = CursorStore::open_in_memory().unwrap();
        let target = Arc::new(RecordingTarget::new());
        // Stager that fails every second attachment
        let publisher = Publisher::new(
            store.clone(),
            target.clone(),
            Arc::new(FailingStager::failing_odd_indices()),
            TextPipeline::standard(&TextConfig::default()),
        );

        let attachment = |n: u32| Attachment {
            origin: MediaOrigin::Direct(format!("https://media.example/{n}.jpg")),
            kind: MediaKind::Image,
            caption: None,
        };
        let mut p = post("1", "with media", None);
        p.attachments = vec![attachment(0), attachment(1), attachment(2)];

        let outcome = publisher.publish(&p, Path::new("/tmp")).await.unwrap();

        assert!(matches!(outcome, PostOutcome::Published { .. }));
        let created = target.created();
        // Attachment 1 dropped; 0 and 2 survive in original order
        assert_eq!(created[0].media_files, vec!["0.jpg", "2.jpg"]);
    }
}
