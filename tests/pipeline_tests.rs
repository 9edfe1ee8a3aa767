//! End-to-end pipeline tests
//!
//! Drive the orchestrator with scripted feed batches and a recording target
//! platform to lock the sync guarantees: at-most-once republication,
//! parent-before-reply ordering, deferred replies, partial media loss, and
//! first-run cursor seeding.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use birdbridge::media::MediaStager;
use birdbridge::publish::Publisher;
use birdbridge::store::CursorStore;
use birdbridge::sync::{SyncConfig, SyncRunner};
use birdbridge::testutil::{
    make_post, FailingStager, NullStager, RecordingTarget, ScriptedFetcher,
};
use birdbridge::text::TextPipeline;
use birdbridge::types::{Attachment, MediaKind, MediaOrigin, TextConfig};

struct Harness {
    store: CursorStore,
    fetcher: Arc<ScriptedFetcher>,
    target: Arc<RecordingTarget>,
    runner: SyncRunner,
}

fn harness_with_stager(stager: Arc<dyn MediaStager>) -> Harness {
    let store = CursorStore::open_in_memory().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let target = Arc::new(RecordingTarget::new());

    let publisher = Publisher::new(
        store.clone(),
        target.clone(),
        stager,
        TextPipeline::standard(&TextConfig::default()),
    );
    let runner = SyncRunner::new(
        store.clone(),
        fetcher.clone(),
        publisher,
        target.clone(),
        SyncConfig::default(),
    );

    Harness {
        store,
        fetcher,
        target,
        runner,
    }
}

fn harness() -> Harness {
    harness_with_stager(Arc::new(NullStager))
}

#[tokio::test]
async fn dedup_processing_same_batch_twice_publishes_once() {
    let h = harness();
    h.store.set_cursor("0").unwrap();

    let batch = || vec![make_post("1", "hello", None), make_post("2", "world", None)];
    h.fetcher.push_batch(batch());
    // Simulated duplicate fetch of the same posts
    h.fetcher.push_batch(batch());

    let first = h.runner.run_once().await.unwrap();
    let second = h.runner.run_once().await.unwrap();

    assert_eq!(first.published, 2);
    // Second pass resolves via the existing mappings, no new submits
    assert_eq!(second.published, 2);
    assert_eq!(h.target.created().len(), 2);
    assert_eq!(h.store.published_count().unwrap(), 2);
}

#[tokio::test]
async fn reply_fetched_before_parent_publishes_in_thread_order() {
    let h = harness();
    h.store.set_cursor("0").unwrap();

    // Fetched in order [2, 1]: the reply arrives first
    h.fetcher.push_batch(vec![
        make_post("2", "R to @user: world", Some("1")),
        make_post("1", "hello", None),
    ]);

    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.published, 2);

    let created = h.target.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].text, "hello");
    assert_eq!(created[0].in_reply_to, None);
    // The reply's in_reply_to is the target id the parent just received
    assert_eq!(created[1].in_reply_to.as_deref(), Some(created[0].target_id.as_str()));
}

#[tokio::test]
async fn deferred_reply_publishes_once_parent_is_mapped() {
    let h = harness();
    h.store.set_cursor("0").unwrap();

    // Cycle 1: the reply shows up alone, its parent unknown
    h.fetcher.push_batch(vec![make_post("2", "a reply", Some("1"))]);
    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.skipped, 1);
    assert!(h.target.created().is_empty());

    // Cycle 2: parent and reply both present (reply was re-fetched because
    // the cursor never moved past it)
    h.fetcher.push_batch(vec![
        make_post("1", "the parent", None),
        make_post("2", "a reply", Some("1")),
    ]);
    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.published, 2);

    let created = h.target.created();
    assert_eq!(created[1].in_reply_to.as_deref(), Some(created[0].target_id.as_str()));
}

#[tokio::test]
async fn partial_media_loss_still_publishes_with_remaining_attachments() {
    let h = harness_with_stager(Arc::new(FailingStager::failing_odd_indices()));
    h.store.set_cursor("0").unwrap();

    let attachment = |n: u32| Attachment {
        origin: MediaOrigin::Direct(format!("https://media.example/{n}.jpg")),
        kind: MediaKind::Image,
        caption: None,
    };
    let mut post = make_post("1", "four pictures", None);
    post.attachments = vec![attachment(0), attachment(1), attachment(2), attachment(3)];
    h.fetcher.push_batch(vec![post]);

    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.published, 1);

    let created = h.target.created();
    // Attachments 1 and 3 failed to stage; 0 and 2 survive in order
    assert_eq!(created[0].media_files, vec!["0.jpg", "2.jpg"]);
}

#[tokio::test]
async fn long_text_is_cut_to_the_platform_limit() {
    let h = harness();
    h.store.set_cursor("0").unwrap();

    let long = "a".repeat(800);
    h.fetcher.push_batch(vec![make_post("1", &long, None)]);

    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.published, 1);
    assert_eq!(h.target.created()[0].text.chars().count(), 500);
}

#[tokio::test]
async fn first_run_seeds_cursor_without_publishing() {
    let h = harness();

    h.fetcher.push_seed("1690000000000000000");
    let stats = h.runner.run_once().await.unwrap();

    assert_eq!(stats, birdbridge::types::CycleStats::default());
    assert_eq!(
        h.store.cursor().unwrap().as_deref(),
        Some("1690000000000000000")
    );
    assert!(h.target.created().is_empty());
    // No store writes beyond the cursor itself
    assert_eq!(h.store.published_count().unwrap(), 0);
}

#[tokio::test]
async fn failed_parent_and_reply_both_recover_next_cycle() {
    let store = CursorStore::open_in_memory().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let target = Arc::new(RecordingTarget::failing());
    let publisher = Publisher::new(
        store.clone(),
        target.clone(),
        Arc::new(NullStager),
        TextPipeline::standard(&TextConfig::default()),
    );
    let runner = SyncRunner::new(
        store.clone(),
        fetcher.clone(),
        publisher,
        target.clone(),
        SyncConfig::default(),
    );
    let h = Harness {
        store,
        fetcher,
        target,
        runner,
    };
    h.store.set_cursor("0").unwrap();

    let batch = || {
        vec![
            make_post("1", "parent", None),
            make_post("2", "reply", Some("1")),
        ]
    };
    h.fetcher.push_batch(batch());
    h.fetcher.push_batch(batch());

    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.failed + stats.skipped, 2);
    assert_eq!(h.store.cursor().unwrap().as_deref(), Some("0"));

    h.target.heal();
    let stats = h.runner.run_once().await.unwrap();
    assert_eq!(stats.published, 2);
    let created = h.target.created();
    assert_eq!(created[1].in_reply_to.as_deref(), Some(created[0].target_id.as_str()));
}
