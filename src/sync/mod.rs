//! Sync orchestration: the poll loop and one-cycle pipeline
//!
//! A cycle is fetch, reconcile, publish each post in order, advance the
//! cursor. At most one cycle runs at a time; a trigger while one is in
//! flight is a silent no-op, not queued. The staging temp dir is created
//! before any media work and removed on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::feed::{reconcile, FeedFetcher, FetchOutcome};
use crate::publish::Publisher;
use crate::store::CursorStore;
use crate::target::TargetPlatform;
use crate::types::{CycleStats, PostOutcome, ProfileField};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Contact shown on the target profile; `None` disables the refresh
    pub profile_contact: Option<String>,
    /// After this many deferred or failed cycles for the same post, the
    /// cursor advances past it so one stuck post cannot stall the feed
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            profile_contact: None,
            max_attempts: 3,
        }
    }
}

/// Owns the poll loop and the mutual exclusion between cycles
pub struct SyncRunner {
    running: AtomicBool,
    store: CursorStore,
    fetcher: Arc<dyn FeedFetcher>,
    publisher: Publisher,
    target: Arc<dyn TargetPlatform>,
    /// Per-post deferral counters, in-memory only; a restart simply lets a
    /// stuck post go through the full deferral budget again
    attempts: Mutex<HashMap<String, u32>>,
    config: SyncConfig,
}

/// Resets the single-flight flag on every exit path, including early returns
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncRunner {
    pub fn new(
        store: CursorStore,
        fetcher: Arc<dyn FeedFetcher>,
        publisher: Publisher,
        target: Arc<dyn TargetPlatform>,
        config: SyncConfig,
    ) -> Self {
        Self {
            running: AtomicBool::new(false),
            store,
            fetcher,
            publisher,
            target,
            attempts: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Run one sync cycle unless one is already in flight.
    ///
    /// A concurrent trigger returns immediately with empty stats.
    pub async fn run_once(&self) -> Result<CycleStats> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync cycle already in flight, ignoring trigger");
            return Ok(CycleStats::default());
        }
        let _guard = FlightGuard(&self.running);

        debug!("looking for new posts");
        let result = self.cycle().await;

        // Profile refresh runs regardless of how the cycle went
        if let Err(e) = self.refresh_profile().await {
            warn!(error = %e, "failed to update profile metadata");
        }

        result
    }

    /// The poll loop: immediate first cycle, then a fixed interval,
    /// until ctrl-c
    pub async fn run_forever(&self) {
        info!(interval = ?self.config.poll_interval, "starting sync loop");
        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(stats) => {
                            if stats.fetched > 0 {
                                info!(
                                    fetched = stats.fetched,
                                    published = stats.published,
                                    skipped = stats.skipped,
                                    failed = stats.failed,
                                    "sync cycle complete"
                                );
                            }
                        }
                        Err(e) => {
                            error!(error = %e, retryable = e.is_retryable(), "sync cycle failed")
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, stopping sync loop");
                    break;
                }
            }
        }
    }

    async fn cycle(&self) -> Result<CycleStats> {
        let cursor = self.store.cursor()?;

        let batch = match self.fetcher.fetch_since(cursor.as_deref()).await {
            Ok(FetchOutcome::SeedCursor(newest)) => {
                info!(cursor = %newest, "first run, seeding cursor to newest post");
                self.store.set_cursor(&newest)?;
                return Ok(CycleStats::default());
            }
            Ok(FetchOutcome::Batch(posts)) => posts,
            // Empty or unusable feed counts as zero new posts
            Err(e) if e.is_benign() => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut stats = CycleStats {
            fetched: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(stats);
        }

        let ordered = reconcile(batch);

        // Scoped staging area; the TempDir removes itself on every exit
        // path out of this function
        let staging = tempfile::tempdir()?;

        // The cursor advances per published post, in publish order, and
        // stops at the first deferred or failed post so the next fetch
        // re-delivers it.
        let mut advance = true;

        for post in &ordered {
            let outcome = self.publisher.publish(post, staging.path()).await?;

            match outcome {
                PostOutcome::Published { .. } => {
                    stats.published += 1;
                    self.attempts.lock().remove(&post.id);
                    if advance {
                        self.advance_cursor(&post.id)?;
                    }
                }
                PostOutcome::Skipped | PostOutcome::Failed => {
                    match outcome {
                        PostOutcome::Skipped => stats.skipped += 1,
                        _ => stats.failed += 1,
                    }

                    let exhausted = {
                        let mut attempts = self.attempts.lock();
                        let count = attempts.entry(post.id.clone()).or_insert(0);
                        *count += 1;
                        *count >= self.config.max_attempts
                    };

                    if exhausted {
                        warn!(
                            source_id = %post.id,
                            attempts = self.config.max_attempts,
                            "deferral budget exhausted, advancing cursor past post"
                        );
                        self.attempts.lock().remove(&post.id);
                        if advance {
                            self.advance_cursor(&post.id)?;
                        }
                    } else {
                        advance = false;
                    }
                }
            }
        }

        Ok(stats)
    }

    fn advance_cursor(&self, source_id: &str) -> Result<()> {
        if self.store.cursor()?.as_deref() != Some(source_id) {
            debug!(cursor = %source_id, "advancing cursor");
            self.store.set_cursor(source_id)?;
        }
        Ok(())
    }

    async fn refresh_profile(&self) -> Result<()> {
        let contact = match &self.config.profile_contact {
            Some(contact) => contact.clone(),
            None => return Ok(()),
        };

        let fields = vec![
            ProfileField {
                name: "Contact".to_string(),
                value: contact,
            },
            ProfileField {
                name: "Version".to_string(),
                value: crate::VERSION.to_string(),
            },
            ProfileField {
                name: "Last sync".to_string(),
                value: Utc::now().format("%d.%m.%y - %H:%M:%S UTC").to_string(),
            },
        ];

        self.target.update_profile_metadata(&fields).await
    }
}
