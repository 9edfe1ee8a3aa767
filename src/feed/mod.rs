//! Incremental feed fetching
//!
//! The fetcher boundary hides everything provider-specific: endpoint
//! selection, RSS scraping, reply detection, and attachment discovery.
//! Batch order is provider-defined and must not be assumed chronological;
//! the thread reconciler fixes reply inversions afterwards.

pub mod rss;
pub mod thread;

pub use thread::reconcile;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::USER_AGENT;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::types::{FeedConfig, SourcePost};

/// User agent sent to feed providers; some refuse unknown clients
const PROVIDER_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// What a fetch produced
#[derive(Debug)]
pub enum FetchOutcome {
    /// New posts since the cursor, oldest first (publication order)
    Batch(Vec<SourcePost>),
    /// First run: no cursor existed, seed it to the newest available id
    /// and publish nothing. History is never backfilled.
    SeedCursor(String),
}

/// Boundary to the source platform
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch posts newer than the cursor.
    ///
    /// Returns `NoData` when the feed is empty or unusable (treated as zero
    /// new posts by the caller) and `ProviderUnavailable` when every
    /// endpoint in the pool failed.
    async fn fetch_since(&self, cursor: Option<&str>) -> Result<FetchOutcome>;
}

/// RSS-scraping fetcher over a pool of Nitter-style provider instances
pub struct NitterFetcher {
    client: reqwest::Client,
    config: FeedConfig,
}

impl NitterFetcher {
    pub fn new(client: reqwest::Client, config: FeedConfig) -> Self {
        Self { client, config }
    }

    /// Fetch the RSS document from the provider pool.
    ///
    /// Picks a random starting instance and probes linearly with wraparound
    /// until one answers; all exhausted means `ProviderUnavailable`.
    async fn fetch_rss(&self) -> Result<(String, String)> {
        let pool = &self.config.providers;
        if pool.is_empty() {
            return Err(BridgeError::Config(
                "no feed provider instances configured".to_string(),
            ));
        }

        let mut index = rand::thread_rng().gen_range(0..pool.len());

        for _ in 0..pool.len() {
            let base = pool[index].trim_end_matches('/').to_string();
            let url = format!("{}/{}/rss", base, self.config.user_handle);
            debug!(url, "fetching feed");

            match self
                .client
                .get(&url)
                .header(USER_AGENT, PROVIDER_USER_AGENT)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => match response.text().await {
                    Ok(body) => return Ok((body, base)),
                    Err(e) => warn!(instance = %base, error = %e, "failed reading feed body"),
                },
                Ok(response) => {
                    warn!(instance = %base, status = %response.status(), "instance not available")
                }
                Err(e) => warn!(instance = %base, error = %e, "instance not available"),
            }

            index = (index + 1) % pool.len();
        }

        Err(BridgeError::ProviderUnavailable { tried: pool.len() })
    }
}

/// Assemble parsed feed items into the cycle's fetch outcome.
///
/// Reply parents are attributed across the whole feed window before cursor
/// slicing, so a reply to an already-synchronized post still carries its
/// parent id and can be threaded through the store mapping. On a first run
/// (no cursor) the newest id is returned for seeding and nothing is
/// backfilled.
fn assemble_batch(
    items: &[rss::RssItem],
    cursor: Option<&str>,
    provider_base: &str,
    user_handle: &str,
) -> Result<FetchOutcome> {
    if items.is_empty() {
        return Err(BridgeError::NoData);
    }

    let cursor = match cursor {
        Some(c) => c,
        None => return Ok(FetchOutcome::SeedCursor(items[0].id.clone())),
    };

    let prefix = rss::reply_prefix(user_handle);
    let mut previous_id: Option<String> = None;
    let mut posts: Vec<SourcePost> = Vec::with_capacity(items.len());

    for item in items.iter().rev() {
        let (text, parent_id) = match item.title.strip_prefix(&prefix) {
            Some(stripped) => {
                if previous_id.is_none() {
                    warn!(id = %item.id, "reply with no visible parent in feed window");
                }
                (stripped.to_string(), previous_id.clone())
            }
            None => (item.title.clone(), None),
        };

        let attachments = rss::extract_attachments(item, provider_base, user_handle);
        previous_id = Some(item.id.clone());

        posts.push(SourcePost {
            id: item.id.clone(),
            text,
            parent_id,
            attachments,
        });
    }

    // posts is oldest-first; keep only those after the cursor
    let new_posts = match posts.iter().position(|p| p.id == cursor) {
        Some(idx) => posts.split_off(idx + 1),
        None => {
            // Cursor fell out of the feed window; everything is new
            warn!(cursor, "cursor not present in feed window, taking full batch");
            posts
        }
    };

    Ok(FetchOutcome::Batch(new_posts))
}

#[async_trait]
impl FeedFetcher for NitterFetcher {
    async fn fetch_since(&self, cursor: Option<&str>) -> Result<FetchOutcome> {
        let (body, base) = self.fetch_rss().await?;

        let items = rss::parse_items(&body);
        let outcome = assemble_batch(&items, cursor, &base, &self.config.user_handle)?;

        match &outcome {
            FetchOutcome::Batch(posts) if posts.is_empty() => {
                info!(instance = %base, "no new posts")
            }
            FetchOutcome::Batch(posts) => {
                info!(instance = %base, count = posts.len(), "found new posts")
            }
            FetchOutcome::SeedCursor(newest) => {
                info!(instance = %base, newest = %newest, "first fetch of this feed")
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://nitter.example";

    fn item(id: &str, title: &str) -> rss::RssItem {
        rss::RssItem {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("<p>{title}</p>"),
            link: format!("{BASE}/user/status/{id}#m"),
        }
    }

    fn batch(outcome: FetchOutcome) -> Vec<SourcePost> {
        match outcome {
            FetchOutcome::Batch(posts) => posts,
            other => panic!("expected Batch, got {other:?}"),
        }
    }

    #[test]
    fn test_first_run_seeds_to_newest_item() {
        let items = vec![item("3", "c"), item("2", "b"), item("1", "a")];
        let outcome = assemble_batch(&items, None, BASE, "user").unwrap();
        match outcome {
            FetchOutcome::SeedCursor(newest) => assert_eq!(newest, "3"),
            other => panic!("expected SeedCursor, got {other:?}"),
        }
    }

    #[test]
    fn test_cursor_slicing_yields_newer_posts_oldest_first() {
        let items = vec![item("3", "c"), item("2", "b"), item("1", "a")];
        let posts = batch(assemble_batch(&items, Some("1"), BASE, "user").unwrap());
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_cursor_at_newest_yields_empty_batch() {
        let items = vec![item("3", "c"), item("2", "b"), item("1", "a")];
        let posts = batch(assemble_batch(&items, Some("3"), BASE, "user").unwrap());
        assert!(posts.is_empty());
    }

    #[test]
    fn test_reply_title_strips_prefix_and_attributes_previous_item() {
        let items = vec![item("2", "R to @user: follow-up"), item("1", "opener")];
        let posts = batch(assemble_batch(&items, Some("0"), BASE, "user").unwrap());
        assert_eq!(posts[1].text, "follow-up");
        assert_eq!(posts[1].parent_id.as_deref(), Some("1"));
        assert_eq!(posts[0].parent_id, None);
    }

    #[test]
    fn test_parent_attribution_survives_cursor_slicing() {
        // The parent was synchronized last cycle; the reply still names it
        let items = vec![item("2", "R to @user: follow-up"), item("1", "opener")];
        let posts = batch(assemble_batch(&items, Some("1"), BASE, "user").unwrap());
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "2");
        assert_eq!(posts[0].parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_reply_at_window_edge_has_no_parent() {
        // Oldest visible item is itself a reply; nothing to attribute
        let items = vec![item("2", "b"), item("1", "R to @user: dangling")];
        let posts = batch(assemble_batch(&items, Some("0"), BASE, "user").unwrap());
        assert_eq!(posts[0].id, "1");
        assert_eq!(posts[0].parent_id, None);
    }

    #[test]
    fn test_missing_cursor_takes_full_window() {
        let items = vec![item("3", "c"), item("2", "b"), item("1", "a")];
        let posts = batch(assemble_batch(&items, Some("99"), BASE, "user").unwrap());
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].id, "1");
    }

    #[test]
    fn test_empty_feed_is_no_data() {
        let err = assemble_batch(&[], Some("1"), BASE, "user").unwrap_err();
        assert!(matches!(err, BridgeError::NoData));
        assert!(err.is_benign());
    }

    #[test]
    fn test_items_flow_through_attachment_extraction() {
        let mut video = item("2", "clip");
        video.description =
            r#"<p>clip</p><img src="https://nitter.example/pic/ext_tw_video_thumb%2F2.jpg" />"#
                .to_string();
        let items = vec![video, item("1", "a")];
        let posts = batch(assemble_batch(&items, Some("1"), BASE, "user").unwrap());
        assert_eq!(posts[0].attachments.len(), 1);
        assert_eq!(posts[0].attachments[0].kind, crate::types::MediaKind::Video);
    }
}
