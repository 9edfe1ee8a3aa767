//! Best-effort RSS scraping for the feed provider
//!
//! The provider's RSS is treated as a loosely structured document: items are
//! pulled out with regexes rather than a full XML parser, which is all the
//! single-provider abstraction needs. Anything that does not match is
//! dropped with a log line.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::types::{Attachment, MediaKind, MediaOrigin};

static ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<item>(.*?)</item>").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<link>(.*?)</link>").unwrap());
static DESC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<description>(.*?)</description>").unwrap());
static STATUS_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/status/(\d+)").unwrap());
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<img src="([^"]*)""#).unwrap());

/// Marker the provider embeds in descriptions of posts with native video
const VIDEO_THUMB_MARKER: &str = "ext_tw_video_thumb";

/// One `<item>` pulled out of the provider's RSS, newest first
#[derive(Debug, Clone)]
pub struct RssItem {
    /// Source post id extracted from the item link
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
}

/// The `R to @user: ` prefix the provider puts on reply titles
pub fn reply_prefix(user_handle: &str) -> String {
    format!("R to @{user_handle}: ")
}

/// Extract items from an RSS document, newest first.
///
/// Items without a recognizable status id in their link are skipped.
pub fn parse_items(rss: &str) -> Vec<RssItem> {
    let mut items = Vec::new();

    for captures in ITEM_RE.captures_iter(rss) {
        let body = &captures[1];
        let title = field(&TITLE_RE, body);
        let link = field(&LINK_RE, body);
        let description = field(&DESC_RE, body);

        let id = match STATUS_ID_RE.captures(&link) {
            Some(c) => c[1].to_string(),
            None => {
                warn!(link, "could not find status id in item link, skipping item");
                continue;
            }
        };

        items.push(RssItem {
            id,
            title,
            description,
            link,
        });
    }

    items
}

/// Extract a single tag value, stripping an optional CDATA wrapper
fn field(re: &Regex, body: &str) -> String {
    let raw = re
        .captures(body)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    strip_cdata(&raw).trim().to_string()
}

fn strip_cdata(raw: &str) -> &str {
    raw.trim()
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw.trim())
}

/// Pull attachment descriptors out of an item's description HTML.
///
/// A video thumbnail marker means the media URL is only on the status page,
/// so a page pointer is returned for the stager to resolve. Otherwise images
/// are taken from the part of the description after the text paragraph.
pub fn extract_attachments(item: &RssItem, provider_base: &str, user_handle: &str) -> Vec<Attachment> {
    if item.description.contains(VIDEO_THUMB_MARKER) {
        let page = format!(
            "{}/{}/status/{}#m",
            provider_base.trim_end_matches('/'),
            user_handle,
            item.id
        );
        return vec![Attachment {
            origin: MediaOrigin::StatusPage(page),
            kind: MediaKind::Video,
            caption: None,
        }];
    }

    // Images follow the closing tag of the text paragraph
    let trailer = match item.description.split_once("</p>") {
        Some((_, rest)) => rest,
        None => return vec![],
    };

    IMG_RE
        .captures_iter(trailer)
        .map(|c| Attachment {
            origin: MediaOrigin::Direct(c[1].to_string()),
            kind: MediaKind::Image,
            caption: None,
        })
        .collect()
}
