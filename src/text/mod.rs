//! Text grooming pipeline
//!
//! An ordered list of pure transforms applied to the post body before
//! submission: handle remapping, entity unescaping, stripping of
//! provider-specific inline media links, and a hard length cutoff applied
//! last. Each transform is independently testable and the list is
//! composable, so deployment-specific variants can swap steps without
//! touching the publisher.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::TextConfig;

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)(@[a-zA-Z0-9_]+)").unwrap());
static MEDIA_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://twitter\.com/\w+/status/\d+/(?:video|photo)/\d+").unwrap()
});

/// One step of the grooming pipeline
pub type Transform = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Ordered, composable text-transform pipeline with a trailing hard cutoff
pub struct TextPipeline {
    transforms: Vec<Transform>,
    char_limit: usize,
}

impl TextPipeline {
    /// Empty pipeline that only enforces the character limit
    pub fn new(char_limit: usize) -> Self {
        Self {
            transforms: Vec::new(),
            char_limit,
        }
    }

    /// Append a transform step
    pub fn with(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// The standard grooming order: handles, entities, media links
    pub fn standard(config: &TextConfig) -> Self {
        let map = config.handle_map.clone();
        let suffix = config.fallback_suffix.clone();

        Self::new(config.char_limit)
            .with(Box::new(move |text: &str| replace_handles(text, &map, &suffix)))
            .with(Box::new(|text: &str| unescape_entities(text)))
            .with(Box::new(|text: &str| strip_media_links(text)))
    }

    /// Run every transform in order, then truncate. Truncation is always
    /// last so no step can push the text back over the limit.
    pub fn groom(&self, text: &str) -> String {
        let mut result = text.to_string();
        for transform in &self.transforms {
            result = transform(&result);
        }
        truncate_chars(&result, self.char_limit)
    }
}

/// Remap source-platform handles to their target-platform counterparts.
///
/// Handles with an explicit mapping are replaced by it; unmapped handles get
/// the fallback suffix appended. Each distinct handle is rewritten once
/// across the whole text.
pub fn replace_handles(text: &str, map: &HashMap<String, String>, fallback_suffix: &str) -> String {
    let mut result = text.to_string();
    let mut seen: Vec<String> = Vec::new();

    for captures in HANDLE_RE.captures_iter(text) {
        let handle = captures[2].to_string();
        if seen.contains(&handle) {
            continue;
        }
        let replacement = match map.get(&handle) {
            Some(mapped) => mapped.clone(),
            None => format!("{handle}{fallback_suffix}"),
        };
        result = result.replace(&handle, &replacement);
        seen.push(handle);
    }

    result
}

/// Undo the HTML entities the feed provider leaves in titles
pub fn unescape_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Remove inline links to the source platform's own media pages; the media
/// itself travels as attachments
pub fn strip_media_links(text: &str) -> String {
    MEDIA_LINK_RE.replace_all(text, "").into_owned()
}

/// Hard cutoff at `limit` characters, boundary-safe, never panics
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
