//! Reply-thread reconciliation
//!
//! Reorders a fetch batch so that a reply never precedes its in-batch parent,
//! while otherwise keeping the original relative order. This is a stable
//! adjacency-aware reorder, not a full topological sort: reply chains in the
//! source feed are at most one indirection deep, so a single corrective scan
//! plus a bounded adjacent-swap pass is enough. Replies whose parent is not
//! in the batch keep their original index; the publisher resolves those
//! through the cursor store's id mapping instead.

use crate::types::SourcePost;

/// Reorder a batch so every in-batch parent precedes its reply.
///
/// Worst case O(n²) on pathological adjacency chains; batches are tens of
/// posts, so that is acceptable.
pub fn reconcile(mut posts: Vec<SourcePost>) -> Vec<SourcePost> {
    let n = posts.len();

    // Pass 1: single scan. A reply whose stated parent sits later in the
    // batch trades places with it.
    for i in 0..n {
        let parent = match posts[i].parent_id.clone() {
            Some(p) => p,
            None => continue,
        };
        if let Some(j) = posts.iter().position(|p| p.id == parent) {
            if j > i {
                posts.swap(i, j);
            }
        }
    }

    // Pass 2: bounded fixup of directly-adjacent (reply, reply-target)
    // inversions left behind by chained replies.
    for _ in 0..n {
        let mut swapped = false;
        for i in 0..n.saturating_sub(1) {
            if posts[i].parent_id.as_deref() == Some(posts[i + 1].id.as_str()) {
                posts.swap(i, i + 1);
                swapped = true;
            }
        }
        if !swapped {
            break;
        }
    }

    posts
}
