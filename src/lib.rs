//! birdbridge - feed-to-Fediverse synchronization
//!
//! Polls a source social-media feed, grooms each post for the target
//! platform, and republishes it with reply threading and media, while
//! guaranteeing at-most-once republication per source post.

pub mod error;
pub mod feed;
pub mod media;
pub mod publish;
pub mod store;
pub mod sync;
pub mod target;
pub mod testutil;
pub mod text;
pub mod types;

pub use error::{BridgeError, Result};
pub use store::CursorStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
