//! birdbridge sync daemon
//!
//! Run with: birdbridge --source-user <handle> --target-url <url> ...
//! The orchestrator loop is the entire runtime surface: no subcommands,
//! it just runs forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use birdbridge::feed::NitterFetcher;
use birdbridge::media::{HttpMediaStager, MediaStager};
use birdbridge::publish::Publisher;
use birdbridge::store::CursorStore;
use birdbridge::sync::{SyncConfig, SyncRunner};
use birdbridge::target::{MastodonClient, MastodonConfig, TargetPlatform};
use birdbridge::text::TextPipeline;
use birdbridge::types::{FeedConfig, MediaConfig, TextConfig};

#[derive(Parser, Debug)]
#[command(name = "birdbridge")]
#[command(about = "Mirror a source social-media feed to the Fediverse")]
#[command(version)]
struct Args {
    /// Cursor store database path
    #[arg(long, env = "BRIDGE_DB_PATH", default_value = "cache.db")]
    db_path: String,

    /// Source account handle, without the leading @
    #[arg(long, env = "BRIDGE_SOURCE_USER")]
    source_user: String,

    /// Comma-separated feed provider instance base URLs
    #[arg(long, env = "BRIDGE_PROVIDERS", value_delimiter = ',')]
    providers: Vec<String>,

    /// Poll interval in seconds
    #[arg(long, env = "BRIDGE_POLL_SECONDS", default_value = "300")]
    poll_seconds: u64,

    /// Target instance base URL
    #[arg(long, env = "BRIDGE_TARGET_URL")]
    target_url: String,

    /// Target access token
    #[arg(long, env = "BRIDGE_TARGET_TOKEN")]
    target_token: String,

    /// Post visibility on the target platform
    #[arg(long, env = "BRIDGE_VISIBILITY", default_value = "public")]
    visibility: String,

    /// Path to a JSON file mapping source handles to target handles
    #[arg(long, env = "BRIDGE_HANDLE_MAP")]
    handle_map: Option<String>,

    /// Suffix appended to handles with no explicit mapping
    #[arg(long, env = "BRIDGE_HANDLE_SUFFIX", default_value = "@twtr")]
    handle_suffix: String,

    /// Target platform character limit
    #[arg(long, env = "BRIDGE_CHAR_LIMIT", default_value = "500")]
    char_limit: usize,

    /// Concurrent downloads per post's attachments
    #[arg(long, env = "BRIDGE_MEDIA_CONCURRENCY", default_value = "4")]
    media_concurrency: usize,

    /// Contact handle shown on the profile; omits the refresh when unset
    #[arg(long, env = "BRIDGE_PROFILE_CONTACT")]
    profile_contact: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    tracing::info!(version = birdbridge::VERSION, "booting birdbridge");

    if args.providers.is_empty() {
        anyhow::bail!("at least one feed provider instance is required");
    }

    let handle_map: HashMap<String, String> = match &args.handle_map {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading handle map {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing handle map {path}"))?
        }
        None => HashMap::new(),
    };

    let store = CursorStore::open(&args.db_path)
        .with_context(|| format!("opening cursor store at {}", args.db_path))?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(format!("birdbridge/{}", birdbridge::VERSION))
        .build()?;

    let fetcher = Arc::new(NitterFetcher::new(
        http.clone(),
        FeedConfig {
            user_handle: args.source_user.clone(),
            providers: args.providers.clone(),
        },
    ));

    let stager: Arc<dyn MediaStager> = Arc::new(HttpMediaStager::new(
        http.clone(),
        MediaConfig {
            concurrency: args.media_concurrency,
        },
    ));

    let target: Arc<dyn TargetPlatform> = Arc::new(MastodonClient::new(
        http,
        MastodonConfig {
            base_url: args.target_url.clone(),
            access_token: args.target_token.clone(),
            visibility: args.visibility.clone(),
        },
    ));

    let pipeline = TextPipeline::standard(&TextConfig {
        handle_map,
        fallback_suffix: args.handle_suffix.clone(),
        char_limit: args.char_limit,
    });

    let publisher = Publisher::new(store.clone(), target.clone(), stager, pipeline);

    let runner = SyncRunner::new(
        store,
        fetcher,
        publisher,
        target,
        SyncConfig {
            poll_interval: Duration::from_secs(args.poll_seconds),
            profile_contact: args.profile_contact.clone(),
            ..Default::default()
        },
    );

    runner.run_forever().await;

    Ok(())
}
