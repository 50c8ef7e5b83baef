//! # feed-client
//!
//! Async timeline engine for tideline.
//!
//! This is the library a display layer embeds to show one feed.
//!
//! ## Features
//!
//! - **Single Source of Truth**: one deduplicated, newest-first entry store per filter
//! - **Collaborator Abstraction**: pluggable page, stream and directory sources (mock included)
//! - **Pure State Machine**: uses feed-core for side-effect-free merge and reconnect logic
//! - **Single-Flight Refresh**: concurrent refresh requests share one fetch
//!
//! ## Example
//!
//! ```ignore
//! use feed_client::{EngineConfig, TimelineEngine};
//!
//! let config = EngineConfig::load(Path::new("tideline.toml"))?;
//! let engine = TimelineEngine::new(config, feed, stream, Filter::Home);
//! engine.start().await?;
//!
//! // React to changes
//! let mut changes = engine.subscribe_changes();
//! while changes.changed().await.is_ok() {
//!     render(&changes.borrow());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod source;

pub use config::{ConfigError, EngineConfig, ReconnectConfig};
pub use engine::{LoadOutcome, Prefetch, TimelineEngine};
pub use source::{
    filter_menu, Directory, FeedSource, FetchGate, FrameStream, MockFeedSource, MockStreamSource,
    PageRequest, SourceError, StaticDirectory, StreamSource,
};
