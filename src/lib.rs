//! Album Relay Library
//!
//! Accepts file uploads over HTTP, buffers them in a bounded in-memory queue
//! and forwards each one to a media-album API with adaptive backoff.
//!
//! # Features
//!
//! - **Fire and forget**: clients get `200` as soon as the upload is queued
//! - **Backpressure**: a full queue makes clients wait, up to a timeout
//! - **Adaptive pacing**: transport errors double the delay, rejections triple it
//! - **Dead letters**: entries that keep failing are set aside, not retried forever
//!
//! Queued entries live in memory only and are lost when the process exits.
//!
//! # Example
//!
//! ```no_run
//! use album_relay::{config::Config, Relay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("relay.yaml")?;
//!     let relay = Relay::new(config).await?;
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dead_letter;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod relay;
pub mod server;
pub mod upstream;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use queue::{Entry, EntryQueue};
pub use relay::Relay;
pub use upstream::UploadResponse;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
