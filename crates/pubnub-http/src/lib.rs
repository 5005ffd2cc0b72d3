//! HTTP transport layer for the PubNub client
//!
//! This crate wraps the underlying HTTP library (reqwest) so the engine only
//! ever sees a status code and a raw body. It also owns the persistent
//! connection pools, which are keyed by origin and by the kind of traffic
//! (one-shot requests or subscribe long-polls) so each can carry its own
//! timeouts.
//!
//! # Example
//!
//! ```no_run
//! use pubnub_http::{ConnectionPool, ConnectionPurpose, PoolConfig};
//!
//! async fn example() -> Result<(), pubnub_http::HttpError> {
//!     let pool = ConnectionPool::new(PoolConfig::default());
//!     let client = pool.client_for("pubsub.pubnub.com", ConnectionPurpose::OneShot)?;
//!     let response = client.get_raw("https://pubsub.pubnub.com/time/0").await?;
//!     println!("{} {}", response.status(), response.body());
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod pool;
mod response;

pub use client::{HttpClient, HttpClientBuilder};
pub use error::HttpError;
pub use pool::{ConnectionPool, ConnectionPurpose, PoolConfig};
pub use response::{RawResponse, Response};
