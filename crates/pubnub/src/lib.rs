//! Long-poll publish/subscribe client
//!
//! A [`Client`] keeps one long-poll loop per origin, multiplexing every
//! channel, channel group and wildcard pattern subscribed on that origin
//! into a single request. Each batched response is split into
//! [`Envelope`]s that are routed to the callbacks registered for their
//! target. Publish, time, presence heartbeat and leave requests share the
//! same retry and error handling. With several origins configured an
//! [`OriginManager`] pings them and moves the subscription when the active
//! one goes down or a dead one comes back.
//!
//! # Example
//!
//! ```no_run
//! use pubnub::{Client, Config};
//!
//! async fn example() -> Result<(), pubnub::Error> {
//!     let mut config = Config::new("demo");
//!     config.publish_key = Some("demo".to_string());
//!     let client = Client::builder(config).build()?;
//!
//!     client
//!         .subscribe()
//!         .channel("lobby")
//!         .callback(|envelope| println!("{:?}", envelope.message()))
//!         .start()?;
//!
//!     client.publish("lobby", "hello")?.execute().await?;
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod builder;
mod client;
pub mod config;
pub mod error;
pub mod origin;
pub mod request;
pub mod router;
pub mod subscribe;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::{Client, SubscribeRequest};
pub use config::Config;
pub use error::Error;
pub use origin::{OriginManager, OriginPool, SubscriptionRestart};
pub use request::one_shot::OneShotRequest;
pub use request::{RequestEngine, RequestSpec};
pub use router::{callback, Callback, CallbackRouter, Callbacks};
pub use subscribe::{SubscribeMultiplexer, Targets};
pub use transport::{HttpTransport, Transport};

/// Re-export of the shared types
pub use pubnub_common::{
    Cryptor, CryptoError, Envelope, ErrorKind, ErrorRecord, RequestKind, TargetKind, Timetoken,
};
/// Re-export of the transport types
pub use pubnub_http::{ConnectionPurpose, HttpError, RawResponse};
