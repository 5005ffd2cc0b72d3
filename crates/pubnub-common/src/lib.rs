//! PubNub shared types and functions.
//!
//! This crate holds the types that travel between the HTTP layer, the
//! request engine and user code: the [`Envelope`] delivery record, the
//! tagged [`ErrorRecord`], the [`Timetoken`] cursor, and the narrow
//! collaborator interfaces for JSON parsing and payload decryption.

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod target;

pub use crypto::{CryptoError, Cryptor};
pub use envelope::{Envelope, EnvelopeBuilder, Timetoken};
pub use error::{ErrorKind, ErrorRecord, RequestKind};
pub use target::TargetKind;

// re-exporting external crates
pub use serde_json;
