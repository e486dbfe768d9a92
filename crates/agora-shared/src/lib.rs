//! # agora-shared
//!
//! Types shared by every Agora crate: identifiers, the chat data model,
//! member roles and the permission rules built on them, the wire format of
//! message pages and live feed events, and the feed error taxonomy.

pub mod constants;
pub mod error;
pub mod permissions;
pub mod protocol;
pub mod types;

pub use error::FeedError;
pub use protocol::{FeedEvent, Page};
pub use types::*;
