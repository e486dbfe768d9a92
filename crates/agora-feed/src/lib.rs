//! # agora-feed
//!
//! The paginated, real-time message feed behind every chat surface.
//!
//! - [`cursor`] decides which page of history to ask for next.
//! - [`reconciler`] merges history pages and live events into one ordered,
//!   de-duplicated [`Transcript`] per feed scope.
//! - [`session`] is the per-scope state machine that decides when to fetch,
//!   when to apply a live event and when to hold it back.
//! - [`driver`] runs a session on a tokio task, fed purely by messages.
//! - [`push`] and [`source`] are the seams to the live event transport and
//!   to the message store.

pub mod cursor;
pub mod driver;
pub mod push;
pub mod reconciler;
pub mod session;
pub mod source;
pub mod transcript;

pub use cursor::{CursorEngine, FeedConfig, PageRequest};
pub use driver::{FeedDriver, FeedHandle};
pub use push::{EventSink, PushChannel, PushHub, SubscriptionToken};
pub use session::{FeedSession, FeedState, FeedView, FetchCommand, FetchTicket, LoadKind};
pub use source::{MemorySource, MessageSource};
pub use transcript::Transcript;
