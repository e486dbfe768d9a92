//! # agora-store
//!
//! SQLite persistence for Agora: profiles, servers, members, channels,
//! direct conversations and the messages of every feed scope.
//!
//! The crate exposes a synchronous `Database` handle wrapping a
//! `rusqlite::Connection` with typed helpers per domain model. Message
//! history is read in pages keyed by an exclusive `before` cursor, and
//! every write that touches a message enforces the shared permission rules.

pub mod channels;
pub mod conversations;
pub mod database;
pub mod members;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod servers;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use messages::{Mutation, NewAttachment};
pub use models::*;
