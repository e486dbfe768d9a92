//! # agora-server
//!
//! HTTP and WebSocket surface for Agora.
//!
//! - **REST API** (axum) over the SQLite store: profiles, servers, members,
//!   channels, direct conversations and paged message history
//! - **Live events**: every applied message write is published to an
//!   in-process push hub and streamed to WebSocket subscribers of the scope
//! - [`source::StoreSource`] lets a feed driver page through the store

pub mod api;
pub mod config;
pub mod error;
pub mod source;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
pub use source::StoreSource;
