//! # agora
//!
//! Chat server binary: REST API and live event streams over one SQLite
//! database.

use tracing::info;
use tracing_subscriber::EnvFilter;

use agora_server::{serve, AppState, ServerConfig};
use agora_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agora_server=debug,agora_feed=debug")),
        )
        .init();

    info!("Starting Agora server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database (runs migrations)
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            info!(path = %path.display(), "Opening database");
            Database::open_at(path)?
        }
        None => Database::new()?,
    };

    let http_addr = config.http_addr;
    let state = AppState::new(db, config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server until it fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
