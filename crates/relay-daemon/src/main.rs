//! # relayd
//!
//! Order chat relay binary: loads settings, opens the message store and
//! serves WebSocket rooms until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;
use relay_store::{ConnectionConfig, SqliteMessageStore};

/// Order chat relay.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Real-time relay for order chat rooms")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` message database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (default `$RELAY_HOME/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the settings file and the environment.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.storage.db_path = path.to_string_lossy().into_owned();
        }
    }
}

/// Relative database paths live under the relay home.
fn resolve_db_path(configured: &str, home: &Path) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        home.join(path)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    if settings.logging.json {
        relay_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        relay_core::logging::init_subscriber(&settings.logging.level);
    }
    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let db_path = resolve_db_path(&settings.storage.db_path, &relay_settings::relay_home());
    ensure_parent_dir(&db_path)?;
    let pool_config = ConnectionConfig {
        pool_size: settings.storage.pool_size,
        ..ConnectionConfig::default()
    };
    let store = SqliteMessageStore::open(&db_path.to_string_lossy(), &pool_config)
        .with_context(|| format!("Failed to open message store at {}", db_path.display()))?;
    info!(path = %db_path.display(), "message store ready");

    let server = RelayServer::new(ServerConfig::from(&settings), Arc::new(store)).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("relay listening on ws://{addr}/ws/rooms/{{room_id}}");

    wait_for_signal().await?;

    info!("shutting down");
    if !server.shutdown().await {
        warn!("some sessions were still open when the shutdown timeout expired");
    }
    let _ = handle.await;
    info!("shutdown complete");
    Ok(())
}
