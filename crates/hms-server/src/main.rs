//! Hotel management server entry point.
//!
//! Loads the configuration, seeds the table store with the administrator
//! account, generates a TLS identity and serves clients until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! hms-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>               TOML configuration file
//!   --bind <IP>                   Listener address [default from config: 0.0.0.0]
//!   --port <PORT>                 Listener port [default from config: 8081]
//!   --threads <N>                 Packet-handling workers
//!   --keepalive-idle <SECS>       Idle time before the first keepalive probe
//!   --keepalive-interval <SECS>   Time between keepalive probes
//! ```
//!
//! Every option can also be set through the matching `HMS_*` environment
//! variable.  Command-line values win over the config file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load ServerConfig (file → CLI overrides)
//!  └─ InMemoryStore::with_admin()
//!  └─ ServeRequestsUseCase          -- business rules
//!  └─ Server::bind()                -- certificate, TLS acceptor, listener, pool
//!       └─ Server::run()            -- accept loop (Tokio task)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hms_core::ShutdownMode;
use hms_server::application::serve_requests::ServeRequestsUseCase;
use hms_server::infrastructure::server::{Server, ServerEvent};
use hms_server::infrastructure::storage::config::{load_config, ServerConfig};
use hms_server::infrastructure::storage::memory::InMemoryStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hotel management TLS server.
#[derive(Debug, Parser)]
#[command(name = "hms-server", about = "Hotel management TLS request server", version)]
struct Cli {
    /// TOML configuration file.  A missing file means "use the defaults".
    #[arg(long, env = "HMS_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    #[arg(long, env = "HMS_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "HMS_PORT")]
    port: Option<u16>,

    /// Number of packet-handling workers.
    #[arg(long, env = "HMS_THREADS")]
    threads: Option<usize>,

    /// Seconds of idle time before the first TCP keepalive probe.
    #[arg(long, env = "HMS_KEEPALIVE_IDLE")]
    keepalive_idle: Option<u64>,

    /// Seconds between unanswered TCP keepalive probes.
    #[arg(long, env = "HMS_KEEPALIVE_INTERVAL")]
    keepalive_interval: Option<u64>,
}

impl Cli {
    /// Loads the config file (if any) and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.network.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(threads) = self.threads {
            config.runtime.worker_threads = threads;
        }
        if let Some(idle) = self.keepalive_idle {
            config.network.keepalive_idle_secs = idle;
        }
        if let Some(interval) = self.keepalive_interval {
            config.network.keepalive_interval_secs = interval;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        bind = %config.network.bind_address,
        port = config.network.port,
        workers = config.runtime.worker_threads,
        "hotel management server starting"
    );

    let store = InMemoryStore::with_admin(&config.admin).context("failed to seed storage")?;
    let handler = Arc::new(ServeRequestsUseCase::new(Arc::new(store)));
    let (server, mut events) = Server::bind(&config, handler)
        .await
        .context("failed to start server")?;
    let server = Arc::new(server);

    // ── Connection event log ──────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::ClientConnected(key) => info!(peer = %key, "session opened"),
                ServerEvent::ClientDisconnected(key) => info!(peer = %key, "session closed"),
            }
        }
    });

    // ── Accept loop ───────────────────────────────────────────────────────────
    let accept = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    info!(addr = %server.local_addr(), "server ready.  Press Ctrl-C to exit.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {e}");
    }
    info!("shutdown signal received");

    server.stop(ShutdownMode::Drop).await;
    accept
        .await
        .context("accept loop panicked")?
        .context("accept loop failed")?;

    info!("hotel management server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
