//! Hotel management client entry point.
//!
//! Connects to the server, logs in, prints one table as JSON and logs out.
//!
//! # Usage
//!
//! ```text
//! hms-client --login <EMAIL> --password <PASSWORD> [OPTIONS]
//!
//! Options:
//!   --config <PATH>       TOML configuration file
//!   --host <HOST>         Server host [default from config: 127.0.0.1]
//!   --port <PORT>         Server port [default from config: 8081]
//!   --timeout-ms <MS>     Per-request timeout
//!   --table <NAME>        Users, Rooms or Bookings [default: Rooms]
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load ClientConfig (file → CLI overrides)
//!  └─ Client::connect()               -- TCP, keepalive, TLS, reader task
//!  └─ BrowseTablesUseCase
//!       ├─ log_in()                   -- Login request, waits for Response
//!       ├─ fetch_table()              -- GetData request
//!       └─ log_out()                  -- Logout notification
//!  └─ Client::disconnect()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hms_client::application::browse_tables::BrowseTablesUseCase;
use hms_client::infrastructure::config::{load_config, ClientConfig};
use hms_client::infrastructure::connection::{Client, ClientEvent};
use hms_core::TableId;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hotel management command-line client.
#[derive(Debug, Parser)]
#[command(name = "hms-client", about = "Hotel management TLS client", version)]
struct Cli {
    /// TOML configuration file.  A missing file means "use the defaults".
    #[arg(long, env = "HMS_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host name or IP address.
    #[arg(long, env = "HMS_HOST")]
    host: Option<String>,

    /// Server TCP port.
    #[arg(long, env = "HMS_PORT")]
    port: Option<u16>,

    /// Milliseconds to wait for each response.
    #[arg(long, env = "HMS_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Account e-mail.
    #[arg(long, env = "HMS_LOGIN")]
    login: String,

    /// Account password.
    #[arg(long, env = "HMS_PASSWORD")]
    password: String,

    /// Table to print.
    #[arg(long, default_value = "Rooms")]
    table: String,
}

impl Cli {
    /// Loads the config file (if any) and applies the command-line overrides.
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.requests.timeout_ms = timeout_ms;
        }
        Ok(config)
    }

    fn table(&self) -> anyhow::Result<TableId> {
        TableId::from_name(&self.table)
            .ok_or_else(|| anyhow!("unknown table {:?} (expected Users, Rooms or Bookings)", self.table))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let table = cli.table()?;

    let (client, mut events) = Client::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.server.host, config.server.port))?;
    let client = Arc::new(client);

    // Unsolicited packets are only logged by this front end.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::PacketReceived(packet) => {
                    debug!(packet = packet.name(), request_id = packet.request_id(), "server notice")
                }
                ClientEvent::Disconnected => info!("connection closed"),
            }
        }
    });

    let browse = BrowseTablesUseCase::new(Arc::clone(&client));
    let outcome = async {
        let profile = browse
            .log_in(&cli.login, &cli.password)
            .await
            .context("login failed")?;
        info!(name = %profile.name, surname = %profile.surname, "logged in");
        let rows = browse
            .fetch_table(table)
            .await
            .with_context(|| format!("failed to fetch table {}", table.name()))?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        Ok::<(), anyhow::Error>(())
    }
    .await;

    browse.log_out().await;
    client.disconnect().await;
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
