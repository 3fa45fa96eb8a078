use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaystore::{HealthStatus, StoreConfig, StoreFacade};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "relaystore=debug";

/// relaystore - Sets, expiring event logs and pub/sub channels on Redis
#[derive(Parser, Debug)]
#[command(name = "relaystore")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Redis host
    #[arg(long, short = 'H', global = true, env = "REDIS_HOST")]
    host: Option<String>,

    /// Redis port
    #[arg(long, short, global = true, env = "REDIS_PORT")]
    port: Option<u16>,

    /// Lifetime of an event log after its last append, in seconds
    #[arg(long, global = true, env = "LOG_MAX_LIFETIME")]
    log_max_lifetime: Option<u64>,

    /// Storage backend
    #[arg(long, global = true, value_enum, default_value_t, env = "RELAYSTORE_BACKEND")]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Backend {
    /// Redis server at --host/--port
    #[default]
    Redis,
    /// Process-local store, discarded on exit
    Memory,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish an event id on a channel
    Publish { channel: String, event_id: String },
    /// Add an item to a set
    Add { set: String, item: String },
    /// Check whether an item belongs to a set
    Check { set: String, item: String },
    /// List every member of a set
    Members { set: String },
    /// Remove an item from a set
    Remove { set: String, item: String },
    /// Append a JSON event to a channel's log
    SaveLog {
        channel_id: String,
        /// Event body, as JSON
        event: String,
    },
    /// Read the n-th oldest event of a channel's log
    GetLog { channel_id: String, event_id: i64 },
    /// Read a channel's whole log, most recent first
    Logs { channel_id: String },
    /// Print messages published on a room until interrupted
    Subscribe { room: String },
    /// Wait for the first health check and report the connection status
    Health {
        /// Seconds to wait for the first health check
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

impl Cli {
    fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(lifetime) = self.log_max_lifetime {
            config.log_max_lifetime_secs = lifetime;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config();
    let store = match cli.backend {
        Backend::Redis => {
            tracing::debug!(url = %config.redis_url(), "Using Redis");
            StoreFacade::connect(&config)
                .await
                .context("failed to create Redis store")?
        }
        Backend::Memory => {
            tracing::debug!("Using in-memory store");
            StoreFacade::in_memory(&config)
        }
    };

    let outcome = run(&store, cli.command).await;
    store.shutdown().await;
    outcome
}

async fn run(store: &StoreFacade, command: Command) -> Result<()> {
    match command {
        Command::Publish { channel, event_id } => {
            store.publish(&channel, &event_id).await?;
        }
        Command::Add { set, item } => {
            println!("{}", store.add_item(&set, &item).await?);
        }
        Command::Check { set, item } => {
            print_json(&store.check_item(&set, &item).await?)?;
        }
        Command::Members { set } => {
            print_json(&store.members(&set).await?)?;
        }
        Command::Remove { set, item } => {
            println!("{}", store.remove_item(&set, &item).await?);
        }
        Command::SaveLog { channel_id, event } => {
            let event: Value = serde_json::from_str(&event).context("event must be valid JSON")?;
            println!("{}", store.save_log(&channel_id, &event).await?);
        }
        Command::GetLog {
            channel_id,
            event_id,
        } => {
            let entry: Value = store.get_log(&channel_id, event_id).await?;
            print_json(&entry)?;
        }
        Command::Logs { channel_id } => {
            let entries: Vec<Value> = store.get_all_logs(&channel_id).await?;
            print_json(&entries)?;
        }
        Command::Subscribe { room } => {
            let subscription = store
                .subscribe(&room, |message| match serde_json::to_string(&message) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode message"),
                })
                .await?;
            tracing::info!("Subscribed to {}; press Ctrl+C to stop", room);
            shutdown_signal().await;
            subscription.unsubscribe().await;
        }
        Command::Health { timeout } => {
            let status = wait_for_first_check(store, Duration::from_secs(timeout)).await;
            println!("{}", status);
            if !status.is_healthy() {
                anyhow::bail!("store is not healthy");
            }
        }
    }
    Ok(())
}

/// Waits until the status leaves `Connecting` or the timeout elapses.
async fn wait_for_first_check(store: &StoreFacade, timeout: Duration) -> HealthStatus {
    let mut status = store.watch_status();
    let settled = tokio::time::timeout(
        timeout,
        status.wait_for(|s| !matches!(s, HealthStatus::Connecting)),
    )
    .await;

    match settled {
        Ok(Ok(current)) => current.clone(),
        _ => store.status(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "relaystore",
            "--host",
            "redis.internal",
            "--port",
            "6380",
            "--log-max-lifetime",
            "30",
            "members",
            "room",
        ]);
        let config = cli.config();

        assert_eq!(config.host, "redis.internal");
        assert_eq!(config.port, 6380);
        assert_eq!(config.log_max_lifetime_secs, 30);
        assert!(matches!(cli.command, Command::Members { ref set } if set == "room"));
    }

    #[test]
    fn test_cli_parses_save_log() {
        let cli = Cli::parse_from(["relaystore", "save-log", "room", r#"{"a":1}"#]);
        match cli.command {
            Command::SaveLog { channel_id, event } => {
                assert_eq!(channel_id, "room");
                assert_eq!(event, r#"{"a":1}"#);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_backend_flag() {
        let cli = Cli::try_parse_from(["relaystore", "members", "room"]).unwrap();
        assert_eq!(cli.backend, Backend::Redis);

        let cli =
            Cli::try_parse_from(["relaystore", "--backend", "memory", "members", "room"]).unwrap();
        assert_eq!(cli.backend, Backend::Memory);

        let cli =
            Cli::try_parse_from(["relaystore", "add", "room", "alice", "--backend", "memory"])
                .unwrap();
        assert_eq!(cli.backend, Backend::Memory);

        let unknown = Cli::try_parse_from(["relaystore", "--backend", "sqlite", "members", "room"]);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_default_log_filter_enables_debug() {
        assert_eq!(DEFAULT_LOG_FILTER, "relaystore=debug");
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
