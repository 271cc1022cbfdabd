use anyhow::Result;
use clap::Parser;
use dhcp6relay_agent::link::LinkMonitor;
use dhcp6relay_agent::server::Dhcpv6Relay;
use dhcp6relay_agent::upstream::resolve_upstream;
use dhcp6relay_core::config::Config;
use dhcp6relay_core::types::Trust;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "/etc/dhcp6relay/dhcp6relay.toml";

#[derive(Parser)]
#[command(
    name = "dhcp6relay",
    about = "DHCPv6 relay agent for point-to-point links"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Point-to-point interface to serve (overrides relay.interface)
    #[arg(short, long)]
    interface: Option<String>,

    /// DHCPv6 server to proxy DHCPv6 requests to (overrides relay.server)
    #[arg(long = "dhcpv6-server", value_name = "HOST")]
    dhcpv6_server: Option<String>,

    /// Trusted interface: allow incoming relay messages
    #[arg(long = "dhcpv6-trusted", conflicts_with = "dhcpv6_untrusted")]
    dhcpv6_trusted: bool,

    /// Untrusted interface: discard incoming relay messages
    #[arg(long = "dhcpv6-untrusted")]
    dhcpv6_untrusted: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Config::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Config::default(),
        };

        if let Some(ref interface) = self.interface {
            config.relay.interface = interface.clone();
        }
        if let Some(ref server) = self.dhcpv6_server {
            config.relay.server = Some(server.clone());
        }
        if self.dhcpv6_trusted {
            config.relay.trust = Trust::Trusted;
        } else if self.dhcpv6_untrusted {
            config.relay.trust = Trust::Untrusted;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Initialize logging
    init_logging(&config.logging);

    info!(
        interface = %config.relay.interface,
        trust = %config.relay.trust,
        "starting dhcp6relay"
    );

    let upstream = resolve_server(&config).await;

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(8);

    let mut tasks = Vec::new();

    let monitor = LinkMonitor::new(
        &config.relay.interface,
        config.relay.peer_identity(),
        Duration::from_secs(config.relay.link_poll_interval_secs),
    );
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = monitor.run(events_tx, rx).await {
            error!("link monitor error: {e}");
        }
    }));

    let relay = Dhcpv6Relay::new(&config.relay, upstream);
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = relay.run(events_rx, rx).await {
            error!("DHCPv6 relay error: {e}");
        }
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping relay...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }

    info!("dhcp6relay stopped");
    Ok(())
}

/// Resolve the configured server. Any failure leaves the relay passive
/// rather than stopping the process.
async fn resolve_server(config: &Config) -> Option<SocketAddr> {
    let Some(ref server) = config.relay.server else {
        warn!("no DHCPv6 server configured, relay will stay passive");
        return None;
    };

    match resolve_upstream(server, config.relay.server_port).await {
        Ok(addr) => {
            info!("DHCPv6 relay: Using server {addr}");
            Some(addr)
        }
        Err(e) => {
            error!("DHCPv6 relay: Unable to set server address to {server}: {e}");
            None
        }
    }
}

fn init_logging(config: &dhcp6relay_core::config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
