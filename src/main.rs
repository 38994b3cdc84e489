//! wg-manager main entry point
//!
//! This binary handles CLI parsing, logging setup and the HTTP server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wg_manager::{
    api::{self, AppState},
    backend::{create_backend, BackendType},
    config::Config,
    error::NO_SUCH_DEVICE_STATUS,
    privileges::PrivilegeLevel,
    store::Store,
    wireguard::{Device, KeyPair, PrivateKey},
    WgManager, WgManagerError, APP_NAME, VERSION,
};

/// WireGuard server and peer manager
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (default: /etc/wg-manager/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Adopt live devices and serve the HTTP API
    Serve,

    /// Show live devices and peers
    Show {
        /// Only this interface
        interface: Option<String>,
    },

    /// Generate a private key
    Genkey {
        /// Also print the matching public key on a second line
        #[arg(long)]
        public: bool,
    },

    /// Read a private key on stdin and print its public key
    Pubkey,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Execute command
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Run the CLI command, returning the process exit code
async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Serve => {
            let config = Config::load(cli.config.as_deref())?;
            serve(config).await?;
            Ok(0)
        }
        Commands::Show { interface } => {
            let config = Config::load(cli.config.as_deref())?;
            let manager = WgManager::new(create_backend(&config.wireguard));
            show(manager, interface).await
        }
        Commands::Genkey { public } => {
            let pair = KeyPair::generate()?;
            println!("{}", pair.private.to_base64());
            if public {
                println!("{}", pair.public);
            }
            Ok(0)
        }
        Commands::Pubkey => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read private key from stdin")?;
            let private = PrivateKey::from_base64(&input)?;
            println!("{}", private.public_key());
            Ok(0)
        }
        Commands::Version => {
            println!("{} v{}", APP_NAME, VERSION);
            Ok(0)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting {} v{}", APP_NAME, VERSION);

    let backend = create_backend(&config.wireguard);
    if backend.backend_type() == BackendType::Command {
        let level = PrivilegeLevel::detect();
        if !level.is_elevated() {
            warn!(
                "Running as {}; interface changes through the command backend need root",
                level
            );
        }
        if !backend.is_available() {
            warn!("WireGuard tools not found; running in storage-only mode");
        }
    }
    info!("Using {} control surface", backend.backend_type());

    let manager = Arc::new(WgManager::new(backend));
    let store = Arc::new(Store::new());

    if config.wireguard.adopt_on_startup {
        let adopting = manager.clone();
        match tokio::task::spawn_blocking(move || adopting.list_devices()).await? {
            Ok(devices) => store.adopt_devices(&devices),
            Err(e) if e.is_unavailable() => warn!("Skipping device adoption: {}", e),
            Err(e) => return Err(e).context("Failed to read live devices"),
        }
    }

    let ip: IpAddr = config
        .http
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.http.bind_address))?;
    let addr = SocketAddr::new(ip, config.http.bind_port);

    let state = Arc::new(AppState::new(manager, store, config.wireguard.clone()));
    api::serve(state, addr, shutdown_signal()).await?;

    info!("Shutting down");
    Ok(())
}

async fn show(manager: WgManager, interface: Option<String>) -> anyhow::Result<i32> {
    let result = tokio::task::spawn_blocking(move || match interface {
        Some(name) => manager.get_device(&name).map(|device| vec![device]),
        None => manager.list_devices(),
    })
    .await?;

    let devices = match result {
        Ok(devices) => devices,
        Err(WgManagerError::NotFound(what)) => {
            eprintln!("No such {}", what);
            return Ok(NO_SUCH_DEVICE_STATUS);
        }
        Err(e) => return Err(e.into()),
    };

    if devices.is_empty() {
        return Ok(NO_SUCH_DEVICE_STATUS);
    }
    for device in &devices {
        print_device(device);
    }
    Ok(0)
}

fn print_device(device: &Device) {
    println!("interface: {}", device.name);
    if let Some(key) = &device.public_key {
        println!("  public key: {}", key);
    }
    if device.listen_port != 0 {
        println!("  listening port: {}", device.listen_port);
    }
    println!(
        "  peers: {} ({} active)",
        device.peers.len(),
        device.active_peer_count()
    );
    if !device.peers.is_empty() && !device.is_active() {
        println!("  no peer has completed a handshake");
    }

    for peer in &device.peers {
        println!();
        match &peer.public_key {
            Some(key) => println!("peer: {}", key),
            None => println!("peer: (invalid key)"),
        }
        if let Some(endpoint) = peer.endpoint {
            println!("  endpoint: {}", endpoint);
        }
        let allowed: Vec<String> = peer.allowed_ips.iter().map(|n| n.to_string()).collect();
        if allowed.is_empty() {
            println!("  allowed ips: (none)");
        } else {
            println!("  allowed ips: {}", allowed.join(", "));
        }
        if peer.has_recent_handshake() {
            println!("  latest handshake: recent");
        } else if peer.is_active() {
            println!("  latest handshake: stale");
        }
    }
    println!();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
