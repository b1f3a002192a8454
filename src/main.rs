//! Interop Bridge: backend service objects over HTTP
//!
//! A single-process server that lets a browser front-end call methods on
//! backend service objects by name. `POST /` carries one invocation per
//! request; `GET` serves the front-end's static assets.
//!
//! Usage:
//!   interop-bridge                               # Default port 3333, no secret
//!   interop-bridge --port 8080                   # Custom port
//!   interop-bridge --password mysecret           # Require a bearer secret
//!   INTEROP_ASSET_ROOT=dist interop-bridge       # Serve assets from ./dist

mod bootstrap;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use interop_protocol::{AuthConfig, Invocation};
use interop_server::Dispatcher;
use interop_transport::server::{DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
use interop_transport::{AssetConfig, TransportConfig, TransportServer};
use secrecy::SecretString;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "interop-bridge", version, about = "Interop Bridge: backend service objects over HTTP")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, env = "INTEROP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Hostname to bind to
    #[arg(long, env = "INTEROP_HOST", default_value = "0.0.0.0")]
    hostname: String,

    /// Shared secret required as `Authorization: Bearer <secret>` on RPC requests
    #[arg(long, env = "INTEROP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory static assets are served from
    #[arg(long, env = "INTEROP_ASSET_ROOT", default_value = "build/html")]
    asset_root: PathBuf,

    /// Icon served for /favicon.ico (defaults to the asset root's)
    #[arg(long, env = "INTEROP_FAVICON")]
    favicon: Option<PathBuf>,

    /// Directory holding the `Version` file
    #[arg(long, env = "INTEROP_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Directory for persistent service data (defaults to the user config dir)
    #[arg(long, env = "INTEROP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Largest accepted RPC request body, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Allow cross-origin requests
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to <data-dir>/logs/interop.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

impl Cli {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("interop-bridge")
        })
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_file_arg) = cli.log_file {
        let log_path = if log_file_arg == "DEFAULT" {
            cli.data_dir().join("logs/interop.log")
        } else {
            PathBuf::from(log_file_arg)
        };

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    if let Err(e) = init_tracing(&cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli.data_dir();

    // Empty password means no auth
    let auth = cli
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .map(|p| AuthConfig::from_secret(SecretString::from(p)));

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                       Interop Bridge                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Assets:     {}", cli.asset_root.display());
    println!("  Data:       {}", data_dir.display());
    println!("  Binding:    {}:{}", cli.hostname, cli.port);
    match &auth {
        Some(_) => println!("  Auth:       bearer secret required"),
        None => println!("  Auth:       disabled (no INTEROP_PASSWORD)"),
    }
    println!();

    // Build the registry and run the startup sequence
    let dispatcher = Dispatcher::new(bootstrap::registry(data_dir.clone()));

    let version = bootstrap::version_string(&cli.base_dir);
    let args = vec![format!("--config={}", data_dir.display())];
    bootstrap::run(&dispatcher, version, args).await?;

    // Start transport server
    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        auth,
        enable_cors: cli.cors,
        max_body_bytes: cli.max_body_bytes,
        assets: AssetConfig {
            root: cli.asset_root.clone(),
            favicon: cli.favicon.clone(),
        },
    };

    let mut transport = TransportServer::start(transport_config, dispatcher.clone())
        .await
        .context("Failed to start transport")?;

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Server running!");
    println!();
    println!("  Endpoint:");
    println!("    http://{}:{}/", cli.hostname, transport.port());
    println!();
    println!("  Services:   {}", dispatcher.registry().names().join(", "));
    println!();
    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!();
    println!("  Shutting down...");
    transport.stop().await;

    // Persist whatever changed since the last save
    if let Err(e) = dispatcher.invoke(Invocation::new("Storage", "Flush", vec![])).await {
        warn!("Storage was not saved: {e}");
    }

    println!("  Server stopped.");
    Ok(())
}
