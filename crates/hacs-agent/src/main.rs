//! HACS Agent Daemon
//!
//! Pairs this machine with a HACS account and keeps a session open to the
//! gateway, relaying intents to the local engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hacs_agent::{prompt_pairing_code, AgentContext, IdentityStore, PairingClient};
use hacs_agent::{DeviceIdentity, PairingCredential};
use hacs_core::config::{self, AgentConfig};
use hacs_core::IntentEngine;

#[derive(Parser)]
#[command(name = "hacs-agent")]
#[command(about = "HACS agent - pairs this device and relays intents to the local engine")]
#[command(version)]
struct Args {
    /// Pairing code shown in the HACS app (prompted for if omitted)
    /// Example: 482913
    #[arg(long, env = "HACS_PAIRING_CODE")]
    code: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "HACS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the device keypair
    #[arg(long, env = "HACS_IDENTITY_DIR")]
    identity_dir: Option<PathBuf>,

    /// Pairing service endpoint
    #[arg(long, env = "HACS_PAIRING_URL")]
    pairing_url: Option<String>,

    /// Local engine endpoint
    #[arg(long, env = "HACS_ENGINE_URL")]
    engine_url: Option<String>,

    /// Delete the device keypair and generate a new one
    #[arg(long)]
    reset_identity: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("HACS Agent starting...");

    let config = load_config(&args)?;

    // Identity failures are fatal; everything after pairing recovers on its own
    let store = IdentityStore::new(config.identity_dir.clone());
    if args.reset_identity {
        tracing::warn!("Resetting device identity in {:?}", store.dir());
        store.wipe().context("Failed to remove device identity")?;
    }
    let identity = store
        .load_or_create()
        .context("Failed to load device identity")?;
    tracing::info!("Device identity: {}", identity.fingerprint());

    let credential = pair(&config, &identity, args.code).await?;
    if let Some(expires_in) = credential.expires_in {
        tracing::info!("Session token expires in {:?}", expires_in);
    }

    let context = AgentContext::new(config, identity, credential);
    let engine: Arc<dyn IntentEngine> = Arc::new(
        context
            .engine()
            .context("Failed to create local engine client")?,
    );
    let session = context.gateway_session(engine);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Ctrl-C received, shutting down");
        shutdown.cancel();
    });

    session.run(cancel).await;
    tracing::info!("HACS Agent stopped");
    Ok(())
}

/// Load the config file, falling back to defaults, then apply CLI overrides
fn load_config(args: &Args) -> Result<AgentConfig> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config = if config_path.exists() {
        config::load_config(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
            AgentConfig::default()
        })
    } else {
        AgentConfig::default()
    };

    // Apply command-line overrides
    if let Some(dir) = &args.identity_dir {
        config.identity_dir = dir.clone();
    }
    if let Some(url) = &args.pairing_url {
        config.pairing_url = url.clone();
    }
    if let Some(url) = &args.engine_url {
        config.engine_url = url.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Exchange pairing codes until one succeeds.
///
/// Every pairing failure sends the user back to code entry; only a closed
/// stdin ends the loop with an error.
async fn pair(
    config: &AgentConfig,
    identity: &DeviceIdentity,
    mut code: Option<String>,
) -> Result<PairingCredential> {
    let client = PairingClient::from_config(config).context("Failed to create pairing client")?;

    loop {
        let entered = match code.take() {
            Some(code) => code,
            None => prompt_pairing_code().context("Failed to get pairing code")?,
        };

        match client.pair(&entered, identity).await {
            Ok(credential) => return Ok(credential),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Pairing failed: {}", e);
                eprintln!("Pairing failed: {}. Please enter a new code.", e);
            }
            Err(e) => return Err(e).context("Pairing failed"),
        }
    }
}
