//! Appkeeper - Main Entry Point
//!
//! A process supervisor that launches the applications declared in an
//! ecosystem configuration file and keeps them running.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use appkeeper::config::{EcosystemConfig, KeeperSettings};
use appkeeper::supervisor::{PersistentState, Supervisor, SupervisorMessage, SupervisorState};

/// Process supervisor for declaratively configured applications.
#[derive(Parser, Debug)]
#[command(name = "appkeeper")]
#[command(about = "Launch, watch, and restart the applications declared in an ecosystem file")]
#[command(version)]
struct Args {
    /// Path to the ecosystem JSON configuration file.
    #[arg(short, long, default_value = "ecosystem.json")]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Handle example config generation
    if args.generate_config {
        return generate_example_config();
    }

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let settings = KeeperSettings::from_env_with_defaults();

    let config = EcosystemConfig::load_from_file(&args.config)
        .context("Failed to load ecosystem configuration")?;

    // Reject broken descriptors before anything is launched
    config
        .validate()
        .context("Ecosystem configuration validation failed")?;

    info!("Loaded {} app(s) from {}", config.len(), args.config);
    for app in &config.apps {
        info!(
            "  {} -> {} (interpreter: {}, watch: {}, env vars: {})",
            app.name,
            app.script.display(),
            app.interpreter.as_deref().unwrap_or("none"),
            app.watch,
            app.env.len()
        );
    }

    // Restore state from a previous run (restart counters, errored apps)
    let persistent = PersistentState::load(&settings.state_path);
    let state = Arc::new(RwLock::new(SupervisorState::from_persistent(&persistent)));

    let config = Arc::new(config);
    let supervisor = Supervisor::new(Arc::clone(&config), settings, Arc::clone(&state));

    // Create supervisor channel
    let (supervisor_tx, supervisor_rx) = mpsc::channel::<SupervisorMessage>(32);

    info!("Starting supervisor...");

    // Spawn supervisor task
    let supervisor_handle = tokio::spawn(async move {
        supervisor.run(supervisor_rx).await;
    });

    info!("Supervisor is running. Use Ctrl+C to stop.");

    // Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    // Cleanup
    let _ = supervisor_tx.send(SupervisorMessage::Shutdown).await;
    let _ = supervisor_handle.await;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let example = EcosystemConfig::example();
    example.save_to_file("ecosystem.example.json")?;

    println!("✓ Example configuration written to: ecosystem.example.json");
    println!("\nTo use this supervisor:");
    println!("1. Copy ecosystem.example.json to ecosystem.json");
    println!("2. Edit the app entries (name, script, interpreter, watch, env)");
    println!("3. Run: appkeeper");

    Ok(())
}
