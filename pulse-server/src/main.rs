use clap::Parser;
use pulse_core::ipc::PulseRequest;
use pulse_core::{create_directory, create_enhancer, KnowledgeRegistry, MessageBus, PulseConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use pulse_server::agents;
use pulse_server::router::{self, AppContext};
use pulse_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "pulse.toml")]
    config: String,

    /// Start the agents, report their health and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match PulseConfig::load(&args.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let registry = KnowledgeRegistry::load();
    let enhancer = create_enhancer(&config.enhancer);
    let directory = create_directory(&config.doctors);
    tracing::info!(
        enhancer = enhancer.name(),
        enhancer_available = enhancer.is_available(),
        directory = directory.name(),
        "Collaborators ready"
    );

    let bus = MessageBus::new();
    let (tx, _rx) = broadcast::channel(1);

    let coordinator =
        match agents::spawn_agents(&config, &bus, &registry, enhancer, directory, &tx).await {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to start agents: {}", e);
                std::process::exit(1);
            }
        };
    let ctx = AppContext::new(Arc::clone(&config), bus, coordinator.clone());

    if args.health {
        let response = router::handle_request(PulseRequest::Health, &ctx).await;
        let _ = tx.send(());
        match response.data {
            Some(data) if data["status"] == "healthy" => {
                println!("✅ PulseBridge agents healthy");
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            Some(data) => {
                println!("❌ PulseBridge agents degraded");
                println!("{}", serde_json::to_string_pretty(&data)?);
                std::process::exit(1);
            }
            None => {
                println!(
                    "❌ Health check failed: {}",
                    response.error.unwrap_or_default()
                );
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(pulse_server::subsystems::reaper::run_reaper_loop(
        coordinator,
        config.sessions.clone(),
        tx.subscribe(),
    ));

    if config.http.enabled {
        let http_ctx = ctx.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = pulse_server::http::start_http_server(http_ctx, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, ctx, tx.subscribe()).await?;

    Ok(())
}
