//! Embedserve — single-model text embedding server.

use std::sync::Arc;

use anyhow::Context;
use embedserve_core::ServerConfig;
use embedserve_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Embedserve — text embedding server");
    println!();
    println!("Usage: embedserve [command]");
    println!();
    println!("Commands:");
    println!("  (none)    Load the model and start the server");
    println!("  help      Show this help message");
    println!();
    println!("Environment:");
    println!("  EMBEDDING_MODEL   Hub repo id or local model directory");
    println!("                    (default: {})", embedserve_core::config::DEFAULT_MODEL);
    println!("  EMBEDDING_DEVICE  auto | cuda | cpu (default: auto)");
    println!("  PORT              Listen port (default: {})", embedserve_core::config::DEFAULT_PORT);
    println!("  RUST_LOG          Log filter (default: info)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'embedserve help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    let port = config.port;

    info!(
        "Loading embedding model '{}' (device: {})",
        config.model_id, config.device
    );

    // Load the model exactly once, before anything can reach the router.
    let load_config = config.clone();
    let embedder =
        tokio::task::spawn_blocking(move || embedserve_infer::load_embedder(&load_config))
            .await
            .context("Model loading task failed")?
            .with_context(|| format!("Failed to load embedding model '{}'", config.model_id))?;

    info!(
        "Model ready: {} on {} (dim={})",
        embedder.model_id(),
        embedder.device(),
        embedder.dimension()
    );

    let state = Arc::new(AppState::new(config, embedder));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Embedserve listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Embedserve stopped");
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
