use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use kosh_common::config::CoreConfig;
use kosh_node::{api, bootstrap, cli::Args, tasks};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = CoreConfig::from_env()?;
    if let Some(port) = args.port {
        config.service_port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    // Uncaught faults at the request boundary become INTERNAL responses; a
    // panic escaping the runtime itself is still worth a stack trace.
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!(%info, %backtrace, "panic");
    }));

    tracing::info!(port = config.service_port, "starting kosh core");
    let ctx = bootstrap::build(config, !args.no_seed).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = tasks::spawn_all(&ctx, shutdown_rx);

    let addr = format!("0.0.0.0:{}", ctx.config.service_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, api::router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop background tasks and let them wind down.
    let _ = shutdown_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }
    tracing::info!("kosh core stopped");
    Ok(())
}
