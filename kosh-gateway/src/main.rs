use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use kosh_common::config::CoreConfig;
use kosh_gateway::{router, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CoreConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    let app = router(GatewayState::new(&config.service_urls))
        .layer(tower_http::cors::CorsLayer::permissive())
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let addr = format!("0.0.0.0:{}", config.service_port);
    tracing::info!(%addr, "gateway listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
