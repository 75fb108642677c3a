use anyhow::Context;
use pdfchat::{api, config, logging, processing::ChatService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loaded early so PDFCHAT_LOG_FILE and RUST_LOG from `.env` reach the subscriber.
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = config::load().context("Failed to load configuration")?;
    let service = ChatService::from_config(&config).context("Failed to initialize services")?;
    let app = api::create_router(Arc::new(service), api::RouterOptions::from_config(&config));

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
