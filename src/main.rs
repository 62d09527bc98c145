use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::config::Config;
use tally::{api, bootstrap, redirect};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = bootstrap::build_storage(&config).await?;
    info!("Database initialized successfully");

    let service = Arc::new(bootstrap::build_service(&config, storage)?);

    let api_router = api::create_api_router(Arc::clone(&service));
    let redirect_router =
        redirect::create_redirect_router(Arc::clone(&service), config.redirect_mode);

    let api_addr = config.api_server.addr();
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    let redirect_addr = config.redirect_server.addr();
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!(
        status = config.redirect_mode.status_code().as_u16(),
        "Redirect server listening on http://{}", redirect_addr
    );

    // the redirect server needs the peer address for click attribution
    tokio::try_join!(
        axum::serve(api_listener, api_router),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
    )?;

    Ok(())
}
