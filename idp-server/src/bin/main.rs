use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idp_server::{
    load, shutdown_signal, version, App, AppConfig, AppRouter, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let config =
        if args.len() == 3 && (args[1] == "-c" || args[1] == "--config") {
            load(&args[2])?
        } else {
            AppConfig::parse()
        };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("{:#?}", &config);
    info!("{}", version());
    run_server(config).await
}

async fn run_server(config: AppConfig) -> Result<()> {
    let app = Arc::new(App::new(config.clone())?);

    let router = AppRouter::build(AppState(app));
    let host = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&host)
        .await
        .context("could not bind to endpoint")?;

    info!("idp server, listening on {}", host);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("error while starting idp server")?;

    Ok(())
}
