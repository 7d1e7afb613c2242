use anyhow::{bail, Context, Result};
use kube::Client;
use lb_core::{Controller, ControllerConfig};
use lb_rest::{RestClient, RestConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod http;
mod kube_api;
mod streams;

use kube_api::KubeClusterApi;

/// Supported Kubernetes minor versions (major 1)
const MIN_MINOR: u32 = 25;
const MAX_MINOR: u32 = 31;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting lb-controller...");

    let config = ControllerConfig::from_env().context("invalid controller configuration")?;
    let rest_config = RestConfig::from_env().context("invalid load balancer configuration")?;
    let http_addr: SocketAddr = std::env::var("HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid HTTP_ADDR")?;

    let client = Client::try_default().await?;
    check_server_version(&client).await?;

    let api = Arc::new(KubeClusterApi::new(client.clone()));
    let lb = Arc::new(RestClient::new(rest_config, config.created_by())?);
    let shutdown_timeout = config.shutdown_timeout;
    let controller = Controller::new(config, api, lb)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    // Health reports "starting" until bootstrap completes.
    let server = http::serve(http_addr, controller.clone(), stop_rx.clone());
    tasks.spawn(async move {
        if let Err(e) = server.await {
            error!("Health server error: {}", e);
        }
    });

    controller.bootstrap().await?;
    if controller.is_sync_disabled() {
        info!("Sync disabled after bootstrap, waiting for shutdown");
    } else {
        controller.start(stop_rx.clone()).await;
        streams::spawn_all(&mut tasks, &client, &controller, &stop_rx);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining...");

    stop_tx.send_replace(true);
    if !controller.shutdown(shutdown_timeout).await {
        warn!("Exiting with work still in flight");
    }
    while tasks.join_next().await.is_some() {}

    info!("lb-controller stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Refuse to run against API servers whose Gateway API behaviour is untested
async fn check_server_version(client: &Client) -> Result<()> {
    let info = client.apiserver_version().await?;
    let minor: u32 = info
        .minor
        .trim_end_matches('+')
        .parse()
        .with_context(|| format!("unparseable server minor version {:?}", info.minor))?;
    if info.major != "1" || !(MIN_MINOR..=MAX_MINOR).contains(&minor) {
        bail!(
            "Kubernetes {}.{} is not supported (need 1.{}-1.{})",
            info.major,
            info.minor,
            MIN_MINOR,
            MAX_MINOR
        );
    }
    info!("Kubernetes API server {}", info.git_version);
    Ok(())
}
