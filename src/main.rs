//! PriceCast - observation scheduler and prediction streams

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use pricecast::config::AppConfig;
use pricecast::logging;
use pricecast::scheduler::align_to_minute;
use pricecast::service::Service;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging);

    info!(config = %config, "Starting PriceCast");

    let service = Service::from_config(&config).context("Failed to build service")?;

    if config.scheduler.align_to_minute {
        info!("Waiting for the next minute boundary");
        align_to_minute().await;
    }

    let running = service.start();
    let server = spawn_server(&config, &running);

    let server_done = async {
        match server {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = running.wait() => {
            if let Err(e) = &result {
                error!(error = %e, "Service stopped");
            }
            result?;
        }
        result = server_done => {
            match result {
                Ok(Ok(())) => warn!("SSE server exited"),
                Ok(Err(e)) => return Err(e.into()),
                Err(e) => return Err(e).context("SSE server task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("PriceCast stopped");
    Ok(())
}

#[cfg(feature = "server")]
fn spawn_server(
    config: &AppConfig,
    running: &pricecast::service::RunningService,
) -> Option<tokio::task::JoinHandle<pricecast::Result<()>>> {
    if !config.server.enabled {
        info!("SSE server disabled");
        return None;
    }
    Some(tokio::spawn(pricecast::server::serve(
        running.handle(),
        config.server.port,
    )))
}

#[cfg(not(feature = "server"))]
fn spawn_server(
    config: &AppConfig,
    _running: &pricecast::service::RunningService,
) -> Option<tokio::task::JoinHandle<pricecast::Result<()>>> {
    if config.server.enabled {
        warn!("server.enabled is set but the binary was built without the `server` feature");
    }
    None
}
