//! Network listeners: one websocket endpoint per agent VLAN plus the
//! viewer endpoint, all sharing one `Service`.

mod agent;
mod viewer;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use phxnet_config::Config;
use phxnet_core::Service;

use crate::error::CliError;

/// Bind every listener, run until Ctrl-C, then drain.
pub async fn serve(config: &Config) -> Result<(), CliError> {
    let service = Service::in_memory(config.to_service_config());
    let cancel = CancellationToken::new();

    // Bind everything up front so a bad address fails startup.
    let viewer_listener = bind(config.viewer_bind).await?;
    let mut agent_listeners = Vec::with_capacity(config.agents.len());
    for listener in &config.agents {
        agent_listeners.push((bind(listener.bind).await?, Arc::<str>::from(listener.vlan.as_str())));
    }

    let mut tasks = JoinSet::new();
    for (listener, vlan) in agent_listeners {
        info!(%vlan, addr = ?listener.local_addr().ok(), "agent listener ready");
        tasks.spawn(agent::accept_loop(listener, vlan, service.clone(), cancel.clone()));
    }
    info!(addr = %config.viewer_bind, "viewer listener ready");
    tasks.spawn(viewer::accept_loop(viewer_listener, service.clone(), cancel.clone()));
    let publisher = service.spawn_publisher(cancel.clone());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "listener task failed");
        }
    }
    if let Err(e) = publisher.await {
        warn!(error = %e, "publisher task failed");
    }
    Ok(())
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, CliError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind { addr, source })
}
