//! Process-level wiring: builds the router from the topology and serves the
//! admin API.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::admin;
use crate::config::Topology;
use crate::router::{Router, SharedRouter};

pub struct Server {
    router: SharedRouter,
    admin_address: String,
}

impl Server {
    /// Creates a server, declaring every exchange, queue and binding of the
    /// topology. Fails if the topology is inconsistent.
    pub fn new(topology: Topology) -> Result<Self> {
        let router = Router::from_topology(&topology).context("invalid topology")?;
        Ok(Self {
            router: Arc::new(router),
            admin_address: topology.admin_address,
        })
    }

    pub fn router(&self) -> SharedRouter {
        self.router.clone()
    }

    /// Serves the admin API on the configured address.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.admin_address)
            .await
            .with_context(|| format!("failed to bind {}", self.admin_address))?;
        self.run_on(listener).await
    }

    /// Serves the admin API on an already bound listener.
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(address = %addr, "Admin API listening");
        axum::serve(listener, admin::app(self.router.clone())).await?;
        Ok(())
    }
}
