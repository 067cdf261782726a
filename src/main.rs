use anyhow::Result;
use fast_exchange_router::{config::Topology, server::Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let topology = Topology::load("topology.yaml")?;
    info!(
        exchanges = topology.exchanges.len(),
        queues = topology.queues.len(),
        bindings = topology.bindings.len(),
        "Topology loaded"
    );

    let server = Server::new(topology)?;
    server.run().await
}
