//! Process wiring: queue, worker, ingress and metrics listeners

use crate::config::Config;
use crate::dead_letter::DeadLetterStore;
use crate::metrics::server::{MetricsServer, MetricsServerConfig};
use crate::queue::EntryQueue;
use crate::server::{AppState, RelayServer};
use crate::upstream::{Forwarder, UpstreamClient};
use crate::worker::Worker;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// A bound, not yet running relay
pub struct Relay {
    config: Config,
    queue: Arc<EntryQueue>,
    dead_letters: Arc<DeadLetterStore>,
    forwarder: Arc<dyn Forwarder>,
    server: RelayServer,
}

impl Relay {
    /// Bind the ingress listener and build the upstream client
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let forwarder = Arc::new(UpstreamClient::new(&config.upstream)?);
        Self::with_forwarder(config, forwarder).await
    }

    /// Like [`Relay::new`] with a caller-supplied forwarder
    pub async fn with_forwarder(
        config: Config,
        forwarder: Arc<dyn Forwarder>,
    ) -> anyhow::Result<Self> {
        let queue = Arc::new(EntryQueue::new(config.queue.capacity));
        let dead_letters = Arc::new(DeadLetterStore::new(config.retry.dead_letter_capacity));

        let state = AppState {
            queue: Arc::clone(&queue),
            dead_letters: Arc::clone(&dead_letters),
            enqueue_timeout: config.server.enqueue_timeout(),
        };
        let server = RelayServer::bind(&config.server.address, state).await?;

        Ok(Self {
            config,
            queue,
            dead_letters,
            forwarder,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn queue(&self) -> Arc<EntryQueue> {
        Arc::clone(&self.queue)
    }

    pub fn dead_letters(&self) -> Arc<DeadLetterStore> {
        Arc::clone(&self.dead_letters)
    }

    /// Run until `shutdown` resolves. Entries still queued at that point are lost.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut metrics_server = if self.config.metrics.enabled {
            let mut server = MetricsServer::new(MetricsServerConfig::from(&self.config.metrics));
            server.start().await?;
            Some(server)
        } else {
            None
        };

        let worker = Worker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.forwarder),
            Arc::clone(&self.dead_letters),
            &self.config.retry,
            self.config.queue.idle_poll(),
        );
        let worker_handle = worker.spawn();

        info!(
            upstream = %self.config.upstream.endpoint,
            capacity = self.queue.capacity(),
            "Relay running"
        );
        let served = self.server.run_until(shutdown).await;

        self.queue.close();
        worker_handle.abort();
        if let Some(server) = metrics_server.as_mut() {
            server.shutdown().await;
        }

        let abandoned = self.queue.len();
        if abandoned > 0 {
            warn!(abandoned, "Exiting with undelivered entries");
        }

        served?;
        Ok(())
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
