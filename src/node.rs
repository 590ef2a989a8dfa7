//! Node implementation: wires the store, issuer and payment coordinator.

use crate::config::NodeConfig;
use crate::error::Result;
use crate::event::{create_event_channel, NodeEvent, NodeEventsChannel, NodeEventsSender};
use crate::payment::{PaymentNetwork, PaymentNetworks, PaymentReconciler, PollCoordinator};
use crate::storage::TicketStore;
use crate::ticket::{TicketCache, TicketIssuer, TicketLifecycle};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Builder for constructing a node.
pub struct NodeBuilder {
    config: NodeConfig,
    networks: PaymentNetworks,
}

impl NodeBuilder {
    /// Create a new node builder with the given configuration.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            networks: PaymentNetworks::new(),
        }
    }

    /// Register a payment network module.
    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn PaymentNetwork>) -> Self {
        self.networks.register(network);
        self
    }

    /// Build the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a payment address
    /// cannot be resolved, or the store directories cannot be created.
    pub async fn build(self) -> Result<RunningNode> {
        info!("Building swm-node with config: {:?}", self.config);
        self.config.validate()?;

        let options = self.networks.resolve_options(&self.config.payment)?;
        let networks = Arc::new(self.networks);

        let store = Arc::new(
            TicketStore::open(
                self.config.content_root.clone(),
                self.config.working_root.clone(),
                self.config.published_root.clone(),
            )
            .await?,
        );

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Create event channel
        let (events_tx, events_rx) = create_event_channel();

        let tickets = TicketCache::new();
        let lifecycle = Arc::new(TicketLifecycle::new(
            Arc::clone(&store),
            tickets.clone(),
            events_tx.clone(),
        ));
        let issuer = Arc::new(TicketIssuer::new(
            &self.config,
            options,
            Arc::clone(&store),
            Arc::clone(&networks),
            tickets,
            events_tx.clone(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            Arc::clone(&lifecycle),
            events_tx.clone(),
        ));
        let coordinator = Arc::new(PollCoordinator::new(
            Arc::clone(&networks),
            reconciler,
            Arc::clone(&lifecycle),
            self.config.poll_interval(),
            self.config.check_timeout(),
        ));

        Ok(RunningNode {
            config: self.config,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
            store,
            issuer,
            lifecycle,
            coordinator,
        })
    }
}

/// A built node.
pub struct RunningNode {
    config: NodeConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: NodeEventsSender,
    events_rx: Option<NodeEventsChannel>,
    store: Arc<TicketStore>,
    issuer: Arc<TicketIssuer>,
    lifecycle: Arc<TicketLifecycle>,
    coordinator: Arc<PollCoordinator>,
}

impl RunningNode {
    /// Get the node's configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Request-path API for the transport layer.
    #[must_use]
    pub fn issuer(&self) -> Arc<TicketIssuer> {
        Arc::clone(&self.issuer)
    }

    /// Publish and expiry transitions.
    #[must_use]
    pub fn lifecycle(&self) -> Arc<TicketLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// The payment poll coordinator.
    #[must_use]
    pub fn coordinator(&self) -> Arc<PollCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// The durable ticket store.
    #[must_use]
    pub fn store(&self) -> Arc<TicketStore> {
        Arc::clone(&self.store)
    }

    /// Get a receiver for node events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<NodeEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to node events.
    #[must_use]
    pub fn subscribe_events(&self) -> NodeEventsChannel {
        self.events_tx.subscribe()
    }

    /// Run payment detection and expiry until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the node encounters a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting swm-node");

        // Emit started event
        let _ = self.events_tx.send(NodeEvent::Started);

        let coordinator = tokio::spawn(
            Arc::clone(&self.coordinator).run(self.shutdown_rx.clone()),
        );

        info!("Node running, waiting for shutdown signal");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
            }
        }

        let _ = self.events_tx.send(NodeEvent::ShuttingDown);

        if let Err(e) = coordinator.await {
            warn!("Payment coordinator task failed: {}", e);
            let _ = self.events_tx.send(NodeEvent::Error {
                message: format!("payment coordinator failed: {e}"),
            });
        }

        info!("Node shutdown complete");
        Ok(())
    }

    /// Request the node to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A handle that can stop the node from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}
