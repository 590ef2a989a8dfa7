//! Test harness owning a node, its directories and a mock network.

use super::mock_network::MockNetwork;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swm_node::config::{PaymentConfig, PaymentOptionConfig};
use swm_node::payment::CycleReport;
use swm_node::storage::TicketStore;
use swm_node::{
    Issued, NodeBuilder, NodeConfig, NodeEventsChannel, PollCoordinator, Result, RunningNode,
    TicketIssuer, TicketLifecycle,
};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Name of the mock network.
pub const NETWORK: &str = "X";

/// Key the mock network signs with.
pub const NETWORK_KEY: &str = "test-key";

/// A node over temporary directories.
pub struct TestHarness {
    dir: TempDir,
    network: Arc<MockNetwork>,
    node: Option<RunningNode>,
    issuer: Arc<TicketIssuer>,
    lifecycle: Arc<TicketLifecycle>,
    coordinator: Arc<PollCoordinator>,
    store: Arc<TicketStore>,
    events: NodeEventsChannel,
    shutdown: Option<watch::Sender<bool>>,
    running: Option<JoinHandle<Result<()>>>,
}

impl TestHarness {
    /// Node priced at 100 on the mock network, address derived from its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be built.
    pub async fn setup() -> Result<Self> {
        Self::setup_with(|_| {}).await
    }

    /// Node with a custom payment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be built.
    pub async fn setup_with_payment(payment: PaymentConfig) -> Result<Self> {
        Self::setup_with(|config| config.payment = payment).await
    }

    /// Node whose test configuration is adjusted by `adjust`.
    ///
    /// Before adjustment the node charges 100 on the mock network.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be built.
    pub async fn setup_with(adjust: impl FnOnce(&mut NodeConfig)) -> Result<Self> {
        let dir = TempDir::new()?;
        let mut config = NodeConfig {
            content_root: dir.path().join("content"),
            working_root: dir.path().join("work"),
            published_root: dir.path().join("public"),
            base_uri: "https://example.test/snapshot".to_string(),
            payment: PaymentConfig::Single(PaymentOptionConfig {
                network: NETWORK.to_string(),
                address: None,
                key: Some(NETWORK_KEY.to_string()),
                amount: 100,
            }),
            ..NodeConfig::default()
        };
        adjust(&mut config);
        std::fs::create_dir_all(&config.content_root)?;

        let network = Arc::new(MockNetwork::new(NETWORK, NETWORK_KEY));
        let node = NodeBuilder::new(config)
            .with_network(Arc::clone(&network) as Arc<dyn swm_node::PaymentNetwork>)
            .build()
            .await?;

        info!("Test node ready in {}", dir.path().display());

        Ok(Self {
            issuer: node.issuer(),
            lifecycle: node.lifecycle(),
            coordinator: node.coordinator(),
            store: node.store(),
            events: node.subscribe_events(),
            node: Some(node),
            network,
            dir,
            shutdown: None,
            running: None,
        })
    }

    /// Write a payable resource.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn write_content(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.content_root().join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Issue a ticket the way the transport layer would.
    ///
    /// # Errors
    ///
    /// Propagates issue failures.
    pub async fn issue(&self, key: &str, preference: &[&str]) -> Result<Issued> {
        let preference: Vec<String> = preference.iter().map(ToString::to_string).collect();
        self.issuer.issue(key, &preference).await
    }

    /// Run one poll cycle.
    pub async fn poll(&self) -> CycleReport {
        self.coordinator.run_cycle().await
    }

    /// Start the node's background loops.
    pub fn start(&mut self) {
        if let Some(mut node) = self.node.take() {
            self.shutdown = Some(node.shutdown_handle());
            self.running = Some(tokio::spawn(async move { node.run().await }));
        }
    }

    /// Wait until the mock network has been handed a push sink.
    pub async fn wait_for_subscription(&self) {
        while !self.network.is_subscribed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the background loops and wait for them.
    ///
    /// # Errors
    ///
    /// Propagates a failure of the node's run loop.
    pub async fn teardown(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(running) = self.running.take() {
            running
                .await
                .map_err(|e| swm_node::Error::Storage(e.to_string()))??;
        }
        Ok(())
    }

    /// The mock payment network.
    #[must_use]
    pub fn network(&self) -> &MockNetwork {
        &self.network
    }

    /// The issue path.
    #[must_use]
    pub fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    /// Publish and expiry transitions.
    #[must_use]
    pub fn lifecycle(&self) -> &TicketLifecycle {
        &self.lifecycle
    }

    /// The durable store.
    #[must_use]
    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Node events.
    pub fn events(&mut self) -> &mut NodeEventsChannel {
        &mut self.events
    }

    /// Directory holding payable resources.
    #[must_use]
    pub fn content_root(&self) -> PathBuf {
        self.dir.path().join("content")
    }

    /// Where `key` appears once content with `digest` is published.
    #[must_use]
    pub fn published_file(&self, digest: &str, key: &str) -> PathBuf {
        self.store.published_path(digest).join(key)
    }
}
