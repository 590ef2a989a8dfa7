//! Poll loop and push ingestion feeding the reconciler.

use crate::payment::network::{PaymentInfo, PaymentNetworks};
use crate::payment::reconciler::PaymentReconciler;
use crate::ticket::{SweepReport, TicketLifecycle};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Buffered observations per push channel.
pub const PUSH_CHANNEL_CAPACITY: usize = 1024;

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Observations returned by all networks.
    pub observations: usize,
    /// Observations that paid for a ticket.
    pub accepted: usize,
    /// Networks that failed or timed out this cycle.
    pub silent_networks: Vec<String>,
    /// Expiry sweep run at the end of the cycle.
    pub sweep: SweepReport,
}

struct NetworkPoll {
    name: String,
    observations: Option<usize>,
    accepted: usize,
}

/// Drives the pull and push paths into the reconciler.
pub struct PollCoordinator {
    networks: Arc<PaymentNetworks>,
    reconciler: Arc<PaymentReconciler>,
    lifecycle: Arc<TicketLifecycle>,
    interval: Duration,
    check_timeout: Duration,
}

impl PollCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        networks: Arc<PaymentNetworks>,
        reconciler: Arc<PaymentReconciler>,
        lifecycle: Arc<TicketLifecycle>,
        interval: Duration,
        check_timeout: Duration,
    ) -> Self {
        Self {
            networks,
            reconciler,
            lifecycle,
            interval,
            check_timeout,
        }
    }

    /// Delay between the end of one cycle and the start of the next.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll every network once, reconcile what they report, then sweep.
    ///
    /// Networks are polled concurrently and each poll is bounded by the
    /// check timeout; a failing or slow network only loses this cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let polls = self.networks.iter().map(|network| {
            let network = Arc::clone(network);
            let reconciler = Arc::clone(&self.reconciler);
            let check_timeout = self.check_timeout;

            tokio::spawn(async move {
                let name = network.name().to_string();
                let observations =
                    match tokio::time::timeout(check_timeout, network.check_for_payments()).await {
                        Ok(Ok(observations)) => observations,
                        Ok(Err(e)) => {
                            warn!("Payment check on {} failed: {}", name, e);
                            return NetworkPoll {
                                name,
                                observations: None,
                                accepted: 0,
                            };
                        }
                        Err(_) => {
                            warn!("Payment check on {} timed out after {:?}", name, check_timeout);
                            return NetworkPoll {
                                name,
                                observations: None,
                                accepted: 0,
                            };
                        }
                    };

                let mut accepted = 0;
                for info in &observations {
                    if reconciler.reconcile(info).await.is_accepted() {
                        accepted += 1;
                    }
                }
                NetworkPoll {
                    name,
                    observations: Some(observations.len()),
                    accepted,
                }
            })
        });

        let mut report = CycleReport::default();
        for joined in join_all(polls).await {
            match joined {
                Ok(poll) => match poll.observations {
                    Some(count) => {
                        report.observations += count;
                        report.accepted += poll.accepted;
                    }
                    None => report.silent_networks.push(poll.name),
                },
                Err(e) => warn!("Payment poll task failed: {}", e),
            }
        }

        report.sweep = self.lifecycle.sweep_expired().await;

        debug!(
            "Poll cycle: {} observations, {} accepted, {} silent",
            report.observations,
            report.accepted,
            report.silent_networks.len()
        );
        report
    }

    /// Hand every network a sink for pushed observations.
    ///
    /// The returned receiver closes once every network has dropped its sink.
    #[must_use]
    pub fn attach_push(&self) -> mpsc::Receiver<PaymentInfo> {
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        for network in self.networks.iter() {
            network.subscribe(tx.clone());
        }
        rx
    }

    /// Reconcile pushed observations until the channel closes or shutdown is
    /// signalled. Returns how many were accepted.
    pub async fn ingest_push(
        &self,
        mut rx: mpsc::Receiver<PaymentInfo>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let mut accepted = 0;
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(info) = received else {
                        debug!("Push channel closed");
                        break;
                    };
                    if self.reconciler.reconcile(&info).await.is_accepted() {
                        accepted += 1;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        accepted
    }

    /// Run push ingestion and the poll loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let rx = self.attach_push();
        let push = {
            let coordinator = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { coordinator.ingest_push(rx, shutdown).await })
        };

        info!(
            "Payment coordinator started ({} networks, every {:?})",
            self.networks.len(),
            self.interval
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = push.await {
            warn!("Push ingestion task failed: {}", e);
        }
        info!("Payment coordinator stopped");
    }
}
