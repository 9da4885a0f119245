//! Debounced background validity checks for the offers on screen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::api::RentalApi;
use crate::config::PingConfig;
use crate::events::DashboardEvent;
use crate::models::Offer;
use crate::store::SharedStore;

/// Handle to the scheduler task.
///
/// Each [`PingScheduler::schedule`] restarts the debounce timer. When it
/// fires, the latest visible set is turned into one batch, unless a batch is
/// still in flight, in which case the set is dropped and the next schedule
/// picks the offers up again.
#[derive(Debug, Clone)]
pub struct PingScheduler {
    tx: mpsc::UnboundedSender<Vec<Offer>>,
    in_flight: Arc<AtomicBool>,
}

struct Worker {
    api: Arc<dyn RentalApi>,
    store: SharedStore,
    events: mpsc::UnboundedSender<DashboardEvent>,
    in_flight: Arc<AtomicBool>,
    debounce: Duration,
    batch_size: usize,
}

impl PingScheduler {
    pub fn spawn(
        api: Arc<dyn RentalApi>,
        store: SharedStore,
        config: &PingConfig,
        events: mpsc::UnboundedSender<DashboardEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            api,
            store,
            events,
            in_flight: in_flight.clone(),
            debounce: config.debounce(),
            batch_size: config.batch_size,
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx, in_flight }, handle)
    }

    /// Offers just rendered into view.
    pub fn schedule(&self, visible: Vec<Offer>) {
        if visible.is_empty() {
            return;
        }
        if self.tx.send(visible).is_err() {
            debug!("Ping scheduler stopped");
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Vec<Offer>>) {
        let worker = Arc::new(self);

        while let Some(mut visible) = rx.recv().await {
            let mut closed = false;
            loop {
                match timeout(worker.debounce, rx.recv()).await {
                    Ok(Some(newer)) => visible = newer,
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            worker.fire(&visible);
            if closed {
                break;
            }
        }
    }

    fn fire(self: &Arc<Self>, visible: &[Offer]) {
        if self.in_flight.load(Ordering::SeqCst) {
            debug!("Ping batch still running, skipping {} visible offers", visible.len());
            return;
        }

        let links = self.store.lock().ping_candidates(visible, self.batch_size);
        if links.is_empty() {
            return;
        }

        self.in_flight.store(true, Ordering::SeqCst);
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.ping(links).await;
            worker.in_flight.store(false, Ordering::SeqCst);
        });
    }

    async fn ping(&self, links: Vec<String>) {
        info!("🏓 Pinging {} visible offers", links.len());

        let response = match self.api.ping_visible(&links).await {
            Ok(response) if response.success => response,
            Ok(_) => {
                warn!("Backend refused ping batch of {} offers", links.len());
                return;
            }
            Err(e) => {
                warn!(error = %e, "Ping batch failed");
                return;
            }
        };

        let outcome = self.store.lock().apply_ping_results(&response);
        info!(
            "✅ Pinged {} offers, {} no longer available",
            response.results.len(),
            outcome.removed.len()
        );

        let _ = self
            .events
            .send(DashboardEvent::PingCompleted { response, outcome });
    }
}
