use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::catalog::{CatalogStatus, FetchPhase};
use crate::models::settings::Settings;
use crate::providers::traits::MarketDataProvider;

/// Keeps the market catalog fresh and publishes its state.
///
/// Fetch lifecycle:
/// - **Initial load**: no snapshot yet, phase `InitialLoad`, applied as soon
///   as it arrives.
/// - **Background refresh**: phase `Refreshing`, the old snapshot stays
///   published, and the result is held back until `min_refresh_delay` has
///   passed since the request started.
/// - **Failure**: the snapshot is kept and `error` is set. No retry beyond the
///   regular interval.
///
/// Fetches may overlap. Each one takes a sequence number and a completion is
/// applied only if it is newer than the last applied one, so a slow response
/// can never overwrite a fresher snapshot.
///
/// Shutdown closes the current epoch: fetches started before it are ignored
/// when they complete, while later fetches (a restarted poller, a manual
/// `fetch`) apply normally.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn MarketDataProvider>,
    status: watch::Sender<CatalogStatus>,
    sequencing: Mutex<Sequencing>,
    refresh_interval: Duration,
    min_refresh_delay: Duration,
}

#[derive(Default)]
struct Sequencing {
    next: u64,
    applied: u64,
    in_flight: usize,
    epoch: u64,
    shut_down: bool,
}

/// Identity of one fetch: its sequence number and the epoch it started in.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: u64,
    epoch: u64,
}

impl CatalogService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: &Settings) -> Self {
        let (status, _) = watch::channel(CatalogStatus::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                status,
                sequencing: Mutex::new(Sequencing::default()),
                refresh_interval: settings.refresh_interval,
                min_refresh_delay: settings.min_refresh_delay,
            }),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.inner.provider.name()
    }

    /// Receiver notified on every status change (phase, snapshot, error).
    pub fn subscribe(&self) -> watch::Receiver<CatalogStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> CatalogStatus {
        self.inner.status.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<Vec<Asset>>> {
        self.inner.status.borrow().snapshot.clone()
    }

    /// `true` between `shutdown` and the next `start_polling`.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Run one fetch and apply its result if it is still the newest.
    ///
    /// Returns the provider's own result, whether or not it was applied.
    pub async fn fetch(&self) -> Result<Arc<Vec<Asset>>, CoreError> {
        let (ticket, initial) = self.begin();
        let started = Instant::now();

        let result = self.inner.provider.fetch_markets().await.map(Arc::new);

        if !initial {
            tokio::time::sleep_until(started + self.inner.min_refresh_delay).await;
        }

        self.finish(ticket, &result);
        result
    }

    /// Spawn the polling loop: an initial fetch, then one fetch per
    /// `refresh_interval`. Ticks never wait for slower fetches.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(&self) -> PollingHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel::<()>();
        let service = self.clone();
        let period = self.inner.refresh_interval;

        let epoch = {
            let mut seq = self.lock();
            seq.shut_down = false;
            seq.epoch
        };

        let task = tokio::spawn(async move {
            let _ = service.fetch().await;
            // Triggers sent during the initial load are answered by it.
            drain(&mut trigger_rx);

            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    msg = trigger_rx.recv() => {
                        if msg.is_none() {
                            break;
                        }
                        drain(&mut trigger_rx);
                        debug!("Manual catalog refresh requested");
                    }
                }
                if !service.is_current(epoch) {
                    break;
                }
                let svc = service.clone();
                tokio::spawn(async move {
                    let _ = svc.fetch().await;
                });
            }
        });

        PollingHandle {
            task: Some(task),
            trigger: trigger_tx,
            service: self.clone(),
            epoch,
        }
    }

    /// Ignore every fetch still in flight. Idempotent until the next
    /// `start_polling`.
    pub fn shutdown(&self) {
        let mut seq = self.lock();
        if !seq.shut_down {
            self.close_epoch(&mut seq);
        }
    }

    /// Shut down only if `epoch` is still current, so a stale handle cannot
    /// stop a poller started after it.
    fn shutdown_epoch(&self, epoch: u64) {
        let mut seq = self.lock();
        if !seq.shut_down && seq.epoch == epoch {
            self.close_epoch(&mut seq);
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        let seq = self.lock();
        !seq.shut_down && seq.epoch == epoch
    }

    fn close_epoch(&self, seq: &mut Sequencing) {
        seq.shut_down = true;
        seq.epoch += 1;
        info!(provider = self.provider_name(), "Catalog service shut down");
    }

    fn begin(&self) -> (Ticket, bool) {
        let mut seq = self.lock();
        seq.next += 1;
        seq.in_flight += 1;
        let ticket = Ticket {
            id: seq.next,
            epoch: seq.epoch,
        };
        let id = ticket.id;
        let in_flight = seq.in_flight;

        let mut initial = true;
        self.inner.status.send_modify(|s| {
            initial = s.snapshot.is_none();
            s.phase = phase_for(in_flight, s.snapshot.is_some());
        });
        debug!(sequence = id, initial, "Catalog fetch started");
        (ticket, initial)
    }

    fn finish(&self, ticket: Ticket, result: &Result<Arc<Vec<Asset>>, CoreError>) {
        let mut seq = self.lock();
        seq.in_flight = seq.in_flight.saturating_sub(1);
        let in_flight = seq.in_flight;
        let id = ticket.id;

        let apply = if ticket.epoch != seq.epoch {
            debug!(sequence = id, "Ignoring catalog fetch started before shutdown");
            false
        } else if id <= seq.applied {
            debug!(
                sequence = id,
                applied = seq.applied,
                "Discarding out-of-order catalog fetch"
            );
            false
        } else {
            seq.applied = id;
            true
        };

        self.inner.status.send_modify(|s| {
            if apply {
                match result {
                    Ok(assets) => {
                        info!(sequence = id, assets = assets.len(), "Catalog snapshot applied");
                        s.snapshot = Some(Arc::clone(assets));
                        s.error = None;
                        s.last_updated = Some(Utc::now());
                    }
                    Err(e) => {
                        warn!(sequence = id, error = %e, "Error fetching market data");
                        s.error = Some(e.to_string());
                    }
                }
                s.sequence = id;
            }
            s.phase = phase_for(in_flight, s.snapshot.is_some());
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sequencing> {
        self.inner
            .sequencing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<()>) {
    while rx.try_recv().is_ok() {}
}

fn phase_for(in_flight: usize, has_snapshot: bool) -> FetchPhase {
    match (in_flight, has_snapshot) {
        (0, _) => FetchPhase::Idle,
        (_, false) => FetchPhase::InitialLoad,
        (_, true) => FetchPhase::Refreshing,
    }
}

/// Owner of a running polling loop. Dropping it tears the loop down.
pub struct PollingHandle {
    task: Option<JoinHandle<()>>,
    trigger: mpsc::UnboundedSender<()>,
    service: CatalogService,
    epoch: u64,
}

impl PollingHandle {
    /// Request one extra fetch, equivalent to an interval tick.
    pub fn trigger(&self) {
        let _ = self.trigger.send(());
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the interval. Fetches already in flight finish but their
    /// results are ignored.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.service.shutdown_epoch(self.epoch);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
