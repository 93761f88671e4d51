use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};

use sector_engine::SectorId;

use crate::error::{Error, Result};
use crate::metadata::{SealResult, SealStatus};

const FATAL_NOLOCK: &str = "error acquiring tracked sector lock";

/// Last non-terminal status observed for a tracked sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlight {
    Pending,
    Sealing,
}

#[derive(Default)]
struct Tracked {
    sectors: BTreeMap<SectorId, InFlight>,
    // Sectors whose result has been delivered. Never pruned: one entry per
    // retired sector for the poller's lifetime is what keeps a late
    // registration from tracking a sector a second time.
    retired: BTreeSet<SectorId>,
}

#[derive(Default)]
struct Shared {
    tracked: Mutex<Tracked>,
    unexpected_statuses: AtomicU64,
}

impl Shared {
    fn track(&self, sector_id: SectorId) {
        let mut tracked = self.tracked.lock().expect(FATAL_NOLOCK);

        if !tracked.retired.contains(&sector_id) {
            tracked.sectors.entry(sector_id).or_insert(InFlight::Pending);
        }
    }

    fn observe(&self, sector_id: SectorId, status: InFlight) {
        let mut tracked = self.tracked.lock().expect(FATAL_NOLOCK);

        if let Some(entry) = tracked.sectors.get_mut(&sector_id) {
            *entry = status;
        }
    }

    fn retire(&self, sector_id: SectorId) {
        let mut tracked = self.tracked.lock().expect(FATAL_NOLOCK);

        tracked.sectors.remove(&sector_id);
        tracked.retired.insert(sector_id);
    }

    fn sector_ids(&self) -> Vec<SectorId> {
        let tracked = self.tracked.lock().expect(FATAL_NOLOCK);
        tracked.sectors.keys().cloned().collect()
    }

    fn sectors(&self) -> Vec<(SectorId, InFlight)> {
        let tracked = self.tracked.lock().expect(FATAL_NOLOCK);
        tracked.sectors.iter().map(|(id, status)| (*id, *status)).collect()
    }
}

/// Hands sector ids to a running poller without blocking. Registrations made
/// after the poller stops are dropped.
#[derive(Clone)]
pub struct SectorIdRegistrar {
    tx: Sender<SectorId>,
}

impl SectorIdRegistrar {
    pub fn register(&self, sector_id: SectorId) {
        if self.tx.send(sector_id).is_err() {
            debug!("poller stopped; not tracking sector {}", sector_id);
        }
    }
}

/// Periodically asks the engine for the status of every tracked sector and
/// emits exactly one `SealResult` per sector once it is sealed or has failed.
pub struct SealStatusPoller {
    shared: Arc<Shared>,
    registrar: SectorIdRegistrar,
    stop_tx: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SealStatusPoller {
    /// Starts sweeping every `interval`. `find_seal_status` is called from the
    /// poller's thread, one sector at a time.
    pub fn start<I, F>(
        sector_ids: I,
        results_tx: Sender<SealResult>,
        interval: Duration,
        find_seal_status: F,
    ) -> SealStatusPoller
    where
        I: IntoIterator<Item = SectorId>,
        F: Fn(SectorId) -> Result<SealStatus> + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        for sector_id in sector_ids {
            shared.track(sector_id);
        }

        let (register_tx, register_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded(0);

        let sweeper = Sweeper {
            shared: Arc::clone(&shared),
            register_rx,
            stop_rx,
            results_tx,
            find_seal_status,
        };

        let thread = thread::spawn(move || sweeper.run(interval));

        SealStatusPoller {
            shared,
            registrar: SectorIdRegistrar { tx: register_tx },
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    pub fn add_sector_id(&self, sector_id: SectorId) {
        self.registrar.register(sector_id)
    }

    pub fn registrar(&self) -> SectorIdRegistrar {
        self.registrar.clone()
    }

    /// Sectors whose result has not been delivered yet, in ascending order.
    pub fn tracked_sector_ids(&self) -> Vec<SectorId> {
        self.shared.sector_ids()
    }

    /// Tracked sectors with the last status the engine reported for each.
    pub fn tracked_sectors(&self) -> Vec<(SectorId, InFlight)> {
        self.shared.sectors()
    }

    pub fn unexpected_status_count(&self) -> u64 {
        self.shared.unexpected_statuses.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops sweeping, abandoning any result which is waiting for a consumer,
    /// and waits for the poller thread to exit. Safe to call more than once.
    pub fn stop(&mut self) {
        // disconnecting the stop channel wakes every select in the sweeper
        self.stop_tx.take();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("seal status poller thread panicked");
            }
        }
    }
}

impl Drop for SealStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Flow {
    Continue,
    Stop,
}

struct Sweeper<F> {
    shared: Arc<Shared>,
    register_rx: Receiver<SectorId>,
    stop_rx: Receiver<()>,
    results_tx: Sender<SealResult>,
    find_seal_status: F,
}

impl<F> Sweeper<F>
where
    F: Fn(SectorId) -> Result<SealStatus>,
{
    fn run(self, interval: Duration) {
        info!("seal status poller: {}", "start");

        let ticker = tick(interval);

        loop {
            select! {
                recv(self.stop_rx) -> _ => break,
                recv(self.register_rx) -> msg => match msg {
                    Ok(sector_id) => self.shared.track(sector_id),
                    Err(_) => break,
                },
                recv(ticker) -> _ => {
                    if let Flow::Stop = self.sweep() {
                        break;
                    }
                }
            }
        }

        info!("seal status poller: {}", "finish");
    }

    fn sweep(&self) -> Flow {
        // registrations racing the tick are included in this sweep
        while let Ok(sector_id) = self.register_rx.try_recv() {
            self.shared.track(sector_id);
        }

        for sector_id in self.shared.sector_ids() {
            let result = match (self.find_seal_status)(sector_id) {
                Ok(SealStatus::Pending) => {
                    self.shared.observe(sector_id, InFlight::Pending);
                    continue;
                }
                Ok(SealStatus::Sealing) => {
                    self.shared.observe(sector_id, InFlight::Sealing);
                    continue;
                }
                Ok(SealStatus::Sealed(meta)) => SealResult::Sealed(*meta),
                Ok(SealStatus::Failed(message)) => SealResult::Failed { sector_id, message },
                Err(Error::UnexpectedSealStatus(code)) => {
                    self.shared.unexpected_statuses.fetch_add(1, Ordering::SeqCst);
                    error!(
                        "sector {} reported unexpected seal status code {}",
                        sector_id, code
                    );
                    continue;
                }
                Err(err) => {
                    warn!("could not get seal status of sector {}: {}", sector_id, err);
                    continue;
                }
            };

            if let Flow::Stop = self.deliver(result) {
                return Flow::Stop;
            }

            self.shared.retire(sector_id);
        }

        Flow::Continue
    }

    /// Blocks until a consumer takes the result or the poller is stopped.
    fn deliver(&self, result: SealResult) -> Flow {
        let sector_id = result.sector_id();

        select! {
            send(self.results_tx, result) -> sent => match sent {
                Ok(()) => {
                    debug!("delivered seal result for sector {}", sector_id);
                    Flow::Continue
                }
                Err(_) => {
                    warn!("seal result consumer is gone; dropping result for sector {}", sector_id);
                    Flow::Stop
                }
            },
            recv(self.stop_rx) -> _ => Flow::Stop,
        }
    }
}
