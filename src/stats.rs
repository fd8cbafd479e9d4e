use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use crate::{
    config::SettingsSource,
    country::{CountryAggregator, CountryStats},
    ledger::PeerTrafficLedger,
    meter::{RateMeter, TrafficClass},
    peer::{CountryResolver, Peer, PeerSource, PeerState},
    remote::{AggregateRemoteStats, RemoteSample, RemoteStatsAggregator},
    smoothed::SmoothedRateTracker,
    worker::{spawn_worker, StatsJob, WorkerContext, WorkerTx},
    RECONCILE_INTERVAL_TICKS, REMOTE_FLUSH_INTERVAL_TICKS,
};

#[derive(Debug, thiserror::Error)]
pub enum StatsError {

    #[error("stats worker has shut down")]
    WorkerGone(#[from] mpsc::error::SendError<StatsJob>),

    #[error("stats worker panicked")]
    WorkerPanic,
}

pub type Result<T> = std::result::Result<T, StatsError>;

// Global traffic statistics for the client. Byte events arrive from I/O
// threads, peer events from the peer manager, ticks from the periodic
// driver; heavy passes are pushed onto the single stats worker.
pub struct GlobalStats {

    settings: Arc<dyn SettingsSource>,

    meter: RateMeter,

    // Only touched from the tick path; the driver never ticks
    // concurrently with itself.
    smoothed: Mutex<SmoothedRateTracker>,

    ledger: Arc<PeerTrafficLedger>,

    countries: Arc<CountryAggregator>,

    remote: Arc<RemoteStatsAggregator>,

    worker_tx: WorkerTx,

    worker_handle: tokio::task::JoinHandle<()>,

    // Data send rate persisted by the previous session.
    send_rate_at_close: u64,

}

impl GlobalStats {

    pub fn new(
        peers: Arc<dyn PeerSource>,
        resolver: Arc<dyn CountryResolver>,
        settings: Arc<dyn SettingsSource>,
    ) -> GlobalStats {
        let ledger = Arc::new(PeerTrafficLedger::new(resolver.clone()));
        let countries = Arc::new(CountryAggregator::new());
        let remote = Arc::new(RemoteStatsAggregator::new(resolver));

        let (worker_handle, worker_tx) = spawn_worker(WorkerContext {
            peers,
            ledger: ledger.clone(),
            countries: countries.clone(),
            remote: remote.clone(),
        });

        let send_rate_at_close = settings.send_rate_at_close();
        GlobalStats {
            smoothed: Mutex::new(SmoothedRateTracker::new(settings.smoothing_window_secs())),
            settings,
            meter: RateMeter::new(),
            ledger,
            countries,
            remote,
            worker_tx,
            worker_handle,
            send_rate_at_close,
        }
    }

    // ------ tick driver ------

    // Called once per base period, always from the same driver context.
    // Cadences count from tick 1; a zeroth tick has nothing to do.
    pub fn tick(&self, mono_now: u64, tick_count: u64) {
        if tick_count == 0 {
            return;
        }
        {
            let mut smoothed = self.smoothed.lock();
            if tick_count % smoothed.interval_ticks() == 0 {
                smoothed.recompute(
                    self.settings.smoothing_window_secs(),
                    self.meter.total_sent(),
                    self.meter.total_received(),
                );
            }
        }

        if tick_count % RECONCILE_INTERVAL_TICKS == 0 {
            self.dispatch(StatsJob::Reconcile);
        }

        if tick_count % REMOTE_FLUSH_INTERVAL_TICKS == 0 {
            self.dispatch(StatsJob::FlushRemote { mono_now });
        }
    }

    fn dispatch(&self, job: StatsJob) {
        if self.worker_tx.send(job).is_err() {
            tracing::error!(?job, "stats worker gone, dropping job");
        }
    }

    // ------ byte events (any thread) ------

    pub fn data_bytes_sent(&self, bytes: u64, lan: bool) {
        self.meter.record_data_sent(bytes, lan);
    }

    pub fn data_bytes_received(&self, bytes: u64, lan: bool) {
        self.meter.record_data_received(bytes, lan);
    }

    pub fn protocol_bytes_sent(&self, bytes: u64, lan: bool) {
        self.meter.record_protocol_sent(bytes, lan);
    }

    pub fn protocol_bytes_received(&self, bytes: u64, lan: bool) {
        self.meter.record_protocol_received(bytes, lan);
    }

    pub fn discarded(&self, bytes: u64) {
        self.meter.record_discarded(bytes);
    }

    // ------ peer events ------

    pub fn peer_added(&self, peer: &dyn Peer) {
        self.ledger.peer_added(peer);
    }

    pub fn peer_state_changed(&self, peer: &dyn Peer, new_state: PeerState) {
        self.ledger.peer_state_changed(peer, new_state);
    }

    pub fn peer_removed(&self, peer: &dyn Peer) {
        self.ledger.peer_removed(peer);
    }

    // ------ remote samples ------

    pub fn receive_remote_stats(&self, sample: RemoteSample) {
        self.remote.receive(sample);
    }

    // ------ read API ------

    pub fn send_rate(&self, class: TrafficClass, exclude_lan: bool, lookback: Option<u64>) -> u64 {
        self.meter.send_rate(class, exclude_lan, lookback)
    }

    pub fn receive_rate(&self, class: TrafficClass, exclude_lan: bool, lookback: Option<u64>) -> u64 {
        self.meter.receive_rate(class, exclude_lan, lookback)
    }

    pub fn data_and_protocol_send_rate(&self) -> u64 {
        self.meter.send_rate(TrafficClass::Data, false, None)
            + self.meter.send_rate(TrafficClass::Protocol, false, None)
    }

    pub fn data_and_protocol_receive_rate(&self) -> u64 {
        self.meter.receive_rate(TrafficClass::Data, false, None)
            + self.meter.receive_rate(TrafficClass::Protocol, false, None)
    }

    pub fn smoothed_send_rate(&self) -> u64 {
        self.smoothed.lock().send_rate()
    }

    pub fn smoothed_receive_rate(&self) -> u64 {
        self.smoothed.lock().receive_rate()
    }

    pub fn total_data_bytes_sent(&self) -> u64 {
        self.meter.total_data_sent()
    }

    pub fn total_data_bytes_received(&self) -> u64 {
        self.meter.total_data_received()
    }

    pub fn total_protocol_bytes_sent(&self) -> u64 {
        self.meter.total_protocol_sent()
    }

    pub fn total_protocol_bytes_received(&self) -> u64 {
        self.meter.total_protocol_received()
    }

    pub fn total_discarded(&self) -> u64 {
        self.meter.total_discarded()
    }

    pub fn send_rate_at_close(&self) -> u64 {
        self.send_rate_at_close
    }

    pub fn country_stats(&self) -> Vec<CountryStats> {
        self.countries.snapshot()
    }

    pub fn aggregate_remote_stats(&self) -> AggregateRemoteStats {
        self.remote.aggregate()
    }

    // Persist the close-time send rate and stop the worker. Jobs already
    // queued run to completion first.
    pub async fn close(self) -> Result<()> {
        self.settings
            .set_send_rate_at_close(self.meter.send_rate(TrafficClass::Data, false, None));
        self.worker_tx.send(StatsJob::Shutdown)?;
        self.worker_handle.await.map_err(|_| StatsError::WorkerPanic)?;
        Ok(())
    }
}
