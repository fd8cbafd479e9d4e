use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tokio::sync::mpsc;
use crate::{
    country::CountryAggregator,
    ledger::PeerTrafficLedger,
    peer::PeerSource,
    remote::RemoteStatsAggregator,
};

// Work dispatched from the tick path. Jobs run strictly in submission
// order on a single consumer, which is the only writer of the country
// and remote aggregates; that discipline replaces any further locking
// around their mutation.
#[derive(Debug, Clone, Copy)]
pub enum StatsJob {

    // Merge removed + active peers and fold the per-country deltas into
    // the country records.
    Reconcile,

    // Drain pending remote samples into the bounded history.
    FlushRemote { mono_now: u64 },

    // End the worker loop.
    Shutdown,

}

pub type WorkerTx = mpsc::UnboundedSender<StatsJob>;
pub type WorkerRx = mpsc::UnboundedReceiver<StatsJob>;

pub struct WorkerContext {

    pub peers: Arc<dyn PeerSource>,

    pub ledger: Arc<PeerTrafficLedger>,

    pub countries: Arc<CountryAggregator>,

    pub remote: Arc<RemoteStatsAggregator>,

}

pub fn spawn_worker(ctx: WorkerContext) -> (tokio::task::JoinHandle<()>, WorkerTx) {
    let (worker_tx, worker_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(ctx, worker_rx));
    (handle, worker_tx)
}

async fn run(ctx: WorkerContext, mut worker_rx: WorkerRx) {
    while let Some(job) = worker_rx.recv().await {
        if matches!(job, StatsJob::Shutdown) {
            break;
        }
        // One bad pass must not take later passes down with it.
        if catch_unwind(AssertUnwindSafe(|| execute(&ctx, job))).is_err() {
            tracing::error!(?job, "stats job panicked");
        }
    }
}

fn execute(ctx: &WorkerContext, job: StatsJob) {
    match job {
        StatsJob::Reconcile => {
            let deltas = ctx.ledger.reconcile(ctx.peers.as_ref());
            ctx.countries.apply_pass(deltas);
        }
        StatsJob::FlushRemote { mono_now } => {
            ctx.remote.flush(mono_now);
        }
        StatsJob::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{CountryResolver, Peer};
    use crate::remote::{RemoteCountryStats, RemoteSample};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoResolver;

    impl CountryResolver for NoResolver {
        fn resolve(&self, _address: IpAddr) -> Option<Vec<String>> {
            None
        }
    }

    // Panics on the first enumeration, then behaves.
    struct FlakyPeers {
        tripped: AtomicBool,
    }

    impl PeerSource for FlakyPeers {
        fn peer_groups(&self) -> Vec<Vec<Arc<dyn Peer>>> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("peer manager not ready");
            }
            Vec::new()
        }
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_worker() {
        let resolver: Arc<dyn CountryResolver> = Arc::new(NoResolver);
        let ledger = Arc::new(PeerTrafficLedger::new(resolver.clone()));
        let countries = Arc::new(CountryAggregator::new());
        let remote = Arc::new(RemoteStatsAggregator::new(resolver));

        let (handle, worker_tx) = spawn_worker(WorkerContext {
            peers: Arc::new(FlakyPeers {
                tripped: AtomicBool::new(false),
            }),
            ledger,
            countries,
            remote: remote.clone(),
        });

        remote.receive(RemoteSample {
            address: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            mono_time: 0,
            stats: vec![RemoteCountryStats {
                cc: "US".to_string(),
                average_sent: 11,
            }],
        });

        // First job panics inside the peer source; the flush queued
        // behind it must still run.
        worker_tx.send(StatsJob::Reconcile).expect("worker gone");
        worker_tx
            .send(StatsJob::FlushRemote { mono_now: 0 })
            .expect("worker gone");
        worker_tx.send(StatsJob::Shutdown).expect("worker gone");
        handle.await.expect("worker panicked");

        assert_eq!(remote.aggregate()["??"]["US"], 11);
    }

    #[tokio::test]
    async fn age_eviction_runs_through_the_worker() {
        let resolver: Arc<dyn CountryResolver> = Arc::new(NoResolver);
        let ledger = Arc::new(PeerTrafficLedger::new(resolver.clone()));
        let countries = Arc::new(CountryAggregator::new());
        let remote = Arc::new(RemoteStatsAggregator::new(resolver));

        let (handle, worker_tx) = spawn_worker(WorkerContext {
            peers: Arc::new(FlakyPeers {
                tripped: AtomicBool::new(true),
            }),
            ledger,
            countries,
            remote: remote.clone(),
        });

        // A stale and a fresh sample flushed together; the stale one must
        // be gone once the worker has drained the queue.
        remote.receive(RemoteSample {
            address: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            mono_time: 0,
            stats: vec![RemoteCountryStats {
                cc: "GB".to_string(),
                average_sent: 5,
            }],
        });
        remote.receive(RemoteSample {
            address: IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            mono_time: 700_000,
            stats: vec![RemoteCountryStats {
                cc: "GB".to_string(),
                average_sent: 6,
            }],
        });
        worker_tx
            .send(StatsJob::FlushRemote { mono_now: 700_000 })
            .expect("worker gone");
        worker_tx.send(StatsJob::Shutdown).expect("worker gone");
        handle.await.expect("worker panicked");

        assert_eq!(remote.aggregate()["??"]["GB"], 6);
    }
}
