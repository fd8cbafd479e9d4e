use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    sync::Arc,
};
use parking_lot::{Mutex, RwLock};
use serde_derive::{Deserialize, Serialize};
use crate::{
    peer::{resolve_cc, CountryResolver},
    HISTORY_MAX_AGE_MS, HISTORY_MAX_ENTRIES,
};

// Average-sent bytes a remote peer reports towards one target country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCountryStats {

    pub cc: String,

    pub average_sent: u64,

}

// One externally reported sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSample {

    pub address: IpAddr,

    // Monotonic arrival time in milliseconds.
    pub mono_time: u64,

    pub stats: Vec<RemoteCountryStats>,

}

// originator country -> target country -> running sum of average-sent
// over the currently retained history.
pub type AggregateRemoteStats = HashMap<String, HashMap<String, u64>>;

#[derive(Debug)]
struct HistoryEntry {

    // Originator country, resolved from the sender address.
    cc: String,

    time: u64,

    stats: Vec<RemoteCountryStats>,

}

#[derive(Debug, Default)]
struct History {

    // Kept sorted by time, ties in insertion order. Evicted strictly
    // oldest-first.
    entries: VecDeque<HistoryEntry>,

    // Invariant: every value equals the sum of contributions from the
    // retained entries for that key pair; zero sums are removed.
    aggregate: AggregateRemoteStats,

}

// Bounded time/count-windowed history of received remote samples with an
// incrementally maintained running-sum aggregate.
pub struct RemoteStatsAggregator {

    resolver: Arc<dyn CountryResolver>,

    // Latest sample per sender, drained on flush; last write wins.
    pending: Mutex<HashMap<IpAddr, RemoteSample>>,

    // Written only by the stats worker.
    history: RwLock<History>,

}

impl RemoteStatsAggregator {

    pub fn new(resolver: Arc<dyn CountryResolver>) -> RemoteStatsAggregator {
        RemoteStatsAggregator {
            resolver,
            pending: Mutex::new(HashMap::new()),
            history: RwLock::new(History::default()),
        }
    }

    // Called from any thread; the sample sits buffered until the next
    // flush.
    pub fn receive(&self, sample: RemoteSample) {
        self.pending.lock().insert(sample.address, sample);
    }

    // Drain the pending buffer into the history. Runs on the stats
    // worker.
    pub fn flush(&self, mono_now: u64) {
        let samples: Vec<RemoteSample> = self.pending.lock().drain().map(|(_, s)| s).collect();
        if samples.is_empty() {
            return;
        }
        let mut history = self.history.write();
        for sample in samples {
            self.admit(&mut history, sample, mono_now);
        }
    }

    fn admit(&self, history: &mut History, sample: RemoteSample, mono_now: u64) {
        let entry = HistoryEntry {
            cc: resolve_cc(self.resolver.as_ref(), sample.address),
            time: sample.mono_time,
            stats: sample.stats,
        };

        // Insert after every entry with an earlier-or-equal time so ties
        // keep their arrival order.
        let pos = history
            .entries
            .iter()
            .rposition(|e| e.time <= entry.time)
            .map(|i| i + 1)
            .unwrap_or(0);

        // Nested entries are created lazily; a sample with no positive
        // pairs leaves no trace in the aggregate.
        for rc in &entry.stats {
            if rc.average_sent > 0 {
                *history
                    .aggregate
                    .entry(entry.cc.clone())
                    .or_default()
                    .entry(rc.cc.clone())
                    .or_insert(0) += rc.average_sent;
            }
        }
        history.entries.insert(pos, entry);

        // Evict strictly oldest-first until the retention bound holds.
        loop {
            let over_bound = match history.entries.front() {
                Some(oldest) => {
                    history.entries.len() > HISTORY_MAX_ENTRIES
                        || mono_now.saturating_sub(oldest.time) > HISTORY_MAX_AGE_MS
                }
                None => false,
            };
            if !over_bound {
                break;
            }
            if let Some(evicted) = history.entries.pop_front() {
                Self::retire(&mut history.aggregate, &evicted);
            }
        }
    }

    // Subtract an evicted entry's contributions from the aggregate. A
    // missing or undercounted key is an internal-consistency fault:
    // logged and clamped to removal, never propagated.
    fn retire(aggregate: &mut AggregateRemoteStats, entry: &HistoryEntry) {
        if entry.stats.iter().all(|rc| rc.average_sent == 0) {
            return;
        }
        let Some(map) = aggregate.get_mut(&entry.cc) else {
            tracing::warn!(cc = %entry.cc, "aggregate missing originator for evicted entry");
            return;
        };
        for rc in &entry.stats {
            if rc.average_sent == 0 {
                continue;
            }
            match map.get_mut(&rc.cc) {
                Some(val) if *val > rc.average_sent => *val -= rc.average_sent,
                Some(val) => {
                    if *val < rc.average_sent {
                        tracing::warn!(from = %entry.cc, to = %rc.cc, "aggregate undercount, clamping");
                    }
                    map.remove(&rc.cc);
                }
                None => {
                    tracing::warn!(from = %entry.cc, to = %rc.cc, "aggregate missing target for evicted entry");
                }
            }
        }
        if map.is_empty() {
            aggregate.remove(&entry.cc);
        }
    }

    // Read-only copy of the current aggregate.
    pub fn aggregate(&self) -> AggregateRemoteStats {
        self.history.read().aggregate.clone()
    }
}
