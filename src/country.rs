use std::collections::{HashMap, HashSet};
use parking_lot::RwLock;
use serde_derive::Serialize;
use crate::{average::MovingAverage, ledger::CountryDeltas, ALL_COUNTRIES_CC};

// Samples in the short per-country averages, one per pass.
const AVERAGE_SAMPLES: usize = 3;

#[derive(Debug)]
struct CountryRecord {

    total_sent: u64,

    total_recv: u64,

    // Bytes attributed in the most recent pass.
    last_sent: u64,

    last_recv: u64,

    sent_average: MovingAverage,

    recv_average: MovingAverage,

}

impl CountryRecord {

    fn new() -> CountryRecord {
        CountryRecord {
            total_sent: 0,
            total_recv: 0,
            last_sent: 0,
            last_recv: 0,
            sent_average: MovingAverage::new(AVERAGE_SAMPLES),
            recv_average: MovingAverage::new(AVERAGE_SAMPLES),
        }
    }

    // Fold one pass's deltas in, returning what was actually applied.
    // Non-positive deltas from counter anomalies are clamped silently.
    fn update(&mut self, diff_sent: i64, diff_recv: i64) -> (u64, u64) {
        let mut applied = (0, 0);
        if diff_sent > 0 {
            self.last_sent = diff_sent as u64;
            self.total_sent += diff_sent as u64;
            self.sent_average.update(diff_sent as f64);
            applied.0 = diff_sent as u64;
        } else {
            self.last_sent = 0;
            self.sent_average.update(0.0);
        }
        if diff_recv > 0 {
            self.last_recv = diff_recv as u64;
            self.total_recv += diff_recv as u64;
            self.recv_average.update(diff_recv as f64);
            applied.1 = diff_recv as u64;
        } else {
            self.last_recv = 0;
            self.recv_average.update(0.0);
        }
        applied
    }

    // A pass with no traffic for this country.
    fn decay(&mut self) {
        self.last_sent = 0;
        self.last_recv = 0;
        self.sent_average.update(0.0);
        self.recv_average.update(0.0);
    }
}

// Snapshot of one country's traffic, cloned out to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryStats {

    pub cc: String,

    pub total_sent: u64,

    pub total_received: u64,

    pub latest_sent: u64,

    pub latest_received: u64,

    pub average_sent: u64,

    pub average_received: u64,

}

// Per-country traffic records, created lazily on first traffic and never
// removed. Written only by the stats worker; snapshot reads can run
// concurrently with the writer.
pub struct CountryAggregator {
    records: RwLock<HashMap<String, CountryRecord>>,
}

impl CountryAggregator {

    pub fn new() -> CountryAggregator {
        let mut records = HashMap::new();
        records.insert(ALL_COUNTRIES_CC.to_string(), CountryRecord::new());
        CountryAggregator {
            records: RwLock::new(records),
        }
    }

    // Fold one reconciliation pass into the records.
    pub fn apply_pass(&self, deltas: CountryDeltas) {
        let mut records = self.records.write();
        let mut touched: HashSet<String> = HashSet::new();
        let mut total_diff_sent = 0u64;
        let mut total_diff_recv = 0u64;

        for (cc, (diff_sent, diff_recv)) in deltas {
            let record = records.entry(cc.clone()).or_insert_with(CountryRecord::new);
            let (applied_sent, applied_recv) = record.update(diff_sent, diff_recv);
            total_diff_sent += applied_sent;
            total_diff_recv += applied_recv;
            touched.insert(cc);
        }

        // The synthetic record sums the deltas actually applied this
        // pass, not the post-update per-country totals.
        if let Some(total) = records.get_mut(ALL_COUNTRIES_CC) {
            total.update(total_diff_sent as i64, total_diff_recv as i64);
        }
        touched.insert(ALL_COUNTRIES_CC.to_string());

        // Countries silent this pass decay toward zero rather than
        // freezing at their last rate.
        for (cc, record) in records.iter_mut() {
            if !touched.contains(cc) {
                record.decay();
            }
        }
    }

    // Point-in-time copy of every record.
    pub fn snapshot(&self) -> Vec<CountryStats> {
        let records = self.records.read();
        records
            .iter()
            .map(|(cc, record)| CountryStats {
                cc: cc.clone(),
                total_sent: record.total_sent,
                total_received: record.total_recv,
                latest_sent: record.last_sent,
                latest_received: record.last_recv,
                average_sent: record.sent_average.average() as u64,
                average_received: record.recv_average.average() as u64,
            })
            .collect()
    }
}

impl Default for CountryAggregator {
    fn default() -> CountryAggregator {
        CountryAggregator::new()
    }
}
